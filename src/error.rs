use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Pdf(lopdf::Error),
    /// A font file that could not be read or parsed.
    Font(String),
    /// Vertical metrics could not be derived from a font file.
    Metrics(String),
    /// Embedding a face into the output document failed.
    GlyphEmbedding(String),
    /// Writing the output file failed; the in-memory document is untouched.
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    SnapshotRestore(String),
    Session(String),
    Raster(String),
    PageOutOfRange(usize),
    UnknownOverlay(u64),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Pdf(err) => write!(f, "pdf error: {}", err),
            Error::Font(message) => write!(f, "font error: {}", message),
            Error::Metrics(message) => write!(f, "metric computation failed: {}", message),
            Error::GlyphEmbedding(message) => write!(f, "glyph embedding failed: {}", message),
            Error::Write { path, source } => {
                write!(f, "cannot write {}: {}", path.display(), source)
            }
            Error::SnapshotRestore(message) => write!(f, "snapshot restore failed: {}", message),
            Error::Session(message) => write!(f, "session archive error: {}", message),
            Error::Raster(message) => write!(f, "raster error: {}", message),
            Error::PageOutOfRange(page) => write!(f, "page {} does not exist", page),
            Error::UnknownOverlay(z) => write!(f, "no overlay with id {}", z),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Pdf(err) => Some(err),
            Error::Write { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<lopdf::Error> for Error {
    fn from(value: lopdf::Error) -> Self {
        Error::Pdf(value)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(value: zip::result::ZipError) -> Self {
        Error::Session(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Session(value.to_string())
    }
}

/// A source font name that no step of the resolution chain could map to a
/// local font file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontResolutionError {
    pub name: String,
}

impl fmt::Display for FontResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no local font matches '{}'", self.name)
    }
}

impl std::error::Error for FontResolutionError {}
