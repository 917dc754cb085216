use std::path::{Path, PathBuf};
use std::sync::Arc;

use ttf_parser::{Face, GlyphId};

use super::afm;
use crate::error::Error;

static SANS_STAND_IN: &[u8] = include_bytes!("../../assets/fonts/DejaVuSansCondensed.ttf");
static SERIF_STAND_IN: &[u8] = include_bytes!("../../assets/fonts/DejaVuSerifCondensed.ttf");
static MONO_STAND_IN: &[u8] = include_bytes!("../../assets/fonts/DejaVuSansMono.ttf");

/// PDF base fonts used when no local file can be found. They need no
/// embedding and every viewer ships them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StandardFont {
    Helvetica,
    TimesRoman,
    Courier,
}

impl StandardFont {
    pub fn base_name(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::Courier => "Courier",
        }
    }

    /// Closest base font for an unresolvable family name.
    pub fn for_family(family: &str) -> Self {
        let lower = family.to_lowercase();
        if lower.contains("courier") || lower.contains("mono") {
            StandardFont::Courier
        } else if lower.contains("times") || (lower.contains("serif") && !lower.contains("sans")) {
            StandardFont::TimesRoman
        } else {
            StandardFont::Helvetica
        }
    }

    /// AFM advance at 1000 units/em of the code `ch` is written as.
    pub fn width_1000(self, ch: char) -> f32 {
        let code = afm::winansi_or_question(ch);
        let width = match self {
            StandardFont::Courier => afm::COURIER_WIDTH,
            StandardFont::Helvetica => afm::helvetica_width(code),
            StandardFont::TimesRoman => afm::times_roman_width(code),
        };
        width as f32
    }

    /// Outlines drawn in place of the base font where a raster is needed.
    /// Viewers substitute these fonts too; only the shapes are borrowed,
    /// advances always come from the AFM widths.
    fn stand_in(self) -> &'static [u8] {
        match self {
            StandardFont::Helvetica => SANS_STAND_IN,
            StandardFont::TimesRoman => SERIF_STAND_IN,
            StandardFont::Courier => MONO_STAND_IN,
        }
    }

    /// (ascent, descent, line gap) per em, from the AFM headers.
    fn vertical_metrics(self) -> (f32, f32, f32) {
        match self {
            StandardFont::Helvetica => (0.718, 0.207, 0.231),
            StandardFont::TimesRoman => (0.683, 0.217, 0.250),
            StandardFont::Courier => (0.629, 0.157, 0.414),
        }
    }
}

/// Hashable identity of a loaded face.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FontKey {
    File(PathBuf, u32),
    Standard(StandardFont),
}

#[derive(Clone)]
enum FaceSource {
    File {
        path: PathBuf,
        index: u32,
        data: Arc<Vec<u8>>,
    },
    Standard(StandardFont),
}

/// A face ready for measurement, outline extraction and embedding.
#[derive(Clone)]
pub struct LoadedFont {
    pub family: String,
    source: FaceSource,
}

impl std::fmt::Debug for LoadedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedFont")
            .field("family", &self.family)
            .field("key", &self.key())
            .finish()
    }
}

impl LoadedFont {
    pub fn open(path: &Path, index: u32, family: &str) -> Result<Self, Error> {
        let data = std::fs::read(path)
            .map_err(|e| Error::Font(format!("{}: {}", path.display(), e)))?;
        Face::parse(&data, index)
            .map_err(|e| Error::Font(format!("{}#{}: {}", path.display(), index, e)))?;
        Ok(Self {
            family: family.to_string(),
            source: FaceSource::File {
                path: path.to_path_buf(),
                index,
                data: Arc::new(data),
            },
        })
    }

    pub fn standard(font: StandardFont) -> Self {
        Self {
            family: font.base_name().to_string(),
            source: FaceSource::Standard(font),
        }
    }

    pub fn key(&self) -> FontKey {
        match &self.source {
            FaceSource::File { path, index, .. } => FontKey::File(path.clone(), *index),
            FaceSource::Standard(s) => FontKey::Standard(*s),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            FaceSource::File { path, .. } => Some(path),
            FaceSource::Standard(_) => None,
        }
    }

    /// File name used to decide whether the face is already a bold or italic
    /// cut. Base fonts report their PostScript name.
    pub fn file_name(&self) -> &str {
        match &self.source {
            FaceSource::File { path, .. } => {
                path.file_name().and_then(|n| n.to_str()).unwrap_or("")
            }
            FaceSource::Standard(s) => s.base_name(),
        }
    }

    pub fn standard_font(&self) -> Option<StandardFont> {
        match &self.source {
            FaceSource::Standard(s) => Some(*s),
            FaceSource::File { .. } => None,
        }
    }

    pub(crate) fn data(&self) -> Option<(&[u8], u32)> {
        match &self.source {
            FaceSource::File { data, index, .. } => Some((data.as_slice(), *index)),
            FaceSource::Standard(_) => None,
        }
    }

    pub(crate) fn face(&self) -> Option<Face<'_>> {
        let (data, index) = self.data()?;
        Face::parse(data, index).ok()
    }

    /// Face to take glyph shapes from when painting pixels: the file itself,
    /// or the bundled stand-in for a base font.
    pub(crate) fn outline_face(&self) -> Option<Face<'_>> {
        match &self.source {
            FaceSource::Standard(s) => Face::parse(s.stand_in(), 0).ok(),
            FaceSource::File { .. } => self.face(),
        }
    }

    /// Natural advances at 1000 units/em, one per char. No kerning, no
    /// hinting: the unscaled `hmtx` value. Chars the face lacks measure as
    /// its `.notdef` glyph.
    pub fn advances_1000(&self, text: &str) -> Vec<f32> {
        match &self.source {
            FaceSource::Standard(s) => text.chars().map(|ch| s.width_1000(ch)).collect(),
            FaceSource::File { .. } => {
                let Some(face) = self.face() else {
                    return text
                        .chars()
                        .map(|ch| StandardFont::Helvetica.width_1000(ch))
                        .collect();
                };
                let units = face.units_per_em() as f32;
                text.chars()
                    .map(|ch| {
                        let gid = face.glyph_index(ch).unwrap_or_else(|| {
                            log::debug!("{}: no glyph for {:?}", self.family, ch);
                            GlyphId(0)
                        });
                        face.glyph_hor_advance(gid)
                            .map(|adv| adv as f32 / units * 1000.0)
                            .unwrap_or(0.0)
                    })
                    .collect()
            }
        }
    }

    /// (ascent, descent, line gap) per em, descent positive below baseline.
    pub fn vertical_metrics(&self) -> Option<(f32, f32, f32)> {
        match &self.source {
            FaceSource::Standard(s) => Some(s.vertical_metrics()),
            FaceSource::File { .. } => {
                let face = self.face()?;
                let units = face.units_per_em() as f32;
                if units <= 0.0 {
                    return None;
                }
                Some((
                    face.ascender() as f32 / units,
                    -(face.descender() as f32) / units,
                    face.line_gap() as f32 / units,
                ))
            }
        }
    }

    /// (distance below baseline, thickness) per em from the `post` table.
    pub fn underline_metrics(&self) -> Option<(f32, f32)> {
        match &self.source {
            FaceSource::Standard(_) => Some((0.100, 0.050)),
            FaceSource::File { .. } => {
                let face = self.face()?;
                let units = face.units_per_em() as f32;
                let m = face.underline_metrics()?;
                if m.thickness <= 0 {
                    return None;
                }
                Some((-(m.position as f32) / units, m.thickness as f32 / units))
            }
        }
    }

    pub fn has_outlines(&self) -> bool {
        self.face().is_some()
    }
}
