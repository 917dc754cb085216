//! Session archives: a zip holding `state.json` (view position and every
//! overlay and patch) next to `doc.bin`, the raw document bytes.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;

use crate::error::Error;
use crate::model::{BackgroundPatch, EditState, TextOverlay};
use crate::pdf::write_atomic;

const STATE_ENTRY: &str = "state.json";
const DOCUMENT_ENTRY: &str = "doc.bin";
const FORMAT_VERSION: u32 = 1;

fn default_zoom() -> f32 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub current_page: usize,
    #[serde(default = "default_zoom")]
    pub zoom: f32,
    #[serde(default)]
    pub overlays: BTreeMap<usize, Vec<TextOverlay>>,
    #[serde(default)]
    pub patches: BTreeMap<usize, Vec<BackgroundPatch>>,
    #[serde(default)]
    pub next_z: u64,
}

impl SessionState {
    pub fn capture(state: &EditState, current_page: usize, zoom: f32) -> Self {
        Self {
            version: FORMAT_VERSION,
            current_page,
            zoom,
            overlays: state.overlays.clone(),
            patches: state.patches.clone(),
            next_z: state.next_z,
        }
    }

    pub fn edit_state(&self) -> EditState {
        let mut state = EditState {
            overlays: self.overlays.clone(),
            patches: self.patches.clone(),
            next_z: self.next_z,
        };
        state.renumber();
        state
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionArchive {
    pub state: SessionState,
    pub document: Vec<u8>,
}

impl SessionArchive {
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file(STATE_ENTRY, options)?;
        zip.write_all(&serde_json::to_vec_pretty(&self.state)?)?;
        zip.start_file(DOCUMENT_ENTRY, options)?;
        zip.write_all(&self.document)?;
        Ok(zip.finish()?.into_inner())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|_| Error::Session("file is not a session archive".into()))?;

        let mut json = Vec::new();
        zip.by_name(STATE_ENTRY)
            .map_err(|_| Error::Session(format!("missing {}", STATE_ENTRY)))?
            .read_to_end(&mut json)?;
        let state: SessionState = serde_json::from_slice(&json)?;
        if state.version > FORMAT_VERSION {
            return Err(Error::Session(format!(
                "archive version {} is newer than {}",
                state.version, FORMAT_VERSION
            )));
        }

        let mut document = Vec::new();
        zip.by_name(DOCUMENT_ENTRY)
            .map_err(|_| Error::Session(format!("missing {}", DOCUMENT_ENTRY)))?
            .read_to_end(&mut document)?;
        Ok(Self { state, document })
    }

    /// Writes the archive through a temporary sibling file.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let t0 = std::time::Instant::now();
        let bytes = self.to_bytes()?;
        write_atomic(path, &bytes)?;
        log::info!(
            "Session saved to {} ({} bytes) in {:.1}ms",
            path.display(),
            bytes.len(),
            t0.elapsed().as_secs_f64() * 1000.0,
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}
