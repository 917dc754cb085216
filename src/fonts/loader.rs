use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use super::{FontCatalog, FontKey, LoadedFont, ResolvedFont, StandardFont};
use crate::config::EngineConfig;
use crate::model::TextOverlay;

/// Picks and opens the face for an overlay. The preview and the flatten
/// writer each own one, so their face choice never depends on the other's
/// state, only on the overlay and the catalog.
pub struct FontLoader<'a> {
    catalog: &'a FontCatalog,
    config: &'a EngineConfig,
    opened: RefCell<HashMap<FontKey, LoadedFont>>,
}

impl<'a> FontLoader<'a> {
    pub fn new(catalog: &'a FontCatalog, config: &'a EngineConfig) -> Self {
        Self {
            catalog,
            config,
            opened: RefCell::new(HashMap::new()),
        }
    }

    /// Real bold/italic cut first, then the overlay's own file, then the
    /// family through the catalog's fallback chain, then a base font.
    pub fn font_for(&self, overlay: &TextOverlay) -> LoadedFont {
        let (bold, italic) = (overlay.flags.bold(), overlay.flags.italic());
        if (bold || italic)
            && let Some(rec) = self.catalog.resolve_variant(&overlay.font, bold, italic)
            && let Some(font) = self.open(&rec.path, rec.face_index, &rec.family)
        {
            return font;
        }
        if let Some(path) = overlay.font_file.as_deref()
            && let Some(font) = self.open(path, overlay.font_face_index, &overlay.font)
        {
            return font;
        }
        match self
            .catalog
            .resolve_or_default(&overlay.font, &self.config.default_families)
        {
            ResolvedFont::Local(rec) => self
                .open(&rec.path, rec.face_index, &rec.family)
                .unwrap_or_else(|| LoadedFont::standard(StandardFont::for_family(&overlay.font))),
            ResolvedFont::Standard(s) => LoadedFont::standard(s),
        }
    }

    fn open(&self, path: &Path, index: u32, family: &str) -> Option<LoadedFont> {
        let key = FontKey::File(path.to_path_buf(), index);
        if let Some(font) = self.opened.borrow().get(&key) {
            return Some(font.clone());
        }
        match LoadedFont::open(path, index, family) {
            Ok(font) => {
                self.opened.borrow_mut().insert(key, font.clone());
                Some(font)
            }
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        }
    }

    /// Drops a cached face so the next request re-reads it from disk.
    pub fn forget(&self, key: &FontKey) {
        self.opened.borrow_mut().remove(key);
    }

    /// Re-reads a face from disk, bypassing the cache.
    pub fn reload(&self, font: &LoadedFont) -> Option<LoadedFont> {
        let key = font.key();
        self.forget(&key);
        match key {
            FontKey::File(path, index) => self.open(&path, index, &font.family),
            FontKey::Standard(s) => Some(LoadedFont::standard(s)),
        }
    }
}
