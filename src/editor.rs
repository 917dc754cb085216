use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::Error;
use crate::fonts::{FontCatalog, ResolvedFont, names};
use crate::geometry::Rect;
use crate::history::{EditHistory, EditSnapshot};
use crate::messages::{self, DefaultMessages, MessageLookup};
use crate::metrics::{OverlayMetrics, anchor_baseline};
use crate::model::{BackgroundPatch, EditState, PatchMargins, StyleFlags, TextOverlay};
use crate::patch::{PatchColorPolicy, PatchColorRequest, cover_rect, resolve_fill_color};
use crate::pdf::{FlattenProgress, FlattenReport, FlattenWriter, PdfDocument};
use crate::preview::{PreviewFrame, PreviewRenderer};
use crate::source::{BlankSource, PageSource, SourceRun};

/// Changes requested for one overlay. Every field is optional; `None`
/// keeps what the overlay (or the source run) already has.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayEdit {
    pub text: Option<String>,
    pub font: Option<String>,
    pub size: Option<f32>,
    pub color: Option<[u8; 3]>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub stretch: Option<f32>,
    pub tracking: Option<f32>,
    pub synthetic_weight: Option<f32>,
    pub underline_weight: Option<f32>,
    pub underline_offset: Option<f32>,
    pub hwp_space: Option<bool>,
    pub force_image: Option<bool>,
    pub patch_margins: Option<PatchMargins>,
    pub patch_color: PatchColorRequest,
    /// Cover the full page width instead of the text box.
    pub band: bool,
}

impl OverlayEdit {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Applies the plain fields. Returns whether anything that affects the
    /// vertical metrics (font, style, stretch) changed.
    fn apply(&self, overlay: &mut TextOverlay) -> bool {
        let before = (overlay.font.clone(), overlay.flags, overlay.stretch);
        if let Some(text) = &self.text {
            overlay.text = text.clone();
        }
        if let Some(font) = &self.font {
            overlay.font = font.clone();
            overlay.font_file = None;
            overlay.font_face_index = 0;
        }
        if let Some(size) = self.size.filter(|s| *s > 0.0) {
            overlay.size = size;
        }
        if let Some(color) = self.color {
            overlay.color = color;
        }
        let mut flags = overlay.flags;
        if let Some(on) = self.bold {
            flags = flags.with(StyleFlags::BOLD, on);
        }
        if let Some(on) = self.italic {
            flags = flags.with(StyleFlags::ITALIC, on);
        }
        if let Some(on) = self.underline {
            flags = flags.with(StyleFlags::UNDERLINE, on);
        }
        overlay.flags = flags;
        if let Some(stretch) = self.stretch.filter(|s| *s > 0.0) {
            overlay.stretch = stretch;
        }
        if let Some(tracking) = self.tracking {
            overlay.tracking = tracking;
        }
        if let Some(weight) = self.synthetic_weight {
            overlay.synthetic_weight = weight;
        }
        if self.underline_weight.is_some() {
            overlay.underline_weight = self.underline_weight;
        }
        if self.underline_offset.is_some() {
            overlay.underline_offset = self.underline_offset;
        }
        if let Some(on) = self.hwp_space {
            overlay.hwp_space = on;
        }
        if let Some(on) = self.force_image {
            overlay.force_image = on;
        }
        if let Some(margins) = self.patch_margins {
            overlay.patch_margins = margins;
        }
        before != (overlay.font.clone(), overlay.flags, overlay.stretch)
    }
}

/// One open document with its overlays, patches and undo history.
pub struct EditSession<'a> {
    catalog: &'a FontCatalog,
    config: &'a EngineConfig,
    metrics: OverlayMetrics<'a>,
    preview: PreviewRenderer<'a>,
    document: PdfDocument,
    document_bytes: Vec<u8>,
    state: EditState,
    history: EditHistory,
    source: Box<dyn PageSource + 'a>,
    messages: Box<dyn MessageLookup + 'a>,
    patch_policy: PatchColorPolicy,
    pub current_page: usize,
    pub zoom: f32,
}

impl<'a> EditSession<'a> {
    pub fn open_bytes(
        bytes: Vec<u8>,
        catalog: &'a FontCatalog,
        config: &'a EngineConfig,
    ) -> Result<Self, Error> {
        Self::with_state(bytes, EditState::new(), catalog, config)
    }

    pub fn open(path: &Path, catalog: &'a FontCatalog, config: &'a EngineConfig) -> Result<Self, Error> {
        Self::open_bytes(std::fs::read(path)?, catalog, config)
    }

    fn with_state(
        bytes: Vec<u8>,
        state: EditState,
        catalog: &'a FontCatalog,
        config: &'a EngineConfig,
    ) -> Result<Self, Error> {
        let document = PdfDocument::from_bytes(&bytes)?;
        let mut history = EditHistory::new(config.history_depth);
        history.commit(EditSnapshot {
            document: bytes.clone(),
            state: state.clone(),
        });
        Ok(Self {
            catalog,
            config,
            metrics: OverlayMetrics::new(catalog),
            preview: PreviewRenderer::new(catalog, config),
            document,
            document_bytes: bytes,
            state,
            history,
            source: Box::new(BlankSource),
            messages: Box::new(DefaultMessages),
            patch_policy: PatchColorPolicy::default(),
            current_page: 0,
            zoom: 1.0,
        })
    }

    pub fn with_source(mut self, source: Box<dyn PageSource + 'a>) -> Self {
        self.source = source;
        self
    }

    pub fn with_messages(mut self, messages: Box<dyn MessageLookup + 'a>) -> Self {
        self.messages = messages;
        self
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn document(&self) -> &PdfDocument {
        &self.document
    }

    pub fn document_bytes(&self) -> &[u8] {
        &self.document_bytes
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    pub fn patch_policy(&self) -> &PatchColorPolicy {
        &self.patch_policy
    }

    pub fn page_count(&self) -> usize {
        self.document.page_count()
    }

    pub fn text_runs(&self, page: usize) -> Vec<SourceRun> {
        self.source.text_runs(page)
    }

    fn commit(&mut self) {
        self.history.commit(EditSnapshot {
            document: self.document_bytes.clone(),
            state: self.state.clone(),
        });
    }

    fn page_rect(&self, page: usize) -> Result<Rect, Error> {
        Ok(self.document.page_box(page)?.page_rect())
    }

    /// Family and file for a source font name, through the catalog's
    /// fallback chain.
    fn resolve_font(&self, name: &str) -> (String, Option<PathBuf>, u32) {
        match self
            .catalog
            .resolve_or_default(name, &self.config.default_families)
        {
            ResolvedFont::Local(rec) => (rec.family, Some(rec.path), rec.face_index),
            ResolvedFont::Standard(_) => (names::strip_subset_prefix(name).to_string(), None, 0),
        }
    }

    fn add_cover_patch(
        &mut self,
        page: usize,
        z: u64,
        text_box: Rect,
        edit: &OverlayEdit,
    ) -> Result<(), Error> {
        let page_rect = self.page_rect(page)?;
        let margins = self
            .state
            .overlay(z)
            .map(|(_, o)| o.patch_margins)
            .unwrap_or_else(|| PatchMargins::adaptive(text_box));
        let rect = cover_rect(text_box, &margins, edit.band, page_rect);
        let source = self.source.as_ref();
        let sampling = &self.config.background;
        let color = self.patch_policy.choose(edit.patch_color, || {
            resolve_fill_color(source, page, text_box, page_rect, sampling)
        });
        self.state.add_patch(
            page,
            BackgroundPatch {
                rect,
                color: Some(color),
                owner: Some(z),
            },
        );
        Ok(())
    }

    /// Replaces a run of the original page text. A run that already has an
    /// overlay (same box) is updated instead of stacked.
    pub fn edit_text_run(
        &mut self,
        page: usize,
        run: &SourceRun,
        edit: OverlayEdit,
    ) -> Result<u64, Error> {
        if page >= self.page_count() {
            return Err(Error::PageOutOfRange(page));
        }
        if let Some(z) = self.state.find_by_bbox(page, run.bbox) {
            self.update_overlay(z, edit)?;
            return Ok(z);
        }

        let (family, font_file, face_index) = self.resolve_font(&run.font);
        let mut overlay = TextOverlay::new(run.text.clone(), family, run.size, run.bbox);
        overlay.font_file = font_file;
        overlay.font_face_index = face_index;
        overlay.color = run.color;
        overlay.flags = run.flags;
        edit.apply(&mut overlay);
        if let Some(font) = &edit.font {
            let (family, font_file, face_index) = self.resolve_font(font);
            overlay.font = family;
            overlay.font_file = font_file;
            overlay.font_face_index = face_index;
        }

        let (ratios, source) = self.metrics.compute_with_reference(
            &overlay.font,
            overlay.font_file.as_deref(),
            overlay.flags,
            overlay.stretch,
            Some((run.bbox, run.size)),
        );
        log::debug!("Ratios for '{}' from {:?}: {:?}", overlay.font, source, ratios);
        anchor_baseline(&mut overlay, ratios, run.baseline);

        let z = self.state.add_overlay(page, overlay);
        self.add_cover_patch(page, z, run.bbox, &edit)?;
        self.commit();
        Ok(z)
    }

    /// New text in a freshly drawn box, over a patch hiding whatever the
    /// box covers. The block is centered vertically.
    pub fn add_text_region(
        &mut self,
        page: usize,
        bbox: Rect,
        text: &str,
        font: &str,
        size: f32,
        edit: OverlayEdit,
    ) -> Result<u64, Error> {
        if page >= self.page_count() {
            return Err(Error::PageOutOfRange(page));
        }
        let (family, font_file, face_index) = self.resolve_font(font);
        let mut overlay = TextOverlay::new(text, family, size, bbox);
        overlay.font_file = font_file;
        overlay.font_face_index = face_index;
        edit.apply(&mut overlay);
        if let Some(font) = &edit.font {
            let (family, font_file, face_index) = self.resolve_font(font);
            overlay.font = family;
            overlay.font_file = font_file;
            overlay.font_face_index = face_index;
        }
        let ratios = self.metrics.ratios_for(&overlay);
        anchor_baseline(&mut overlay, ratios, None);
        let z = self.state.add_overlay(page, overlay);
        self.add_cover_patch(page, z, bbox, &edit)?;
        self.commit();
        Ok(z)
    }

    pub fn update_overlay(&mut self, z: u64, edit: OverlayEdit) -> Result<(), Error> {
        let (page, was_flattened) = self
            .state
            .overlay(z)
            .map(|(page, o)| (page, o.flattened))
            .ok_or(Error::UnknownOverlay(z))?;
        let resolved = edit.font.as_deref().map(|f| self.resolve_font(f));

        let overlay = self.state.overlay_mut(z).ok_or(Error::UnknownOverlay(z))?;
        let metrics_changed = edit.apply(overlay);
        if let Some((family, font_file, face_index)) = resolved {
            overlay.font = family;
            overlay.font_file = font_file;
            overlay.font_face_index = face_index;
        }
        overlay.flattened = false;
        let text_box = overlay.bbox;
        if metrics_changed && overlay.baseline.is_none() {
            let ratios = self.metrics.ratios_for(overlay);
            ratios.apply_to(overlay);
        }

        // Text already burned into the document needs its own cover.
        if was_flattened {
            self.add_cover_patch(page, z, text_box, &edit)?;
        }
        self.commit();
        Ok(())
    }

    pub fn move_overlay(&mut self, z: u64, bbox: Rect) -> Result<(), Error> {
        let (page, was_flattened, old_box) = self
            .state
            .overlay(z)
            .map(|(page, o)| (page, o.flattened, o.bbox))
            .ok_or(Error::UnknownOverlay(z))?;
        self.state.move_overlay(z, bbox);
        // The copy already in the document stays behind at the old place.
        if was_flattened {
            self.add_cover_patch(page, z, old_box, &OverlayEdit::default())?;
        }
        self.commit();
        Ok(())
    }

    pub fn delete_overlay(&mut self, z: u64) -> Result<TextOverlay, Error> {
        let removed = self.state.remove_overlay(z).ok_or(Error::UnknownOverlay(z))?;
        self.commit();
        Ok(removed)
    }

    pub fn set_visible(&mut self, z: u64, visible: bool) -> Result<(), Error> {
        let overlay = self.state.overlay_mut(z).ok_or(Error::UnknownOverlay(z))?;
        if overlay.visible == visible {
            return Ok(());
        }
        overlay.visible = visible;
        self.commit();
        Ok(())
    }

    fn restore_with(
        history: &mut EditHistory,
        document: &mut PdfDocument,
        document_bytes: &mut Vec<u8>,
        state: &mut EditState,
        messages: &dyn MessageLookup,
        redo: bool,
    ) -> Result<bool, Error> {
        let restore = |snapshot: &EditSnapshot| -> Result<(), Error> {
            let restored = PdfDocument::from_bytes(&snapshot.document)
                .map_err(|e| Error::SnapshotRestore(e.to_string()))?;
            *document = restored;
            *document_bytes = snapshot.document.clone();
            *state = snapshot.state.clone();
            Ok(())
        };
        let result = if redo {
            history.redo(restore)
        } else {
            history.undo(restore)
        };
        if let Err(e) = &result {
            log::warn!("{}: {}", messages::render(messages, messages::UNDO_FAILED, &[]), e);
        }
        result
    }

    /// Returns `Ok(false)` when only the initial state exists.
    pub fn undo(&mut self) -> Result<bool, Error> {
        Self::restore_with(
            &mut self.history,
            &mut self.document,
            &mut self.document_bytes,
            &mut self.state,
            self.messages.as_ref(),
            false,
        )
    }

    pub fn redo(&mut self) -> Result<bool, Error> {
        Self::restore_with(
            &mut self.history,
            &mut self.document,
            &mut self.document_bytes,
            &mut self.state,
            self.messages.as_ref(),
            true,
        )
    }

    /// Paints `page` with its overlays at the session zoom. Without `base`
    /// the page source is asked for a raster.
    pub fn preview_page(
        &self,
        page: usize,
        base: Option<&image::RgbImage>,
    ) -> Result<PreviewFrame, Error> {
        let (w, h) = self.document.page_size(page)?;
        let rendered;
        let base = match base {
            Some(image) => Some(image),
            None => {
                rendered = self
                    .source
                    .render_region(page, Rect::new(0.0, 0.0, w, h), 72.0 * self.zoom);
                rendered.as_ref()
            }
        };
        self.preview.render_page(
            (w, h),
            base,
            self.state.overlays_on(page),
            self.state.patches_on(page),
            self.zoom,
        )
    }

    /// Flattens every pending overlay into a copy of the document and writes
    /// it to `path`. The session only moves to the flattened state once the
    /// file is in place; on any error it is exactly as before.
    pub fn save(
        &mut self,
        path: &Path,
        progress: &mut dyn FnMut(&FlattenProgress),
    ) -> Result<FlattenReport, Error> {
        let mut document = self.document.clone();
        let mut state = self.state.clone();
        let report = FlattenWriter::new(self.catalog, self.config)
            .with_messages(self.messages.as_ref())
            .flatten(&mut document, &mut state, progress)?;
        let bytes = match document.save_atomic(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                let target = path.display().to_string();
                log::warn!(
                    "{}",
                    messages::render(self.messages.as_ref(), messages::SAVE_FAILED, &[("name", &target)])
                );
                return Err(e);
            }
        };
        self.document = document;
        self.document_bytes = bytes;
        self.state = state;
        self.commit();
        Ok(report)
    }

    pub fn save_session(&self, path: &Path) -> Result<(), Error> {
        crate::session::SessionArchive {
            state: crate::session::SessionState::capture(&self.state, self.current_page, self.zoom),
            document: self.document_bytes.clone(),
        }
        .save(path)
    }

    /// Reopens an archive written by `save_session`. History starts over
    /// from the restored state.
    pub fn load_session(
        path: &Path,
        catalog: &'a FontCatalog,
        config: &'a EngineConfig,
    ) -> Result<Self, Error> {
        let archive = crate::session::SessionArchive::load(path)?;
        let mut session =
            Self::with_state(archive.document, archive.state.edit_state(), catalog, config)?;
        session.current_page = archive.state.current_page;
        session.zoom = archive.state.zoom;
        Ok(session)
    }
}
