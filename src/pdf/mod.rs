mod document;
mod embed;

use std::collections::{BTreeSet, HashMap};

use lopdf::dictionary;
use pdf_writer::{Content, Name, Str};

pub use document::{PageBox, PdfDocument, write_atomic};
use embed::FontRegistry;

use crate::config::EngineConfig;
use crate::error::Error;
use crate::fonts::{FontCatalog, FontKey, FontLoader, LoadedFont, StandardFont};
use crate::geometry::{Point, Rect, rgb_unit};
use crate::layout::{OverlayLayout, layout_overlay};
use crate::messages::{self, DefaultMessages, MessageLookup};
use crate::model::{BackgroundPatch, EditState, TextOverlay, live_patches};
use crate::raster::Canvas;

/// How an overlay's glyphs ended up in the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlattenMethod {
    EmbeddedFont,
    /// Embedded after dropping the cached font resource and re-reading the
    /// file without subsetting.
    EmbeddedFontRetry,
    StandardFont,
    Raster,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlattenPass {
    Patches,
    Text,
    Decorations,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlattenProgress {
    pub pass: FlattenPass,
    pub page: usize,
    /// Page-passes finished so far, including this one.
    pub done: usize,
    pub total: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlattenedOverlay {
    pub z_index: u64,
    pub page: usize,
    pub method: FlattenMethod,
    pub line_widths: Vec<f32>,
    pub glyph_draws: usize,
    /// Why each earlier method was given up, in the order tried.
    pub fallback_reasons: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlattenReport {
    pub overlays: Vec<FlattenedOverlay>,
    pub pages: Vec<usize>,
    pub patches_painted: usize,
}

impl FlattenReport {
    pub fn overlay(&self, z_index: u64) -> Option<&FlattenedOverlay> {
        self.overlays.iter().find(|o| o.z_index == z_index)
    }
}

struct PreparedOverlay {
    z_index: u64,
    force_image: bool,
    font: LoadedFont,
    layout: OverlayLayout,
}

struct PreparedPage {
    page: usize,
    page_box: PageBox,
    patches: Vec<BackgroundPatch>,
    overlays: Vec<PreparedOverlay>,
}

fn fill_rect(content: &mut Content, page_box: &PageBox, rect: Rect, color: [u8; 3]) {
    let (x, y, w, h) = page_box.rect_to_pdf(rect);
    if w <= 0.0 || h <= 0.0 {
        return;
    }
    let (r, g, b) = rgb_unit(color);
    content.save_state();
    content.set_fill_rgb(r, g, b);
    content.rect(x, y, w, h);
    content.fill_nonzero();
    content.restore_state();
}

/// Burns overlays and patches into page content streams.
pub struct FlattenWriter<'a> {
    fonts: FontLoader<'a>,
    config: &'a EngineConfig,
    messages: &'a dyn MessageLookup,
}

impl<'a> FlattenWriter<'a> {
    pub fn new(catalog: &'a FontCatalog, config: &'a EngineConfig) -> Self {
        Self {
            fonts: FontLoader::new(catalog, config),
            config,
            messages: &DefaultMessages,
        }
    }

    pub fn with_messages(mut self, messages: &'a dyn MessageLookup) -> Self {
        self.messages = messages;
        self
    }

    pub fn layout(&self, overlay: &TextOverlay) -> (LoadedFont, OverlayLayout) {
        let font = self.fonts.font_for(overlay);
        let layout = layout_overlay(overlay, &font, self.config.flatten_precision, self.config);
        (font, layout)
    }

    /// Writes every pending overlay and every live patch into `doc` in
    /// three document-wide passes: patches, glyphs, decorations. Flattened
    /// overlays are marked in `state` and painted patches removed from it.
    pub fn flatten(
        &self,
        doc: &mut PdfDocument,
        state: &mut EditState,
        progress: &mut dyn FnMut(&FlattenProgress),
    ) -> Result<FlattenReport, Error> {
        let t0 = std::time::Instant::now();
        let pages = self.prepare(doc, state)?;
        let mut report = FlattenReport {
            pages: pages.iter().map(|p| p.page).collect(),
            ..FlattenReport::default()
        };
        if pages.is_empty() {
            return Ok(report);
        }

        let mut used_chars: HashMap<FontKey, BTreeSet<char>> = HashMap::new();
        for overlay in pages.iter().flat_map(|p| p.overlays.iter()) {
            used_chars
                .entry(overlay.font.key())
                .or_default()
                .extend(overlay.layout.used_chars());
        }

        for page in &pages {
            doc.isolate_content(page.page)?;
        }

        let total = pages.len() * 3;
        let mut done = 0;
        let mut step = |pass: FlattenPass, page: usize| {
            done += 1;
            progress(&FlattenProgress {
                pass,
                page,
                done,
                total,
            });
        };

        for page in &pages {
            let mut content = Content::new();
            for patch in &page.patches {
                fill_rect(&mut content, &page.page_box, patch.rect, patch.fill());
            }
            report.patches_painted += page.patches.len();
            if !page.patches.is_empty() {
                doc.append_content(page.page, &content.finish())?;
            }
            step(FlattenPass::Patches, page.page);
        }

        let mut registry = FontRegistry::new(doc);
        for page in &pages {
            let mut ops = Vec::new();
            for overlay in &page.overlays {
                let mut fallback_reasons = Vec::new();
                let (method, glyph_draws) = if overlay.layout.is_blank() {
                    (FlattenMethod::EmbeddedFont, 0)
                } else {
                    let used = used_chars.get(&overlay.font.key()).cloned().unwrap_or_default();
                    self.write_overlay_text(
                        doc,
                        &mut registry,
                        page,
                        overlay,
                        &used,
                        &mut ops,
                        &mut fallback_reasons,
                    )?
                };
                log::debug!(
                    "Overlay {} on page {}: {:?}, {} draws",
                    overlay.z_index,
                    page.page,
                    method,
                    glyph_draws
                );
                report.overlays.push(FlattenedOverlay {
                    z_index: overlay.z_index,
                    page: page.page,
                    method,
                    line_widths: overlay.layout.line_widths(),
                    glyph_draws,
                    fallback_reasons,
                });
            }
            if !ops.is_empty() {
                doc.append_content(page.page, &ops)?;
            }
            step(FlattenPass::Text, page.page);
        }

        for page in &pages {
            let mut content = Content::new();
            let mut any = false;
            for overlay in &page.overlays {
                for bar in &overlay.layout.underlines {
                    fill_rect(&mut content, &page.page_box, bar.rect(), overlay.layout.color);
                    any = true;
                }
            }
            if any {
                doc.append_content(page.page, &content.finish())?;
            }
            step(FlattenPass::Decorations, page.page);
        }

        for page in &pages {
            for overlay in &page.overlays {
                if let Some(o) = state.overlay_mut(overlay.z_index) {
                    o.flattened = true;
                }
            }
            if let Some(list) = state.patches.get_mut(&page.page) {
                list.retain(|p| !page.patches.contains(p));
            }
        }

        log::info!(
            "Flatten: {} overlays, {} patches on {} pages in {:.1}ms",
            report.overlays.len(),
            report.patches_painted,
            report.pages.len(),
            t0.elapsed().as_secs_f64() * 1000.0,
        );
        Ok(report)
    }

    /// Lays out every pending overlay at flatten precision, page by page.
    fn prepare(&self, doc: &PdfDocument, state: &EditState) -> Result<Vec<PreparedPage>, Error> {
        let mut touched = BTreeSet::new();
        for (&page, list) in &state.overlays {
            if list.iter().any(|o| o.is_pending()) {
                touched.insert(page);
            }
        }
        for (&page, list) in &state.patches {
            if live_patches(state.overlays_on(page), list).next().is_some() {
                touched.insert(page);
            }
        }

        let mut pages = Vec::with_capacity(touched.len());
        for page in touched {
            let page_box = doc.page_box(page)?;
            let overlays_on_page = state.overlays_on(page);
            let patches = live_patches(overlays_on_page, state.patches_on(page))
                .cloned()
                .collect();
            let mut pending: Vec<&TextOverlay> =
                overlays_on_page.iter().filter(|o| o.is_pending()).collect();
            pending.sort_by_key(|o| o.z_index);
            let overlays = pending
                .into_iter()
                .map(|o| {
                    let (font, layout) = self.layout(o);
                    PreparedOverlay {
                        z_index: o.z_index,
                        force_image: o.force_image,
                        font,
                        layout,
                    }
                })
                .collect();
            pages.push(PreparedPage {
                page,
                page_box,
                patches,
                overlays,
            });
        }
        Ok(pages)
    }

    /// Embedded font, then one fresh retry, then a bitmap, then Helvetica.
    /// The error that ended each abandoned step is pushed to `reasons`.
    #[allow(clippy::too_many_arguments)]
    fn write_overlay_text(
        &self,
        doc: &mut PdfDocument,
        registry: &mut FontRegistry,
        page: &PreparedPage,
        overlay: &PreparedOverlay,
        used: &BTreeSet<char>,
        ops: &mut Vec<u8>,
        reasons: &mut Vec<String>,
    ) -> Result<(FlattenMethod, usize), Error> {
        let font = &overlay.font;
        let standard = font.standard_font().is_some();

        if !overlay.force_image {
            match self.write_glyphs(doc, registry, page, font, &overlay.layout, used, true) {
                Ok((bytes, draws)) => {
                    ops.extend(bytes);
                    let method = if standard {
                        FlattenMethod::StandardFont
                    } else {
                        FlattenMethod::EmbeddedFont
                    };
                    return Ok((method, draws));
                }
                Err(e) => {
                    log::warn!(
                        "{} ({})",
                        messages::render(self.messages, messages::FONT_EMBED_RETRY, &[("name", &font.family)]),
                        e
                    );
                    reasons.push(e.to_string());
                }
            }
            registry.forget(&font.key());
            let retried = self
                .fonts
                .reload(font)
                .ok_or_else(|| Error::GlyphEmbedding(format!("cannot re-read {}", font.family)))
                .and_then(|fresh| {
                    self.write_glyphs(doc, registry, page, &fresh, &overlay.layout, used, false)
                });
            match retried {
                Ok((bytes, draws)) => {
                    ops.extend(bytes);
                    return Ok((FlattenMethod::EmbeddedFontRetry, draws));
                }
                Err(e) => {
                    log::warn!("Retry for {} failed: {}", font.family, e);
                    reasons.push(e.to_string());
                }
            }
        }

        if font.has_outlines() {
            match self.write_raster(doc, registry, page, font, &overlay.layout) {
                Ok((bytes, draws)) => {
                    if !overlay.force_image {
                        let text = overlay.layout.lines.first().map(|l| l.text.as_str()).unwrap_or("");
                        log::warn!(
                            "{}",
                            messages::render(self.messages, messages::TEXT_RASTERIZED, &[("name", text)])
                        );
                    }
                    ops.extend(bytes);
                    return Ok((FlattenMethod::Raster, draws));
                }
                Err(e) => {
                    log::warn!("Rasterizing overlay {} failed: {}", overlay.z_index, e);
                    reasons.push(e.to_string());
                }
            }
        }

        let helvetica = LoadedFont::standard(StandardFont::Helvetica);
        let (bytes, draws) =
            self.write_glyphs(doc, registry, page, &helvetica, &overlay.layout, used, true)?;
        ops.extend(bytes);
        Ok((FlattenMethod::StandardFont, draws))
    }

    /// Text operators for one overlay. Each glyph gets its own text matrix
    /// at the position the layout computed, so the viewer's own advance
    /// arithmetic never comes into play.
    #[allow(clippy::too_many_arguments)]
    fn write_glyphs(
        &self,
        doc: &mut PdfDocument,
        registry: &mut FontRegistry,
        page: &PreparedPage,
        font: &LoadedFont,
        layout: &OverlayLayout,
        used: &BTreeSet<char>,
        subset: bool,
    ) -> Result<(Vec<u8>, usize), Error> {
        let embedded = registry.register(doc, font, used, subset)?;
        doc.add_resource(page.page, "Font", &embedded.resource, embedded.id)?;

        let (r, g, b) = rgb_unit(layout.color);
        let mut content = Content::new();
        content.save_state();
        content.set_fill_rgb(r, g, b);
        content.begin_text();
        content.set_font(Name(embedded.resource.as_bytes()), layout.size);
        let mut draws = 0;
        for line in &layout.lines {
            for glyph in &line.run.glyphs {
                if glyph.ch.is_whitespace() {
                    continue;
                }
                let mut buf = [0u8; 4];
                let bytes = embedded.encode(glyph.ch.encode_utf8(&mut buf));
                let (x, y) = page
                    .page_box
                    .to_pdf(Point::new(line.origin.x + glyph.x_offset, line.origin.y));
                for offset in &layout.bold_offsets {
                    content.set_text_matrix([layout.stretch, 0.0, layout.skew, 1.0, x + offset, y]);
                    content.show(Str(&bytes));
                    draws += 1;
                }
            }
        }
        content.end_text();
        content.restore_state();
        Ok((content.finish().to_vec(), draws))
    }

    /// Renders the overlay's glyphs to an RGB image with a soft mask and
    /// places it over the ink box.
    fn write_raster(
        &self,
        doc: &mut PdfDocument,
        registry: &mut FontRegistry,
        page: &PreparedPage,
        font: &LoadedFont,
        layout: &OverlayLayout,
    ) -> Result<(Vec<u8>, usize), Error> {
        let area = layout.ink_bounds();
        if area.is_empty() {
            return Err(Error::Raster("empty ink box".into()));
        }
        let scale = self.config.raster_fallback_dpi / 72.0;
        let mut canvas = Canvas::new(area, scale)?;
        let draws = canvas.draw_glyphs(font, layout);
        if draws.filled == 0 {
            return Err(Error::Raster(format!("{} produced no outlines", font.family)));
        }
        let (rgb, alpha) = canvas.to_rgb_and_alpha();
        let (w, h) = rgb.dimensions();

        let smask_id = doc.add_stream(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w as i64,
                "Height" => h as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha.as_raw(),
        );
        let image_id = doc.add_stream(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w as i64,
                "Height" => h as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "SMask" => smask_id,
            },
            rgb.as_raw(),
        );
        let name = registry.fresh_name("RtxIm");
        doc.add_resource(page.page, "XObject", &name, image_id)?;

        let placed = Rect::from_xywh(area.x0, area.y0, w as f32 / scale, h as f32 / scale);
        let (x, y, pw, ph) = page.page_box.rect_to_pdf(placed);
        let mut content = Content::new();
        content.save_state();
        content.transform([pw, 0.0, 0.0, ph, x, y]);
        content.x_object(Name(name.as_bytes()));
        content.restore_state();
        Ok((content.finish().to_vec(), draws.placed))
    }
}
