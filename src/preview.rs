use image::RgbImage;
use tiny_skia::Pixmap;

use crate::config::EngineConfig;
use crate::error::Error;
use crate::fonts::{FontCatalog, FontLoader, LoadedFont};
use crate::geometry::{Point, Rect, WHITE};
use crate::layout::{OverlayLayout, layout_overlay};
use crate::model::{BackgroundPatch, TextOverlay, live_patches};

/// Where the preview put one overlay, in page points.
#[derive(Clone, Debug, PartialEq)]
pub struct PreviewPlacement {
    pub z_index: u64,
    pub line_widths: Vec<f32>,
    pub baselines: Vec<Point>,
    pub glyph_draws: usize,
}

pub struct PreviewFrame {
    pub pixmap: Pixmap,
    pub zoom: f32,
    pub placements: Vec<PreviewPlacement>,
}

impl PreviewFrame {
    pub fn placement(&self, z_index: u64) -> Option<&PreviewPlacement> {
        self.placements.iter().find(|p| p.z_index == z_index)
    }

    pub fn to_png(&self) -> Result<Vec<u8>, Error> {
        self.pixmap
            .encode_png()
            .map_err(|e| Error::Raster(e.to_string()))
    }
}

/// Paints pending overlays over a page raster for on-screen display.
pub struct PreviewRenderer<'a> {
    fonts: FontLoader<'a>,
    config: &'a EngineConfig,
}

impl<'a> PreviewRenderer<'a> {
    pub fn new(catalog: &'a FontCatalog, config: &'a EngineConfig) -> Self {
        Self {
            fonts: FontLoader::new(catalog, config),
            config,
        }
    }

    /// Lays an overlay out in page points. Advances are measured at the
    /// fixed preview precision whatever the zoom; the canvas scales the
    /// result, so rounding never depends on the zoom level.
    pub fn layout(&self, overlay: &TextOverlay) -> (LoadedFont, OverlayLayout) {
        let font = self.fonts.font_for(overlay);
        let layout = layout_overlay(overlay, &font, self.config.preview_precision, self.config);
        (font, layout)
    }

    /// Draws patches, then glyphs, then underlines, in that order across
    /// all overlays, so the preview stacks exactly like the flattened page.
    pub fn render_page(
        &self,
        page_size: (f32, f32),
        base: Option<&RgbImage>,
        overlays: &[TextOverlay],
        patches: &[BackgroundPatch],
        zoom: f32,
    ) -> Result<PreviewFrame, Error> {
        let t0 = std::time::Instant::now();
        let zoom = if zoom > 0.0 { zoom } else { 1.0 };
        let mut canvas = crate::raster::Canvas::new(Rect::new(0.0, 0.0, page_size.0, page_size.1), zoom)?;
        canvas.fill_background(WHITE);
        if let Some(image) = base {
            canvas.blit(image);
        }

        for patch in live_patches(overlays, patches) {
            canvas.fill_rect(patch.rect, patch.fill());
        }

        let mut pending: Vec<&TextOverlay> = overlays.iter().filter(|o| o.is_pending()).collect();
        pending.sort_by_key(|o| o.z_index);
        let laid_out: Vec<(&TextOverlay, LoadedFont, OverlayLayout)> = pending
            .into_iter()
            .map(|o| {
                let (font, layout) = self.layout(o);
                (o, font, layout)
            })
            .collect();

        let mut placements = Vec::with_capacity(laid_out.len());
        for (overlay, font, layout) in &laid_out {
            let glyph_draws = canvas.draw_glyphs(font, layout).placed;
            placements.push(PreviewPlacement {
                z_index: overlay.z_index,
                line_widths: layout.line_widths(),
                baselines: layout.lines.iter().map(|l| l.origin).collect(),
                glyph_draws,
            });
        }
        for (_, _, layout) in &laid_out {
            canvas.draw_underlines(layout);
        }

        log::debug!(
            "Preview: {} overlays at {:.0}% in {:.1}ms",
            placements.len(),
            zoom * 100.0,
            t0.elapsed().as_secs_f64() * 1000.0,
        );

        Ok(PreviewFrame {
            pixmap: canvas.pixmap,
            zoom,
            placements,
        })
    }
}
