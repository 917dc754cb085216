use image::{GrayImage, Luma, Rgb, RgbImage};
use tiny_skia::{
    FillRule, IntSize, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

use crate::error::Error;
use crate::fonts::{LoadedFont, afm};
use crate::geometry::{Point, Rect};
use crate::layout::OverlayLayout;

/// Outline sink mapping font units to device pixels: x is stretched and
/// sheared, y is flipped.
struct GlyphPathBuilder {
    builder: PathBuilder,
    sx: f32,
    kx: f32,
    sy: f32,
}

impl GlyphPathBuilder {
    fn new(units_scale: f32, stretch: f32, skew: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            sx: units_scale * stretch,
            kx: units_scale * skew,
            sy: units_scale,
        }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.sx * x + self.kx * y, -self.sy * y)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn solid(color: [u8; 3]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], 255);
    paint.anti_alias = true;
    paint
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct GlyphDraws {
    pub(crate) placed: usize,
    pub(crate) filled: usize,
}

/// A pixmap covering `area` of a page at `scale` pixels per point.
pub(crate) struct Canvas {
    pub(crate) pixmap: Pixmap,
    pub(crate) scale: f32,
    pub(crate) area: Rect,
}

impl Canvas {
    pub(crate) fn new(area: Rect, scale: f32) -> Result<Self, Error> {
        let w = (area.width() * scale).ceil().max(1.0) as u32;
        let h = (area.height() * scale).ceil().max(1.0) as u32;
        let pixmap = Pixmap::new(w, h)
            .ok_or_else(|| Error::Raster(format!("cannot allocate {}x{} pixmap", w, h)))?;
        Ok(Self {
            pixmap,
            scale,
            area,
        })
    }

    pub(crate) fn to_px(&self, p: Point) -> (f32, f32) {
        ((p.x - self.area.x0) * self.scale, (p.y - self.area.y0) * self.scale)
    }

    pub(crate) fn fill_background(&mut self, color: [u8; 3]) {
        self.pixmap
            .fill(tiny_skia::Color::from_rgba8(color[0], color[1], color[2], 255));
    }

    /// Stretches a page raster over the whole canvas.
    pub(crate) fn blit(&mut self, image: &RgbImage) {
        let (w, h) = image.dimensions();
        let Some(size) = IntSize::from_wh(w, h) else {
            return;
        };
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for px in image.pixels() {
            data.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        let Some(src) = Pixmap::from_vec(data, size) else {
            return;
        };
        let sx = self.pixmap.width() as f32 / w as f32;
        let sy = self.pixmap.height() as f32 / h as f32;
        self.pixmap.draw_pixmap(
            0,
            0,
            src.as_ref(),
            &PixmapPaint::default(),
            Transform::from_scale(sx, sy),
            None,
        );
    }

    pub(crate) fn fill_rect(&mut self, rect: Rect, color: [u8; 3]) {
        let (x0, y0) = self.to_px(Point::new(rect.x0, rect.y0));
        let (x1, y1) = self.to_px(Point::new(rect.x1, rect.y1));
        if let Some(r) = tiny_skia::Rect::from_ltrb(x0, y0, x1, y1) {
            self.pixmap
                .fill_rect(r, &solid(color), Transform::identity(), None);
        }
    }

    /// Fills every glyph of the layout, once per synthetic bold offset.
    /// Placements are counted the way the PDF writer counts its text
    /// matrices, whether or not the glyph had an outline to fill.
    pub(crate) fn draw_glyphs(&mut self, font: &LoadedFont, layout: &OverlayLayout) -> GlyphDraws {
        let mut draws = GlyphDraws::default();
        let Some(face) = font.outline_face() else {
            log::debug!("{} has no outlines to rasterize", font.family);
            return draws;
        };
        let base_font = font.standard_font().is_some();
        let units_scale = layout.size / face.units_per_em() as f32 * self.scale;
        let paint = solid(layout.color);
        for line in &layout.lines {
            for glyph in &line.run.glyphs {
                if glyph.ch.is_whitespace() {
                    continue;
                }
                // Base fonts print `?` for chars WinAnsi cannot encode.
                let shown = if base_font && afm::winansi_code(glyph.ch).is_none() {
                    '?'
                } else {
                    glyph.ch
                };
                let gid = face.glyph_index(shown).unwrap_or(GlyphId(0));
                let mut builder = GlyphPathBuilder::new(units_scale, layout.stretch, layout.skew);
                let path = face.outline_glyph(gid, &mut builder).and_then(|_| builder.finish());
                let (px, py) = self.to_px(Point::new(line.origin.x + glyph.x_offset, line.origin.y));
                for offset in &layout.bold_offsets {
                    if let Some(path) = &path {
                        self.pixmap.fill_path(
                            path,
                            &paint,
                            FillRule::Winding,
                            Transform::from_translate(px + offset * self.scale, py),
                            None,
                        );
                        draws.filled += 1;
                    }
                    draws.placed += 1;
                }
            }
        }
        draws
    }

    pub(crate) fn draw_underlines(&mut self, layout: &OverlayLayout) {
        for bar in &layout.underlines {
            self.fill_rect(bar.rect(), layout.color);
        }
    }

    /// Splits the premultiplied pixmap into colour and alpha planes.
    pub(crate) fn to_rgb_and_alpha(&self) -> (RgbImage, GrayImage) {
        let (w, h) = (self.pixmap.width(), self.pixmap.height());
        let mut rgb = RgbImage::new(w, h);
        let mut alpha = GrayImage::new(w, h);
        for (i, px) in self.pixmap.pixels().iter().enumerate() {
            let c = px.demultiply();
            let (x, y) = (i as u32 % w, i as u32 / w);
            rgb.put_pixel(x, y, Rgb([c.red(), c.green(), c.blue()]));
            alpha.put_pixel(x, y, Luma([c.alpha()]));
        }
        (rgb, alpha)
    }
}
