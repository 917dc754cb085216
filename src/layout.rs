//! Glyph placement shared by the preview and the flatten writer. Both call
//! into here with the same overlay and get the same advances back; neither
//! keeps its own copy of the arithmetic.

use std::collections::BTreeSet;

use crate::config::EngineConfig;
use crate::fonts::LoadedFont;
use crate::fonts::names::{denotes_bold, denotes_italic};
use crate::geometry::{Point, Rect};
use crate::metrics::{VerticalRatios, centered_baseline};
use crate::model::{StyleFlags, TextOverlay};

/// Cap on synthetic bold passes for very large text.
const MAX_BOLD_PASSES: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunStyle {
    pub size: f32,
    pub stretch: f32,
    /// Percent added to every advance.
    pub tracking: f32,
    /// Space multiplier when HWP space mode is on.
    pub hwp_space: Option<f32>,
}

impl RunStyle {
    pub fn plain(size: f32) -> Self {
        Self {
            size,
            stretch: 1.0,
            tracking: 0.0,
            hwp_space: None,
        }
    }

    pub fn of(overlay: &TextOverlay, config: &EngineConfig) -> Self {
        Self {
            size: overlay.size,
            stretch: overlay.stretch,
            tracking: overlay.tracking,
            hwp_space: overlay.hwp_space.then_some(config.hwp_space_factor),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacedGlyph {
    pub ch: char,
    /// Distance from the line origin, in points.
    pub x_offset: f32,
    pub advance: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GlyphRun {
    pub glyphs: Vec<PlacedGlyph>,
    pub total_advance: f32,
}

/// Rounds a length in points to `precision` units per point.
pub fn quantize(value: f32, precision: f32) -> f32 {
    if precision > 0.0 {
        (value * precision).round() / precision
    } else {
        value
    }
}

/// Places every char of a single-style line. Each advance is the face's
/// natural advance at `style.size`, measured at `precision` units per point,
/// then multiplied by stretch and `1 + tracking / 100`.
pub fn compute_glyph_run(text: &str, font: &LoadedFont, style: &RunStyle, precision: f32) -> GlyphRun {
    let natural = font.advances_1000(text);
    let factor = style.stretch * (1.0 + style.tracking / 100.0);
    let mut glyphs = Vec::with_capacity(natural.len());
    let mut x = 0.0f32;
    for (ch, mut adv_1000) in text.chars().zip(natural) {
        if ch == ' '
            && let Some(space_factor) = style.hwp_space
        {
            adv_1000 *= space_factor;
        }
        let advance = quantize(adv_1000 * style.size / 1000.0, precision) * factor;
        glyphs.push(PlacedGlyph {
            ch,
            x_offset: x,
            advance,
        });
        x += advance;
    }
    GlyphRun {
        glyphs,
        total_advance: x,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EffectiveStyle {
    pub synthetic_bold: bool,
    pub synthetic_italic: bool,
}

/// Synthetic emphasis is only used when the face itself is not already the
/// requested cut, judged by its file name.
pub fn effective_style(flags: StyleFlags, font_file_name: &str) -> EffectiveStyle {
    EffectiveStyle {
        synthetic_bold: flags.bold() && !denotes_bold(font_file_name),
        synthetic_italic: flags.italic() && !denotes_italic(font_file_name),
    }
}

/// Horizontal offsets of the repeated draws that fake a bold weight.
/// A single `0.0` means one ordinary draw.
pub fn synthetic_bold_offsets(weight: f32, size: f32, config: &EngineConfig) -> Vec<f32> {
    let range = (weight - 100.0) / 100.0 * config.synthetic_bold_spread * size;
    let step = config.synthetic_bold_step;
    if !(range.is_finite() && step > 0.0 && range >= step) {
        return vec![0.0];
    }
    let mut passes = (range / step).floor() as usize;
    let mut step = step;
    if passes > MAX_BOLD_PASSES {
        step = range / MAX_BOLD_PASSES as f32;
        passes = MAX_BOLD_PASSES;
    }
    (0..=passes).map(|i| i as f32 * step).collect()
}

/// Filled bar under one line, in page points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnderlineBar {
    pub x0: f32,
    pub x1: f32,
    /// Center of the bar.
    pub y: f32,
    pub thickness: f32,
}

impl UnderlineBar {
    pub fn rect(&self) -> Rect {
        Rect::new(
            self.x0,
            self.y - self.thickness / 2.0,
            self.x1,
            self.y + self.thickness / 2.0,
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LineLayout {
    pub text: String,
    pub run: GlyphRun,
    /// Baseline start in page points.
    pub origin: Point,
}

/// Everything either renderer needs to draw one overlay.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayLayout {
    pub size: f32,
    pub stretch: f32,
    pub color: [u8; 3],
    pub style: EffectiveStyle,
    /// x shift per point above the baseline; 0 unless synthetic italic.
    pub skew: f32,
    pub bold_offsets: Vec<f32>,
    pub lines: Vec<LineLayout>,
    pub underlines: Vec<UnderlineBar>,
    pub ascent: f32,
    pub descent: f32,
}

impl OverlayLayout {
    pub fn line_widths(&self) -> Vec<f32> {
        self.lines.iter().map(|l| l.run.total_advance).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|l| l.text.trim().is_empty())
    }

    /// Number of glyph fill passes per line.
    pub fn draw_passes(&self) -> usize {
        self.bold_offsets.len()
    }

    pub fn used_chars(&self) -> BTreeSet<char> {
        self.lines.iter().flat_map(|l| l.text.chars()).collect()
    }

    /// Box covering every glyph, bold pass and shear, without decorations.
    pub fn ink_bounds(&self) -> Rect {
        let spread = self.bold_offsets.last().copied().unwrap_or(0.0);
        let lean = self.skew.abs() * self.ascent;
        let tail = self.skew.abs() * self.descent;
        let mut bounds: Option<Rect> = None;
        for line in &self.lines {
            let r = Rect::new(
                line.origin.x - tail,
                line.origin.y - self.ascent,
                line.origin.x + line.run.total_advance + spread + lean,
                line.origin.y + self.descent,
            );
            bounds = Some(bounds.map_or(r, |b| b.union(&r)));
        }
        bounds.unwrap_or_default()
    }
}

/// Lays out every line of an overlay. `precision` is the measuring
/// resolution in units per point of the calling renderer.
pub fn layout_overlay(
    overlay: &TextOverlay,
    font: &LoadedFont,
    precision: f32,
    config: &EngineConfig,
) -> OverlayLayout {
    let ratios = VerticalRatios::of(overlay);
    let size = overlay.size;
    let style = effective_style(overlay.flags, font.file_name());
    let run_style = RunStyle::of(overlay, config);
    let line_count = overlay.lines().count();

    let (origin_x, first_baseline) = match overlay.baseline {
        Some(b) => (b.x, b.y),
        None => (
            overlay.bbox.x0,
            centered_baseline(overlay.bbox, ratios, size, line_count),
        ),
    };
    let pitch = ratios.line_pitch(size);

    let lines: Vec<LineLayout> = overlay
        .lines()
        .enumerate()
        .map(|(i, text)| LineLayout {
            text: text.to_string(),
            run: compute_glyph_run(text, font, &run_style, precision),
            origin: Point::new(origin_x, first_baseline + i as f32 * pitch),
        })
        .collect();

    let underlines = if overlay.flags.underline() {
        let (font_offset, font_thickness) = font
            .underline_metrics()
            .map(|(o, t)| (o * size, t * size))
            .unwrap_or((size * 0.12, size * 0.05));
        let offset = overlay.underline_offset.unwrap_or(font_offset);
        let thickness = overlay
            .underline_weight
            .unwrap_or(font_thickness)
            .max(0.5);
        lines
            .iter()
            .filter(|l| l.run.total_advance > 0.0)
            .map(|l| UnderlineBar {
                x0: l.origin.x,
                x1: l.origin.x + l.run.total_advance,
                y: l.origin.y + offset,
                thickness,
            })
            .collect()
    } else {
        Vec::new()
    };

    OverlayLayout {
        size,
        stretch: overlay.stretch,
        color: overlay.color,
        style,
        skew: if style.synthetic_italic {
            config.synthetic_italic_skew
        } else {
            0.0
        },
        bold_offsets: if style.synthetic_bold {
            synthetic_bold_offsets(overlay.synthetic_weight, size, config)
        } else {
            vec![0.0]
        },
        lines,
        underlines,
        ascent: ratios.ascent * size,
        descent: ratios.descent * size,
    }
}
