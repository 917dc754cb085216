use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use crate::error::Error;
use crate::fonts::{FontCatalog, LoadedFont, StandardFont};
use crate::geometry::{Point, Rect};
use crate::model::{StyleFlags, TextOverlay};

pub const MIN_HEIGHT_RATIO: f32 = 0.5;
pub const MAX_HEIGHT_RATIO: f32 = 1.8;

/// Vertical layout ratios as multiples of the point size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VerticalRatios {
    pub height: f32,
    pub ascent: f32,
    pub descent: f32,
    /// Leading added between lines; never part of `height`.
    pub line_gap: f32,
}

/// Cap on the line gap, as a multiple of the point size.
const MAX_LINE_GAP_RATIO: f32 = 0.5;

impl Default for VerticalRatios {
    fn default() -> Self {
        Self {
            height: 1.2,
            ascent: 0.95,
            descent: 0.25,
            line_gap: 0.0,
        }
    }
}

impl VerticalRatios {
    /// Ratios from raw ascent/descent, whatever the font claimed: negatives
    /// and NaN become 0, the sum is clamped to [0.5, 1.8] and ascent and
    /// descent are scaled to add up to it.
    pub fn sanitized(ascent: f32, descent: f32) -> Self {
        let a = if ascent.is_finite() { ascent.max(0.0) } else { 0.0 };
        let d = if descent.is_finite() { descent.max(0.0) } else { 0.0 };
        let sum = a + d;
        if sum <= f32::EPSILON || !sum.is_finite() {
            return Self::default();
        }
        let height = sum.clamp(MIN_HEIGHT_RATIO, MAX_HEIGHT_RATIO);
        let scale = height / sum;
        Self {
            height,
            ascent: a * scale,
            descent: (height - a * scale).max(0.0),
            line_gap: 0.0,
        }
    }

    pub fn with_line_gap(mut self, gap: f32) -> Self {
        self.line_gap = if gap.is_finite() {
            gap.clamp(0.0, MAX_LINE_GAP_RATIO)
        } else {
            0.0
        };
        self
    }

    /// Distance between consecutive baselines, in points.
    pub fn line_pitch(&self, size: f32) -> f32 {
        (self.height + self.line_gap) * size
    }

    /// Rescales so `height` matches a measured glyph-run box.
    pub fn fitted_to(self, reference: Rect, size: f32) -> Self {
        if size <= 0.0 || reference.height() <= 0.0 || self.height <= 0.0 {
            return self;
        }
        let scale = reference.height() / size / self.height;
        Self::sanitized(self.ascent * scale, self.descent * scale).with_line_gap(self.line_gap * scale)
    }

    pub fn apply_to(&self, overlay: &mut TextOverlay) {
        overlay.height_ratio = self.height;
        overlay.ascent_ratio = self.ascent;
        overlay.descent_ratio = self.descent;
        overlay.line_gap_ratio = self.line_gap;
    }

    pub fn of(overlay: &TextOverlay) -> Self {
        Self::sanitized(overlay.ascent_ratio, overlay.descent_ratio).with_line_gap(overlay.line_gap_ratio)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricSource {
    FontFile,
    Estimated,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct MetricsKey {
    font: String,
    flags: u32,
    stretch: u32,
}

/// Memoized vertical metrics. One instance lives as long as the catalog.
pub struct OverlayMetrics<'a> {
    catalog: &'a FontCatalog,
    cache: RefCell<HashMap<MetricsKey, (VerticalRatios, MetricSource)>>,
}

impl<'a> OverlayMetrics<'a> {
    pub fn new(catalog: &'a FontCatalog) -> Self {
        Self {
            catalog,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn compute_ratios(
        &self,
        family: &str,
        font_file: Option<&Path>,
        flags: StyleFlags,
        stretch: f32,
    ) -> VerticalRatios {
        self.lookup(family, font_file, 0, flags, stretch).0
    }

    /// Like `compute_ratios`, but estimated ratios are rescaled to the
    /// height of `reference` (the original glyph run box at `size`).
    pub fn compute_with_reference(
        &self,
        family: &str,
        font_file: Option<&Path>,
        flags: StyleFlags,
        stretch: f32,
        reference: Option<(Rect, f32)>,
    ) -> (VerticalRatios, MetricSource) {
        let (ratios, source) = self.lookup(family, font_file, 0, flags, stretch);
        match (source, reference) {
            (MetricSource::Estimated, Some((rect, size))) => (ratios.fitted_to(rect, size), source),
            _ => (ratios, source),
        }
    }

    pub fn ratios_for(&self, overlay: &TextOverlay) -> VerticalRatios {
        self.lookup(
            &overlay.font,
            overlay.font_file.as_deref(),
            overlay.font_face_index,
            overlay.flags,
            overlay.stretch,
        )
        .0
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.borrow().len()
    }

    fn lookup(
        &self,
        family: &str,
        font_file: Option<&Path>,
        face_index: u32,
        flags: StyleFlags,
        stretch: f32,
    ) -> (VerticalRatios, MetricSource) {
        let key = MetricsKey {
            font: match font_file {
                Some(path) => format!("{}#{}", path.display(), face_index),
                None => format!("family:{}", family.to_lowercase()),
            },
            flags: flags.0,
            stretch: stretch.to_bits(),
        };
        if let Some(hit) = self.cache.borrow().get(&key) {
            return *hit;
        }
        let computed = self.compute(family, font_file, face_index, flags);
        self.cache.borrow_mut().insert(key, computed);
        computed
    }

    fn compute(
        &self,
        family: &str,
        font_file: Option<&Path>,
        face_index: u32,
        flags: StyleFlags,
    ) -> (VerticalRatios, MetricSource) {
        if let Some(path) = font_file {
            match ratios_from_file(path, face_index, family) {
                Ok(r) => return (r, MetricSource::FontFile),
                Err(e) => log::warn!("{}; estimating metrics for {}", e, family),
            }
        }

        let record = self
            .catalog
            .resolve_variant(family, flags.bold(), flags.italic())
            .or_else(|| self.catalog.resolve(family).ok());
        if let Some(rec) = record
            && let Ok(r) = ratios_from_file(&rec.path, rec.face_index, &rec.family)
        {
            return (r, MetricSource::Estimated);
        }

        let standard = LoadedFont::standard(StandardFont::for_family(family));
        let ratios = standard
            .vertical_metrics()
            .map(|(a, d, gap)| VerticalRatios::sanitized(a, d).with_line_gap(gap))
            .unwrap_or_default();
        (ratios, MetricSource::Estimated)
    }
}

fn ratios_from_file(path: &Path, face_index: u32, family: &str) -> Result<VerticalRatios, Error> {
    let font = LoadedFont::open(path, face_index, family)
        .map_err(|e| Error::Metrics(e.to_string()))?;
    let (ascent, descent, line_gap) = font
        .vertical_metrics()
        .ok_or_else(|| Error::Metrics(format!("{}: no usable metrics", path.display())))?;
    if ascent.is_nan() || ascent <= 0.0 {
        return Err(Error::Metrics(format!(
            "{}: ascender {} is not positive",
            path.display(),
            ascent
        )));
    }
    Ok(VerticalRatios::sanitized(ascent, descent).with_line_gap(line_gap))
}

/// Baseline policy. A baseline reported by the source document wins and the
/// ratios are back-computed from it and the run box; without one the
/// overlay keeps the computed ratios and is centered in its box at layout.
pub fn anchor_baseline(overlay: &mut TextOverlay, computed: VerticalRatios, source_baseline: Option<Point>) {
    match source_baseline {
        Some(b) if overlay.size > 0.0 => {
            overlay.baseline = Some(b);
            let ascent = (b.y - overlay.bbox.y0) / overlay.size;
            let descent = (overlay.bbox.y1 - b.y) / overlay.size;
            let derived = VerticalRatios::sanitized(ascent, descent).with_line_gap(computed.line_gap);
            if ascent > 0.0 && descent >= 0.0 {
                derived.apply_to(overlay);
            } else {
                computed.apply_to(overlay);
            }
        }
        _ => {
            overlay.baseline = None;
            computed.apply_to(overlay);
        }
    }
}

/// First baseline of a block of `lines` lines centered vertically in `bbox`.
pub fn centered_baseline(bbox: Rect, ratios: VerticalRatios, size: f32, lines: usize) -> f32 {
    let lines = lines.max(1) as f32;
    let block = ratios.height * size * lines + ratios.line_gap * size * (lines - 1.0);
    let top = bbox.y0 + (bbox.height() - block) / 2.0;
    top + ratios.ascent * size
}
