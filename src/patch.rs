use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::BackgroundSampling;
use crate::geometry::{Rect, WHITE, brightness};
use crate::model::PatchMargins;
use crate::source::PageSource;

/// Outcome of sampling the surroundings of a text box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampledColor {
    pub color: [u8; 3],
    /// Share of the weighted sample backing `color`, in `0.0..=1.0`.
    pub confidence: f32,
    /// `false` when the white fallback was used.
    pub sampled: bool,
}

impl SampledColor {
    fn white(confidence: f32) -> Self {
        Self {
            color: WHITE,
            confidence,
            sampled: false,
        }
    }
}

struct Band {
    rect: Rect,
    weight: f32,
}

/// Thin strips just outside `region`, clipped to the page.
fn sample_bands(region: Rect, page_rect: Rect) -> Vec<Band> {
    let h_margin = (region.width() * 0.01).clamp(1.0, 2.0);
    let v_margin = (region.height() * 0.015).clamp(1.0, 2.0);
    let candidates = [
        (Rect::new(region.x0, region.y0 - v_margin, region.x1, region.y0), 1.2),
        (Rect::new(region.x0, region.y1, region.x1, region.y1 + v_margin), 1.2),
        (Rect::new(region.x0 - h_margin, region.y0, region.x0, region.y1), 1.0),
        (Rect::new(region.x1, region.y0, region.x1 + h_margin, region.y1), 1.0),
    ];
    candidates
        .into_iter()
        .filter_map(|(rect, weight)| {
            let clipped = rect.intersect(&page_rect)?;
            (clipped.area() >= 0.5).then_some(Band {
                rect: clipped,
                weight,
            })
        })
        .collect()
}

/// Picks a fill colour for a patch over `region` from the pixels around it.
///
/// Near-black and near-white pixels are noise (text edges, paper). The most
/// frequent remaining colour wins when it is common enough; anything else
/// gives white.
pub fn resolve_fill_color(
    source: &dyn PageSource,
    page: usize,
    region: Rect,
    page_rect: Rect,
    sampling: &BackgroundSampling,
) -> SampledColor {
    let mut tally: HashMap<[u8; 3], (f32, usize)> = HashMap::new();
    let mut total_weight = 0.0f32;
    let mut near_white = 0.0f32;
    let mut kept_weight = 0.0f32;
    let mut valid_bands = 0;

    for band in sample_bands(region, page_rect) {
        let Some(pixels) = source.render_region(page, band.rect, sampling.dpi) else {
            continue;
        };
        let mut kept = 0;
        for px in pixels.pixels() {
            let rgb = [px[0], px[1], px[2]];
            let level = brightness(rgb);
            total_weight += band.weight;
            if level > sampling.light_cutoff {
                near_white += band.weight;
                continue;
            }
            if level < sampling.dark_cutoff {
                continue;
            }
            let entry = tally.entry(rgb).or_insert((0.0, 0));
            entry.0 += band.weight;
            entry.1 += 1;
            kept_weight += band.weight;
            kept += 1;
        }
        if kept > 0 {
            valid_bands += 1;
        }
    }

    let fallback_confidence = if total_weight > 0.0 {
        near_white / total_weight
    } else {
        0.0
    };
    if valid_bands < 2 || kept_weight <= 0.0 {
        return SampledColor::white(fallback_confidence);
    }

    // Ties go to the brighter colour so the result does not depend on
    // hash order.
    let Some((&color, &(weight, raw))) = tally.iter().max_by(|a, b| {
        a.1.0
            .total_cmp(&b.1.0)
            .then_with(|| brightness(*a.0).cmp(&brightness(*b.0)))
            .then_with(|| a.0.cmp(b.0))
    }) else {
        return SampledColor::white(fallback_confidence);
    };
    let share = weight / kept_weight;
    if share >= sampling.min_share && raw >= sampling.min_pixels {
        log::debug!("Patch colour {:?} at {:.0}% from {} bands", color, share * 100.0, valid_bands);
        SampledColor {
            color,
            confidence: share,
            sampled: true,
        }
    } else {
        SampledColor::white(fallback_confidence)
    }
}

/// Region a patch must cover to hide the original text of `text_box`.
/// Band mode spans the full page width.
pub fn cover_rect(text_box: Rect, margins: &PatchMargins, band: bool, page_rect: Rect) -> Rect {
    let mut rect = margins.apply(text_box);
    if band {
        rect.x0 = page_rect.x0;
        rect.x1 = page_rect.x1;
    }
    rect.intersect(&page_rect).unwrap_or(text_box)
}

/// What the caller asked for when creating a patch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchColorRequest {
    /// A user pick; it becomes the default for later edits.
    Explicit([u8; 3]),
    /// Sample the page and forget any remembered pick.
    Auto,
    /// The remembered pick if there is one, else sample.
    #[default]
    SessionDefault,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchColorPolicy {
    remembered: Option<[u8; 3]>,
}

impl PatchColorPolicy {
    pub fn remembered(&self) -> Option<[u8; 3]> {
        self.remembered
    }

    pub fn choose(
        &mut self,
        request: PatchColorRequest,
        sample: impl FnOnce() -> SampledColor,
    ) -> [u8; 3] {
        match request {
            PatchColorRequest::Explicit(color) => {
                self.remembered = Some(color);
                color
            }
            PatchColorRequest::Auto => {
                self.remembered = None;
                sample().color
            }
            PatchColorRequest::SessionDefault => match self.remembered {
                Some(color) => color,
                None => sample().color,
            },
        }
    }
}
