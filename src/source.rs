//! Collaborators the engine consumes but does not implement: a page
//! rasterizer and a text-run extractor.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};
use crate::model::StyleFlags;

/// One single-style text run as reported by the extraction layer, in page
/// points with a top-left origin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRun {
    pub text: String,
    /// Font name exactly as embedded, subset prefix included.
    pub font: String,
    pub size: f32,
    #[serde(default)]
    pub flags: StyleFlags,
    #[serde(default)]
    pub color: [u8; 3],
    pub bbox: Rect,
    #[serde(default)]
    pub baseline: Option<Point>,
}

pub trait PageSource {
    /// Pixels of `region` on a zero-based page at `dpi`, or `None` when the
    /// page cannot be rendered.
    fn render_region(&self, page: usize, region: Rect, dpi: f32) -> Option<RgbImage>;

    fn text_runs(&self, _page: usize) -> Vec<SourceRun> {
        Vec::new()
    }
}

/// Source with no pixels and no text; sampling falls back to white.
pub struct BlankSource;

impl PageSource for BlankSource {
    fn render_region(&self, _page: usize, _region: Rect, _dpi: f32) -> Option<RgbImage> {
        None
    }
}
