use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geometry::{BLACK, Point, Rect};

/// Style bits as reported by the text extraction layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleFlags(pub u32);

impl StyleFlags {
    pub const ITALIC: u32 = 2;
    pub const UNDERLINE: u32 = 4;
    pub const BOLD: u32 = 16;

    pub fn empty() -> Self {
        StyleFlags(0)
    }

    pub fn with(self, bit: u32, on: bool) -> Self {
        if on {
            StyleFlags(self.0 | bit)
        } else {
            StyleFlags(self.0 & !bit)
        }
    }

    pub fn bold(self) -> bool {
        self.0 & Self::BOLD != 0
    }

    pub fn italic(self) -> bool {
        self.0 & Self::ITALIC != 0
    }

    pub fn underline(self) -> bool {
        self.0 & Self::UNDERLINE != 0
    }
}

/// Per-edge expansion of the cover patch as fractions of the text box.
/// Negative values shrink the patch inward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchMargins {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl PatchMargins {
    pub fn uniform(fraction: f32) -> Self {
        Self {
            left: fraction,
            right: fraction,
            top: fraction,
            bottom: fraction,
        }
    }

    /// Default margins scaled to the text height: small text gets relatively
    /// generous padding so anti-aliased edges of the original are covered.
    pub fn adaptive(text_box: Rect) -> Self {
        let w = text_box.width();
        let h = text_box.height();
        if w <= 0.0 || h <= 0.0 {
            return Self::default();
        }
        let (v, hz) = if h <= 8.0 {
            ((h * 0.2).max(1.5), (w * 0.05).max(1.5))
        } else if h <= 12.0 {
            ((h * 0.15).max(2.0), (w * 0.04).max(2.0))
        } else {
            ((h * 0.12).max(3.0), (w * 0.03).max(3.0))
        };
        Self {
            left: hz / w,
            right: hz / w,
            top: v / h,
            bottom: v / h,
        }
    }

    pub fn apply(&self, text_box: Rect) -> Rect {
        let w = text_box.width();
        let h = text_box.height();
        Rect::new(
            text_box.x0 - self.left * w,
            text_box.y0 - self.top * h,
            text_box.x1 + self.right * w,
            text_box.y1 + self.bottom * h,
        )
    }
}

fn default_stretch() -> f32 {
    1.0
}

fn default_synthetic_weight() -> f32 {
    150.0
}

fn default_true() -> bool {
    true
}

/// A styled text run drawn above the original page content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub z_index: u64,
    pub text: String,
    /// Resolved family name.
    pub font: String,
    #[serde(default)]
    pub font_file: Option<PathBuf>,
    #[serde(default)]
    pub font_face_index: u32,
    pub size: f32,
    #[serde(default)]
    pub color: [u8; 3],
    #[serde(default)]
    pub flags: StyleFlags,
    #[serde(default = "default_stretch")]
    pub stretch: f32,
    /// Percent added to every advance.
    #[serde(default)]
    pub tracking: f32,
    /// Percent; 100 means no synthetic emphasis.
    #[serde(default = "default_synthetic_weight")]
    pub synthetic_weight: f32,
    #[serde(default)]
    pub underline_weight: Option<f32>,
    /// Distance below the baseline, in points.
    #[serde(default)]
    pub underline_offset: Option<f32>,
    pub height_ratio: f32,
    pub ascent_ratio: f32,
    pub descent_ratio: f32,
    /// Extra space between lines, from the font's line gap.
    #[serde(default)]
    pub line_gap_ratio: f32,
    /// Absolute baseline origin of the first line. `None` centers the block
    /// inside `bbox`.
    #[serde(default)]
    pub baseline: Option<Point>,
    pub bbox: Rect,
    pub original_bbox: Rect,
    #[serde(default)]
    pub patch_margins: PatchMargins,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub flattened: bool,
    #[serde(default)]
    pub hwp_space: bool,
    #[serde(default)]
    pub force_image: bool,
}

impl TextOverlay {
    pub fn new(text: impl Into<String>, font: impl Into<String>, size: f32, bbox: Rect) -> Self {
        Self {
            z_index: 0,
            text: text.into(),
            font: font.into(),
            font_file: None,
            font_face_index: 0,
            size,
            color: BLACK,
            flags: StyleFlags::empty(),
            stretch: 1.0,
            tracking: 0.0,
            synthetic_weight: 150.0,
            underline_weight: None,
            underline_offset: None,
            height_ratio: 1.2,
            ascent_ratio: 0.95,
            descent_ratio: 0.25,
            line_gap_ratio: 0.0,
            baseline: None,
            bbox,
            original_bbox: bbox,
            patch_margins: PatchMargins::adaptive(bbox),
            visible: true,
            flattened: false,
            hwp_space: false,
            force_image: false,
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }

    /// Pending overlays still need to be burned into the document.
    pub fn is_pending(&self) -> bool {
        self.visible && !self.flattened
    }

    pub fn cover_rect(&self) -> Rect {
        self.patch_margins.apply(self.original_bbox)
    }
}

/// Opaque rectangle hiding original content beneath an overlay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackgroundPatch {
    pub rect: Rect,
    /// `None` paints white.
    #[serde(default)]
    pub color: Option<[u8; 3]>,
    /// `z_index` of the owning overlay.
    #[serde(default)]
    pub owner: Option<u64>,
}

impl BackgroundPatch {
    pub fn fill(&self) -> [u8; 3] {
        self.color.unwrap_or(crate::geometry::WHITE)
    }
}

/// Every overlay and patch of a session, keyed by zero-based page index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EditState {
    pub overlays: BTreeMap<usize, Vec<TextOverlay>>,
    pub patches: BTreeMap<usize, Vec<BackgroundPatch>>,
    #[serde(default)]
    pub next_z: u64,
}

impl EditState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_overlay(&mut self, page: usize, mut overlay: TextOverlay) -> u64 {
        let z = self.next_z;
        self.next_z += 1;
        overlay.z_index = z;
        self.overlays.entry(page).or_default().push(overlay);
        z
    }

    pub fn add_patch(&mut self, page: usize, patch: BackgroundPatch) {
        self.patches.entry(page).or_default().push(patch);
    }

    pub fn overlays_on(&self, page: usize) -> &[TextOverlay] {
        self.overlays.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn patches_on(&self, page: usize) -> &[BackgroundPatch] {
        self.patches.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn overlay(&self, z: u64) -> Option<(usize, &TextOverlay)> {
        self.overlays
            .iter()
            .find_map(|(&page, list)| list.iter().find(|o| o.z_index == z).map(|o| (page, o)))
    }

    pub fn overlay_mut(&mut self, z: u64) -> Option<&mut TextOverlay> {
        self.overlays
            .values_mut()
            .flat_map(|list| list.iter_mut())
            .find(|o| o.z_index == z)
    }

    /// Overlay whose original or current box matches `rect` at 0.1pt.
    pub fn find_by_bbox(&self, page: usize, rect: Rect) -> Option<u64> {
        let key = rect.hash_key();
        self.overlays_on(page)
            .iter()
            .rev()
            .find(|o| o.original_bbox.hash_key() == key || o.bbox.hash_key() == key)
            .map(|o| o.z_index)
    }

    /// Removes an overlay together with the patches it owns.
    pub fn remove_overlay(&mut self, z: u64) -> Option<TextOverlay> {
        let (page, idx) = self.overlays.iter().find_map(|(&page, list)| {
            list.iter().position(|o| o.z_index == z).map(|idx| (page, idx))
        })?;
        let removed = self.overlays.get_mut(&page)?.remove(idx);
        if let Some(list) = self.patches.get_mut(&page) {
            list.retain(|p| p.owner != Some(z));
        }
        Some(removed)
    }

    /// Moves an overlay to `bbox`. The baseline travels with the box; the
    /// patches it owns stay where they are, over the page content they hide.
    pub fn move_overlay(&mut self, z: u64, bbox: Rect) -> bool {
        let Some(overlay) = self.overlay_mut(z) else {
            return false;
        };
        let dx = bbox.x0 - overlay.bbox.x0;
        let dy = bbox.y0 - overlay.bbox.y0;
        overlay.bbox = bbox;
        if let Some(b) = overlay.baseline.as_mut() {
            b.x += dx;
            b.y += dy;
        }
        overlay.flattened = false;
        true
    }

    /// Re-derives `next_z` after a restore so new ids never collide.
    pub fn renumber(&mut self) {
        self.next_z = self
            .overlays
            .values()
            .flat_map(|list| list.iter())
            .map(|o| o.z_index + 1)
            .max()
            .unwrap_or(0)
            .max(self.next_z);
    }

    pub fn pending_overlays(&self) -> usize {
        self.overlays
            .values()
            .flat_map(|list| list.iter())
            .filter(|o| o.is_pending())
            .count()
    }
}

/// Patches that should be painted: free-standing ones and those whose owner
/// is still shown.
pub fn live_patches<'a>(
    overlays: &'a [TextOverlay],
    patches: &'a [BackgroundPatch],
) -> impl Iterator<Item = &'a BackgroundPatch> {
    patches.iter().filter(move |p| match p.owner {
        None => true,
        Some(z) => overlays.iter().any(|o| o.z_index == z && o.visible),
    })
}
