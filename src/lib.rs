mod config;
mod editor;
mod error;
pub mod fonts;
mod geometry;
mod history;
pub mod layout;
pub mod messages;
mod metrics;
mod model;
mod patch;
pub mod pdf;
mod preview;
mod raster;
mod session;
mod source;

pub use config::{BackgroundSampling, EngineConfig};
pub use editor::{EditSession, OverlayEdit};
pub use error::{Error, FontResolutionError};
pub use fonts::{FaceInfo, FontCatalog, FontRecord, LoadedFont, MatchStep, ResolvedFont, StandardFont};
pub use geometry::{BLACK, Point, Rect, WHITE, rgb_from_int, rgb_to_int};
pub use history::{EditHistory, EditSnapshot};
pub use layout::{GlyphRun, OverlayLayout, PlacedGlyph, RunStyle, compute_glyph_run, layout_overlay};
pub use messages::{DefaultMessages, MessageLookup};
pub use metrics::{
    MAX_HEIGHT_RATIO, MIN_HEIGHT_RATIO, MetricSource, OverlayMetrics, VerticalRatios, anchor_baseline,
    centered_baseline,
};
pub use model::{BackgroundPatch, EditState, PatchMargins, StyleFlags, TextOverlay, live_patches};
pub use patch::{PatchColorPolicy, PatchColorRequest, SampledColor, cover_rect, resolve_fill_color};
pub use pdf::{
    FlattenMethod, FlattenPass, FlattenProgress, FlattenReport, FlattenWriter, FlattenedOverlay, PageBox,
    PdfDocument,
};
pub use preview::{PreviewFrame, PreviewPlacement, PreviewRenderer};
pub use session::{SessionArchive, SessionState};
pub use source::{BlankSource, PageSource, SourceRun};

use std::path::Path;
use std::time::Instant;

/// Opens `input`, applies `edit` to a fresh session and writes the
/// flattened result to `output`.
pub fn edit_pdf<F>(
    input: &Path,
    output: &Path,
    catalog: &FontCatalog,
    config: &EngineConfig,
    edit: F,
) -> Result<FlattenReport, Error>
where
    F: FnOnce(&mut EditSession<'_>) -> Result<(), Error>,
{
    let t0 = Instant::now();

    let mut session = EditSession::open(input, catalog, config)?;
    let t_open = t0.elapsed();

    edit(&mut session)?;
    let t_edit = t0.elapsed();

    let report = session.save(output, &mut |_| {})?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: open={:.1}ms, edit={:.1}ms, flatten+write={:.1}ms, total={:.1}ms ({} overlays)",
        t_open.as_secs_f64() * 1000.0,
        (t_edit - t_open).as_secs_f64() * 1000.0,
        (t_total - t_edit).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        report.overlays.len(),
    );

    Ok(report)
}
