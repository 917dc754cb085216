mod common;

use common::{FramedSource, UniformSource};
use image::{Rgb, RgbImage};
use retext_pdf::{
    BackgroundSampling, EditSession, OverlayEdit, PageSource, PatchColorPolicy, PatchColorRequest, PatchMargins,
    Rect, SampledColor, cover_rect, resolve_fill_color,
};

const PAGE: Rect = Rect {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

fn text_box() -> Rect {
    Rect::new(100.0, 200.0, 260.0, 214.0)
}

/// Every pixel a different colour, so no colour is ever dominant.
struct NoiseSource;

impl PageSource for NoiseSource {
    fn render_region(&self, _page: usize, region: Rect, dpi: f32) -> Option<RgbImage> {
        let scale = dpi / 72.0;
        let w = (region.width() * scale).ceil().max(1.0) as u32;
        let h = (region.height() * scale).ceil().max(1.0) as u32;
        Some(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x % 200 + 20) as u8, (y % 200 + 20) as u8, ((x / 200) * 40 + 60) as u8])
        }))
    }
}

#[test]
fn white_paper_gives_confident_white() {
    let sampled = resolve_fill_color(
        &UniformSource([255, 255, 255]),
        0,
        text_box(),
        PAGE,
        &BackgroundSampling::default(),
    );
    assert_eq!(sampled.color, [255, 255, 255]);
    assert!(!sampled.sampled);
    assert!(sampled.confidence >= 0.4, "confidence {}", sampled.confidence);
}

#[test]
fn tinted_background_is_sampled() {
    let tint = [200, 220, 250];
    let sampled = resolve_fill_color(
        &UniformSource(tint),
        0,
        text_box(),
        PAGE,
        &BackgroundSampling::default(),
    );
    assert_eq!(
        sampled,
        SampledColor {
            color: tint,
            confidence: 1.0,
            sampled: true,
        }
    );
}

#[test]
fn shaded_cell_around_the_run_wins() {
    let source = FramedSource {
        rect: Rect::new(90.0, 190.0, 270.0, 224.0),
        inner: [255, 240, 200],
        outer: [255, 255, 255],
    };
    let sampled = resolve_fill_color(&source, 0, text_box(), PAGE, &BackgroundSampling::default());
    assert!(sampled.sampled);
    assert_eq!(sampled.color, [255, 240, 200]);
}

#[test]
fn ink_only_surroundings_fall_back_to_white() {
    let sampled = resolve_fill_color(
        &UniformSource([0, 0, 0]),
        0,
        text_box(),
        PAGE,
        &BackgroundSampling::default(),
    );
    assert_eq!(sampled.color, [255, 255, 255]);
    assert!(!sampled.sampled);
    assert_eq!(sampled.confidence, 0.0);
}

#[test]
fn no_dominant_colour_falls_back_to_white() {
    let sampled = resolve_fill_color(&NoiseSource, 0, text_box(), PAGE, &BackgroundSampling::default());
    assert_eq!(sampled.color, [255, 255, 255]);
    assert!(!sampled.sampled);
}

#[test]
fn bands_off_the_page_are_skipped() {
    let corner = Rect::new(0.0, 0.0, 80.0, 12.0);
    let sampled = resolve_fill_color(
        &UniformSource([180, 200, 180]),
        0,
        corner,
        PAGE,
        &BackgroundSampling::default(),
    );
    assert!(sampled.sampled);
    assert_eq!(sampled.color, [180, 200, 180]);
}

#[test]
fn unrenderable_page_gives_white() {
    let sampled = resolve_fill_color(
        &retext_pdf::BlankSource,
        0,
        text_box(),
        PAGE,
        &BackgroundSampling::default(),
    );
    assert_eq!(sampled.color, [255, 255, 255]);
    assert_eq!(sampled.confidence, 0.0);
}

#[test]
fn cover_rect_band_mode_spans_the_page() {
    let margins = PatchMargins::uniform(0.1);
    let plain = cover_rect(text_box(), &margins, false, PAGE);
    let expected = Rect::new(84.0, 198.6, 276.0, 215.4);
    for (got, want) in [
        (plain.x0, expected.x0),
        (plain.y0, expected.y0),
        (plain.x1, expected.x1),
        (plain.y1, expected.y1),
    ] {
        assert!((got - want).abs() < 1e-3, "{:?}", plain);
    }

    let band = cover_rect(text_box(), &margins, true, PAGE);
    assert_eq!((band.x0, band.x1), (0.0, 612.0));
    assert_eq!((band.y0, band.y1), (plain.y0, plain.y1));

    let edge = cover_rect(Rect::new(-10.0, 780.0, 50.0, 800.0), &margins, false, PAGE);
    assert_eq!((edge.x0, edge.y1), (0.0, 792.0));
}

#[test]
fn explicit_colour_becomes_the_session_default() {
    let mut policy = PatchColorPolicy::default();
    let sample = || SampledColor {
        color: [10, 20, 30],
        confidence: 1.0,
        sampled: true,
    };
    assert_eq!(policy.choose(PatchColorRequest::SessionDefault, sample), [10, 20, 30]);

    assert_eq!(policy.choose(PatchColorRequest::Explicit([250, 250, 200]), sample), [250, 250, 200]);
    assert_eq!(policy.remembered(), Some([250, 250, 200]));
    assert_eq!(
        policy.choose(PatchColorRequest::SessionDefault, || panic!("remembered colour must be used")),
        [250, 250, 200]
    );

    assert_eq!(policy.choose(PatchColorRequest::Auto, sample), [10, 20, 30]);
    assert_eq!(policy.remembered(), None);
}

#[test]
fn edited_run_gets_a_patch_in_the_background_colour() {
    common::init_logging();
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(1), &catalog, &config)
        .unwrap()
        .with_source(Box::new(UniformSource([230, 240, 255])));

    let run = common::run("Original text 1", "ABCDEF+ArialMT", 12.0, Rect::new(72.0, 80.0, 160.0, 94.0));
    let z = session.edit_text_run(0, &run, OverlayEdit::text("Edited")).unwrap();
    let patch = &session.state().patches_on(0)[0];
    assert_eq!(patch.owner, Some(z));
    assert_eq!(patch.color, Some([230, 240, 255]));
    assert!(patch.rect.x0 <= run.bbox.x0 && patch.rect.x1 >= run.bbox.x1);

    let picked = OverlayEdit {
        patch_color: PatchColorRequest::Explicit([255, 255, 0]),
        ..OverlayEdit::text("Another")
    };
    let second = common::run("Other", "Arial", 12.0, Rect::new(72.0, 120.0, 120.0, 134.0));
    session.edit_text_run(0, &second, picked).unwrap();
    let third = common::run("Third", "Arial", 12.0, Rect::new(72.0, 160.0, 120.0, 174.0));
    session.edit_text_run(0, &third, OverlayEdit::text("x")).unwrap();

    let colors: Vec<_> = session.state().patches_on(0).iter().map(|p| p.color).collect();
    assert_eq!(
        colors,
        vec![Some([230, 240, 255]), Some([255, 255, 0]), Some([255, 255, 0])]
    );
    assert_eq!(session.patch_policy().remembered(), Some([255, 255, 0]));
}
