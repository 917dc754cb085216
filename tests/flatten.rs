mod common;

use lopdf::Object;
use retext_pdf::{
    EditSession, Error, FlattenMethod, FlattenPass, FontCatalog, OverlayEdit, PdfDocument, Rect, edit_pdf,
};

/// Decoded bytes of every content stream of `page`, in drawing order.
fn page_streams(doc: &PdfDocument, page: usize) -> Vec<Vec<u8>> {
    let inner = doc.inner();
    let page_id = *inner.get_pages().values().nth(page).expect("page exists");
    inner
        .get_page_contents(page_id)
        .into_iter()
        .map(|id| {
            let stream = inner.get_object(id).and_then(Object::as_stream).expect("content stream");
            stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone())
        })
        .collect()
}

fn contains(haystack: &[u8], needle: &str) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle.as_bytes())
}

fn underlined(text: &str) -> OverlayEdit {
    OverlayEdit {
        underline: Some(true),
        ..OverlayEdit::text(text)
    }
}

#[test]
fn patches_text_and_decorations_land_in_separate_streams() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let out = common::temp_output(&dir, "out.pdf");
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(1), &catalog, &config).unwrap();

    let run = common::run("Original text 1", "Arial", 12.0, Rect::new(72.0, 80.0, 160.0, 94.0));
    let z = session.edit_text_run(0, &run, underlined("Replaced")).unwrap();

    let mut passes = Vec::new();
    let report = session
        .save(&out, &mut |p| passes.push((p.pass, p.done, p.total)))
        .unwrap();
    assert_eq!(
        passes,
        vec![
            (FlattenPass::Patches, 1, 3),
            (FlattenPass::Text, 2, 3),
            (FlattenPass::Decorations, 3, 3),
        ]
    );
    assert_eq!(report.pages, vec![0]);
    assert_eq!(report.patches_painted, 1);
    assert_eq!(report.overlay(z).unwrap().method, FlattenMethod::StandardFont);

    let written = PdfDocument::open(&out).unwrap();
    let streams = page_streams(&written, 0);
    assert_eq!(streams.len(), 6);
    assert_eq!(written.content_stream_count(0).unwrap(), 6);
    assert!(contains(&streams[0], "q"));
    assert!(contains(&streams[1], "Original text 1"));
    assert!(contains(&streams[2], "Q"));
    assert!(contains(&streams[3], "re") && !contains(&streams[3], "BT"));
    assert!(contains(&streams[4], "BT") && contains(&streams[4], "Tm"));
    assert!(contains(&streams[5], "re") && !contains(&streams[5], "BT"));
}

#[test]
fn saving_marks_overlays_flattened_and_drops_painted_patches() {
    let dir = tempfile::tempdir().unwrap();
    let out = common::temp_output(&dir, "out.pdf");
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(2), &catalog, &config).unwrap();

    let run = common::run("Original text 2", "Arial", 12.0, Rect::new(72.0, 80.0, 160.0, 94.0));
    let z = session.edit_text_run(1, &run, OverlayEdit::text("Changed")).unwrap();
    let before = session.history().undo_len();
    let original_bytes = session.document_bytes().to_vec();

    let report = session.save(&out, &mut |_| {}).unwrap();
    assert_eq!(report.pages, vec![1]);
    assert!(session.state().overlay(z).unwrap().1.flattened);
    assert!(session.state().patches_on(1).is_empty());
    assert_eq!(session.state().pending_overlays(), 0);
    assert_ne!(session.document_bytes(), original_bytes.as_slice());
    assert_eq!(session.history().undo_len(), before + 1);
    assert_eq!(std::fs::read(&out).unwrap(), session.document_bytes());

    let written = PdfDocument::open(&out).unwrap();
    assert_eq!(written.content_stream_count(0).unwrap(), 1);

    // Nothing pending: a second save writes the document unchanged.
    let again = session.save(&out, &mut |_| {}).unwrap();
    assert!(again.overlays.is_empty());
    assert!(again.pages.is_empty());
    assert_eq!(PdfDocument::open(&out).unwrap().content_stream_count(1).unwrap(), 5);
}

#[test]
fn failed_write_leaves_the_session_untouched() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("missing").join("out.pdf");
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(1), &catalog, &config).unwrap();

    let run = common::run("Original text 1", "Arial", 12.0, Rect::new(72.0, 80.0, 160.0, 94.0));
    session.edit_text_run(0, &run, OverlayEdit::text("Changed")).unwrap();
    let state = session.state().clone();
    let bytes = session.document_bytes().to_vec();
    let undo_len = session.history().undo_len();

    let err = session.save(&out, &mut |_| {}).unwrap_err();
    assert!(matches!(err, Error::Write { .. }), "{}", err);
    assert_eq!(session.state(), &state);
    assert_eq!(session.document_bytes(), bytes.as_slice());
    assert_eq!(session.history().undo_len(), undo_len);
    assert_eq!(session.document().content_stream_count(0).unwrap(), 1);
    assert!(!out.exists());
}

#[test]
fn hidden_overlays_and_their_patches_are_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let out = common::temp_output(&dir, "out.pdf");
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(1), &catalog, &config).unwrap();

    let run = common::run("Original text 1", "Arial", 12.0, Rect::new(72.0, 80.0, 160.0, 94.0));
    let z = session.edit_text_run(0, &run, OverlayEdit::text("Hidden")).unwrap();
    session.set_visible(z, false).unwrap();

    let report = session.save(&out, &mut |_| {}).unwrap();
    assert!(report.overlays.is_empty());
    assert_eq!(report.patches_painted, 0);
    assert!(!session.state().overlay(z).unwrap().1.flattened);
    assert_eq!(session.state().patches_on(0).len(), 1);
}

#[test]
fn editing_flattened_text_adds_a_new_cover() {
    let dir = tempfile::tempdir().unwrap();
    let out = common::temp_output(&dir, "out.pdf");
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(1), &catalog, &config).unwrap();

    let run = common::run("Original text 1", "Arial", 12.0, Rect::new(72.0, 80.0, 160.0, 94.0));
    let z = session.edit_text_run(0, &run, OverlayEdit::text("First")).unwrap();
    session.save(&out, &mut |_| {}).unwrap();

    let again = session.edit_text_run(0, &run, OverlayEdit::text("Second")).unwrap();
    assert_eq!(again, z);
    let overlay = session.state().overlay(z).unwrap().1;
    assert_eq!(overlay.text, "Second");
    assert!(!overlay.flattened);
    assert_eq!(session.state().patches_on(0).len(), 1);
}

#[test]
fn moving_flattened_text_covers_the_old_place() {
    let dir = tempfile::tempdir().unwrap();
    let out = common::temp_output(&dir, "out.pdf");
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(1), &catalog, &config).unwrap();

    let run = common::run("Original text 1", "Arial", 12.0, Rect::new(72.0, 80.0, 160.0, 94.0));
    let z = session.edit_text_run(0, &run, OverlayEdit::text("Burned in")).unwrap();
    session.save(&out, &mut |_| {}).unwrap();
    let old_box = session.state().overlay(z).unwrap().1.bbox;
    assert!(session.state().patches_on(0).is_empty());

    let new_box = Rect::new(72.0, 400.0, 160.0, 414.0);
    session.move_overlay(z, new_box).unwrap();
    let overlay = session.state().overlay(z).unwrap().1;
    assert_eq!(overlay.bbox, new_box);
    assert!(!overlay.flattened);
    let patches = session.state().patches_on(0);
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].owner, Some(z));
    assert_eq!(patches[0].rect.union(&old_box), patches[0].rect);
    assert!(patches[0].rect.intersect(&new_box).is_none());
    let cover = patches[0].rect;

    // A second move leaves the cover over the burned copy.
    session.move_overlay(z, new_box.translate(0.0, 40.0)).unwrap();
    let patches = session.state().patches_on(0);
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].rect, cover);

    let report = session.save(&out, &mut |_| {}).unwrap();
    assert_eq!(report.patches_painted, 1);
    assert_eq!(report.overlays.len(), 1);
    assert_eq!(report.overlay(z).unwrap().method, FlattenMethod::StandardFont);
}

#[test]
fn moving_pending_text_adds_no_patch() {
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(1), &catalog, &config).unwrap();

    let run = common::run("Original text 1", "Arial", 12.0, Rect::new(72.0, 80.0, 160.0, 94.0));
    let z = session.edit_text_run(0, &run, OverlayEdit::text("Not saved yet")).unwrap();
    let cover = session.state().patches_on(0)[0].clone();
    session.move_overlay(z, Rect::new(200.0, 80.0, 288.0, 94.0)).unwrap();
    assert_eq!(session.state().patches_on(0), &[cover]);
    assert!(matches!(session.move_overlay(99, Rect::default()), Err(Error::UnknownOverlay(99))));
}

#[test]
fn drawn_region_hides_what_lies_beneath() {
    let dir = tempfile::tempdir().unwrap();
    let out = common::temp_output(&dir, "out.pdf");
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(1), &catalog, &config).unwrap();

    let bbox = Rect::new(72.0, 76.0, 200.0, 98.0);
    let z = session
        .add_text_region(0, bbox, "Stamped over", "Arial", 12.0, OverlayEdit::default())
        .unwrap();
    let patches = session.state().patches_on(0);
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].owner, Some(z));
    assert_eq!(patches[0].rect.union(&bbox), patches[0].rect);

    let report = session.save(&out, &mut |_| {}).unwrap();
    assert_eq!(report.patches_painted, 1);
    let streams = page_streams(&PdfDocument::open(&out).unwrap(), 0);
    assert!(streams.iter().any(|s| contains(s, "re") && !contains(s, "BT")));
}

#[test]
fn font_that_forbids_subsetting_is_embedded_whole() {
    common::init_logging();
    let Some((face, _)) = common::system_font() else {
        eprintln!("no system font with outlines, skipping");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let face = common::font_with_fs_type(&dir, &face, 0x0100);
    let out = common::temp_output(&dir, "out.pdf");
    let catalog = FontCatalog::from_faces(vec![face.clone()]);
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(1), &catalog, &config).unwrap();

    let z = session
        .add_text_region(
            0,
            Rect::new(72.0, 300.0, 300.0, 320.0),
            "Whole font",
            &face.family,
            12.0,
            OverlayEdit::default(),
        )
        .unwrap();
    let report = session.save(&out, &mut |_| {}).unwrap();
    let flattened = report.overlay(z).unwrap();
    assert_eq!(flattened.method, FlattenMethod::EmbeddedFontRetry);
    assert_eq!(flattened.fallback_reasons.len(), 1);
    assert!(flattened.fallback_reasons[0].contains("subsetting"), "{:?}", flattened.fallback_reasons);
    assert!(contains(&std::fs::read(&out).unwrap(), "/FontFile2"));
}

#[test]
fn font_that_forbids_embedding_is_rasterized() {
    common::init_logging();
    let Some((face, _)) = common::system_font() else {
        eprintln!("no system font with outlines, skipping");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let face = common::font_with_fs_type(&dir, &face, 0x0002);
    let out = common::temp_output(&dir, "out.pdf");
    let catalog = FontCatalog::from_faces(vec![face.clone()]);
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(1), &catalog, &config).unwrap();

    let z = session
        .add_text_region(
            0,
            Rect::new(72.0, 300.0, 300.0, 320.0),
            "Licensed",
            &face.family,
            12.0,
            OverlayEdit::default(),
        )
        .unwrap();
    let report = session.save(&out, &mut |_| {}).unwrap();
    let flattened = report.overlay(z).unwrap();
    assert_eq!(flattened.method, FlattenMethod::Raster);
    assert_eq!(flattened.glyph_draws, 8);
    assert_eq!(flattened.fallback_reasons.len(), 2);
    for reason in &flattened.fallback_reasons {
        assert!(reason.contains("forbids embedding"), "{}", reason);
    }
    let bytes = std::fs::read(&out).unwrap();
    assert!(contains(&bytes, "/SMask"));
    assert!(!contains(&bytes, "/FontFile2"));
}

#[test]
fn font_without_outlines_ends_in_helvetica() {
    common::init_logging();
    let Some((face, _)) = common::system_font() else {
        eprintln!("no system font with outlines, skipping");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let face = common::font_without_glyf(&dir, &face);
    let out = common::temp_output(&dir, "out.pdf");
    let catalog = FontCatalog::from_faces(vec![face.clone()]);
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(1), &catalog, &config).unwrap();

    let z = session
        .add_text_region(
            0,
            Rect::new(72.0, 300.0, 300.0, 320.0),
            "Last resort",
            &face.family,
            12.0,
            OverlayEdit::default(),
        )
        .unwrap();
    let report = session.save(&out, &mut |_| {}).unwrap();
    let flattened = report.overlay(z).unwrap();
    assert_eq!(flattened.method, FlattenMethod::StandardFont);
    assert_eq!(flattened.glyph_draws, 10);
    let reasons = &flattened.fallback_reasons;
    assert_eq!(reasons.len(), 3, "{:?}", reasons);
    assert!(reasons[0].contains("glyf"));
    assert!(reasons[1].contains("glyf"));
    assert!(reasons[2].contains("no outlines"));
    assert!(contains(&std::fs::read(&out).unwrap(), "/Helvetica"));
}

#[test]
fn forced_image_without_outlines_uses_a_base_font() {
    let dir = tempfile::tempdir().unwrap();
    let out = common::temp_output(&dir, "out.pdf");
    let catalog = FontCatalog::from_faces(Vec::new());
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(1), &catalog, &config).unwrap();

    let edit = OverlayEdit {
        force_image: Some(true),
        ..OverlayEdit::default()
    };
    let z = session
        .add_text_region(0, Rect::new(72.0, 300.0, 300.0, 320.0), "As image", "Helvetica", 12.0, edit)
        .unwrap();
    let report = session.save(&out, &mut |_| {}).unwrap();
    let flattened = report.overlay(z).unwrap();
    assert_eq!(flattened.method, FlattenMethod::StandardFont);
    assert_eq!(flattened.glyph_draws, 7);
}

#[test]
fn system_font_is_embedded_or_rasterized_on_request() {
    common::init_logging();
    let Some((face, _)) = common::system_font() else {
        eprintln!("no system font with outlines, skipping");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let out = common::temp_output(&dir, "out.pdf");
    let catalog = FontCatalog::from_faces(vec![face.clone()]);
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(1), &catalog, &config).unwrap();

    let embedded = session
        .add_text_region(
            0,
            Rect::new(72.0, 300.0, 300.0, 320.0),
            "Embedded",
            &face.family,
            12.0,
            OverlayEdit::default(),
        )
        .unwrap();
    let forced = OverlayEdit {
        force_image: Some(true),
        ..OverlayEdit::default()
    };
    let raster = session
        .add_text_region(0, Rect::new(72.0, 340.0, 300.0, 360.0), "Bitmap", &face.family, 12.0, forced)
        .unwrap();

    let report = session.save(&out, &mut |_| {}).unwrap();
    assert!(matches!(
        report.overlay(embedded).unwrap().method,
        FlattenMethod::EmbeddedFont | FlattenMethod::EmbeddedFontRetry
    ));
    let rasterized = report.overlay(raster).unwrap();
    assert_eq!(rasterized.method, FlattenMethod::Raster);
    assert!(rasterized.glyph_draws > 0);

    let bytes = std::fs::read(&out).unwrap();
    assert!(contains(&bytes, "/FontFile2"));
    assert!(contains(&bytes, "/Identity-H"));
    assert!(contains(&bytes, "/SMask"));
    let streams = page_streams(&PdfDocument::open(&out).unwrap(), 0);
    assert!(streams.iter().any(|s| contains(s, "Do")));
}

#[test]
fn edit_pdf_round_trip() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input = common::temp_output(&dir, "in.pdf");
    let output = common::temp_output(&dir, "out.pdf");
    std::fs::write(&input, common::sample_pdf(3)).unwrap();
    let catalog = common::fake_catalog();
    let config = common::isolated_config();

    let report = edit_pdf(&input, &output, &catalog, &config, |session| {
        let run = common::run("Original text 3", "TimesNewRomanPSMT", 12.0, Rect::new(72.0, 80.0, 160.0, 94.0));
        session.edit_text_run(2, &run, OverlayEdit::text("Third page"))?;
        assert!(matches!(
            session.edit_text_run(7, &run, OverlayEdit::default()),
            Err(Error::PageOutOfRange(7))
        ));
        Ok(())
    })
    .unwrap();
    assert_eq!(report.pages, vec![2]);
    assert_eq!(PdfDocument::open(&output).unwrap().page_count(), 3);
}
