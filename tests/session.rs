mod common;

use std::io::{Cursor, Write};

use retext_pdf::{
    EditSession, Error, OverlayEdit, PatchColorRequest, Point, Rect, SessionArchive, SessionState, StyleFlags,
};

fn edited_session<'a>(
    catalog: &'a retext_pdf::FontCatalog,
    config: &'a retext_pdf::EngineConfig,
) -> EditSession<'a> {
    let mut session = EditSession::open_bytes(common::sample_pdf(3), catalog, config).unwrap();

    let mut run = common::run("Original text 1", "ABCDEF+ArialMT", 11.5, Rect::new(72.0, 80.0, 160.0, 94.0));
    run.flags = StyleFlags::empty().with(StyleFlags::BOLD, true);
    run.baseline = Some(Point::new(72.0, 91.2));
    run.color = [20, 40, 200];
    let edit = OverlayEdit {
        underline: Some(true),
        tracking: Some(-3.5),
        stretch: Some(0.85),
        patch_color: PatchColorRequest::Explicit([250, 240, 230]),
        ..OverlayEdit::text("합계 1,250원\nsecond line")
    };
    session.edit_text_run(0, &run, edit).unwrap();

    let hidden = session
        .add_text_region(2, Rect::new(300.0, 500.0, 420.0, 530.0), "hidden note", "Gulim", 9.0, OverlayEdit::default())
        .unwrap();
    session.set_visible(hidden, false).unwrap();
    session.current_page = 2;
    session.zoom = 1.75;
    session
}

#[test]
fn session_archive_restores_everything() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = common::temp_output(&dir, "work.rtxs");
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let session = edited_session(&catalog, &config);
    session.save_session(&path).unwrap();

    let mut restored = EditSession::load_session(&path, &catalog, &config).unwrap();
    assert_eq!(restored.state(), session.state());
    assert_eq!(restored.document_bytes(), session.document_bytes());
    assert_eq!(restored.current_page, 2);
    assert_eq!(restored.zoom, 1.75);
    assert_eq!(restored.page_count(), 3);
    assert!(!restored.history().can_undo());

    let z = restored
        .add_text_region(1, Rect::new(72.0, 72.0, 200.0, 90.0), "new", "Arial", 10.0, OverlayEdit::default())
        .unwrap();
    assert!(session.state().overlay(z).is_none());
}

#[test]
fn archive_bytes_round_trip() {
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let session = edited_session(&catalog, &config);
    let archive = SessionArchive {
        state: SessionState::capture(session.state(), 2, 1.75),
        document: session.document_bytes().to_vec(),
    };
    let bytes = archive.to_bytes().unwrap();
    let back = SessionArchive::from_bytes(&bytes).unwrap();
    assert_eq!(back, archive);
    assert_eq!(back.state.edit_state(), *session.state());
}

#[test]
fn missing_fields_take_defaults() {
    let state: SessionState = serde_json::from_str(r#"{"overlays": {}, "patches": {}}"#).unwrap();
    assert_eq!(state.zoom, 1.0);
    assert_eq!(state.current_page, 0);
    assert_eq!(state.next_z, 0);
}

#[test]
fn restored_ids_never_collide() {
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let session = edited_session(&catalog, &config);
    let mut state = SessionState::capture(session.state(), 0, 1.0);
    state.next_z = 0;
    let max = session
        .state()
        .overlays
        .values()
        .flatten()
        .map(|o| o.z_index)
        .max()
        .unwrap();
    assert_eq!(state.edit_state().next_z, max + 1);
}

#[test]
fn invalid_archives_are_rejected() {
    assert!(matches!(
        SessionArchive::from_bytes(b"%PDF-1.5 not a zip"),
        Err(Error::Session(_))
    ));

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("state.json", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(br#"{"version": 1, "overlays": {}, "patches": {}}"#)
        .unwrap();
    let only_state = zip.finish().unwrap().into_inner();
    assert!(matches!(
        SessionArchive::from_bytes(&only_state),
        Err(Error::Session(msg)) if msg.contains("doc.bin")
    ));

    let future = SessionArchive {
        state: SessionState {
            version: 99,
            ..serde_json::from_str(r#"{}"#).unwrap()
        },
        document: common::sample_pdf(1),
    };
    let bytes = future.to_bytes().unwrap();
    assert!(matches!(SessionArchive::from_bytes(&bytes), Err(Error::Session(_))));
}

#[test]
fn failed_session_write_reports_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope").join("work.rtxs");
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let session = edited_session(&catalog, &config);
    match session.save_session(&path) {
        Err(Error::Write { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected write error, got {:?}", other.map(|_| ())),
    }
}
