mod common;

use retext_pdf::{EditHistory, EditSession, EditSnapshot, EditState, Error, OverlayEdit, Rect, TextOverlay};

fn snapshot(n: u8) -> EditSnapshot {
    let mut state = EditState::new();
    for i in 0..n {
        state.add_overlay(0, TextOverlay::new(format!("edit {}", i), "Arial", 10.0, Rect::default()));
    }
    EditSnapshot {
        document: vec![n],
        state,
    }
}

fn restore_into(target: &mut Option<EditSnapshot>) -> impl FnOnce(&EditSnapshot) -> Result<(), Error> + '_ {
    move |s| {
        *target = Some(s.clone());
        Ok(())
    }
}

#[test]
fn undo_then_redo_returns_to_each_state() {
    let mut history = EditHistory::new(50);
    for n in 0..=5 {
        history.commit(snapshot(n));
    }

    let mut restored = None;
    for expected in (0..5).rev() {
        assert!(history.undo(restore_into(&mut restored)).unwrap());
        assert_eq!(restored.as_ref().unwrap(), &snapshot(expected));
        assert_eq!(history.current().unwrap(), &snapshot(expected));
    }
    assert!(!history.can_undo());

    for expected in 1..=5 {
        assert!(history.redo(restore_into(&mut restored)).unwrap());
        assert_eq!(restored.as_ref().unwrap(), &snapshot(expected));
    }
    assert!(!history.can_redo());
    assert_eq!(history.current().unwrap(), &snapshot(5));
}

#[test]
fn nothing_to_undo_or_redo_is_a_no_op() {
    let mut history = EditHistory::new(10);
    let mut called = false;
    assert!(!history.undo(|_| {
        called = true;
        Ok(())
    })
    .unwrap());

    history.commit(snapshot(0));
    assert!(!history.undo(|_| {
        called = true;
        Ok(())
    })
    .unwrap());
    assert!(!history.redo(|_| {
        called = true;
        Ok(())
    })
    .unwrap());
    assert!(!called);
    assert_eq!(history.undo_len(), 1);
}

#[test]
fn failed_restore_leaves_stacks_untouched() {
    let mut history = EditHistory::new(10);
    history.commit(snapshot(0));
    history.commit(snapshot(1));

    let err = history
        .undo(|_| Err(Error::SnapshotRestore("corrupt".into())))
        .unwrap_err();
    assert!(matches!(err, Error::SnapshotRestore(_)));
    assert_eq!(history.undo_len(), 2);
    assert_eq!(history.redo_len(), 0);
    assert_eq!(history.current().unwrap(), &snapshot(1));

    history.undo(|_| Ok(())).unwrap();
    assert!(history.redo(|_| Err(Error::SnapshotRestore("corrupt".into()))).is_err());
    assert_eq!(history.undo_len(), 1);
    assert_eq!(history.redo_len(), 1);
}

#[test]
fn commit_after_undo_drops_redo() {
    let mut history = EditHistory::new(10);
    history.commit(snapshot(0));
    history.commit(snapshot(1));
    history.undo(|_| Ok(())).unwrap();
    assert!(history.can_redo());
    history.commit(snapshot(2));
    assert!(!history.can_redo());
    assert_eq!(history.current().unwrap(), &snapshot(2));
}

#[test]
fn redone_state_stays_undoable_after_a_commit() {
    let mut history = EditHistory::new(10);
    history.commit(snapshot(0));
    history.commit(snapshot(1));
    history.undo(|_| Ok(())).unwrap();
    history.redo(|_| Ok(())).unwrap();
    history.commit(snapshot(2));

    let mut restored = None;
    assert!(history.undo(restore_into(&mut restored)).unwrap());
    assert_eq!(restored.unwrap(), snapshot(1));
    assert!(history.can_undo());
}

#[test]
fn depth_bounds_the_undo_stack() {
    let mut history = EditHistory::new(3);
    for n in 0..10 {
        history.commit(snapshot(n));
    }
    assert_eq!(history.undo_len(), 3);
    history.undo(|_| Ok(())).unwrap();
    history.undo(|_| Ok(())).unwrap();
    assert!(!history.can_undo());
    assert_eq!(history.current().unwrap(), &snapshot(7));
    assert_eq!(EditHistory::new(0).depth(), 1);
}

#[test]
fn session_undo_restores_overlays_and_document() {
    common::init_logging();
    let catalog = common::fake_catalog();
    let config = common::isolated_config();
    let mut session = EditSession::open_bytes(common::sample_pdf(2), &catalog, &config).unwrap();

    let bbox = Rect::new(72.0, 80.0, 200.0, 94.0);
    let z = session
        .add_text_region(0, bbox, "first", "Arial", 12.0, OverlayEdit::default())
        .unwrap();
    session
        .update_overlay(z, OverlayEdit::text("second"))
        .unwrap();
    session.delete_overlay(z).unwrap();
    assert!(session.state().overlay(z).is_none());

    assert!(session.undo().unwrap());
    assert_eq!(session.state().overlay(z).unwrap().1.text, "second");
    assert!(session.undo().unwrap());
    assert_eq!(session.state().overlay(z).unwrap().1.text, "first");
    assert!(session.undo().unwrap());
    assert!(session.state().overlay(z).is_none());
    assert!(!session.undo().unwrap());

    for _ in 0..3 {
        assert!(session.redo().unwrap());
    }
    assert!(session.state().overlay(z).is_none());
    assert!(!session.redo().unwrap());
    assert_eq!(session.page_count(), 2);
}
