//! Undo/redo over a codec-managed root: capture, restore, batching,
//! re-entrancy suppression.

use pretty_assertions::assert_eq;
use serde_json::json;
use snapback_codec::{Memo, Schema, Snapshot, Tracked, impl_persist};
use snapback_undo::UndoManager;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

#[derive(Default)]
struct Studio {
    lights: Tracked<bool>,
    camera: Tracked<bool>,
    action: Tracked<bool>,
    memo: Memo<Snapshot>,
}

static STUDIO: LazyLock<Schema<Studio>> = LazyLock::new(|| {
    Schema::builder()
        .field("lights", |s: &Studio| &s.lights, |s: &mut Studio| {
            &mut s.lights
        })
        .field("camera", |s: &Studio| &s.camera, |s: &mut Studio| {
            &mut s.camera
        })
        .field("action", |s: &Studio| &s.action, |s: &mut Studio| {
            &mut s.action
        })
        .memo(|s: &Studio| &s.memo)
        .build()
});

impl_persist!(Studio => STUDIO);

#[test]
fn undo_and_redo_swap_states() {
    let mut studio = Studio::default();

    let seen: Rc<RefCell<Option<Snapshot>>> = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&seen);
    let mut undo = UndoManager::with_hook(&studio, move |after, _before| {
        *sink.borrow_mut() = Some(after.clone());
    });

    studio.lights.set(true);
    undo.observe(&studio);

    assert!(undo.can_undo());
    assert!(!undo.can_redo());
    assert_eq!(
        seen.borrow().clone().unwrap(),
        json!({"lights": true, "camera": false, "action": false})
    );

    undo.undo(&mut studio).unwrap();

    assert!(!*studio.lights);
    assert!(!*studio.camera);
    assert!(!*studio.action);
    assert!(!undo.can_undo());
    assert!(undo.can_redo());
    assert_eq!(
        seen.borrow().clone().unwrap(),
        json!({"lights": false, "camera": false, "action": false})
    );

    undo.redo(&mut studio).unwrap();

    assert!(*studio.lights);
    assert!(undo.can_undo());
    assert!(!undo.can_redo());
    assert_eq!(
        seen.borrow().clone().unwrap(),
        json!({"lights": true, "camera": false, "action": false})
    );

    // A multi-field batch observed once is one transaction.
    studio.lights.set(false);
    studio.camera.set(true);
    undo.observe(&studio);

    assert_eq!(
        seen.borrow().clone().unwrap(),
        json!({"lights": false, "camera": true, "action": false})
    );

    undo.undo(&mut studio).unwrap();
    assert!(*studio.lights);
    assert!(!*studio.camera);
    assert_eq!(
        seen.borrow().clone().unwrap(),
        json!({"lights": true, "camera": false, "action": false})
    );

    undo.redo(&mut studio).unwrap();
    assert!(!*studio.lights);
    assert!(*studio.camera);
    assert_eq!(
        seen.borrow().clone().unwrap(),
        json!({"lights": false, "camera": true, "action": false})
    );

    undo.dispose();
}

#[test]
fn the_hook_fires_for_the_initial_state_with_no_previous() {
    let studio = Studio::default();
    let calls: Rc<RefCell<Vec<(Snapshot, Option<Snapshot>)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&calls);

    let _undo = UndoManager::with_hook(&studio, move |after, before| {
        sink.borrow_mut().push((after.clone(), before.cloned()));
    });

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].0,
        json!({"lights": false, "camera": false, "action": false})
    );
    assert!(calls[0].1.is_none());
}

#[test]
fn observing_an_unchanged_root_captures_nothing() {
    let studio = Studio::default();
    let mut undo = UndoManager::new(&studio);

    assert!(!undo.observe(&studio));
    assert!(!undo.can_undo());
}

#[test]
fn a_new_edit_clears_the_redo_stack() {
    let mut studio = Studio::default();
    let mut undo = UndoManager::new(&studio);

    studio.lights.set(true);
    undo.observe(&studio);
    undo.undo(&mut studio).unwrap();
    assert!(undo.can_redo());

    studio.action.set(true);
    undo.observe(&studio);
    assert!(!undo.can_redo());
    assert!(undo.can_undo());
}

#[test]
fn undo_on_an_empty_stack_is_a_no_op() {
    let mut studio = Studio::default();
    let mut undo = UndoManager::new(&studio);

    assert!(!undo.undo(&mut studio).unwrap());
    assert!(!*studio.lights);
}

#[test]
fn external_observation_after_undo_is_not_recaptured() {
    let mut studio = Studio::default();
    let mut undo = UndoManager::new(&studio);

    studio.lights.set(true);
    undo.observe(&studio);
    undo.undo(&mut studio).unwrap();

    // An application change hook firing off the restoring load sees an
    // unchanged root: nothing is captured, redo history survives.
    assert!(!undo.observe(&studio));
    assert!(undo.can_redo());
    assert!(!undo.can_undo());
}

#[test]
fn dispose_stops_capture_but_keeps_the_stacks() {
    let mut studio = Studio::default();
    let mut undo = UndoManager::new(&studio);

    studio.lights.set(true);
    undo.observe(&studio);
    undo.dispose();

    assert!(undo.can_undo());

    studio.camera.set(true);
    assert!(!undo.observe(&studio));
    assert!(!undo.undo(&mut studio).unwrap());
}
