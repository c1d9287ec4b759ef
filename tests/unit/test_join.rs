use image::RgbImage;
use image_translate_worker::domain::text_box::TranslatedItem;
use image_translate_worker::pipeline::join::{InpaintDeposit, JoinCoordinator};
use std::time::Duration;

fn deposit() -> InpaintDeposit {
    InpaintDeposit {
        original_image: RgbImage::new(8, 8),
        inpainted_image: RgbImage::new(8, 8),
    }
}

fn items() -> Vec<TranslatedItem> {
    vec![TranslatedItem {
        polygon: vec![[0.0, 0.0], [4.0, 0.0], [4.0, 2.0], [0.0, 2.0]],
        translated_text: "안녕".to_string(),
        original_char_count: 2,
    }]
}

#[test]
fn second_deposit_completes_regardless_of_order() {
    let coordinator = JoinCoordinator::new();

    assert!(
        coordinator
            .deposit_translation("r1", "img-1", false, items())
            .is_none()
    );
    let job = coordinator
        .deposit_inpainting("r1", "img-1", false, deposit())
        .expect("second deposit completes the join");
    assert_eq!(job.request_id, "r1");
    assert_eq!(job.translated_items.len(), 1);

    // Other order.
    assert!(
        coordinator
            .deposit_inpainting("r2", "img-2", true, deposit())
            .is_none()
    );
    let job = coordinator
        .deposit_translation("r2", "img-2", true, items())
        .expect("second deposit completes the join");
    assert!(job.is_long);
}

#[test]
fn completion_removes_all_state() {
    let coordinator = JoinCoordinator::new();
    coordinator.deposit_translation("r1", "img-1", false, items());
    coordinator.deposit_inpainting("r1", "img-1", false, deposit());
    assert_eq!(coordinator.pending_count(), 0);

    // A late duplicate starts a fresh (orphan) entry rather than emitting
    // a second render job.
    assert!(
        coordinator
            .deposit_translation("r1", "img-1", false, items())
            .is_none()
    );
}

#[test]
fn duplicate_slot_writes_are_ignored() {
    let coordinator = JoinCoordinator::new();
    coordinator.deposit_translation("r1", "img-1", false, items());
    assert!(
        coordinator
            .deposit_translation("r1", "img-1", false, vec![])
            .is_none()
    );
    // The original slot still completes with its first payload.
    let job = coordinator
        .deposit_inpainting("r1", "img-1", false, deposit())
        .unwrap();
    assert_eq!(job.translated_items.len(), 1);
}

#[test]
fn abandon_drops_partial_state() {
    let coordinator = JoinCoordinator::new();
    coordinator.deposit_translation("r1", "img-1", false, items());
    assert!(coordinator.abandon("r1"));
    assert!(!coordinator.abandon("r1"));
    assert_eq!(coordinator.pending_count(), 0);
}

#[test]
fn sweep_evicts_only_old_entries() {
    let coordinator = JoinCoordinator::new();
    coordinator.deposit_translation("r1", "img-1", false, items());

    assert!(coordinator.sweep_stale(Duration::from_secs(60)).is_empty());
    let stale = coordinator.sweep_stale(Duration::ZERO);
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].request_id, "r1");
    assert_eq!(stale[0].image_id, "img-1");
    assert_eq!(coordinator.pending_count(), 0);
}
