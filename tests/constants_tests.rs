// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use capture_station::compositor::SlotPlacement;
use capture_station::constants::{capture, placement, timing};

#[test]
fn test_default_slot_positions_are_valid() {
    for (index, slot) in placement::DEFAULT_SLOT_POSITIONS.iter().enumerate() {
        assert!(
            SlotPlacement::parse(index, slot).is_some(),
            "Slot {} ('{}') should parse",
            index,
            slot
        );
    }
}

#[test]
fn test_primary_slot_covers_primary() {
    let primary = SlotPlacement::parse(0, placement::DEFAULT_SLOT_POSITIONS[0]).unwrap();
    assert_eq!(primary.rect.x, 0.0);
    assert_eq!(primary.rect.y, 0.0);
    assert_eq!(primary.rect.width, 1.0);
    assert_eq!(primary.rect.height, 1.0);
}

#[test]
fn test_downward_camera_waits_longer() {
    assert!(capture::DOWNWARD_CAMERA_SKIP_FRAME_COUNT > capture::DEFAULT_SKIP_FRAME_COUNT);
}

#[test]
fn test_timeouts_nonzero() {
    assert!(timing::FLASH_TIMEOUT_MS > 0);
    assert!(timing::VIEWFINDER_TIMEOUT_MS > 0);
    assert!(timing::MODE_SETTLE_TIMEOUT_MS > 0);
    assert!(timing::FREEZE_DETECTION_TIMEOUT_MS > 0);
}

#[test]
fn test_asset_name_format_is_timestamped() {
    assert!(capture::ASSET_NAME_FORMAT.starts_with("IMG_"));
}
