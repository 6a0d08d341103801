//! Metadata extraction and transport-array packing tests.

use stack_bridge::{
    encode_metadata, extract_metadata, metadata_payload, ErrorCode, FixedPoint, MetadataError,
    PixelType, WAVELENGTH_UNKNOWN,
};

use super::test_utils::{open, SyntheticBackend};

fn calibrated_backend() -> SyntheticBackend {
    let mut backend = SyntheticBackend::with_geometry(512, 256, 4, 3, 2);
    backend.pixel_type = PixelType::Uint16;
    backend.physical = [Some(0.125), Some(0.125), Some(1.5)];
    backend.time_increment = Some(2.25);
    backend.wavelengths = vec![Some(488.0), None, Some(561.9)];
    backend
}

#[test]
fn test_metadata_record_fields() {
    let handle = open(calibrated_backend());
    let record = extract_metadata(&handle).unwrap();

    assert_eq!(record.geometry.plane_count, 24);
    assert_eq!(record.geometry.size_x, 512);
    assert_eq!(record.geometry.pixel_type, PixelType::Uint16);
    assert_eq!(
        record.calibration.physical_size_z,
        Some(FixedPoint {
            integer: 1,
            fraction: 5000
        })
    );
    assert_eq!(record.wavelengths, vec![488, WAVELENGTH_UNKNOWN, 561]);
}

#[test]
fn test_wire_layout_prefix_calibration_wavelengths() {
    let handle = open(calibrated_backend());
    let wire = metadata_payload(&handle);

    // 7 geometry ints + 8 calibration ints + 3 wavelengths.
    assert_eq!(wire.len(), 18);
    assert_eq!(&wire[..7], &[24, 512, 256, 4, 3, 2, PixelType::Uint16.code() as i32]);
    assert_eq!(&wire[7..15], &[0, 1250, 0, 1250, 1, 5000, 2, 2500]);
    assert_eq!(&wire[15..], &[488, -1, 561]);
}

#[test]
fn test_absent_calibration_encodes_as_zero_pairs() {
    let mut backend = calibrated_backend();
    backend.physical = [None, None, None];
    backend.time_increment = None;
    let handle = open(backend);

    let record = extract_metadata(&handle).unwrap();
    assert_eq!(record.calibration.physical_size_x, None);

    let wire = encode_metadata(&record);
    assert_eq!(&wire[7..15], &[0; 8]);
}

#[test]
fn test_missing_wavelength_holds_its_slot() {
    // The channel after a missing wavelength must stay in its own slot
    // rather than shifting down.
    let handle = open(calibrated_backend());
    let wire = metadata_payload(&handle);
    assert_eq!(wire[15], 488);
    assert_eq!(wire[16], WAVELENGTH_UNKNOWN);
    assert_eq!(wire[17], 561);
}

#[test]
fn test_array_size_guard_yields_sentinel() {
    // 70_000^2 exceeds i32::MAX, so the call must fail as a whole.
    let mut backend = SyntheticBackend::with_geometry(70_000, 70_000, 1, 1, 1);
    backend.wavelengths = vec![None];
    let handle = open(backend);

    let err = extract_metadata(&handle).unwrap_err();
    assert!(matches!(err, MetadataError::ArraySizeExceeded { .. }));

    // The wire payload is the single-element code array, never a partial
    // record.
    let wire = metadata_payload(&handle);
    assert_eq!(wire, vec![ErrorCode::ArraySizeExceeded.value()]);
}

#[test]
fn test_geometry_only_backend() {
    // A backend with no metadata at all still produces a full record:
    // zero pairs and unknown wavelengths.
    let handle = open(SyntheticBackend::two_slice());
    let wire = metadata_payload(&handle);

    assert_eq!(wire.len(), 7 + 8 + 1);
    assert_eq!(&wire[..7], &[2, 4, 3, 2, 1, 1, PixelType::Uint16.code() as i32]);
    assert_eq!(&wire[7..15], &[0; 8]);
    assert_eq!(wire[15], WAVELENGTH_UNKNOWN);
}

#[test]
fn test_summary_json_round_trips_through_serde() {
    let handle = open(calibrated_backend());
    let record = extract_metadata(&handle).unwrap();
    let json = record.summary_json();

    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["geometry"]["size_x"], 512);
    assert_eq!(parsed["calibration"]["physical_size_z"]["fraction"], 5000);
    assert_eq!(parsed["wavelengths"][1], -1);
}
