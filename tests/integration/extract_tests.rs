//! End-to-end plane extraction tests against the synthetic backend.

use stack_bridge::{
    extract_planes, from_index, pixel_payload, to_index, ErrorCode, ExtractError, OutputWidth,
    PixelData, PlaneCoordinate, PlaneRequest, SampleBuffer, SliceLayout,
};

use super::test_utils::{open, SyntheticBackend};

#[test]
fn test_two_slice_flat_extraction() {
    // sizeX=4, sizeY=3, sizeZ=2, sizeC=1, sizeT=1, plane d filled with d:
    // the flat 8-bit payload is twelve 0s followed by twelve 1s.
    let handle = open(SyntheticBackend::two_slice());
    let data = extract_planes(&handle, &PlaneRequest::flat(0, 0, OutputWidth::Bits8)).unwrap();

    let mut expected = vec![0i8; 12];
    expected.extend(vec![1i8; 12]);
    assert_eq!(data, PixelData::Flat(SampleBuffer::I8(expected)));
}

#[test]
fn test_flat_and_per_slice_agree_for_every_width() {
    let mut backend = SyntheticBackend::with_geometry(7, 5, 4, 3, 2);
    backend.fill = |index, col, row| (index as i32) * 100_000 + (row as i32) * 100 + col as i32;
    let handle = open(backend);

    for width in [OutputWidth::Bits8, OutputWidth::Bits16, OutputWidth::Bits32] {
        let flat = extract_planes(&handle, &PlaneRequest::flat(1, 2, width)).unwrap();
        let sliced = extract_planes(&handle, &PlaneRequest::per_slice(1, 2, width)).unwrap();

        match &sliced {
            PixelData::PerSlice(slices) => {
                assert_eq!(slices.len(), 4);
                assert!(slices.iter().all(|s| s.len() == 35));
            }
            PixelData::Flat(_) => panic!("expected per-slice layout"),
        }

        // Concatenating the slices in depth order reproduces the flat
        // buffer exactly.
        assert_eq!(flat.into_flat(), sliced.into_flat());
    }
}

#[test]
fn test_extraction_visits_planes_in_depth_order() {
    let mut backend = SyntheticBackend::with_geometry(2, 2, 3, 2, 2);
    backend.fill = |index, _, _| index as i32;
    let handle = open(backend);

    // time=1, channel=0 with C=2, Z=3: planes 6, 8, 10.
    let data = extract_planes(&handle, &PlaneRequest::flat(1, 0, OutputWidth::Bits32)).unwrap();
    let expected: Vec<i32> = [6, 8, 10].iter().flat_map(|&p| vec![p; 4]).collect();
    assert_eq!(data, PixelData::Flat(SampleBuffer::I32(expected)));
}

#[test]
fn test_indexer_round_trip_matches_backend_order() {
    let backend = SyntheticBackend::with_geometry(2, 2, 5, 3, 4);
    let handle = open(backend);
    let geometry = *handle.geometry();

    for index in 0..geometry.plane_count {
        let coord = from_index(index, &geometry).unwrap();
        assert_eq!(to_index(coord, &geometry).unwrap(), index);
    }
}

#[test]
fn test_narrowing_is_truncation() {
    let mut backend = SyntheticBackend::with_geometry(2, 2, 1, 1, 1);
    backend.fill = |_, _, _| 300;
    let handle = open(backend);

    let data = extract_planes(&handle, &PlaneRequest::flat(0, 0, OutputWidth::Bits8)).unwrap();
    // 300 mod 256 = 44 under truncating casts.
    assert_eq!(data, PixelData::Flat(SampleBuffer::I8(vec![44; 4])));

    let data = extract_planes(&handle, &PlaneRequest::flat(0, 0, OutputWidth::Bits16)).unwrap();
    assert_eq!(data, PixelData::Flat(SampleBuffer::I16(vec![300; 4])));

    let data = extract_planes(&handle, &PlaneRequest::flat(0, 0, OutputWidth::Bits32)).unwrap();
    assert_eq!(data, PixelData::Flat(SampleBuffer::I32(vec![300; 4])));
}

#[test]
fn test_out_of_range_selector_fails_before_decoding() {
    let backend = SyntheticBackend::two_slice();
    let served = backend.planes_served.clone();
    let handle = open(backend);

    let err =
        extract_planes(&handle, &PlaneRequest::flat(3, 0, OutputWidth::Bits8)).unwrap_err();
    assert!(matches!(err, ExtractError::OutOfRange(o) if o.axis == "time"));
    assert_eq!(served.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn test_decode_failure_becomes_sentinel_payload() {
    let mut backend = SyntheticBackend::two_slice();
    backend.failing_planes = vec![1];
    let handle = open(backend);

    // The typed API surfaces the error...
    let err =
        extract_planes(&handle, &PlaneRequest::flat(0, 0, OutputWidth::Bits8)).unwrap_err();
    assert!(matches!(err, ExtractError::Backend(_)));

    // ...and the wire payload collapses to the single-element code array.
    let payload = pixel_payload(&handle, &PlaneRequest::flat(0, 0, OutputWidth::Bits8));
    assert_eq!(
        payload,
        PixelData::Flat(SampleBuffer::I8(vec![ErrorCode::DecodeFormat.value() as i8]))
    );

    let payload = pixel_payload(&handle, &PlaneRequest::per_slice(0, 0, OutputWidth::Bits16));
    assert_eq!(
        payload,
        PixelData::PerSlice(vec![SampleBuffer::I16(vec![
            ErrorCode::DecodeFormat.value() as i16
        ])])
    );
}

#[test]
fn test_out_of_range_sentinel_code() {
    let handle = open(SyntheticBackend::two_slice());
    let payload = pixel_payload(&handle, &PlaneRequest::flat(0, 7, OutputWidth::Bits32));
    assert_eq!(
        payload,
        PixelData::Flat(SampleBuffer::I32(vec![ErrorCode::OutOfRange.value()]))
    );
}

#[test]
fn test_success_payload_keeps_requested_layout() {
    let handle = open(SyntheticBackend::two_slice());
    let flat = pixel_payload(&handle, &PlaneRequest::flat(0, 0, OutputWidth::Bits16));
    assert_eq!(flat.layout(), SliceLayout::Flat);
    assert_eq!(flat.len(), 24);

    let sliced = pixel_payload(&handle, &PlaneRequest::per_slice(0, 0, OutputWidth::Bits16));
    assert_eq!(sliced.layout(), SliceLayout::PerSlice);
    assert_eq!(sliced.len(), 24);
}

#[test]
fn test_coordinate_out_of_range_errors() {
    let handle = open(SyntheticBackend::two_slice());
    let geometry = *handle.geometry();

    assert!(to_index(PlaneCoordinate::new(0, 0, 0), &geometry).is_ok());
    assert!(to_index(PlaneCoordinate::new(1, 0, 0), &geometry).is_err());
    assert!(to_index(PlaneCoordinate::new(0, 2, 0), &geometry).is_err());
    assert!(to_index(PlaneCoordinate::new(0, 0, 1), &geometry).is_err());
}
