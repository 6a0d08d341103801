//! Virtual-file registration lifetime tests.

use bytes::Bytes;
use stack_bridge::{
    virtual_identifier, OpenError, RegistryError, StackHandle, VirtualFileRegistry,
};

use super::test_utils::SyntheticBackend;

#[test]
fn test_registration_lives_exactly_as_long_as_the_handle() {
    let files = VirtualFileRegistry::new();
    let handle = StackHandle::open_bytes(
        SyntheticBackend::two_slice(),
        "0_0",
        "recording.lsm",
        Bytes::from_static(b"stack bytes"),
        &files,
    )
    .unwrap();

    assert_eq!(handle.identifier(), "bytes_0_0.lsm");
    assert!(files.contains("bytes_0_0.lsm"));

    handle.close().unwrap();
    assert!(files.is_empty());
}

#[test]
fn test_registration_released_when_handle_dropped_without_close() {
    let files = VirtualFileRegistry::new();
    {
        let _handle = StackHandle::open_bytes(
            SyntheticBackend::two_slice(),
            "0_0",
            "recording.lsm",
            Bytes::from_static(b"stack bytes"),
            &files,
        )
        .unwrap();
        assert_eq!(files.len(), 1);
    }
    assert!(files.is_empty());
}

#[test]
fn test_registration_released_when_open_fails() {
    let files = VirtualFileRegistry::new();
    let mut backend = SyntheticBackend::two_slice();
    backend.refuse_open = true;

    let err = StackHandle::open_bytes(
        backend,
        "0_0",
        "recording.lsm",
        Bytes::from_static(b"stack bytes"),
        &files,
    )
    .unwrap_err();

    assert!(matches!(err, OpenError::Backend(_)));
    assert!(files.is_empty());
}

#[test]
fn test_double_registration_is_rejected() {
    let files = VirtualFileRegistry::new();
    let _first = StackHandle::open_bytes(
        SyntheticBackend::two_slice(),
        "0_0",
        "recording.lsm",
        Bytes::from_static(b"first"),
        &files,
    )
    .unwrap();

    let err = StackHandle::open_bytes(
        SyntheticBackend::two_slice(),
        "0_0",
        "recording.lsm",
        Bytes::from_static(b"second"),
        &files,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        OpenError::Registry(RegistryError::AlreadyRegistered(_))
    ));

    // The first handle's bytes are untouched.
    assert_eq!(
        files.resolve("bytes_0_0.lsm").unwrap(),
        Bytes::from_static(b"first")
    );
}

#[test]
fn test_identifier_preserves_decoder_suffix() {
    // The backend sniffs the extension to pick a decoder, so the suffix
    // must survive into the synthetic identifier.
    assert_eq!(virtual_identifier("3_1", "series.lsm"), "bytes_3_1.lsm");
    assert_eq!(virtual_identifier("0_0", "scan.ome.tiff"), "bytes_0_0.tiff");
}

#[test]
fn test_independent_handles_per_unit_of_work() {
    // Parallel extraction across timepoints means one handle per worker;
    // distinct tags keep their registrations disjoint.
    let files = VirtualFileRegistry::new();
    let bytes = Bytes::from_static(b"stack bytes");

    let t0 = StackHandle::open_bytes(
        SyntheticBackend::two_slice(),
        "0_0",
        "recording.lsm",
        bytes.clone(),
        &files,
    )
    .unwrap();
    let t1 = StackHandle::open_bytes(
        SyntheticBackend::two_slice(),
        "1_0",
        "recording.lsm",
        bytes,
        &files,
    )
    .unwrap();

    assert_eq!(files.len(), 2);
    t0.close().unwrap();
    assert_eq!(files.len(), 1);
    assert!(files.contains("bytes_1_0.lsm"));
    t1.close().unwrap();
    assert!(files.is_empty());
}
