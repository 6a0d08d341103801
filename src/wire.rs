//! Transport layout and error-code arrays.
//!
//! Native callers receive plain integer arrays and tell success from
//! failure purely by length: a success payload always has more than one
//! element, a failure is a single-element array holding an error code.
//! Internally everything is a typed `Result`; this module is the one place
//! where results flatten into that length convention, and the only place
//! the closed error-code taxonomy is defined.
//!
//! Metadata transport layout (length `15 + size_c`):
//!
//! ```text
//! [0..7)   plane_count, size_x, size_y, size_z, size_c, size_t, pixel_type
//! [7..15)  calibration as fixed-point pairs: X, Y, Z, time increment
//!          (absent values encoded as the pair 0,0)
//! [15..)   one excitation wavelength per channel, -1 when unknown
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use crate::backend::{FormatReader, MetadataStore, StackHandle};
use crate::error::{
    BackendError, BridgeError, ExtractError, MetadataError, OpenError, RegistryError,
};
use crate::extract::{extract_planes, PixelData, PlaneRequest, SampleBuffer, SliceLayout};
use crate::meta::{extract_metadata, FixedPoint, MetadataRecord};

/// Number of geometry integers at the head of the metadata array.
pub const METADATA_PREFIX_LEN: usize = 7;

/// Number of calibration integers following the geometry prefix.
pub const METADATA_CALIBRATION_LEN: usize = 8;

// =============================================================================
// ErrorCode
// =============================================================================

/// The closed error taxonomy surfaced to native callers.
///
/// These values are the wire contract; new failure kinds must map onto an
/// existing code rather than extend the set ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// The backend rejected the file or a plane could not be decoded
    DecodeFormat = 1,

    /// The underlying byte source was unreadable
    Io = 2,

    /// Any other failure, after cleanup has run
    Unexpected = 3,

    /// The transport array length would overflow its 32-bit index space
    ArraySizeExceeded = 4,

    /// A coordinate was outside the stack geometry
    OutOfRange = 5,

    /// A native-buffer write would exceed the allocated capacity
    BufferOverflow = 6,
}

impl ErrorCode {
    /// The wire value of this code.
    pub const fn value(self) -> i32 {
        self as i32
    }
}

impl From<&BackendError> for ErrorCode {
    fn from(err: &BackendError) -> Self {
        match err {
            BackendError::Decode(_) | BackendError::InconsistentGeometry { .. } => {
                ErrorCode::DecodeFormat
            }
            BackendError::Io(_) | BackendError::UnresolvedIdentifier(_) => ErrorCode::Io,
            BackendError::Other(_) => ErrorCode::Unexpected,
        }
    }
}

impl From<&ExtractError> for ErrorCode {
    fn from(err: &ExtractError) -> Self {
        match err {
            ExtractError::Backend(b) => b.into(),
            ExtractError::OutOfRange(_) => ErrorCode::OutOfRange,
            ExtractError::GridMismatch { .. } => ErrorCode::DecodeFormat,
        }
    }
}

impl From<&MetadataError> for ErrorCode {
    fn from(err: &MetadataError) -> Self {
        match err {
            MetadataError::Backend(b) => b.into(),
            MetadataError::ArraySizeExceeded { .. } => ErrorCode::ArraySizeExceeded,
        }
    }
}

impl From<&BridgeError> for ErrorCode {
    fn from(err: &BridgeError) -> Self {
        match err {
            BridgeError::BufferOverflow { .. } => ErrorCode::BufferOverflow,
            BridgeError::ZeroCapacity | BridgeError::AllocationFailed { .. } => {
                ErrorCode::Unexpected
            }
        }
    }
}

impl From<&OpenError> for ErrorCode {
    fn from(err: &OpenError) -> Self {
        match err {
            OpenError::Backend(b) => b.into(),
            OpenError::Registry(RegistryError::NotRegistered(_)) => ErrorCode::Io,
            OpenError::Registry(RegistryError::AlreadyRegistered(_)) => ErrorCode::Unexpected,
        }
    }
}

// =============================================================================
// Metadata Encoding
// =============================================================================

/// Pack a metadata record into its transport array.
pub fn encode_metadata(record: &MetadataRecord) -> Vec<i32> {
    let geometry = &record.geometry;
    let mut out = Vec::with_capacity(
        METADATA_PREFIX_LEN + METADATA_CALIBRATION_LEN + record.wavelengths.len(),
    );

    out.extend([
        geometry.plane_count as i32,
        geometry.size_x as i32,
        geometry.size_y as i32,
        geometry.size_z as i32,
        geometry.size_c as i32,
        geometry.size_t as i32,
        geometry.pixel_type.code() as i32,
    ]);

    push_pair(&mut out, record.calibration.physical_size_x);
    push_pair(&mut out, record.calibration.physical_size_y);
    push_pair(&mut out, record.calibration.physical_size_z);
    push_pair(&mut out, record.calibration.time_increment);

    out.extend_from_slice(&record.wavelengths);
    out
}

// Absent values flatten to the 0,0 pair the existing native callers
// expect; presence information survives only inside the crate.
fn push_pair(out: &mut Vec<i32>, value: Option<FixedPoint>) {
    match value {
        Some(fp) => out.extend([fp.integer, fp.fraction]),
        None => out.extend([0, 0]),
    }
}

// =============================================================================
// Payload Conversion
// =============================================================================

/// Extract metadata and flatten the outcome into the wire convention.
///
/// Never panics out to the caller: failures of any kind, including panics
/// from a misbehaving backend, become a single-element code array after
/// cleanup (the handle lock is released either way).
pub fn metadata_payload<B>(handle: &StackHandle<B>) -> Vec<i32>
where
    B: FormatReader + MetadataStore,
{
    match catch_unwind(AssertUnwindSafe(|| extract_metadata(handle))) {
        Ok(Ok(record)) => encode_metadata(&record),
        Ok(Err(err)) => {
            warn!(identifier = %handle.identifier(), error = %err, "metadata extraction failed");
            vec![ErrorCode::from(&err).value()]
        }
        Err(_) => {
            warn!(identifier = %handle.identifier(), "metadata extraction panicked");
            vec![ErrorCode::Unexpected.value()]
        }
    }
}

/// Extract pixel planes and flatten the outcome into the wire convention.
///
/// On success the payload keeps the requested layout and width; on any
/// failure it collapses to a single-element buffer (or a single
/// one-element slice for the per-slice layout) holding the error code.
pub fn pixel_payload<B: FormatReader>(
    handle: &StackHandle<B>,
    request: &PlaneRequest,
) -> PixelData {
    match catch_unwind(AssertUnwindSafe(|| extract_planes(handle, request))) {
        Ok(Ok(data)) => data,
        Ok(Err(err)) => {
            warn!(identifier = %handle.identifier(), error = %err, "plane extraction failed");
            sentinel(request, ErrorCode::from(&err))
        }
        Err(_) => {
            warn!(identifier = %handle.identifier(), "plane extraction panicked");
            sentinel(request, ErrorCode::Unexpected)
        }
    }
}

/// The single-element failure payload for a request.
pub fn sentinel(request: &PlaneRequest, code: ErrorCode) -> PixelData {
    let buffer = SampleBuffer::single(request.width, code.value());
    match request.layout {
        SliceLayout::Flat => PixelData::Flat(buffer),
        SliceLayout::PerSlice => PixelData::PerSlice(vec![buffer]),
    }
}

/// Whether a payload is a failure sentinel under the length convention.
pub fn is_sentinel(data: &PixelData) -> bool {
    match data {
        PixelData::Flat(buf) => buf.len() == 1,
        PixelData::PerSlice(slices) => slices.len() == 1 && slices[0].len() == 1,
    }
}

// =============================================================================
// Tests
// =============================================================================
