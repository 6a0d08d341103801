use thiserror::Error;

/// Failures reported by (or about) the format backend behind a stack handle.
///
/// The backend itself is an external collaborator; these variants cover the
/// ways it can reject a file, fail to decode a plane, or hand back state the
/// core refuses to trust.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend rejected the byte source or could not decode a plane.
    #[error("decode error: {0}")]
    Decode(String),

    /// The underlying byte source could not be read.
    #[error("I/O error: {0}")]
    Io(String),

    /// The identifier did not resolve to a registered buffer or readable path.
    #[error("unresolved identifier: {0}")]
    UnresolvedIdentifier(String),

    /// The backend reported a plane count that disagrees with its own axes.
    #[error(
        "inconsistent geometry: {plane_count} planes, expected {size_z} x {size_c} x {size_t}"
    )]
    InconsistentGeometry {
        plane_count: u32,
        size_z: u32,
        size_c: u32,
        size_t: u32,
    },

    /// Any other backend failure, including a poisoned handle lock.
    #[error("backend error: {0}")]
    Other(String),
}

/// A coordinate or plane index outside the bounds of the stack geometry.
///
/// Raised by the plane indexer instead of wrapping into a valid-looking but
/// wrong index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{axis} value {value} outside [0, {limit})")]
pub struct OutOfRange {
    /// Which axis (or "plane" for a linear index) was out of bounds
    pub axis: &'static str,

    /// The offending value
    pub value: u32,

    /// The exclusive upper bound for this axis
    pub limit: u32,
}

/// Failures of the virtual-file registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// An entry already exists under this identifier.
    ///
    /// The source design left double registration undefined; here it is a
    /// contract violation the caller must resolve by unregistering first.
    #[error("identifier already registered: {0}")]
    AlreadyRegistered(String),

    /// No entry exists under this identifier.
    #[error("identifier not registered: {0}")]
    NotRegistered(String),
}

/// Failures while opening a stack handle.
#[derive(Debug, Clone, Error)]
pub enum OpenError {
    /// The backend rejected the source or reported broken geometry.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The virtual-file registration could not be made.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Failures of the pixel extraction path.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The backend failed while opening or decoding a plane.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The requested (time, channel) selector or a derived plane index was
    /// outside the stack geometry.
    #[error(transparent)]
    OutOfRange(#[from] OutOfRange),

    /// A decoded grid did not match the geometry the backend advertised.
    #[error(
        "plane {plane}: decoded grid is {actual_width}x{actual_height}, geometry says {width}x{height}"
    )]
    GridMismatch {
        plane: u32,
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// Failures of the metadata extraction path.
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// The backend failed while reading geometry or calibration.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The transport array length would overflow the signed 32-bit range
    /// used by the wire format.
    #[error("transport array would hold {elements} elements, exceeding i32::MAX")]
    ArraySizeExceeded { elements: u64 },
}

/// Failures of the native buffer bridge.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// A write would run past the end of the allocated region.
    ///
    /// The source design left this undefined behavior; here it fails before
    /// any byte is copied.
    #[error("write of {requested} bytes at offset {offset} exceeds capacity {capacity}")]
    BufferOverflow {
        capacity: usize,
        offset: usize,
        requested: usize,
    },

    /// Zero-byte allocations are rejected rather than handed to the allocator.
    #[error("cannot allocate a zero-capacity native buffer")]
    ZeroCapacity,

    /// The allocator refused the request.
    #[error("native allocation of {capacity} bytes failed")]
    AllocationFailed { capacity: usize },
}
