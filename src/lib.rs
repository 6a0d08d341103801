//! # Stack Bridge
//!
//! Extracts pixel planes and acquisition metadata from multi-dimensional
//! microscopy stacks (time x depth x channel) and hands them to a native
//! caller, optionally through a zero-copy shared buffer.
//!
//! Decoding the container formats themselves (TIFF, LSM, vendor codecs) is
//! delegated to an external format backend behind the
//! [`FormatReader`]/[`MetadataStore`] traits; this crate contributes the
//! coordinate arithmetic, the sample narrowing and assembly, the metadata
//! packing, and the cross-boundary memory plumbing.
//!
//! ## Architecture
//!
//! - [`stack`] - geometry snapshot, plane coordinates, and the
//!   coordinate-to-plane-index mapping
//! - [`backend`] - the format-reader and metadata-store interfaces, and
//!   the locked handle over an open series
//! - [`vfs`] - virtual-file registry, letting a path-based backend open an
//!   in-memory byte range
//! - [`extract`] - plane extraction across a depth range, with selectable
//!   output width and slice layout
//! - [`meta`] - geometry and calibration packing with fixed-point encoding
//! - [`wire`] - the integer-array transport convention and the closed
//!   error-code taxonomy
//! - [`bridge`] - native buffer allocation for zero-copy handoff
//! - [`ffi`] - the C ABI: callback-driven backends, stack handles, and
//!   shared buffers for native hosts
//!
//! ## Example
//!
//! ```rust,ignore
//! use stack_bridge::{
//!     extract_planes, OutputWidth, PlaneRequest, StackHandle, VirtualFileRegistry,
//! };
//!
//! let files = VirtualFileRegistry::new();
//! let handle = StackHandle::open_bytes(backend, "0_0", "scan.lsm", bytes, &files)?;
//!
//! // All depth slices of timepoint 0, channel 2, as one flat 16-bit buffer.
//! let request = PlaneRequest::flat(0, 2, OutputWidth::Bits16);
//! let pixels = extract_planes(&handle, &request)?;
//!
//! handle.close()?;
//! ```

pub mod backend;
pub mod bridge;
pub mod error;
pub mod extract;
pub mod ffi;
pub mod meta;
pub mod stack;
pub mod vfs;
pub mod wire;

// Re-export commonly used types
pub use backend::{FormatReader, MetadataStore, PlaneGrid, StackHandle};
pub use bridge::NativeBuffer;
pub use error::{
    BackendError, BridgeError, ExtractError, MetadataError, OpenError, OutOfRange, RegistryError,
};
pub use extract::{
    extract_planes, OutputWidth, PixelData, PlaneRequest, SampleBuffer, SliceLayout,
};
pub use meta::{
    extract_metadata, CalibrationRecord, FixedPoint, MetadataRecord, WAVELENGTH_UNKNOWN,
};
pub use stack::{
    indexer::{from_index, to_index},
    PixelType, PlaneCoordinate, StackGeometry,
};
pub use vfs::{virtual_identifier, VirtualFileGuard, VirtualFileRegistry};
pub use wire::{
    encode_metadata, metadata_payload, pixel_payload, ErrorCode, METADATA_CALIBRATION_LEN,
    METADATA_PREFIX_LEN,
};
