//! C ABI surface for native hosts.
//!
//! The crate builds as a `cdylib` so a native application can drive
//! extraction without embedding Rust: the host supplies its decoder as a
//! table of C callbacks ([`SbBackendVTable`]), opens a stack over a path
//! or an in-memory byte range, and receives metadata and pixel payloads
//! either as returned arrays or deposited into a shared [`SbBuffer`] it
//! reads in place.
//!
//! # Safety
//!
//! Everything here is `#[repr(C)]` or an opaque handle. The host is
//! responsible for:
//!
//! - passing only pointers obtained from this module (or valid, correctly
//!   sized arrays of its own): null handles are rejected, dangling ones
//!   cannot be detected;
//! - freeing every returned array and handle exactly once, with the
//!   matching `sb_free_*`/`sb_close_*`/`sb_buffer_free` call;
//! - keeping `user_data` and the callback table valid for the lifetime of
//!   the stacks opened over them, and callable from whichever thread the
//!   host calls in on.
//!
//! Failures never unwind across the boundary; they surface as the wire
//! error codes (single-element payloads or nonzero returns).

use std::ffi::CStr;
use std::os::raw::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};

use bytes::Bytes;
use libc::c_char;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::backend::{FormatReader, MetadataStore, PlaneGrid, StackHandle};
use crate::bridge::NativeBuffer;
use crate::error::BackendError;
use crate::extract::{OutputWidth, PlaneRequest};
use crate::stack::PixelType;
use crate::vfs::VirtualFileRegistry;
use crate::wire::{metadata_payload, pixel_payload, ErrorCode};

/// Success return for the `i32`-returning entry points.
pub const SB_OK: i32 = 0;

// =============================================================================
// Logging
// =============================================================================

/// Initialize the logging subsystem once per process.
///
/// `filter` is an env-filter directive string such as
/// `"stack_bridge=debug"`; pass null for the default. The
/// `RUST_LOG` environment variable takes precedence when set.
///
/// Returns [`SB_OK`], or [`ErrorCode::Unexpected`] if logging was already
/// initialized.
///
/// # Safety
///
/// `filter`, when non-null, must point to a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sb_init_logging(filter: *const c_char) -> i32 {
    let directive = if filter.is_null() {
        "stack_bridge=info".to_string()
    } else {
        match CStr::from_ptr(filter).to_str() {
            Ok(s) => s.to_string(),
            Err(_) => return ErrorCode::Unexpected.value(),
        }
    };

    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&directive)),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    match result {
        Ok(()) => SB_OK,
        Err(_) => ErrorCode::Unexpected.value(),
    }
}

// =============================================================================
// Native Buffers
// =============================================================================

/// Opaque handle to a native-allocated buffer.
///
/// Created by [`sb_buffer_alloc`]; the host reads the region through
/// [`sb_buffer_data`] and must release the handle with [`sb_buffer_free`]
/// exactly once.
#[repr(C)]
pub struct SbBuffer {
    _private: [u8; 0],
}

/// Allocate `capacity` bytes outside any managed heap.
///
/// Returns null if `capacity` is zero or the allocation fails. The region
/// is zero-initialized and its address is stable until freed.
#[no_mangle]
pub extern "C" fn sb_buffer_alloc(capacity: usize) -> *mut SbBuffer {
    match NativeBuffer::allocate(capacity) {
        Ok(buffer) => Box::into_raw(Box::new(buffer)).cast(),
        Err(e) => {
            warn!(capacity, error = %e, "native buffer allocation failed");
            std::ptr::null_mut()
        }
    }
}

/// Capacity in bytes of a buffer, or 0 for a null handle.
///
/// # Safety
///
/// `buffer` must be null or a live handle from [`sb_buffer_alloc`].
#[no_mangle]
pub unsafe extern "C" fn sb_buffer_capacity(buffer: *const SbBuffer) -> usize {
    match (buffer as *const NativeBuffer).as_ref() {
        Some(buffer) => buffer.capacity(),
        None => 0,
    }
}

/// The stable address of the buffer's region, or null for a null handle.
///
/// # Safety
///
/// `buffer` must be null or a live handle from [`sb_buffer_alloc`]. The
/// returned pointer is valid until [`sb_buffer_free`].
#[no_mangle]
pub unsafe extern "C" fn sb_buffer_data(buffer: *mut SbBuffer) -> *mut u8 {
    match (buffer as *mut NativeBuffer).as_mut() {
        Some(buffer) => buffer.address(),
        None => std::ptr::null_mut(),
    }
}

/// Copy `len` bytes from `source` into the buffer at `offset`.
///
/// Returns [`SB_OK`], or [`ErrorCode::BufferOverflow`] if the write would
/// exceed capacity (nothing is copied), or [`ErrorCode::Unexpected`] for
/// a null handle or source.
///
/// # Safety
///
/// `buffer` must be null or a live handle; `source` must be null or valid
/// for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn sb_buffer_write(
    buffer: *mut SbBuffer,
    offset: usize,
    source: *const u8,
    len: usize,
) -> i32 {
    let Some(buffer) = (buffer as *mut NativeBuffer).as_mut() else {
        return ErrorCode::Unexpected.value();
    };
    if source.is_null() {
        return ErrorCode::Unexpected.value();
    }
    let source = std::slice::from_raw_parts(source, len);
    match buffer.write_at(offset, source) {
        Ok(()) => SB_OK,
        Err(e) => ErrorCode::from(&e).value(),
    }
}

/// Release a buffer. Null is a no-op.
///
/// # Safety
///
/// `buffer` must be null or a live handle, and must not be used after
/// this call.
#[no_mangle]
pub unsafe extern "C" fn sb_buffer_free(buffer: *mut SbBuffer) {
    if !buffer.is_null() {
        drop(Box::from_raw(buffer as *mut NativeBuffer));
    }
}

// =============================================================================
// Callback Backend
// =============================================================================

/// Geometry snapshot exchanged with the host's decoder.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SbGeometry {
    pub plane_count: u32,
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,
    /// Pixel type code (0..=7, see [`PixelType`])
    pub pixel_type: u32,
    pub bits_per_pixel: u32,
}

/// The host-supplied decoder, as a table of C callbacks.
///
/// `open`, `close`, `geometry` and `open_plane` are required; the
/// metadata callbacks may be null, in which case every calibration value
/// reads as absent and wavelengths as unknown.
///
/// Callback conventions:
///
/// - `open`/`close`/`open_plane` return 0 on success, 1 for a
///   decode/format failure, 2 for an I/O failure.
/// - for a stack opened over registered bytes, `open` receives the
///   buffer as `bytes`/`len` alongside the synthetic identifier (whose
///   suffix carries the original extension for decoder sniffing); the
///   pointer stays valid until `close`. For path opens `bytes` is null
///   and the identifier is the path.
/// - `open_plane` must fill `samples` with exactly `len` row-major `i32`
///   samples (`len` is always `size_x * size_y`).
/// - the calibration and wavelength callbacks return 1 and fill `out`
///   when the value is present, 0 when it is absent. `axis` is 0 for X,
///   1 for Y, 2 for Z.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SbBackendVTable {
    /// Opaque host state passed back to every callback
    pub user_data: *mut c_void,
    pub open: Option<
        extern "C" fn(
            user_data: *mut c_void,
            identifier: *const c_char,
            bytes: *const u8,
            len: usize,
        ) -> i32,
    >,
    pub close: Option<extern "C" fn(user_data: *mut c_void) -> i32>,
    pub geometry: Option<extern "C" fn(user_data: *mut c_void, out: *mut SbGeometry) -> i32>,
    pub open_plane: Option<
        extern "C" fn(user_data: *mut c_void, index: u32, samples: *mut i32, len: usize) -> i32,
    >,
    pub physical_size:
        Option<extern "C" fn(user_data: *mut c_void, image: u32, axis: u32, out: *mut f64) -> i32>,
    pub time_increment:
        Option<extern "C" fn(user_data: *mut c_void, image: u32, out: *mut f64) -> i32>,
    pub channel_count: Option<extern "C" fn(user_data: *mut c_void, image: u32) -> u32>,
    pub excitation_wavelength: Option<
        extern "C" fn(user_data: *mut c_void, image: u32, channel: u32, out: *mut f64) -> i32,
    >,
}

/// Adapter running the core against a host callback table.
struct CallbackReader {
    vtable: SbBackendVTable,
    geometry: SbGeometry,
    /// For byte-backed opens, the resolved buffer; held so the pointer
    /// handed to the host's `open` stays valid until `close`.
    source: Option<Bytes>,
}

// The host guarantees its callbacks and user_data are callable from the
// thread driving this stack; the handle's lock already serializes calls.
unsafe impl Send for CallbackReader {}

impl CallbackReader {
    fn new(vtable: SbBackendVTable) -> Self {
        Self {
            vtable,
            geometry: SbGeometry::default(),
            source: None,
        }
    }

    fn translate(code: i32, what: &str) -> BackendError {
        match code {
            1 => BackendError::Decode(format!("host decoder rejected {what}")),
            2 => BackendError::Io(format!("host decoder I/O failure in {what}")),
            other => BackendError::Other(format!("host decoder returned {other} from {what}")),
        }
    }

    fn read_metadata_value(
        &self,
        cb: Option<extern "C" fn(*mut c_void, u32, u32, *mut f64) -> i32>,
        image: u32,
        axis: u32,
    ) -> Option<f64> {
        let cb = cb?;
        let mut out = 0.0;
        (cb(self.vtable.user_data, image, axis, &mut out) == 1).then_some(out)
    }
}

impl FormatReader for CallbackReader {
    fn open(
        &mut self,
        identifier: &str,
        files: &VirtualFileRegistry,
    ) -> Result<(), BackendError> {
        let open = self
            .vtable
            .open
            .ok_or_else(|| BackendError::Other("vtable missing open callback".to_string()))?;
        let geometry_cb = self
            .vtable
            .geometry
            .ok_or_else(|| BackendError::Other("vtable missing geometry callback".to_string()))?;

        // A registered identifier resolves to its bytes, which are handed
        // to the host directly; anything else is a path the host opens
        // itself.
        self.source = files.resolve(identifier).ok();
        let (bytes, len) = match &self.source {
            Some(source) => (source.as_ptr(), source.len()),
            None => (std::ptr::null(), 0),
        };

        let c_identifier = std::ffi::CString::new(identifier)
            .map_err(|_| BackendError::Other("identifier contains NUL".to_string()))?;
        let code = open(self.vtable.user_data, c_identifier.as_ptr(), bytes, len);
        if code != 0 {
            return Err(Self::translate(code, "open"));
        }

        let mut geometry = SbGeometry::default();
        let code = geometry_cb(self.vtable.user_data, &mut geometry);
        if code != 0 {
            return Err(Self::translate(code, "geometry"));
        }
        self.geometry = geometry;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        let close = self
            .vtable
            .close
            .ok_or_else(|| BackendError::Other("vtable missing close callback".to_string()))?;
        let code = close(self.vtable.user_data);
        if code != 0 {
            return Err(Self::translate(code, "close"));
        }
        Ok(())
    }

    fn image_count(&self) -> u32 {
        self.geometry.plane_count
    }

    fn size_x(&self) -> u32 {
        self.geometry.size_x
    }

    fn size_y(&self) -> u32 {
        self.geometry.size_y
    }

    fn size_z(&self) -> u32 {
        self.geometry.size_z
    }

    fn size_c(&self) -> u32 {
        self.geometry.size_c
    }

    fn size_t(&self) -> u32 {
        self.geometry.size_t
    }

    fn pixel_type(&self) -> PixelType {
        PixelType::from_code(self.geometry.pixel_type).unwrap_or(PixelType::Uint8)
    }

    fn bits_per_pixel(&self) -> u32 {
        self.geometry.bits_per_pixel
    }

    fn open_plane(&mut self, index: u32) -> Result<PlaneGrid, BackendError> {
        let open_plane = self
            .vtable
            .open_plane
            .ok_or_else(|| BackendError::Other("vtable missing open_plane callback".to_string()))?;

        let len = self.geometry.size_x as usize * self.geometry.size_y as usize;
        let mut samples = vec![0i32; len];
        let code = open_plane(self.vtable.user_data, index, samples.as_mut_ptr(), len);
        if code != 0 {
            return Err(Self::translate(code, "open_plane"));
        }
        PlaneGrid::new(self.geometry.size_x, self.geometry.size_y, samples)
    }
}

impl MetadataStore for CallbackReader {
    fn physical_size_x(&self, image: u32) -> Option<f64> {
        self.read_metadata_value(self.vtable.physical_size, image, 0)
    }

    fn physical_size_y(&self, image: u32) -> Option<f64> {
        self.read_metadata_value(self.vtable.physical_size, image, 1)
    }

    fn physical_size_z(&self, image: u32) -> Option<f64> {
        self.read_metadata_value(self.vtable.physical_size, image, 2)
    }

    fn time_increment(&self, image: u32) -> Option<f64> {
        let cb = self.vtable.time_increment?;
        let mut out = 0.0;
        (cb(self.vtable.user_data, image, &mut out) == 1).then_some(out)
    }

    fn channel_count(&self, image: u32) -> u32 {
        match self.vtable.channel_count {
            Some(cb) => cb(self.vtable.user_data, image),
            None => self.geometry.size_c,
        }
    }

    fn channel_excitation_wavelength(&self, image: u32, channel: u32) -> Option<f64> {
        let cb = self.vtable.excitation_wavelength?;
        let mut out = 0.0;
        (cb(self.vtable.user_data, image, channel, &mut out) == 1).then_some(out)
    }
}

// =============================================================================
// Stacks
// =============================================================================

/// Opaque handle to an open stack.
#[repr(C)]
pub struct SbStack {
    _private: [u8; 0],
}

/// The boxed state behind an [`SbStack`]: the handle plus the registry
/// its virtual-file registration lives in.
struct StackState {
    handle: StackHandle<CallbackReader>,
    _files: VirtualFileRegistry,
}

/// Open a stack over a filesystem path, decoding through the host's
/// callback table.
///
/// Returns null on any failure. Close with [`sb_close_stack`].
///
/// # Safety
///
/// `vtable` must point to a valid table whose callbacks stay callable
/// until the stack is closed; `identifier` must be a valid NUL-terminated
/// string.
#[no_mangle]
pub unsafe extern "C" fn sb_open_stack(
    vtable: *const SbBackendVTable,
    identifier: *const c_char,
) -> *mut SbStack {
    let Some(vtable) = vtable.as_ref() else {
        return std::ptr::null_mut();
    };
    if identifier.is_null() {
        return std::ptr::null_mut();
    }
    let Ok(identifier) = CStr::from_ptr(identifier).to_str() else {
        return std::ptr::null_mut();
    };

    let vtable = *vtable;
    let identifier = identifier.to_string();
    open_stack_guarded(move |files| {
        StackHandle::open_path(CallbackReader::new(vtable), &identifier, files)
    })
}

/// Open a stack over an in-memory byte range.
///
/// The bytes are copied and registered as a virtual file named
/// `bytes_<tag><suffix of source_name>`; the registration is released
/// when the stack closes. Returns null on any failure.
///
/// # Safety
///
/// `vtable` as for [`sb_open_stack`]; `tag` and `source_name` must be
/// valid NUL-terminated strings; `bytes` must be valid for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn sb_open_stack_bytes(
    vtable: *const SbBackendVTable,
    tag: *const c_char,
    source_name: *const c_char,
    bytes: *const u8,
    len: usize,
) -> *mut SbStack {
    let Some(vtable) = vtable.as_ref() else {
        return std::ptr::null_mut();
    };
    if tag.is_null() || source_name.is_null() || bytes.is_null() {
        return std::ptr::null_mut();
    }
    let (Ok(tag), Ok(source_name)) = (
        CStr::from_ptr(tag).to_str(),
        CStr::from_ptr(source_name).to_str(),
    ) else {
        return std::ptr::null_mut();
    };
    let buffer = Bytes::copy_from_slice(std::slice::from_raw_parts(bytes, len));

    let vtable = *vtable;
    let (tag, source_name) = (tag.to_string(), source_name.to_string());
    open_stack_guarded(move |files| {
        StackHandle::open_bytes(CallbackReader::new(vtable), &tag, &source_name, buffer, files)
    })
}

fn open_stack_guarded<E: std::fmt::Display>(
    open: impl FnOnce(&VirtualFileRegistry) -> Result<StackHandle<CallbackReader>, E>,
) -> *mut SbStack {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let files = VirtualFileRegistry::new();
        let handle = open(&files)?;
        Ok::<_, E>(StackState {
            handle,
            _files: files,
        })
    }));

    match outcome {
        Ok(Ok(state)) => Box::into_raw(Box::new(state)).cast(),
        Ok(Err(e)) => {
            warn!(error = %e, "stack open failed");
            std::ptr::null_mut()
        }
        Err(_) => {
            warn!("stack open panicked");
            std::ptr::null_mut()
        }
    }
}

/// Copy the stack's geometry snapshot into `out`.
///
/// Returns [`SB_OK`] or [`ErrorCode::Unexpected`] for null arguments.
///
/// # Safety
///
/// `stack` must be null or a live handle; `out` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn sb_stack_geometry(stack: *const SbStack, out: *mut SbGeometry) -> i32 {
    let Some(state) = (stack as *const StackState).as_ref() else {
        return ErrorCode::Unexpected.value();
    };
    let Some(out) = out.as_mut() else {
        return ErrorCode::Unexpected.value();
    };
    let geometry = state.handle.geometry();
    *out = SbGeometry {
        plane_count: geometry.plane_count,
        size_x: geometry.size_x,
        size_y: geometry.size_y,
        size_z: geometry.size_z,
        size_c: geometry.size_c,
        size_t: geometry.size_t,
        pixel_type: geometry.pixel_type.code(),
        bits_per_pixel: geometry.bits_per_pixel,
    };
    SB_OK
}

/// Extract the metadata transport array.
///
/// Returns a heap array of `*out_len` integers to free with
/// [`sb_free_i32`]; per the wire convention a length of 1 means the
/// single element is an error code. Returns null only for a null handle.
///
/// # Safety
///
/// `stack` must be null or a live handle; `out_len` must be valid.
#[no_mangle]
pub unsafe extern "C" fn sb_metadata(stack: *const SbStack, out_len: *mut usize) -> *mut i32 {
    let Some(state) = (stack as *const StackState).as_ref() else {
        return std::ptr::null_mut();
    };
    let payload = metadata_payload(&state.handle);
    leak_i32(payload, out_len)
}

/// Extract the flat pixel payload of one (time, channel) pair.
///
/// The returned region holds `*out_elements` samples of `width_bits` bits
/// each, native-endian, row-major with depth slices concatenated; free
/// with [`sb_free_pixels`]. A single-element payload carries an error
/// code instead of pixel data. `width_bits` must be 8, 16 or 32.
///
/// # Safety
///
/// `stack` must be null or a live handle; `out_elements` must be valid.
#[no_mangle]
pub unsafe extern "C" fn sb_extract_flat(
    stack: *const SbStack,
    time: u32,
    channel: u32,
    width_bits: u32,
    out_elements: *mut usize,
) -> *mut u8 {
    let Some(state) = (stack as *const StackState).as_ref() else {
        return std::ptr::null_mut();
    };
    if out_elements.is_null() {
        return std::ptr::null_mut();
    }
    let Some(width) = OutputWidth::from_bits(width_bits) else {
        return std::ptr::null_mut();
    };

    let request = PlaneRequest::flat(time, channel, width);
    let buffer = pixel_payload(&state.handle, &request).into_flat();

    *out_elements = buffer.len();
    let bytes = buffer.to_ne_bytes().into_boxed_slice();
    Box::into_raw(bytes) as *mut u8
}

/// Extract flat pixel data of one (time, channel) pair directly into a
/// native buffer, for zero-copy consumption.
///
/// On success the buffer's first `stack_len * width_bits / 8` bytes hold
/// the samples native-endian and [`SB_OK`] is returned. On extraction
/// failure the error code is returned and the buffer is untouched;
/// [`ErrorCode::BufferOverflow`] is returned if the payload does not fit.
///
/// # Safety
///
/// `stack` and `buffer` must be null or live handles from this module.
#[no_mangle]
pub unsafe extern "C" fn sb_extract_into(
    stack: *const SbStack,
    time: u32,
    channel: u32,
    width_bits: u32,
    buffer: *mut SbBuffer,
) -> i32 {
    let Some(state) = (stack as *const StackState).as_ref() else {
        return ErrorCode::Unexpected.value();
    };
    let Some(buffer) = (buffer as *mut NativeBuffer).as_mut() else {
        return ErrorCode::Unexpected.value();
    };
    let Some(width) = OutputWidth::from_bits(width_bits) else {
        return ErrorCode::Unexpected.value();
    };

    let request = PlaneRequest::flat(time, channel, width);
    let payload = pixel_payload(&state.handle, &request);
    if crate::wire::is_sentinel(&payload) {
        return payload
            .into_flat()
            .first()
            .unwrap_or(ErrorCode::Unexpected.value());
    }

    let bytes = payload.into_flat().to_ne_bytes();
    match buffer.write(&bytes) {
        Ok(()) => SB_OK,
        Err(e) => ErrorCode::from(&e).value(),
    }
}

/// Close a stack, releasing its reader and any virtual-file registration.
/// Null is a no-op.
///
/// # Safety
///
/// `stack` must be null or a live handle, and must not be used after
/// this call.
#[no_mangle]
pub unsafe extern "C" fn sb_close_stack(stack: *mut SbStack) {
    if !stack.is_null() {
        drop(Box::from_raw(stack as *mut StackState));
    }
}

/// Free an array returned by [`sb_metadata`].
///
/// # Safety
///
/// `ptr` and `len` must come from exactly one [`sb_metadata`] call.
#[no_mangle]
pub unsafe extern "C" fn sb_free_i32(ptr: *mut i32, len: usize) {
    if !ptr.is_null() {
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)));
    }
}

/// Free a region returned by [`sb_extract_flat`].
///
/// # Safety
///
/// `ptr`, `elements` and `width_bits` must come from exactly one
/// [`sb_extract_flat`] call.
#[no_mangle]
pub unsafe extern "C" fn sb_free_pixels(ptr: *mut u8, elements: usize, width_bits: u32) {
    if ptr.is_null() {
        return;
    }
    let bytes = elements * (width_bits as usize / 8);
    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, bytes)));
}

unsafe fn leak_i32(values: Vec<i32>, out_len: *mut usize) -> *mut i32 {
    if out_len.is_null() {
        return std::ptr::null_mut();
    }
    *out_len = values.len();
    Box::into_raw(values.into_boxed_slice()) as *mut i32
}

// =============================================================================
// Tests
// =============================================================================
