//! Open stack handles.
//!
//! A [`StackHandle`] pairs an opened format reader with the geometry
//! snapshot captured at open time. Readers are not safe for concurrent
//! access, so the handle keeps its reader behind a mutex: at most one
//! extraction or metadata call runs per handle at a time. Callers wanting
//! parallel extraction open independent handles.
//!
//! When the handle was opened over registered bytes it also owns the
//! virtual-file registration, so the registry entry is released on every
//! exit path: explicit [`StackHandle::close`], error return, or drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{BackendError, OpenError};
use crate::stack::StackGeometry;
use crate::vfs::{virtual_identifier, VirtualFileGuard, VirtualFileRegistry};

use super::FormatReader;

/// An opened image series: reader, geometry snapshot, and (for byte-backed
/// opens) the virtual-file registration keeping the bytes resolvable.
#[derive(Debug)]
pub struct StackHandle<B: FormatReader> {
    reader: Mutex<B>,
    geometry: StackGeometry,
    identifier: String,
    closed: AtomicBool,
    _registration: Option<VirtualFileGuard>,
}

impl<B: FormatReader> StackHandle<B> {
    /// Open a series from a filesystem path.
    pub fn open_path(
        backend: B,
        path: &str,
        files: &VirtualFileRegistry,
    ) -> Result<Self, OpenError> {
        Self::open_inner(backend, path.to_string(), None, files)
    }

    /// Open a series from an in-memory byte buffer.
    ///
    /// The bytes are registered in `files` under a synthetic
    /// `bytes_<tag><suffix>` identifier, with the extension suffix taken
    /// from `source_name` so the backend can sniff a decoder. The
    /// registration is released when the handle closes.
    ///
    /// # Errors
    ///
    /// [`OpenError::Registry`] if the synthetic identifier is already
    /// taken (the caller is re-registering without closing), or
    /// [`OpenError::Backend`] if the backend rejects the bytes.
    pub fn open_bytes(
        backend: B,
        tag: &str,
        source_name: &str,
        bytes: Bytes,
        files: &VirtualFileRegistry,
    ) -> Result<Self, OpenError> {
        let identifier = virtual_identifier(tag, source_name);
        let guard = files.register(identifier.clone(), bytes)?;
        // If the backend rejects the bytes the guard drops here and the
        // registration is released with it.
        Self::open_inner(backend, identifier, Some(guard), files)
    }

    fn open_inner(
        mut backend: B,
        identifier: String,
        registration: Option<VirtualFileGuard>,
        files: &VirtualFileRegistry,
    ) -> Result<Self, OpenError> {
        backend.open(&identifier, files)?;

        let geometry = StackGeometry {
            plane_count: backend.image_count(),
            size_x: backend.size_x(),
            size_y: backend.size_y(),
            size_z: backend.size_z(),
            size_c: backend.size_c(),
            size_t: backend.size_t(),
            pixel_type: backend.pixel_type(),
            bits_per_pixel: backend.bits_per_pixel(),
        };
        if let Err(e) = geometry.validate() {
            // The reader did open; release it before reporting the broken
            // geometry.
            if let Err(close_err) = backend.close() {
                warn!(identifier = %identifier, error = %close_err, "close after failed open");
            }
            return Err(e.into());
        }

        debug!(
            identifier = %identifier,
            planes = geometry.plane_count,
            x = geometry.size_x,
            y = geometry.size_y,
            z = geometry.size_z,
            c = geometry.size_c,
            t = geometry.size_t,
            "opened stack"
        );

        Ok(Self {
            reader: Mutex::new(backend),
            geometry,
            identifier,
            closed: AtomicBool::new(false),
            _registration: registration,
        })
    }

    /// The geometry snapshot captured at open time.
    pub fn geometry(&self) -> &StackGeometry {
        &self.geometry
    }

    /// The identifier this handle was opened with (a path or a synthetic
    /// virtual-file name).
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Run `f` with exclusive access to the reader.
    pub fn with_reader<T>(&self, f: impl FnOnce(&mut B) -> T) -> Result<T, BackendError> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    /// Close the reader and release the virtual-file registration.
    ///
    /// Dropping the handle closes it as well; this form surfaces the
    /// backend's close error instead of logging it.
    pub fn close(self) -> Result<(), BackendError> {
        self.close_inner()
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, B>, BackendError> {
        self.reader
            .lock()
            .map_err(|_| BackendError::Other("stack handle lock poisoned".to_string()))
    }

    fn close_inner(&self) -> Result<(), BackendError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(identifier = %self.identifier, "closing stack");
        self.lock()?.close()
    }
}

impl<B: FormatReader> Drop for StackHandle<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close_inner() {
            warn!(identifier = %self.identifier, error = %e, "close on drop failed");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
