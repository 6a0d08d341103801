//! Virtual file registry.
//!
//! Format backends open their input "by path". To feed them a buffer that
//! never touched the filesystem, the caller registers the bytes under a
//! synthetic path-like identifier; the backend's open routine then resolves
//! the identifier against this table instead of the real filesystem.
//!
//! Unlike the process-global mapping in older designs, the registry here is
//! an owned value: callers construct one, hand it to the handles that need
//! it, and every registration is released by a guard when the owning handle
//! closes. Nothing outlives its owner and nothing is ambient.
//!
//! The identifier must keep the original file's extension suffix, because
//! backends select their decoder strategy by suffix sniffing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::debug;

use crate::error::RegistryError;

/// Build a synthetic identifier for an in-memory byte range.
///
/// The identifier is `bytes_<tag><suffix>`, where `suffix` is the extension
/// (including the dot) taken from `source_name`. A source name without an
/// extension yields a bare `bytes_<tag>` identifier, which most backends
/// will refuse; callers should prefer named sources.
///
/// # Example
///
/// ```
/// use stack_bridge::vfs::virtual_identifier;
///
/// assert_eq!(virtual_identifier("0_2", "recording.lsm"), "bytes_0_2.lsm");
/// assert_eq!(virtual_identifier("scan", "plain"), "bytes_scan");
/// ```
pub fn virtual_identifier(tag: &str, source_name: &str) -> String {
    let suffix = match source_name.rfind('.') {
        Some(dot) => &source_name[dot..],
        None => "",
    };
    format!("bytes_{tag}{suffix}")
}

/// Table mapping synthetic identifiers to in-memory byte buffers.
///
/// Cloning the registry is cheap and yields a second handle onto the same
/// table, which is how a registry is shared between the caller and the
/// backends it opens. Entries are exclusive: registering an identifier that
/// is already present is an error, not a silent replacement.
#[derive(Debug, Clone, Default)]
pub struct VirtualFileRegistry {
    inner: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl VirtualFileRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under `identifier`.
    ///
    /// Returns a guard that removes the entry when dropped, tying the
    /// registration's lifetime to whoever holds the guard (normally the
    /// stack handle opened on top of it).
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyRegistered`] if the identifier is taken.
    pub fn register(
        &self,
        identifier: impl Into<String>,
        bytes: Bytes,
    ) -> Result<VirtualFileGuard, RegistryError> {
        let identifier = identifier.into();
        let mut table = self.lock();
        if table.contains_key(&identifier) {
            return Err(RegistryError::AlreadyRegistered(identifier));
        }
        debug!(identifier = %identifier, len = bytes.len(), "registering virtual file");
        table.insert(identifier.clone(), bytes);
        drop(table);

        Ok(VirtualFileGuard {
            registry: self.clone(),
            identifier,
        })
    }

    /// Resolve an identifier to its registered bytes.
    ///
    /// The returned [`Bytes`] is a cheap reference-counted view; the entry
    /// stays registered.
    pub fn resolve(&self, identifier: &str) -> Result<Bytes, RegistryError> {
        self.lock()
            .get(identifier)
            .cloned()
            .ok_or_else(|| RegistryError::NotRegistered(identifier.to_string()))
    }

    /// Whether an identifier is currently registered.
    pub fn contains(&self, identifier: &str) -> bool {
        self.lock().contains_key(identifier)
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry holds no registrations.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn unregister(&self, identifier: &str) {
        if self.lock().remove(identifier).is_some() {
            debug!(identifier = %identifier, "released virtual file");
        }
    }

    // A poisoned table only means another thread panicked mid-insert; the
    // map itself is still structurally sound, so recover it.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Bytes>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ownership token for one registration.
///
/// Dropping the guard removes the entry from the registry. Guards are held
/// by the stack handle opened over the registered bytes, so the entry lives
/// exactly as long as the handle on every exit path.
#[derive(Debug)]
pub struct VirtualFileGuard {
    registry: VirtualFileRegistry,
    identifier: String,
}

impl VirtualFileGuard {
    /// The identifier this guard owns.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl Drop for VirtualFileGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.identifier);
    }
}

// =============================================================================
// Tests
// =============================================================================
