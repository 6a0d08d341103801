//! Format backend interfaces.
//!
//! Decoding TIFF/LSM/proprietary microscopy containers is delegated to an
//! external format backend; this module defines the narrow interface the
//! core needs from it, the decoded-plane container it hands back, and the
//! acquisition-metadata store read alongside it.
//!
//! Implementations come from the embedding application (or from native
//! callbacks via [`crate::ffi`]); the crate itself never decodes pixels.

mod handle;

pub use handle::StackHandle;

use crate::error::BackendError;
use crate::stack::PixelType;
use crate::vfs::VirtualFileRegistry;

// =============================================================================
// PlaneGrid
// =============================================================================

/// One decoded 2D plane: a `width` x `height` grid of integer intensity
/// samples, stored row-major.
///
/// Samples are carried as `i32` regardless of the source pixel type; the
/// extractor narrows them to the requested output width on copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneGrid {
    width: u32,
    height: u32,
    samples: Vec<i32>,
}

impl PlaneGrid {
    /// Wrap a row-major sample vector.
    ///
    /// # Errors
    ///
    /// Rejects a vector whose length is not `width * height`.
    pub fn new(width: u32, height: u32, samples: Vec<i32>) -> Result<Self, BackendError> {
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(BackendError::Decode(format!(
                "plane grid holds {} samples, expected {expected} for {width}x{height}",
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// Plane width in samples.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Plane height in samples.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The sample at column `col`, row `row`.
    ///
    /// # Panics
    ///
    /// Panics if either coordinate is outside the grid; the extractor only
    /// walks coordinates validated against the geometry.
    #[inline]
    pub fn sample(&self, col: u32, row: u32) -> i32 {
        debug_assert!(col < self.width && row < self.height);
        self.samples[row as usize * self.width as usize + col as usize]
    }

    /// Row-major view of all samples.
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }
}

// =============================================================================
// FormatReader
// =============================================================================

/// The decoding interface the core consumes.
///
/// A reader is opened against a path or a registered virtual file, reports
/// the stack geometry, and decodes one plane at a time by linear index.
/// Readers are not safe for concurrent access; [`StackHandle`] serializes
/// calls behind a per-handle lock.
pub trait FormatReader: Send {
    /// Open the source behind `identifier`.
    ///
    /// Identifiers beginning with a registered virtual-file name must be
    /// resolved against `files` without touching the filesystem; anything
    /// else is treated as a path. Backends sniff the identifier's extension
    /// suffix to pick a decoder strategy.
    fn open(&mut self, identifier: &str, files: &VirtualFileRegistry)
        -> Result<(), BackendError>;

    /// Release the source. Called exactly once per successful `open`.
    fn close(&mut self) -> Result<(), BackendError>;

    /// Total number of planes in the current series.
    fn image_count(&self) -> u32;

    /// Plane width in samples.
    fn size_x(&self) -> u32;

    /// Plane height in samples.
    fn size_y(&self) -> u32;

    /// Number of depth slices.
    fn size_z(&self) -> u32;

    /// Number of channels.
    fn size_c(&self) -> u32;

    /// Number of timepoints.
    fn size_t(&self) -> u32;

    /// Sample representation of the decoded planes.
    fn pixel_type(&self) -> PixelType;

    /// Valid bits per sample.
    fn bits_per_pixel(&self) -> u32 {
        self.pixel_type().bits()
    }

    /// Decode the plane at `index`.
    fn open_plane(&mut self, index: u32) -> Result<PlaneGrid, BackendError>;

    /// Whether samples are indices into a color lookup table.
    fn is_indexed(&self) -> bool {
        false
    }

    /// The 8-bit lookup table for indexed data, as three `[256]` ramps
    /// (red, green, blue), if the backend provides one.
    fn lookup_table_8bit(&self) -> Option<[Vec<u8>; 3]> {
        None
    }

    /// The backend's own (z, c, t) decomposition of a linear plane index.
    ///
    /// Used to cross-check the indexer against the backend's native plane
    /// order; the default derives it from the advertised axis sizes.
    fn zct_coords(&self, index: u32) -> Result<(u32, u32, u32), BackendError> {
        let size_c = self.size_c().max(1);
        let time_step = size_c * self.size_z().max(1);
        let within_time = index % time_step;
        Ok((within_time / size_c, within_time % size_c, index / time_step))
    }
}

// =============================================================================
// MetadataStore
// =============================================================================

/// The acquisition-metadata interface the core consumes.
///
/// Backed by the XML metadata block most containers carry. All physical
/// values are nullable: a backend that knows nothing about calibration
/// simply answers `None` everywhere.
pub trait MetadataStore {
    /// Physical width of one sample, in the store's length unit.
    fn physical_size_x(&self, image: u32) -> Option<f64>;

    /// Physical height of one sample.
    fn physical_size_y(&self, image: u32) -> Option<f64>;

    /// Physical spacing between depth slices.
    fn physical_size_z(&self, image: u32) -> Option<f64>;

    /// Time between consecutive timepoints.
    fn time_increment(&self, image: u32) -> Option<f64>;

    /// Number of channels recorded for `image`.
    fn channel_count(&self, image: u32) -> u32;

    /// Excitation wavelength of one channel, if recorded.
    fn channel_excitation_wavelength(&self, image: u32, channel: u32) -> Option<f64>;
}

// =============================================================================
// Tests
// =============================================================================
