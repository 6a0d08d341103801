//! Test utilities for integration tests.
//!
//! Provides a configurable synthetic format backend so extraction and
//! metadata behavior can be verified without any real decoder.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stack_bridge::{
    BackendError, FormatReader, MetadataStore, PixelType, PlaneGrid, StackHandle,
    VirtualFileRegistry,
};

/// A synthetic backend with configurable geometry, plane content,
/// calibration metadata, and failure injection.
///
/// Planes are generated on demand: the sample at (plane `index`, column
/// `col`, row `row`) is whatever the `fill` function returns.
#[derive(Debug)]
pub struct SyntheticBackend {
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,
    pub pixel_type: PixelType,
    /// Sample generator: (plane index, col, row) -> intensity
    pub fill: fn(u32, u32, u32) -> i32,
    /// Planes at these indices fail to decode
    pub failing_planes: Vec<u32>,
    /// Refuse `open` entirely with an I/O error
    pub refuse_open: bool,
    /// Physical calibration [x, y, z]
    pub physical: [Option<f64>; 3],
    pub time_increment: Option<f64>,
    pub wavelengths: Vec<Option<f64>>,
    /// Number of `open_plane` calls served
    pub planes_served: Arc<AtomicUsize>,
}

impl SyntheticBackend {
    /// A tiny stack exercised across the test suite: 4x3 planes, 2 depth
    /// slices, single channel and timepoint, plane `d` filled with `d`.
    pub fn two_slice() -> Self {
        let mut backend = Self::with_geometry(4, 3, 2, 1, 1);
        backend.fill = |index, _, _| index as i32;
        backend
    }

    /// A backend with the given axes, zero-filled planes and no metadata.
    pub fn with_geometry(size_x: u32, size_y: u32, size_z: u32, size_c: u32, size_t: u32) -> Self {
        Self {
            size_x,
            size_y,
            size_z,
            size_c,
            size_t,
            pixel_type: PixelType::Uint16,
            fill: |_, _, _| 0,
            failing_planes: Vec::new(),
            refuse_open: false,
            physical: [None, None, None],
            time_increment: None,
            wavelengths: vec![None],
            planes_served: Arc::new(AtomicUsize::new(0)),
        }
    }

}

impl FormatReader for SyntheticBackend {
    fn open(&mut self, identifier: &str, files: &VirtualFileRegistry) -> Result<(), BackendError> {
        if self.refuse_open {
            return Err(BackendError::Io("synthetic source unreadable".to_string()));
        }
        // Virtual identifiers must resolve; paths are accepted as-is.
        if identifier.starts_with("bytes_") && files.resolve(identifier).is_err() {
            return Err(BackendError::UnresolvedIdentifier(identifier.to_string()));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn image_count(&self) -> u32 {
        self.size_z * self.size_c * self.size_t
    }

    fn size_x(&self) -> u32 {
        self.size_x
    }

    fn size_y(&self) -> u32 {
        self.size_y
    }

    fn size_z(&self) -> u32 {
        self.size_z
    }

    fn size_c(&self) -> u32 {
        self.size_c
    }

    fn size_t(&self) -> u32 {
        self.size_t
    }

    fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    fn open_plane(&mut self, index: u32) -> Result<PlaneGrid, BackendError> {
        if self.failing_planes.contains(&index) {
            return Err(BackendError::Decode(format!("plane {index} undecodable")));
        }
        self.planes_served.fetch_add(1, Ordering::SeqCst);

        let mut samples = Vec::with_capacity((self.size_x * self.size_y) as usize);
        for row in 0..self.size_y {
            for col in 0..self.size_x {
                samples.push((self.fill)(index, col, row));
            }
        }
        PlaneGrid::new(self.size_x, self.size_y, samples)
    }
}

impl MetadataStore for SyntheticBackend {
    fn physical_size_x(&self, _image: u32) -> Option<f64> {
        self.physical[0]
    }

    fn physical_size_y(&self, _image: u32) -> Option<f64> {
        self.physical[1]
    }

    fn physical_size_z(&self, _image: u32) -> Option<f64> {
        self.physical[2]
    }

    fn time_increment(&self, _image: u32) -> Option<f64> {
        self.time_increment
    }

    fn channel_count(&self, _image: u32) -> u32 {
        self.wavelengths.len() as u32
    }

    fn channel_excitation_wavelength(&self, _image: u32, channel: u32) -> Option<f64> {
        self.wavelengths.get(channel as usize).copied().flatten()
    }
}

/// Open a synthetic backend as a path-based handle.
pub fn open(backend: SyntheticBackend) -> StackHandle<SyntheticBackend> {
    let files = VirtualFileRegistry::new();
    StackHandle::open_path(backend, "/data/synthetic.lsm", &files)
        .expect("synthetic open failed")
}
