//! Acquisition metadata extraction.
//!
//! Reads the stack geometry and the physical calibration (pixel size,
//! time increment, per-channel excitation wavelengths) from an open handle
//! and packs them into a fixed-layout record.
//!
//! Fractional calibration values travel through an integer-only transport,
//! so each one is carried as a fixed-point pair: the integer part and the
//! fractional part scaled by 10^4. Internally a missing value is an
//! explicit `None` rather than a zero pair, so "no calibration" and "a
//! genuine zero" stay distinguishable until the wire boundary flattens
//! them.

use serde::Serialize;
use tracing::debug;

use crate::backend::{FormatReader, MetadataStore, StackHandle};
use crate::error::MetadataError;
use crate::stack::StackGeometry;

/// Wire sentinel for a channel with no recorded excitation wavelength.
/// Real wavelengths are always non-negative.
pub const WAVELENGTH_UNKNOWN: i32 = -1;

/// Scale applied to the fractional part of a fixed-point calibration value.
pub const FIXED_POINT_SCALE: f64 = 10_000.0;

// =============================================================================
// FixedPoint
// =============================================================================

/// A non-negative fractional value split into an integer part and a
/// fractional part scaled by 10^4.
///
/// `0.125` becomes `(0, 1250)`; `3.5` becomes `(3, 5000)`. The fractional
/// part is truncated, not rounded, matching the transport this record was
/// built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FixedPoint {
    /// Integer part
    pub integer: i32,

    /// Fractional part, scaled by 10^4
    pub fraction: i32,
}

impl FixedPoint {
    /// Split a floating-point value into its fixed-point parts.
    pub fn from_f64(value: f64) -> Self {
        let integer = value as i32;
        let fraction = ((value - integer as f64) * FIXED_POINT_SCALE) as i32;
        Self { integer, fraction }
    }

    /// Recombine the parts, for diagnostics.
    pub fn to_f64(&self) -> f64 {
        self.integer as f64 + self.fraction as f64 / FIXED_POINT_SCALE
    }
}

// =============================================================================
// CalibrationRecord
// =============================================================================

/// Physical calibration of an image series. Every field is optional: a
/// backend with no calibration metadata answers `None` throughout.
///
/// Computed once per open handle, immutable, discarded with the handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CalibrationRecord {
    /// Physical width of one sample
    pub physical_size_x: Option<FixedPoint>,

    /// Physical height of one sample
    pub physical_size_y: Option<FixedPoint>,

    /// Physical spacing between depth slices
    pub physical_size_z: Option<FixedPoint>,

    /// Time between consecutive timepoints
    pub time_increment: Option<FixedPoint>,
}

// =============================================================================
// MetadataRecord
// =============================================================================

/// Geometry, calibration, and per-channel excitation wavelengths of one
/// image series.
#[derive(Debug, Clone, Serialize)]
pub struct MetadataRecord {
    /// Geometry snapshot of the series
    pub geometry: StackGeometry,

    /// Physical calibration, where recorded
    pub calibration: CalibrationRecord,

    /// One entry per channel of the first image in the series;
    /// [`WAVELENGTH_UNKNOWN`] where no wavelength was recorded.
    pub wavelengths: Vec<i32>,
}

impl MetadataRecord {
    /// JSON rendering of the record, for host-side diagnostics and logs.
    pub fn summary_json(&self) -> String {
        // Serialization of these plain derives cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Extract the metadata record of an open handle.
///
/// Geometry comes from the handle's snapshot; calibration and wavelengths
/// come from the backend's metadata store, evaluated against the first
/// image of the series.
///
/// # Errors
///
/// [`MetadataError::ArraySizeExceeded`] if `size_x * size_y * size_z`
/// does not fit the signed 32-bit range the transport array uses; no
/// partially filled record is ever produced. Backend failures surface as
/// [`MetadataError::Backend`].
pub fn extract_metadata<B>(handle: &StackHandle<B>) -> Result<MetadataRecord, MetadataError>
where
    B: FormatReader + MetadataStore,
{
    let geometry = *handle.geometry();

    let elements =
        geometry.size_x as u64 * geometry.size_y as u64 * geometry.size_z as u64;
    if elements > i32::MAX as u64 {
        return Err(MetadataError::ArraySizeExceeded { elements });
    }

    let reader = handle.lock()?;

    let calibration = CalibrationRecord {
        physical_size_x: reader.physical_size_x(0).map(FixedPoint::from_f64),
        physical_size_y: reader.physical_size_y(0).map(FixedPoint::from_f64),
        physical_size_z: reader.physical_size_z(0).map(FixedPoint::from_f64),
        time_increment: reader.time_increment(0).map(FixedPoint::from_f64),
    };

    // One slot per channel of the first image; a channel with no recorded
    // wavelength keeps its slot with the sentinel so later channels do not
    // shift.
    let channel_count = reader.channel_count(0);
    let wavelengths = (0..channel_count)
        .map(|c| {
            reader
                .channel_excitation_wavelength(0, c)
                .map(|w| w as i32)
                .unwrap_or(WAVELENGTH_UNKNOWN)
        })
        .collect();

    debug!(
        identifier = %handle.identifier(),
        channels = channel_count,
        "extracted metadata"
    );

    Ok(MetadataRecord {
        geometry,
        calibration,
        wavelengths,
    })
}

// =============================================================================
// Tests
// =============================================================================
