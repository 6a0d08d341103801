//! Coordinate-to-plane-index arithmetic.
//!
//! The backend stores a series as a flat sequence of planes ordered, outer
//! to inner, by time, then depth, then channel:
//!
//! ```text
//! index = time * (size_c * size_z) + depth * size_c + channel
//! ```
//!
//! Extraction walks this mapping for every depth slice of a fixed
//! (time, channel) pair, so getting it wrong reads the wrong physical plane.
//! Both directions reject out-of-range inputs instead of wrapping.

use crate::error::OutOfRange;
use crate::stack::{PlaneCoordinate, StackGeometry};

/// Map a logical (time, depth, channel) coordinate to the backend's linear
/// plane index.
///
/// # Errors
///
/// Returns [`OutOfRange`] naming the offending axis if any component falls
/// outside the geometry. A wrapped or clamped index is never produced.
pub fn to_index(coord: PlaneCoordinate, geometry: &StackGeometry) -> Result<u32, OutOfRange> {
    check_axis("time", coord.time, geometry.size_t)?;
    check_axis("depth", coord.depth, geometry.size_z)?;
    check_axis("channel", coord.channel, geometry.size_c)?;

    let time_step = geometry.size_c * geometry.size_z;
    Ok(coord.time * time_step + coord.depth * geometry.size_c + coord.channel)
}

/// Map a linear plane index back to its (time, depth, channel) coordinate.
///
/// Inverse of [`to_index`]: for every in-range coordinate the round trip is
/// the identity.
///
/// # Errors
///
/// Returns [`OutOfRange`] if `index >= plane_count`.
pub fn from_index(index: u32, geometry: &StackGeometry) -> Result<PlaneCoordinate, OutOfRange> {
    check_axis("plane", index, geometry.plane_count)?;

    let time_step = geometry.size_c * geometry.size_z;
    let time = index / time_step;
    let within_time = index % time_step;

    Ok(PlaneCoordinate {
        time,
        depth: within_time / geometry.size_c,
        channel: within_time % geometry.size_c,
    })
}

fn check_axis(axis: &'static str, value: u32, limit: u32) -> Result<(), OutOfRange> {
    if value >= limit {
        return Err(OutOfRange { axis, value, limit });
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
