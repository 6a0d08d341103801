//! Pixel plane extraction.
//!
//! The extractor walks every depth slice of a fixed (time, channel) pair,
//! maps each slice through the plane indexer, asks the backend for the
//! decoded grid, and copies samples into the output at the requested width.
//!
//! Two decisions are fixed here and must not drift:
//!
//! - **Copy order is row-major, height outer**: the sample at (row `h`,
//!   col `w`) lands at offset `h * size_x + w` within its slice.
//! - **Narrowing truncates**: a sample is cast to the output width keeping
//!   only the low bits, so 300 narrowed to 8 bits is 44. This is lossy by
//!   design whenever the source pixel type is wider than the output.
//!
//! One parameterized routine serves all output widths and both layouts.

use tracing::debug;

use crate::backend::{FormatReader, PlaneGrid, StackHandle};
use crate::error::ExtractError;
use crate::stack::{indexer, PlaneCoordinate, StackGeometry};

// =============================================================================
// Request Options
// =============================================================================

/// Output sample width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputWidth {
    /// 8-bit signed output elements
    Bits8,
    /// 16-bit signed output elements
    Bits16,
    /// 32-bit signed output elements
    Bits32,
}

impl OutputWidth {
    /// Width in bits.
    pub const fn bits(&self) -> u32 {
        match self {
            OutputWidth::Bits8 => 8,
            OutputWidth::Bits16 => 16,
            OutputWidth::Bits32 => 32,
        }
    }

    /// Parse a bit count.
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(OutputWidth::Bits8),
            16 => Some(OutputWidth::Bits16),
            32 => Some(OutputWidth::Bits32),
            _ => None,
        }
    }
}

/// How the extracted depth slices are assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceLayout {
    /// One contiguous buffer of `size_x * size_y * size_z` elements
    Flat,
    /// `size_z` separate buffers of `size_x * size_y` elements each
    PerSlice,
}

/// A request for the pixel data of one (time, channel) pair across all
/// depth slices.
#[derive(Debug, Clone, Copy)]
pub struct PlaneRequest {
    /// Timepoint to extract
    pub time: u32,

    /// Channel to extract
    pub channel: u32,

    /// Output sample width
    pub width: OutputWidth,

    /// Output assembly
    pub layout: SliceLayout,
}

impl PlaneRequest {
    /// A flat request at the given width.
    pub fn flat(time: u32, channel: u32, width: OutputWidth) -> Self {
        Self {
            time,
            channel,
            width,
            layout: SliceLayout::Flat,
        }
    }

    /// A per-slice request at the given width.
    pub fn per_slice(time: u32, channel: u32, width: OutputWidth) -> Self {
        Self {
            time,
            channel,
            width,
            layout: SliceLayout::PerSlice,
        }
    }
}

// =============================================================================
// Output Buffers
// =============================================================================

/// A buffer of narrowed samples at one of the three output widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleBuffer {
    /// 8-bit signed samples
    I8(Vec<i8>),
    /// 16-bit signed samples
    I16(Vec<i16>),
    /// 32-bit signed samples
    I32(Vec<i32>),
}

impl SampleBuffer {
    /// An empty buffer of the given width with reserved capacity.
    pub fn with_capacity(width: OutputWidth, capacity: usize) -> Self {
        match width {
            OutputWidth::Bits8 => SampleBuffer::I8(Vec::with_capacity(capacity)),
            OutputWidth::Bits16 => SampleBuffer::I16(Vec::with_capacity(capacity)),
            OutputWidth::Bits32 => SampleBuffer::I32(Vec::with_capacity(capacity)),
        }
    }

    /// A one-element buffer, used for the wire sentinel convention.
    pub fn single(width: OutputWidth, value: i32) -> Self {
        match width {
            OutputWidth::Bits8 => SampleBuffer::I8(vec![value as i8]),
            OutputWidth::Bits16 => SampleBuffer::I16(vec![value as i16]),
            OutputWidth::Bits32 => SampleBuffer::I32(vec![value]),
        }
    }

    /// Append one sample, truncating to this buffer's width.
    ///
    /// Truncation keeps the low bits of the two's-complement value: 300
    /// narrowed to 8 bits is 44, -1 stays -1 at every width.
    #[inline]
    pub fn push_narrowed(&mut self, sample: i32) {
        match self {
            SampleBuffer::I8(v) => v.push(sample as i8),
            SampleBuffer::I16(v) => v.push(sample as i16),
            SampleBuffer::I32(v) => v.push(sample),
        }
    }

    /// The first sample, widened to `i32`. Used to read an error code out
    /// of a sentinel payload.
    pub fn first(&self) -> Option<i32> {
        match self {
            SampleBuffer::I8(v) => v.first().map(|&s| s as i32),
            SampleBuffer::I16(v) => v.first().map(|&s| s as i32),
            SampleBuffer::I32(v) => v.first().copied(),
        }
    }

    /// Number of samples held.
    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::I8(v) => v.len(),
            SampleBuffer::I16(v) => v.len(),
            SampleBuffer::I32(v) => v.len(),
        }
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The width of this buffer's samples.
    pub fn width(&self) -> OutputWidth {
        match self {
            SampleBuffer::I8(_) => OutputWidth::Bits8,
            SampleBuffer::I16(_) => OutputWidth::Bits16,
            SampleBuffer::I32(_) => OutputWidth::Bits32,
        }
    }

    /// Serialize the samples to native-endian bytes, for depositing into a
    /// native buffer.
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        match self {
            SampleBuffer::I8(v) => v.iter().map(|&s| s as u8).collect(),
            SampleBuffer::I16(v) => v.iter().flat_map(|s| s.to_ne_bytes()).collect(),
            SampleBuffer::I32(v) => v.iter().flat_map(|s| s.to_ne_bytes()).collect(),
        }
    }

    /// Append all samples of `other` to `self`.
    ///
    /// # Panics
    ///
    /// Panics if the widths differ; callers concatenate buffers produced
    /// by one request, which share a width.
    pub fn extend_from(&mut self, other: &SampleBuffer) {
        match (self, other) {
            (SampleBuffer::I8(a), SampleBuffer::I8(b)) => a.extend_from_slice(b),
            (SampleBuffer::I16(a), SampleBuffer::I16(b)) => a.extend_from_slice(b),
            (SampleBuffer::I32(a), SampleBuffer::I32(b)) => a.extend_from_slice(b),
            _ => panic!("cannot concatenate sample buffers of different widths"),
        }
    }
}

/// Extracted pixel data in the requested layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelData {
    /// All depth slices concatenated into one buffer
    Flat(SampleBuffer),
    /// One buffer per depth slice
    PerSlice(Vec<SampleBuffer>),
}

impl PixelData {
    /// The layout of this data.
    pub fn layout(&self) -> SliceLayout {
        match self {
            PixelData::Flat(_) => SliceLayout::Flat,
            PixelData::PerSlice(_) => SliceLayout::PerSlice,
        }
    }

    /// Total number of samples across all slices.
    pub fn len(&self) -> usize {
        match self {
            PixelData::Flat(buf) => buf.len(),
            PixelData::PerSlice(slices) => slices.iter().map(SampleBuffer::len).sum(),
        }
    }

    /// Whether no samples are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten to a single buffer, concatenating per-slice data in depth
    /// order. A flat payload is returned as-is.
    pub fn into_flat(self) -> SampleBuffer {
        match self {
            PixelData::Flat(buf) => buf,
            PixelData::PerSlice(slices) => {
                let mut iter = slices.into_iter();
                let mut first = match iter.next() {
                    Some(buf) => buf,
                    None => SampleBuffer::I8(Vec::new()),
                };
                for slice in iter {
                    first.extend_from(&slice);
                }
                first
            }
        }
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Extract all depth slices of one (time, channel) pair.
///
/// Iterates `depth` from `0` to `size_z - 1`, maps each (time, depth,
/// channel) coordinate to a linear plane index, decodes the plane, and
/// copies it row-major into the output at the requested width.
///
/// # Errors
///
/// - [`ExtractError::OutOfRange`] if the selector is outside the geometry
/// - [`ExtractError::Backend`] if a plane fails to decode
/// - [`ExtractError::GridMismatch`] if a decoded grid contradicts the
///   geometry the backend advertised at open
pub fn extract_planes<B: FormatReader>(
    handle: &StackHandle<B>,
    request: &PlaneRequest,
) -> Result<PixelData, ExtractError> {
    let geometry = *handle.geometry();

    // Validate the selector before touching the backend; the depth loop is
    // in range by construction.
    if request.time >= geometry.size_t {
        return Err(crate::error::OutOfRange {
            axis: "time",
            value: request.time,
            limit: geometry.size_t,
        }
        .into());
    }
    if request.channel >= geometry.size_c {
        return Err(crate::error::OutOfRange {
            axis: "channel",
            value: request.channel,
            limit: geometry.size_c,
        }
        .into());
    }

    let mut reader = handle.lock()?;

    debug!(
        identifier = %handle.identifier(),
        time = request.time,
        channel = request.channel,
        bits = request.width.bits(),
        layout = ?request.layout,
        "extracting planes"
    );

    match request.layout {
        SliceLayout::Flat => {
            let mut out = SampleBuffer::with_capacity(request.width, geometry.stack_len());
            for depth in 0..geometry.size_z {
                let grid = fetch_plane(&mut *reader, &geometry, request, depth)?;
                copy_grid(&grid, &mut out);
            }
            Ok(PixelData::Flat(out))
        }
        SliceLayout::PerSlice => {
            let mut slices = Vec::with_capacity(geometry.size_z as usize);
            for depth in 0..geometry.size_z {
                let grid = fetch_plane(&mut *reader, &geometry, request, depth)?;
                let mut slice = SampleBuffer::with_capacity(request.width, geometry.slice_len());
                copy_grid(&grid, &mut slice);
                slices.push(slice);
            }
            Ok(PixelData::PerSlice(slices))
        }
    }
}

fn fetch_plane<B: FormatReader>(
    reader: &mut B,
    geometry: &StackGeometry,
    request: &PlaneRequest,
    depth: u32,
) -> Result<PlaneGrid, ExtractError> {
    let coord = PlaneCoordinate::new(request.time, depth, request.channel);
    let index = indexer::to_index(coord, geometry)?;
    let grid = reader.open_plane(index)?;

    if grid.width() != geometry.size_x || grid.height() != geometry.size_y {
        return Err(ExtractError::GridMismatch {
            plane: index,
            width: geometry.size_x,
            height: geometry.size_y,
            actual_width: grid.width(),
            actual_height: grid.height(),
        });
    }
    Ok(grid)
}

/// Copy one decoded grid into the output, row-major with height outer:
/// sample (row `h`, col `w`) lands at slice offset `h * width + w`.
fn copy_grid(grid: &PlaneGrid, out: &mut SampleBuffer) {
    for row in 0..grid.height() {
        for col in 0..grid.width() {
            out.push_narrowed(grid.sample(col, row));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
