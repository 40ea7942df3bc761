//! Host-side frame storage.
//!
//! A [`FrameSink`] is the piece of a host embedding that owns output
//! frames. [`PlanarSink`] keeps one buffer per plane; [`InterleavedSink`]
//! lays every plane out back to back in one buffer and can stack high bit
//! depth samples as an MSB plane above an LSB plane.

use bytes::Bytes;

use fsrc_core::{Error, PixelFormat, Result, VideoFrame};

use crate::negotiate::VideoNegotiation;

/// What a sink agreed to store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkFormat {
    pub format: PixelFormat,
    pub stacked: bool,
    pub direct: bool,
}

/// Pixel storage that either owns its bytes or shares a decoder buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaneData {
    Owned(Vec<u8>),
    /// Decoder buffer handed over by reference count.
    Shared(Bytes),
}

impl PlaneData {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(v) => v,
            Self::Shared(b) => b,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }
}

pub trait FrameSink {
    type Frame;

    /// Agree on the stored layout for a negotiated output.
    fn negotiate_format(&mut self, negotiation: &VideoNegotiation) -> Result<SinkFormat>;

    /// A host frame for a `width` x `height` picture in the agreed layout.
    fn allocate_frame(&mut self, width: u32, height: u32) -> Result<Self::Frame>;

    /// Store a decoded picture into `target`.
    fn write_pixels(&mut self, frame: &VideoFrame, target: &mut Self::Frame) -> Result<()>;
}

fn align_up(value: usize, alignment: usize) -> usize {
    match alignment {
        0 | 1 => value,
        a => value.div_ceil(a) * a,
    }
}

fn negotiated(format: &Option<SinkFormat>) -> Result<SinkFormat> {
    format.ok_or_else(|| Error::unsupported("sink used before negotiate_format"))
}

fn copy_rows(src: &fsrc_core::Plane, row_bytes: usize, dst: &mut [u8], dst_stride: usize) {
    for y in 0..src.rows {
        let row = &src.row(y)[..row_bytes.min(src.stride)];
        dst[y * dst_stride..y * dst_stride + row.len()].copy_from_slice(row);
    }
}

fn check_frame(frame: &VideoFrame, format: PixelFormat, width: u32, height: u32) -> Result<()> {
    if frame.format != format || frame.width != width || frame.height != height {
        return Err(Error::unsupported(format!(
            "sink expects {format} {width}x{height}, got {} {}x{}",
            frame.format, frame.width, frame.height
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// PlanarSink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlane {
    pub data: PlaneData,
    pub stride: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanarFrame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<HostPlane>,
}

/// One buffer per plane, rows padded to `alignment` bytes.
#[derive(Debug, Clone)]
pub struct PlanarSink {
    alignment: usize,
    format: Option<SinkFormat>,
}

impl Default for PlanarSink {
    fn default() -> Self {
        Self::new(32)
    }
}

impl PlanarSink {
    pub fn new(alignment: usize) -> Self {
        Self {
            alignment,
            format: None,
        }
    }
}

impl FrameSink for PlanarSink {
    type Frame = PlanarFrame;

    fn negotiate_format(&mut self, negotiation: &VideoNegotiation) -> Result<SinkFormat> {
        // Planar hosts take high bit depth planes as 16-bit words.
        let format = SinkFormat {
            format: negotiation.output,
            stacked: false,
            direct: negotiation.direct_rendering,
        };
        self.format = Some(format);
        Ok(format)
    }

    fn allocate_frame(&mut self, width: u32, height: u32) -> Result<PlanarFrame> {
        let agreed = negotiated(&self.format)?;
        let planes = agreed
            .format
            .planes(width, height)
            .into_iter()
            .map(|geometry| {
                let stride = align_up(geometry.row_bytes, self.alignment);
                HostPlane {
                    data: PlaneData::Owned(vec![0; stride * geometry.rows]),
                    stride,
                    rows: geometry.rows,
                }
            })
            .collect();
        Ok(PlanarFrame {
            format: agreed.format,
            width,
            height,
            planes,
        })
    }

    fn write_pixels(&mut self, frame: &VideoFrame, target: &mut PlanarFrame) -> Result<()> {
        let agreed = negotiated(&self.format)?;
        check_frame(frame, target.format, target.width, target.height)?;
        let geometry = target.format.planes(target.width, target.height);
        if agreed.direct {
            target.planes = frame
                .planes
                .iter()
                .map(|p| HostPlane {
                    data: PlaneData::Shared(p.data.clone()),
                    stride: p.stride,
                    rows: p.rows,
                })
                .collect();
            return Ok(());
        }
        for ((src, dst), g) in frame.planes.iter().zip(&mut target.planes).zip(&geometry) {
            if dst.data.is_shared() {
                dst.data = PlaneData::Owned(vec![0; dst.stride * dst.rows]);
            }
            if let PlaneData::Owned(buffer) = &mut dst.data {
                copy_rows(src, g.row_bytes, buffer, dst.stride);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InterleavedSink
// ---------------------------------------------------------------------------

/// Every plane in one buffer, back to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleavedFrame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub stacked: bool,
    pub data: PlaneData,
    /// Byte offset and pitch of each plane in `data`.
    pub planes: Vec<(usize, usize)>,
}

impl InterleavedFrame {
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        let (offset, _) = *self.planes.get(index)?;
        let end = self
            .planes
            .get(index + 1)
            .map_or(self.data.as_slice().len(), |(next, _)| *next);
        self.data.as_slice().get(offset..end)
    }

    pub fn pitch(&self, index: usize) -> Option<usize> {
        self.planes.get(index).map(|(_, pitch)| *pitch)
    }
}

/// Single contiguous buffer with rows padded to `alignment` bytes.
#[derive(Debug, Clone)]
pub struct InterleavedSink {
    alignment: usize,
    format: Option<SinkFormat>,
}

impl Default for InterleavedSink {
    fn default() -> Self {
        Self::new(16)
    }
}

impl InterleavedSink {
    pub fn new(alignment: usize) -> Self {
        Self {
            alignment,
            format: None,
        }
    }

    /// Row bytes and row count each plane occupies in the host buffer.
    fn layout(&self, agreed: SinkFormat, width: u32, height: u32) -> Vec<(usize, usize)> {
        agreed
            .format
            .planes(width, height)
            .into_iter()
            .map(|g| {
                if agreed.stacked {
                    // One byte per sample, twice as many rows.
                    (g.row_bytes / 2, g.rows * 2)
                } else {
                    (g.row_bytes, g.rows)
                }
            })
            .collect()
    }
}

impl FrameSink for InterleavedSink {
    type Frame = InterleavedFrame;

    fn negotiate_format(&mut self, negotiation: &VideoNegotiation) -> Result<SinkFormat> {
        let format = SinkFormat {
            format: negotiation.output,
            stacked: negotiation.stacked,
            // Only a single-plane picture arrives as one shareable buffer.
            direct: negotiation.direct_rendering && negotiation.output.is_packed(),
        };
        self.format = Some(format);
        Ok(format)
    }

    fn allocate_frame(&mut self, width: u32, height: u32) -> Result<InterleavedFrame> {
        let agreed = negotiated(&self.format)?;
        let mut offset = 0;
        let planes = self
            .layout(agreed, width, height)
            .into_iter()
            .map(|(row_bytes, rows)| {
                let pitch = align_up(row_bytes, self.alignment);
                let plane = (offset, pitch);
                offset += pitch * rows;
                plane
            })
            .collect();
        Ok(InterleavedFrame {
            format: agreed.format,
            width,
            height,
            stacked: agreed.stacked,
            data: PlaneData::Owned(vec![0; offset]),
            planes,
        })
    }

    fn write_pixels(&mut self, frame: &VideoFrame, target: &mut InterleavedFrame) -> Result<()> {
        let agreed = negotiated(&self.format)?;
        check_frame(frame, target.format, target.width, target.height)?;
        if agreed.direct && frame.planes.len() == 1 {
            target.data = PlaneData::Shared(frame.planes[0].data.clone());
            target.planes = vec![(0, frame.planes[0].stride)];
            return Ok(());
        }
        let layout = self.layout(agreed, target.width, target.height);
        let buffer = match &mut target.data {
            PlaneData::Owned(v) => v,
            PlaneData::Shared(_) => {
                return Err(Error::unsupported("cannot write into a shared frame"));
            }
        };
        let geometry = target.format.planes(target.width, target.height);
        for (index, src) in frame.planes.iter().enumerate() {
            let (Some(&(offset, pitch)), Some(g), Some(&(_, rows))) =
                (target.planes.get(index), geometry.get(index), layout.get(index))
            else {
                break;
            };
            let dst = &mut buffer[offset..offset + pitch * rows];
            if agreed.stacked {
                stack_plane(src, g.row_bytes, dst, pitch);
            } else {
                copy_rows(src, g.row_bytes, dst, pitch);
            }
        }
        Ok(())
    }
}

/// Split little-endian 16-bit samples into an MSB plane above an LSB plane.
fn stack_plane(src: &fsrc_core::Plane, row_bytes: usize, dst: &mut [u8], pitch: usize) {
    let lsb_base = src.rows * pitch;
    for y in 0..src.rows {
        let row = &src.row(y)[..row_bytes.min(src.stride)];
        for (x, word) in row.chunks_exact(2).enumerate() {
            dst[y * pitch + x] = word[1];
            dst[lsb_base + y * pitch + x] = word[0];
        }
    }
}
