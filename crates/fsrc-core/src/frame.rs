//! Decoded picture and PCM containers exchanged between decoders,
//! converters and sinks.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::media::{AudioFormat, PixelFormat, Rational};

// ---------------------------------------------------------------------------
// Picture metadata
// ---------------------------------------------------------------------------

/// Coding type of a decoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PictureType {
    I,
    P,
    B,
    #[default]
    Unknown,
}

impl PictureType {
    pub fn as_char(self) -> char {
        match self {
            Self::I => 'I',
            Self::P => 'P',
            Self::B => 'B',
            Self::Unknown => '?',
        }
    }
}

impl fmt::Display for PictureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Quantization range of the luma/chroma samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRange {
    Limited,
    Full,
    #[default]
    Unspecified,
}

impl fmt::Display for ColorRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited => write!(f, "limited"),
            Self::Full => write!(f, "full"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Matrix coefficients, reported to hosts with their ISO/IEC 23091-2 code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMatrix {
    Rgb,
    Bt709,
    #[default]
    Unspecified,
    Bt601,
    Bt2020Ncl,
}

impl ColorMatrix {
    pub fn code(self) -> u8 {
        match self {
            Self::Rgb => 0,
            Self::Bt709 => 1,
            Self::Unspecified => 2,
            Self::Bt601 => 6,
            Self::Bt2020Ncl => 9,
        }
    }
}

// ---------------------------------------------------------------------------
// VideoFrame
// ---------------------------------------------------------------------------

/// One plane of a picture. `data` holds `rows` rows of `stride` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Bytes,
    pub stride: usize,
    pub rows: usize,
}

impl Plane {
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.stride]
    }
}

/// A decoded picture.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: Vec<Plane>,
    /// Composition timestamp copied from the compressed unit that produced it.
    pub pts: i64,
    pub picture_type: PictureType,
    pub keyframe: bool,
    pub interlaced: bool,
    pub top_field_first: bool,
    pub color_range: ColorRange,
    pub color_matrix: ColorMatrix,
    pub sample_aspect: Rational,
}

impl VideoFrame {
    /// Wrap one contiguous, tightly packed buffer, slicing it into planes
    /// without copying.
    pub fn from_packed(format: PixelFormat, width: u32, height: u32, data: Bytes) -> Result<Self> {
        let expected = format.frame_size(width, height);
        if data.len() < expected {
            return Err(Error::decode(format!(
                "{format} {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        let mut offset = 0;
        let planes = format
            .planes(width, height)
            .into_iter()
            .map(|geometry| {
                let len = geometry.row_bytes * geometry.rows;
                let plane = Plane {
                    data: data.slice(offset..offset + len),
                    stride: geometry.row_bytes,
                    rows: geometry.rows,
                };
                offset += len;
                plane
            })
            .collect();
        Ok(Self::with_planes(format, width, height, planes))
    }

    /// A black picture, used as a placeholder once decoding has failed.
    pub fn blank(format: PixelFormat, width: u32, height: u32) -> Self {
        let planes = format
            .planes(width, height)
            .into_iter()
            .enumerate()
            .map(|(index, geometry)| {
                let len = geometry.row_bytes * geometry.rows;
                let data: Vec<u8> = black_pattern(format, index)
                    .iter()
                    .cycle()
                    .take(len)
                    .copied()
                    .collect();
                Plane {
                    data: Bytes::from(data),
                    stride: geometry.row_bytes,
                    rows: geometry.rows,
                }
            })
            .collect();
        let mut frame = Self::with_planes(format, width, height, planes);
        frame.color_range = if format.is_rgb() {
            ColorRange::Full
        } else {
            ColorRange::Limited
        };
        frame
    }

    pub fn with_planes(format: PixelFormat, width: u32, height: u32, planes: Vec<Plane>) -> Self {
        Self {
            width,
            height,
            format,
            planes,
            pts: 0,
            picture_type: PictureType::Unknown,
            keyframe: false,
            interlaced: false,
            top_field_first: false,
            color_range: ColorRange::Unspecified,
            color_matrix: ColorMatrix::Unspecified,
            sample_aspect: Rational::new(0, 1),
        }
    }

    /// Copy metadata (everything but the pixels) from another frame.
    pub fn copy_props_from(&mut self, other: &VideoFrame) {
        self.pts = other.pts;
        self.picture_type = other.picture_type;
        self.keyframe = other.keyframe;
        self.interlaced = other.interlaced;
        self.top_field_first = other.top_field_first;
        self.color_range = other.color_range;
        self.color_matrix = other.color_matrix;
        self.sample_aspect = other.sample_aspect;
    }
}

fn black_pattern(format: PixelFormat, plane: usize) -> &'static [u8] {
    match (format, plane) {
        (PixelFormat::Yuv420p10 | PixelFormat::Yuv422p10, 0) => &[0x40, 0x00],
        (PixelFormat::Yuv420p10 | PixelFormat::Yuv422p10, _) => &[0x00, 0x02],
        (PixelFormat::Uyvy422, _) => &[0x80, 0x10],
        (PixelFormat::Yuyv422, _) => &[0x10, 0x80],
        (PixelFormat::Rgb24, _) => &[0x00],
        (PixelFormat::Bgra, _) => &[0x00, 0x00, 0x00, 0xff],
        (_, 0) => &[0x10],
        (_, _) => &[0x80],
    }
}

// ---------------------------------------------------------------------------
// PcmBlock
// ---------------------------------------------------------------------------

/// A run of interleaved PCM sample frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBlock {
    pub format: AudioFormat,
    pub data: Vec<u8>,
}

impl PcmBlock {
    pub fn new(format: AudioFormat, data: Vec<u8>) -> Self {
        Self { format, data }
    }

    pub fn silence(format: AudioFormat, frames: usize) -> Self {
        Self {
            format,
            data: vec![format.sample_format.silence_byte(); frames * format.block_align()],
        }
    }

    /// Number of sample frames (one sample per channel each).
    pub fn frames(&self) -> usize {
        match self.format.block_align() {
            0 => 0,
            align => self.data.len() / align,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
