//! Media-domain value types: track kinds, rationals, pixel and sample
//! formats, channel layouts.
//!
//! Enums serialize in lowercase (via `serde(rename_all = "lowercase")`) and
//! implement `Display` manually so the names used in config files, CLI flags
//! and log lines are identical.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// Kind of media a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Other,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Other => write!(f, "other"),
        }
    }
}

// ---------------------------------------------------------------------------
// Rational
// ---------------------------------------------------------------------------

/// Greatest common divisor. `gcd(0, 0)` is 0.
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// An unsigned ratio such as a framerate or a sample aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: u64,
    pub den: u64,
}

impl Rational {
    pub const fn new(num: u64, den: u64) -> Self {
        Self { num, den }
    }

    /// Divide both terms by their gcd. `0/0` stays as is.
    pub fn reduced(self) -> Self {
        let g = gcd(self.num, self.den);
        if g <= 1 {
            return self;
        }
        Self {
            num: self.num / g,
            den: self.den / g,
        }
    }

    pub fn as_f64(self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// Reciprocal, used to turn a framerate into a per-frame duration.
    pub fn inverse(self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

// ---------------------------------------------------------------------------
// PixelFormat
// ---------------------------------------------------------------------------

/// Pixel layouts the engine can carry between decoder, converter and sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Yuv420p,
    Yuv422p,
    Yuv444p,
    Nv12,
    /// Packed 4:2:2, byte order U Y V Y.
    Uyvy422,
    /// Packed 4:2:2, byte order Y U Y V.
    Yuyv422,
    Rgb24,
    Bgra,
    /// Planar 4:2:0, 10 bits in little-endian 16-bit words.
    Yuv420p10,
    /// Planar 4:2:2, 10 bits in little-endian 16-bit words.
    Yuv422p10,
}

/// Byte geometry of one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneGeometry {
    pub row_bytes: usize,
    pub rows: usize,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 10] = [
        Self::Yuv420p,
        Self::Yuv422p,
        Self::Yuv444p,
        Self::Nv12,
        Self::Uyvy422,
        Self::Yuyv422,
        Self::Rgb24,
        Self::Bgra,
        Self::Yuv420p10,
        Self::Yuv422p10,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Yuv420p => "yuv420p",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Nv12 => "nv12",
            Self::Uyvy422 => "uyvy422",
            Self::Yuyv422 => "yuyv422",
            Self::Rgb24 => "rgb24",
            Self::Bgra => "bgra",
            Self::Yuv420p10 => "yuv420p10",
            Self::Yuv422p10 => "yuv422p10",
        }
    }

    /// Bytes used to store one component sample.
    pub fn bytes_per_component(self) -> usize {
        if self.is_high_bit_depth() {
            2
        } else {
            1
        }
    }

    pub fn is_high_bit_depth(self) -> bool {
        matches!(self, Self::Yuv420p10 | Self::Yuv422p10)
    }

    pub fn bit_depth(self) -> u32 {
        if self.is_high_bit_depth() {
            10
        } else {
            8
        }
    }

    pub fn is_rgb(self) -> bool {
        matches!(self, Self::Rgb24 | Self::Bgra)
    }

    /// True when all components share one interleaved plane.
    pub fn is_packed(self) -> bool {
        matches!(
            self,
            Self::Uyvy422 | Self::Yuyv422 | Self::Rgb24 | Self::Bgra
        )
    }

    /// Horizontal and vertical chroma subsampling shifts.
    pub fn chroma_shift(self) -> (u32, u32) {
        match self {
            Self::Yuv420p | Self::Nv12 | Self::Yuv420p10 => (1, 1),
            Self::Yuv422p | Self::Uyvy422 | Self::Yuyv422 | Self::Yuv422p10 => (1, 0),
            Self::Yuv444p | Self::Rgb24 | Self::Bgra => (0, 0),
        }
    }

    /// Tightly packed plane geometry for a `width` x `height` picture.
    pub fn planes(self, width: u32, height: u32) -> Vec<PlaneGeometry> {
        let w = width as usize;
        let h = height as usize;
        let (sx, sy) = self.chroma_shift();
        let cw = (w + (1 << sx) - 1) >> sx;
        let ch = (h + (1 << sy) - 1) >> sy;
        let bpc = self.bytes_per_component();
        let luma = PlaneGeometry {
            row_bytes: w * bpc,
            rows: h,
        };
        let chroma = PlaneGeometry {
            row_bytes: cw * bpc,
            rows: ch,
        };
        match self {
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p | Self::Yuv420p10 | Self::Yuv422p10 => {
                vec![luma, chroma, chroma]
            }
            Self::Nv12 => vec![
                luma,
                PlaneGeometry {
                    row_bytes: cw * 2,
                    rows: ch,
                },
            ],
            Self::Uyvy422 | Self::Yuyv422 => vec![PlaneGeometry {
                row_bytes: cw * 4,
                rows: h,
            }],
            Self::Rgb24 => vec![PlaneGeometry {
                row_bytes: w * 3,
                rows: h,
            }],
            Self::Bgra => vec![PlaneGeometry {
                row_bytes: w * 4,
                rows: h,
            }],
        }
    }

    /// Total bytes of a tightly packed picture.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        self.planes(width, height)
            .iter()
            .map(|p| p.row_bytes * p.rows)
            .sum()
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    /// Accepts the canonical names plus the common host aliases
    /// (`yv12`, `i420`, `yuy2`, `rgb32`, ...), case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let format = match lower.as_str() {
            "yuv420p" | "yv12" | "i420" => Self::Yuv420p,
            "yuv422p" | "yv16" => Self::Yuv422p,
            "yuv444p" | "yv24" => Self::Yuv444p,
            "nv12" => Self::Nv12,
            "uyvy422" | "uyvy" | "2vuy" => Self::Uyvy422,
            "yuyv422" | "yuy2" | "yuyv" => Self::Yuyv422,
            "rgb24" | "rgb" => Self::Rgb24,
            "bgra" | "rgb32" => Self::Bgra,
            "yuv420p10" | "yuv420p10le" => Self::Yuv420p10,
            "yuv422p10" | "yuv422p10le" => Self::Yuv422p10,
            _ => return Err(Error::unsupported(format!("unknown pixel format '{s}'"))),
        };
        Ok(format)
    }
}

// ---------------------------------------------------------------------------
// SampleFormat
// ---------------------------------------------------------------------------

/// Interleaved PCM sample formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
}

impl SampleFormat {
    pub fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
        }
    }

    /// Byte value that encodes silence.
    pub fn silence_byte(self) -> u8 {
        match self {
            Self::U8 => 0x80,
            _ => 0,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => write!(f, "u8"),
            Self::S16 => write!(f, "s16"),
            Self::S32 => write!(f, "s32"),
            Self::F32 => write!(f, "f32"),
        }
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "u8" => Ok(Self::U8),
            "s16" => Ok(Self::S16),
            "s32" => Ok(Self::S32),
            "f32" | "flt" | "float" => Ok(Self::F32),
            _ => Err(Error::unsupported(format!("unknown sample format '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelLayout
// ---------------------------------------------------------------------------

/// Speaker bitmask, one bit per channel position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelLayout(pub u64);

/// Speaker position bits of a [`ChannelLayout`].
pub mod speaker {
    pub const FL: u64 = 0x1;
    pub const FR: u64 = 0x2;
    pub const FC: u64 = 0x4;
    pub const LFE: u64 = 0x8;
    pub const BL: u64 = 0x10;
    pub const BR: u64 = 0x20;
    pub const BC: u64 = 0x100;
    pub const SL: u64 = 0x200;
    pub const SR: u64 = 0x400;
}

use speaker::{BC, BL, BR, FC, FL, FR, LFE, SL, SR};

const NAMED_LAYOUTS: &[(&str, ChannelLayout)] = &[
    ("mono", ChannelLayout::MONO),
    ("stereo", ChannelLayout::STEREO),
    ("2.1", ChannelLayout::LAYOUT_2_1),
    ("3.0", ChannelLayout::LAYOUT_3_0),
    ("quad", ChannelLayout::QUAD),
    ("4.0", ChannelLayout::LAYOUT_4_0),
    ("5.0", ChannelLayout::LAYOUT_5_0),
    ("5.1", ChannelLayout::LAYOUT_5_1),
    ("6.1", ChannelLayout::LAYOUT_6_1),
    ("7.1", ChannelLayout::LAYOUT_7_1),
];

impl ChannelLayout {
    pub const MONO: Self = Self(FC);
    pub const STEREO: Self = Self(FL | FR);
    pub const LAYOUT_2_1: Self = Self(FL | FR | LFE);
    pub const LAYOUT_3_0: Self = Self(FL | FR | FC);
    pub const QUAD: Self = Self(FL | FR | BL | BR);
    pub const LAYOUT_4_0: Self = Self(FL | FR | FC | BC);
    pub const LAYOUT_5_0: Self = Self(FL | FR | FC | BL | BR);
    pub const LAYOUT_5_1: Self = Self(FL | FR | FC | LFE | BL | BR);
    pub const LAYOUT_6_1: Self = Self(FL | FR | FC | LFE | BC | SL | SR);
    pub const LAYOUT_7_1: Self = Self(FL | FR | FC | LFE | BL | BR | SL | SR);

    pub fn channel_count(self) -> u16 {
        self.0.count_ones() as u16
    }

    /// Conventional layout for a bare channel count.
    pub fn from_count(channels: u16) -> Self {
        match channels {
            1 => Self::MONO,
            2 => Self::STEREO,
            3 => Self::LAYOUT_2_1,
            4 => Self::QUAD,
            5 => Self::LAYOUT_5_0,
            6 => Self::LAYOUT_5_1,
            7 => Self::LAYOUT_6_1,
            8 => Self::LAYOUT_7_1,
            n => Self((1u64 << n.min(63)) - 1),
        }
    }

    pub fn has_lfe(self) -> bool {
        self.0 & LFE != 0
    }

    pub fn has_center(self) -> bool {
        self.0 & FC != 0
    }

    pub fn name(self) -> Option<&'static str> {
        NAMED_LAYOUTS
            .iter()
            .find(|(_, layout)| *layout == self)
            .map(|(name, _)| *name)
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:x}", self.0),
        }
    }
}

impl FromStr for ChannelLayout {
    type Err = Error;

    /// Accepts a layout name (`stereo`, `5.1`), a channel count (`6`) or a
    /// hexadecimal speaker mask (`0x3f`).
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        if let Some((_, layout)) = NAMED_LAYOUTS.iter().find(|(name, _)| *name == lower) {
            return Ok(*layout);
        }
        if let Some(hex) = lower.strip_prefix("0x") {
            return u64::from_str_radix(hex, 16)
                .ok()
                .filter(|mask| *mask != 0)
                .map(ChannelLayout)
                .ok_or_else(|| Error::unsupported(format!("bad channel mask '{s}'")));
        }
        match lower.parse::<u16>() {
            Ok(n) if (1..=63).contains(&n) => Ok(Self::from_count(n)),
            _ => Err(Error::unsupported(format!("unknown channel layout '{s}'"))),
        }
    }
}

impl Serialize for ChannelLayout {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChannelLayout {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// AudioFormat
// ---------------------------------------------------------------------------

/// Full description of an interleaved PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub layout: ChannelLayout,
    pub sample_rate: u32,
}

impl AudioFormat {
    pub fn channels(&self) -> u16 {
        self.layout.channel_count()
    }

    /// Bytes per interleaved sample frame (all channels).
    pub fn block_align(&self) -> usize {
        self.sample_format.bytes() * self.channels() as usize
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}Hz", self.sample_format, self.layout, self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rational_reduce() {
        assert_eq!(Rational::new(60000, 2002).reduced(), Rational::new(30000, 1001));
        assert_eq!(Rational::new(0, 0).reduced(), Rational::new(0, 0));
        assert_eq!(Rational::new(25, 1).inverse(), Rational::new(1, 25));
    }

    #[test]
    fn gcd_values() {
        assert_eq!(gcd(1001, 0), 1001);
        assert_eq!(gcd(0, 0), 0);
        assert_eq!(gcd(48, 18), 6);
    }

    #[test]
    fn yuv420p_planes_round_up_odd_sizes() {
        let planes = PixelFormat::Yuv420p.planes(5, 3);
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[0], PlaneGeometry { row_bytes: 5, rows: 3 });
        assert_eq!(planes[1], PlaneGeometry { row_bytes: 3, rows: 2 });
        assert_eq!(PixelFormat::Yuv420p.frame_size(4, 4), 16 + 4 + 4);
    }

    #[test]
    fn high_bit_depth_planes_use_two_bytes() {
        let planes = PixelFormat::Yuv420p10.planes(4, 2);
        assert_eq!(planes[0].row_bytes, 8);
        assert_eq!(planes[1].row_bytes, 4);
        assert!(PixelFormat::Yuv420p10.is_high_bit_depth());
        assert!(!PixelFormat::Nv12.is_high_bit_depth());
    }

    #[test]
    fn packed_geometry() {
        assert_eq!(
            PixelFormat::Uyvy422.planes(4, 2),
            vec![PlaneGeometry { row_bytes: 8, rows: 2 }]
        );
        assert_eq!(PixelFormat::Bgra.frame_size(2, 2), 16);
        assert_eq!(PixelFormat::Nv12.planes(4, 4)[1].row_bytes, 4);
    }

    #[test]
    fn pixel_format_aliases() {
        assert_eq!("YV12".parse::<PixelFormat>().unwrap(), PixelFormat::Yuv420p);
        assert_eq!("yuy2".parse::<PixelFormat>().unwrap(), PixelFormat::Yuyv422);
        assert_eq!("rgb32".parse::<PixelFormat>().unwrap(), PixelFormat::Bgra);
        assert!("yuv411p".parse::<PixelFormat>().is_err());
        for format in PixelFormat::ALL {
            assert_eq!(format.name().parse::<PixelFormat>().unwrap(), format);
        }
    }

    #[test]
    fn pixel_format_serde() {
        let json = serde_json::to_string(&PixelFormat::Yuv420p10).unwrap();
        assert_eq!(json, "\"yuv420p10\"");
    }

    #[test]
    fn sample_format_silence() {
        assert_eq!(SampleFormat::U8.silence_byte(), 0x80);
        assert_eq!(SampleFormat::S16.silence_byte(), 0);
        assert_eq!(SampleFormat::F32.bytes(), 4);
        assert_eq!("flt".parse::<SampleFormat>().unwrap(), SampleFormat::F32);
    }

    #[test]
    fn channel_layout_parse() {
        assert_eq!("stereo".parse::<ChannelLayout>().unwrap(), ChannelLayout::STEREO);
        assert_eq!("5.1".parse::<ChannelLayout>().unwrap().channel_count(), 6);
        assert_eq!("6".parse::<ChannelLayout>().unwrap(), ChannelLayout::LAYOUT_5_1);
        assert_eq!("0x3".parse::<ChannelLayout>().unwrap(), ChannelLayout::STEREO);
        assert!("surround".parse::<ChannelLayout>().is_err());
        assert!("0".parse::<ChannelLayout>().is_err());
    }

    #[test]
    fn channel_layout_display() {
        assert_eq!(ChannelLayout::LAYOUT_7_1.to_string(), "7.1");
        assert_eq!(ChannelLayout(0x7ff).to_string(), "0x7ff");
    }

    #[test]
    fn channel_layout_serde() {
        let json = serde_json::to_string(&ChannelLayout::LAYOUT_5_1).unwrap();
        assert_eq!(json, "\"5.1\"");
        let back: ChannelLayout = serde_json::from_str("\"mono\"").unwrap();
        assert_eq!(back, ChannelLayout::MONO);
    }

    #[test]
    fn audio_format_block_align() {
        let format = AudioFormat {
            sample_format: SampleFormat::S16,
            layout: ChannelLayout::STEREO,
            sample_rate: 48000,
        };
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.to_string(), "s16 stereo 48000Hz");
    }
}
