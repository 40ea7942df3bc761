//! Collaborator contracts: what the engines need from a container reader,
//! a decoder and a format converter, plus the values that cross those seams.

use bytes::Bytes;
use std::fmt;

use crate::error::Result;
use crate::frame::{PcmBlock, VideoFrame};
use crate::media::{AudioFormat, MediaKind, PixelFormat, Rational};

// ---------------------------------------------------------------------------
// FourCc
// ---------------------------------------------------------------------------

/// Four-character code identifying a codec or box type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc(\"{self}\")")
    }
}

// ---------------------------------------------------------------------------
// Track description
// ---------------------------------------------------------------------------

/// Picture parameters from the sample description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    /// Bits per pixel as declared in the sample entry.
    pub depth: u16,
    /// Pixel aspect ratio from `pasp`, `0/1` when absent.
    pub pixel_aspect: Rational,
}

/// Audio parameters from the sample description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

/// Static description of one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSummary {
    /// 1-based position of the track in the file.
    pub number: u32,
    /// Container-level track identifier.
    pub track_id: u32,
    pub kind: MediaKind,
    pub codec: FourCc,
    /// Ticks per second of every timestamp in this track.
    pub timescale: u32,
    /// Media duration in timescale ticks.
    pub duration: u64,
    /// Decoder configuration record (`avcC`, AudioSpecificConfig, ...).
    pub codec_private: Bytes,
    /// MPEG-4 object type indication from `esds`.
    pub object_type: Option<u8>,
    pub video: Option<VideoParams>,
    pub audio: Option<AudioParams>,
}

/// One compressed sample in decode order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDescriptor {
    /// 1-based decode-order index.
    pub decode_index: u32,
    pub dts: u64,
    /// Signed composition offset (`ctts`), 0 when absent.
    pub composition_offset: i64,
    pub duration: u32,
    pub size: u32,
    pub is_keyframe: bool,
    /// Nothing references this sample; never a seek target.
    pub is_disposable: bool,
}

/// One `elst` entry, converted to media timescale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditEntry {
    /// Presented duration in media timescale ticks.
    pub segment_duration: u64,
    /// First media time of the segment; −1 marks an empty edit.
    pub media_time: i64,
    /// Playback rate in 16.16 fixed point.
    pub media_rate: i32,
}

impl EditEntry {
    pub fn is_empty_edit(&self) -> bool {
        self.media_time == -1
    }
}

/// Full sample-level timeline of one track.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackTimeline {
    pub timescale: u32,
    pub samples: Vec<SampleDescriptor>,
    pub edits: Vec<EditEntry>,
    /// Amount added to every composition time so none precedes its decode
    /// time (the negated minimum composition offset, or 0).
    pub composition_to_decode_shift: u64,
}

impl TrackTimeline {
    /// Composition timestamp of a sample including the shift.
    pub fn cts(&self, sample: &SampleDescriptor) -> i64 {
        sample.dts as i64 + sample.composition_offset + self.composition_to_decode_shift as i64
    }

    /// Sum of all sample durations.
    pub fn media_duration(&self) -> u64 {
        self.samples.iter().map(|s| s.duration as u64).sum()
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Text(String),
    Binary(Bytes),
}

impl MetadataValue {
    /// Raw bytes of the value regardless of how it was typed.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Binary(b) => b,
        }
    }
}

/// A descriptive metadata item, e.g. an iTunes `----` custom item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataItem {
    /// Item key: the box type inside `ilst`.
    pub key: FourCc,
    /// Reverse-DNS namespace from `mean`, for custom items.
    pub meaning: Option<String>,
    /// Item name from `name`, for custom items.
    pub name: Option<String>,
    pub value: MetadataValue,
}

// ---------------------------------------------------------------------------
// Compressed units and decode results
// ---------------------------------------------------------------------------

/// One compressed sample handed from the demuxer to a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedUnit {
    pub track: u32,
    /// 1-based decode-order index.
    pub sample: u32,
    pub data: Bytes,
    pub dts: u64,
    /// Composition timestamp including the composition-to-decode shift.
    pub cts: i64,
    pub duration: u32,
    pub is_keyframe: bool,
}

/// Outcome of feeding a unit to, or draining, a decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    /// One output unit is ready.
    Unit(T),
    /// The decoder buffered the input (or is empty when draining).
    NeedMoreInput,
}

impl<T> Decoded<T> {
    pub fn into_unit(self) -> Option<T> {
        match self {
            Self::Unit(unit) => Some(unit),
            Self::NeedMoreInput => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Random-access reader over the tracks of a container.
pub trait Demuxer: Send {
    fn tracks(&self) -> &[TrackSummary];

    /// Sample table and edit list of a 1-based track.
    fn timeline(&self, track: u32) -> Result<TrackTimeline>;

    /// File-level descriptive metadata.
    fn metadata(&self) -> &[MetadataItem];

    /// Position the track so the next `read_next` returns `sample`.
    fn seek(&mut self, track: u32, sample: u32) -> Result<()>;

    /// Read the next sample in decode order; `None` at end of track.
    fn read_next(&mut self, track: u32) -> Result<Option<CompressedUnit>>;
}

impl<D: Demuxer + ?Sized> Demuxer for Box<D> {
    fn tracks(&self) -> &[TrackSummary] {
        (**self).tracks()
    }

    fn timeline(&self, track: u32) -> Result<TrackTimeline> {
        (**self).timeline(track)
    }

    fn metadata(&self) -> &[MetadataItem] {
        (**self).metadata()
    }

    fn seek(&mut self, track: u32, sample: u32) -> Result<()> {
        (**self).seek(track, sample)
    }

    fn read_next(&mut self, track: u32) -> Result<Option<CompressedUnit>> {
        (**self).read_next(track)
    }
}

/// A forward-only video decoder.
///
/// Output frames carry the `cts` of the unit they were decoded from in
/// [`VideoFrame::pts`], and come out in presentation order.
pub trait VideoDecoder: Send {
    fn name(&self) -> &str;

    /// Format of the frames this decoder emits.
    fn output_format(&self) -> PixelFormat;

    fn feed(&mut self, unit: &CompressedUnit) -> Result<Decoded<VideoFrame>>;

    /// Pull one delayed frame at end of stream.
    fn drain(&mut self) -> Result<Decoded<VideoFrame>>;

    /// Drop all buffered state; the next unit fed must be a seek point.
    fn flush(&mut self);
}

/// A forward-only audio decoder.
pub trait AudioDecoder: Send {
    fn name(&self) -> &str;

    fn output_format(&self) -> AudioFormat;

    fn feed(&mut self, unit: &CompressedUnit) -> Result<Decoded<PcmBlock>>;

    fn drain(&mut self) -> Result<Decoded<PcmBlock>>;

    fn flush(&mut self);
}

/// Opens decoders for tracks.
pub trait DecoderFactory {
    fn video(
        &self,
        track: &TrackSummary,
        forced_codec: Option<&str>,
        threads: u32,
    ) -> Result<Box<dyn VideoDecoder>>;

    fn audio(&self, track: &TrackSummary) -> Result<Box<dyn AudioDecoder>>;
}

/// Pixel format conversion.
pub trait VideoConverter: Send {
    fn supports(&self, from: PixelFormat, to: PixelFormat) -> bool;

    fn convert(&mut self, frame: &VideoFrame, target: PixelFormat) -> Result<VideoFrame>;
}

/// PCM sample format, layout and rate conversion.
pub trait AudioConverter: Send {
    fn supports(&self, from: &AudioFormat, to: &AudioFormat) -> bool;

    fn convert(&mut self, block: PcmBlock, target: &AudioFormat) -> Result<PcmBlock>;

    /// Drop any internal history after a discontinuity.
    fn reset(&mut self) {}

    /// Flush PCM still buffered inside the converter at end of stream.
    fn finish(&mut self, _target: &AudioFormat) -> Result<Option<PcmBlock>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_display() {
        assert_eq!(FourCc::new(b"avc1").to_string(), "avc1");
        assert_eq!(FourCc::new(b"raw ").to_string(), "raw ");
        assert_eq!(FourCc([0xa9, b'n', b'a', b'm']).to_string(), ".nam");
    }

    #[test]
    fn timeline_cts_includes_shift() {
        let sample = SampleDescriptor {
            decode_index: 1,
            dts: 1000,
            composition_offset: -500,
            duration: 1000,
            size: 10,
            is_keyframe: true,
            is_disposable: false,
        };
        let timeline = TrackTimeline {
            timescale: 30000,
            samples: vec![sample],
            edits: Vec::new(),
            composition_to_decode_shift: 500,
        };
        assert_eq!(timeline.cts(&sample), 1000);
        assert_eq!(timeline.media_duration(), 1000);
    }

    #[test]
    fn decoded_into_unit() {
        assert_eq!(Decoded::Unit(3).into_unit(), Some(3));
        assert_eq!(Decoded::<u8>::NeedMoreInput.into_unit(), None);
    }

    #[test]
    fn metadata_value_bytes() {
        assert_eq!(MetadataValue::Text("ab".into()).as_bytes(), b"ab");
        assert_eq!(
            MetadataValue::Binary(Bytes::from_static(&[1, 2])).as_bytes(),
            &[1, 2]
        );
    }
}
