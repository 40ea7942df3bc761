//! Scripted demuxer and decoders for driving the engines without files.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use fsrc_core::{
    AudioDecoder, CompressedUnit, Decoded, DecoderFactory, Demuxer, Error, FourCc, MediaKind,
    MetadataItem, PixelFormat, Rational, Result, SampleDescriptor, TrackSummary, TrackTimeline,
    VideoDecoder, VideoFrame, VideoParams,
};

pub const TICKS_PER_FRAME: u64 = 1001;
pub const TIMESCALE: u32 = 30000;

/// Luma written into frames decoded without their references.
pub const DAMAGED: u8 = 0xff;

// ---------------------------------------------------------------------------
// Timelines
// ---------------------------------------------------------------------------

/// `count` frames in decode order equal to presentation order.
pub fn linear_timeline(count: u32, keyframes: &[u32]) -> TrackTimeline {
    let samples = (1..=count)
        .map(|i| SampleDescriptor {
            decode_index: i,
            dts: (i as u64 - 1) * TICKS_PER_FRAME,
            composition_offset: 0,
            duration: TICKS_PER_FRAME as u32,
            size: 1,
            is_keyframe: keyframes.contains(&i),
            is_disposable: false,
        })
        .collect();
    TrackTimeline {
        timescale: TIMESCALE,
        samples,
        edits: Vec::new(),
        composition_to_decode_shift: 0,
    }
}

/// Presentation position of the sample at 0-based decode position `i` in an
/// I P B P B ... stream: every anchor is sent one frame ahead of the
/// disposable picture shown before it.
pub fn reordered_position(i: u32) -> u32 {
    match i {
        0 => 0,
        i if i % 2 == 1 => i + 1,
        i => i - 1,
    }
}

/// An odd number of frames with one disposable B picture after each anchor.
pub fn reordered_timeline(count: u32, keyframes: &[u32]) -> TrackTimeline {
    assert!(count % 2 == 1, "the pattern needs an odd frame count");
    let samples = (0..count)
        .map(|i| {
            let position = reordered_position(i);
            let dts = i as u64 * TICKS_PER_FRAME;
            let cts = (position as u64 + 1) * TICKS_PER_FRAME;
            SampleDescriptor {
                decode_index: i + 1,
                dts,
                composition_offset: cts as i64 - dts as i64,
                duration: TICKS_PER_FRAME as u32,
                size: 1,
                is_keyframe: keyframes.contains(&(i + 1)),
                is_disposable: i > 0 && i % 2 == 0,
            }
        })
        .collect();
    TrackTimeline {
        timescale: TIMESCALE,
        samples,
        edits: Vec::new(),
        composition_to_decode_shift: 0,
    }
}

pub fn video_summary(number: u32) -> TrackSummary {
    TrackSummary {
        number,
        track_id: number,
        kind: MediaKind::Video,
        codec: FourCc::new(b"mock"),
        timescale: TIMESCALE,
        duration: 0,
        codec_private: Bytes::new(),
        object_type: None,
        video: Some(VideoParams {
            width: 2,
            height: 2,
            depth: 24,
            pixel_aspect: Rational::new(0, 1),
        }),
        audio: None,
    }
}

// ---------------------------------------------------------------------------
// Demuxer
// ---------------------------------------------------------------------------

/// Everything the scripted demuxer was asked to do.
#[derive(Debug, Default)]
pub struct DemuxLog {
    pub seeks: Vec<u32>,
    pub reads: Vec<u32>,
}

/// One-track demuxer over a timeline; every sample's payload is its
/// 1-based decode index as a little-endian `u32`.
pub struct ScriptedDemuxer {
    tracks: Vec<TrackSummary>,
    timeline: TrackTimeline,
    next: u32,
    fail_reads_at: Option<u32>,
    pub log: Arc<Mutex<DemuxLog>>,
}

impl ScriptedDemuxer {
    pub fn new(summary: TrackSummary, timeline: TrackTimeline) -> Self {
        Self {
            tracks: vec![summary],
            timeline,
            next: 1,
            fail_reads_at: None,
            log: Arc::default(),
        }
    }

    pub fn failing_at(mut self, sample: u32) -> Self {
        self.fail_reads_at = Some(sample);
        self
    }
}

impl Demuxer for ScriptedDemuxer {
    fn tracks(&self) -> &[TrackSummary] {
        &self.tracks
    }

    fn timeline(&self, track: u32) -> Result<TrackTimeline> {
        if track != self.tracks[0].number {
            return Err(Error::TrackNotFound {
                requested: track,
                available: 1,
            });
        }
        Ok(self.timeline.clone())
    }

    fn metadata(&self) -> &[MetadataItem] {
        &[]
    }

    fn seek(&mut self, _track: u32, sample: u32) -> Result<()> {
        if sample == 0 || sample as usize > self.timeline.samples.len() + 1 {
            return Err(Error::demux(format!("cannot seek to {sample}")));
        }
        self.log.lock().seeks.push(sample);
        self.next = sample;
        Ok(())
    }

    fn read_next(&mut self, track: u32) -> Result<Option<CompressedUnit>> {
        let Some(s) = self.timeline.samples.get(self.next as usize - 1).copied() else {
            return Ok(None);
        };
        if self.fail_reads_at == Some(s.decode_index) {
            return Err(Error::demux("read past truncated mdat"));
        }
        self.log.lock().reads.push(s.decode_index);
        self.next += 1;
        Ok(Some(CompressedUnit {
            track,
            sample: s.decode_index,
            data: Bytes::copy_from_slice(&s.decode_index.to_le_bytes()),
            dts: s.dts,
            cts: self.timeline.cts(&s),
            duration: s.duration,
            is_keyframe: s.is_keyframe,
        }))
    }
}

// ---------------------------------------------------------------------------
// Video decoder
// ---------------------------------------------------------------------------

/// Knobs for [`ReferenceDecoder`].
#[derive(Debug, Clone, Default)]
pub struct DecoderScript {
    /// Frames held back before the first output, like a decoder with
    /// reordering delay.
    pub delay: usize,
    /// Samples whose feed fails.
    pub fail_on: Vec<u32>,
    /// Samples that are consumed without ever producing a picture.
    pub silent: Vec<u32>,
}

/// A decoder that honours reference structure: after a flush it needs a
/// keyframe, and a disposable picture needs two anchors decoded since the
/// flush. Pictures decoded without their references come out with
/// [`DAMAGED`] luma.
///
/// Output is 2x2 YUV 4:4:4 whose luma carries the decode index.
pub struct ReferenceDecoder {
    script: DecoderScript,
    anchors: usize,
    pending: BTreeMap<i64, VideoFrame>,
    pub flushes: Arc<Mutex<u32>>,
}

impl ReferenceDecoder {
    pub fn new(script: DecoderScript) -> Self {
        Self {
            script,
            anchors: 0,
            pending: BTreeMap::new(),
            flushes: Arc::default(),
        }
    }

    fn picture(unit: &CompressedUnit, damaged: bool) -> Result<VideoFrame> {
        let index = u32::from_le_bytes(
            unit.data[..4]
                .try_into()
                .map_err(|_| Error::decode("short sample"))?,
        );
        let luma = if damaged { DAMAGED } else { (index % 255) as u8 };
        let mut data = vec![luma; 4];
        data.extend_from_slice(&[0x80; 8]);
        let mut frame = VideoFrame::from_packed(PixelFormat::Yuv444p, 2, 2, Bytes::from(data))?;
        frame.pts = unit.cts;
        frame.keyframe = unit.is_keyframe;
        frame.picture_type = if unit.is_keyframe {
            fsrc_core::PictureType::I
        } else {
            fsrc_core::PictureType::P
        };
        Ok(frame)
    }

    fn pop(&mut self) -> Option<VideoFrame> {
        let (_, frame) = self.pending.pop_first()?;
        Some(frame)
    }
}

/// Decode index a [`ReferenceDecoder`] frame came from, or `None` when the
/// picture is damaged.
pub fn decoded_index(frame: &VideoFrame) -> Option<u8> {
    let luma = frame.planes[0].data[0];
    (luma != DAMAGED).then_some(luma)
}

impl VideoDecoder for ReferenceDecoder {
    fn name(&self) -> &str {
        "reference"
    }

    fn output_format(&self) -> PixelFormat {
        PixelFormat::Yuv444p
    }

    fn feed(&mut self, unit: &CompressedUnit) -> Result<Decoded<VideoFrame>> {
        if self.script.fail_on.contains(&unit.sample) {
            return Err(Error::decode(format!("corrupt sample {}", unit.sample)));
        }
        if self.script.silent.contains(&unit.sample) {
            return Ok(Decoded::NeedMoreInput);
        }
        // With reordering, odd samples after the first are B pictures
        // (see `reordered_timeline`).
        let disposable = unit.sample > 1 && unit.sample % 2 == 1 && !unit.is_keyframe;
        let damaged = if unit.is_keyframe {
            self.anchors += 1;
            false
        } else if disposable && self.script.delay > 0 {
            self.anchors < 2
        } else {
            let damaged = self.anchors == 0;
            self.anchors += 1;
            damaged
        };
        let frame = Self::picture(unit, damaged)?;
        self.pending.insert(frame.pts, frame);
        if self.pending.len() > self.script.delay {
            return Ok(self.pop().map_or(Decoded::NeedMoreInput, Decoded::Unit));
        }
        Ok(Decoded::NeedMoreInput)
    }

    fn drain(&mut self) -> Result<Decoded<VideoFrame>> {
        Ok(self.pop().map_or(Decoded::NeedMoreInput, Decoded::Unit))
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.anchors = 0;
        *self.flushes.lock() += 1;
    }
}

/// Hands out one pre-built video decoder; audio is not supported.
pub struct ScriptedFactory {
    script: DecoderScript,
}

impl ScriptedFactory {
    pub fn new(script: DecoderScript) -> Self {
        Self { script }
    }
}

impl DecoderFactory for ScriptedFactory {
    fn video(
        &self,
        _track: &TrackSummary,
        forced_codec: Option<&str>,
        _threads: u32,
    ) -> Result<Box<dyn VideoDecoder>> {
        if let Some(name) = forced_codec {
            return Err(Error::decoder_open(name, "unknown decoder"));
        }
        Ok(Box::new(ReferenceDecoder::new(self.script.clone())))
    }

    fn audio(&self, track: &TrackSummary) -> Result<Box<dyn AudioDecoder>> {
        Err(Error::decoder_open(track.codec.to_string(), "video only"))
    }
}
