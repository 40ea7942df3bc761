//! Video seek engine: turns random presentation-order frame requests into
//! the cheapest sequence of demuxer seeks and decoder feeds.
//!
//! A target that fails to come out is retried once from a keyframe, except
//! after an Unsafe mode direct seek: that miss is a decode error.
//!
//! The engine works on the decoder's native frames. Format conversion,
//! placeholders in the output format and sink hand-off happen one layer up
//! in [`crate::source`].

use fsrc_core::{
    ColorMatrix, ColorRange, Decoded, Demuxer, Error, PixelFormat, Rational, Result, SeekMode,
    VideoDecoder, VideoFrame,
};

use crate::index::TrackIndex;

/// Properties carried alongside every frame handed to a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameProps {
    pub sample_aspect: Rational,
    /// Frame duration as a fraction of a second (the inverse framerate).
    pub duration_num: u64,
    pub duration_den: u64,
    pub color_range: ColorRange,
    pub color_matrix: ColorMatrix,
    pub picture_type: char,
    pub field_based: bool,
    /// 1-based decode-order index of the sample the frame came from.
    pub decode_index: u32,
    /// 0-based presentation position.
    pub presentation_index: u32,
    /// Set when the frame is a blank stand-in for a failed decode.
    pub placeholder: bool,
}

/// A frame plus its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub frame: VideoFrame,
    pub props: FrameProps,
}

/// Counters for observing strategy decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeekStats {
    pub seeks: u64,
    pub feeds: u64,
    /// Decode index of the most recent demuxer seek.
    pub last_seek_target: Option<u32>,
    pub cache_hits: u64,
    pub placeholders: u64,
}

/// Where the decoder currently stands in the track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeCursor {
    /// Presentation position of the last frame handed out.
    pub last_requested_presentation_frame: Option<u32>,
    /// Presentation position of the last frame the decoder produced.
    pub last_decoded_presentation_frame: Option<u32>,
    /// Decode index of the sample whose frame was last produced.
    pub last_decoded_sample_index: Option<u32>,
    /// Decode index the demuxer hands out next.
    pub next_sample: u32,
    /// The demuxer hit end of track and the decoder is being drained.
    pub drained: bool,
}

/// The most recently produced frame and its presentation position.
#[derive(Debug, Clone)]
struct FrameCache {
    position: u32,
    decode_index: u32,
    frame: VideoFrame,
}

/// How a request is going to be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Forward,
    KeyframeSeek,
    DirectSeek,
}

/// What the open-time scan learned about the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstFrame {
    pub first_valid_frame: u32,
    pub width: u32,
    pub height: u32,
    pub sample_aspect: Rational,
}

pub struct VideoSeekEngine {
    track: u32,
    demuxer: Box<dyn Demuxer>,
    decoder: Box<dyn VideoDecoder>,
    index: TrackIndex,
    mode: SeekMode,
    forward_seek_threshold: u32,
    cursor: DecodeCursor,
    cache: Option<FrameCache>,
    first_frame: FirstFrame,
    force_seek: bool,
    errored: bool,
    stats: SeekStats,
}

impl std::fmt::Debug for VideoSeekEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSeekEngine")
            .field("track", &self.track)
            .field("decoder", &self.decoder.name())
            .field("mode", &self.mode)
            .field("cursor", &self.cursor)
            .field("errored", &self.errored)
            .finish()
    }
}

impl VideoSeekEngine {
    /// Take ownership of an opened demuxer and decoder and scan forward for
    /// the first frame the decoder can produce.
    ///
    /// Fails with [`Error::NoDecodableSamples`] when no sample yields output.
    pub fn new(
        track: u32,
        demuxer: Box<dyn Demuxer>,
        decoder: Box<dyn VideoDecoder>,
        index: TrackIndex,
        mode: SeekMode,
        forward_seek_threshold: u32,
    ) -> Result<Self> {
        let mut engine = Self {
            track,
            demuxer,
            decoder,
            index,
            mode,
            forward_seek_threshold: forward_seek_threshold.clamp(
                fsrc_core::config::MIN_FORWARD_SEEK_THRESHOLD,
                fsrc_core::config::MAX_FORWARD_SEEK_THRESHOLD,
            ),
            cursor: DecodeCursor::default(),
            cache: None,
            first_frame: FirstFrame {
                first_valid_frame: 0,
                width: 0,
                height: 0,
                sample_aspect: Rational::new(0, 1),
            },
            force_seek: true,
            errored: false,
            stats: SeekStats::default(),
        };
        engine.first_frame = engine.find_first_valid_frame()?;
        engine.decoder.flush();
        engine.cursor = DecodeCursor::default();
        engine.force_seek = true;
        engine.reset_stats();
        tracing::debug!(
            "track {}: first valid frame {}, {}x{}",
            track,
            engine.first_frame.first_valid_frame,
            engine.first_frame.width,
            engine.first_frame.height
        );
        Ok(engine)
    }

    fn find_first_valid_frame(&mut self) -> Result<FirstFrame> {
        self.demuxer.seek(self.track, 1)?;
        let mut end_of_track = false;
        loop {
            let output = if end_of_track {
                match self.decoder.drain() {
                    Ok(Decoded::Unit(frame)) => Some(frame),
                    Ok(Decoded::NeedMoreInput) | Err(_) => break,
                }
            } else {
                match self.demuxer.read_next(self.track)? {
                    None => {
                        end_of_track = true;
                        continue;
                    }
                    Some(unit) => match self.decoder.feed(&unit) {
                        Ok(Decoded::Unit(frame)) => Some(frame),
                        Ok(Decoded::NeedMoreInput) => None,
                        Err(e) => {
                            tracing::debug!("probing: sample {} failed: {e}", unit.sample);
                            None
                        }
                    },
                }
            };
            let Some(frame) = output else { continue };
            if let Some(position) = self.index.position_of_cts(frame.pts) {
                return Ok(FirstFrame {
                    first_valid_frame: position,
                    width: frame.width,
                    height: frame.height,
                    sample_aspect: frame.sample_aspect,
                });
            }
        }
        Err(Error::NoDecodableSamples { track: self.track })
    }

    pub fn index(&self) -> &TrackIndex {
        &self.index
    }

    pub fn first_frame(&self) -> &FirstFrame {
        &self.first_frame
    }

    pub fn mode(&self) -> SeekMode {
        self.mode
    }

    pub fn decoder_name(&self) -> &str {
        self.decoder.name()
    }

    pub fn native_format(&self) -> PixelFormat {
        self.decoder.output_format()
    }

    pub fn cursor(&self) -> &DecodeCursor {
        &self.cursor
    }

    pub fn stats(&self) -> SeekStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = SeekStats::default();
    }

    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// Presentation position a request for `n` is served from.
    pub fn resolve_request(&self, n: u32) -> u32 {
        let last = self.index.frame_count().saturating_sub(1);
        n.min(last).max(self.first_frame.first_valid_frame)
    }

    /// Produce presentation frame `n`. Out-of-range requests are clamped.
    /// Once a decode has failed every request yields a placeholder.
    pub fn get_frame(&mut self, n: u32) -> DecodedFrame {
        let target = self.resolve_request(n);
        let decode_index = self.index.decode_index(target);
        if self.errored {
            return self.placeholder(target, decode_index);
        }
        if let Some(cache) = self.cache.as_ref().filter(|c| c.position == target) {
            self.stats.cache_hits += 1;
            self.cursor.last_requested_presentation_frame = Some(target);
            let frame = cache.frame.clone();
            let decode_index = cache.decode_index;
            return self.decorate(frame, target, decode_index, false);
        }

        match self.decode_target(target, decode_index) {
            Ok(frame) => {
                self.force_seek = false;
                self.cursor.last_requested_presentation_frame = Some(target);
                self.cache = Some(FrameCache {
                    position: target,
                    decode_index,
                    frame: frame.clone(),
                });
                self.decorate(frame, target, decode_index, false)
            }
            Err(e) => {
                tracing::warn!(
                    "track {}: frame {target} failed ({e}); returning placeholders from now on",
                    self.track
                );
                self.errored = true;
                self.placeholder(target, decode_index)
            }
        }
    }

    fn choose_strategy(&self, target: u32) -> Strategy {
        if self.force_seek || self.cursor.drained {
            return Strategy::KeyframeSeek;
        }
        let Some(last) = self.cursor.last_decoded_presentation_frame else {
            return Strategy::KeyframeSeek;
        };
        let next = last.checked_add(1) == Some(target);
        match self.mode {
            SeekMode::Normal if target > last && target - last <= self.forward_seek_threshold => {
                Strategy::Forward
            }
            SeekMode::Strict | SeekMode::Unsafe if next => Strategy::Forward,
            SeekMode::Unsafe => Strategy::DirectSeek,
            SeekMode::Normal | SeekMode::Strict => Strategy::KeyframeSeek,
        }
    }

    fn decode_target(&mut self, target: u32, decode_index: u32) -> Result<VideoFrame> {
        let target_cts = self
            .index
            .sample(decode_index)
            .map(|s| s.cts)
            .ok_or_else(|| Error::decode(format!("no sample {decode_index}")))?;
        let strategy = self.choose_strategy(target);
        tracing::debug!(
            "track {}: frame {target} (sample {decode_index}) via {strategy:?}, last decoded {:?}",
            self.track,
            self.cursor.last_decoded_presentation_frame
        );

        let seek_point = match strategy {
            Strategy::Forward => None,
            Strategy::KeyframeSeek => Some(self.index.keyframe_at_or_before(decode_index)),
            Strategy::DirectSeek => Some(decode_index),
        };
        if let Some(sample) = seek_point {
            self.seek_to(sample)?;
        }
        if let Some(frame) = self.decode_until(target_cts)? {
            return Ok(frame);
        }

        // The target went by or never came: retry once, from an earlier
        // keyframe when a keyframe seek was what just failed. A direct seek
        // is never corrected.
        let retry = match (strategy, seek_point) {
            (Strategy::KeyframeSeek, Some(tried)) if tried > 1 => {
                self.index.keyframe_at_or_before(tried - 1)
            }
            (Strategy::KeyframeSeek | Strategy::DirectSeek, _) => {
                return Err(Error::decode(format!(
                    "sample {decode_index} was never produced"
                )));
            }
            (Strategy::Forward, _) => self.index.keyframe_at_or_before(decode_index),
        };
        tracing::debug!("track {}: frame {target} missed, retrying from sample {retry}", self.track);
        self.seek_to(retry)?;
        self.decode_until(target_cts)?
            .ok_or_else(|| Error::decode(format!("sample {decode_index} was never produced")))
    }

    fn seek_to(&mut self, sample: u32) -> Result<()> {
        self.decoder.flush();
        self.demuxer
            .seek(self.track, sample)
            .map_err(|e| Error::decode(format!("seek to sample {sample}: {e}")))?;
        self.stats.seeks += 1;
        self.stats.last_seek_target = Some(sample);
        self.cursor.next_sample = sample;
        self.cursor.drained = false;
        self.cursor.last_decoded_presentation_frame = None;
        self.cursor.last_decoded_sample_index = None;
        Ok(())
    }

    /// Decode forward, discarding output, until a frame stamped `target_cts`
    /// comes out. `None` when the decoder skipped past it or ran dry.
    fn decode_until(&mut self, target_cts: i64) -> Result<Option<VideoFrame>> {
        while let Some(frame) = self.next_output()? {
            if let Some(position) = self.index.position_of_cts(frame.pts) {
                self.cursor.last_decoded_presentation_frame = Some(position);
                self.cursor.last_decoded_sample_index = Some(self.index.decode_index(position));
            }
            match frame.pts.cmp(&target_cts) {
                std::cmp::Ordering::Equal => return Ok(Some(frame)),
                std::cmp::Ordering::Less => {
                    tracing::trace!("discarding frame at {}", frame.pts);
                }
                std::cmp::Ordering::Greater => {
                    tracing::debug!("decoder passed the target: got {} wanted {target_cts}", frame.pts);
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }

    /// Next frame out of the decoder, feeding samples as needed and draining
    /// at end of track.
    fn next_output(&mut self) -> Result<Option<VideoFrame>> {
        loop {
            if self.cursor.drained {
                return Ok(self.decoder.drain()?.into_unit());
            }
            let unit = self
                .demuxer
                .read_next(self.track)
                .map_err(|e| Error::decode(format!("read sample {}: {e}", self.cursor.next_sample)))?;
            let Some(unit) = unit else {
                tracing::debug!("track {}: end of track, draining decoder", self.track);
                self.cursor.drained = true;
                continue;
            };
            self.stats.feeds += 1;
            self.cursor.next_sample = unit.sample + 1;
            tracing::trace!("feeding sample {} (cts {})", unit.sample, unit.cts);
            if let Decoded::Unit(frame) = self.decoder.feed(&unit)? {
                return Ok(Some(frame));
            }
        }
    }

    fn decorate(
        &self,
        frame: VideoFrame,
        position: u32,
        decode_index: u32,
        placeholder: bool,
    ) -> DecodedFrame {
        let framerate = self.index.framerate();
        let sample_aspect = if frame.sample_aspect.num == 0 {
            self.first_frame.sample_aspect
        } else {
            frame.sample_aspect
        };
        let props = FrameProps {
            sample_aspect,
            duration_num: framerate.den,
            duration_den: framerate.num,
            color_range: frame.color_range,
            color_matrix: frame.color_matrix,
            picture_type: frame.picture_type.as_char(),
            field_based: frame.interlaced,
            decode_index,
            presentation_index: position,
            placeholder,
        };
        DecodedFrame { frame, props }
    }

    fn placeholder(&mut self, position: u32, decode_index: u32) -> DecodedFrame {
        self.stats.placeholders += 1;
        let frame = VideoFrame::blank(
            self.decoder.output_format(),
            self.first_frame.width,
            self.first_frame.height,
        );
        self.decorate(frame, position, decode_index, true)
    }
}
