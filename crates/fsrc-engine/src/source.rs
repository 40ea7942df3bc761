//! Source handles: the surface a host embedding talks to.
//!
//! `VideoSource` and `AudioSource` own every collaborator of one open
//! track. All requests take `&mut self`; [`SharedVideoSource`] and
//! [`SharedAudioSource`] serialize requests from several threads behind one
//! lock.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use fsrc_core::{
    AudioConverter, AudioFormat, AudioOptions, DecoderFactory, Demuxer, Diagnostic, Error,
    MediaKind, PixelFormat, Rational, Result, TrackSummary, VideoConverter, VideoFrame,
    VideoOptions,
};
use fsrc_mp4::Mp4Demuxer;

use crate::audio::{AssemblerStats, SampleAssembler};
use crate::codecs::BuiltinDecoders;
use crate::convert::{PcmConverter, PixelConverter};
use crate::index::TrackIndex;
use crate::negotiate::{negotiate_audio, negotiate_video, AudioNegotiation, VideoNegotiation};
use crate::sink::FrameSink;
use crate::trim::{self, AudioTrimInfo};
use crate::video::{DecodedFrame, FrameProps, SeekStats, VideoSeekEngine};

/// Pick a track: 0 means the first track of `kind`, anything else is a
/// 1-based track number that must carry `kind`.
pub fn select_track(
    tracks: &[TrackSummary],
    requested: u32,
    kind: MediaKind,
) -> Result<&TrackSummary> {
    if requested == 0 {
        return tracks
            .iter()
            .find(|t| t.kind == kind)
            .ok_or(Error::NoTrackOfKind { kind });
    }
    let track = tracks
        .get(requested as usize - 1)
        .ok_or(Error::TrackNotFound {
            requested,
            available: tracks.len() as u32,
        })?;
    if track.kind != kind {
        return Err(Error::TrackTypeMismatch {
            track: requested,
            expected: kind,
        });
    }
    Ok(track)
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

pub struct VideoSource {
    track: TrackSummary,
    engine: VideoSeekEngine,
    converter: Box<dyn VideoConverter>,
    negotiation: VideoNegotiation,
    diagnostics: Vec<Diagnostic>,
}

impl std::fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSource")
            .field("track", &self.track.number)
            .field("codec", &self.track.codec)
            .field("negotiation", &self.negotiation)
            .field("engine", &self.engine)
            .finish()
    }
}

impl VideoSource {
    /// Open a video track with explicit collaborators.
    pub fn open(
        demuxer: Box<dyn Demuxer>,
        factory: &dyn DecoderFactory,
        converter: Box<dyn VideoConverter>,
        options: &VideoOptions,
    ) -> Result<Self> {
        let options = options.clone().normalized();
        let track = select_track(demuxer.tracks(), options.track, MediaKind::Video)?.clone();
        let timeline = demuxer.timeline(track.number)?;
        let index = TrackIndex::build(&timeline, MediaKind::Video)?;

        let mut diagnostics = Vec::new();
        if index.keyframe_count() == 0 {
            diagnostics.push(Diagnostic::warning(format!(
                "track {} flags no keyframes; every seek restarts from the first sample",
                track.number
            )));
        }
        let trimmed = index.sample_count() - index.frame_count();
        if trimmed > 0 {
            diagnostics.push(Diagnostic::info(format!(
                "edit list hides {trimmed} of {} samples",
                index.sample_count()
            )));
        }

        let decoder = factory.video(&track, options.forced_codec.as_deref(), options.threads)?;
        let negotiation =
            negotiate_video(Some(decoder.output_format()), &options, converter.as_ref())?;
        let engine = VideoSeekEngine::new(
            track.number,
            demuxer,
            decoder,
            index,
            options.seek_mode,
            options.forward_seek_threshold,
        )?;
        if engine.first_frame().first_valid_frame > 0 {
            diagnostics.push(Diagnostic::info(format!(
                "first decodable frame is {}",
                engine.first_frame().first_valid_frame
            )));
        }
        for diagnostic in &diagnostics {
            diagnostic.emit();
        }

        tracing::info!(
            "opened video track {} ({}): {} frames, {}x{}, {} fps, {} -> {}, seek mode {}",
            track.number,
            track.codec,
            engine.index().frame_count(),
            engine.first_frame().width,
            engine.first_frame().height,
            engine.index().framerate(),
            negotiation.native,
            negotiation.output,
            options.seek_mode
        );
        Ok(Self {
            track,
            engine,
            converter,
            negotiation,
            diagnostics,
        })
    }

    pub fn track(&self) -> &TrackSummary {
        &self.track
    }

    pub fn index(&self) -> &TrackIndex {
        self.engine.index()
    }

    pub fn frame_count(&self) -> u32 {
        self.engine.index().frame_count()
    }

    pub fn framerate(&self) -> Rational {
        self.engine.index().framerate()
    }

    pub fn width(&self) -> u32 {
        self.engine.first_frame().width
    }

    pub fn height(&self) -> u32 {
        self.engine.first_frame().height
    }

    pub fn output_format(&self) -> PixelFormat {
        self.negotiation.output
    }

    pub fn negotiation(&self) -> &VideoNegotiation {
        &self.negotiation
    }

    pub fn decoder_name(&self) -> &str {
        self.engine.decoder_name()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn stats(&self) -> SeekStats {
        self.engine.stats()
    }

    pub fn engine(&self) -> &VideoSeekEngine {
        &self.engine
    }

    /// Frame `n` in the negotiated output format. Never fails: after a
    /// decode error the frame is a black placeholder.
    pub fn get_video_frame(&mut self, n: u32) -> DecodedFrame {
        let mut decoded = self.engine.get_frame(n);
        if decoded.props.placeholder {
            decoded.frame = self.blank(&decoded.props);
            return decoded;
        }
        if self.negotiation.needs_conversion {
            match self.converter.convert(&decoded.frame, self.negotiation.output) {
                Ok(frame) => decoded.frame = frame,
                Err(e) => {
                    tracing::warn!("frame {n}: conversion failed ({e}), returning a placeholder");
                    decoded.props.placeholder = true;
                    decoded.frame = self.blank(&decoded.props);
                }
            }
        }
        decoded
    }

    fn blank(&self, props: &FrameProps) -> VideoFrame {
        let mut frame = VideoFrame::blank(self.negotiation.output, self.width(), self.height());
        frame.sample_aspect = props.sample_aspect;
        frame
    }

    /// Frame `n` stored through a host sink.
    pub fn render_frame<S: FrameSink>(
        &mut self,
        n: u32,
        sink: &mut S,
    ) -> Result<(S::Frame, FrameProps)> {
        sink.negotiate_format(&self.negotiation)?;
        let decoded = self.get_video_frame(n);
        let mut target = sink.allocate_frame(decoded.frame.width, decoded.frame.height)?;
        sink.write_pixels(&decoded.frame, &mut target)?;
        Ok((target, decoded.props))
    }

    /// Release the handle and everything it owns.
    pub fn close(self) {
        let stats = self.engine.stats();
        tracing::info!(
            "closed video track {}: {} seeks, {} samples fed, {} cache hits",
            self.track.number,
            stats.seeks,
            stats.feeds,
            stats.cache_hits
        );
    }
}

/// Open the video track of an MP4 file with the built-in collaborators.
pub fn open_video(path: impl AsRef<Path>, options: &VideoOptions) -> Result<VideoSource> {
    let demuxer = Mp4Demuxer::open(path)?;
    VideoSource::open(
        Box::new(demuxer),
        &BuiltinDecoders,
        Box::new(PixelConverter),
        options,
    )
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

pub struct AudioSource {
    track: TrackSummary,
    index: TrackIndex,
    assembler: SampleAssembler,
    negotiation: AudioNegotiation,
    diagnostics: Vec<Diagnostic>,
}

impl std::fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSource")
            .field("track", &self.track.number)
            .field("codec", &self.track.codec)
            .field("assembler", &self.assembler)
            .finish()
    }
}

impl AudioSource {
    /// Open an audio track with explicit collaborators.
    pub fn open(
        demuxer: Box<dyn Demuxer>,
        factory: &dyn DecoderFactory,
        converter: Box<dyn AudioConverter>,
        options: &AudioOptions,
    ) -> Result<Self> {
        let track = select_track(demuxer.tracks(), options.track, MediaKind::Audio)?.clone();
        let timeline = demuxer.timeline(track.number)?;
        let index = TrackIndex::build(&timeline, MediaKind::Audio)?;

        let decoder = factory.audio(&track)?;
        let reported = decoder.output_format();
        let native = (reported.channels() > 0 && reported.sample_rate > 0).then_some(reported);
        let negotiation =
            negotiate_audio(native, track.audio.as_ref(), options, converter.as_ref())?;
        let native = negotiation.native;
        let (trim, diagnostics) = trim::resolve(
            &timeline,
            demuxer.metadata(),
            native.sample_rate,
            options.skip_priming,
        );
        for diagnostic in &diagnostics {
            diagnostic.emit();
        }
        let trim = trim.rescaled(native.sample_rate, negotiation.output.sample_rate);
        let assembler =
            SampleAssembler::new(track.number, demuxer, decoder, converter, negotiation, trim)?;

        tracing::info!(
            "opened audio track {} ({}): {} samples, priming {}, padding {}, {} -> {}",
            track.number,
            track.codec,
            trim.total_output_sample_count,
            trim.priming_sample_count,
            trim.padding_sample_count,
            negotiation.native,
            negotiation.output
        );
        Ok(Self {
            track,
            index,
            assembler,
            negotiation,
            diagnostics,
        })
    }

    pub fn track(&self) -> &TrackSummary {
        &self.track
    }

    pub fn index(&self) -> &TrackIndex {
        &self.index
    }

    /// Output sample frames in the track.
    pub fn sample_count(&self) -> u64 {
        self.assembler.sample_count()
    }

    pub fn output_format(&self) -> AudioFormat {
        self.negotiation.output
    }

    pub fn negotiation(&self) -> &AudioNegotiation {
        &self.negotiation
    }

    pub fn trim_info(&self) -> &AudioTrimInfo {
        self.assembler.trim()
    }

    pub fn decoder_name(&self) -> &str {
        self.assembler.decoder_name()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn stats(&self) -> AssemblerStats {
        self.assembler.stats()
    }

    pub fn is_errored(&self) -> bool {
        self.assembler.is_errored()
    }

    /// Exactly `length` interleaved sample frames from output position
    /// `start`; out-of-range parts are silence.
    pub fn get_audio_samples(&mut self, start: i64, length: u64) -> Vec<u8> {
        self.assembler.read(start, length)
    }

    pub fn close(self) {
        let stats = self.assembler.stats();
        tracing::info!(
            "closed audio track {}: {} samples fed, {} rewinds",
            self.track.number,
            stats.feeds,
            stats.resets
        );
    }
}

/// Open the audio track of an MP4 file with the built-in collaborators.
pub fn open_audio(path: impl AsRef<Path>, options: &AudioOptions) -> Result<AudioSource> {
    let demuxer = Mp4Demuxer::open(path)?;
    AudioSource::open(
        Box::new(demuxer),
        &BuiltinDecoders,
        Box::new(PcmConverter::default()),
        options,
    )
}

// ---------------------------------------------------------------------------
// Shared handles
// ---------------------------------------------------------------------------

/// A [`VideoSource`] usable from several threads, one request at a time.
#[derive(Debug, Clone)]
pub struct SharedVideoSource {
    inner: Arc<Mutex<VideoSource>>,
}

impl SharedVideoSource {
    pub fn new(source: VideoSource) -> Self {
        Self {
            inner: Arc::new(Mutex::new(source)),
        }
    }

    pub fn get_video_frame(&self, n: u32) -> DecodedFrame {
        self.inner.lock().get_video_frame(n)
    }

    pub fn frame_count(&self) -> u32 {
        self.inner.lock().frame_count()
    }

    /// Run `f` with exclusive access to the handle.
    pub fn with<R>(&self, f: impl FnOnce(&mut VideoSource) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

/// An [`AudioSource`] usable from several threads, one request at a time.
#[derive(Debug, Clone)]
pub struct SharedAudioSource {
    inner: Arc<Mutex<AudioSource>>,
}

impl SharedAudioSource {
    pub fn new(source: AudioSource) -> Self {
        Self {
            inner: Arc::new(Mutex::new(source)),
        }
    }

    pub fn get_audio_samples(&self, start: i64, length: u64) -> Vec<u8> {
        self.inner.lock().get_audio_samples(start, length)
    }

    pub fn sample_count(&self) -> u64 {
        self.inner.lock().sample_count()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut AudioSource) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
