//! fsrc-engine: frame-accurate random access over compressed tracks.
//!
//! The presentation index ([`index`]), the video seek engine ([`video`])
//! and the audio sample assembler ([`audio`]) sit behind the host-facing
//! handles in [`source`]. Built-in decoders and converters live in
//! [`codecs`] and [`convert`].

pub mod audio;
pub mod codecs;
pub mod convert;
pub mod index;
pub mod negotiate;
pub mod sink;
pub mod source;
pub mod timestamp;
pub mod trim;
pub mod video;

pub use audio::{AssemblerStats, PcmCarryBuffer, SampleAssembler};
pub use codecs::BuiltinDecoders;
pub use convert::{PcmConverter, PixelConverter};
pub use index::{IndexedSample, TrackIndex};
pub use negotiate::{AudioNegotiation, VideoNegotiation};
pub use sink::{FrameSink, InterleavedSink, PlanarSink};
pub use source::{
    open_audio, open_video, select_track, AudioSource, SharedAudioSource, SharedVideoSource,
    VideoSource,
};
pub use trim::AudioTrimInfo;
pub use video::{DecodeCursor, DecodedFrame, FrameProps, SeekStats, VideoSeekEngine};
