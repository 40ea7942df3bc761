//! Decoders shipped with the engine.
//!
//! Video support is limited to uncompressed pictures; compressed video
//! needs a host-supplied [`DecoderFactory`]. Audio covers the PCM sample
//! entries plus AAC and ALAC through symphonia.

pub mod pcm;
pub mod raw;
pub mod symphonia_audio;

use fsrc_core::{AudioDecoder, DecoderFactory, Error, Result, TrackSummary, VideoDecoder};

pub use pcm::PcmDecoder;
pub use raw::RawVideoDecoder;
pub use symphonia_audio::SymphoniaDecoder;

/// Decoder name accepted as a forced video codec.
pub const RAW_VIDEO_DECODER: &str = "rawvideo";

/// The default [`DecoderFactory`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinDecoders;

impl DecoderFactory for BuiltinDecoders {
    fn video(
        &self,
        track: &TrackSummary,
        forced_codec: Option<&str>,
        threads: u32,
    ) -> Result<Box<dyn VideoDecoder>> {
        if let Some(name) = forced_codec {
            if name != RAW_VIDEO_DECODER {
                return Err(Error::decoder_open(name, "no decoder with this name"));
            }
        }
        tracing::trace!("opening {} decoder, threads={threads}", track.codec);
        Ok(Box::new(RawVideoDecoder::for_track(track)?))
    }

    fn audio(&self, track: &TrackSummary) -> Result<Box<dyn AudioDecoder>> {
        if pcm::is_pcm(track.codec) {
            return Ok(Box::new(PcmDecoder::for_track(track)?));
        }
        if symphonia_audio::is_supported(track) {
            return Ok(Box::new(SymphoniaDecoder::for_track(track)?));
        }
        Err(Error::decoder_open(
            track.codec.to_string(),
            "no audio decoder for this codec",
        ))
    }
}
