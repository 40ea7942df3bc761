//! Compressed audio (AAC, ALAC) decoded with symphonia.

use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{
    CodecParameters, CodecType, Decoder, DecoderOptions, CODEC_TYPE_AAC, CODEC_TYPE_ALAC,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

use fsrc_core::{
    AudioDecoder, AudioFormat, ChannelLayout, CompressedUnit, Decoded, Error, FourCc, PcmBlock,
    Result, SampleFormat, TrackSummary,
};

/// MPEG-4 object types carrying AAC.
const AAC_OBJECT_TYPES: [u8; 4] = [0x40, 0x66, 0x67, 0x68];

fn codec_type(track: &TrackSummary) -> Option<CodecType> {
    match track.codec.as_bytes() {
        b"mp4a" => match track.object_type {
            Some(ot) if !AAC_OBJECT_TYPES.contains(&ot) => None,
            _ => Some(CODEC_TYPE_AAC),
        },
        b"alac" => Some(CODEC_TYPE_ALAC),
        _ => None,
    }
}

/// True for the compressed codecs this module can open.
pub fn is_supported(track: &TrackSummary) -> bool {
    codec_type(track).is_some()
}

pub struct SymphoniaDecoder {
    decoder: Box<dyn Decoder>,
    format: AudioFormat,
    codec: FourCc,
}

impl std::fmt::Debug for SymphoniaDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymphoniaDecoder")
            .field("codec", &self.codec)
            .field("format", &self.format)
            .finish()
    }
}

impl SymphoniaDecoder {
    pub fn for_track(track: &TrackSummary) -> Result<Self> {
        let codec = track.codec.to_string();
        let kind = codec_type(track).ok_or_else(|| {
            Error::decoder_open(codec.clone(), "no compressed audio decoder for this codec")
        })?;
        let params = track
            .audio
            .ok_or_else(|| Error::decoder_open(codec.clone(), "track has no audio parameters"))?;
        if track.codec_private.is_empty() {
            return Err(Error::decoder_open(codec, "missing decoder configuration"));
        }

        let layout = ChannelLayout::from_count(params.channels.max(1));
        let mut codec_params = CodecParameters::new();
        codec_params
            .for_codec(kind)
            .with_sample_rate(params.sample_rate)
            .with_extra_data(track.codec_private.to_vec().into_boxed_slice());
        if let Some(channels) = Channels::from_bits(layout.0 as u32) {
            codec_params.with_channels(channels);
        }

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::decoder_open(codec.clone(), e.to_string()))?;
        tracing::debug!(
            "opened {} audio decoder: {} channels at {}Hz",
            codec,
            params.channels,
            params.sample_rate
        );
        Ok(Self {
            decoder,
            format: AudioFormat {
                sample_format: SampleFormat::F32,
                layout,
                sample_rate: params.sample_rate,
            },
            codec: track.codec,
        })
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn name(&self) -> &str {
        "symphonia"
    }

    fn output_format(&self) -> AudioFormat {
        self.format
    }

    fn feed(&mut self, unit: &CompressedUnit) -> Result<Decoded<PcmBlock>> {
        let packet = Packet::new_from_slice(0, unit.dts, unit.duration as u64, &unit.data);
        let decoded = match self.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                return Err(Error::decode(format!("sample {}: {e}", unit.sample)));
            }
            Err(SymphoniaError::ResetRequired) => {
                self.decoder.reset();
                return Err(Error::decode(format!(
                    "sample {}: decoder requires a reset",
                    unit.sample
                )));
            }
            Err(e) => return Err(Error::decode(format!("sample {}: {e}", unit.sample))),
        };

        let spec = *decoded.spec();
        if spec.channels.count() != self.format.channels() as usize {
            return Err(Error::decode(format!(
                "sample {} decoded to {} channels, expected {}",
                unit.sample,
                spec.channels.count(),
                self.format.channels()
            )));
        }
        if decoded.frames() == 0 {
            return Ok(Decoded::NeedMoreInput);
        }
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        let data = buffer
            .samples()
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        Ok(Decoded::Unit(PcmBlock::new(self.format, data)))
    }

    fn drain(&mut self) -> Result<Decoded<PcmBlock>> {
        Ok(Decoded::NeedMoreInput)
    }

    fn flush(&mut self) {
        self.decoder.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fsrc_core::{AudioParams, MediaKind};

    fn track(codec: &[u8; 4], object_type: Option<u8>, config: &'static [u8]) -> TrackSummary {
        TrackSummary {
            number: 1,
            track_id: 1,
            kind: MediaKind::Audio,
            codec: FourCc::new(codec),
            timescale: 44100,
            duration: 0,
            codec_private: Bytes::from_static(config),
            object_type,
            video: None,
            audio: Some(AudioParams {
                channels: 2,
                sample_rate: 44100,
                bits_per_sample: 16,
            }),
        }
    }

    #[test]
    fn test_codec_selection() {
        assert!(is_supported(&track(b"mp4a", Some(0x40), &[])));
        assert!(is_supported(&track(b"mp4a", None, &[])));
        // MP3 in MP4 is not handled here.
        assert!(!is_supported(&track(b"mp4a", Some(0x6b), &[])));
        assert!(is_supported(&track(b"alac", None, &[])));
        assert!(!is_supported(&track(b"sowt", None, &[])));
    }

    #[test]
    fn test_missing_config_fails_to_open() {
        assert!(matches!(
            SymphoniaDecoder::for_track(&track(b"mp4a", Some(0x40), &[])),
            Err(Error::DecoderOpen { .. })
        ));
    }

    #[test]
    fn test_aac_lc_opens_and_reports_float_output() {
        // AudioSpecificConfig: AAC LC, 44.1kHz, stereo.
        let decoder = SymphoniaDecoder::for_track(&track(b"mp4a", Some(0x40), &[0x12, 0x10]))
            .unwrap();
        let format = decoder.output_format();
        assert_eq!(format.sample_format, SampleFormat::F32);
        assert_eq!(format.layout, ChannelLayout::STEREO);
        assert_eq!(format.sample_rate, 44100);
    }
}
