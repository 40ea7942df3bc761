//! Uncompressed PCM sample entries, rewritten into little-endian
//! interleaved blocks.

use fsrc_core::{
    AudioDecoder, AudioFormat, ChannelLayout, CompressedUnit, Decoded, Error, FourCc, PcmBlock,
    Result, SampleFormat, TrackSummary,
};

/// Byte layout of one stored sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stored {
    U8,
    S8,
    S16Le,
    S16Be,
    S24Be,
    S32Be,
    F32Be,
}

impl Stored {
    fn for_codec(codec: FourCc, bits: u16) -> Option<Self> {
        let stored = match (codec.as_bytes(), bits) {
            (b"raw ", _) => Self::U8,
            (b"twos", 8) => Self::S8,
            (b"twos", _) => Self::S16Be,
            (b"sowt", _) => Self::S16Le,
            (b"in24", _) => Self::S24Be,
            (b"in32", _) => Self::S32Be,
            (b"fl32", _) => Self::F32Be,
            _ => return None,
        };
        Some(stored)
    }

    fn width(self) -> usize {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::S16Le | Self::S16Be => 2,
            Self::S24Be => 3,
            Self::S32Be | Self::F32Be => 4,
        }
    }

    fn output(self) -> SampleFormat {
        match self {
            Self::U8 | Self::S8 => SampleFormat::U8,
            Self::S16Le | Self::S16Be => SampleFormat::S16,
            Self::S24Be | Self::S32Be => SampleFormat::S32,
            Self::F32Be => SampleFormat::F32,
        }
    }
}

/// True when the fourcc is one of the uncompressed layouts handled here.
pub fn is_pcm(codec: FourCc) -> bool {
    Stored::for_codec(codec, 16).is_some()
}

#[derive(Debug)]
pub struct PcmDecoder {
    stored: Stored,
    format: AudioFormat,
}

impl PcmDecoder {
    pub fn for_track(track: &TrackSummary) -> Result<Self> {
        let params = track.audio.ok_or_else(|| {
            Error::decoder_open(track.codec.to_string(), "track has no audio parameters")
        })?;
        let stored = Stored::for_codec(track.codec, params.bits_per_sample)
            .ok_or_else(|| Error::decoder_open(track.codec.to_string(), "not a PCM layout"))?;
        if params.channels == 0 || params.sample_rate == 0 {
            return Err(Error::decoder_open(
                track.codec.to_string(),
                format!(
                    "invalid parameters: {} channels at {}Hz",
                    params.channels, params.sample_rate
                ),
            ));
        }
        Ok(Self {
            stored,
            format: AudioFormat {
                sample_format: stored.output(),
                layout: ChannelLayout::from_count(params.channels),
                sample_rate: params.sample_rate,
            },
        })
    }
}

impl AudioDecoder for PcmDecoder {
    fn name(&self) -> &str {
        "pcm"
    }

    fn output_format(&self) -> AudioFormat {
        self.format
    }

    fn feed(&mut self, unit: &CompressedUnit) -> Result<Decoded<PcmBlock>> {
        let width = self.stored.width();
        let frame_bytes = width * self.format.channels() as usize;
        if unit.data.len() % frame_bytes != 0 {
            return Err(Error::decode(format!(
                "sample {} holds {} bytes, not a multiple of {frame_bytes}",
                unit.sample,
                unit.data.len()
            )));
        }
        let samples = unit.data.chunks_exact(width);
        let mut out = Vec::with_capacity(unit.data.len() / width * self.format.sample_format.bytes());
        match self.stored {
            Stored::U8 => out.extend_from_slice(&unit.data),
            Stored::S8 => out.extend(unit.data.iter().map(|b| b ^ 0x80)),
            Stored::S16Le => out.extend_from_slice(&unit.data),
            Stored::S16Be => samples.for_each(|s| out.extend_from_slice(&[s[1], s[0]])),
            Stored::S24Be => samples.for_each(|s| out.extend_from_slice(&[0, s[2], s[1], s[0]])),
            Stored::S32Be | Stored::F32Be => {
                samples.for_each(|s| out.extend_from_slice(&[s[3], s[2], s[1], s[0]]))
            }
        }
        Ok(Decoded::Unit(PcmBlock::new(self.format, out)))
    }

    fn drain(&mut self) -> Result<Decoded<PcmBlock>> {
        Ok(Decoded::NeedMoreInput)
    }

    fn flush(&mut self) {}
}
