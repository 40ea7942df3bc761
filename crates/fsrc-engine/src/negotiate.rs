//! Output format negotiation, run once per handle at open time.
//!
//! Precedence is always: what the user asked for, then what the decoder
//! produces natively, then a safe default.

use fsrc_core::{
    AudioConverter, AudioFormat, AudioOptions, AudioParams, Error, PixelFormat, Result,
    SampleFormat, VideoConverter, VideoOptions,
};

pub const DEFAULT_PIXEL_FORMAT: PixelFormat = PixelFormat::Yuv420p;
pub const DEFAULT_SAMPLE_FORMAT: SampleFormat = SampleFormat::S16;

/// Outcome of video negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoNegotiation {
    /// Format of the decoder's frames.
    pub native: PixelFormat,
    /// Format handed to the host.
    pub output: PixelFormat,
    pub needs_conversion: bool,
    /// High bit depth planes are delivered stacked (MSB plane over LSB plane).
    pub stacked: bool,
    /// Decoder buffers go to the host without a copy.
    pub direct_rendering: bool,
}

pub fn negotiate_video(
    native: Option<PixelFormat>,
    options: &VideoOptions,
    converter: &dyn VideoConverter,
) -> Result<VideoNegotiation> {
    let native = native.unwrap_or(DEFAULT_PIXEL_FORMAT);
    let output = options.format.unwrap_or(native);
    let needs_conversion = output != native;
    if needs_conversion && !converter.supports(native, output) {
        return Err(Error::unsupported(format!(
            "cannot convert {native} to {output}"
        )));
    }
    let stacked = options.stacked_format && output.is_high_bit_depth();
    let direct_rendering = options.direct_rendering && !needs_conversion && !stacked;
    if options.direct_rendering && !direct_rendering {
        tracing::debug!("direct rendering disabled: output needs conversion or stacking");
    }
    Ok(VideoNegotiation {
        native,
        output,
        needs_conversion,
        stacked,
        direct_rendering,
    })
}

/// Outcome of audio negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioNegotiation {
    pub native: AudioFormat,
    pub output: AudioFormat,
    pub needs_conversion: bool,
}

/// `native` is `None` when the decoder cannot report its output before
/// decoding; the track's declared channels and rate then give the default.
pub fn negotiate_audio(
    native: Option<AudioFormat>,
    params: Option<&AudioParams>,
    options: &AudioOptions,
    converter: &dyn AudioConverter,
) -> Result<AudioNegotiation> {
    let native = native.unwrap_or_else(|| {
        let (channels, sample_rate) = params.map_or((0, 0), |p| (p.channels, p.sample_rate));
        tracing::debug!("decoder did not report a format; assuming {DEFAULT_SAMPLE_FORMAT}");
        default_audio_format(channels, sample_rate)
    });
    let output = AudioFormat {
        sample_format: options.sample_format.unwrap_or(native.sample_format),
        layout: options.channel_layout.unwrap_or(native.layout),
        sample_rate: match options.sample_rate {
            0 => native.sample_rate,
            rate => rate,
        },
    };
    if output.channels() == 0 || output.sample_rate == 0 || native.sample_rate == 0 {
        return Err(Error::unsupported(format!("invalid output format {output}")));
    }
    let needs_conversion = output != native;
    if needs_conversion && !converter.supports(&native, &output) {
        return Err(Error::unsupported(format!(
            "cannot convert {native} to {output}"
        )));
    }
    Ok(AudioNegotiation {
        native,
        output,
        needs_conversion,
    })
}

fn default_audio_format(channels: u16, sample_rate: u32) -> AudioFormat {
    AudioFormat {
        sample_format: DEFAULT_SAMPLE_FORMAT,
        layout: fsrc_core::ChannelLayout::from_count(channels.max(1)),
        sample_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{PcmConverter, PixelConverter};
    use assert_matches::assert_matches;
    use fsrc_core::ChannelLayout;

    #[test]
    fn test_native_format_is_kept() {
        let n = negotiate_video(Some(PixelFormat::Nv12), &VideoOptions::default(), &PixelConverter)
            .unwrap();
        assert_eq!(n.output, PixelFormat::Nv12);
        assert!(!n.needs_conversion);
        assert!(!n.direct_rendering);
    }

    #[test]
    fn test_user_format_wins() {
        let options = VideoOptions {
            format: Some(PixelFormat::Rgb24),
            direct_rendering: true,
            ..Default::default()
        };
        let n = negotiate_video(Some(PixelFormat::Yuv420p), &options, &PixelConverter).unwrap();
        assert_eq!(n.output, PixelFormat::Rgb24);
        assert!(n.needs_conversion);
        assert!(!n.direct_rendering);
    }

    #[test]
    fn test_default_when_native_unknown() {
        let n = negotiate_video(None, &VideoOptions::default(), &PixelConverter).unwrap();
        assert_eq!(n.output, DEFAULT_PIXEL_FORMAT);
    }

    #[test]
    fn test_direct_rendering_only_without_conversion_or_stacking() {
        let options = VideoOptions {
            direct_rendering: true,
            ..Default::default()
        };
        let n = negotiate_video(Some(PixelFormat::Yuv420p), &options, &PixelConverter).unwrap();
        assert!(n.direct_rendering);

        let stacked = VideoOptions {
            direct_rendering: true,
            stacked_format: true,
            ..Default::default()
        };
        let n = negotiate_video(Some(PixelFormat::Yuv420p10), &stacked, &PixelConverter).unwrap();
        assert!(n.stacked);
        assert!(!n.direct_rendering);

        // Stacking only applies to high bit depth output.
        let n = negotiate_video(Some(PixelFormat::Yuv420p), &stacked, &PixelConverter).unwrap();
        assert!(!n.stacked);
        assert!(n.direct_rendering);
    }

    #[test]
    fn test_unsupported_conversion_is_rejected() {
        let options = VideoOptions {
            format: Some(PixelFormat::Uyvy422),
            ..Default::default()
        };
        assert_matches!(
            negotiate_video(Some(PixelFormat::Bgra), &options, &PixelConverter),
            Err(Error::UnsupportedFormat(_))
        );
    }

    #[test]
    fn test_audio_precedence() {
        let native = AudioFormat {
            sample_format: SampleFormat::F32,
            layout: ChannelLayout::LAYOUT_5_1,
            sample_rate: 48000,
        };
        let n = negotiate_audio(Some(native), None, &AudioOptions::default(), &PcmConverter::default()).unwrap();
        assert_eq!(n.output, native);
        assert!(!n.needs_conversion);

        let options = AudioOptions {
            channel_layout: Some(ChannelLayout::STEREO),
            sample_format: Some(SampleFormat::S16),
            ..Default::default()
        };
        let n = negotiate_audio(Some(native), None, &options, &PcmConverter::default()).unwrap();
        assert_eq!(n.output.layout, ChannelLayout::STEREO);
        assert_eq!(n.output.sample_format, SampleFormat::S16);
        assert_eq!(n.output.sample_rate, 48000);
        assert!(n.needs_conversion);
    }

    #[test]
    fn test_audio_default_when_decoder_cannot_tell() {
        let params = AudioParams {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
        };
        let n = negotiate_audio(None, Some(&params), &AudioOptions::default(), &PcmConverter::default())
            .unwrap();
        assert_eq!(n.native.sample_format, DEFAULT_SAMPLE_FORMAT);
        assert_eq!(n.output.layout, ChannelLayout::STEREO);
        assert_eq!(n.output.sample_rate, 44100);
        assert!(!n.needs_conversion);

        assert_matches!(
            negotiate_audio(None, None, &AudioOptions::default(), &PcmConverter::default()),
            Err(Error::UnsupportedFormat(_))
        );
    }

    #[test]
    fn test_audio_rate_change_goes_through_the_converter() {
        let native = default_audio_format(2, 44100);
        let options = AudioOptions {
            sample_rate: 48000,
            ..Default::default()
        };
        let n = negotiate_audio(Some(native), None, &options, &PcmConverter::default()).unwrap();
        assert_eq!(n.output.sample_rate, 48000);
        assert!(n.needs_conversion);
    }
}
