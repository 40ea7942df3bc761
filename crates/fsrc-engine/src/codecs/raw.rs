//! Uncompressed video: every sample already is a picture.

use fsrc_core::{
    ColorRange, CompressedUnit, Decoded, Error, FourCc, PictureType, PixelFormat, Rational,
    Result, TrackSummary, VideoDecoder, VideoFrame,
};

/// Pixel layout for an uncompressed video fourcc. `raw ` depends on the
/// sample entry's declared depth.
pub fn raw_pixel_format(codec: FourCc, depth: u16) -> Option<PixelFormat> {
    match codec.as_bytes() {
        b"raw " => match depth {
            24 => Some(PixelFormat::Rgb24),
            32 => Some(PixelFormat::Bgra),
            _ => None,
        },
        b"2vuy" => Some(PixelFormat::Uyvy422),
        b"yuvs" | b"YUY2" => Some(PixelFormat::Yuyv422),
        b"I420" | b"i420" => Some(PixelFormat::Yuv420p),
        b"NV12" | b"nv12" => Some(PixelFormat::Nv12),
        b"Y42B" => Some(PixelFormat::Yuv422p),
        b"444p" => Some(PixelFormat::Yuv444p),
        b"p010" => Some(PixelFormat::Yuv420p10),
        _ => None,
    }
}

/// Wraps each sample's bytes as planes without copying them.
#[derive(Debug)]
pub struct RawVideoDecoder {
    format: PixelFormat,
    width: u32,
    height: u32,
    sample_aspect: Rational,
}

impl RawVideoDecoder {
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            sample_aspect: Rational::new(0, 1),
        }
    }

    pub fn for_track(track: &TrackSummary) -> Result<Self> {
        let params = track.video.ok_or_else(|| {
            Error::decoder_open(track.codec.to_string(), "track has no picture parameters")
        })?;
        let format = raw_pixel_format(track.codec, params.depth).ok_or_else(|| {
            Error::decoder_open(
                track.codec.to_string(),
                format!("not an uncompressed layout (depth {})", params.depth),
            )
        })?;
        if params.width == 0 || params.height == 0 {
            return Err(Error::decoder_open(
                track.codec.to_string(),
                format!("invalid dimensions {}x{}", params.width, params.height),
            ));
        }
        let mut decoder = Self::new(format, params.width, params.height);
        if params.pixel_aspect.num > 0 && params.pixel_aspect.den > 0 {
            decoder.sample_aspect = params.pixel_aspect;
        }
        Ok(decoder)
    }
}

impl VideoDecoder for RawVideoDecoder {
    fn name(&self) -> &str {
        "rawvideo"
    }

    fn output_format(&self) -> PixelFormat {
        self.format
    }

    fn feed(&mut self, unit: &CompressedUnit) -> Result<Decoded<VideoFrame>> {
        let mut frame =
            VideoFrame::from_packed(self.format, self.width, self.height, unit.data.clone())?;
        frame.pts = unit.cts;
        frame.keyframe = true;
        frame.picture_type = PictureType::I;
        frame.sample_aspect = self.sample_aspect;
        frame.color_range = if self.format.is_rgb() {
            ColorRange::Full
        } else {
            ColorRange::Limited
        };
        Ok(Decoded::Unit(frame))
    }

    fn drain(&mut self) -> Result<Decoded<VideoFrame>> {
        Ok(Decoded::NeedMoreInput)
    }

    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn unit(data: Vec<u8>) -> CompressedUnit {
        CompressedUnit {
            track: 1,
            sample: 3,
            data: Bytes::from(data),
            dts: 2002,
            cts: 3003,
            duration: 1001,
            is_keyframe: true,
        }
    }

    #[test]
    fn test_fourcc_mapping() {
        assert_eq!(raw_pixel_format(FourCc::new(b"2vuy"), 16), Some(PixelFormat::Uyvy422));
        assert_eq!(raw_pixel_format(FourCc::new(b"raw "), 24), Some(PixelFormat::Rgb24));
        assert_eq!(raw_pixel_format(FourCc::new(b"raw "), 8), None);
        assert_eq!(raw_pixel_format(FourCc::new(b"avc1"), 24), None);
    }

    #[test]
    fn test_feed_wraps_buffer_without_copy() {
        let mut decoder = RawVideoDecoder::new(PixelFormat::Yuv420p, 2, 2);
        let unit = unit(vec![1, 2, 3, 4, 5, 6]);
        let frame = decoder.feed(&unit).unwrap().into_unit().unwrap();
        assert_eq!(frame.pts, 3003);
        assert_eq!(frame.planes.len(), 3);
        assert_eq!(&frame.planes[2].data[..], &[6]);
        assert_eq!(frame.planes[0].data.as_ptr(), unit.data.as_ptr());
        assert_eq!(decoder.drain().unwrap(), Decoded::NeedMoreInput);
    }

    #[test]
    fn test_short_sample_is_decode_error() {
        let mut decoder = RawVideoDecoder::new(PixelFormat::Rgb24, 2, 2);
        assert!(matches!(decoder.feed(&unit(vec![0; 5])), Err(Error::Decode(_))));
    }
}
