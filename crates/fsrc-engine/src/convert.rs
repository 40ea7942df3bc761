//! Built-in pixel and PCM converters.
//!
//! [`PixelConverter`] turns any YUV layout into planar/semi-planar YUV or
//! packed RGB. [`PcmConverter`] changes sample format, channel layout and
//! sample rate; resampling keeps history across blocks until `reset`.

use bytes::Bytes;
use rubato::{FftFixedIn, ResampleError, Resampler};
use fsrc_core::speaker::{BC, BL, BR, FC, FL, FR, LFE, SL, SR};
use fsrc_core::{
    AudioConverter, AudioFormat, ChannelLayout, ColorMatrix, ColorRange, Error, PcmBlock,
    PixelFormat, Plane, Result, SampleFormat, VideoConverter, VideoFrame,
};

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

/// Stateless YUV unpacker/packer and YUV to RGB matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelConverter;

const TARGETS: [PixelFormat; 6] = [
    PixelFormat::Yuv420p,
    PixelFormat::Yuv422p,
    PixelFormat::Yuv444p,
    PixelFormat::Nv12,
    PixelFormat::Rgb24,
    PixelFormat::Bgra,
];

impl VideoConverter for PixelConverter {
    fn supports(&self, from: PixelFormat, to: PixelFormat) -> bool {
        from == to || (!from.is_rgb() && TARGETS.contains(&to))
    }

    fn convert(&mut self, frame: &VideoFrame, target: PixelFormat) -> Result<VideoFrame> {
        if frame.format == target {
            return Ok(frame.clone());
        }
        if !self.supports(frame.format, target) {
            return Err(Error::unsupported(format!(
                "cannot convert {} to {target}",
                frame.format
            )));
        }
        let source = YuvReader::new(frame)?;
        let (w, h) = (frame.width as usize, frame.height as usize);
        let geometry = target.planes(frame.width, frame.height);
        let mut planes: Vec<Vec<u8>> = geometry
            .iter()
            .map(|g| vec![0u8; g.row_bytes * g.rows])
            .collect();

        match target {
            PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Yuv444p => {
                let (sx, sy) = target.chroma_shift();
                for y in 0..h {
                    for x in 0..w {
                        planes[0][y * geometry[0].row_bytes + x] = source.luma(x, y);
                    }
                }
                for cy in 0..geometry[1].rows {
                    for cx in 0..geometry[1].row_bytes {
                        let (u, v) = source.chroma(cx << sx, cy << sy);
                        planes[1][cy * geometry[1].row_bytes + cx] = u;
                        planes[2][cy * geometry[2].row_bytes + cx] = v;
                    }
                }
            }
            PixelFormat::Nv12 => {
                for y in 0..h {
                    for x in 0..w {
                        planes[0][y * geometry[0].row_bytes + x] = source.luma(x, y);
                    }
                }
                for cy in 0..geometry[1].rows {
                    for cx in 0..geometry[1].row_bytes / 2 {
                        let (u, v) = source.chroma(cx << 1, cy << 1);
                        let at = cy * geometry[1].row_bytes + cx * 2;
                        planes[1][at] = u;
                        planes[1][at + 1] = v;
                    }
                }
            }
            PixelFormat::Rgb24 | PixelFormat::Bgra => {
                let bgra = target == PixelFormat::Bgra;
                let bpp = if bgra { 4 } else { 3 };
                let matrix = frame.color_matrix;
                for y in 0..h {
                    for x in 0..w {
                        let (u, v) = source.chroma(x, y);
                        let (r, g, b) = yuv_to_rgb(source.luma(x, y), u, v, matrix);
                        let at = y * geometry[0].row_bytes + x * bpp;
                        let px = &mut planes[0][at..at + bpp];
                        if bgra {
                            px.copy_from_slice(&[b, g, r, 0xff]);
                        } else {
                            px.copy_from_slice(&[r, g, b]);
                        }
                    }
                }
            }
            other => {
                return Err(Error::unsupported(format!("{other} is not a conversion target")));
            }
        }

        let planes = planes
            .into_iter()
            .zip(&geometry)
            .map(|(data, g)| Plane {
                data: Bytes::from(data),
                stride: g.row_bytes,
                rows: g.rows,
            })
            .collect();
        let mut out = VideoFrame::with_planes(target, frame.width, frame.height, planes);
        out.copy_props_from(frame);
        if target.is_rgb() {
            out.color_range = ColorRange::Full;
            out.color_matrix = ColorMatrix::Rgb;
        }
        Ok(out)
    }
}

/// Random access to the 8-bit Y/U/V values of any YUV layout, with chroma
/// addressed in luma coordinates.
struct YuvReader<'a> {
    frame: &'a VideoFrame,
}

impl<'a> YuvReader<'a> {
    fn new(frame: &'a VideoFrame) -> Result<Self> {
        let expected = frame.format.planes(frame.width, frame.height).len();
        if frame.planes.len() < expected {
            return Err(Error::decode(format!(
                "{} frame has {} planes, expected {expected}",
                frame.format,
                frame.planes.len()
            )));
        }
        Ok(Self { frame })
    }

    fn at(&self, plane: usize, x: usize, y: usize) -> u8 {
        let p = &self.frame.planes[plane];
        p.data.get(y * p.stride + x).copied().unwrap_or(0)
    }

    /// High bit depth samples are little-endian words; keep the top 8 bits.
    fn at_wide(&self, plane: usize, x: usize, y: usize) -> u8 {
        let p = &self.frame.planes[plane];
        let at = y * p.stride + x * 2;
        let lo = p.data.get(at).copied().unwrap_or(0) as u16;
        let hi = p.data.get(at + 1).copied().unwrap_or(0) as u16;
        let shift = self.frame.format.bit_depth() - 8;
        (((hi << 8) | lo) >> shift).min(255) as u8
    }

    fn luma(&self, x: usize, y: usize) -> u8 {
        match self.frame.format {
            PixelFormat::Yuv420p10 | PixelFormat::Yuv422p10 => self.at_wide(0, x, y),
            PixelFormat::Uyvy422 => self.at(0, (x >> 1) * 4 + 1 + (x & 1) * 2, y),
            PixelFormat::Yuyv422 => self.at(0, (x >> 1) * 4 + (x & 1) * 2, y),
            _ => self.at(0, x, y),
        }
    }

    fn chroma(&self, x: usize, y: usize) -> (u8, u8) {
        let (sx, sy) = self.frame.format.chroma_shift();
        let (cx, cy) = (x >> sx, y >> sy);
        match self.frame.format {
            PixelFormat::Yuv420p10 | PixelFormat::Yuv422p10 => {
                (self.at_wide(1, cx, cy), self.at_wide(2, cx, cy))
            }
            PixelFormat::Nv12 => (self.at(1, cx * 2, cy), self.at(1, cx * 2 + 1, cy)),
            PixelFormat::Uyvy422 => (self.at(0, cx * 4, y), self.at(0, cx * 4 + 2, y)),
            PixelFormat::Yuyv422 => (self.at(0, cx * 4 + 1, y), self.at(0, cx * 4 + 3, y)),
            _ => (self.at(1, cx, cy), self.at(2, cx, cy)),
        }
    }
}

/// Limited-range YUV to full-range RGB in 8.8 fixed point.
fn yuv_to_rgb(y: u8, u: u8, v: u8, matrix: ColorMatrix) -> (u8, u8, u8) {
    let c = 298 * (y as i32 - 16);
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let (r, g, b) = match matrix {
        ColorMatrix::Bt709 => (c + 459 * e, c - 55 * d - 136 * e, c + 541 * d),
        _ => (c + 409 * e, c - 100 * d - 208 * e, c + 516 * d),
    };
    let clamp = |v: i32| ((v + 128) >> 8).clamp(0, 255) as u8;
    (clamp(r), clamp(g), clamp(b))
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

/// Input frames handed to the resampler per call.
const RESAMPLE_CHUNK: usize = 1024;

/// Sample format, channel layout and sample rate conversion through `f64`.
#[derive(Debug, Default)]
pub struct PcmConverter {
    /// Cached mixing matrix for the last (from, to) layout pair.
    matrix: Option<(ChannelLayout, ChannelLayout, Vec<Vec<f64>>)>,
    rate: Option<RateStage>,
}

impl PcmConverter {
    /// Planar samples of `block` in the target layout.
    fn remix(&mut self, block: &PcmBlock, target: &AudioFormat) -> Vec<Vec<f64>> {
        let from = block.format;
        let in_channels = from.channels() as usize;
        let in_size = from.sample_format.bytes();
        let same_layout = from.layout == target.layout;
        if !same_layout {
            let stale = !matches!(&self.matrix, Some((f, t, _)) if *f == from.layout && *t == target.layout);
            if stale {
                self.matrix = Some((from.layout, target.layout, mix_matrix(from.layout, target.layout)));
            }
        }

        let mut planes = vec![Vec::with_capacity(block.frames()); target.channels() as usize];
        let mut input = vec![0f64; in_channels];
        for frame in block.data.chunks_exact(in_channels * in_size) {
            for (ch, sample) in frame.chunks_exact(in_size).enumerate() {
                input[ch] = read_sample(from.sample_format, sample);
            }
            match &self.matrix {
                Some((_, _, matrix)) if !same_layout => {
                    for (plane, row) in planes.iter_mut().zip(matrix) {
                        plane.push(row.iter().zip(&input).map(|(w, s)| w * s).sum());
                    }
                }
                _ => {
                    for (plane, &sample) in planes.iter_mut().zip(&input) {
                        plane.push(sample);
                    }
                }
            }
        }
        planes
    }

    fn rate_stage(&mut self, from: u32, to: u32, channels: usize) -> Result<&mut RateStage> {
        let stage = match self.rate.take() {
            Some(stage) if stage.matches(from, to, channels) => stage,
            _ => RateStage::new(from, to, channels)?,
        };
        Ok(self.rate.insert(stage))
    }
}

impl AudioConverter for PcmConverter {
    fn supports(&self, from: &AudioFormat, to: &AudioFormat) -> bool {
        from.channels() > 0 && to.channels() > 0 && from.sample_rate > 0 && to.sample_rate > 0
    }

    fn convert(&mut self, block: PcmBlock, target: &AudioFormat) -> Result<PcmBlock> {
        let from = block.format;
        if from == *target {
            return Ok(block);
        }
        if !self.supports(&from, target) {
            return Err(Error::unsupported(format!("cannot convert {from} to {target}")));
        }

        let mut planes = self.remix(&block, target);
        if from.sample_rate != target.sample_rate {
            planes = self
                .rate_stage(from.sample_rate, target.sample_rate, planes.len())?
                .push(planes)?;
        }
        Ok(PcmBlock::new(*target, interleave(target.sample_format, &planes)))
    }

    fn reset(&mut self) {
        self.rate = None;
    }

    fn finish(&mut self, target: &AudioFormat) -> Result<Option<PcmBlock>> {
        let Some(stage) = self.rate.as_mut() else {
            return Ok(None);
        };
        let tail = stage.finish()?;
        if tail.first().map_or(true, Vec::is_empty) {
            return Ok(None);
        }
        Ok(Some(PcmBlock::new(*target, interleave(target.sample_format, &tail))))
    }
}

/// Band-limited rate conversion of planar `f64` audio.
struct RateStage {
    from: u32,
    to: u32,
    resampler: FftFixedIn<f64>,
    /// Input not yet handed to the resampler, one buffer per channel.
    pending: Vec<Vec<f64>>,
    /// Leading output frames that are resampler latency.
    delay: usize,
}

impl std::fmt::Debug for RateStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateStage")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("pending", &self.pending.first().map_or(0, Vec::len))
            .field("delay", &self.delay)
            .finish()
    }
}

impl RateStage {
    fn new(from: u32, to: u32, channels: usize) -> Result<Self> {
        let resampler = FftFixedIn::<f64>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, channels)
            .map_err(|e| Error::unsupported(format!("cannot resample {from} Hz to {to} Hz: {e}")))?;
        let delay = resampler.output_delay();
        tracing::debug!("resampling {from} Hz to {to} Hz ({delay} frames latency)");
        Ok(Self {
            from,
            to,
            resampler,
            pending: vec![Vec::new(); channels],
            delay,
        })
    }

    fn matches(&self, from: u32, to: u32, channels: usize) -> bool {
        self.from == from && self.to == to && self.pending.len() == channels
    }

    fn push(&mut self, input: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>> {
        for (pending, samples) in self.pending.iter_mut().zip(input) {
            pending.extend(samples);
        }
        let mut out = vec![Vec::new(); self.pending.len()];
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }
            let chunk: Vec<Vec<f64>> = self
                .pending
                .iter_mut()
                .map(|p| p.drain(..needed).collect())
                .collect();
            let produced = self.resampler.process(&chunk, None).map_err(resample_error)?;
            self.append(&mut out, produced);
        }
        Ok(out)
    }

    /// Push out the partial chunk and the resampler's delay line.
    fn finish(&mut self) -> Result<Vec<Vec<f64>>> {
        let mut out = vec![Vec::new(); self.pending.len()];
        if !self.pending[0].is_empty() {
            let chunk: Vec<Vec<f64>> = self.pending.iter_mut().map(std::mem::take).collect();
            let produced = self
                .resampler
                .process_partial(Some(&chunk), None)
                .map_err(resample_error)?;
            self.append(&mut out, produced);
        }
        let produced = self
            .resampler
            .process_partial(None::<&[Vec<f64>]>, None)
            .map_err(resample_error)?;
        self.append(&mut out, produced);
        Ok(out)
    }

    fn append(&mut self, out: &mut [Vec<f64>], produced: Vec<Vec<f64>>) {
        let frames = produced.first().map_or(0, Vec::len);
        let skip = self.delay.min(frames);
        self.delay -= skip;
        for (out, samples) in out.iter_mut().zip(produced) {
            out.extend_from_slice(&samples[skip..]);
        }
    }
}

fn resample_error(e: ResampleError) -> Error {
    Error::decode(format!("resampling failed: {e}"))
}

fn interleave(format: SampleFormat, planes: &[Vec<f64>]) -> Vec<u8> {
    let frames = planes.first().map_or(0, Vec::len);
    let mut out = Vec::with_capacity(frames * planes.len() * format.bytes());
    for i in 0..frames {
        for plane in planes {
            write_sample(format, plane[i], &mut out);
        }
    }
    out
}

fn read_sample(format: SampleFormat, bytes: &[u8]) -> f64 {
    match format {
        SampleFormat::U8 => (bytes[0] as f64 - 128.0) / 128.0,
        SampleFormat::S16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64 / 32768.0,
        SampleFormat::S32 => {
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64 / 2_147_483_648.0
        }
        SampleFormat::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
    }
}

fn write_sample(format: SampleFormat, value: f64, out: &mut Vec<u8>) {
    match format {
        SampleFormat::U8 => {
            out.push(((value * 128.0).round() + 128.0).clamp(0.0, 255.0) as u8);
        }
        SampleFormat::S16 => {
            let v = (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            out.extend_from_slice(&v.to_le_bytes());
        }
        SampleFormat::S32 => {
            let v = (value * 2_147_483_648.0)
                .round()
                .clamp(-2_147_483_648.0, 2_147_483_647.0) as i32;
            out.extend_from_slice(&v.to_le_bytes());
        }
        SampleFormat::F32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
    }
}

fn positions(layout: ChannelLayout) -> Vec<u64> {
    (0..64)
        .map(|bit| 1u64 << bit)
        .filter(|b| layout.0 & b != 0)
        .collect()
}

/// Rows are output channels, columns input channels, both in speaker-bit
/// order. Rows summing above 1 are normalized.
fn mix_matrix(from: ChannelLayout, to: ChannelLayout) -> Vec<Vec<f64>> {
    const HALF_POWER: f64 = std::f64::consts::FRAC_1_SQRT_2;
    let inputs = positions(from);
    let outputs = positions(to);
    let column = |speaker: u64| inputs.iter().position(|&s| s == speaker);

    let mut matrix = vec![vec![0f64; inputs.len()]; outputs.len()];

    // Mono output: plain average of everything but LFE.
    if to == ChannelLayout::MONO {
        let sources: Vec<usize> = (0..inputs.len()).filter(|&i| inputs[i] != LFE).collect();
        let weight = 1.0 / sources.len().max(1) as f64;
        for i in sources {
            matrix[0][i] = weight;
        }
        return matrix;
    }

    for (row, &speaker) in outputs.iter().enumerate() {
        if let Some(i) = column(speaker) {
            matrix[row][i] = 1.0;
        } else if speaker == FL || speaker == FR {
            // Mono upmix.
            if let Some(c) = column(FC).filter(|_| from == ChannelLayout::MONO) {
                matrix[row][c] = 1.0;
            }
        }
    }

    // Fold input channels the output lacks into the front pair.
    let out_has = |speaker: u64| to.0 & speaker != 0;
    let front = [outputs.iter().position(|&s| s == FL), outputs.iter().position(|&s| s == FR)];
    for (i, &speaker) in inputs.iter().enumerate() {
        if out_has(speaker) || from == ChannelLayout::MONO {
            continue;
        }
        let (left, right) = match speaker {
            FC => (HALF_POWER, HALF_POWER),
            BL | SL => (HALF_POWER, 0.0),
            BR | SR => (0.0, HALF_POWER),
            BC => (0.5, 0.5),
            _ => (0.0, 0.0),
        };
        if let Some(l) = front[0] {
            matrix[l][i] += left;
        }
        if let Some(r) = front[1] {
            matrix[r][i] += right;
        }
    }

    for row in &mut matrix {
        let sum: f64 = row.iter().sum();
        if sum > 1.0 {
            row.iter_mut().for_each(|w| *w /= sum);
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s16_block(layout: ChannelLayout, values: &[i16]) -> PcmBlock {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        PcmBlock::new(
            AudioFormat {
                sample_format: SampleFormat::S16,
                layout,
                sample_rate: 48000,
            },
            data,
        )
    }

    fn s16_values(block: &PcmBlock) -> Vec<i16> {
        block
            .data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    fn target(sample_format: SampleFormat, layout: ChannelLayout) -> AudioFormat {
        AudioFormat {
            sample_format,
            layout,
            sample_rate: 48000,
        }
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let mut conv = PcmConverter::default();
        let block = s16_block(ChannelLayout::STEREO, &[1000, 3000, -200, 200]);
        let out = conv
            .convert(block, &target(SampleFormat::S16, ChannelLayout::MONO))
            .unwrap();
        assert_eq!(s16_values(&out), vec![2000, 0]);
    }

    #[test]
    fn test_mono_to_stereo_duplicates() {
        let mut conv = PcmConverter::default();
        let block = s16_block(ChannelLayout::MONO, &[7, -9]);
        let out = conv
            .convert(block, &target(SampleFormat::S16, ChannelLayout::STEREO))
            .unwrap();
        assert_eq!(s16_values(&out), vec![7, 7, -9, -9]);
    }

    #[test]
    fn test_surround_downmix_keeps_front_and_drops_lfe() {
        let mut conv = PcmConverter::default();
        // FL FR FC LFE BL BR
        let block = s16_block(ChannelLayout::LAYOUT_5_1, &[10000, 0, 0, 30000, 0, 0]);
        let out = conv
            .convert(block, &target(SampleFormat::S16, ChannelLayout::STEREO))
            .unwrap();
        let values = s16_values(&out);
        let norm = 1.0 + 2.0 * std::f64::consts::FRAC_1_SQRT_2;
        assert_eq!(values[0], (10000.0 / norm).round() as i16);
        assert_eq!(values[1], 0);
    }

    #[test]
    fn test_sample_format_conversion_is_exact() {
        let mut conv = PcmConverter::default();
        let block = s16_block(ChannelLayout::MONO, &[-32768, 0, 16384]);
        let f32_out = conv
            .convert(block.clone(), &target(SampleFormat::F32, ChannelLayout::MONO))
            .unwrap();
        let floats: Vec<f32> = f32_out
            .data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(floats, vec![-1.0, 0.0, 0.5]);

        let s32_out = conv
            .convert(block.clone(), &target(SampleFormat::S32, ChannelLayout::MONO))
            .unwrap();
        assert_eq!(&s32_out.data[8..12], &(16384i32 << 16).to_le_bytes());

        let u8_out = conv
            .convert(block, &target(SampleFormat::U8, ChannelLayout::MONO))
            .unwrap();
        assert_eq!(u8_out.data, vec![0, 128, 192]);
    }

    fn f32_values(block: &PcmBlock) -> Vec<f32> {
        block
            .data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Eight blocks of constant 0.25 mono at 8 kHz, resampled to 16 kHz f32.
    fn upsample(conv: &mut PcmConverter) -> Vec<f32> {
        let from = AudioFormat {
            sample_format: SampleFormat::S16,
            layout: ChannelLayout::MONO,
            sample_rate: 8000,
        };
        let to = AudioFormat {
            sample_format: SampleFormat::F32,
            sample_rate: 16000,
            ..from
        };
        let mut values = Vec::new();
        for _ in 0..8 {
            let data = [8192i16; 500].iter().flat_map(|v| v.to_le_bytes()).collect();
            let out = conv.convert(PcmBlock::new(from, data), &to).unwrap();
            assert_eq!(out.format, to);
            values.extend(f32_values(&out));
        }
        if let Some(tail) = conv.finish(&to).unwrap() {
            values.extend(f32_values(&tail));
        }
        values
    }

    #[test]
    fn test_rate_change_resamples_across_blocks() {
        let mut conv = PcmConverter::default();
        let values = upsample(&mut conv);

        // 4000 input frames at twice the rate, plus the flushed filter tail.
        assert!(values.len() >= 8000, "{} frames", values.len());
        assert!(values.len() < 8000 + 4 * RESAMPLE_CHUNK);
        assert!(values[1000..7000].iter().all(|v| (v - 0.25).abs() < 0.02));
    }

    #[test]
    fn test_reset_restarts_the_resampler() {
        let mut conv = PcmConverter::default();
        let first = upsample(&mut conv);
        conv.reset();
        assert_eq!(upsample(&mut conv), first);
        conv.reset();
        assert_eq!(conv.finish(&target(SampleFormat::S16, ChannelLayout::MONO)).unwrap(), None);
    }

    fn packed(format: PixelFormat, w: u32, h: u32, data: Vec<u8>) -> VideoFrame {
        VideoFrame::from_packed(format, w, h, Bytes::from(data)).unwrap()
    }

    #[test]
    fn test_nv12_and_yuv420p_roundtrip_losslessly() {
        let mut conv = PixelConverter;
        // 4x2 luma, one 2x1 chroma row of interleaved U/V.
        let nv12 = packed(PixelFormat::Nv12, 4, 2, vec![1, 2, 3, 4, 5, 6, 7, 8, 100, 200, 110, 210]);
        let planar = conv.convert(&nv12, PixelFormat::Yuv420p).unwrap();
        assert_eq!(&planar.planes[1].data[..], &[100, 110]);
        assert_eq!(&planar.planes[2].data[..], &[200, 210]);
        let back = conv.convert(&planar, PixelFormat::Nv12).unwrap();
        assert_eq!(back.planes, nv12.planes);
    }

    #[test]
    fn test_uyvy_to_planar_422() {
        let mut conv = PixelConverter;
        let uyvy = packed(PixelFormat::Uyvy422, 2, 1, vec![90, 16, 240, 235]);
        let planar = conv.convert(&uyvy, PixelFormat::Yuv422p).unwrap();
        assert_eq!(&planar.planes[0].data[..], &[16, 235]);
        assert_eq!(&planar.planes[1].data[..], &[90]);
        assert_eq!(&planar.planes[2].data[..], &[240]);
    }

    #[test]
    fn test_limited_range_black_and_white_to_rgb() {
        let mut conv = PixelConverter;
        let yuv = packed(PixelFormat::Yuv444p, 2, 1, vec![16, 235, 128, 128, 128, 128]);
        let rgb = conv.convert(&yuv, PixelFormat::Rgb24).unwrap();
        assert_eq!(&rgb.planes[0].data[..], &[0, 0, 0, 255, 255, 255]);
        assert_eq!(rgb.color_range, ColorRange::Full);

        let bgra = conv.convert(&yuv, PixelFormat::Bgra).unwrap();
        assert_eq!(&bgra.planes[0].data[..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_high_bit_depth_truncates_to_8_bits() {
        let mut conv = PixelConverter;
        let frame = VideoFrame::blank(PixelFormat::Yuv420p10, 2, 2);
        let out = conv.convert(&frame, PixelFormat::Yuv420p).unwrap();
        assert_eq!(out, {
            let mut black = VideoFrame::blank(PixelFormat::Yuv420p, 2, 2);
            black.copy_props_from(&frame);
            black
        });
    }

    #[test]
    fn test_rgb_source_is_unsupported() {
        let mut conv = PixelConverter;
        assert!(!conv.supports(PixelFormat::Rgb24, PixelFormat::Yuv420p));
        let frame = VideoFrame::blank(PixelFormat::Rgb24, 2, 2);
        assert!(matches!(
            conv.convert(&frame, PixelFormat::Yuv420p),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
