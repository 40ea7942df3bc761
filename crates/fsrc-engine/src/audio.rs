//! Audio sample assembler: serves arbitrary `[start, start + length)`
//! ranges of trimmed, converted PCM from a forward-only decoder.
//!
//! Positions are counted in output-rate sample frames. Output position `p`
//! is decoded-stream position `p + priming`; the decoded stream ends at
//! `decoded_sample_count - padding`.

use fsrc_core::{
    AudioConverter, AudioDecoder, AudioFormat, Decoded, Demuxer, Error, PcmBlock, Result,
};

use crate::negotiate::AudioNegotiation;
use crate::trim::AudioTrimInfo;

/// Decoded PCM left over from the last block pulled out of the decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PcmCarryBuffer {
    /// Decoded-stream position of the first frame in `data`.
    pub start: u64,
    /// Interleaved frames in the output format.
    pub data: Vec<u8>,
}

impl PcmCarryBuffer {
    pub fn frames(&self, block_align: usize) -> u64 {
        match block_align {
            0 => 0,
            align => (self.data.len() / align) as u64,
        }
    }

    /// Decoded-stream position just past the buffered frames.
    pub fn end(&self, block_align: usize) -> u64 {
        self.start + self.frames(block_align)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub feeds: u64,
    /// Rewinds to the first sample after a backward request.
    pub resets: u64,
}

pub struct SampleAssembler {
    track: u32,
    demuxer: Box<dyn Demuxer>,
    decoder: Box<dyn AudioDecoder>,
    converter: Box<dyn AudioConverter>,
    negotiation: AudioNegotiation,
    trim: AudioTrimInfo,
    carry: PcmCarryBuffer,
    drained: bool,
    /// The converter's buffered tail has been collected.
    finished: bool,
    errored: bool,
    stats: AssemblerStats,
}

impl std::fmt::Debug for SampleAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleAssembler")
            .field("track", &self.track)
            .field("decoder", &self.decoder.name())
            .field("output", &self.negotiation.output)
            .field("trim", &self.trim)
            .field("carry_start", &self.carry.start)
            .field("errored", &self.errored)
            .finish()
    }
}

impl SampleAssembler {
    /// `trim` must already be expressed at the output sample rate.
    pub fn new(
        track: u32,
        mut demuxer: Box<dyn Demuxer>,
        decoder: Box<dyn AudioDecoder>,
        converter: Box<dyn AudioConverter>,
        negotiation: AudioNegotiation,
        trim: AudioTrimInfo,
    ) -> Result<Self> {
        demuxer.seek(track, 1)?;
        Ok(Self {
            track,
            demuxer,
            decoder,
            converter,
            negotiation,
            trim,
            carry: PcmCarryBuffer::default(),
            drained: false,
            finished: false,
            errored: false,
            stats: AssemblerStats::default(),
        })
    }

    pub fn output_format(&self) -> AudioFormat {
        self.negotiation.output
    }

    pub fn trim(&self) -> &AudioTrimInfo {
        &self.trim
    }

    /// Number of output sample frames the track yields.
    pub fn sample_count(&self) -> u64 {
        self.trim.total_output_sample_count
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    pub fn is_errored(&self) -> bool {
        self.errored
    }

    pub fn decoder_name(&self) -> &str {
        self.decoder.name()
    }

    /// Exactly `length` sample frames starting at output position `start`.
    ///
    /// Anything outside the track, past a decode failure or beyond the
    /// decoder's output reads as silence.
    pub fn read(&mut self, start: i64, length: u64) -> Vec<u8> {
        let format = self.negotiation.output;
        let align = format.block_align();
        let mut out = vec![format.sample_format.silence_byte(); length as usize * align];
        if length == 0 || self.errored {
            return out;
        }

        let total = self.trim.total_output_sample_count as i64;
        let end = start.saturating_add(length as i64);
        let lo = start.max(0);
        let hi = end.min(total);
        if lo >= hi {
            return out;
        }
        let origin = self.trim.decoded_position(start);
        let from = self.trim.decoded_position(lo) as u64;
        let to = (self.trim.decoded_position(hi) as u64).min(self.trim.decoded_limit());
        if from >= to {
            return out;
        }

        if from < self.carry.start {
            tracing::debug!(
                "track {}: position {from} is behind the decoder ({}), rewinding",
                self.track,
                self.carry.start
            );
            if let Err(e) = self.rewind() {
                self.fail(&e);
                return out;
            }
        }

        let mut pos = from;
        while pos < to {
            let carry_end = self.carry.end(align);
            if pos >= self.carry.start && pos < carry_end {
                let frames = (to.min(carry_end) - pos) as usize;
                let src = (pos - self.carry.start) as usize * align;
                let dst = (pos as i64 - origin) as usize * align;
                out[dst..dst + frames * align]
                    .copy_from_slice(&self.carry.data[src..src + frames * align]);
                pos += frames as u64;
                continue;
            }
            match self.next_block() {
                Ok(Some(block)) => {
                    self.carry = PcmCarryBuffer {
                        start: carry_end,
                        data: block.data,
                    };
                }
                Ok(None) => {
                    tracing::debug!(
                        "track {}: decoder ran dry at {carry_end}, expected {to}",
                        self.track
                    );
                    break;
                }
                Err(e) => {
                    self.fail(&e);
                    break;
                }
            }
        }
        out
    }

    fn fail(&mut self, error: &Error) {
        tracing::warn!(
            "track {}: audio decode failed ({error}); returning silence from now on",
            self.track
        );
        self.errored = true;
    }

    fn rewind(&mut self) -> Result<()> {
        self.decoder.flush();
        self.converter.reset();
        self.demuxer
            .seek(self.track, 1)
            .map_err(|e| Error::decode(format!("rewind: {e}")))?;
        self.carry = PcmCarryBuffer::default();
        self.drained = false;
        self.finished = false;
        self.stats.resets += 1;
        Ok(())
    }

    /// Next converted block, `None` once the decoder is fully drained.
    fn next_block(&mut self) -> Result<Option<PcmBlock>> {
        let output = loop {
            if self.drained {
                match self.decoder.drain()? {
                    Decoded::Unit(block) => break block,
                    Decoded::NeedMoreInput => return self.finish_conversion(),
                }
            }
            let unit = self
                .demuxer
                .read_next(self.track)
                .map_err(|e| Error::decode(format!("read: {e}")))?;
            let Some(unit) = unit else {
                self.drained = true;
                continue;
            };
            self.stats.feeds += 1;
            tracing::trace!("feeding audio sample {}", unit.sample);
            if let Decoded::Unit(block) = self.decoder.feed(&unit)? {
                break block;
            }
        };
        if !self.negotiation.needs_conversion {
            return Ok(Some(output));
        }
        let converted = self.converter.convert(output, &self.negotiation.output)?;
        if converted.format != self.negotiation.output {
            return Err(Error::decode(format!(
                "converter produced {}, expected {}",
                converted.format, self.negotiation.output
            )));
        }
        Ok(Some(converted))
    }

    /// Whatever the converter still holds once the decoder is empty.
    fn finish_conversion(&mut self) -> Result<Option<PcmBlock>> {
        if self.finished || !self.negotiation.needs_conversion {
            return Ok(None);
        }
        self.finished = true;
        self.converter.finish(&self.negotiation.output)
    }
}
