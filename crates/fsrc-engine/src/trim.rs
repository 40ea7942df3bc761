//! Encoder priming and padding: how many decoded samples to drop at the
//! front and the back of an audio track.

use fsrc_core::{Diagnostic, MetadataItem, MetadataValue, TrackTimeline};

use crate::index::media_start_time;

const SMPB_MEANING: &str = "com.apple.iTunes";
const SMPB_NAME: &str = "iTunSMPB";
const SMPB_MIN_LEN: usize = 116;
const SMPB_FIELDS: usize = 12;

/// Priming, padding and the resulting output length, in sample frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTrimInfo {
    pub priming_sample_count: u64,
    pub padding_sample_count: u64,
    pub total_output_sample_count: u64,
    /// Samples the decoder produces for the whole track.
    pub decoded_sample_count: u64,
}

impl AudioTrimInfo {
    /// No trimming at all.
    pub fn untrimmed(decoded_sample_count: u64) -> Self {
        Self {
            priming_sample_count: 0,
            padding_sample_count: 0,
            total_output_sample_count: decoded_sample_count,
            decoded_sample_count,
        }
    }

    /// Map an output position to its decoded-stream position.
    pub fn decoded_position(&self, output: i64) -> i64 {
        output + self.priming_sample_count as i64
    }

    /// First decoded position that is never emitted.
    pub fn decoded_limit(&self) -> u64 {
        self.decoded_sample_count
            .saturating_sub(self.padding_sample_count)
    }

    /// The same trim at a different sample rate.
    pub fn rescaled(&self, from_rate: u32, to_rate: u32) -> Self {
        if from_rate == to_rate || from_rate == 0 {
            return *self;
        }
        let scale = |n: u64| rescale(n, from_rate as u64, to_rate as u64);
        Self {
            priming_sample_count: scale(self.priming_sample_count),
            padding_sample_count: scale(self.padding_sample_count),
            total_output_sample_count: scale(self.total_output_sample_count),
            decoded_sample_count: scale(self.decoded_sample_count),
        }
    }
}

/// The fields of an iTunSMPB record this crate uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmpbRecord {
    pub priming: u64,
    pub padding: u64,
    pub duration: u64,
}

/// Parse an iTunSMPB value: at least 116 bytes holding twelve
/// whitespace-separated hexadecimal fields. Only fields 2 to 4 are kept.
pub fn parse_itunsmpb(value: &[u8]) -> Option<SmpbRecord> {
    if value.len() < SMPB_MIN_LEN {
        return None;
    }
    let text = std::str::from_utf8(value).ok()?;
    let fields = text
        .split_whitespace()
        .take(SMPB_FIELDS)
        .map(|field| u64::from_str_radix(field, 16).ok())
        .collect::<Option<Vec<u64>>>()?;
    if fields.len() < SMPB_FIELDS {
        return None;
    }
    Some(SmpbRecord {
        priming: fields[1],
        padding: fields[2],
        duration: fields[3],
    })
}

/// Work out the trim for an audio track.
///
/// `sample_rate` is the decoder's rate; the timeline's timescale may differ
/// from it. Problems with the metadata record are returned as diagnostics.
pub fn resolve(
    timeline: &TrackTimeline,
    metadata: &[MetadataItem],
    sample_rate: u32,
    skip_priming: bool,
) -> (AudioTrimInfo, Vec<Diagnostic>) {
    let to_samples = |ticks: u64| match timeline.timescale {
        0 => ticks,
        ts => rescale(ticks, ts as u64, sample_rate as u64),
    };
    let decoded = to_samples(timeline.media_duration());
    if !skip_priming {
        return (AudioTrimInfo::untrimmed(decoded), Vec::new());
    }

    let mut diagnostics = Vec::new();
    let record = metadata.iter().find(|item| {
        item.meaning.as_deref() == Some(SMPB_MEANING) && item.name.as_deref() == Some(SMPB_NAME)
    });
    if let Some(item) = record {
        let raw = match &item.value {
            MetadataValue::Text(text) => text.as_bytes(),
            MetadataValue::Binary(bytes) => bytes.as_ref(),
        };
        match parse_itunsmpb(raw) {
            Some(smpb) => {
                tracing::debug!(
                    "iTunSMPB: priming {}, padding {}, duration {}",
                    smpb.priming,
                    smpb.padding,
                    smpb.duration
                );
                let info = AudioTrimInfo {
                    priming_sample_count: smpb.priming,
                    padding_sample_count: smpb.padding,
                    total_output_sample_count: smpb.duration + smpb.priming,
                    decoded_sample_count: decoded,
                };
                return (info, diagnostics);
            }
            None => diagnostics.push(Diagnostic::warning(format!(
                "ignoring malformed iTunSMPB record ({} bytes)",
                raw.len()
            ))),
        }
    }

    let priming_ticks =
        timeline.composition_to_decode_shift + media_start_time(&timeline.edits) as u64;
    let info = AudioTrimInfo {
        priming_sample_count: to_samples(priming_ticks),
        padding_sample_count: 0,
        total_output_sample_count: decoded,
        decoded_sample_count: decoded,
    };
    (info, diagnostics)
}

fn rescale(value: u64, from: u64, to: u64) -> u64 {
    if from == 0 {
        return value;
    }
    ((value as u128 * to as u128 + from as u128 / 2) / from as u128) as u64
}
