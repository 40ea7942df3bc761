//! Presentation-order index over a track's decode-order samples.

use fsrc_core::{EditEntry, Error, MediaKind, Rational, Result, TrackTimeline};

use crate::timestamp::estimate_framerate;

/// One sample as the engines see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedSample {
    /// 1-based decode-order index.
    pub decode_index: u32,
    /// Composition timestamp including the composition-to-decode shift.
    /// Decoders stamp their output with this value.
    pub cts: i64,
    pub duration: u32,
    pub is_keyframe: bool,
    pub is_disposable: bool,
}

/// Decode-order samples plus the presentation-order frame mapping.
#[derive(Debug, Clone)]
pub struct TrackIndex {
    timescale: u32,
    samples: Vec<IndexedSample>,
    /// Presentation position -> decode index, after edit trimming.
    presentation: Vec<u32>,
    /// Decode index - 1 -> presentation position, `None` when trimmed.
    positions: Vec<Option<u32>>,
    framerate: Rational,
    edit_start: i64,
    composition_to_decode_shift: u64,
}

/// Start and presented duration of the first non-empty edit.
///
/// An edit with zero duration means the file has no usable edits. Empty
/// edits (media time -1) are skipped.
pub fn edit_window(edits: &[EditEntry]) -> Option<(i64, u64)> {
    for edit in edits {
        if edit.segment_duration == 0 {
            return None;
        }
        if edit.media_time >= 0 {
            return Some((edit.media_time, edit.segment_duration));
        }
    }
    None
}

/// Media time the presentation starts at, 0 without edits.
pub fn media_start_time(edits: &[EditEntry]) -> i64 {
    edit_window(edits).map_or(0, |(start, _)| start.max(0))
}

impl TrackIndex {
    /// Build the index. Video samples lying entirely outside the first
    /// non-empty edit are dropped from the frame mapping.
    pub fn build(timeline: &TrackTimeline, kind: MediaKind) -> Result<Self> {
        if timeline.samples.is_empty() {
            return Err(Error::index("track has no samples"));
        }
        if timeline.timescale == 0 {
            return Err(Error::index("track has a zero timescale"));
        }

        let samples: Vec<IndexedSample> = timeline
            .samples
            .iter()
            .map(|s| IndexedSample {
                decode_index: s.decode_index,
                cts: timeline.cts(s),
                duration: s.duration,
                is_keyframe: s.is_keyframe,
                is_disposable: s.is_disposable,
            })
            .collect();
        if samples
            .iter()
            .enumerate()
            .any(|(i, s)| s.decode_index as usize != i + 1)
        {
            return Err(Error::index("decode indices are not dense"));
        }

        let shift = timeline.composition_to_decode_shift;
        let window = edit_window(&timeline.edits);
        let edit_start = window.map_or(0, |(start, _)| start.max(0));

        let mut presentation: Vec<u32> = samples
            .iter()
            .filter(|s| kind != MediaKind::Video || within_edit(s, shift, window))
            .map(|s| s.decode_index)
            .collect();
        if presentation.is_empty() {
            return Err(Error::index("the edit list trims every frame"));
        }
        presentation.sort_by_key(|&d| (samples[d as usize - 1].cts, d));

        let mut positions = vec![None; samples.len()];
        for (position, &d) in presentation.iter().enumerate() {
            positions[d as usize - 1] = Some(position as u32);
        }

        let timing: Vec<(i64, u32)> = presentation
            .iter()
            .map(|&d| {
                let s = &samples[d as usize - 1];
                (s.cts, s.duration)
            })
            .collect();
        let framerate = estimate_framerate(timeline.timescale, &timing);

        let trimmed = samples.len() - presentation.len();
        if trimmed > 0 {
            tracing::debug!("edit list trims {trimmed} of {} samples", samples.len());
        }
        tracing::debug!(
            "indexed {} samples, {} frames, ~{} fps",
            samples.len(),
            presentation.len(),
            framerate
        );

        Ok(Self {
            timescale: timeline.timescale,
            samples,
            presentation,
            positions,
            framerate,
            edit_start,
            composition_to_decode_shift: shift,
        })
    }

    /// Number of addressable presentation frames.
    pub fn frame_count(&self) -> u32 {
        self.presentation.len() as u32
    }

    pub fn sample_count(&self) -> u32 {
        self.samples.len() as u32
    }

    pub fn framerate(&self) -> Rational {
        self.framerate
    }

    pub fn timescale(&self) -> u32 {
        self.timescale
    }

    pub fn edit_start(&self) -> i64 {
        self.edit_start
    }

    pub fn composition_to_decode_shift(&self) -> u64 {
        self.composition_to_decode_shift
    }

    pub fn samples(&self) -> &[IndexedSample] {
        &self.samples
    }

    pub fn sample(&self, decode_index: u32) -> Option<&IndexedSample> {
        decode_index
            .checked_sub(1)
            .and_then(|i| self.samples.get(i as usize))
    }

    /// Decode index of a presentation frame, clamped to the last frame.
    pub fn decode_index(&self, frame: u32) -> u32 {
        let last = self.presentation.len() - 1;
        self.presentation[(frame as usize).min(last)]
    }

    /// Presentation position of a sample, `None` when trimmed or unknown.
    pub fn presentation_position(&self, decode_index: u32) -> Option<u32> {
        decode_index
            .checked_sub(1)
            .and_then(|i| self.positions.get(i as usize).copied().flatten())
    }

    /// Presentation position of the frame a decoder stamped with `cts`.
    pub fn position_of_cts(&self, cts: i64) -> Option<u32> {
        let at = self
            .presentation
            .partition_point(|&d| self.samples[d as usize - 1].cts < cts);
        self.presentation
            .get(at)
            .filter(|&&d| self.samples[d as usize - 1].cts == cts)
            .map(|_| at as u32)
    }

    /// The greatest seekable keyframe at or before `decode_index` whose
    /// presentation time does not exceed the target's.
    ///
    /// Disposable samples never qualify. Sample 1 is the fallback even when
    /// it is not flagged as a keyframe.
    pub fn keyframe_at_or_before(&self, decode_index: u32) -> u32 {
        let Some(target) = self.sample(decode_index) else {
            return 1;
        };
        self.samples[..decode_index as usize]
            .iter()
            .rev()
            .find(|s| s.is_keyframe && !s.is_disposable && s.cts <= target.cts)
            .map_or(1, |s| s.decode_index)
    }

    pub fn keyframe_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_keyframe).count()
    }

    /// Sum of all sample durations in timescale ticks.
    pub fn media_duration(&self) -> u64 {
        self.samples.iter().map(|s| s.duration as u64).sum()
    }
}

fn within_edit(sample: &IndexedSample, shift: u64, window: Option<(i64, u64)>) -> bool {
    let Some((start, duration)) = window else {
        return true;
    };
    let start = start.max(0);
    let composition = sample.cts - shift as i64;
    let end = composition + sample.duration as i64;
    if end <= start && sample.duration > 0 {
        return false;
    }
    composition < start + duration as i64
}
