//! [`Demuxer`] implementation over a parsed `moov`.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;
use fsrc_core::{CompressedUnit, Demuxer, Error, MetadataItem, Result, TrackSummary, TrackTimeline};

use super::movie::{parse_moov, Movie, MovieTrack};

/// Random-access MP4/MOV reader.
///
/// Each track keeps its own read cursor, so interleaved reads of a video and
/// an audio track over one file do not disturb each other.
#[derive(Debug)]
pub struct Mp4Demuxer<R = BufReader<File>> {
    reader: R,
    movie: Movie,
    summaries: Vec<TrackSummary>,
    /// Next 0-based sample index per track.
    cursors: Vec<usize>,
}

impl Mp4Demuxer {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::open(format!("cannot open {}: {e}", path.display())))?;
        tracing::debug!("opening {}", path.display());
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek + Send> Mp4Demuxer<R> {
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let movie = parse_moov(&mut reader)
            .map_err(|e| Error::demux(format!("not a readable MP4 file: {e}")))?;
        let summaries = movie.tracks.iter().map(|t| t.summary.clone()).collect();
        let cursors = vec![0; movie.tracks.len()];
        Ok(Self {
            reader,
            movie,
            summaries,
            cursors,
        })
    }

    /// Movie timescale from `mvhd`.
    pub fn movie_timescale(&self) -> u32 {
        self.movie.timescale
    }

    /// Movie duration in movie timescale ticks.
    pub fn movie_duration(&self) -> u64 {
        self.movie.duration
    }

    fn track(&self, track: u32) -> Result<(usize, &MovieTrack)> {
        let index = (track as usize)
            .checked_sub(1)
            .filter(|&i| i < self.movie.tracks.len())
            .ok_or(Error::TrackNotFound {
                requested: track,
                available: self.movie.tracks.len() as u32,
            })?;
        Ok((index, &self.movie.tracks[index]))
    }
}

impl<R: Read + Seek + Send> Demuxer for Mp4Demuxer<R> {
    fn tracks(&self) -> &[TrackSummary] {
        &self.summaries
    }

    fn timeline(&self, track: u32) -> Result<TrackTimeline> {
        let (_, t) = self.track(track)?;
        Ok(t.timeline())
    }

    fn metadata(&self) -> &[MetadataItem] {
        &self.movie.metadata
    }

    fn seek(&mut self, track: u32, sample: u32) -> Result<()> {
        let (index, t) = self.track(track)?;
        let count = t.table.samples.len();
        // `count + 1` positions the cursor at end of track.
        if sample == 0 || sample as usize > count + 1 {
            return Err(Error::demux(format!(
                "track {track}: sample {sample} is outside 1..={count}"
            )));
        }
        self.cursors[index] = sample as usize - 1;
        Ok(())
    }

    fn read_next(&mut self, track: u32) -> Result<Option<CompressedUnit>> {
        let (index, t) = self.track(track)?;
        let Some(sample) = t.table.samples.get(self.cursors[index]).copied() else {
            return Ok(None);
        };
        let shift = t.table.composition_to_decode_shift as i64;

        let mut data = vec![0u8; sample.size as usize];
        self.reader
            .seek(SeekFrom::Start(sample.file_offset))
            .and_then(|_| self.reader.read_exact(&mut data))
            .map_err(|e| {
                Error::demux(format!(
                    "track {track}: cannot read sample {} at offset {}: {e}",
                    sample.number, sample.file_offset
                ))
            })?;
        self.cursors[index] += 1;

        Ok(Some(CompressedUnit {
            track,
            sample: sample.number,
            data: Bytes::from(data),
            dts: sample.decode_timestamp,
            cts: sample.decode_timestamp as i64 + sample.composition_offset + shift,
            duration: sample.duration,
            is_keyframe: sample.is_sync,
        }))
    }
}
