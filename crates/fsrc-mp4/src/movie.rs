//! `moov` parser: every track's header, edit list, sample description and
//! sample table, plus movie and track level iTunes metadata.

use std::io::{self, Read, Seek, SeekFrom};

use bytes::Bytes;
use fsrc_core::{
    EditEntry, FourCc, MediaKind, MetadataItem, SampleDescriptor, TrackSummary, TrackTimeline,
};

use super::atoms::{
    children_of, enter, find, invalid, read_box_header, read_entry_count, read_fullbox_header,
    read_i16, read_i32, read_i64, read_u32, read_u64, skip, BoxHeader,
};
use super::codec_config::parse_stsd;
use super::metadata::parse_udta;
use super::sample_table::{resolve_sample_table, ResolvedSampleTable};

/// Everything framesource needs from a `moov` box.
#[derive(Debug, Clone)]
pub struct Movie {
    pub timescale: u32,
    pub duration: u64,
    pub tracks: Vec<MovieTrack>,
    /// Movie-level items first, then track-level items in track order.
    pub metadata: Vec<MetadataItem>,
}

/// One parsed `trak`.
#[derive(Debug, Clone)]
pub struct MovieTrack {
    pub summary: TrackSummary,
    pub edits: Vec<EditEntry>,
    pub table: ResolvedSampleTable,
}

impl MovieTrack {
    pub fn timeline(&self) -> TrackTimeline {
        let samples = self
            .table
            .samples
            .iter()
            .map(|s| SampleDescriptor {
                decode_index: s.number,
                dts: s.decode_timestamp,
                composition_offset: s.composition_offset,
                duration: s.duration,
                size: s.size,
                is_keyframe: s.is_sync,
                is_disposable: s.is_disposable,
            })
            .collect();
        TrackTimeline {
            timescale: self.summary.timescale,
            samples,
            edits: self.edits.clone(),
            composition_to_decode_shift: self.table.composition_to_decode_shift,
        }
    }
}

/// Locate and parse the `moov` box of a file.
pub fn parse_moov<R: Read + Seek>(reader: &mut R) -> io::Result<Movie> {
    let file_size = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    // Top-level scan stops at the first unreadable box; truncated `mdat`
    // boxes are common at the end of a file.
    let mut moov = None;
    let mut pos = 0u64;
    while pos < file_size {
        reader.seek(SeekFrom::Start(pos))?;
        let header = match read_box_header(reader, file_size) {
            Ok(Some(header)) => header,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("stopping top-level scan at {pos}: {e}");
                break;
            }
        };
        if header.is(b"moov") {
            moov = Some(header);
            break;
        }
        pos = header.end();
    }
    let moov = moov.ok_or_else(|| invalid("no moov atom found"))?;
    let children = children_of(reader, &moov)?;

    let mvhd = find(&children, b"mvhd").ok_or_else(|| invalid("no mvhd in moov"))?;
    enter(reader, mvhd)?;
    let (timescale, duration) = read_media_header_times(reader)?;

    let mut metadata = match find(&children, b"udta") {
        Some(udta) => parse_udta(reader, udta)?,
        None => Vec::new(),
    };

    let mut tracks = Vec::new();
    for trak in children.iter().filter(|b| b.is(b"trak")) {
        let number = tracks.len() as u32 + 1;
        match parse_trak(reader, trak, number, timescale) {
            Ok((track, items)) => {
                tracing::debug!(
                    "track {number}: {} '{}', {} samples",
                    track.summary.kind,
                    track.summary.codec,
                    track.table.samples.len()
                );
                tracks.push(track);
                metadata.extend(items);
            }
            Err(e) => {
                tracing::warn!("track {number} is unreadable and will be ignored: {e}");
                tracks.push(unusable_track(number));
            }
        }
    }

    Ok(Movie {
        timescale,
        duration,
        tracks,
        metadata,
    })
}

fn unusable_track(number: u32) -> MovieTrack {
    MovieTrack {
        summary: TrackSummary {
            number,
            track_id: 0,
            kind: MediaKind::Other,
            codec: FourCc::default(),
            timescale: 0,
            duration: 0,
            codec_private: Bytes::new(),
            object_type: None,
            video: None,
            audio: None,
        },
        edits: Vec::new(),
        table: ResolvedSampleTable::default(),
    }
}

/// Read the (timescale, duration) pair shared by mvhd and mdhd.
fn read_media_header_times<R: Read + Seek>(reader: &mut R) -> io::Result<(u32, u64)> {
    let (version, _flags) = read_fullbox_header(reader)?;
    if version == 1 {
        // creation_time + modification_time
        skip(reader, 16)?;
        let timescale = read_u32(reader)?;
        let duration = read_u64(reader)?;
        Ok((timescale, duration))
    } else {
        skip(reader, 8)?;
        let timescale = read_u32(reader)?;
        let duration = read_u32(reader)? as u64;
        Ok((timescale, duration))
    }
}

/// Parse tkhd and return track_id.
fn parse_tkhd<R: Read + Seek>(reader: &mut R) -> io::Result<u32> {
    let (version, _flags) = read_fullbox_header(reader)?;
    skip(reader, if version == 1 { 16 } else { 8 })?;
    read_u32(reader)
}

fn parse_hdlr<R: Read + Seek>(reader: &mut R) -> io::Result<MediaKind> {
    read_fullbox_header(reader)?;
    let _pre_defined = read_u32(reader)?;
    let mut handler = [0u8; 4];
    reader.read_exact(&mut handler)?;
    Ok(match &handler {
        b"vide" => MediaKind::Video,
        b"soun" => MediaKind::Audio,
        _ => MediaKind::Other,
    })
}

/// Parse elst, converting segment durations from movie to media timescale.
fn parse_elst<R: Read + Seek>(
    reader: &mut R,
    elst: &BoxHeader,
    movie_timescale: u32,
    media_timescale: u32,
) -> io::Result<Vec<EditEntry>> {
    let (version, _flags) = read_fullbox_header(reader)?;
    let entry_size = if version == 1 { 20 } else { 12 };
    let entry_count = read_entry_count(reader, elst, entry_size)?;
    let mut edits = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let (segment_duration, media_time) = if version == 1 {
            (read_u64(reader)?, read_i64(reader)?)
        } else {
            (read_u32(reader)? as u64, read_i32(reader)? as i64)
        };
        let rate_integer = read_i16(reader)? as i32;
        let rate_fraction = read_i16(reader)? as i32 & 0xFFFF;
        let segment_duration = if movie_timescale == 0 {
            segment_duration
        } else {
            (segment_duration as u128 * media_timescale as u128 / movie_timescale as u128) as u64
        };
        edits.push(EditEntry {
            segment_duration,
            media_time,
            media_rate: (rate_integer << 16) | rate_fraction,
        });
    }
    Ok(edits)
}

fn parse_trak<R: Read + Seek>(
    reader: &mut R,
    trak: &BoxHeader,
    number: u32,
    movie_timescale: u32,
) -> io::Result<(MovieTrack, Vec<MetadataItem>)> {
    let children = children_of(reader, trak)?;

    let tkhd = find(&children, b"tkhd").ok_or_else(|| invalid("missing tkhd"))?;
    enter(reader, tkhd)?;
    let track_id = parse_tkhd(reader)?;

    let mdia = find(&children, b"mdia").ok_or_else(|| invalid("missing mdia"))?;
    let mdia_children = children_of(reader, mdia)?;

    let mdhd = find(&mdia_children, b"mdhd").ok_or_else(|| invalid("missing mdhd"))?;
    enter(reader, mdhd)?;
    let (timescale, duration) = read_media_header_times(reader)?;

    let kind = match find(&mdia_children, b"hdlr") {
        Some(hdlr) => {
            enter(reader, hdlr)?;
            parse_hdlr(reader)?
        }
        None => MediaKind::Other,
    };

    let mut edits = Vec::new();
    if let Some(edts) = find(&children, b"edts") {
        let edts_children = children_of(reader, edts)?;
        if let Some(elst) = find(&edts_children, b"elst") {
            enter(reader, elst)?;
            edits = parse_elst(reader, elst, movie_timescale, timescale)?;
        }
    }

    let minf = find(&mdia_children, b"minf").ok_or_else(|| invalid("missing minf"))?;
    let minf_children = children_of(reader, minf)?;
    let stbl = find(&minf_children, b"stbl").ok_or_else(|| invalid("missing stbl"))?;
    let stbl_children = children_of(reader, stbl)?;

    let entry = match find(&stbl_children, b"stsd") {
        Some(stsd) => parse_stsd(reader, stsd, kind)?,
        None => None,
    };
    let table = resolve_sample_table(reader, stbl)?;

    let items = match find(&children, b"udta") {
        Some(udta) => parse_udta(reader, udta)?,
        None => Vec::new(),
    };

    let (codec, codec_private, object_type, video, audio) = match entry {
        Some(e) => (e.fourcc, Bytes::from(e.codec_private), e.object_type, e.video, e.audio),
        None => (FourCc::default(), Bytes::new(), None, None, None),
    };

    let summary = TrackSummary {
        number,
        track_id,
        kind,
        codec,
        timescale,
        duration,
        codec_private,
        object_type,
        video,
        audio,
    };
    Ok((MovieTrack { summary, edits, table }, items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{AudioTrackSpec, FixtureSample, MovieBuilder, VideoTrackSpec};
    use fsrc_core::MetadataValue;
    use std::io::Cursor;

    fn video_spec(count: usize) -> VideoTrackSpec {
        VideoTrackSpec::new(b"raw ", 2, 2, 24000)
            .with_samples((0..count).map(|i| FixtureSample::new(vec![i as u8; 12], 1001, i % 3 == 0)))
    }

    #[test]
    fn test_parse_moov_video_and_audio() {
        let file = MovieBuilder::new(1000)
            .video(video_spec(6))
            .audio(AudioTrackSpec::pcm(b"sowt", 2, 16, 48000).with_frames(4, 1024))
            .build();
        let movie = parse_moov(&mut Cursor::new(file)).unwrap();

        assert_eq!(movie.timescale, 1000);
        assert_eq!(movie.tracks.len(), 2);

        let video = &movie.tracks[0];
        assert_eq!(video.summary.number, 1);
        assert_eq!(video.summary.kind, MediaKind::Video);
        assert_eq!(video.summary.codec, FourCc::new(b"raw "));
        assert_eq!(video.summary.timescale, 24000);
        assert_eq!(video.summary.video.unwrap().width, 2);
        assert_eq!(video.table.samples.len(), 6);
        assert!(video.table.samples[3].is_sync);
        assert!(!video.table.samples[4].is_sync);

        let audio = &movie.tracks[1];
        assert_eq!(audio.summary.number, 2);
        assert_eq!(audio.summary.kind, MediaKind::Audio);
        assert_eq!(audio.summary.audio.unwrap().sample_rate, 48000);
        assert_eq!(audio.table.samples.len(), 4);
        assert_eq!(audio.table.samples[0].duration, 1024);
    }

    #[test]
    fn test_timeline_carries_composition_offsets() {
        let spec = VideoTrackSpec::new(b"raw ", 2, 2, 30000).with_samples(vec![
            FixtureSample::new(vec![0; 12], 1000, true).with_offset(1000),
            FixtureSample::new(vec![0; 12], 1000, false).with_offset(2000),
            FixtureSample::new(vec![0; 12], 1000, false).disposable(),
        ]);
        let file = MovieBuilder::new(600).video(spec).build();
        let movie = parse_moov(&mut Cursor::new(file)).unwrap();
        let timeline = movie.tracks[0].timeline();
        assert_eq!(timeline.samples[1].composition_offset, 2000);
        assert_eq!(timeline.samples[1].decode_index, 2);
        assert!(timeline.samples[2].is_disposable);
        assert_eq!(timeline.cts(&timeline.samples[1]), 3000);
    }

    #[test]
    fn test_edit_list_is_rescaled() {
        let spec = video_spec(10).with_edit(1000, 2002);
        let file = MovieBuilder::new(1000).video(spec).build();
        let movie = parse_moov(&mut Cursor::new(file)).unwrap();
        let edits = &movie.tracks[0].edits;
        assert_eq!(edits.len(), 1);
        // 1000 movie ticks at 1000 Hz = 24000 media ticks.
        assert_eq!(edits[0].segment_duration, 24000);
        assert_eq!(edits[0].media_time, 2002);
        assert_eq!(edits[0].media_rate, 1 << 16);
    }

    #[test]
    fn test_metadata_is_collected() {
        let file = MovieBuilder::new(1000)
            .audio(AudioTrackSpec::pcm(b"sowt", 1, 16, 8000).with_frames(2, 100))
            .custom_text("com.apple.iTunes", "iTunSMPB", "hello")
            .build();
        let movie = parse_moov(&mut Cursor::new(file)).unwrap();
        assert_eq!(movie.metadata.len(), 1);
        assert_eq!(movie.metadata[0].value, MetadataValue::Text("hello".into()));
    }

    #[test]
    fn test_missing_moov_is_error() {
        let file = crate::fixtures::boxes::write_box(b"free", &[0; 4]);
        assert!(parse_moov(&mut Cursor::new(file)).is_err());
    }
}
