//! In-memory MP4 builders for tests.
//!
//! [`MovieBuilder`] lays a file out as `ftyp`, `mdat`, `moov`, with one chunk
//! per sample, and writes whichever of ctts/stss/sdtp/edts/udta the track
//! specs call for.

pub mod boxes;

use boxes::{table_box, write_box, write_container_box};

/// One sample of a fixture track.
#[derive(Debug, Clone)]
pub struct FixtureSample {
    pub data: Vec<u8>,
    pub duration: u32,
    pub composition_offset: i32,
    pub keyframe: bool,
    pub disposable: bool,
}

impl FixtureSample {
    pub fn new(data: Vec<u8>, duration: u32, keyframe: bool) -> Self {
        Self {
            data,
            duration,
            composition_offset: 0,
            keyframe,
            disposable: false,
        }
    }

    pub fn with_offset(mut self, composition_offset: i32) -> Self {
        self.composition_offset = composition_offset;
        self
    }

    pub fn disposable(mut self) -> Self {
        self.disposable = true;
        self
    }
}

/// Sample table and header data shared by video and audio specs.
#[derive(Debug, Clone)]
struct TrackBody {
    timescale: u32,
    samples: Vec<FixtureSample>,
    /// (segment_duration in movie ticks, media_time)
    edits: Vec<(u32, i32)>,
    udta: Vec<Vec<u8>>,
}

impl TrackBody {
    fn new(timescale: u32) -> Self {
        Self {
            timescale,
            samples: Vec::new(),
            edits: Vec::new(),
            udta: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoTrackSpec {
    fourcc: [u8; 4],
    width: u16,
    height: u16,
    depth: u16,
    extra_boxes: Vec<Vec<u8>>,
    body: TrackBody,
}

impl VideoTrackSpec {
    pub fn new(fourcc: &[u8; 4], width: u16, height: u16, timescale: u32) -> Self {
        Self {
            fourcc: *fourcc,
            width,
            height,
            depth: 24,
            extra_boxes: Vec::new(),
            body: TrackBody::new(timescale),
        }
    }

    pub fn with_samples(mut self, samples: impl IntoIterator<Item = FixtureSample>) -> Self {
        self.body.samples.extend(samples);
        self
    }

    /// Add an edit; `segment_duration` is in movie timescale ticks.
    pub fn with_edit(mut self, segment_duration: u32, media_time: i32) -> Self {
        self.body.edits.push((segment_duration, media_time));
        self
    }

    /// Append a box (avcC, pasp, ...) inside the sample entry.
    pub fn with_entry_box(mut self, entry_box: Vec<u8>) -> Self {
        self.extra_boxes.push(entry_box);
        self
    }
}

#[derive(Debug, Clone)]
pub struct AudioTrackSpec {
    fourcc: [u8; 4],
    channels: u16,
    bits_per_sample: u16,
    sample_rate: u32,
    extra_boxes: Vec<Vec<u8>>,
    body: TrackBody,
}

impl AudioTrackSpec {
    /// An uncompressed audio track timed in sample-rate ticks.
    pub fn pcm(fourcc: &[u8; 4], channels: u16, bits_per_sample: u16, sample_rate: u32) -> Self {
        Self {
            fourcc: *fourcc,
            channels,
            bits_per_sample,
            sample_rate,
            extra_boxes: Vec::new(),
            body: TrackBody::new(sample_rate),
        }
    }

    /// Append `count` samples of `frames` PCM frames each, filled with
    /// [`pcm_value`] encoded the way the fourcc dictates.
    pub fn with_frames(mut self, count: usize, frames: u32) -> Self {
        let mut next_frame = self
            .body
            .samples
            .iter()
            .map(|s| s.duration as u64)
            .sum::<u64>();
        for _ in 0..count {
            let mut data = Vec::new();
            for f in 0..frames as u64 {
                for c in 0..self.channels {
                    encode_pcm(&self.fourcc, pcm_value(next_frame + f, c), &mut data);
                }
            }
            self.body.samples.push(FixtureSample::new(data, frames, true));
            next_frame += frames as u64;
        }
        self
    }

    pub fn with_samples(mut self, samples: impl IntoIterator<Item = FixtureSample>) -> Self {
        self.body.samples.extend(samples);
        self
    }

    pub fn with_edit(mut self, segment_duration: u32, media_time: i32) -> Self {
        self.body.edits.push((segment_duration, media_time));
        self
    }

    pub fn with_entry_box(mut self, entry_box: Vec<u8>) -> Self {
        self.extra_boxes.push(entry_box);
        self
    }

    /// Attach an iTunes custom text item to this track's `udta`.
    pub fn with_custom_text(mut self, meaning: &str, name: &str, text: &str) -> Self {
        self.body
            .udta
            .push(boxes::custom_item(meaning, name, 1, text.as_bytes()));
        self
    }
}

/// Deterministic test signal: distinct for every (frame, channel) pair while
/// frames stay below 15000.
pub fn pcm_value(frame: u64, channel: u16) -> i16 {
    ((frame * 2 + channel as u64) % 30000) as i16
}

fn encode_pcm(fourcc: &[u8; 4], value: i16, out: &mut Vec<u8>) {
    match fourcc {
        b"twos" => out.extend_from_slice(&value.to_be_bytes()),
        b"in24" => out.extend_from_slice(&((value as i32) << 8).to_be_bytes()[1..]),
        b"in32" => out.extend_from_slice(&((value as i32) << 16).to_be_bytes()),
        b"fl32" => out.extend_from_slice(&(value as f32 / 32768.0).to_be_bytes()),
        _ => out.extend_from_slice(&value.to_le_bytes()),
    }
}

#[derive(Debug, Clone)]
enum TrackSpec {
    Video(VideoTrackSpec),
    Audio(AudioTrackSpec),
}

/// Assembles a complete MP4 file in memory.
#[derive(Debug, Clone)]
pub struct MovieBuilder {
    timescale: u32,
    tracks: Vec<TrackSpec>,
    items: Vec<Vec<u8>>,
    extra_tracks: Vec<Vec<u8>>,
}

impl MovieBuilder {
    pub fn new(timescale: u32) -> Self {
        Self {
            timescale,
            tracks: Vec::new(),
            items: Vec::new(),
            extra_tracks: Vec::new(),
        }
    }

    pub fn video(mut self, spec: VideoTrackSpec) -> Self {
        self.tracks.push(TrackSpec::Video(spec));
        self
    }

    pub fn audio(mut self, spec: AudioTrackSpec) -> Self {
        self.tracks.push(TrackSpec::Audio(spec));
        self
    }

    /// Append a text track with no samples (for track-type checks). Text
    /// tracks are emitted after all video and audio tracks.
    pub fn text_track(mut self) -> Self {
        let id = 100 + self.extra_tracks.len() as u32;
        let stbl = empty_stbl();
        let minf = write_container_box(b"minf", &[&boxes::dinf(), &stbl]);
        let mdia = write_container_box(
            b"mdia",
            &[&boxes::mdhd(1000, 0), &boxes::hdlr(b"text"), &minf],
        );
        let trak = write_container_box(b"trak", &[&boxes::tkhd(id, 0, 0, 0, false), &mdia]);
        self.extra_tracks.push(trak);
        self
    }

    /// Add a movie-level iTunes custom text item.
    pub fn custom_text(mut self, meaning: &str, name: &str, text: &str) -> Self {
        self.items
            .push(boxes::custom_item(meaning, name, 1, text.as_bytes()));
        self
    }

    /// Add a movie-level iTunes custom item with a binary payload.
    pub fn custom_binary(mut self, meaning: &str, name: &str, payload: &[u8]) -> Self {
        self.items.push(boxes::custom_item(meaning, name, 0, payload));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let ftyp = boxes::ftyp();

        // mdat first so chunk offsets are known before moov is written.
        let mut mdat_content = Vec::new();
        let data_start = ftyp.len() as u64 + 8;
        let mut offsets: Vec<Vec<u64>> = Vec::new();
        for track in &self.tracks {
            let body = match track {
                TrackSpec::Video(v) => &v.body,
                TrackSpec::Audio(a) => &a.body,
            };
            let mut track_offsets = Vec::with_capacity(body.samples.len());
            for sample in &body.samples {
                track_offsets.push(data_start + mdat_content.len() as u64);
                mdat_content.extend_from_slice(&sample.data);
            }
            offsets.push(track_offsets);
        }
        let mdat = write_box(b"mdat", &mdat_content);

        let mut traks = Vec::new();
        let mut movie_duration = 0u64;
        for (i, track) in self.tracks.iter().enumerate() {
            let track_id = i as u32 + 1;
            let (trak, duration) = self.write_trak(track, track_id, &offsets[i]);
            movie_duration = movie_duration.max(duration);
            traks.push(trak);
        }
        traks.extend(self.extra_tracks.iter().cloned());

        let mvhd = boxes::mvhd(
            self.timescale,
            movie_duration as u32,
            self.tracks.len() as u32 + 1,
        );
        let mut moov_children: Vec<&[u8]> = vec![&mvhd];
        moov_children.extend(traks.iter().map(|t| t.as_slice()));
        let udta = (!self.items.is_empty()).then(|| boxes::itunes_udta(&self.items));
        if let Some(udta) = &udta {
            moov_children.push(udta);
        }
        let moov = write_container_box(b"moov", &moov_children);

        [ftyp, mdat, moov].concat()
    }

    /// Returns the trak box and the track duration in movie ticks.
    fn write_trak(&self, track: &TrackSpec, track_id: u32, offsets: &[u64]) -> (Vec<u8>, u64) {
        let (body, entry, handler, media_header, dims, is_audio) = match track {
            TrackSpec::Video(v) => (
                &v.body,
                boxes::visual_sample_entry(&v.fourcc, v.width, v.height, v.depth, &v.extra_boxes),
                b"vide",
                boxes::vmhd(),
                (v.width as u32, v.height as u32),
                false,
            ),
            TrackSpec::Audio(a) => (
                &a.body,
                boxes::audio_sample_entry(
                    &a.fourcc,
                    a.channels,
                    a.bits_per_sample,
                    a.sample_rate,
                    &a.extra_boxes,
                ),
                b"soun",
                boxes::smhd(),
                (0, 0),
                true,
            ),
        };

        let media_duration: u64 = body.samples.iter().map(|s| s.duration as u64).sum();
        let movie_duration = if body.timescale == 0 {
            0
        } else {
            media_duration * self.timescale as u64 / body.timescale as u64
        };

        let stbl = sample_table(body, &entry, offsets);
        let minf = write_container_box(b"minf", &[&media_header, &boxes::dinf(), &stbl]);
        let mdia = write_container_box(
            b"mdia",
            &[&boxes::mdhd(body.timescale, media_duration), &boxes::hdlr(handler), &minf],
        );
        let tkhd = boxes::tkhd(track_id, movie_duration, dims.0, dims.1, is_audio);

        let mut children: Vec<Vec<u8>> = vec![tkhd];
        if !body.edits.is_empty() {
            children.push(boxes::edts(&body.edits));
        }
        children.push(mdia);
        if !body.udta.is_empty() {
            children.push(boxes::itunes_udta(&body.udta));
        }
        let refs: Vec<&[u8]> = children.iter().map(|c| c.as_slice()).collect();
        (write_container_box(b"trak", &refs), movie_duration)
    }
}

fn empty_stbl() -> Vec<u8> {
    write_container_box(
        b"stbl",
        &[
            &table_box(b"stsd", 0, &[0]),
            &table_box(b"stts", 0, &[0]),
            &table_box(b"stsz", 0, &[0, 0]),
            &table_box(b"stsc", 0, &[0]),
            &table_box(b"stco", 0, &[0]),
        ],
    )
}

fn sample_table(body: &TrackBody, entry: &[u8], offsets: &[u64]) -> Vec<u8> {
    let samples = &body.samples;

    // stts, run-length encoded.
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for s in samples {
        match runs.last_mut() {
            Some((count, delta)) if *delta == s.duration => *count += 1,
            _ => runs.push((1, s.duration)),
        }
    }
    let mut stts = vec![runs.len() as u32];
    for (count, delta) in &runs {
        stts.extend_from_slice(&[*count, *delta]);
    }

    let mut children = vec![boxes::stsd(entry), table_box(b"stts", 0, &stts)];

    if samples.iter().any(|s| s.composition_offset != 0) {
        let mut ctts = vec![samples.len() as u32];
        for s in samples {
            ctts.extend_from_slice(&[1, s.composition_offset as u32]);
        }
        let version = u8::from(samples.iter().any(|s| s.composition_offset < 0));
        children.push(table_box(b"ctts", version, &ctts));
    }

    if samples.iter().any(|s| !s.keyframe) {
        let syncs: Vec<u32> = samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.keyframe)
            .map(|(i, _)| i as u32 + 1)
            .collect();
        let mut stss = vec![syncs.len() as u32];
        stss.extend_from_slice(&syncs);
        children.push(table_box(b"stss", 0, &stss));
    }

    if samples.iter().any(|s| s.disposable) {
        let mut sdtp = boxes::fullbox_header(0, 0).to_vec();
        for s in samples {
            let depends_on: u8 = if s.keyframe { 0x20 } else { 0x10 };
            let depended_on: u8 = if s.disposable { 0x08 } else { 0x04 };
            sdtp.push(depends_on | depended_on);
        }
        children.push(write_box(b"sdtp", &sdtp));
    }

    let mut stsz = vec![0, samples.len() as u32];
    stsz.extend(samples.iter().map(|s| s.data.len() as u32));
    children.push(table_box(b"stsz", 0, &stsz));
    children.push(table_box(b"stsc", 0, &[1, 1, 1, 1]));

    let mut stco = vec![offsets.len() as u32];
    stco.extend(offsets.iter().map(|&o| o as u32));
    children.push(table_box(b"stco", 0, &stco));

    let refs: Vec<&[u8]> = children.iter().map(|c| c.as_slice()).collect();
    write_container_box(b"stbl", &refs)
}
