//! Decode the first sample description of an `stsd` box: codec fourcc,
//! picture or sound parameters, and the codec configuration record
//! (avcC / hvcC / av1C, esds, alac).

use std::io::{self, Read, Seek};

use fsrc_core::{AudioParams, FourCc, MediaKind, Rational, VideoParams};

use super::atoms::{
    child_boxes, enter, find, read_box_header, read_content, read_f64, read_fullbox_header,
    read_u16, read_u32, skip, BoxHeader,
};

/// Size of the fixed VisualSampleEntry fields before its child boxes.
const VISUAL_ENTRY_FIELDS: u64 = 78;
/// Size of the fixed AudioSampleEntry fields (sound description v0).
const AUDIO_ENTRY_FIELDS_V0: u64 = 28;
const AUDIO_ENTRY_FIELDS_V1: u64 = 44;
const AUDIO_ENTRY_FIELDS_V2: u64 = 64;

/// The decoded first entry of an `stsd` box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleEntry {
    pub fourcc: FourCc,
    pub video: Option<VideoParams>,
    pub audio: Option<AudioParams>,
    pub codec_private: Vec<u8>,
    pub object_type: Option<u8>,
}

/// Parse the first sample entry of `stsd`. Returns `None` for an empty box.
pub fn parse_stsd<R: Read + Seek>(
    reader: &mut R,
    stsd: &BoxHeader,
    kind: MediaKind,
) -> io::Result<Option<SampleEntry>> {
    enter(reader, stsd)?;
    read_fullbox_header(reader)?;
    let entry_count = read_u32(reader)?;
    if entry_count == 0 {
        return Ok(None);
    }
    let Some(entry) = read_box_header(reader, stsd.end())? else {
        return Ok(None);
    };

    let parsed = match kind {
        MediaKind::Video => parse_visual_entry(reader, &entry)?,
        MediaKind::Audio => parse_audio_entry(reader, &entry)?,
        MediaKind::Other => SampleEntry {
            fourcc: entry.box_type,
            video: None,
            audio: None,
            codec_private: Vec::new(),
            object_type: None,
        },
    };
    Ok(Some(parsed))
}

fn parse_visual_entry<R: Read + Seek>(reader: &mut R, entry: &BoxHeader) -> io::Result<SampleEntry> {
    let mut sample_entry = SampleEntry {
        fourcc: entry.box_type,
        video: None,
        audio: None,
        codec_private: Vec::new(),
        object_type: None,
    };
    if entry.content_size() < VISUAL_ENTRY_FIELDS {
        return Ok(sample_entry);
    }

    enter(reader, entry)?;
    // reserved(6) + data_reference_index(2) + pre_defined/reserved(16)
    skip(reader, 24)?;
    let width = read_u16(reader)? as u32;
    let height = read_u16(reader)? as u32;
    // resolution(8) + reserved(4) + frame_count(2) + compressorname(32)
    skip(reader, 46)?;
    let depth = read_u16(reader)?;

    let children = child_boxes(
        reader,
        entry.content_start + VISUAL_ENTRY_FIELDS,
        entry.end(),
    )?;
    for config in [b"avcC", b"hvcC", b"av1C"] {
        if let Some(header) = find(&children, config) {
            sample_entry.codec_private = read_content(reader, header)?;
            break;
        }
    }
    let mut pixel_aspect = Rational::new(0, 1);
    if let Some(pasp) = find(&children, b"pasp") {
        enter(reader, pasp)?;
        let h_spacing = read_u32(reader)? as u64;
        let v_spacing = read_u32(reader)? as u64;
        if h_spacing > 0 && v_spacing > 0 {
            pixel_aspect = Rational::new(h_spacing, v_spacing).reduced();
        }
    }

    sample_entry.video = Some(VideoParams {
        width,
        height,
        depth,
        pixel_aspect,
    });
    Ok(sample_entry)
}

fn parse_audio_entry<R: Read + Seek>(reader: &mut R, entry: &BoxHeader) -> io::Result<SampleEntry> {
    let mut sample_entry = SampleEntry {
        fourcc: entry.box_type,
        video: None,
        audio: None,
        codec_private: Vec::new(),
        object_type: None,
    };
    if entry.content_size() < AUDIO_ENTRY_FIELDS_V0 {
        return Ok(sample_entry);
    }

    enter(reader, entry)?;
    // reserved(6) + data_reference_index(2)
    skip(reader, 8)?;
    let version = read_u16(reader)?;
    // revision(2) + vendor(4)
    skip(reader, 6)?;
    let mut channels = read_u16(reader)?;
    let mut bits_per_sample = read_u16(reader)?;
    // compression_id(2) + packet_size(2)
    skip(reader, 4)?;
    let mut sample_rate = read_u32(reader)? >> 16;

    let fields = match version {
        1 => AUDIO_ENTRY_FIELDS_V1,
        2 => {
            // sizeOfStructOnly(4)
            skip(reader, 4)?;
            sample_rate = read_f64(reader)?.round() as u32;
            channels = read_u32(reader)? as u16;
            // always7F000000(4)
            skip(reader, 4)?;
            bits_per_sample = read_u32(reader)? as u16;
            AUDIO_ENTRY_FIELDS_V2
        }
        _ => AUDIO_ENTRY_FIELDS_V0,
    };

    if entry.content_size() >= fields {
        let children = child_boxes(reader, entry.content_start + fields, entry.end())?;
        read_audio_config(reader, &children, &mut sample_entry)?;
        // QuickTime nests the configuration inside a `wave` atom.
        if sample_entry.codec_private.is_empty() {
            if let Some(wave) = find(&children, b"wave") {
                let nested = child_boxes(reader, wave.content_start, wave.end())?;
                read_audio_config(reader, &nested, &mut sample_entry)?;
            }
        }
    }

    sample_entry.audio = Some(AudioParams {
        channels,
        sample_rate,
        bits_per_sample,
    });
    Ok(sample_entry)
}

fn read_audio_config<R: Read + Seek>(
    reader: &mut R,
    children: &[BoxHeader],
    sample_entry: &mut SampleEntry,
) -> io::Result<()> {
    if let Some(esds) = find(children, b"esds") {
        let content = read_content(reader, esds)?;
        if let Some((object_type, dsi)) = content.get(4..).and_then(parse_es_descriptor) {
            sample_entry.object_type = Some(object_type);
            sample_entry.codec_private = dsi;
        }
    } else if let Some(alac) = find(children, b"alac") {
        let content = read_content(reader, alac)?;
        // Skip the fullbox version/flags.
        sample_entry.codec_private = content.get(4..).unwrap_or_default().to_vec();
    }
    Ok(())
}

/// Read an expandable descriptor header: tag and variable-length size.
fn read_descriptor(data: &[u8], pos: &mut usize) -> Option<(u8, usize)> {
    let tag = *data.get(*pos)?;
    *pos += 1;
    let mut len = 0usize;
    for _ in 0..4 {
        let byte = *data.get(*pos)?;
        *pos += 1;
        len = (len << 7) | (byte & 0x7F) as usize;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Some((tag, len))
}

/// Walk an ES_Descriptor and return (objectTypeIndication,
/// DecoderSpecificInfo).
pub fn parse_es_descriptor(data: &[u8]) -> Option<(u8, Vec<u8>)> {
    let mut pos = 0usize;
    let (tag, _) = read_descriptor(data, &mut pos)?;
    if tag != 0x03 {
        return None;
    }
    // ES_ID
    pos += 2;
    let flags = *data.get(pos)?;
    pos += 1;
    if flags & 0x80 != 0 {
        pos += 2;
    }
    if flags & 0x40 != 0 {
        let url_len = *data.get(pos)? as usize;
        pos += 1 + url_len;
    }
    if flags & 0x20 != 0 {
        pos += 2;
    }

    let (tag, _) = read_descriptor(data, &mut pos)?;
    if tag != 0x04 {
        return None;
    }
    let object_type = *data.get(pos)?;
    // objectType(1) + streamType(1) + bufferSizeDB(3) + maxBitrate(4) + avgBitrate(4)
    pos += 13;

    let mut dsi = Vec::new();
    if let Some((0x05, len)) = read_descriptor(data, &mut pos) {
        dsi = data.get(pos..pos + len)?.to_vec();
    }
    Some((object_type, dsi))
}
