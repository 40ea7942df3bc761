//! ISO BMFF box serialization primitives used to assemble fixture files.
//!
//! Each box follows the standard layout: 4-byte size (big-endian u32),
//! 4-byte type (ASCII), then box-specific content.

// ---------------------------------------------------------------------------
// Low-level box writing helpers
// ---------------------------------------------------------------------------

/// Write a complete box: size (u32 BE) + type (4 ASCII bytes) + content.
pub fn write_box(box_type: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let size = (8 + content.len()) as u32;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(content);
    out
}

/// Write a container box (size + type + children concatenated).
pub fn write_container_box(box_type: &[u8; 4], children: &[&[u8]]) -> Vec<u8> {
    let content: Vec<u8> = children.concat();
    write_box(box_type, &content)
}

/// Version + flags word of a full box.
pub fn fullbox_header(version: u8, flags: u32) -> [u8; 4] {
    let val = ((version as u32) << 24) | (flags & 0x00FF_FFFF);
    val.to_be_bytes()
}

/// A full box whose content is a sequence of big-endian words.
pub fn table_box(box_type: &[u8; 4], version: u8, words: &[u32]) -> Vec<u8> {
    let mut content = fullbox_header(version, 0).to_vec();
    for w in words {
        content.extend_from_slice(&w.to_be_bytes());
    }
    write_box(box_type, &content)
}

// ---------------------------------------------------------------------------
// Movie and track headers
// ---------------------------------------------------------------------------

pub fn ftyp() -> Vec<u8> {
    let mut content = Vec::with_capacity(16);
    content.extend_from_slice(b"qt  ");
    content.extend_from_slice(&0x200u32.to_be_bytes());
    content.extend_from_slice(b"qt  ");
    content.extend_from_slice(b"isom");
    write_box(b"ftyp", &content)
}

fn identity_matrix() -> [u8; 36] {
    let mut m = [0u8; 36];
    m[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    m[16..20].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    m[32..36].copy_from_slice(&0x4000_0000u32.to_be_bytes());
    m
}

/// mvhd, version 0.
pub fn mvhd(timescale: u32, duration: u32, next_track_id: u32) -> Vec<u8> {
    let mut content = Vec::with_capacity(100);
    content.extend_from_slice(&fullbox_header(0, 0));
    content.extend_from_slice(&[0u8; 8]); // creation + modification
    content.extend_from_slice(&timescale.to_be_bytes());
    content.extend_from_slice(&duration.to_be_bytes());
    content.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate 1.0
    content.extend_from_slice(&0x0100u16.to_be_bytes()); // volume 1.0
    content.extend_from_slice(&[0u8; 10]);
    content.extend_from_slice(&identity_matrix());
    content.extend_from_slice(&[0u8; 24]); // pre_defined
    content.extend_from_slice(&next_track_id.to_be_bytes());
    write_box(b"mvhd", &content)
}

/// tkhd, version 1 (64-bit times), enabled + in_movie.
pub fn tkhd(track_id: u32, duration: u64, width: u32, height: u32, is_audio: bool) -> Vec<u8> {
    let mut content = Vec::with_capacity(96);
    content.extend_from_slice(&fullbox_header(1, 3));
    content.extend_from_slice(&[0u8; 16]); // creation + modification
    content.extend_from_slice(&track_id.to_be_bytes());
    content.extend_from_slice(&0u32.to_be_bytes());
    content.extend_from_slice(&duration.to_be_bytes());
    content.extend_from_slice(&[0u8; 8]);
    content.extend_from_slice(&0u16.to_be_bytes()); // layer
    content.extend_from_slice(&0u16.to_be_bytes()); // alternate_group
    let volume: u16 = if is_audio { 0x0100 } else { 0 };
    content.extend_from_slice(&volume.to_be_bytes());
    content.extend_from_slice(&0u16.to_be_bytes());
    content.extend_from_slice(&identity_matrix());
    content.extend_from_slice(&(width << 16).to_be_bytes());
    content.extend_from_slice(&(height << 16).to_be_bytes());
    write_box(b"tkhd", &content)
}

/// mdhd, version 1.
pub fn mdhd(timescale: u32, duration: u64) -> Vec<u8> {
    let mut content = Vec::with_capacity(36);
    content.extend_from_slice(&fullbox_header(1, 0));
    content.extend_from_slice(&[0u8; 16]);
    content.extend_from_slice(&timescale.to_be_bytes());
    content.extend_from_slice(&duration.to_be_bytes());
    content.extend_from_slice(&0x55C4u16.to_be_bytes()); // language "und"
    content.extend_from_slice(&0u16.to_be_bytes());
    write_box(b"mdhd", &content)
}

pub fn hdlr(handler_type: &[u8; 4]) -> Vec<u8> {
    let mut content = Vec::with_capacity(25);
    content.extend_from_slice(&fullbox_header(0, 0));
    content.extend_from_slice(&0u32.to_be_bytes());
    content.extend_from_slice(handler_type);
    content.extend_from_slice(&[0u8; 12]);
    content.push(0); // empty name
    write_box(b"hdlr", &content)
}

/// edts > elst, version 0. Entries are (segment_duration, media_time).
pub fn edts(edits: &[(u32, i32)]) -> Vec<u8> {
    let mut content = fullbox_header(0, 0).to_vec();
    content.extend_from_slice(&(edits.len() as u32).to_be_bytes());
    for &(segment_duration, media_time) in edits {
        content.extend_from_slice(&segment_duration.to_be_bytes());
        content.extend_from_slice(&media_time.to_be_bytes());
        content.extend_from_slice(&1u16.to_be_bytes()); // rate integer
        content.extend_from_slice(&0u16.to_be_bytes()); // rate fraction
    }
    write_container_box(b"edts", &[&write_box(b"elst", &content)])
}

pub fn dinf() -> Vec<u8> {
    let url = write_box(b"url ", &fullbox_header(0, 1));
    let mut dref = fullbox_header(0, 0).to_vec();
    dref.extend_from_slice(&1u32.to_be_bytes());
    dref.extend_from_slice(&url);
    write_container_box(b"dinf", &[&write_box(b"dref", &dref)])
}

pub fn vmhd() -> Vec<u8> {
    let mut content = fullbox_header(0, 1).to_vec();
    content.extend_from_slice(&[0u8; 8]);
    write_box(b"vmhd", &content)
}

pub fn smhd() -> Vec<u8> {
    let mut content = fullbox_header(0, 0).to_vec();
    content.extend_from_slice(&[0u8; 4]);
    write_box(b"smhd", &content)
}

// ---------------------------------------------------------------------------
// Sample entries
// ---------------------------------------------------------------------------

/// A VisualSampleEntry box followed by `children`.
pub fn visual_sample_entry(
    fourcc: &[u8; 4],
    width: u16,
    height: u16,
    depth: u16,
    children: &[Vec<u8>],
) -> Vec<u8> {
    let mut entry = Vec::with_capacity(78);
    entry.extend_from_slice(&[0u8; 6]);
    entry.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
    entry.extend_from_slice(&[0u8; 16]);
    entry.extend_from_slice(&width.to_be_bytes());
    entry.extend_from_slice(&height.to_be_bytes());
    entry.extend_from_slice(&0x0048_0000u32.to_be_bytes());
    entry.extend_from_slice(&0x0048_0000u32.to_be_bytes());
    entry.extend_from_slice(&0u32.to_be_bytes());
    entry.extend_from_slice(&1u16.to_be_bytes()); // frame_count
    entry.extend_from_slice(&[0u8; 32]); // compressorname
    entry.extend_from_slice(&depth.to_be_bytes());
    entry.extend_from_slice(&(-1i16).to_be_bytes());
    for child in children {
        entry.extend_from_slice(child);
    }
    write_box(fourcc, &entry)
}

/// An AudioSampleEntry (sound description version 0) followed by `children`.
pub fn audio_sample_entry(
    fourcc: &[u8; 4],
    channels: u16,
    bits_per_sample: u16,
    sample_rate: u32,
    children: &[Vec<u8>],
) -> Vec<u8> {
    let mut entry = Vec::with_capacity(28);
    entry.extend_from_slice(&[0u8; 6]);
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 8]); // version, revision, vendor
    entry.extend_from_slice(&channels.to_be_bytes());
    entry.extend_from_slice(&bits_per_sample.to_be_bytes());
    entry.extend_from_slice(&[0u8; 4]); // compression_id + packet_size
    entry.extend_from_slice(&(sample_rate << 16).to_be_bytes());
    for child in children {
        entry.extend_from_slice(child);
    }
    write_box(fourcc, &entry)
}

pub fn pasp(h_spacing: u32, v_spacing: u32) -> Vec<u8> {
    let mut content = h_spacing.to_be_bytes().to_vec();
    content.extend_from_slice(&v_spacing.to_be_bytes());
    write_box(b"pasp", &content)
}

pub fn stsd(entry: &[u8]) -> Vec<u8> {
    let mut content = fullbox_header(0, 0).to_vec();
    content.extend_from_slice(&1u32.to_be_bytes());
    content.extend_from_slice(entry);
    write_box(b"stsd", &content)
}

// ---------------------------------------------------------------------------
// iTunes metadata
// ---------------------------------------------------------------------------

/// A `----` custom item with `mean`, `name` and one `data` box.
pub fn custom_item(meaning: &str, name: &str, data_type: u32, payload: &[u8]) -> Vec<u8> {
    let mut mean = fullbox_header(0, 0).to_vec();
    mean.extend_from_slice(meaning.as_bytes());
    let mut name_box = fullbox_header(0, 0).to_vec();
    name_box.extend_from_slice(name.as_bytes());
    let mut data = data_type.to_be_bytes().to_vec();
    data.extend_from_slice(&0u32.to_be_bytes()); // locale
    data.extend_from_slice(payload);
    write_container_box(
        b"----",
        &[
            &write_box(b"mean", &mean),
            &write_box(b"name", &name_box),
            &write_box(b"data", &data),
        ],
    )
}

/// udta > meta (full box) > hdlr + ilst holding `items`.
pub fn itunes_udta(items: &[Vec<u8>]) -> Vec<u8> {
    let refs: Vec<&[u8]> = items.iter().map(|i| i.as_slice()).collect();
    let ilst = write_container_box(b"ilst", &refs);
    let mut meta = fullbox_header(0, 0).to_vec();
    meta.extend_from_slice(&hdlr(b"mdir"));
    meta.extend_from_slice(&ilst);
    write_container_box(b"udta", &[&write_box(b"meta", &meta)])
}
