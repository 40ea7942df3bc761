//! Parse MP4 sample table atoms (stts, ctts, cslg, stss, sdtp, stsz, stsc,
//! stco, co64) and resolve them into a flat list of samples with absolute
//! file offsets.

use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom};

use super::atoms::{
    children_of, enter, find, invalid, read_entry_count, read_fullbox_header, read_i32, read_i64,
    read_u32, read_u64, read_u8, BoxHeader,
};

/// A fully resolved sample with absolute file position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSample {
    /// 1-based decode-order number.
    pub number: u32,
    pub file_offset: u64,
    pub size: u32,
    pub duration: u32,
    pub composition_offset: i64,
    pub is_sync: bool,
    pub is_disposable: bool,
    pub decode_timestamp: u64,
}

/// The resolved sample table of one track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSampleTable {
    pub samples: Vec<ResolvedSample>,
    /// Added to every composition time so that none precedes its decode time.
    pub composition_to_decode_shift: u64,
}

struct SttsEntry {
    count: u32,
    delta: u32,
}

struct CttsEntry {
    count: u32,
    offset: i64,
}

struct StscEntry {
    first_chunk: u32,
    samples_per_chunk: u32,
}

fn parse_stts<R: Read>(reader: &mut R, header: &BoxHeader) -> io::Result<Vec<SttsEntry>> {
    read_fullbox_header(reader)?;
    let entry_count = read_entry_count(reader, header, 8)?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let count = read_u32(reader)?;
        let delta = read_u32(reader)?;
        entries.push(SttsEntry { count, delta });
    }
    Ok(entries)
}

fn parse_ctts<R: Read>(reader: &mut R, header: &BoxHeader) -> io::Result<Vec<CttsEntry>> {
    // Offsets are signed in both versions.
    read_fullbox_header(reader)?;
    let entry_count = read_entry_count(reader, header, 8)?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let count = read_u32(reader)?;
        let offset = read_i32(reader)? as i64;
        entries.push(CttsEntry { count, offset });
    }
    Ok(entries)
}

/// Parse cslg and return compositionToDTSShift.
fn parse_cslg<R: Read>(reader: &mut R) -> io::Result<i64> {
    let (version, _flags) = read_fullbox_header(reader)?;
    if version == 0 {
        Ok(read_i32(reader)? as i64)
    } else {
        read_i64(reader)
    }
}

/// Parse stss. Returns the set of 1-based sync sample numbers.
fn parse_stss<R: Read>(reader: &mut R, header: &BoxHeader) -> io::Result<HashSet<u32>> {
    read_fullbox_header(reader)?;
    let entry_count = read_entry_count(reader, header, 4)?;
    let mut syncs = HashSet::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        syncs.insert(read_u32(reader)?);
    }
    Ok(syncs)
}

/// Parse sdtp. Returns one disposable flag per sample: `sample_is_depended_on
/// == 2` means no other sample references it.
fn parse_sdtp<R: Read>(reader: &mut R, header: &BoxHeader, sample_count: usize) -> io::Result<Vec<bool>> {
    read_fullbox_header(reader)?;
    let available = header.content_size().saturating_sub(4) as usize;
    let count = available.min(sample_count);
    let mut flags = Vec::with_capacity(count);
    for _ in 0..count {
        let byte = read_u8(reader)?;
        flags.push((byte >> 2) & 0x3 == 2);
    }
    Ok(flags)
}

/// Parse stsz. Constant-size samples must all fit inside `data_len` bytes.
fn parse_stsz<R: Read>(reader: &mut R, header: &BoxHeader, data_len: u64) -> io::Result<Vec<u32>> {
    read_fullbox_header(reader)?;
    let sample_size = read_u32(reader)?;
    let sample_count = read_u32(reader)?;
    if sample_size != 0 {
        if sample_count as u64 * sample_size as u64 > data_len {
            return Err(invalid(format!(
                "stsz declares {sample_count} samples of {sample_size} bytes in a {data_len} byte file"
            )));
        }
        return Ok(vec![sample_size; sample_count as usize]);
    }
    if sample_count as u64 * 4 > header.content_size().saturating_sub(12) {
        return Err(invalid(format!("stsz declares {sample_count} sizes past its end")));
    }
    let mut sizes = Vec::with_capacity(sample_count as usize);
    for _ in 0..sample_count {
        sizes.push(read_u32(reader)?);
    }
    Ok(sizes)
}

fn parse_stsc<R: Read>(reader: &mut R, header: &BoxHeader) -> io::Result<Vec<StscEntry>> {
    read_fullbox_header(reader)?;
    let entry_count = read_entry_count(reader, header, 12)?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let first_chunk = read_u32(reader)?;
        let samples_per_chunk = read_u32(reader)?;
        let _sample_description_index = read_u32(reader)?;
        if first_chunk == 0 {
            return Err(invalid("stsc first_chunk is 0"));
        }
        entries.push(StscEntry {
            first_chunk,
            samples_per_chunk,
        });
    }
    Ok(entries)
}

/// Parse chunk offsets from stco (32-bit) or co64 (64-bit).
fn parse_chunk_offsets<R: Read>(reader: &mut R, header: &BoxHeader, is_co64: bool) -> io::Result<Vec<u64>> {
    read_fullbox_header(reader)?;
    let entry_count = read_entry_count(reader, header, if is_co64 { 8 } else { 4 })?;
    let mut offsets = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        if is_co64 {
            offsets.push(read_u64(reader)?);
        } else {
            offsets.push(read_u32(reader)? as u64);
        }
    }
    Ok(offsets)
}

fn required<'a>(children: &'a [BoxHeader], box_type: &[u8; 4]) -> io::Result<&'a BoxHeader> {
    find(children, box_type).ok_or_else(|| {
        invalid(format!(
            "missing {} box",
            String::from_utf8_lossy(box_type)
        ))
    })
}

/// Resolve the sample table of a `stbl` box.
pub fn resolve_sample_table<R: Read + Seek>(reader: &mut R, stbl: &BoxHeader) -> io::Result<ResolvedSampleTable> {
    let children = children_of(reader, stbl)?;

    let stts = required(&children, b"stts")?;
    enter(reader, stts)?;
    let stts_entries = parse_stts(reader, stts)?;

    let ctts_entries = match find(&children, b"ctts") {
        Some(ctts) => {
            enter(reader, ctts)?;
            parse_ctts(reader, ctts)?
        }
        None => Vec::new(),
    };

    let cslg_shift = match find(&children, b"cslg") {
        Some(cslg) => {
            enter(reader, cslg)?;
            Some(parse_cslg(reader)?)
        }
        None => None,
    };

    // No stss means every sample is a sync sample.
    let sync_set = match find(&children, b"stss") {
        Some(stss) => {
            enter(reader, stss)?;
            Some(parse_stss(reader, stss)?)
        }
        None => None,
    };

    let data_len = reader.seek(SeekFrom::End(0))?;
    let stsz = required(&children, b"stsz")?;
    enter(reader, stsz)?;
    let sizes = parse_stsz(reader, stsz, data_len)?;
    let sample_count = sizes.len();

    let disposable = match find(&children, b"sdtp") {
        Some(sdtp) => {
            enter(reader, sdtp)?;
            parse_sdtp(reader, sdtp, sample_count)?
        }
        None => Vec::new(),
    };

    let stsc = required(&children, b"stsc")?;
    enter(reader, stsc)?;
    let stsc_entries = parse_stsc(reader, stsc)?;

    let chunk_offsets = if let Some(stco) = find(&children, b"stco") {
        enter(reader, stco)?;
        parse_chunk_offsets(reader, stco, false)?
    } else {
        let co64 = required(&children, b"co64")?;
        enter(reader, co64)?;
        parse_chunk_offsets(reader, co64, true)?
    };

    if sample_count > 0 && stsc_entries.is_empty() {
        return Err(invalid("stsc is empty"));
    }

    // --- Map each sample to its file offset ---
    // stsc runs apply from first_chunk up to the next entry's first_chunk.
    let mut locations = Vec::with_capacity(sample_count);
    let mut entry_idx = 0usize;
    'chunks: for (chunk_idx, &chunk_offset) in chunk_offsets.iter().enumerate() {
        let chunk_number = chunk_idx as u32 + 1;
        while entry_idx + 1 < stsc_entries.len()
            && stsc_entries[entry_idx + 1].first_chunk <= chunk_number
        {
            entry_idx += 1;
        }
        let spc = stsc_entries[entry_idx].samples_per_chunk;
        let mut offset = chunk_offset;
        for _ in 0..spc {
            let Some(&size) = sizes.get(locations.len()) else {
                break 'chunks;
            };
            locations.push((offset, size));
            offset += size as u64;
        }
    }
    if locations.len() < sample_count {
        return Err(invalid(format!(
            "chunk map covers {} of {sample_count} samples",
            locations.len()
        )));
    }

    // --- Decode timestamps and durations ---
    let mut timing = Vec::with_capacity(sample_count);
    let mut dts: u64 = 0;
    let mut last_delta = 0u32;
    for entry in &stts_entries {
        for _ in 0..entry.count {
            if timing.len() == sample_count {
                break;
            }
            timing.push((dts, entry.delta));
            dts += entry.delta as u64;
        }
        last_delta = entry.delta;
    }
    // Samples stts does not cover repeat the last delta.
    while timing.len() < sample_count {
        timing.push((dts, last_delta));
        dts += last_delta as u64;
    }

    // --- Composition offsets ---
    let mut cts_offsets = vec![0i64; sample_count];
    let mut i = 0usize;
    'ctts: for entry in &ctts_entries {
        for _ in 0..entry.count {
            if i >= sample_count {
                break 'ctts;
            }
            cts_offsets[i] = entry.offset;
            i += 1;
        }
    }

    let min_offset = cts_offsets.iter().copied().min().unwrap_or(0);
    let composition_to_decode_shift = match cslg_shift {
        Some(shift) if shift > 0 => shift as u64,
        _ if min_offset < 0 => min_offset.unsigned_abs(),
        _ => 0,
    };

    let samples = locations
        .into_iter()
        .enumerate()
        .map(|(i, (file_offset, size))| {
            let number = i as u32 + 1;
            let (decode_timestamp, duration) = timing[i];
            ResolvedSample {
                number,
                file_offset,
                size,
                duration,
                composition_offset: cts_offsets[i],
                is_sync: sync_set.as_ref().map_or(true, |set| set.contains(&number)),
                is_disposable: disposable.get(i).copied().unwrap_or(false),
                decode_timestamp,
            }
        })
        .collect();

    Ok(ResolvedSampleTable {
        samples,
        composition_to_decode_shift,
    })
}
