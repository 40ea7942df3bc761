//! ISO BMFF box header parsing and navigation.

use std::io::{self, Read, Seek, SeekFrom};

use fsrc_core::FourCc;

/// A parsed box header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub box_type: FourCc,
    /// Total size of the box including the header.
    pub size: u64,
    /// Size of the header itself (8, or 16 for extended-size boxes).
    pub header_size: u64,
    /// Absolute position of the first content byte.
    pub content_start: u64,
}

impl BoxHeader {
    /// Size of the box content (size - header_size).
    pub fn content_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size)
    }

    pub fn end(&self) -> u64 {
        self.content_start + self.content_size()
    }

    pub fn is(&self, box_type: &[u8; 4]) -> bool {
        self.box_type.as_bytes() == box_type
    }
}

/// Read a box header from the current position.
///
/// `limit` is the end of the enclosing container; a size of 0 means the box
/// extends up to it. Returns `Ok(None)` when fewer than 8 bytes remain.
pub fn read_box_header<R: Read + Seek>(reader: &mut R, limit: u64) -> io::Result<Option<BoxHeader>> {
    let start = reader.stream_position()?;
    if start + 8 > limit {
        return Ok(None);
    }
    let mut buf = [0u8; 8];
    match reader.read_exact(&mut buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let size32 = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let box_type = FourCc([buf[4], buf[5], buf[6], buf[7]]);

    let (size, header_size) = match size32 {
        1 => (read_u64(reader)?, 16u64),
        0 => (limit - start, 8u64),
        n => (n as u64, 8u64),
    };
    if size < header_size || start + size > limit {
        return Err(invalid(format!(
            "box '{box_type}' at {start} has size {size} past its container"
        )));
    }

    Ok(Some(BoxHeader {
        box_type,
        size,
        header_size,
        content_start: start + header_size,
    }))
}

/// List the child boxes stored in `[start, end)`.
pub fn child_boxes<R: Read + Seek>(reader: &mut R, start: u64, end: u64) -> io::Result<Vec<BoxHeader>> {
    let mut children = Vec::new();
    let mut pos = start;
    while pos < end {
        reader.seek(SeekFrom::Start(pos))?;
        let Some(header) = read_box_header(reader, end)? else {
            break;
        };
        pos = header.content_start + header.content_size();
        children.push(header);
    }
    Ok(children)
}

/// Children of a container box.
pub fn children_of<R: Read + Seek>(reader: &mut R, parent: &BoxHeader) -> io::Result<Vec<BoxHeader>> {
    child_boxes(reader, parent.content_start, parent.end())
}

/// First box of the given type in a header list.
pub fn find<'a>(boxes: &'a [BoxHeader], box_type: &[u8; 4]) -> Option<&'a BoxHeader> {
    boxes.iter().find(|b| b.is(box_type))
}

/// Position the reader at the start of a box's content.
pub fn enter<R: Seek>(reader: &mut R, header: &BoxHeader) -> io::Result<()> {
    reader.seek(SeekFrom::Start(header.content_start))?;
    Ok(())
}

/// Read the whole content of a box.
pub fn read_content<R: Read + Seek>(reader: &mut R, header: &BoxHeader) -> io::Result<Vec<u8>> {
    enter(reader, header)?;
    read_bytes(reader, header.content_size() as usize)
}

macro_rules! be_readers {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Read a big-endian `", stringify!($ty), "`.")]
            pub fn $name<R: Read>(reader: &mut R) -> io::Result<$ty> {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                reader.read_exact(&mut buf)?;
                Ok(<$ty>::from_be_bytes(buf))
            }
        )*
    };
}

be_readers! {
    read_u8 => u8,
    read_u16 => u16,
    read_i16 => i16,
    read_u32 => u32,
    read_i32 => i32,
    read_u64 => u64,
    read_i64 => i64,
}

/// 64-bit float sample rate of version 2 sound descriptions.
pub fn read_f64<R: Read>(reader: &mut R) -> io::Result<f64> {
    Ok(f64::from_bits(read_u64(reader)?))
}

fn read_bytes<R: Read>(reader: &mut R, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn skip<R: Seek>(reader: &mut R, n: i64) -> io::Result<()> {
    reader.seek(SeekFrom::Current(n))?;
    Ok(())
}

/// `(version, flags)` of a full box.
pub fn read_fullbox_header<R: Read>(reader: &mut R) -> io::Result<(u8, u32)> {
    let word = read_u32(reader)?;
    Ok(((word >> 24) as u8, word & 0x00ff_ffff))
}

/// Entry count of a table box, checked against the bytes actually left so a
/// corrupt count cannot trigger a huge allocation.
pub fn read_entry_count<R: Read>(reader: &mut R, header: &BoxHeader, entry_size: u64) -> io::Result<u32> {
    let count = read_u32(reader)?;
    let available = header.content_size().saturating_sub(8);
    if entry_size > 0 && count as u64 * entry_size > available {
        return Err(invalid(format!(
            "'{}' declares {count} entries but holds {available} bytes",
            header.box_type
        )));
    }
    Ok(count)
}

pub fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}
