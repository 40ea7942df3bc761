//! iTunes-style descriptive metadata: `udta/meta/ilst` items, including the
//! `----` custom items carrying a `mean` namespace and a `name`.

use std::io::{self, Read, Seek};

use bytes::Bytes;
use fsrc_core::{FourCc, MetadataItem, MetadataValue};

use super::atoms::{child_boxes, children_of, enter, find, read_content, read_u32, BoxHeader};

/// `data` type indicator for UTF-8 text.
const DATA_TYPE_UTF8: u32 = 1;

/// Collect the `ilst` items below a `udta` box.
pub fn parse_udta<R: Read + Seek>(reader: &mut R, udta: &BoxHeader) -> io::Result<Vec<MetadataItem>> {
    let children = children_of(reader, udta)?;
    let Some(meta) = find(&children, b"meta") else {
        return Ok(Vec::new());
    };

    // ISO `meta` is a full box; the QuickTime flavour starts straight with
    // its children. A zero first word marks the version/flags header.
    enter(reader, meta)?;
    let first = read_u32(reader)?;
    let start = if first == 0 {
        meta.content_start + 4
    } else {
        meta.content_start
    };
    let meta_children = child_boxes(reader, start, meta.end())?;
    let Some(ilst) = find(&meta_children, b"ilst") else {
        return Ok(Vec::new());
    };
    parse_ilst(reader, ilst)
}

/// Parse every item of an `ilst` box. Items without a `data` child are
/// skipped.
pub fn parse_ilst<R: Read + Seek>(reader: &mut R, ilst: &BoxHeader) -> io::Result<Vec<MetadataItem>> {
    let mut items = Vec::new();
    for item in children_of(reader, ilst)? {
        let parts = children_of(reader, &item)?;
        let meaning = match find(&parts, b"mean") {
            Some(mean) => Some(read_fullbox_string(reader, mean)?),
            None => None,
        };
        let name = match find(&parts, b"name") {
            Some(name) => Some(read_fullbox_string(reader, name)?),
            None => None,
        };
        let Some(data) = find(&parts, b"data") else {
            tracing::trace!("ilst item '{}' has no data box", item.box_type);
            continue;
        };
        let content = read_content(reader, data)?;
        if content.len() < 8 {
            continue;
        }
        let type_indicator =
            u32::from_be_bytes([content[0], content[1], content[2], content[3]]) & 0x00FF_FFFF;
        let payload = &content[8..];
        let value = if type_indicator == DATA_TYPE_UTF8 {
            MetadataValue::Text(String::from_utf8_lossy(payload).into_owned())
        } else {
            MetadataValue::Binary(Bytes::copy_from_slice(payload))
        };
        items.push(MetadataItem {
            key: item.box_type,
            meaning,
            name,
            value,
        });
    }
    Ok(items)
}

fn read_fullbox_string<R: Read + Seek>(reader: &mut R, header: &BoxHeader) -> io::Result<String> {
    let content = read_content(reader, header)?;
    let text = content.get(4..).unwrap_or_default();
    Ok(String::from_utf8_lossy(text).trim_end_matches('\0').to_string())
}

/// Find a custom `----` item by namespace and name.
pub fn find_custom<'a>(items: &'a [MetadataItem], meaning: &str, name: &str) -> Option<&'a MetadataItem> {
    const CUSTOM: FourCc = FourCc::new(b"----");
    items.iter().find(|item| {
        item.key == CUSTOM
            && item.meaning.as_deref() == Some(meaning)
            && item.name.as_deref() == Some(name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::read_box_header;
    use crate::fixtures::boxes;
    use std::io::Cursor;

    fn parse(udta: &[u8]) -> Vec<MetadataItem> {
        let mut cursor = Cursor::new(udta.to_vec());
        let header = read_box_header(&mut cursor, udta.len() as u64).unwrap().unwrap();
        parse_udta(&mut cursor, &header).unwrap()
    }

    #[test]
    fn test_custom_text_item() {
        let udta = boxes::itunes_udta(&[boxes::custom_item(
            "com.apple.iTunes",
            "iTunSMPB",
            1,
            b" 00000000 00000840 00000100",
        )]);
        let items = parse(&udta);
        assert_eq!(items.len(), 1);
        let item = find_custom(&items, "com.apple.iTunes", "iTunSMPB").unwrap();
        assert_eq!(
            item.value,
            MetadataValue::Text(" 00000000 00000840 00000100".into())
        );
        assert!(find_custom(&items, "com.apple.iTunes", "iTunNORM").is_none());
    }

    #[test]
    fn test_binary_item_and_plain_key() {
        let mut data = 0u32.to_be_bytes().to_vec();
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(b"Lavf");
        let tool = boxes::write_container_box(b"\xa9too", &[&boxes::write_box(b"data", &data)]);
        let udta = boxes::itunes_udta(&[
            tool,
            boxes::custom_item("com.example", "blob", 0, &[1, 2, 3]),
        ]);
        let items = parse(&udta);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, FourCc([0xa9, b't', b'o', b'o']));
        assert_eq!(items[0].meaning, None);
        assert_eq!(items[0].value, MetadataValue::Binary(Bytes::from_static(b"Lavf")));
        assert_eq!(items[1].value.as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn test_quicktime_meta_without_fullbox_header() {
        let ilst = boxes::write_container_box(
            b"ilst",
            &[&boxes::custom_item("com.apple.iTunes", "iTunSMPB", 1, b"x")],
        );
        let meta = boxes::write_container_box(b"meta", &[&boxes::write_box(b"hdlr", &[0; 25]), &ilst]);
        let udta = boxes::write_container_box(b"udta", &[&meta]);
        let items = parse(&udta);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_udta_without_meta() {
        let udta = boxes::write_container_box(b"udta", &[&boxes::write_box(b"name", b"clip")]);
        assert!(parse(&udta).is_empty());
    }
}
