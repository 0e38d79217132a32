//! The metadata type-length-value record set carried in a GPF frame's
//! dedicated metadata bar region.
//!
//! Wire format: `type: u16 BE`, `size: u16 BE`, `payload: [u8; size]`,
//! repeated for each item, terminated by a synthetic `EndOfData` item
//! `(0, 0)`. See ISO/IEC-style framing in `jp2`'s box container for the
//! sibling TLV pattern this crate follows.

#![allow(dead_code)]

use gpf_primitives::{betoh16, betoh32, betoh64, htobe16, htobe32, htobe64};
use std::error;
use std::fmt;

/// The closed set of metadata item types a GPF 1.x frame may carry.
///
/// `Unknown` preserves the wire type code for item types this crate
/// does not interpret, so a metadata list round-trips even when it
/// carries fields a newer frame format introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataType {
    EndOfData,
    JobId,
    FrameNumber,
    FileId,
    FileSize,
    DataCrc,
    DataSize,
    SymbolsPerPixel,
    ContentType,
    CipherKey,
    ContentSymbolSize,
    Unknown(u16),
}

impl MetadataType {
    pub fn code(self) -> u16 {
        match self {
            MetadataType::EndOfData => 0,
            MetadataType::JobId => 1,
            MetadataType::FrameNumber => 2,
            MetadataType::FileId => 3,
            MetadataType::FileSize => 4,
            MetadataType::DataCrc => 5,
            MetadataType::DataSize => 6,
            MetadataType::SymbolsPerPixel => 7,
            MetadataType::ContentType => 8,
            MetadataType::CipherKey => 9,
            MetadataType::ContentSymbolSize => 10,
            MetadataType::Unknown(code) => code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            0 => MetadataType::EndOfData,
            1 => MetadataType::JobId,
            2 => MetadataType::FrameNumber,
            3 => MetadataType::FileId,
            4 => MetadataType::FileSize,
            5 => MetadataType::DataCrc,
            6 => MetadataType::DataSize,
            7 => MetadataType::SymbolsPerPixel,
            8 => MetadataType::ContentType,
            9 => MetadataType::CipherKey,
            10 => MetadataType::ContentSymbolSize,
            other => MetadataType::Unknown(other),
        }
    }

    /// The fixed payload width in bytes for known types, or `None` for
    /// `Unknown` types whose width is only known from the item's own
    /// `size` field on the wire.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            MetadataType::EndOfData => Some(0),
            MetadataType::JobId => Some(4),
            MetadataType::FrameNumber => Some(4),
            MetadataType::FileId => Some(4),
            MetadataType::FileSize => Some(8),
            MetadataType::DataCrc => Some(8),
            MetadataType::DataSize => Some(4),
            MetadataType::SymbolsPerPixel => Some(2),
            MetadataType::ContentType => Some(2),
            MetadataType::CipherKey => Some(4),
            MetadataType::ContentSymbolSize => Some(2),
            MetadataType::Unknown(_) => None,
        }
    }
}

/// A metadata item's payload, big-endian encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Empty,
    U16(u16),
    U32(u32),
    U64(u64),
    Opaque(Vec<u8>),
}

impl MetadataValue {
    fn byte_len(&self) -> usize {
        match self {
            MetadataValue::Empty => 0,
            MetadataValue::U16(_) => 2,
            MetadataValue::U32(_) => 4,
            MetadataValue::U64(_) => 8,
            MetadataValue::Opaque(bytes) => bytes.len(),
        }
    }

    fn write_into(&self, out: &mut Vec<u8>) {
        match self {
            MetadataValue::Empty => {}
            MetadataValue::U16(value) => out.extend_from_slice(&htobe16(*value)),
            MetadataValue::U32(value) => out.extend_from_slice(&htobe32(*value)),
            MetadataValue::U64(value) => out.extend_from_slice(&htobe64(*value)),
            MetadataValue::Opaque(bytes) => out.extend_from_slice(bytes),
        }
    }
}

#[derive(Debug)]
pub enum MetadataError {
    /// The buffer ended before a declared item's `type`/`size` header
    /// or payload could be read in full.
    UnexpectedEof { at_offset: usize },
    /// A known type's declared `size` did not match its fixed width.
    PayloadSizeMismatch {
        item_type: MetadataType,
        expected: usize,
        actual: usize,
    },
}

impl error::Error for MetadataError {}
impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MetadataError::UnexpectedEof { at_offset } => {
                write!(f, "metadata stream truncated at byte offset {}", at_offset)
            }
            MetadataError::PayloadSizeMismatch {
                item_type,
                expected,
                actual,
            } => write!(
                f,
                "metadata item {:?} declared size {} but fixed width is {}",
                item_type, actual, expected
            ),
        }
    }
}

/// A single `(type, size, payload)` metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataItem {
    pub item_type: MetadataType,
    pub value: MetadataValue,
}

impl MetadataItem {
    pub fn end_of_data() -> Self {
        MetadataItem {
            item_type: MetadataType::EndOfData,
            value: MetadataValue::Empty,
        }
    }

    pub fn u32(item_type: MetadataType, value: u32) -> Self {
        MetadataItem {
            item_type,
            value: MetadataValue::U32(value),
        }
    }

    pub fn u16(item_type: MetadataType, value: u16) -> Self {
        MetadataItem {
            item_type,
            value: MetadataValue::U16(value),
        }
    }

    pub fn u64(item_type: MetadataType, value: u64) -> Self {
        MetadataItem {
            item_type,
            value: MetadataValue::U64(value),
        }
    }

    /// `4 + payload width` bytes: the `type`/`size` header plus payload.
    pub fn wire_len(&self) -> usize {
        4 + self.value.byte_len()
    }

    fn write_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&htobe16(self.item_type.code()));
        out.extend_from_slice(&htobe16(self.value.byte_len() as u16));
        self.value.write_into(out);
    }

    fn read_from(bytes: &[u8], offset: &mut usize) -> Result<Option<Self>, MetadataError> {
        if *offset + 4 > bytes.len() {
            if *offset == bytes.len() {
                return Ok(None);
            }
            return Err(MetadataError::UnexpectedEof { at_offset: *offset });
        }

        let item_type = MetadataType::from_code(betoh16(&bytes[*offset..]));
        let size = betoh16(&bytes[*offset + 2..]) as usize;
        *offset += 4;

        if item_type == MetadataType::EndOfData {
            return Ok(None);
        }

        if *offset + size > bytes.len() {
            return Err(MetadataError::UnexpectedEof { at_offset: *offset });
        }

        if let Some(expected) = item_type.fixed_width() {
            if expected != size {
                return Err(MetadataError::PayloadSizeMismatch {
                    item_type,
                    expected,
                    actual: size,
                });
            }
        }

        let payload = &bytes[*offset..*offset + size];
        let value = match item_type {
            MetadataType::EndOfData => MetadataValue::Empty,
            MetadataType::SymbolsPerPixel | MetadataType::ContentType | MetadataType::ContentSymbolSize => {
                MetadataValue::U16(betoh16(payload))
            }
            MetadataType::JobId | MetadataType::FrameNumber | MetadataType::FileId | MetadataType::DataSize | MetadataType::CipherKey => {
                MetadataValue::U32(betoh32(payload))
            }
            MetadataType::FileSize | MetadataType::DataCrc => MetadataValue::U64(betoh64(payload)),
            MetadataType::Unknown(_) => MetadataValue::Opaque(payload.to_vec()),
        };
        *offset += size;

        Ok(Some(MetadataItem { item_type, value }))
    }
}

/// An ordered, type-deduplicated set of metadata items.
///
/// At most one item per type is kept: inserting an item whose type is
/// already present replaces the prior value in place, preserving the
/// original insertion position. Wire order is therefore insertion
/// order of first occurrence, followed by a synthetic `EndOfData`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataList {
    items: Vec<MetadataItem>,
}

impl MetadataList {
    pub fn new() -> Self {
        MetadataList { items: Vec::new() }
    }

    pub fn insert(&mut self, item: MetadataItem) {
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|i| i.item_type == item.item_type)
        {
            *existing = item;
        } else {
            self.items.push(item);
        }
    }

    pub fn get(&self, item_type: MetadataType) -> Option<&MetadataItem> {
        self.items.iter().find(|i| i.item_type == item_type)
    }

    pub fn remove(&mut self, item_type: MetadataType) -> Option<MetadataItem> {
        let index = self.items.iter().position(|i| i.item_type == item_type)?;
        Some(self.items.remove(index))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetadataItem> {
        self.items.iter()
    }

    /// Serializes every item in insertion order, followed by the
    /// synthetic `EndOfData` terminator.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for item in &self.items {
            item.write_into(&mut out);
        }
        MetadataItem::end_of_data().write_into(&mut out);
        out
    }

    /// Deserializes items from `bytes` until `EndOfData` or buffer
    /// exhaustion, returning the populated list and the count of
    /// non-terminator items parsed.
    pub fn deserialize(bytes: &[u8]) -> Result<(MetadataList, usize), MetadataError> {
        let mut list = MetadataList::new();
        let mut offset = 0;
        let mut count = 0;
        while let Some(item) = MetadataItem::read_from(bytes, &mut offset)? {
            list.insert(item);
            count += 1;
        }
        Ok((list, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_matches_spec_example() {
        let mut list = MetadataList::new();
        list.insert(MetadataItem::u32(MetadataType::JobId, 0x0102_0304));
        list.insert(MetadataItem::u32(MetadataType::FrameNumber, 7));
        list.insert(MetadataItem::u32(MetadataType::DataSize, 1000));

        let bytes = list.serialize();
        let expected: Vec<u8> = vec![
            0x00, 0x01, 0x00, 0x04, 0x01, 0x02, 0x03, 0x04, 0x00, 0x02, 0x00, 0x04, 0x00, 0x00,
            0x00, 0x07, 0x00, 0x06, 0x00, 0x04, 0x00, 0x00, 0x03, 0xE8, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn deserialize_round_trips_through_iteration_order() {
        let mut list = MetadataList::new();
        list.insert(MetadataItem::u32(MetadataType::JobId, 42));
        list.insert(MetadataItem::u16(MetadataType::SymbolsPerPixel, 2));
        list.insert(MetadataItem::u64(MetadataType::FileSize, 123_456_789));

        let bytes = list.serialize();
        let (parsed, count) = MetadataList::deserialize(&bytes).unwrap();
        assert_eq!(count, 3);
        assert_eq!(parsed, list);
    }

    #[test]
    fn insert_with_existing_type_replaces_in_place() {
        let mut list = MetadataList::new();
        list.insert(MetadataItem::u32(MetadataType::JobId, 1));
        list.insert(MetadataItem::u32(MetadataType::FrameNumber, 2));
        list.insert(MetadataItem::u32(MetadataType::JobId, 99));

        assert_eq!(list.len(), 2);
        assert_eq!(
            list.get(MetadataType::JobId).unwrap().value,
            MetadataValue::U32(99)
        );
        // first position (JobId) retained, not moved to the end
        assert_eq!(list.iter().next().unwrap().item_type, MetadataType::JobId);
    }

    #[test]
    fn item_wire_len_matches_fixed_width_plus_header() {
        for (item_type, width) in [
            (MetadataType::JobId, 4),
            (MetadataType::FileSize, 8),
            (MetadataType::SymbolsPerPixel, 2),
            (MetadataType::EndOfData, 0),
        ] {
            let item = match width {
                0 => MetadataItem::end_of_data(),
                2 => MetadataItem::u16(item_type, 0),
                4 => MetadataItem::u32(item_type, 0),
                8 => MetadataItem::u64(item_type, 0),
                _ => unreachable!(),
            };
            assert_eq!(item.wire_len(), 4 + width);
        }
    }

    #[test]
    fn unknown_type_carries_opaque_payload() {
        let mut out = Vec::new();
        out.extend_from_slice(&[0x00, 0x2A]); // type 42, unknown
        out.extend_from_slice(&[0x00, 0x03]); // size 3
        out.extend_from_slice(&[1, 2, 3]);
        out.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // EndOfData

        let (list, count) = MetadataList::deserialize(&out).unwrap();
        assert_eq!(count, 1);
        let item = list.get(MetadataType::Unknown(42)).unwrap();
        assert_eq!(item.value, MetadataValue::Opaque(vec![1, 2, 3]));
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let bytes = [0x00, 0x01, 0x00, 0x04, 0x01, 0x02]; // declares 4 bytes, only 2 present
        assert!(MetadataList::deserialize(&bytes).is_err());
    }

    #[test]
    fn wrong_size_for_known_type_is_an_error() {
        let bytes = [0x00, 0x01, 0x00, 0x02, 0x01, 0x02]; // JobId declared with size 2, not 4
        assert!(MetadataList::deserialize(&bytes).is_err());
    }
}
