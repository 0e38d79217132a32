//! PacketHeader codec: prepends an 8-byte header — a big-endian
//! `u32` header size (always 8) followed by a big-endian `u32` total
//! packet size (header + payload) — and zero-pads the payload out to
//! the declared capacity.
//!
//! Grounded on `original_source/src/codecs/packetheader.c`: encode
//! always emits the fixed 8-byte header verbatim; decode reads the two
//! fields back and validates `header_size <= total_size <= available`
//! (`packetheader.c`'s `(data->size < header->size) ||
//! (header->header_size > header->size)` check), then strips the
//! *parsed* `header_size` bytes and any trailing zero padding beyond
//! `total_size - header_size`.

use crate::interface::{Codec, CodecError, CodecObserver, DecodeStats, PropertyValue};
use gpf_primitives::{betoh32, htobe32};

const HEADER_SIZE: usize = 8;

pub struct PacketHeader {
    capacity: usize,
}

impl PacketHeader {
    pub fn new() -> Self {
        PacketHeader { capacity: 0 }
    }
}

impl Default for PacketHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for PacketHeader {
    fn name(&self) -> &'static str {
        "PacketHeader"
    }

    fn is_error_correcting(&self) -> bool {
        false
    }

    fn pre_zero_pad_data(&self) -> bool {
        true
    }

    fn encoded_block_size(&self) -> usize {
        self.capacity + HEADER_SIZE
    }

    fn decoded_block_size(&self) -> usize {
        self.capacity
    }

    fn encoded_symbol_size(&self) -> usize {
        8
    }

    fn decoded_symbol_size(&self) -> usize {
        8
    }

    fn encoded_data_size(&self) -> usize {
        self.capacity + HEADER_SIZE
    }

    fn decoded_data_size(&self) -> usize {
        self.capacity
    }

    fn init_capacity(&mut self, capacity: usize) -> Result<(), CodecError> {
        if capacity < HEADER_SIZE {
            return Err(CodecError::CapacityTooSmall {
                capacity,
                block_size: HEADER_SIZE,
            });
        }
        self.capacity = capacity - HEADER_SIZE;
        Ok(())
    }

    fn set_property(&mut self, _name: &str, _value: &PropertyValue) -> Result<(), CodecError> {
        Ok(())
    }

    fn encode(&mut self, data: &mut Vec<u8>) -> Result<(), CodecError> {
        if data.len() < self.capacity {
            data.resize(self.capacity, 0);
        }
        let total_size = (HEADER_SIZE + data.len()) as u32;
        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&htobe32(HEADER_SIZE as u32));
        header.extend_from_slice(&htobe32(total_size));
        header.extend_from_slice(data);
        *data = header;
        Ok(())
    }

    fn decode(
        &mut self,
        data: &mut Vec<u8>,
        _erasures: Option<&[usize]>,
        _stats: &mut DecodeStats,
        observer: &dyn CodecObserver,
    ) -> Result<(), CodecError> {
        if data.len() < HEADER_SIZE {
            return Err(CodecError::DecodeFailed {
                reason: "data shorter than the packet header".to_owned(),
            });
        }
        let header_size = betoh32(&data[0..4]) as usize;
        let total_size = betoh32(&data[4..8]) as usize;
        if header_size > total_size || total_size > data.len() {
            return Err(CodecError::DecodeFailed {
                reason: format!(
                    "packet header_size {} / total_size {} inconsistent with {} available bytes",
                    header_size,
                    total_size,
                    data.len()
                ),
            });
        }
        observer.on_block_decoded(self.name(), 0, &DecodeStats::default());
        let payload_end = total_size - header_size;
        data.drain(0..header_size);
        data.truncate(payload_end);
        Ok(())
    }
}

pub fn create() -> PacketHeader {
    PacketHeader::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::NullObserver;

    #[test]
    fn round_trip() {
        let mut codec = PacketHeader::new();
        codec.init_capacity(20).unwrap();
        let mut data: Vec<u8> = vec![1, 2, 3, 4, 5];
        codec.encode(&mut data).unwrap();
        assert_eq!(data.len(), 20 + HEADER_SIZE);

        let mut expected = vec![1, 2, 3, 4, 5];
        expected.resize(20, 0);

        let mut stats = DecodeStats::default();
        codec.decode(&mut data, None, &mut stats, &NullObserver).unwrap();
        assert_eq!(data, expected);
    }

    #[test]
    fn rejects_a_header_size_larger_than_the_total_size() {
        let mut codec = PacketHeader::new();
        let mut data = vec![0u8; 8];
        data[0..4].copy_from_slice(&htobe32(8));
        data[4..8].copy_from_slice(&htobe32(4));
        let mut stats = DecodeStats::default();
        assert!(codec.decode(&mut data, None, &mut stats, &NullObserver).is_err());
    }

    #[test]
    fn strips_the_parsed_header_size_rather_than_a_hardcoded_constant() {
        let mut codec = PacketHeader::new();
        let mut data = vec![0u8; 13];
        data[0..4].copy_from_slice(&htobe32(10));
        data[4..8].copy_from_slice(&htobe32(13));
        data[10..13].copy_from_slice(&[7, 8, 9]);
        let mut stats = DecodeStats::default();
        codec.decode(&mut data, None, &mut stats, &NullObserver).unwrap();
        assert_eq!(data, vec![7, 8, 9]);
    }
}
