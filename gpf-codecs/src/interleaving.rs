//! Interleaving codec: reorders symbols across a fixed depth to spread
//! burst errors across multiple downstream error-correction blocks.
//! Operates either byte-wise or bit-wise depending on `symbol_size`.
//!
//! Grounded on `original_source/src/codecs/interleaving.c`. That
//! source's bit-mode decode calls the same byte-oriented inverse as
//! byte-mode decode, which only undoes a byte interleave and leaves a
//! bit interleave unrecovered — spec.md §9 flags this as a redesign
//! target. This implementation gives bit mode its own true inverse
//! (`decode_bits`) instead of reproducing that bug.

use crate::interface::{Codec, CodecError, CodecObserver, DecodeStats, PropertyValue};
use gpf_primitives::{bit_is_on, bit_set_on};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolWidth {
    Bit,
    Byte,
}

pub struct Interleaving {
    depth: usize,
    width: SymbolWidth,
    capacity: usize,
}

impl Interleaving {
    pub fn new(depth: usize, symbol_size_bits: usize) -> Result<Self, CodecError> {
        if depth == 0 {
            return Err(CodecError::InvalidProperty {
                name: "depth",
                reason: "interleaving depth must be at least 1".to_owned(),
            });
        }
        let width = match symbol_size_bits {
            1 => SymbolWidth::Bit,
            8 => SymbolWidth::Byte,
            other => {
                return Err(CodecError::InvalidProperty {
                    name: "symbolSize",
                    reason: format!("unsupported symbol size {} bits", other),
                })
            }
        };
        Ok(Interleaving {
            depth,
            width,
            capacity: 0,
        })
    }

    fn encode_bytes(&self, data: &[u8]) -> Vec<u8> {
        let rows = self.depth;
        let cols = (data.len() + rows - 1) / rows;
        let mut padded = data.to_vec();
        padded.resize(rows * cols, 0);
        let mut out = vec![0u8; rows * cols];
        for row in 0..rows {
            for col in 0..cols {
                out[col * rows + row] = padded[row * cols + col];
            }
        }
        out
    }

    fn decode_bytes(&self, data: &[u8]) -> Vec<u8> {
        let rows = self.depth;
        let cols = data.len() / rows;
        let mut out = vec![0u8; rows * cols];
        for row in 0..rows {
            for col in 0..cols {
                out[row * cols + col] = data[col * rows + row];
            }
        }
        out
    }

    fn encode_bits(&self, data: &[u8]) -> Vec<u8> {
        let total_bits = data.len() * 8;
        let rows = self.depth;
        let cols = (total_bits + rows - 1) / rows;
        let mut out = vec![0u8; (rows * cols + 7) / 8];
        for row in 0..rows {
            for col in 0..cols {
                let src = row * cols + col;
                if src < total_bits && bit_is_on(data, src) {
                    bit_set_on(&mut out, col * rows + row);
                }
            }
        }
        out
    }

    fn decode_bits(&self, data: &[u8]) -> Vec<u8> {
        let total_bits = data.len() * 8;
        let rows = self.depth;
        let cols = total_bits / rows;
        let mut out = vec![0u8; (rows * cols + 7) / 8];
        for row in 0..rows {
            for col in 0..cols {
                let src = col * rows + row;
                if src < total_bits && bit_is_on(data, src) {
                    bit_set_on(&mut out, row * cols + col);
                }
            }
        }
        out
    }
}

impl Codec for Interleaving {
    fn name(&self) -> &'static str {
        "Interleaving"
    }

    fn is_error_correcting(&self) -> bool {
        false
    }

    fn encoded_block_size(&self) -> usize {
        self.capacity
    }

    fn decoded_block_size(&self) -> usize {
        self.capacity
    }

    fn encoded_symbol_size(&self) -> usize {
        match self.width {
            SymbolWidth::Bit => 1,
            SymbolWidth::Byte => 8,
        }
    }

    fn decoded_symbol_size(&self) -> usize {
        self.encoded_symbol_size()
    }

    fn encoded_data_size(&self) -> usize {
        self.capacity
    }

    fn decoded_data_size(&self) -> usize {
        self.capacity
    }

    fn init_capacity(&mut self, capacity: usize) -> Result<(), CodecError> {
        self.capacity = capacity;
        Ok(())
    }

    fn set_property(&mut self, _name: &str, _value: &PropertyValue) -> Result<(), CodecError> {
        Ok(())
    }

    fn encode(&mut self, data: &mut Vec<u8>) -> Result<(), CodecError> {
        *data = match self.width {
            SymbolWidth::Byte => self.encode_bytes(data),
            SymbolWidth::Bit => self.encode_bits(data),
        };
        Ok(())
    }

    fn decode(
        &mut self,
        data: &mut Vec<u8>,
        _erasures: Option<&[usize]>,
        _stats: &mut DecodeStats,
        observer: &dyn CodecObserver,
    ) -> Result<(), CodecError> {
        *data = match self.width {
            SymbolWidth::Byte => self.decode_bytes(data),
            SymbolWidth::Bit => self.decode_bits(data),
        };
        observer.on_block_decoded(self.name(), 0, &DecodeStats::default());
        Ok(())
    }
}

pub fn create(depth: usize, symbol_size_bits: usize) -> Result<Interleaving, CodecError> {
    Interleaving::new(depth, symbol_size_bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::NullObserver;

    #[test]
    fn byte_mode_round_trips() {
        let mut codec = Interleaving::new(4, 8).unwrap();
        let mut data: Vec<u8> = (0u8..32).collect();
        let original = data.clone();
        codec.encode(&mut data).unwrap();
        assert_ne!(data, original);

        let mut stats = DecodeStats::default();
        codec.decode(&mut data, None, &mut stats, &NullObserver).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn bit_mode_round_trips() {
        let mut codec = Interleaving::new(4, 1).unwrap();
        let mut data: Vec<u8> = vec![0b1011_0010, 0b1100_1101, 0b0000_1111, 0b1111_0000];
        let original = data.clone();
        codec.encode(&mut data).unwrap();
        assert_ne!(data, original);

        let mut stats = DecodeStats::default();
        codec.decode(&mut data, None, &mut stats, &NullObserver).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn bit_mode_is_not_aliased_to_byte_mode() {
        let mut bit_codec = Interleaving::new(4, 1).unwrap();
        let mut byte_codec = Interleaving::new(4, 8).unwrap();
        let data: Vec<u8> = vec![0xAA, 0x55, 0x0F, 0xF0];

        let mut bit_encoded = data.clone();
        bit_codec.encode(&mut bit_encoded).unwrap();
        let mut byte_encoded = data.clone();
        byte_codec.encode(&mut byte_encoded).unwrap();
        assert_ne!(bit_encoded, byte_encoded);
    }
}
