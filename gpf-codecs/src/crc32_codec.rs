//! CRC32 detection codec: appends a 4-byte big-endian CRC32 on encode,
//! verifies and strips it on decode.
//!
//! Grounded on `original_source/src/codecs/crc32.c`: encode always
//! appends exactly 4 trailer bytes; decode recomputes the CRC over the
//! leading data and compares it against the trailing 4 bytes, failing
//! (not correcting) on mismatch.

use crate::interface::{Codec, CodecError, CodecObserver, DecodeStats, PropertyValue};
use gpf_primitives::{htobe32, Crc32};

const TRAILER_SIZE: usize = 4;

pub struct Crc32Codec {
    crc: Crc32,
    capacity: usize,
}

impl Crc32Codec {
    pub fn new(seed: u32, polynomial: u32) -> Self {
        Crc32Codec {
            crc: Crc32::new(seed, polynomial),
            capacity: 0,
        }
    }

    /// The default seed/polynomial pairing used wherever the spec does
    /// not otherwise configure one (`0xFFFFFFFF` seed, the standard
    /// CRC-32 polynomial in its normal, non-reflected bit order).
    pub fn standard() -> Self {
        Self::new(0xFFFF_FFFF, 0x04C1_1DB7)
    }
}

impl Codec for Crc32Codec {
    fn name(&self) -> &'static str {
        "Crc32"
    }

    fn is_error_correcting(&self) -> bool {
        false
    }

    fn encoded_block_size(&self) -> usize {
        self.capacity + TRAILER_SIZE
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
        self.capacity + TRAILER_SIZE
    }

    fn decoded_data_size(&self) -> usize {
        self.capacity
    }

    fn init_capacity(&mut self, capacity: usize) -> Result<(), CodecError> {
        if capacity < TRAILER_SIZE {
            return Err(CodecError::CapacityTooSmall {
                capacity,
                block_size: TRAILER_SIZE,
            });
        }
        self.capacity = capacity - TRAILER_SIZE;
        Ok(())
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<(), CodecError> {
        match name {
            "seed" | "polynomial" => {
                let uint = value.as_uint().ok_or(CodecError::InvalidProperty {
                    name: "seed/polynomial",
                    reason: "expected an unsigned integer".to_owned(),
                })?;
                if name == "seed" {
                    self.crc = Crc32::new(uint as u32, self.crc.polynomial());
                } else {
                    self.crc = Crc32::new(self.crc.seed(), uint as u32);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn encode(&mut self, data: &mut Vec<u8>) -> Result<(), CodecError> {
        let digest = self.crc.calc(data);
        data.extend_from_slice(&htobe32(digest));
        Ok(())
    }

    fn decode(
        &mut self,
        data: &mut Vec<u8>,
        _erasures: Option<&[usize]>,
        stats: &mut DecodeStats,
        observer: &dyn CodecObserver,
    ) -> Result<(), CodecError> {
        if data.len() < TRAILER_SIZE {
            return Err(CodecError::DecodeFailed {
                reason: "data shorter than the CRC32 trailer".to_owned(),
            });
        }
        let split = data.len() - TRAILER_SIZE;
        let payload = &data[..split];
        let trailer = u32::from_be_bytes(data[split..].try_into().unwrap());

        let expected = self.crc.calc(payload);
        if expected != trailer {
            stats.unresolved_errors += 1;
            return Err(CodecError::DecodeFailed {
                reason: format!("CRC32 mismatch: expected {:08x}, got {:08x}", expected, trailer),
            });
        }
        observer.on_block_decoded(self.name(), 0, stats);
        data.truncate(split);
        Ok(())
    }
}
