//! Reed–Solomon block codec: `message_size` (m) data bytes plus
//! `byte_parity_number` (p) parity bytes per block, over `GF(256)`
//! with the primitive polynomial `0x11D` (`x^8+x^4+x^3+x^2+1`),
//! correcting up to `floor(p/2)` byte errors per block.
//!
//! Grounded on `original_source/src/codecs/reedsolomon.c` for the
//! block-size contract, and on the standard syndrome / Berlekamp–
//! Massey / Forney decoder (see `crate::gf`) for the actual
//! correction algorithm, which the C source delegates to a bundled
//! `rs_codec` library it does not itself implement.

use crate::gf::{find_error_locator, find_roots, GField};
use crate::interface::{Codec, CodecError, CodecObserver, DecodeStats, PropertyValue};

const PRIMITIVE_POLY_285: u32 = 0x11D;

pub struct ReedSolomon {
    message_size: usize,
    parity_size: usize,
    gf: GField,
    num_blocks: usize,
    encoded_data_size: usize,
    decoded_data_size: usize,
}

impl ReedSolomon {
    pub fn new(message_size: usize, parity_size: usize) -> Result<Self, CodecError> {
        if message_size + parity_size > 255 {
            return Err(CodecError::InvalidProperty {
                name: "messageSize",
                reason: format!(
                    "message_size + parity_size ({}) exceeds the GF(256) block limit of 255",
                    message_size + parity_size
                ),
            });
        }
        Ok(ReedSolomon {
            message_size,
            parity_size,
            gf: GField::new(8, PRIMITIVE_POLY_285),
            num_blocks: 0,
            encoded_data_size: message_size + parity_size,
            decoded_data_size: message_size,
        })
    }

    fn block_size(&self) -> usize {
        self.message_size + self.parity_size
    }

    fn generator_poly(&self) -> Vec<u32> {
        let mut g = vec![1u32];
        for i in 0..self.parity_size {
            g = self.gf.poly_mul(&g, &[1, self.gf.pow(2, i as i64)]);
        }
        g
    }

    /// Systematic encode of one `message_size`-byte block into
    /// `message_size + parity_size` bytes.
    fn encode_block(&self, message: &[u8]) -> Vec<u8> {
        let gen = self.generator_poly();
        let mut scratch: Vec<u32> = message.iter().map(|&b| b as u32).collect();
        scratch.resize(message.len() + self.parity_size, 0);
        for i in 0..message.len() {
            let coef = scratch[i];
            if coef != 0 {
                for (j, &gj) in gen.iter().enumerate().skip(1) {
                    scratch[i + j] ^= self.gf.mul(gj, coef);
                }
            }
        }
        let mut out = Vec::with_capacity(self.block_size());
        out.extend(message.iter().copied());
        out.extend(scratch[message.len()..].iter().map(|&v| v as u8));
        out
    }

    /// Decodes one `message_size + parity_size`-byte block, returning
    /// the corrected `message_size` data bytes and the number of byte
    /// errors resolved, or `None` if the block carries more errors
    /// than `floor(parity_size/2)` can correct.
    fn decode_block(&self, block: &[u8]) -> Option<(Vec<u8>, usize)> {
        let codeword: Vec<u32> = block.iter().map(|&b| b as u32).collect();

        let syndromes: Vec<u32> = (0..self.parity_size)
            .map(|i| self.gf.poly_eval(&codeword, self.gf.pow(2, i as i64)))
            .collect();

        if syndromes.iter().all(|&s| s == 0) {
            return Some((block[..self.message_size].to_vec(), 0));
        }

        let err_loc_descending = find_error_locator(&self.gf, &syndromes, self.parity_size)?;
        let errs = err_loc_descending.len() - 1;

        let mut err_loc_ascending = err_loc_descending.clone();
        err_loc_ascending.reverse();
        let err_pos = find_roots(&self.gf, &err_loc_ascending, codeword.len());
        if err_pos.len() != errs {
            return None;
        }

        let coef_pos: Vec<usize> = err_pos
            .iter()
            .map(|&p| codeword.len() - 1 - p)
            .collect();

        // Errata locator built directly from the found positions (not
        // reused from the Berlekamp-Massey result, matching Forney's
        // algorithm as commonly formulated).
        let mut errata_loc = vec![1u32];
        for &i in &coef_pos {
            errata_loc = self
                .gf
                .poly_mul(&errata_loc, &[self.gf.pow(2, i as i64), 1]);
        }

        let mut synd_rev = syndromes.clone();
        synd_rev.reverse();
        let product = self.gf.poly_mul(&synd_rev, &errata_loc);
        let (_, remainder) = self
            .gf
            .poly_div_by_power_of_x(&product, self.parity_size + 1);
        let mut err_eval = remainder;
        err_eval.reverse();

        let x_values: Vec<u32> = coef_pos.iter().map(|&p| self.gf.pow(2, p as i64)).collect();

        let mut error_vector = vec![0u32; codeword.len()];
        for (i, &xi) in x_values.iter().enumerate() {
            let xi_inv = self.gf.inverse(xi);
            let mut err_loc_prime = 1u32;
            for (j, &xj) in x_values.iter().enumerate() {
                if i != j {
                    err_loc_prime = self
                        .gf
                        .mul(err_loc_prime, 1 ^ self.gf.mul(xi_inv, xj));
                }
            }
            if err_loc_prime == 0 {
                return None;
            }
            let y = self.gf.poly_eval(&err_eval, xi_inv);
            let y = self.gf.mul(xi, y);
            let magnitude = self.gf.div(y, err_loc_prime);
            error_vector[err_pos[i]] = magnitude;
        }

        let corrected: Vec<u8> = codeword
            .iter()
            .zip(error_vector.iter())
            .map(|(&c, &e)| (c ^ e) as u8)
            .collect();

        let verify: Vec<u32> = corrected.iter().map(|&b| b as u32).collect();
        let still_bad = (0..self.parity_size)
            .any(|i| self.gf.poly_eval(&verify, self.gf.pow(2, i as i64)) != 0);
        if still_bad {
            return None;
        }

        Some((corrected[..self.message_size].to_vec(), errs))
    }
}

impl Codec for ReedSolomon {
    fn name(&self) -> &'static str {
        "ReedSolomon"
    }

    fn is_error_correcting(&self) -> bool {
        true
    }

    fn encoded_block_size(&self) -> usize {
        self.block_size()
    }

    fn decoded_block_size(&self) -> usize {
        self.message_size
    }

    fn encoded_symbol_size(&self) -> usize {
        8
    }

    fn decoded_symbol_size(&self) -> usize {
        8
    }

    fn encoded_data_size(&self) -> usize {
        self.encoded_data_size
    }

    fn decoded_data_size(&self) -> usize {
        self.decoded_data_size
    }

    fn init_capacity(&mut self, capacity: usize) -> Result<(), CodecError> {
        let block_size = self.block_size();
        if capacity < block_size {
            return Err(CodecError::CapacityTooSmall {
                capacity,
                block_size,
            });
        }
        self.num_blocks = capacity / block_size;
        self.encoded_data_size = self.num_blocks * block_size;
        self.decoded_data_size = self.num_blocks * self.message_size;
        Ok(())
    }

    fn encode(&mut self, data: &mut Vec<u8>) -> Result<(), CodecError> {
        let mut padded = data.clone();
        let remainder = padded.len() % self.message_size;
        if remainder != 0 {
            padded.resize(padded.len() + (self.message_size - remainder), 0);
        }

        let mut out = Vec::with_capacity(padded.len() / self.message_size * self.block_size());
        for chunk in padded.chunks(self.message_size) {
            out.extend(self.encode_block(chunk));
        }
        *data = out;
        Ok(())
    }

    fn decode(
        &mut self,
        data: &mut Vec<u8>,
        _erasures: Option<&[usize]>,
        stats: &mut DecodeStats,
        observer: &dyn CodecObserver,
    ) -> Result<(), CodecError> {
        let block_size = self.block_size();
        let num_blocks = data.len() / block_size;
        data.truncate(num_blocks * block_size);

        let mut out = Vec::with_capacity(num_blocks * self.message_size);
        let mut any_unresolved = false;
        let mut max_errors_per_block = 0usize;
        for (index, block) in data.chunks(block_size).enumerate() {
            match self.decode_block(block) {
                Some((message, errors)) => {
                    out.extend(message);
                    stats.resolved_errors += errors as u64;
                    max_errors_per_block = max_errors_per_block.max(errors);
                    observer.on_block_decoded(self.name(), index, stats);
                }
                None => {
                    out.extend(block[..self.message_size].iter().copied());
                    stats.unresolved_errors += 1;
                    max_errors_per_block = max_errors_per_block.max(self.parity_size / 2);
                    any_unresolved = true;
                }
            }
        }
        *data = out;

        // reedsolomon.c:214-215: a weight/amount ratio pair computed
        // once per decode call from the worst block seen, not a
        // per-block byte-count sum.
        if self.parity_size > 0 && block_size > 0 {
            let weight = self.parity_size as f64 / block_size as f64;
            // spec.md §7: an exhausted stage sets
            // `fec_accumulated_amount = fec_accumulated_weight` outright.
            let severity = if any_unresolved || max_errors_per_block * 2 > self.parity_size {
                1.0
            } else {
                (max_errors_per_block * 2) as f64 / self.parity_size as f64
            };
            stats.fec_accumulated_weight += weight;
            stats.fec_accumulated_amount += weight * severity;
        }

        if any_unresolved {
            return Err(CodecError::DecodeFailed {
                reason: "one or more blocks exceeded Reed-Solomon correction capacity".to_owned(),
            });
        }
        Ok(())
    }
}

pub fn create(message_size: usize, parity_size: usize) -> Result<ReedSolomon, CodecError> {
    ReedSolomon::new(message_size, parity_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::NullObserver;

    #[test]
    fn round_trip_without_errors() {
        let mut codec = ReedSolomon::new(10, 4).unwrap();
        let mut data: Vec<u8> = (0u8..10).collect();
        let original = data.clone();
        codec.encode(&mut data).unwrap();
        assert_eq!(data.len(), 14);

        let mut stats = DecodeStats::default();
        codec.decode(&mut data, None, &mut stats, &NullObserver).unwrap();
        assert_eq!(data, original);
        assert_eq!(stats.resolved_errors, 0);
        assert_eq!(stats.unresolved_errors, 0);
        // the weight half of the ratio accumulates even with zero
        // errors; only the amount half scales with how bad it got.
        let expected_weight = codec.parity_size as f64 / codec.block_size() as f64;
        assert!((stats.fec_accumulated_weight - expected_weight).abs() < 1e-9);
        assert_eq!(stats.fec_accumulated_amount, 0.0);
    }

    #[test]
    fn corrects_up_to_half_parity_byte_errors() {
        let message_size = 20;
        let parity_size = 8; // corrects up to 4 byte errors
        let mut codec = ReedSolomon::new(message_size, parity_size).unwrap();
        let mut data: Vec<u8> = (0u8..message_size as u8).collect();
        let original = data.clone();
        codec.encode(&mut data).unwrap();

        // flip 4 bytes at fixed, distinct positions within the one block
        for &pos in &[0usize, 5, 13, 24] {
            data[pos] ^= 0xFF;
        }

        let mut stats = DecodeStats::default();
        codec
            .decode(&mut data, None, &mut stats, &NullObserver)
            .unwrap();
        assert_eq!(data, original);
        assert_eq!(stats.resolved_errors, 4);
        assert_eq!(stats.unresolved_errors, 0);
    }

    #[test]
    fn reports_unresolved_when_errors_exceed_capacity() {
        let message_size = 10;
        let parity_size = 4; // corrects up to 2 byte errors
        let mut codec = ReedSolomon::new(message_size, parity_size).unwrap();
        let mut data: Vec<u8> = (0u8..message_size as u8).collect();
        codec.encode(&mut data).unwrap();

        for &pos in &[0usize, 3, 7, 12] {
            data[pos] ^= 0xFF;
        }

        let mut stats = DecodeStats::default();
        let result = codec.decode(&mut data, None, &mut stats, &NullObserver);
        assert!(result.is_err());
        assert_eq!(stats.unresolved_errors, 1);
    }

    #[test]
    fn init_capacity_computes_block_count() {
        let mut codec = ReedSolomon::new(10, 4).unwrap();
        codec.init_capacity(28).unwrap(); // 2 full blocks of 14
        assert_eq!(codec.encoded_data_size(), 28);
        assert_eq!(codec.decoded_data_size(), 20);
    }

    #[test]
    fn decoded_block_size_equals_encoded_minus_parity() {
        let codec = ReedSolomon::new(223, 32).unwrap();
        assert_eq!(
            codec.decoded_block_size(),
            codec.encoded_block_size() - 32
        );
    }
}
