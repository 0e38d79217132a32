//! Codec chain and dispatcher: sequences the configured codecs,
//! validates the size chain at construction, and drives encode/decode
//! while accumulating statistics.
//!
//! Grounded on `original_source/src/codecs/codecdispatcher.c`
//! (`initialize`, `calculate_packet_sizes`,
//! `boxing_codecdispatcher_decode_step_codec`). The open-polymorphism
//! struct-of-function-pointers pattern that file uses collapses into
//! the `gpf_codecs::Codec` trait object sequence held here (spec.md §9
//! REDESIGN FLAGS).

pub mod config;
pub mod factory;

use config::Config;
use gpf_codecs::{Codec, CodecObserver, DecodeStats};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum DispatchError {
    MissingProperty {
        name: &'static str,
    },
    InvalidProperty {
        name: &'static str,
        reason: String,
    },
    UnknownCodec {
        class_name: String,
    },
    CodecConstruction {
        class_name: String,
        reason: String,
    },
    /// A codec's `encoded_symbol_size`/`decoded_symbol_size` contract
    /// does not agree, byte-rounded, with its neighbor in the chain.
    IllegalSymbolSize {
        codec_name: &'static str,
        expected_bytes: usize,
        actual_bytes: usize,
    },
    /// A non-error-correcting stage failed outright.
    StageFailed {
        codec_name: &'static str,
        reason: String,
    },
}

impl error::Error for DispatchError {}
impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DispatchError::MissingProperty { name } => {
                write!(f, "configuration is missing required property '{}'", name)
            }
            DispatchError::InvalidProperty { name, reason } => {
                write!(f, "property '{}' is invalid: {}", name, reason)
            }
            DispatchError::UnknownCodec { class_name } => {
                write!(f, "unknown codec class '{}'", class_name)
            }
            DispatchError::CodecConstruction { class_name, reason } => {
                write!(f, "failed to construct codec '{}': {}", class_name, reason)
            }
            DispatchError::IllegalSymbolSize {
                codec_name,
                expected_bytes,
                actual_bytes,
            } => write!(
                f,
                "codec '{}' expects a {}-byte symbol but the chain supplies {} bytes",
                codec_name, expected_bytes, actual_bytes
            ),
            DispatchError::StageFailed { codec_name, reason } => {
                write!(f, "codec '{}' stage failed: {}", codec_name, reason)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DispatcherVersion {
    pub major: u32,
    pub minor: u32,
}

impl DispatcherVersion {
    pub const V1_0: DispatcherVersion = DispatcherVersion { major: 1, minor: 0 };
    pub const PRE_1_0: DispatcherVersion = DispatcherVersion { major: 0, minor: 9 };

    fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some(DispatcherVersion { major, minor })
    }

    /// Whether this version predates 1.0 and therefore expects a CRC32
    /// trailer carried explicitly in the metadata byte stream, rather
    /// than relying on an explicit `CRC32` codec stage.
    pub fn is_legacy(&self) -> bool {
        *self < DispatcherVersion::V1_0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolAlignment {
    Bit,
    Byte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodecOrder {
    Encode,
    Decode,
}

/// The codec chain + dispatcher: owns codec instances in both encode
/// and decode order and drives the chain.
pub struct Dispatcher {
    encode_codecs: Vec<Box<dyn Codec>>,
    decode_codecs: Vec<Box<dyn Codec>>,
    version: DispatcherVersion,
    symbol_alignment: SymbolAlignment,
    color_depth: u32,
    packet_size: u32,
    stripe_size: u32,
}

impl Dispatcher {
    /// Builds a dispatcher from `config`'s `CodecDispatcher` group plus
    /// the named coding scheme (`"DataCodingScheme"` or
    /// `"MetadataCodingScheme"`), `packet_size` content-capacity
    /// symbols and `modulation_levels` the amplitude alphabet size.
    pub fn from_config(
        config: &Config,
        packet_size: u32,
        modulation_levels: u32,
        scheme: &str,
    ) -> Result<Self, DispatchError> {
        const GROUP: &str = "CodecDispatcher";

        let version = match config.string(GROUP, "version") {
            Some(text) => DispatcherVersion::parse(text).ok_or(DispatchError::InvalidProperty {
                name: "version",
                reason: format!("unparseable version string '{}'", text),
            })?,
            None => DispatcherVersion::PRE_1_0,
        };

        let order = match config.string(GROUP, "order") {
            Some("decode") => CodecOrder::Decode,
            Some("encode") | None => CodecOrder::Encode,
            Some(other) => {
                return Err(DispatchError::InvalidProperty {
                    name: "order",
                    reason: format!("unknown value '{}'", other),
                })
            }
        };

        let symbol_alignment = match config.string(GROUP, "symbolAlignment") {
            Some("byte") => SymbolAlignment::Byte,
            Some("bit") | None => SymbolAlignment::Bit,
            Some(other) => {
                return Err(DispatchError::InvalidProperty {
                    name: "symbolAlignment",
                    reason: format!("unknown value '{}'", other),
                })
            }
        };

        let mut color_depth = 0u32;
        let mut levels = modulation_levels.saturating_sub(1);
        while levels > 0 {
            color_depth += 1;
            levels >>= 1;
        }

        let stripe_size = config
            .uint("MultiFrameFormat", "stripeSize")
            .unwrap_or(1) as u32;

        // `Box<dyn Codec>` is not `Clone`, so the encode-order and
        // decode-order lists are each built from their own independent
        // codec instances rather than sharing one.
        let (encode_codecs, decode_codecs) = Self::build_both_orders(config, scheme, order, color_depth)?;

        let mut dispatcher = Dispatcher {
            encode_codecs,
            decode_codecs,
            version,
            symbol_alignment,
            color_depth,
            packet_size,
            stripe_size,
        };
        dispatcher.calculate_packet_sizes()?;
        Ok(dispatcher)
    }

    /// Builds two independent sets of codec instances from the same
    /// configured list — one per iteration direction — since a single
    /// `Box<dyn Codec>` cannot be shared between the encode-order and
    /// decode-order lists.
    fn build_both_orders(
        config: &Config,
        scheme: &str,
        order: CodecOrder,
        color_depth: u32,
    ) -> Result<(Vec<Box<dyn Codec>>, Vec<Box<dyn Codec>>), DispatchError> {
        const GROUP: &str = "CodecDispatcher";
        if !config.is_set(GROUP, scheme) {
            return Ok((Vec::new(), Vec::new()));
        }

        let group_names = config.list(GROUP, scheme);
        let build_one = |group_name: &str| -> Result<Box<dyn Codec>, DispatchError> {
            let class_name = config
                .string(group_name, "codec")
                .map(|s| s.to_owned())
                .unwrap_or_else(|| group_name.to_owned());
            let properties = config.properties(group_name);
            factory::build_codec(&class_name, &properties, color_depth)
        };

        let mut forward = Vec::with_capacity(group_names.len());
        for group_name in &group_names {
            forward.push(build_one(group_name)?);
        }
        let mut backward = Vec::with_capacity(group_names.len());
        for group_name in &group_names {
            backward.push(build_one(group_name)?);
        }
        backward.reverse();

        Ok(match order {
            CodecOrder::Encode => (forward, backward),
            CodecOrder::Decode => (backward, forward),
        })
    }

    pub fn version(&self) -> DispatcherVersion {
        self.version
    }

    pub fn stripe_size(&self) -> u32 {
        self.stripe_size
    }

    pub fn color_depth(&self) -> u32 {
        self.color_depth
    }

    /// Walks the decode list, propagating capacity from the frame's
    /// declared content capacity (`packet_size`, bit- or byte-aligned
    /// per `symbol_alignment`) down through each stage via
    /// `init_capacity`, and validates that adjacent stages agree on
    /// symbol size, byte-rounded.
    fn calculate_packet_sizes(&mut self) -> Result<(), DispatchError> {
        if self.decode_codecs.is_empty() {
            return Ok(());
        }

        let mut capacity = self.packet_size;
        let mut symbol_bits = 8u32;
        if self.symbol_alignment == SymbolAlignment::Bit {
            symbol_bits = 8;
            capacity /= 8;
        }

        for codec in self.decode_codecs.iter_mut() {
            codec
                .init_capacity(capacity as usize)
                .map_err(|e| DispatchError::CodecConstruction {
                    class_name: codec.name().to_owned(),
                    reason: e.to_string(),
                })?;
            capacity = codec.decoded_data_size() as u32;

            let expected_bytes = (symbol_bits as usize + 7) / 8;
            let actual_bytes = (codec.encoded_symbol_size() + 7) / 8;
            if expected_bytes != actual_bytes {
                return Err(DispatchError::IllegalSymbolSize {
                    codec_name: codec.name(),
                    expected_bytes,
                    actual_bytes,
                });
            }
            symbol_bits = codec.decoded_symbol_size() as u32;
        }

        Ok(())
    }

    /// Runs every stage's `encode` in encode order.
    pub fn encode(&mut self, data: &mut Vec<u8>) -> Result<(), DispatchError> {
        for codec in self.encode_codecs.iter_mut() {
            let decoded_size = codec.decoded_data_size();
            if data.len() > decoded_size && decoded_size != 0 {
                return Err(DispatchError::StageFailed {
                    codec_name: codec.name(),
                    reason: format!(
                        "input of {} bytes exceeds the stage's decoded capacity of {}",
                        data.len(),
                        decoded_size
                    ),
                });
            }
            if data.len() < decoded_size && codec.pre_zero_pad_data() {
                data.resize(decoded_size, 0);
            }
            codec
                .encode(data)
                .map_err(|e| DispatchError::StageFailed {
                    codec_name: codec.name(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Runs every stage's `decode` in decode order, folding per-stage
    /// statistics into the cumulative total. Stops at the first
    /// non-error-correcting failure; continues past error-correcting
    /// failures so cumulative statistics remain meaningful.
    pub fn decode(
        &mut self,
        data: &mut Vec<u8>,
        stats: &mut DecodeStats,
        observer: &dyn CodecObserver,
    ) -> Result<(), DispatchError> {
        for codec in self.decode_codecs.iter_mut() {
            let encoded_size = codec.encoded_data_size();
            if data.len() > encoded_size {
                data.truncate(encoded_size);
            }

            let mut stage_stats = DecodeStats::default();
            let result = codec.decode(data, None, &mut stage_stats, observer);

            if codec.is_error_correcting() {
                stats.unresolved_errors = 0;
            }
            stats.merge(&stage_stats);

            if let Err(e) = result {
                if !codec.is_error_correcting() {
                    return Err(DispatchError::StageFailed {
                        codec_name: codec.name(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Runs `decode` with the chain's `Cipher` stage (if any) keyed by
    /// `cipher_key` for this call only. The stage's prior key property
    /// is saved before the override and restored afterward regardless
    /// of outcome, so the shared dispatcher's state is unchanged by
    /// the time this returns — the per-call-override contract spec.md
    /// §5 describes as a shallow copy of the cipher codec, achieved
    /// here by save/restore rather than a generic `Clone` bound on
    /// every codec.
    pub fn decode_with_cipher_key(
        &mut self,
        data: &mut Vec<u8>,
        cipher_key: u32,
        stats: &mut DecodeStats,
        observer: &dyn CodecObserver,
    ) -> Result<(), DispatchError> {
        use gpf_codecs::PropertyValue;

        let cipher_index = self.decode_codecs.iter().position(|c| c.name() == "Cipher");
        let saved_key = cipher_index.and_then(|i| self.decode_codecs[i].get_property("key"));

        if let Some(i) = cipher_index {
            self.decode_codecs[i]
                .set_property("key", &PropertyValue::Int(cipher_key as i64))
                .map_err(|e| DispatchError::StageFailed {
                    codec_name: self.decode_codecs[i].name(),
                    reason: e.to_string(),
                })?;
        }

        let result = self.decode(data, stats, observer);

        if let Some(i) = cipher_index {
            let restore = saved_key.unwrap_or(PropertyValue::Auto);
            let _ = self.decode_codecs[i].set_property("key", &restore);
        }

        result
    }

    /// Resets per-codec state (LFSR keys aside — key material survives
    /// a reset) across the decode chain.
    pub fn reset(&mut self) {
        for codec in self.decode_codecs.iter_mut() {
            codec.reset();
        }
    }

    pub fn encode_codecs(&self) -> &[Box<dyn Codec>] {
        &self.encode_codecs
    }

    pub fn decode_codecs(&self) -> &[Box<dyn Codec>] {
        &self.decode_codecs
    }

    pub fn decoded_packet_size(&self) -> usize {
        self.decode_codecs
            .last()
            .map(|c| c.decoded_data_size())
            .unwrap_or(0)
    }

    pub fn encoded_packet_size(&self) -> usize {
        self.encode_codecs
            .last()
            .map(|c| c.encoded_data_size())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::ConfigValue;
    use gpf_codecs::{NullObserver, PacketHeader};

    fn basic_config() -> Config {
        let mut config = Config::new();
        config.set(
            "CodecDispatcher",
            "DataCodingScheme",
            ConfigValue::Str("Stage1".to_owned()),
        );
        config.set("Stage1", "codec", ConfigValue::Str("PacketHeader".to_owned()));
        config
    }

    #[test]
    fn trivial_round_trip_no_ecc() {
        let config = basic_config();
        let mut dispatcher = Dispatcher::from_config(&config, 1024 * 8, 2, "DataCodingScheme").unwrap();

        let mut data = b"Hello, World!\n".to_vec();
        dispatcher.encode(&mut data).unwrap();

        let mut stats = DecodeStats::default();
        dispatcher.decode(&mut data, &mut stats, &NullObserver).unwrap();
        assert_eq!(data, b"Hello, World!\n");
        assert_eq!(stats.resolved_errors, 0);
    }

    #[test]
    fn rs_chain_recovers_from_byte_errors() {
        let mut config = Config::new();
        config.set(
            "CodecDispatcher",
            "DataCodingScheme",
            ConfigValue::Str("Stage1,Stage2".to_owned()),
        );
        config.set("Stage1", "codec", ConfigValue::Str("ReedSolomon".to_owned()));
        config.set("Stage1", "messageSize", ConfigValue::Int(32));
        config.set("Stage1", "byteParityNumber", ConfigValue::Int(16));
        config.set("Stage2", "codec", ConfigValue::Str("PacketHeader".to_owned()));

        let mut dispatcher = Dispatcher::from_config(&config, 64 * 8, 2, "DataCodingScheme").unwrap();

        let mut data = (0u8..20).collect::<Vec<u8>>();
        let original = data.clone();
        dispatcher.encode(&mut data).unwrap();

        for &pos in &[0usize, 4, 9] {
            data[pos] ^= 0xFF;
        }

        let mut stats = DecodeStats::default();
        dispatcher.decode(&mut data, &mut stats, &NullObserver).unwrap();
        assert_eq!(data, original);
        assert_eq!(stats.resolved_errors, 3);
    }

    #[test]
    fn crc_mismatch_aborts_chain() {
        let mut config = Config::new();
        config.set(
            "CodecDispatcher",
            "DataCodingScheme",
            ConfigValue::Str("Stage1,Stage2".to_owned()),
        );
        config.set("Stage1", "codec", ConfigValue::Str("CRC32".to_owned()));
        config.set("Stage1", "seed", ConfigValue::Int(0xFFFF_FFFFu32 as i64));
        config.set("Stage1", "polynomial", ConfigValue::Int(0x04C1_1DB7));
        config.set("Stage2", "codec", ConfigValue::Str("PacketHeader".to_owned()));

        let mut dispatcher = Dispatcher::from_config(&config, 64 * 8, 2, "DataCodingScheme").unwrap();
        let mut data = b"Hello!".to_vec();
        dispatcher.encode(&mut data).unwrap();
        data[0] ^= 0xFF;

        let mut stats = DecodeStats::default();
        let result = dispatcher.decode(&mut data, &mut stats, &NullObserver);
        assert!(result.is_err());
    }

    #[test]
    fn illegal_symbol_size_is_rejected_at_construction() {
        let mut config = Config::new();
        config.set(
            "CodecDispatcher",
            "DataCodingScheme",
            ConfigValue::Str("Stage1".to_owned()),
        );
        config.set(
            "Stage1",
            "codec",
            ConfigValue::Str("Interleaving".to_owned()),
        );
        config.set("Stage1", "distance", ConfigValue::Int(4));
        config.set("Stage1", "symbolType", ConfigValue::Str("bit".to_owned()));

        // A lone bit-mode Interleaving stage still passes (its own
        // encoded/decoded symbol size agree); exercised mainly to
        // confirm construction succeeds when the chain is consistent.
        let dispatcher = Dispatcher::from_config(&config, 64 * 8, 2, "DataCodingScheme");
        assert!(dispatcher.is_ok());
    }

    #[test]
    fn legacy_version_is_detected() {
        let mut config = basic_config();
        config.set("CodecDispatcher", "version", ConfigValue::Str("0.9".to_owned()));
        let dispatcher = Dispatcher::from_config(&config, 1024 * 8, 2, "DataCodingScheme").unwrap();
        assert!(dispatcher.version().is_legacy());

        let mut config2 = basic_config();
        config2.set("CodecDispatcher", "version", ConfigValue::Str("1.0".to_owned()));
        let dispatcher2 = Dispatcher::from_config(&config2, 1024 * 8, 2, "DataCodingScheme").unwrap();
        assert!(!dispatcher2.version().is_legacy());
    }

    #[test]
    fn decode_with_cipher_key_overrides_without_mutating_the_dispatcher() {
        let mut config = Config::new();
        config.set(
            "CodecDispatcher",
            "DataCodingScheme",
            ConfigValue::Str("Stage1,Stage2".to_owned()),
        );
        config.set("Stage1", "codec", ConfigValue::Str("Cipher".to_owned()));
        config.set("Stage2", "codec", ConfigValue::Str("PacketHeader".to_owned()));

        let mut dispatcher = Dispatcher::from_config(&config, 64 * 8, 2, "DataCodingScheme").unwrap();

        let mut data = b"per-frame secret".to_vec();
        let original = data.clone();

        // Encode with a known key by reaching into a throwaway encoder
        // built the same way the boxer side would, then decode through
        // the dispatcher using the per-call override.
        let mut encode_config = config.clone();
        encode_config.set("Stage1", "key", ConfigValue::Int(0xABCD));
        let mut encoder = Dispatcher::from_config(&encode_config, 64 * 8, 2, "DataCodingScheme").unwrap();
        encoder.encode(&mut data).unwrap();

        let mut stats = DecodeStats::default();
        dispatcher
            .decode_with_cipher_key(&mut data, 0xABCD, &mut stats, &NullObserver)
            .unwrap();
        assert_eq!(&data[..original.len()], &original[..]);

        // The shared dispatcher's cipher stage must not have retained
        // the override: a second decode without it must fail because
        // no key was ever configured on the instance.
        let mut data2 = original.clone();
        let mut encoder2 = Dispatcher::from_config(&encode_config, 64 * 8, 2, "DataCodingScheme").unwrap();
        encoder2.encode(&mut data2).unwrap();
        let mut stats2 = DecodeStats::default();
        assert!(dispatcher.decode(&mut data2, &mut stats2, &NullObserver).is_err());
    }
}
