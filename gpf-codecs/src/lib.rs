//! The seven concrete block codecs of the GPF codec chain, each
//! implementing the `Codec` capability interface so `gpf-dispatcher`
//! can hold a homogeneous `Vec<Box<dyn Codec>>` regardless of concrete
//! kind.
//!
//! Grounded on `original_source/src/codecs/*.c`, one module per codec;
//! `gf` holds the `GF(2^d)` engine shared by `ReedSolomon` and `Bch`.

#![allow(dead_code)]

pub mod bch;
pub mod cipher;
pub mod crc32_codec;
pub mod gf;
pub mod interface;
pub mod interleaving;
pub mod packet_header;
pub mod reed_solomon;
pub mod sync_point_inserter;

pub use bch::Bch;
pub use cipher::Cipher;
pub use crc32_codec::Crc32Codec;
pub use interface::{Codec, CodecError, CodecObserver, DecodeStats, NullObserver, PropertyValue};
pub use interleaving::Interleaving;
pub use packet_header::PacketHeader;
pub use reed_solomon::ReedSolomon;
pub use sync_point_inserter::{DataOrientation, SyncPointInserter};
