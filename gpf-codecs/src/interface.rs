//! The capability interface shared by every block codec in the chain.
//!
//! The original C library dispatches through a struct of function
//! pointers (`boxing_codec`) with a leading-base-struct downcast for
//! each concrete codec. Here that collapses into a single `Codec`
//! trait implemented by each concrete type, held as
//! `Box<dyn Codec>` by the dispatcher — see `gpf-dispatcher`.

use std::error;
use std::fmt;

/// Errors a codec can report from any of its trait methods.
#[derive(Debug)]
pub enum CodecError {
    /// A required property was missing or had the wrong shape.
    MissingProperty { name: &'static str },
    /// A property value was out of range or otherwise unusable.
    InvalidProperty { name: &'static str, reason: String },
    /// `init_capacity` was called with a capacity too small to hold
    /// even one block.
    CapacityTooSmall { capacity: usize, block_size: usize },
    /// `encode` received data that violates a documented precondition
    /// (wrong block alignment, key search exhaustion, etc).
    EncodeFailed { reason: String },
    /// `decode` could not produce valid output (non-error-correcting
    /// stage failure: CRC mismatch, malformed packet header, ...).
    DecodeFailed { reason: String },
}

impl error::Error for CodecError {}
impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodecError::MissingProperty { name } => {
                write!(f, "requires property '{}' to be set", name)
            }
            CodecError::InvalidProperty { name, reason } => {
                write!(f, "property '{}' is invalid: {}", name, reason)
            }
            CodecError::CapacityTooSmall {
                capacity,
                block_size,
            } => write!(
                f,
                "capacity {} is smaller than one block of {} bytes",
                capacity, block_size
            ),
            CodecError::EncodeFailed { reason } => write!(f, "encode failed: {}", reason),
            CodecError::DecodeFailed { reason } => write!(f, "decode failed: {}", reason),
        }
    }
}

/// Accumulated decode metrics, folded across codec stages by the
/// dispatcher. `fec_accumulated_weight`/`fec_accumulated_amount` are
/// ratios (parity/block-size, scaled by how close the worst block came
/// to exhausting its correction capacity), not byte counts —
/// reedsolomon.c:214-215 and bchcodec.c:268-269.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecodeStats {
    pub resolved_errors: u64,
    pub unresolved_errors: u64,
    pub fec_accumulated_weight: f64,
    pub fec_accumulated_amount: f64,
}

impl DecodeStats {
    pub fn merge(&mut self, other: &DecodeStats) {
        self.resolved_errors += other.resolved_errors;
        self.unresolved_errors += other.unresolved_errors;
        self.fec_accumulated_weight += other.fec_accumulated_weight;
        self.fec_accumulated_amount += other.fec_accumulated_amount;
    }
}

/// A late-bound property value, as read from a configuration map.
/// `Auto` models the `"auto"` token substituted by the dispatcher at
/// construction time (bit depth, stripe size, cipher key search).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Point(i64, i64),
    Auto,
}

impl PropertyValue {
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            PropertyValue::Int(value) if *value >= 0 => Some(*value as u64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(value) => Some(value),
            _ => None,
        }
    }
}

/// A typed replacement for the `void *user_data` threaded through
/// every C callback: decode stages report per-block progress through
/// a reference to this trait rather than an untyped pointer.
pub trait CodecObserver {
    fn on_block_decoded(&self, _codec_name: &str, _block_index: usize, _stats: &DecodeStats) {}
}

/// An observer that does nothing, used where the caller supplied none.
pub struct NullObserver;
impl CodecObserver for NullObserver {}

/// One block transform in the codec chain.
///
/// Implementors own their own mutable state (LFSR keys, capacity
/// fields); the dispatcher holds a homogeneous `Vec<Box<dyn Codec>>`
/// and never downcasts.
pub trait Codec {
    fn name(&self) -> &'static str;

    /// Whether this stage corrects errors (vs. merely detects or has
    /// no error concept). Error-correcting stages let the dispatcher
    /// continue past an unresolved failure so cumulative statistics
    /// stay meaningful; non-error-correcting failures abort the chain.
    fn is_error_correcting(&self) -> bool;

    /// Whether short encode inputs are zero-padded up to
    /// `decoded_data_size` before this stage's `encode` runs.
    fn pre_zero_pad_data(&self) -> bool {
        false
    }

    fn encoded_block_size(&self) -> usize;
    fn decoded_block_size(&self) -> usize;
    fn encoded_symbol_size(&self) -> usize;
    fn decoded_symbol_size(&self) -> usize;
    fn encoded_data_size(&self) -> usize;
    fn decoded_data_size(&self) -> usize;

    /// Declares encoded-side capacity and computes the decoded-side
    /// capacity and block sizes consistent with it. Called in decode
    /// order, capacity flowing from the frame's content capacity down
    /// through the chain (`calculate_packet_sizes` in the dispatcher).
    fn init_capacity(&mut self, capacity: usize) -> Result<(), CodecError>;

    /// Clears any per-call state accumulated by a previous encode or
    /// decode (optional; default no-op).
    fn reset(&mut self) {}

    /// Late-binds a property read from metadata (e.g. the recovered
    /// cipher key) after construction.
    fn set_property(&mut self, _name: &str, _value: &PropertyValue) -> Result<(), CodecError> {
        Ok(())
    }

    /// Reads back a previously set property, for codecs that support
    /// it. Used by the dispatcher to save and restore the `Cipher`
    /// stage's key around a per-call override (spec.md §5) without a
    /// generic `Clone` bound on every codec.
    fn get_property(&self, _name: &str) -> Option<PropertyValue> {
        None
    }

    fn encode(&mut self, data: &mut Vec<u8>) -> Result<(), CodecError>;

    fn decode(
        &mut self,
        data: &mut Vec<u8>,
        erasures: Option<&[usize]>,
        stats: &mut DecodeStats,
        observer: &dyn CodecObserver,
    ) -> Result<(), CodecError>;
}
