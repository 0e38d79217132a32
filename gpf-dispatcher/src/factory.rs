//! Instantiates a concrete `Codec` from a class name plus a property
//! map, substituting late-bound `"auto"` tokens first. Grounded on
//! `original_source/src/codecs/codecdispatcher.c`'s `initialize`,
//! which looks up `boxing_codec_create(codec_name, properties, config)`
//! for each configured coding-scheme entry.

use crate::DispatchError;
use gpf_codecs::{Bch, Cipher, Codec, Crc32Codec, DataOrientation, Interleaving, PacketHeader, PropertyValue, ReedSolomon, SyncPointInserter};
use std::collections::HashMap;

fn require_uint(
    properties: &HashMap<String, PropertyValue>,
    name: &'static str,
) -> Result<u64, DispatchError> {
    properties
        .get(name)
        .and_then(|v| v.as_uint())
        .ok_or(DispatchError::MissingProperty { name })
}

fn optional_uint(properties: &HashMap<String, PropertyValue>, name: &str) -> Option<u64> {
    properties.get(name).and_then(|v| v.as_uint())
}

fn require_str<'a>(
    properties: &'a HashMap<String, PropertyValue>,
    name: &'static str,
) -> Result<&'a str, DispatchError> {
    properties
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or(DispatchError::MissingProperty { name })
}

/// Builds one codec instance, resolving `resolved_color_depth` for any
/// `"auto"`-valued `NumBitsPerPixel` property (substituted by the
/// dispatcher from the frame's modulation depth before construction).
pub fn build_codec(
    class_name: &str,
    properties: &HashMap<String, PropertyValue>,
    resolved_color_depth: u32,
) -> Result<Box<dyn Codec>, DispatchError> {
    match class_name {
        "ReedSolomon" => {
            let message_size = require_uint(properties, "messageSize")? as usize;
            let parity = require_uint(properties, "byteParityNumber")? as usize;
            let codec = ReedSolomon::new(message_size, parity)
                .map_err(|e| DispatchError::CodecConstruction {
                    class_name: class_name.to_owned(),
                    reason: e.to_string(),
                })?;
            Ok(Box::new(codec))
        }
        "BCH" => {
            let message_size = require_uint(properties, "messageSize")? as usize;
            let parity = require_uint(properties, "byteParityNumber")? as usize;
            let codec = Bch::new(message_size, parity).map_err(|e| DispatchError::CodecConstruction {
                class_name: class_name.to_owned(),
                reason: e.to_string(),
            })?;
            Ok(Box::new(codec))
        }
        "CRC32" => {
            let seed = optional_uint(properties, "seed").unwrap_or(0xFFFF_FFFF) as u32;
            let polynomial = optional_uint(properties, "polynomial").unwrap_or(0x04C1_1DB7) as u32;
            Ok(Box::new(Crc32Codec::new(seed, polynomial)))
        }
        "Cipher" => {
            let mut codec = Cipher::new();
            if let Some(value) = properties.get("key") {
                codec
                    .set_property("key", value)
                    .map_err(|e| DispatchError::CodecConstruction {
                        class_name: class_name.to_owned(),
                        reason: e.to_string(),
                    })?;
            }
            Ok(Box::new(codec))
        }
        "Interleaving" => {
            let depth = require_uint(properties, "distance")? as usize;
            let symbol_type = properties
                .get("symbolType")
                .and_then(|v| v.as_str())
                .unwrap_or("byte");
            let symbol_size_bits = match symbol_type {
                "bit" => 1,
                "byte" => 8,
                other => {
                    return Err(DispatchError::InvalidProperty {
                        name: "symbolType",
                        reason: format!("unknown symbol type '{}'", other),
                    })
                }
            };
            let codec = Interleaving::new(depth, symbol_size_bits).map_err(|e| {
                DispatchError::CodecConstruction {
                    class_name: class_name.to_owned(),
                    reason: e.to_string(),
                }
            })?;
            Ok(Box::new(codec))
        }
        "PacketHeader" => Ok(Box::new(PacketHeader::new())),
        "SyncPointInserter" => {
            let (image_width, image_height) = properties
                .get("ImageSizePixel")
                .and_then(|v| match v {
                    PropertyValue::Point(x, y) => Some((*x as usize, *y as usize)),
                    _ => None,
                })
                .ok_or(DispatchError::MissingProperty {
                    name: "ImageSizePixel",
                })?;
            let radius = require_uint(properties, "SyncPointRadiusPixel")? as usize;
            let h_distance = optional_uint(properties, "SyncPointHDistancePixel")
                .or_else(|| optional_uint(properties, "SyncPointDistancePixel"))
                .ok_or(DispatchError::MissingProperty {
                    name: "SyncPointDistancePixel",
                })? as usize;
            let v_distance = optional_uint(properties, "SyncPointVDistancePixel")
                .or_else(|| optional_uint(properties, "SyncPointDistancePixel"))
                .ok_or(DispatchError::MissingProperty {
                    name: "SyncPointDistancePixel",
                })? as usize;
            let h_offset = optional_uint(properties, "SyncPointHOffsetPixel").map(|v| v as usize);
            let v_offset = optional_uint(properties, "SyncPointVOffsetPixel").map(|v| v as usize);
            let orientation = match require_str(properties, "DataOrientation")? {
                "horizontal" => DataOrientation::Horizontal,
                "vertical" => DataOrientation::Vertical,
                other => {
                    return Err(DispatchError::InvalidProperty {
                        name: "DataOrientation",
                        reason: format!("unknown orientation '{}'", other),
                    })
                }
            };
            let bits_per_pixel = match properties.get("NumBitsPerPixel") {
                Some(PropertyValue::Auto) | None => resolved_color_depth as usize,
                Some(value) => value.as_uint().ok_or(DispatchError::InvalidProperty {
                    name: "NumBitsPerPixel",
                    reason: "expected an unsigned integer or \"auto\"".to_owned(),
                })? as usize,
            };
            let mut codec = SyncPointInserter::new(
                image_width,
                image_height,
                radius,
                h_distance,
                v_distance,
                h_offset,
                v_offset,
                orientation,
                bits_per_pixel,
            )
            .map_err(|e| DispatchError::CodecConstruction {
                class_name: class_name.to_owned(),
                reason: e.to_string(),
            })?;
            if let Some(value) = optional_uint(properties, "ValueSyncPointBackground") {
                codec
                    .set_property(
                        "ValueSyncPointBackground",
                        &PropertyValue::Int(value as i64),
                    )
                    .ok();
            }
            if let Some(value) = optional_uint(properties, "ValueSyncPointForeground") {
                codec
                    .set_property(
                        "ValueSyncPointForeground",
                        &PropertyValue::Int(value as i64),
                    )
                    .ok();
            }
            Ok(Box::new(codec))
        }
        other => Err(DispatchError::UnknownCodec {
            class_name: other.to_owned(),
        }),
    }
}
