//! A typed, in-memory stand-in for the two-level `group -> key -> value`
//! configuration map the core consumes (file parsing is out of scope,
//! per spec.md §1).
//!
//! Grounded on the `(group, key) -> value` accessor shape of
//! `examples/original_source/src/config.c`'s `boxing_config_property_*`
//! family, expressed as a plain Rust map rather than an XML-backed
//! object.

use gpf_codecs::PropertyValue;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Str(String),
    Int(i64),
    Point(i64, i64),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_point(&self) -> Option<(i64, i64)> {
        match self {
            ConfigValue::Point(x, y) => Some((*x, *y)),
            _ => None,
        }
    }

    /// Converts to a codec `PropertyValue`, recognizing the literal
    /// token `"auto"` as the late-bound `PropertyValue::Auto` the
    /// dispatcher substitutes at construction time.
    pub fn to_property(&self) -> PropertyValue {
        match self {
            ConfigValue::Str(value) if value == "auto" => PropertyValue::Auto,
            ConfigValue::Str(value) => PropertyValue::Str(value.clone()),
            ConfigValue::Int(value) => PropertyValue::Int(*value),
            ConfigValue::Point(x, y) => PropertyValue::Point(*x, *y),
        }
    }
}

/// A `group -> key -> value` configuration map.
#[derive(Debug, Clone, Default)]
pub struct Config {
    groups: HashMap<String, HashMap<String, ConfigValue>>,
}

impl Config {
    pub fn new() -> Self {
        Config {
            groups: HashMap::new(),
        }
    }

    pub fn set(&mut self, group: &str, key: &str, value: ConfigValue) -> &mut Self {
        self.groups
            .entry(group.to_owned())
            .or_insert_with(HashMap::new)
            .insert(key.to_owned(), value);
        self
    }

    pub fn is_set(&self, group: &str, key: &str) -> bool {
        self.groups
            .get(group)
            .map(|g| g.contains_key(key))
            .unwrap_or(false)
    }

    pub fn get(&self, group: &str, key: &str) -> Option<&ConfigValue> {
        self.groups.get(group)?.get(key)
    }

    pub fn string(&self, group: &str, key: &str) -> Option<&str> {
        self.get(group, key)?.as_str()
    }

    pub fn int(&self, group: &str, key: &str) -> Option<i64> {
        self.get(group, key)?.as_int()
    }

    pub fn uint(&self, group: &str, key: &str) -> Option<u64> {
        self.int(group, key).filter(|v| *v >= 0).map(|v| v as u64)
    }

    pub fn point(&self, group: &str, key: &str) -> Option<(i64, i64)> {
        self.get(group, key)?.as_point()
    }

    /// Properties of a single group, as a `name -> PropertyValue` map
    /// suitable for handing to a codec factory.
    pub fn properties(&self, group: &str) -> HashMap<String, PropertyValue> {
        self.groups
            .get(group)
            .map(|g| {
                g.iter()
                    .map(|(k, v)| (k.clone(), v.to_property()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Splits a comma-separated list property into trimmed elements,
    /// matching `boxing_config_parse_list_properties`.
    pub fn list(&self, group: &str, key: &str) -> Vec<String> {
        match self.string(group, key) {
            Some(value) => value.split(',').map(|s| s.trim().to_owned()).collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_round_trip() {
        let mut config = Config::new();
        config.set("FrameFormat", "width", ConfigValue::Int(2480));
        assert_eq!(config.int("FrameFormat", "width"), Some(2480));
        assert!(config.is_set("FrameFormat", "width"));
        assert!(!config.is_set("FrameFormat", "height"));
    }

    #[test]
    fn list_splits_on_comma() {
        let mut config = Config::new();
        config.set(
            "CodecDispatcher",
            "DataCodingScheme",
            ConfigValue::Str("ReedSolomon, PacketHeader".to_owned()),
        );
        assert_eq!(
            config.list("CodecDispatcher", "DataCodingScheme"),
            vec!["ReedSolomon".to_owned(), "PacketHeader".to_owned()]
        );
    }

    #[test]
    fn auto_token_becomes_property_auto() {
        let mut config = Config::new();
        config.set("X", "NumBitsPerPixel", ConfigValue::Str("auto".to_owned()));
        assert_eq!(
            config.properties("X").get("NumBitsPerPixel"),
            Some(&PropertyValue::Auto)
        );
    }
}
