//! Top-level orchestration (spec.md §4.5, §7): composes the frame
//! tracker, sampler/quantizer, metadata TLV codec and codec chain into
//! the two-phase decode (`extract` then `decode`) and the symmetric
//! encode path.
//!
//! Grounded on `examples/original_source/src/unboxer.c` (the extract/
//! decode phase split, result-code enumeration, and the "extract can
//! fail softly so striped recovery still runs the decode phase" policy)
//! and `examples/original_source/src/unboxer/unboxerv1.c`
//! (`dunboxerv1_load_data_from_image`'s SymbolsPerPixel/ContentSymbolSize
//! metadata lookups, and `extract_digital_content`'s `quantize_data`
//! flag), adapted from the teacher's `jpeg2000` orchestration binary's
//! shape (minus its CLI/file I/O, which stays out of scope per spec.md
//! §1) for a library entry point rather than a `main.rs`.

use std::error;
use std::fmt;

use gpf_codecs::{DecodeStats, NullObserver};
use gpf_dispatcher::config::Config;
use gpf_dispatcher::{DispatchError, Dispatcher};
use gpf_frame::{FrameError, FrameFormatParams, FrameFormatVersion, FrameLayout};
use gpf_metadata::{MetadataList, MetadataType, MetadataValue};
use gpf_primitives::{htobe32, Crc32, Crc64, GrayImage};
use gpf_sampler::{
    apply_lut, calibration_lut, pack_symbols_msb_first, quantize_tiles, sample_grid,
    sharpen_content, unpack_symbols_msb_first,
};
use gpf_tracker::{Tracker, TrackerFlags};
use log::{debug, warn};

#[derive(Debug)]
pub enum UnboxError {
    Frame(FrameError),
    Dispatch(DispatchError),
    /// `FrameFormat.type` named something other than a known GPF 1.x
    /// version token.
    UnknownFrameFormat { type_name: String },
}

impl error::Error for UnboxError {}
impl fmt::Display for UnboxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnboxError::Frame(e) => write!(f, "frame layout error: {}", e),
            UnboxError::Dispatch(e) => write!(f, "dispatcher error: {}", e),
            UnboxError::UnknownFrameFormat { type_name } => {
                write!(f, "unknown FrameFormat type '{}'", type_name)
            }
        }
    }
}

impl From<FrameError> for UnboxError {
    fn from(e: FrameError) -> Self {
        UnboxError::Frame(e)
    }
}

impl From<DispatchError> for UnboxError {
    fn from(e: DispatchError) -> Self {
        UnboxError::Dispatch(e)
    }
}

/// Outcome of the extract phase: tracking, metadata sampling and TLV
/// decode. Per spec.md §7, extract can fail "softly" — the data
/// container is zero-filled and the decode phase still runs, so
/// striped multi-frame data can be recovered from the frames that do
/// extract cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractResult {
    Ok,
    BorderTrackingFailed,
    MetadataError,
}

/// Outcome of the decode phase: the codec chain plus the end-to-end
/// digest check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeResult {
    Ok,
    DataDecodeError,
    CrcMismatch,
}

/// Everything one call to `Unboxer::decode_frame` recovers: both phase
/// result codes (spec.md §7: "callers inspect both"), the decoded
/// bytes (zero-length on hard failure), the parsed metadata, and the
/// accumulated codec statistics.
#[derive(Debug)]
pub struct UnboxOutput {
    pub extract_result: ExtractResult,
    pub decode_result: DecodeResult,
    pub data: Vec<u8>,
    pub metadata: MetadataList,
    pub stats: DecodeStats,
}

/// Content symbol arrays produced by the encode path, ready for the
/// frame-graphics collaborator to render (spec.md §1, §4.5).
#[derive(Debug)]
pub struct BoxOutput {
    pub content_symbols: Vec<u8>,
    pub content_columns: usize,
    pub content_rows: usize,
    /// One entry per metadata bit, in the column-major cell order the
    /// metadata bar renders in (spec.md §4.4's wire stream, reshaped
    /// onto the bar's tile grid).
    pub metadata_bits: Vec<u8>,
    pub metadata_columns: usize,
    pub metadata_rows: usize,
}

/// Bits needed to represent `levels` distinct symbol values,
/// replicating `Dispatcher::from_config`'s inline `color_depth` loop
/// so a content/metadata capacity in bits can be computed before the
/// dispatcher exists.
fn bits_for_levels(levels: u32) -> u32 {
    let mut depth = 0u32;
    let mut remaining = levels.saturating_sub(1);
    while remaining > 0 {
        depth += 1;
        remaining >>= 1;
    }
    depth.max(1)
}

/// Packs analog content (spec.md §4.5 step 6): LUT-corrected (or raw,
/// if no calibration bar was tracked) samples followed by the sampled
/// grid's width and height as two big-endian `u32`s, mirroring
/// `extract_analog_content`'s trailing dimensions in
/// `examples/original_source/src/unboxer/unboxerv1.c`.
fn pack_analog_content(sampled: &GrayImage, lut: Option<&[u8]>) -> Vec<u8> {
    let mut raw: Vec<u8> = match lut {
        Some(lut) => sampled.pixels().iter().map(|&value| apply_lut(lut, value)).collect(),
        None => sampled.pixels().to_vec(),
    };
    raw.extend_from_slice(&htobe32(sampled.width() as u32));
    raw.extend_from_slice(&htobe32(sampled.height() as u32));
    raw
}

/// Owns the frame layout and both dispatchers (data, metadata) for
/// the lifetime of a decoding/boxing session. A `Dispatcher` is not
/// reentrant (spec.md §5), so this type is not `Sync` across
/// concurrent calls either.
pub struct Unboxer {
    layout: FrameLayout,
    data_dispatcher: Dispatcher,
    metadata_dispatcher: Dispatcher,
    content_symbol_bits: u32,
    content_tile: usize,
    metadata_tile: usize,
    legacy_crc32: Crc32,
    crc64: Crc64,
    pre_filter: bool,
}

impl Unboxer {
    /// Builds an unboxer for the `FrameFormat`/`CodecDispatcher`
    /// groups of `config` (spec.md §6). `config` must additionally
    /// name `DataCodingScheme` and `MetadataCodingScheme`.
    pub fn new(config: &Config) -> Result<Self, UnboxError> {
        let version_name = config
            .string("FrameFormat", "type")
            .unwrap_or("GPFv1.0");
        let version = FrameFormatVersion::parse(version_name).ok_or_else(|| {
            UnboxError::UnknownFrameFormat {
                type_name: version_name.to_owned(),
            }
        })?;

        let params = FrameFormatParams {
            width: config.int("FrameFormat", "width").unwrap_or(2480) as i32,
            height: config.int("FrameFormat", "height").unwrap_or(3508) as i32,
            border: config.int("FrameFormat", "border").unwrap_or(4) as i32,
            border_gap: config.int("FrameFormat", "borderGap").unwrap_or(2) as i32,
            corner_mark_size: config.int("FrameFormat", "cornerMarkSize").unwrap_or(96) as i32,
            corner_mark_gap: config.int("FrameFormat", "cornerMarkGap").unwrap_or(8) as i32,
            tiles_per_column: config.int("FrameFormat", "tilesPerColumn").unwrap_or(4) as i32,
            max_levels_per_symbol: config
                .int("FrameFormat", "maxLevelsPerSymbol")
                .unwrap_or(2) as i32,
            reference_bar_freq_divider: config
                .int("FrameFormat", "referenceBarFreqDivider")
                .unwrap_or(8) as i32,
            analog_content_symbol_size: config
                .int("FrameFormat", "analogContentSymbolSize")
                .unwrap_or(4) as i32,
            digital_content_symbol_size: config
                .int("FrameFormat", "digitalContentSymbolSize")
                .unwrap_or(4) as i32,
            reference_bar_sync_distance: config
                .int("FrameFormat", "refBarSyncDistance")
                .unwrap_or(16) as i32,
            reference_bar_sync_offset: config
                .int("FrameFormat", "refBarSyncOffset")
                .unwrap_or(0) as i32,
        };

        let layout = FrameLayout::for_version(version, params)?;
        debug!("unboxer built for {:?} ({}x{})", version, params.width, params.height);

        let metadata_tile = layout.metadata_tile_size.x.max(1) as usize;
        let metadata_columns = layout.metadata_bar.size.x as usize / metadata_tile;
        let metadata_rows = layout.metadata_bar.size.y as usize / metadata_tile;
        let metadata_capacity_bits = (metadata_columns * metadata_rows) as u32;

        let content_tile = params.digital_content_symbol_size.max(1) as usize;
        let content_columns = layout.content_container.size.x as usize / content_tile;
        let content_rows = layout.content_container.size.y as usize / content_tile;
        let content_symbol_bits = bits_for_levels(layout.max_levels_per_symbol() as u32);
        let content_capacity_bits = (content_columns * content_rows) as u32 * content_symbol_bits;

        let metadata_dispatcher =
            Dispatcher::from_config(config, metadata_capacity_bits, 2, "MetadataCodingScheme")?;
        let data_dispatcher = Dispatcher::from_config(
            config,
            content_capacity_bits,
            layout.max_levels_per_symbol() as u32,
            "DataCodingScheme",
        )?;

        // Not part of spec.md §6's configuration table (the adaptive
        // sharpening pre-filter is an `unboxer->parameters` field in
        // `original_source/src/unboxer/unboxerv1.c`, not a config-file
        // key), but exposed the same way other ambient knobs are:
        // absent defaults to off, matching a caller that never enables
        // it.
        let pre_filter = config.int("FrameFormat", "preFilter").unwrap_or(0) != 0;

        Ok(Unboxer {
            layout,
            data_dispatcher,
            metadata_dispatcher,
            content_symbol_bits,
            content_tile,
            metadata_tile,
            legacy_crc32: Crc32::new(0xFFFF_FFFF, 0x04C1_1DB7),
            crc64: Crc64::new(),
            pre_filter,
        })
    }

    fn metadata_grid(&self) -> (usize, usize) {
        let columns = self.layout.metadata_bar.size.x as usize / self.metadata_tile.max(1);
        let rows = self.layout.metadata_bar.size.y as usize / self.metadata_tile.max(1);
        (columns, rows)
    }

    fn content_grid(&self) -> (usize, usize) {
        let columns = self.layout.content_container.size.x as usize / self.content_tile.max(1);
        let rows = self.layout.content_container.size.y as usize / self.content_tile.max(1);
        (columns, rows)
    }

    /// Decodes one scanned frame end to end (spec.md §4.5 decode
    /// path). `simulated` disables the tracker's photographed-input
    /// filters (spec.md §3 tracker state bitflags).
    pub fn decode_frame(&mut self, image: &GrayImage, simulated: bool) -> UnboxOutput {
        let mut flags = TrackerFlags::default();
        flags.simulated = simulated;

        let tracker = Tracker::new(&self.layout);
        let tracked = tracker.track(image, flags);

        let (extract_border_ok, output) = match tracked {
            Ok(output) => (true, Some(output)),
            Err(e) => {
                warn!("extract phase: tracking failed: {}", e);
                (false, None)
            }
        };

        let (metadata_columns, metadata_rows) = self.metadata_grid();
        let (content_columns, content_rows) = self.content_grid();

        let mut extract_result = if extract_border_ok {
            ExtractResult::Ok
        } else {
            ExtractResult::BorderTrackingFailed
        };

        // Metadata: sample at 1 bit/pixel, traversing the bar's cells
        // column-major to match the wire stream's bit order (spec.md
        // §4.4), then run the metadata dispatcher's decode chain.
        let metadata_bit_image = output
            .as_ref()
            .map(|t| sample_grid(&t.metadata, image, metadata_columns, metadata_rows));
        let metadata_bits: Vec<u8> = match &metadata_bit_image {
            Some(sampled) => {
                let levels = quantize_tiles(sampled, sampled.width(), sampled.height(), 2);
                let mut bits = Vec::with_capacity(metadata_columns * metadata_rows);
                for col in 0..metadata_columns {
                    for row in 0..metadata_rows {
                        bits.push(levels[row * metadata_columns + col]);
                    }
                }
                bits
            }
            None => vec![0u8; metadata_columns * metadata_rows],
        };

        // Border tracking already failed: there is no real geometry to
        // sample metadata from, so the metadata stage is skipped rather
        // than layered on top with its own (necessarily spurious)
        // failure, preserving `BorderTrackingFailed` as the reported
        // extract result.
        let metadata_list = if output.is_none() {
            MetadataList::new()
        } else {
            let mut metadata_bytes = pack_symbols_msb_first(&metadata_bits, 1);
            let mut metadata_stats = DecodeStats::default();
            if self
                .metadata_dispatcher
                .decode(&mut metadata_bytes, &mut metadata_stats, &NullObserver)
                .is_err()
            {
                extract_result = ExtractResult::MetadataError;
                MetadataList::new()
            } else if self.metadata_dispatcher.version().is_legacy() {
                if metadata_bytes.len() < 4 {
                    extract_result = ExtractResult::MetadataError;
                    MetadataList::new()
                } else {
                    let (body, trailer) = metadata_bytes.split_at(metadata_bytes.len() - 4);
                    let trailer_crc = gpf_primitives::betoh32(trailer);
                    let computed = self.legacy_crc32.calc(body);
                    if computed != trailer_crc {
                        extract_result = ExtractResult::MetadataError;
                        MetadataList::new()
                    } else {
                        match MetadataList::deserialize(body) {
                            Ok((list, _)) => list,
                            Err(e) => {
                                warn!("extract phase: metadata parse failed: {}", e);
                                extract_result = ExtractResult::MetadataError;
                                MetadataList::new()
                            }
                        }
                    }
                }
            } else {
                match MetadataList::deserialize(&metadata_bytes) {
                    Ok((list, _)) => list,
                    Err(e) => {
                        warn!("extract phase: metadata parse failed: {}", e);
                        extract_result = ExtractResult::MetadataError;
                        MetadataList::new()
                    }
                }
            }
        };

        let bits_per_symbol = metadata_list
            .get(MetadataType::SymbolsPerPixel)
            .and_then(|item| match &item.value {
                MetadataValue::U16(v) => Some(*v as u32),
                _ => None,
            })
            .unwrap_or(self.content_symbol_bits);

        // Content type (spec.md §4.5 step 6): `Visual` content is
        // analog (a calibration-bar LUT plus raw samples); everything
        // else, including a missing item, is digital.
        let is_analog = matches!(
            metadata_list.get(MetadataType::ContentType).map(|item| &item.value),
            Some(MetadataValue::U16(3))
        );

        // Optional adaptive sharpening pre-filter (spec.md §4.5 step 5):
        // estimate MTF from the calibration bar's cell contrast, then
        // sharpen the tracked image before sampling content. Analog
        // content is only ever denoised with the fixed kernel; digital
        // content is unsharp-masked with a mix factor scaled by the
        // inverse MTF.
        let sharpened_image = if self.pre_filter && output.is_some() {
            let mtf = output
                .as_ref()
                .and_then(|t| t.mtf)
                .map(|m| m.horizontal.max(m.vertical))
                .unwrap_or(1.0);
            Some(sharpen_content(image, mtf, is_analog))
        } else {
            None
        };
        let working_image: &GrayImage = sharpened_image.as_ref().unwrap_or(image);

        // Content: sample at the derived bit depth; digital content
        // quantizes over 32x32 tiles, analog content is returned as
        // LUT-corrected raw samples (spec.md §4.3, §4.5 step 6).
        let content_image = output
            .as_ref()
            .map(|t| sample_grid(&t.content, working_image, content_columns, content_rows));

        let content_bytes_in = if is_analog {
            let sampled = content_image.unwrap_or_else(|| GrayImage::new(content_columns, content_rows));
            let lut = output.as_ref().and_then(|t| t.calibration.as_ref()).map(|calibration| {
                let calibration_strip = sample_grid(calibration, working_image, 32, 1);
                calibration_lut(calibration_strip.pixels())
            });
            pack_analog_content(&sampled, lut.as_deref())
        } else {
            let levels = 1u32 << bits_per_symbol;
            let content_symbols = match &content_image {
                Some(sampled) => quantize_tiles(sampled, 32, 32, levels),
                None => vec![0u8; content_columns * content_rows],
            };
            pack_symbols_msb_first(&content_symbols, bits_per_symbol as usize)
        };

        let mut data = content_bytes_in;
        let mut stats = DecodeStats::default();
        let decode_chain_result = match metadata_list.get(MetadataType::CipherKey) {
            Some(item) => match &item.value {
                MetadataValue::U32(key) => {
                    self.data_dispatcher.decode_with_cipher_key(&mut data, *key, &mut stats, &NullObserver)
                }
                _ => self.data_dispatcher.decode(&mut data, &mut stats, &NullObserver),
            },
            None => self.data_dispatcher.decode(&mut data, &mut stats, &NullObserver),
        };

        let mut decode_result = if decode_chain_result.is_err() {
            DecodeResult::DataDecodeError
        } else {
            DecodeResult::Ok
        };

        if decode_result == DecodeResult::Ok {
            if let Some(item) = metadata_list.get(MetadataType::DataSize) {
                if let MetadataValue::U32(size) = &item.value {
                    data.truncate(*size as usize);
                }
            }
            if let Some(item) = metadata_list.get(MetadataType::DataCrc) {
                if let MetadataValue::U64(expected) = &item.value {
                    let actual = self.crc64.calc(&data);
                    if actual != *expected {
                        decode_result = DecodeResult::CrcMismatch;
                    }
                }
            }
        }

        UnboxOutput {
            extract_result,
            decode_result,
            data,
            metadata: metadata_list,
            stats,
        }
    }

    /// Encodes `data` and `metadata` into content/metadata symbol
    /// arrays, the symmetric composition of the decode path (spec.md
    /// §4.5 encode path). Rendering those arrays into frame graphics
    /// is the out-of-scope graphics collaborator's job (spec.md §1).
    pub fn box_frame(&mut self, data: &[u8], metadata: &MetadataList) -> Result<BoxOutput, UnboxError> {
        let (content_columns, content_rows) = self.content_grid();
        let (metadata_columns, metadata_rows) = self.metadata_grid();

        let mut content_bytes = data.to_vec();
        self.data_dispatcher.encode(&mut content_bytes)?;
        let content_symbol_count = content_columns * content_rows;
        let content_symbols =
            unpack_symbols_msb_first(&content_bytes, self.content_symbol_bits as usize, content_symbol_count);

        let mut metadata_bytes = metadata.serialize();
        self.metadata_dispatcher.encode(&mut metadata_bytes)?;
        let metadata_bit_count = metadata_columns * metadata_rows;
        let metadata_bits = unpack_symbols_msb_first(&metadata_bytes, 1, metadata_bit_count);

        Ok(BoxOutput {
            content_symbols,
            content_columns,
            content_rows,
            metadata_bits,
            metadata_columns,
            metadata_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpf_dispatcher::config::ConfigValue;

    fn base_config() -> Config {
        let mut config = Config::new();
        config.set("FrameFormat", "type", ConfigValue::Str("GPFv1.0".to_owned()));
        config.set("FrameFormat", "width", ConfigValue::Int(400));
        config.set("FrameFormat", "height", ConfigValue::Int(300));
        config.set("FrameFormat", "border", ConfigValue::Int(2));
        config.set("FrameFormat", "borderGap", ConfigValue::Int(1));
        config.set("FrameFormat", "cornerMarkSize", ConfigValue::Int(24));
        config.set("FrameFormat", "cornerMarkGap", ConfigValue::Int(2));
        config.set("FrameFormat", "tilesPerColumn", ConfigValue::Int(2));
        config.set("FrameFormat", "maxLevelsPerSymbol", ConfigValue::Int(2));
        config.set("FrameFormat", "referenceBarFreqDivider", ConfigValue::Int(8));
        config.set("FrameFormat", "analogContentSymbolSize", ConfigValue::Int(4));
        config.set("FrameFormat", "digitalContentSymbolSize", ConfigValue::Int(4));
        config.set("FrameFormat", "refBarSyncDistance", ConfigValue::Int(16));
        config.set("FrameFormat", "refBarSyncOffset", ConfigValue::Int(0));

        config.set(
            "CodecDispatcher",
            "DataCodingScheme",
            ConfigValue::Str("DataStage".to_owned()),
        );
        config.set("DataStage", "codec", ConfigValue::Str("PacketHeader".to_owned()));

        config.set(
            "CodecDispatcher",
            "MetadataCodingScheme",
            ConfigValue::Str("MetaStage".to_owned()),
        );
        config.set("MetaStage", "codec", ConfigValue::Str("PacketHeader".to_owned()));

        config
    }

    #[test]
    fn builds_from_a_minimal_configuration() {
        let config = base_config();
        assert!(Unboxer::new(&config).is_ok());
    }

    #[test]
    fn decode_frame_soft_fails_on_a_blank_image() {
        let config = base_config();
        let mut unboxer = Unboxer::new(&config).unwrap();
        let image = GrayImage::new(400, 300);
        let output = unboxer.decode_frame(&image, false);
        assert_eq!(output.extract_result, ExtractResult::BorderTrackingFailed);
    }

    #[test]
    fn box_frame_produces_symbol_arrays_sized_to_the_content_grid() {
        let config = base_config();
        let mut unboxer = Unboxer::new(&config).unwrap();
        let data = b"hello".to_vec();
        let metadata = MetadataList::new();
        let output = unboxer.box_frame(&data, &metadata).unwrap();
        assert_eq!(
            output.content_symbols.len(),
            output.content_columns * output.content_rows
        );
        assert_eq!(
            output.metadata_bits.len(),
            output.metadata_columns * output.metadata_rows
        );
    }

    #[test]
    fn bits_for_levels_matches_dispatcher_color_depth() {
        assert_eq!(bits_for_levels(2), 1);
        assert_eq!(bits_for_levels(4), 2);
        assert_eq!(bits_for_levels(6), 3);
    }

    #[test]
    fn unboxer_defaults_the_sharpening_pre_filter_to_off() {
        let config = base_config();
        let unboxer = Unboxer::new(&config).unwrap();
        assert!(!unboxer.pre_filter);
    }

    #[test]
    fn unboxer_honors_an_explicit_pre_filter_flag() {
        let mut config = base_config();
        config.set("FrameFormat", "preFilter", ConfigValue::Int(1));
        let unboxer = Unboxer::new(&config).unwrap();
        assert!(unboxer.pre_filter);
    }

    #[test]
    fn pack_analog_content_round_trips_through_a_lut() {
        let sampled = GrayImage::from_pixels(2, 1, vec![10, 250]);
        let mut lut = vec![0u8; 256];
        for (value, slot) in lut.iter_mut().enumerate() {
            *slot = value as u8;
        }
        lut[10] = 99;
        let packed = pack_analog_content(&sampled, Some(&lut));
        assert_eq!(&packed[..2], &[99, 250]);
        assert_eq!(&packed[2..6], &htobe32(2));
        assert_eq!(&packed[6..10], &htobe32(1));
    }

    #[test]
    fn pack_analog_content_falls_back_to_raw_samples_without_a_lut() {
        let sampled = GrayImage::from_pixels(2, 1, vec![10, 250]);
        let packed = pack_analog_content(&sampled, None);
        assert_eq!(&packed[..2], &[10, 250]);
    }
}
