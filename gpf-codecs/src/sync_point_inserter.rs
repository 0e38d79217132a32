//! SyncPointInserter codec: interleaves fixed sync-point cells (used by
//! the frame tracker for phase recovery) into a 2D symbol array on
//! encode, and strips them back out on decode.
//!
//! Grounded on `original_source/src/codecs/syncpointinserter.c`: a
//! per-pixel background/foreground mask is precomputed once from the
//! sync-point grid geometry (`update_syncpointmasks`), then encode/
//! decode walk the image in the declared `DataOrientation` scan order,
//! writing/skipping masked cells. One symbol occupies one `u8` slot
//! here (as in the C source's `gvector` of `char`), not a packed bit;
//! the dispatcher is responsible for any bit packing once this stage's
//! symbol size is taken into account.

use crate::interface::{Codec, CodecError, CodecObserver, DecodeStats, PropertyValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrientation {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy)]
struct SyncPointCenter {
    x: i64,
    y: i64,
}

pub struct SyncPointInserter {
    image_width: usize,
    image_height: usize,
    radius: usize,
    h_distance: usize,
    v_distance: usize,
    h_offset: Option<usize>,
    v_offset: Option<usize>,
    orientation: DataOrientation,
    background_level: u8,
    foreground_level: u8,
    bits_per_pixel: usize,

    /// `true` where a cell is a sync-point *area* cell (the radius
    /// square minus the exact center), `false` elsewhere.
    background_mask: Vec<bool>,
    /// `true` at exactly each sync-point center.
    foreground_mask: Vec<bool>,
    sync_point_cell_count: usize,

    capacity: usize,
    decoded_capacity: usize,
}

impl SyncPointInserter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        image_width: usize,
        image_height: usize,
        radius: usize,
        h_distance: usize,
        v_distance: usize,
        h_offset: Option<usize>,
        v_offset: Option<usize>,
        orientation: DataOrientation,
        bits_per_pixel: usize,
    ) -> Result<Self, CodecError> {
        if h_distance == 0 || v_distance == 0 {
            return Err(CodecError::InvalidProperty {
                name: "SyncPointDistancePixel",
                reason: "sync point distance must be at least 1".to_owned(),
            });
        }
        let mut codec = SyncPointInserter {
            image_width,
            image_height,
            radius,
            h_distance,
            v_distance,
            h_offset,
            v_offset,
            orientation,
            background_level: 0,
            foreground_level: ((1u32 << bits_per_pixel) - 1) as u8,
            bits_per_pixel,
            background_mask: Vec::new(),
            foreground_mask: Vec::new(),
            sync_point_cell_count: 0,
            capacity: 0,
            decoded_capacity: 0,
        };
        codec.update_masks()?;
        codec.init_capacity(image_width * image_height)?;
        Ok(codec)
    }

    pub fn with_levels(mut self, background_level: u8, foreground_level: u8) -> Self {
        self.background_level = background_level;
        self.foreground_level = foreground_level;
        self
    }

    fn centers_along_axis(extent: usize, distance: usize, offset: Option<usize>, radius: usize) -> (usize, usize) {
        match offset {
            None => {
                let count = (extent - 2 * radius - 1) / distance + 1;
                let computed_offset = (extent - ((count - 1) * distance + 1)) / 2;
                (computed_offset, count)
            }
            Some(given) => {
                let count = (extent - given - 2 * radius - 1) / distance + 1;
                (given, count)
            }
        }
    }

    fn centers(&self) -> Vec<SyncPointCenter> {
        let (offset_h, count_h) =
            Self::centers_along_axis(self.image_width, self.h_distance, self.h_offset, self.radius);
        let (offset_v, count_v) =
            Self::centers_along_axis(self.image_height, self.v_distance, self.v_offset, self.radius);

        let mut centers = Vec::with_capacity(count_h * count_v);
        for iy in 0..count_v {
            for ix in 0..count_h {
                centers.push(SyncPointCenter {
                    x: (offset_h + ix * self.h_distance) as i64,
                    y: (offset_v + iy * self.v_distance) as i64,
                });
            }
        }
        centers
    }

    fn update_masks(&mut self) -> Result<(), CodecError> {
        let w = self.image_width;
        let h = self.image_height;
        let mut background = vec![false; w * h];
        let mut foreground = vec![false; w * h];

        let centers = self.centers();
        let radius = self.radius as i64;
        for center in &centers {
            for dy in -radius..=radius {
                let y = center.y + dy;
                if y < 0 || y as usize >= h {
                    return Err(CodecError::InvalidProperty {
                        name: "SyncPointRadiusPixel",
                        reason: "sync point area falls outside the image".to_owned(),
                    });
                }
                for dx in -radius..=radius {
                    let x = center.x + dx;
                    if x < 0 || x as usize >= w {
                        return Err(CodecError::InvalidProperty {
                            name: "SyncPointRadiusPixel",
                            reason: "sync point area falls outside the image".to_owned(),
                        });
                    }
                    background[y as usize * w + x as usize] = true;
                }
            }
        }
        for center in &centers {
            let index = center.y as usize * w + center.x as usize;
            background[index] = false;
            foreground[index] = true;
        }

        self.sync_point_cell_count = centers.len() * (2 * self.radius + 1) * (2 * self.radius + 1);
        self.background_mask = background;
        self.foreground_mask = foreground;
        Ok(())
    }

    /// Iterates cell indices into `background_mask`/`foreground_mask`
    /// (always row-major against the image) in the declared scan
    /// order: row-major for `Horizontal`, column-major for `Vertical`.
    fn scan_order(&self) -> Box<dyn Iterator<Item = usize>> {
        let w = self.image_width;
        let h = self.image_height;
        match self.orientation {
            DataOrientation::Horizontal => Box::new((0..h * w).map(move |i| i)),
            DataOrientation::Vertical => {
                Box::new((0..w).flat_map(move |ix| (0..h).map(move |iy| iy * w + ix)))
            }
        }
    }
}

impl Codec for SyncPointInserter {
    fn name(&self) -> &'static str {
        "SyncPointInserter"
    }

    fn is_error_correcting(&self) -> bool {
        false
    }

    fn encoded_block_size(&self) -> usize {
        self.capacity
    }

    fn decoded_block_size(&self) -> usize {
        self.decoded_capacity
    }

    fn encoded_symbol_size(&self) -> usize {
        self.bits_per_pixel
    }

    fn decoded_symbol_size(&self) -> usize {
        self.bits_per_pixel
    }

    fn encoded_data_size(&self) -> usize {
        self.capacity
    }

    fn decoded_data_size(&self) -> usize {
        self.decoded_capacity
    }

    fn init_capacity(&mut self, capacity: usize) -> Result<(), CodecError> {
        if capacity != self.image_width * self.image_height {
            return Err(CodecError::CapacityTooSmall {
                capacity,
                block_size: self.image_width * self.image_height,
            });
        }
        self.capacity = capacity;
        self.decoded_capacity = capacity - self.sync_point_cell_count;
        Ok(())
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<(), CodecError> {
        match name {
            "ValueSyncPointBackground" => {
                if let Some(v) = value.as_uint() {
                    self.background_level = v as u8;
                }
                Ok(())
            }
            "ValueSyncPointForeground" => {
                if let Some(v) = value.as_uint() {
                    self.foreground_level = v as u8;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn encode(&mut self, data: &mut Vec<u8>) -> Result<(), CodecError> {
        let total = self.image_width * self.image_height;
        let mut result = vec![0u8; total];
        let mut index_data = 0usize;
        for cell in self.scan_order() {
            result[cell] = if self.background_mask[cell] {
                self.background_level
            } else if self.foreground_mask[cell] {
                self.foreground_level
            } else if index_data < data.len() {
                let value = data[index_data];
                index_data += 1;
                value
            } else {
                0
            };
        }
        *data = result;
        Ok(())
    }

    fn decode(
        &mut self,
        data: &mut Vec<u8>,
        _erasures: Option<&[usize]>,
        _stats: &mut DecodeStats,
        observer: &dyn CodecObserver,
    ) -> Result<(), CodecError> {
        let total = self.image_width * self.image_height;
        if data.len() != total {
            return Err(CodecError::DecodeFailed {
                reason: format!(
                    "expected {}x{}={} symbols, got {}",
                    self.image_width,
                    self.image_height,
                    total,
                    data.len()
                ),
            });
        }
        let mut result = Vec::with_capacity(self.decoded_capacity);
        for cell in self.scan_order() {
            if !self.background_mask[cell] && !self.foreground_mask[cell] {
                result.push(data[cell]);
            }
        }
        *data = result;
        observer.on_block_decoded(self.name(), 0, &DecodeStats::default());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::NullObserver;

    fn codec() -> SyncPointInserter {
        SyncPointInserter::new(32, 32, 1, 10, 10, None, None, DataOrientation::Horizontal, 1).unwrap()
    }

    #[test]
    fn encode_then_decode_recovers_payload() {
        let mut codec = codec();
        let payload: Vec<u8> = (0..codec.decoded_data_size() as u8).collect();
        let mut data = payload.clone();
        codec.encode(&mut data).unwrap();
        assert_eq!(data.len(), codec.encoded_data_size());

        let mut stats = DecodeStats::default();
        codec.decode(&mut data, None, &mut stats, &NullObserver).unwrap();
        assert_eq!(data, payload);
    }

    #[test]
    fn decoded_capacity_is_image_size_minus_sync_cells() {
        let codec = codec();
        assert_eq!(
            codec.decoded_data_size(),
            32 * 32 - codec.sync_point_cell_count
        );
    }

    #[test]
    fn vertical_orientation_also_round_trips() {
        let mut codec =
            SyncPointInserter::new(32, 32, 1, 10, 10, None, None, DataOrientation::Vertical, 1).unwrap();
        let payload: Vec<u8> = (0..codec.decoded_data_size() as u8).collect();
        let mut data = payload.clone();
        codec.encode(&mut data).unwrap();

        let mut stats = DecodeStats::default();
        codec.decode(&mut data, None, &mut stats, &NullObserver).unwrap();
        assert_eq!(data, payload);
    }

    #[test]
    fn short_payload_is_zero_padded_on_encode() {
        let mut codec = codec();
        let mut data = vec![7u8; 1];
        codec.encode(&mut data).unwrap();
        assert_eq!(data.len(), codec.encoded_data_size());
    }

    #[test]
    fn explicit_offset_is_honoured() {
        let codec =
            SyncPointInserter::new(40, 40, 1, 10, 10, Some(2), Some(2), DataOrientation::Horizontal, 1)
                .unwrap();
        let centers = codec.centers();
        assert_eq!(centers[0].x, 2);
        assert_eq!(centers[0].y, 2);
    }
}
