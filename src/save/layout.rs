//! Byte layout of the save object.
//!
//! None of this is self-describing. Every offset here was found by diffing
//! save dumps, so each one is a named value that can be overridden from the
//! agent config instead of being scattered through the decoder.

use serde::{Deserialize, Serialize};

use super::error::LayoutError;

/// A fixed-width field at a fixed offset from the start of a profile slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldSpec {
    pub offset: usize,
    pub width: usize,
}

impl FieldSpec {
    pub const fn new(offset: usize, width: usize) -> Self {
        Self { offset, width }
    }

    /// One past the last byte, or `None` if that overflows.
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.width)
    }
}

/// A run of fixed-stride records inside a profile slot.
///
/// Records are scanned from `offset` until the first one that would cross
/// `end`, or until `max_records` have been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegionSpec {
    pub offset: usize,
    pub stride: usize,
    pub end: usize,
    pub max_records: usize,
}

impl RegionSpec {
    /// Byte range of record `idx`, or `None` once the region is exhausted.
    pub fn record(&self, idx: usize) -> Option<(usize, usize)> {
        if idx >= self.max_records {
            return None;
        }
        let start = self.offset.checked_add(idx.checked_mul(self.stride)?)?;
        let end = start.checked_add(self.stride)?;
        (end <= self.end).then_some((start, end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SaveLayout {
    pub profile_size: usize,
    pub max_profiles: usize,
    /// Mii name, UTF-16BE, not always null terminated
    pub name: FieldSpec,
    pub height: FieldSpec,
    /// BCD `YY YY MM DD`
    pub birth_date: FieldSpec,
    pub measurements: RegionSpec,
    /// Off unless configured; the record format has not been mapped.
    pub activities: Option<RegionSpec>,
}

pub const PROFILE_SIZE: usize = 0x9289;
pub const MAX_PROFILES: usize = 8;
pub const MAX_MEASUREMENTS: usize = 1024;
pub const MAX_ACTIVITIES: usize = 2048;

pub const MEASUREMENT_OFFSET: usize = 0x3661;
pub const MEASUREMENT_STRIDE: usize = 21;
pub const ACTIVITY_OFFSET: usize = 0x95;
pub const ACTIVITY_STRIDE: usize = 10;

/// Unconfirmed activity table, for opting in through `layout.activities`.
pub const PROVISIONAL_ACTIVITIES: RegionSpec = RegionSpec {
    offset: ACTIVITY_OFFSET,
    stride: ACTIVITY_STRIDE,
    end: MEASUREMENT_OFFSET,
    max_records: MAX_ACTIVITIES,
};

impl Default for SaveLayout {
    fn default() -> Self {
        Self {
            profile_size: PROFILE_SIZE,
            max_profiles: MAX_PROFILES,
            name: FieldSpec::new(0x08, 20),
            height: FieldSpec::new(0x1F, 1),
            birth_date: FieldSpec::new(0x20, 4),
            measurements: RegionSpec {
                offset: MEASUREMENT_OFFSET,
                stride: MEASUREMENT_STRIDE,
                end: PROFILE_SIZE,
                max_records: MAX_MEASUREMENTS,
            },
            activities: None,
        }
    }
}

impl SaveLayout {
    /// Checks every field and region against the slot size.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let fields = [
            ("name", self.name),
            ("height", self.height),
            ("birth_date", self.birth_date),
        ];
        for (name, field) in fields {
            let end = field.end().ok_or(LayoutError::Overflow { name })?;
            if end > self.profile_size {
                return Err(LayoutError::FieldOutOfSlot {
                    name,
                    end,
                    slot_size: self.profile_size,
                });
            }
        }

        let regions = [
            ("measurements", Some(self.measurements)),
            ("activities", self.activities),
        ];
        for (name, region) in regions {
            let Some(region) = region else {
                continue;
            };
            if region.stride == 0 {
                return Err(LayoutError::ZeroStride { name });
            }
            if region.end <= region.offset {
                return Err(LayoutError::EmptyRegion {
                    name,
                    offset: region.offset,
                    end: region.end,
                });
            }
            if region.end > self.profile_size {
                return Err(LayoutError::FieldOutOfSlot {
                    name,
                    end: region.end,
                    slot_size: self.profile_size,
                });
            }
        }

        Ok(())
    }

    /// Byte range of profile slot `idx` if it lies entirely inside `len`.
    pub fn slot(&self, idx: usize, len: usize) -> Option<(usize, usize)> {
        if idx >= self.max_profiles {
            return None;
        }
        let start = idx.checked_mul(self.profile_size)?;
        let end = start.checked_add(self.profile_size)?;
        (end <= len).then_some((start, end))
    }
}

/// Bounds-checked view over one slice of the save buffer.
#[derive(Clone, Copy)]
pub struct SlotView<'a> {
    bytes: &'a [u8],
}

impl<'a> SlotView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn field(&self, spec: FieldSpec) -> Option<&'a [u8]> {
        self.bytes.get(spec.offset..spec.end()?)
    }

    pub fn range(&self, (start, end): (usize, usize)) -> Option<SlotView<'a>> {
        self.bytes.get(start..end).map(SlotView::new)
    }

    pub fn u8_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(offset).copied()
    }

    pub fn be16_at(&self, offset: usize) -> Option<u16> {
        let b = self.bytes.get(offset..offset.checked_add(2)?)?;
        Some(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn be32_at(&self, offset: usize) -> Option<u32> {
        let b = self.bytes.get(offset..offset.checked_add(4)?)?;
        Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_is_valid() {
        assert_eq!(SaveLayout::default().validate(), Ok(()));
    }

    #[test]
    fn test_field_past_slot_rejected() {
        let layout = SaveLayout {
            height: FieldSpec::new(PROFILE_SIZE, 1),
            ..Default::default()
        };
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::FieldOutOfSlot { name: "height", .. })
        ));
    }

    #[test]
    fn test_overflowing_field_rejected() {
        let layout = SaveLayout {
            name: FieldSpec::new(usize::MAX, 20),
            ..Default::default()
        };
        assert_eq!(layout.validate(), Err(LayoutError::Overflow { name: "name" }));
        assert_eq!(SlotView::new(&[0; 4]).field(layout.name), None);
    }

    #[test]
    fn test_activities_off_by_default() {
        assert_eq!(SaveLayout::default().activities, None);
        let layout = SaveLayout {
            activities: Some(PROVISIONAL_ACTIVITIES),
            ..Default::default()
        };
        assert_eq!(layout.validate(), Ok(()));
    }

    #[test]
    fn test_enabled_activity_region_is_checked() {
        let layout = SaveLayout {
            activities: Some(RegionSpec {
                stride: 0,
                ..PROVISIONAL_ACTIVITIES
            }),
            ..Default::default()
        };
        assert_eq!(
            layout.validate(),
            Err(LayoutError::ZeroStride { name: "activities" })
        );
    }

    #[test]
    fn test_region_records_stop_at_end() {
        let region = RegionSpec {
            offset: 10,
            stride: 4,
            end: 20,
            max_records: 100,
        };
        assert_eq!(region.record(0), Some((10, 14)));
        assert_eq!(region.record(1), Some((14, 18)));
        assert_eq!(region.record(2), None);
    }

    #[test]
    fn test_slot_requires_full_profile() {
        let layout = SaveLayout::default();
        assert_eq!(layout.slot(0, PROFILE_SIZE - 1), None);
        assert_eq!(layout.slot(0, PROFILE_SIZE), Some((0, PROFILE_SIZE)));
        assert_eq!(layout.slot(1, PROFILE_SIZE * 2 - 1), None);
        assert_eq!(layout.slot(MAX_PROFILES, usize::MAX), None);
    }

    #[test]
    fn test_view_reads_are_bounded() {
        let bytes = [0x12, 0x34, 0x56];
        let view = SlotView::new(&bytes);
        assert_eq!(view.be16_at(1), Some(0x3456));
        assert_eq!(view.be16_at(2), None);
        assert_eq!(view.be32_at(0), None);
        assert_eq!(view.be32_at(usize::MAX), None);
    }
}
