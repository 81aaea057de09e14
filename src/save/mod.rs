//! Decoder for the body-test save object.
//!
//! Pure: takes the bytes read from flash and returns owned records. The
//! buffer is never kept past [`decode`].

pub mod date;
pub mod error;
pub mod layout;
pub mod text;

use std::ops::RangeInclusive;

use date::{BirthDate, PackedDate};
use error::DecodeError;
use jiff::civil::DateTime;
use layout::{RegionSpec, SaveLayout, SlotView};
use serde::Serialize;
use tracing::{debug, span, Level};

/// Raw weight is kilograms * 10. Anything outside this is an unused slot.
pub const WEIGHT_RAW_RANGE: RangeInclusive<u16> = 300..=1500;
const ACTIVITY_DURATION_RANGE: RangeInclusive<u16> = 1..=600;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub timestamp: DateTime,
    pub weight_kg: f32,
    pub bmi: f32,
    pub balance_pct: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Yoga,
    Strength,
    Aerobics,
    Balance,
    Training,
}

impl ActivityKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => Self::Yoga,
            1 => Self::Strength,
            2 => Self::Aerobics,
            3 => Self::Balance,
            4 => Self::Training,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yoga => "yoga",
            Self::Strength => "strength",
            Self::Aerobics => "aerobics",
            Self::Balance => "balance",
            Self::Training => "training",
        }
    }

    /// Shown to the user until the per-exercise name field is mapped.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Yoga => "Yoga",
            Self::Strength => "Strength Training",
            Self::Aerobics => "Aerobics",
            Self::Balance => "Balance Games",
            Self::Training => "Training Plus",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Activity {
    pub timestamp: DateTime,
    pub kind: ActivityKind,
    pub name: String,
    pub duration_min: u16,
    pub calories: u16,
    pub score: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub name: String,
    pub height_cm: u8,
    pub birth_date: BirthDate,
    pub measurements: Vec<Measurement>,
    /// Best effort, may under-report.
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SaveData {
    pub profiles: Vec<Profile>,
}

pub fn decode(buf: &[u8], layout: &SaveLayout) -> Result<SaveData, DecodeError> {
    let span = span!(Level::DEBUG, "Decode", len = buf.len());
    let _enter = span.enter();

    layout.validate()?;

    let whole = SlotView::new(buf);
    let mut profiles = Vec::new();
    for idx in 0..layout.max_profiles {
        let Some(slot) = layout.slot(idx, buf.len()).and_then(|r| whole.range(r)) else {
            break;
        };
        match decode_profile(slot, layout) {
            Some(profile) => {
                debug!(
                    "slot {idx}: `{}` with {} measurements, {} activities",
                    profile.name,
                    profile.measurements.len(),
                    profile.activities.len()
                );
                profiles.push(profile);
            }
            None => debug!("slot {idx}: empty"),
        }
    }

    if profiles.is_empty() {
        return Err(DecodeError::NoProfiles);
    }
    Ok(SaveData { profiles })
}

fn decode_profile(slot: SlotView, layout: &SaveLayout) -> Option<Profile> {
    let name = text::utf16be_to_string(slot.field(layout.name)?, text::MAX_NAME_BYTES);
    if name.is_empty() {
        return None;
    }

    let height_cm = slot.u8_at(layout.height.offset)?;
    let dob: [u8; 4] = slot.field(layout.birth_date)?.get(..4)?.try_into().ok()?;
    let birth_date = BirthDate::from_bcd(dob);

    Some(Profile {
        name,
        height_cm,
        birth_date,
        measurements: decode_measurements(slot, &layout.measurements),
        activities: layout
            .activities
            .map_or_else(Vec::new, |region| decode_activities(slot, &region)),
    })
}

fn decode_measurements(slot: SlotView, region: &RegionSpec) -> Vec<Measurement> {
    let mut out = Vec::new();
    let mut idx = 0;
    while let Some(rec) = region.record(idx).and_then(|r| slot.range(r)) {
        idx += 1;
        let (Some(ts), Some(weight), Some(bmi), Some(balance)) =
            (rec.be32_at(0), rec.be16_at(4), rec.be16_at(6), rec.be16_at(8))
        else {
            break;
        };
        if !WEIGHT_RAW_RANGE.contains(&weight) {
            debug!("measurement scan stopped at {}: weight {weight}", idx - 1);
            break;
        }
        out.push(Measurement {
            timestamp: date::unpack_timestamp(ts),
            weight_kg: weight as f32 / 10.0,
            bmi: bmi as f32 / 100.0,
            balance_pct: balance as f32 / 10.0,
        });
    }
    out
}

fn decode_activities(slot: SlotView, region: &RegionSpec) -> Vec<Activity> {
    let mut out = Vec::new();
    let mut idx = 0;
    while let Some(rec) = region.record(idx).and_then(|r| slot.range(r)) {
        idx += 1;
        let Some(activity) = decode_activity(rec) else {
            break;
        };
        out.push(activity);
    }
    out
}

fn decode_activity(rec: SlotView) -> Option<Activity> {
    let packed = PackedDate::from_raw(rec.be32_at(0)?);
    if !packed.is_plausible() {
        return None;
    }
    let kind = ActivityKind::from_byte(rec.u8_at(4)?)?;
    let duration_min = rec.be16_at(6)?;
    if !ACTIVITY_DURATION_RANGE.contains(&duration_min) {
        return None;
    }

    Some(Activity {
        timestamp: packed.to_datetime(),
        kind,
        name: kind.display_name().to_string(),
        duration_min,
        calories: rec.be16_at(8)?,
        score: 0,
    })
}

#[cfg(test)]
pub(crate) mod fixture {
    //! Builds synthetic save images with the default layout.

    use super::date::PackedDate;
    use super::layout::{
        ACTIVITY_OFFSET, ACTIVITY_STRIDE, MEASUREMENT_OFFSET, MEASUREMENT_STRIDE, PROFILE_SIZE,
        SaveLayout,
    };

    pub struct SaveImage {
        pub bytes: Vec<u8>,
    }

    pub struct RawMeasurement {
        pub date: PackedDate,
        pub weight: u16,
        pub bmi: u16,
        pub balance: u16,
    }

    pub fn date(year: u16, month: u8, day: u8, hour: u8, minute: u8) -> PackedDate {
        PackedDate {
            year,
            month,
            day,
            hour,
            minute,
        }
    }

    impl SaveImage {
        pub fn with_slots(slots: usize) -> Self {
            Self {
                bytes: vec![0; PROFILE_SIZE * slots],
            }
        }

        fn slot(&mut self, idx: usize) -> &mut [u8] {
            &mut self.bytes[idx * PROFILE_SIZE..(idx + 1) * PROFILE_SIZE]
        }

        pub fn profile(
            &mut self,
            idx: usize,
            name: &str,
            height: u8,
            dob_bcd: [u8; 4],
        ) -> &mut Self {
            let layout = SaveLayout::default();
            let slot = self.slot(idx);
            let field = &mut slot[layout.name.offset..layout.name.end().unwrap()];
            field.fill(0);
            for (i, unit) in name.encode_utf16().take(10).enumerate() {
                field[i * 2..i * 2 + 2].copy_from_slice(&unit.to_be_bytes());
            }
            slot[layout.height.offset] = height;
            slot[layout.birth_date.offset..layout.birth_date.end().unwrap()].copy_from_slice(&dob_bcd);
            self
        }

        pub fn measurement(&mut self, idx: usize, n: usize, m: RawMeasurement) -> &mut Self {
            let start = MEASUREMENT_OFFSET + n * MEASUREMENT_STRIDE;
            let rec = &mut self.slot(idx)[start..start + MEASUREMENT_STRIDE];
            rec[0..4].copy_from_slice(&m.date.to_raw().to_be_bytes());
            rec[4..6].copy_from_slice(&m.weight.to_be_bytes());
            rec[6..8].copy_from_slice(&m.bmi.to_be_bytes());
            rec[8..10].copy_from_slice(&m.balance.to_be_bytes());
            self
        }

        pub fn activity(
            &mut self,
            idx: usize,
            n: usize,
            date: PackedDate,
            kind: u8,
            duration: u16,
            calories: u16,
        ) -> &mut Self {
            let start = ACTIVITY_OFFSET + n * ACTIVITY_STRIDE;
            let rec = &mut self.slot(idx)[start..start + ACTIVITY_STRIDE];
            rec[0..4].copy_from_slice(&date.to_raw().to_be_bytes());
            rec[4] = kind;
            rec[6..8].copy_from_slice(&duration.to_be_bytes());
            rec[8..10].copy_from_slice(&calories.to_be_bytes());
            self
        }
    }
}
