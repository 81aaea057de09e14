//! Builds the JSON documents sent to the companion app.

pub mod writer;

use tracing::warn;
use writer::{JsonWriter, Overflow};

use crate::save::{Activity, Measurement, Profile, SaveData};

pub const FORMAT_VERSION: i64 = 2;
pub const NAME_CAP: usize = 63;
pub const MESSAGE_CAP: usize = 255;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DEFAULT_BALANCE: f64 = 50.0;

/// Bytes held back while a profile's measurements are written, so a profile
/// cut short still gets its `activities` key.
const ACTIVITIES_TAIL: usize = r#","activities":[]"#.len();

/// Writes the success document into `out` and returns its length. A
/// document too large for `out` is cut short between records but still
/// parses, and every record in it is complete.
pub fn encode_response(save: &SaveData, out: &mut [u8]) -> usize {
    let cap = out.len();
    let mut w = JsonWriter::new(out);
    if write_response(&mut w, save).is_err() || w.truncated() {
        warn!("response truncated to fit {cap} bytes");
    }
    w.finish()
}

pub fn encode_error(code: i32, message: &str, out: &mut [u8]) -> usize {
    let cap = out.len();
    let mut w = JsonWriter::new(out);
    if write_error(&mut w, code, message).is_err() {
        warn!("error document truncated to fit {cap} bytes");
    }
    w.finish()
}

fn write_response(w: &mut JsonWriter, save: &SaveData) -> Result<(), Overflow> {
    w.begin_object(None)?;
    w.int(Some("version"), FORMAT_VERSION)?;
    w.begin_array(Some("profiles"))?;
    for profile in &save.profiles {
        if !write_profile(w, profile)? {
            break;
        }
    }
    w.end()?;
    w.end()
}

/// Returns false if anything in the profile had to be left out.
fn write_profile(w: &mut JsonWriter, p: &Profile) -> Result<bool, Overflow> {
    let header = w.atomic(|w| {
        w.begin_object(None)?;
        w.string(Some("name"), &p.name, NAME_CAP)?;
        w.int(Some("height_cm"), p.height_cm.into())?;
        w.string(Some("dob"), &p.birth_date.to_string(), NAME_CAP)?;
        w.reserve(ACTIVITIES_TAIL)?;
        w.begin_array(Some("measurements"))
    });
    if header.is_err() {
        return Ok(false);
    }

    let mut complete = write_records(w, &p.measurements, write_measurement);
    w.end()?;

    w.release(ACTIVITIES_TAIL);
    w.begin_array(Some("activities"))?;
    if complete {
        complete = write_records(w, &p.activities, write_activity);
    }
    w.end()?;
    w.end()?;
    Ok(complete)
}

/// Writes each record whole, stopping at the first one that doesn't fit.
fn write_records<T>(
    w: &mut JsonWriter,
    records: &[T],
    write: impl Fn(&mut JsonWriter, &T) -> Result<(), Overflow>,
) -> bool {
    records.iter().all(|r| w.atomic(|w| write(w, r)).is_ok())
}

fn write_measurement(w: &mut JsonWriter, m: &Measurement) -> Result<(), Overflow> {
    w.begin_object(None)?;
    w.string(Some("date"), &m.timestamp.strftime(TIMESTAMP_FORMAT).to_string(), NAME_CAP)?;
    w.float(Some("weight_kg"), sanitize(m.weight_kg, 0.0), 1)?;
    w.float(Some("bmi"), sanitize(m.bmi, 0.0), 2)?;
    w.float(Some("balance_percent"), sanitize(m.balance_pct, DEFAULT_BALANCE), 1)?;
    w.end()
}

fn write_activity(w: &mut JsonWriter, a: &Activity) -> Result<(), Overflow> {
    w.begin_object(None)?;
    w.string(Some("date"), &a.timestamp.strftime(TIMESTAMP_FORMAT).to_string(), NAME_CAP)?;
    w.string(Some("type"), a.kind.as_str(), NAME_CAP)?;
    w.string(Some("name"), &a.name, NAME_CAP)?;
    w.int(Some("duration_min"), a.duration_min.into())?;
    w.int(Some("calories"), a.calories.into())?;
    w.int(Some("score"), a.score.into())?;
    w.end()
}

fn write_error(w: &mut JsonWriter, code: i32, message: &str) -> Result<(), Overflow> {
    w.begin_object(None)?;
    w.int(Some("version"), FORMAT_VERSION)?;
    w.begin_object(Some("error"))?;
    w.int(Some("code"), code.into())?;
    w.string(Some("message"), message, MESSAGE_CAP)?;
    w.end()?;
    w.end()
}

/// Corrupt records can decode to NaN or negative values.
fn sanitize(v: f32, fallback: f64) -> f64 {
    let v = f64::from(v);
    if v.is_finite() && v >= 0.0 { v } else { fallback }
}
