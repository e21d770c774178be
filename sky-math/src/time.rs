//! Julian day and sidereal time.

use chrono::{DateTime, TimeZone, Utc};

use crate::angles::{range_24, range_360};
use crate::nutation::nutation;

/// Julian day of the J2000.0 epoch (2000-01-01 12:00 TT).
pub const J2000: f64 = 2_451_545.0;

/// Julian day of the Unix epoch.
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Julian day for a UTC instant.
pub fn julian_day(utc: DateTime<Utc>) -> f64 {
    let seconds = utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) * 1e-9;
    seconds / SECONDS_PER_DAY + UNIX_EPOCH_JD
}

/// UTC instant for a Julian day, rounded to the nearest millisecond.
///
/// Returns `None` when the day lies outside chrono's representable range.
pub fn datetime_from_julian_day(jd: f64) -> Option<DateTime<Utc>> {
    let millis = ((jd - UNIX_EPOCH_JD) * SECONDS_PER_DAY * 1000.0).round();
    if !millis.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

/// Julian centuries since J2000.0.
pub fn julian_centuries(jd: f64) -> f64 {
    (jd - J2000) / 36_525.0
}

/// Greenwich mean sidereal time in degrees.
pub fn mean_sidereal_degrees(jd: f64) -> f64 {
    let t = julian_centuries(jd);
    let theta = 280.460_618_37 + 360.985_647_366_29 * (jd - J2000) + 0.000_387_933 * t * t
        - t * t * t / 38_710_000.0;
    range_360(theta)
}

/// Greenwich apparent sidereal time in hours.
///
/// Mean sidereal time corrected by the equation of the equinoxes.
pub fn apparent_sidereal_time(jd: f64) -> f64 {
    let nut = nutation(jd);
    let correction_deg = nut.longitude_arcsec / 3600.0 * nut.true_obliquity_deg.to_radians().cos();
    range_24((mean_sidereal_degrees(jd) + correction_deg) / 15.0)
}

/// Local apparent sidereal time in hours for an east-positive longitude.
pub fn local_sidereal_time(jd: f64, longitude_east_deg: f64) -> f64 {
    range_24(apparent_sidereal_time(jd) + longitude_east_deg / 15.0)
}
