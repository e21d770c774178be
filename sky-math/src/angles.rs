//! Range normalisation helpers.
//!
//! Mount protocols report angles in whatever range their fixed-point encoding
//! produces (a declination of -10 degrees arrives as 350, for example), so
//! every decoded value goes through one of these before use.

/// Wrap an hour angle or right ascension into [0, 24).
pub fn range_24(hours: f64) -> f64 {
    let wrapped = hours.rem_euclid(24.0);
    // rem_euclid can round up to exactly 24.0 for tiny negative inputs
    if wrapped >= 24.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap an angle into [0, 360).
pub fn range_360(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap an angle into [-180, 180).
pub fn range_180(degrees: f64) -> f64 {
    let wrapped = range_360(degrees + 180.0) - 180.0;
    if wrapped < -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Wrap an hour angle into [-12, 12).
pub fn range_ha(hours: f64) -> f64 {
    range_24(hours + 12.0) - 12.0
}

/// Fold a declination (or altitude) into [-90, 90].
///
/// Values past a pole are reflected back over it, so 100 becomes 80 and
/// 350 becomes -10.
pub fn range_dec(degrees: f64) -> f64 {
    let d = range_360(degrees);
    if d <= 90.0 {
        d
    } else if d < 270.0 {
        180.0 - d
    } else {
        d - 360.0
    }
}

/// Fold an equatorial position whose declination runs past a pole.
///
/// Crossing a pole puts the position on the opposite meridian, so RA moves
/// by 12 hours whenever the declination is reflected.
pub fn fold_over_pole(ra_hours: f64, dec_deg: f64) -> (f64, f64) {
    let d = range_360(dec_deg);
    if d > 90.0 && d < 270.0 {
        (range_24(ra_hours + 12.0), 180.0 - d)
    } else {
        (range_24(ra_hours), range_dec(d))
    }
}

/// Convert hours of right ascension to degrees.
pub fn hours_to_degrees(hours: f64) -> f64 {
    hours * 15.0
}

/// Convert degrees to hours of right ascension.
pub fn degrees_to_hours(degrees: f64) -> f64 {
    degrees / 15.0
}

/// Split a non-negative angle into whole degrees, whole minutes and seconds.
pub fn to_dms(degrees: f64) -> (u32, u32, f64) {
    let total = degrees.abs();
    let d = total.trunc();
    let minutes = (total - d) * 60.0;
    let m = minutes.trunc();
    let s = (minutes - m) * 60.0;
    (d as u32, m as u32, s)
}

/// Format an angle as `sDD:MM:SS.s`, the way mount logs print positions.
///
/// Rounds to tenths of an arcsecond before splitting, so seconds never
/// print as 60.0.
pub fn format_sexagesimal(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let tenths = (value.abs() * 36_000.0).round() as u64;
    let (d, rest) = (tenths / 36_000, tenths % 36_000);
    let (m, s) = (rest / 600, rest % 600);
    format!("{sign}{d:02}:{m:02}:{:02}.{}", s / 10, s % 10)
}
