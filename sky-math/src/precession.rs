//! Rigorous precession of equatorial coordinates between two epochs.
//!
//! Uses the IAU 1976 angles zeta, z and theta and applies them as a rotation
//! of the unit direction vector, which stays well conditioned near the poles.

use nalgebra::{Rotation3, Vector3};

use crate::angles::{range_360, range_dec};
use crate::time::J2000;

/// The three IAU 1976 precession angles in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecessionAngles {
    pub zeta: f64,
    pub z: f64,
    pub theta: f64,
}

/// Precession angles for moving a position from `jd_from` to `jd_to`.
pub fn precession_angles(jd_from: f64, jd_to: f64) -> PrecessionAngles {
    let big_t = (jd_from - J2000) / 36_525.0;
    let t = (jd_to - jd_from) / 36_525.0;
    let t2 = t * t;
    let t3 = t2 * t;

    let base = 2306.2181 + 1.39656 * big_t - 0.000139 * big_t * big_t;
    let zeta = base * t + (0.30188 - 0.000344 * big_t) * t2 + 0.017998 * t3;
    let z = base * t + (1.09468 + 0.000066 * big_t) * t2 + 0.018203 * t3;
    let theta = (2004.3109 - 0.85330 * big_t - 0.000217 * big_t * big_t) * t
        - (0.42665 + 0.000217 * big_t) * t2
        - 0.041833 * t3;

    let arcsec = |v: f64| (v / 3600.0).to_radians();
    PrecessionAngles {
        zeta: arcsec(zeta),
        z: arcsec(z),
        theta: arcsec(theta),
    }
}

/// Rotation taking a mean-equator direction at `jd_from` to `jd_to`.
pub fn precession_matrix(jd_from: f64, jd_to: f64) -> Rotation3<f64> {
    let a = precession_angles(jd_from, jd_to);
    Rotation3::from_axis_angle(&Vector3::z_axis(), a.z)
        * Rotation3::from_axis_angle(&Vector3::y_axis(), -a.theta)
        * Rotation3::from_axis_angle(&Vector3::z_axis(), a.zeta)
}

/// Unit direction vector for a right ascension and declination in degrees.
pub(crate) fn to_unit_vector(ra_deg: f64, dec_deg: f64) -> Vector3<f64> {
    let (ra, dec) = (ra_deg.to_radians(), dec_deg.to_radians());
    Vector3::new(dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin())
}

/// Right ascension and declination in degrees for a direction vector.
pub(crate) fn from_unit_vector(v: &Vector3<f64>) -> (f64, f64) {
    let n = v.normalize();
    let ra = n.y.atan2(n.x).to_degrees();
    let dec = n.z.clamp(-1.0, 1.0).asin().to_degrees();
    (range_360(ra), range_dec(dec))
}

/// Precess a position (degrees) from one Julian day to another.
pub fn precess(ra_deg: f64, dec_deg: f64, jd_from: f64, jd_to: f64) -> (f64, f64) {
    let rotated = precession_matrix(jd_from, jd_to) * to_unit_vector(ra_deg, dec_deg);
    from_unit_vector(&rotated)
}
