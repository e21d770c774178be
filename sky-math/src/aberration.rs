//! Annual aberration in right ascension and declination.
//!
//! Low-precision solar theory (Meeus chapter 25) is ample here: the effect
//! itself never exceeds about 20.5 arcseconds.

use crate::angles::range_360;
use crate::nutation::mean_obliquity;
use crate::time::julian_centuries;

/// Constant of aberration, arcseconds.
pub const ABERRATION_CONSTANT_ARCSEC: f64 = 20.49552;

/// Geometric true longitude of the Sun in degrees.
pub fn solar_longitude(jd: f64) -> f64 {
    let t = julian_centuries(jd);
    let l0 = 280.466_46 + 36_000.769_83 * t + 0.000_303_2 * t * t;
    let m = (357.529_11 + 35_999.050_29 * t - 0.000_153_7 * t * t).to_radians();
    let c = (1.914_602 - 0.004_817 * t - 0.000_014 * t * t) * m.sin()
        + (0.019_993 - 0.000_101 * t) * (2.0 * m).sin()
        + 0.000_289 * (3.0 * m).sin();
    range_360(l0 + c)
}

/// Aberration correction in right ascension and declination, both degrees.
///
/// Adding the returned deltas to a geometric place gives the aberrated place.
pub fn equatorial_aberration(ra_deg: f64, dec_deg: f64, jd: f64) -> (f64, f64) {
    let t = julian_centuries(jd);
    let e = 0.016_708_634 - 0.000_042_037 * t - 0.000_000_126_7 * t * t;
    let pi = (102.937_35 + 1.719_46 * t + 0.000_46 * t * t).to_radians();
    let sun = solar_longitude(jd).to_radians();
    let eps = mean_obliquity(jd).to_radians();
    let k = ABERRATION_CONSTANT_ARCSEC;

    let ra = ra_deg.to_radians();
    let dec = dec_deg.to_radians();
    let (sin_ra, cos_ra) = ra.sin_cos();
    let (sin_dec, cos_dec) = dec.sin_cos();
    let (sin_eps, cos_eps) = eps.sin_cos();
    let tan_eps = sin_eps / cos_eps;

    let d_ra = (-k * (cos_ra * sun.cos() * cos_eps + sin_ra * sun.sin())
        + e * k * (cos_ra * pi.cos() * cos_eps + sin_ra * pi.sin()))
        / cos_dec;

    let d_dec = -k
        * (sun.cos() * cos_eps * (tan_eps * cos_dec - sin_ra * sin_dec)
            + cos_ra * sin_dec * sun.sin())
        + e * k
            * (pi.cos() * cos_eps * (tan_eps * cos_dec - sin_ra * sin_dec)
                + cos_ra * sin_dec * pi.sin());

    (d_ra / 3600.0, d_dec / 3600.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_solar_longitude_reference_date() {
        // 1992 October 13.0 TD: true longitude 199.90988
        assert_abs_diff_eq!(solar_longitude(2_448_908.5), 199.909_88, epsilon = 1e-4);
    }

    #[test]
    fn test_aberration_theta_persei() {
        // Mean place of date 2028 Nov 13.19: +30.045" in RA, +6.697" in Dec
        let (d_ra, d_dec) = equatorial_aberration(41.547_214, 49.348_483, 2_462_088.69);
        assert_abs_diff_eq!(d_ra * 3600.0, 30.045, epsilon = 0.05);
        assert_abs_diff_eq!(d_dec * 3600.0, 6.697, epsilon = 0.05);
    }

    #[test]
    fn test_aberration_magnitude_bounded() {
        for day in 0..12 {
            let jd = 2_460_000.5 + f64::from(day) * 30.0;
            let (_, d_dec) = equatorial_aberration(120.0, 10.0, jd);
            assert!(d_dec.abs() * 3600.0 < 21.0);
        }
    }
}
