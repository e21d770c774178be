//! IAU 1980 nutation in longitude and obliquity.
//!
//! Periodic terms follow the IAU 1980 theory as tabulated by Meeus
//! (Astronomical Algorithms, table 22.A). Coefficients are in units of
//! 0.0001 arcsecond.

use crate::time::julian_centuries;

/// One periodic term: multipliers of D, M, M', F, Omega followed by the
/// sine coefficient (constant, per-century) for longitude and the cosine
/// coefficient (constant, per-century) for obliquity.
type Term = ([i8; 5], f64, f64, f64, f64);

#[rustfmt::skip]
const TERMS: [Term; 63] = [
    ([ 0,  0,  0,  0,  1], -171996.0, -174.2, 92025.0,  8.9),
    ([-2,  0,  0,  2,  2],  -13187.0,   -1.6,  5736.0, -3.1),
    ([ 0,  0,  0,  2,  2],   -2274.0,   -0.2,   977.0, -0.5),
    ([ 0,  0,  0,  0,  2],    2062.0,    0.2,  -895.0,  0.5),
    ([ 0,  1,  0,  0,  0],    1426.0,   -3.4,    54.0, -0.1),
    ([ 0,  0,  1,  0,  0],     712.0,    0.1,    -7.0,  0.0),
    ([-2,  1,  0,  2,  2],    -517.0,    1.2,   224.0, -0.6),
    ([ 0,  0,  0,  2,  1],    -386.0,   -0.4,   200.0,  0.0),
    ([ 0,  0,  1,  2,  2],    -301.0,    0.0,   129.0, -0.1),
    ([-2, -1,  0,  2,  2],     217.0,   -0.5,   -95.0,  0.3),
    ([-2,  0,  1,  0,  0],    -158.0,    0.0,     0.0,  0.0),
    ([-2,  0,  0,  2,  1],     129.0,    0.1,   -70.0,  0.0),
    ([ 0,  0, -1,  2,  2],     123.0,    0.0,   -53.0,  0.0),
    ([ 2,  0,  0,  0,  0],      63.0,    0.0,     0.0,  0.0),
    ([ 0,  0,  1,  0,  1],      63.0,    0.1,   -33.0,  0.0),
    ([ 2,  0, -1,  2,  2],     -59.0,    0.0,    26.0,  0.0),
    ([ 0,  0, -1,  0,  1],     -58.0,   -0.1,    32.0,  0.0),
    ([ 0,  0,  1,  2,  1],     -51.0,    0.0,    27.0,  0.0),
    ([-2,  0,  2,  0,  0],      48.0,    0.0,     0.0,  0.0),
    ([ 0,  0, -2,  2,  1],      46.0,    0.0,   -24.0,  0.0),
    ([ 2,  0,  0,  2,  2],     -38.0,    0.0,    16.0,  0.0),
    ([ 0,  0,  2,  2,  2],     -31.0,    0.0,    13.0,  0.0),
    ([ 0,  0,  2,  0,  0],      29.0,    0.0,     0.0,  0.0),
    ([-2,  0,  1,  2,  2],      29.0,    0.0,   -12.0,  0.0),
    ([ 0,  0,  0,  2,  0],      26.0,    0.0,     0.0,  0.0),
    ([-2,  0,  0,  2,  0],     -22.0,    0.0,     0.0,  0.0),
    ([ 0,  0, -1,  2,  1],      21.0,    0.0,   -10.0,  0.0),
    ([ 0,  2,  0,  0,  0],      17.0,   -0.1,     0.0,  0.0),
    ([ 2,  0, -1,  0,  1],      16.0,    0.0,    -8.0,  0.0),
    ([-2,  2,  0,  2,  2],     -16.0,    0.1,     7.0,  0.0),
    ([ 0,  1,  0,  0,  1],     -15.0,    0.0,     9.0,  0.0),
    ([-2,  0,  1,  0,  1],     -13.0,    0.0,     7.0,  0.0),
    ([ 0, -1,  0,  0,  1],     -12.0,    0.0,     6.0,  0.0),
    ([ 0,  0,  2, -2,  0],      11.0,    0.0,     0.0,  0.0),
    ([ 2,  0, -1,  2,  1],     -10.0,    0.0,     5.0,  0.0),
    ([ 2,  0,  1,  2,  2],      -8.0,    0.0,     3.0,  0.0),
    ([ 0,  1,  0,  2,  2],       7.0,    0.0,    -3.0,  0.0),
    ([-2,  1,  1,  0,  0],      -7.0,    0.0,     0.0,  0.0),
    ([ 0, -1,  0,  2,  2],      -7.0,    0.0,     3.0,  0.0),
    ([ 2,  0,  0,  2,  1],      -7.0,    0.0,     3.0,  0.0),
    ([ 2,  0,  1,  0,  0],       6.0,    0.0,     0.0,  0.0),
    ([-2,  0,  2,  2,  2],       6.0,    0.0,    -3.0,  0.0),
    ([-2,  0,  1,  2,  1],       6.0,    0.0,    -3.0,  0.0),
    ([ 2,  0, -2,  0,  1],      -6.0,    0.0,     3.0,  0.0),
    ([ 2,  0,  0,  0,  1],      -6.0,    0.0,     3.0,  0.0),
    ([ 0, -1,  1,  0,  0],       5.0,    0.0,     0.0,  0.0),
    ([-2, -1,  0,  2,  1],      -5.0,    0.0,     3.0,  0.0),
    ([-2,  0,  0,  0,  1],      -5.0,    0.0,     3.0,  0.0),
    ([ 0,  0,  2,  2,  1],      -5.0,    0.0,     3.0,  0.0),
    ([-2,  0,  2,  0,  1],       4.0,    0.0,     0.0,  0.0),
    ([-2,  1,  0,  2,  1],       4.0,    0.0,     0.0,  0.0),
    ([ 0,  0,  1, -2,  0],       4.0,    0.0,     0.0,  0.0),
    ([-1,  0,  1,  0,  0],      -4.0,    0.0,     0.0,  0.0),
    ([-2,  1,  0,  0,  0],      -4.0,    0.0,     0.0,  0.0),
    ([ 1,  0,  0,  0,  0],      -4.0,    0.0,     0.0,  0.0),
    ([ 0,  0,  1,  2,  0],       3.0,    0.0,     0.0,  0.0),
    ([ 0,  0, -2,  2,  2],      -3.0,    0.0,     0.0,  0.0),
    ([-1, -1,  1,  0,  0],      -3.0,    0.0,     0.0,  0.0),
    ([ 0,  1,  1,  0,  0],      -3.0,    0.0,     0.0,  0.0),
    ([ 0, -1,  1,  2,  2],      -3.0,    0.0,     0.0,  0.0),
    ([ 2, -1, -1,  2,  2],      -3.0,    0.0,     0.0,  0.0),
    ([ 0,  0,  3,  2,  2],      -3.0,    0.0,     0.0,  0.0),
    ([ 2, -1,  0,  2,  2],      -3.0,    0.0,     0.0,  0.0),
];

/// Nutation and obliquity at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nutation {
    /// Nutation in longitude (delta psi), arcseconds
    pub longitude_arcsec: f64,
    /// Nutation in obliquity (delta epsilon), arcseconds
    pub obliquity_arcsec: f64,
    /// Mean obliquity of the ecliptic, degrees
    pub mean_obliquity_deg: f64,
    /// True obliquity (mean plus nutation), degrees
    pub true_obliquity_deg: f64,
}

/// Mean obliquity of the ecliptic in degrees (IAU 1980).
pub fn mean_obliquity(jd: f64) -> f64 {
    let t = julian_centuries(jd);
    let arcsec = 21.448 - 46.8150 * t - 0.00059 * t * t + 0.001813 * t * t * t;
    23.0 + 26.0 / 60.0 + arcsec / 3600.0
}

/// Evaluate the nutation series at a Julian day.
pub fn nutation(jd: f64) -> Nutation {
    let t = julian_centuries(jd);
    let t2 = t * t;
    let t3 = t2 * t;

    // Fundamental arguments in degrees
    let d = 297.850_36 + 445_267.111_480 * t - 0.001_914_2 * t2 + t3 / 189_474.0;
    let m = 357.527_72 + 35_999.050_340 * t - 0.000_160_3 * t2 - t3 / 300_000.0;
    let mp = 134.962_98 + 477_198.867_398 * t + 0.008_697_2 * t2 + t3 / 56_250.0;
    let f = 93.271_91 + 483_202.017_538 * t - 0.003_682_5 * t2 + t3 / 327_270.0;
    let omega = 125.044_52 - 1_934.136_261 * t + 0.002_070_8 * t2 + t3 / 450_000.0;
    let args = [d, m, mp, f, omega];

    let mut psi = 0.0;
    let mut eps = 0.0;
    for (mult, s0, s1, c0, c1) in TERMS.iter() {
        let arg: f64 = mult
            .iter()
            .zip(args.iter())
            .map(|(k, a)| f64::from(*k) * a)
            .sum::<f64>()
            .to_radians();
        psi += (s0 + s1 * t) * arg.sin();
        eps += (c0 + c1 * t) * arg.cos();
    }

    let longitude_arcsec = psi * 1e-4;
    let obliquity_arcsec = eps * 1e-4;
    let mean_obliquity_deg = mean_obliquity(jd);

    Nutation {
        longitude_arcsec,
        obliquity_arcsec,
        mean_obliquity_deg,
        true_obliquity_deg: mean_obliquity_deg + obliquity_arcsec / 3600.0,
    }
}

/// Nutation correction in right ascension and declination, both in degrees.
///
/// The returned deltas are added to a mean place to obtain the place
/// affected by nutation.
pub fn equatorial_nutation(ra_deg: f64, dec_deg: f64, jd: f64) -> (f64, f64) {
    let nut = nutation(jd);
    let eps = nut.true_obliquity_deg.to_radians();
    let ra = ra_deg.to_radians();
    let dec = dec_deg.to_radians();
    let tan_dec = dec.tan();

    let d_ra = (eps.cos() + eps.sin() * ra.sin() * tan_dec) * nut.longitude_arcsec
        - ra.cos() * tan_dec * nut.obliquity_arcsec;
    let d_dec = eps.sin() * ra.cos() * nut.longitude_arcsec + ra.sin() * nut.obliquity_arcsec;

    (d_ra / 3600.0, d_dec / 3600.0)
}
