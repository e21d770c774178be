//! Conversion between catalogue (J2000) and observed (JNow) places.
//!
//! The forward direction applies precession, then nutation, then aberration.
//! The reverse direction undoes them in the opposite order. Aberration is
//! removed by evaluating the forward correction at the observed place and
//! reflecting the observed place through it (`2 * observed - aberrated`).
//! That is a first-order inverse, not an exact one: a round trip lands
//! within a few milliarcseconds.

use crate::aberration::equatorial_aberration;
use crate::angles::{range_360, range_dec};
use crate::frames::{CataloguePosition, ObservedPosition};
use crate::nutation::equatorial_nutation;
use crate::precession::precess;
use crate::time::J2000;

/// Remove aberration, nutation and precession from an observed place.
pub fn observed_to_catalogue(position: &ObservedPosition, jd: f64) -> CataloguePosition {
    let ra = position.ra_degrees();
    let dec = position.dec_degrees();

    let (ab_ra, ab_dec) = equatorial_aberration(ra, dec, jd);
    let aberrated_ra = ra + ab_ra;
    let aberrated_dec = dec + ab_dec;
    let mean_ra = ra * 2.0 - aberrated_ra;
    let mean_dec = dec * 2.0 - aberrated_dec;

    let (nut_ra, nut_dec) = equatorial_nutation(mean_ra, mean_dec, jd);
    let ra = range_360(mean_ra - nut_ra);
    let dec = range_dec(mean_dec - nut_dec);

    let (ra, dec) = precess(ra, dec, jd, J2000);
    CataloguePosition::from_degrees(ra, dec)
}

/// Apply precession, nutation and aberration to a catalogue place.
pub fn catalogue_to_observed(position: &CataloguePosition, jd: f64) -> ObservedPosition {
    let (ra, dec) = precess(position.ra_degrees(), position.dec_degrees(), J2000, jd);

    let (nut_ra, nut_dec) = equatorial_nutation(ra, dec, jd);
    let ra = range_360(ra + nut_ra);
    let dec = range_dec(dec + nut_dec);

    let (ab_ra, ab_dec) = equatorial_aberration(ra, dec, jd);
    ObservedPosition::from_degrees(ra + ab_ra, dec + ab_dec)
}
