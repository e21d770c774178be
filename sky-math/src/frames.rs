//! Frame-tagged equatorial positions.

use std::fmt;
use std::marker::PhantomData;

use crate::angles::{fold_over_pole, format_sexagesimal};
use crate::apparent::{catalogue_to_observed, observed_to_catalogue};

/// Reference frame marker for [`EquatorialPosition`].
///
/// Implemented only by [`Observed`] and [`Catalogue`]. The conversion hooks
/// let generic code (a protocol codec declaring its native frame) move to
/// and from the observed frame without knowing which frame it holds.
pub trait Frame: Copy + fmt::Debug + PartialEq + sealed::Sealed + 'static {
    /// Short label used in logs.
    const LABEL: &'static str;

    /// Express an observed position in this frame.
    fn from_observed(position: ObservedPosition, jd: f64) -> EquatorialPosition<Self>;

    /// Express a position in this frame as an observed position.
    fn to_observed(position: EquatorialPosition<Self>, jd: f64) -> ObservedPosition;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Observed {}
    impl Sealed for super::Catalogue {}
}

/// Apparent place at the instant of observation (JNow).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {}

/// Mean place at the J2000.0 epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalogue {}

/// Right ascension (hours) and declination (degrees) in frame `F`.
///
/// Construction normalises RA into [0, 24) and folds Dec into [-90, 90],
/// moving RA by 12 hours when Dec crosses a pole.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquatorialPosition<F> {
    ra_hours: f64,
    dec_deg: f64,
    frame: PhantomData<F>,
}

pub type ObservedPosition = EquatorialPosition<Observed>;
pub type CataloguePosition = EquatorialPosition<Catalogue>;

impl<F> EquatorialPosition<F> {
    pub fn new(ra_hours: f64, dec_deg: f64) -> Self {
        let (ra_hours, dec_deg) = fold_over_pole(ra_hours, dec_deg);
        Self {
            ra_hours,
            dec_deg,
            frame: PhantomData,
        }
    }

    /// Build from right ascension in degrees rather than hours.
    pub fn from_degrees(ra_deg: f64, dec_deg: f64) -> Self {
        Self::new(ra_deg / 15.0, dec_deg)
    }

    pub fn ra_hours(&self) -> f64 {
        self.ra_hours
    }

    pub fn ra_degrees(&self) -> f64 {
        self.ra_hours * 15.0
    }

    pub fn dec_degrees(&self) -> f64 {
        self.dec_deg
    }

    /// Great-circle separation from another position in the same frame, degrees.
    pub fn separation(&self, other: &Self) -> f64 {
        let (ra1, dec1) = (self.ra_degrees().to_radians(), self.dec_deg.to_radians());
        let (ra2, dec2) = (other.ra_degrees().to_radians(), other.dec_deg.to_radians());
        let cos_sep = dec1.sin() * dec2.sin() + dec1.cos() * dec2.cos() * (ra1 - ra2).cos();
        cos_sep.clamp(-1.0, 1.0).acos().to_degrees()
    }
}

impl<F: Frame> EquatorialPosition<F> {
    /// Convert into the observed frame at `jd`.
    pub fn into_observed(self, jd: f64) -> ObservedPosition {
        F::to_observed(self, jd)
    }
}

impl<F: Frame> fmt::Display for EquatorialPosition<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} RA {} DEC {}",
            F::LABEL,
            format_sexagesimal(self.ra_hours),
            format_sexagesimal(self.dec_deg)
        )
    }
}

impl Frame for Observed {
    const LABEL: &'static str = "JNow";

    fn from_observed(position: ObservedPosition, _jd: f64) -> ObservedPosition {
        position
    }

    fn to_observed(position: ObservedPosition, _jd: f64) -> ObservedPosition {
        position
    }
}

impl Frame for Catalogue {
    const LABEL: &'static str = "J2000";

    fn from_observed(position: ObservedPosition, jd: f64) -> CataloguePosition {
        observed_to_catalogue(&position, jd)
    }

    fn to_observed(position: CataloguePosition, jd: f64) -> ObservedPosition {
        catalogue_to_observed(&position, jd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_construction_normalises() {
        // Ten degrees past the pole lands on the opposite meridian
        let p = ObservedPosition::new(25.0, 100.0);
        assert_relative_eq!(p.ra_hours(), 13.0);
        assert_relative_eq!(p.dec_degrees(), 80.0);
        assert_relative_eq!(
            p.separation(&ObservedPosition::new(1.0, 90.0)),
            10.0,
            epsilon = 1e-9
        );

        let q = CataloguePosition::from_degrees(-15.0, -10.0);
        assert_relative_eq!(q.ra_hours(), 23.0);
        assert_relative_eq!(q.dec_degrees(), -10.0);
    }

    #[test]
    fn test_separation() {
        let a = ObservedPosition::new(0.0, 0.0);
        let b = ObservedPosition::new(6.0, 0.0);
        assert_relative_eq!(a.separation(&b), 90.0, epsilon = 1e-9);
        assert_relative_eq!(a.separation(&a), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_observed_frame_conversion_is_identity() {
        let p = ObservedPosition::new(3.5, 42.0);
        assert_eq!(Observed::from_observed(p, 2_460_000.5), p);
        assert_eq!(p.into_observed(2_460_000.5), p);
    }

    #[test]
    fn test_display_carries_frame_label() {
        let p = CataloguePosition::new(12.5, -30.25);
        assert_eq!(p.to_string(), "J2000 RA 12:30:00.0 DEC -30:15:00.0");
    }
}
