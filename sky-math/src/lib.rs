//! Coordinate transforms used by the mount drivers.
//!
//! Everything in this crate is a pure function of its inputs: no clocks are
//! read and no state is kept between calls. Out-of-range inputs are wrapped
//! into range rather than rejected.
//!
//! # Frames
//!
//! Equatorial positions carry their reference frame in the type:
//!
//! - [`ObservedPosition`] - apparent place at the date of observation (JNow)
//! - [`CataloguePosition`] - mean place at J2000.0
//!
//! Moving between the two always goes through [`observed_to_catalogue`] or
//! [`catalogue_to_observed`], so a value in one frame can never be handed to
//! code expecting the other.
//!
//! # Units
//!
//! Right ascension is kept in hours (0-24) on the public types; every other
//! angle is in degrees. Internal series work in radians.

pub mod aberration;
pub mod angles;
pub mod apparent;
pub mod frames;
pub mod horizontal;
pub mod nutation;
pub mod precession;
pub mod time;

pub use apparent::{catalogue_to_observed, observed_to_catalogue};
pub use frames::{
    Catalogue, CataloguePosition, EquatorialPosition, Frame, Observed, ObservedPosition,
};
pub use horizontal::{
    equatorial_to_horizontal, horizontal_to_equatorial, HorizontalPosition, ObserverLocation,
};
pub use time::{julian_day, local_sidereal_time, J2000};
