//! Observer site and equatorial/horizontal conversion.
//!
//! Azimuth is measured from north through east, in [0, 360). Altitude is in
//! [-90, 90]. Both conversions work on observed (JNow) places, since the
//! local sky is an apparent-place concept; refraction is not applied.

use serde::{Deserialize, Serialize};

use crate::angles::{range_360, range_dec};
use crate::frames::ObservedPosition;
use crate::time::local_sidereal_time;

/// Geographic site of the mount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserverLocation {
    /// Geodetic latitude in degrees, north positive
    pub latitude_deg: f64,
    /// Longitude in degrees, east positive, [0, 360)
    pub longitude_deg: f64,
    /// Height above sea level in metres
    pub elevation_m: f64,
}

impl ObserverLocation {
    /// Build a location, wrapping longitude into [0, 360) and folding latitude.
    ///
    /// West longitudes may be passed as negative values.
    pub fn new(latitude_deg: f64, longitude_deg: f64, elevation_m: f64) -> Self {
        Self {
            latitude_deg: range_dec(latitude_deg),
            longitude_deg: range_360(longitude_deg),
            elevation_m,
        }
    }

    /// Longitude in (-180, 180], the form most mount firmware wants.
    pub fn longitude_signed(&self) -> f64 {
        if self.longitude_deg > 180.0 {
            self.longitude_deg - 360.0
        } else {
            self.longitude_deg
        }
    }

    pub fn is_southern(&self) -> bool {
        self.latitude_deg < 0.0
    }
}

impl Default for ObserverLocation {
    fn default() -> Self {
        Self {
            latitude_deg: 0.0,
            longitude_deg: 0.0,
            elevation_m: 0.0,
        }
    }
}

/// Azimuth/altitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizontalPosition {
    pub azimuth_deg: f64,
    pub altitude_deg: f64,
}

impl HorizontalPosition {
    pub fn new(azimuth_deg: f64, altitude_deg: f64) -> Self {
        Self {
            azimuth_deg: range_360(azimuth_deg),
            altitude_deg: range_dec(altitude_deg),
        }
    }
}

/// Convert an observed equatorial place to azimuth/altitude at `jd`.
pub fn equatorial_to_horizontal(
    position: &ObservedPosition,
    location: &ObserverLocation,
    jd: f64,
) -> HorizontalPosition {
    let lst_deg = local_sidereal_time(jd, location.longitude_deg) * 15.0;
    let ha = (lst_deg - position.ra_degrees()).to_radians();
    let dec = position.dec_degrees().to_radians();
    let lat = location.latitude_deg.to_radians();

    let (sin_dec, cos_dec) = dec.sin_cos();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_ha, cos_ha) = ha.sin_cos();

    let sin_alt = (sin_lat * sin_dec + cos_lat * cos_dec * cos_ha).clamp(-1.0, 1.0);
    let az = (-cos_dec * sin_ha).atan2(sin_dec * cos_lat - cos_dec * sin_lat * cos_ha);

    HorizontalPosition::new(az.to_degrees(), sin_alt.asin().to_degrees())
}

/// Convert azimuth/altitude at `jd` back to an observed equatorial place.
pub fn horizontal_to_equatorial(
    position: &HorizontalPosition,
    location: &ObserverLocation,
    jd: f64,
) -> ObservedPosition {
    let lst_deg = local_sidereal_time(jd, location.longitude_deg) * 15.0;
    let az = position.azimuth_deg.to_radians();
    let alt = position.altitude_deg.to_radians();
    let lat = location.latitude_deg.to_radians();

    let (sin_alt, cos_alt) = alt.sin_cos();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_az, cos_az) = az.sin_cos();

    let sin_dec = (sin_lat * sin_alt + cos_lat * cos_alt * cos_az).clamp(-1.0, 1.0);
    let ha = (-sin_az * cos_alt).atan2(cos_lat * sin_alt - sin_lat * cos_alt * cos_az);

    ObservedPosition::from_degrees(lst_deg - ha.to_degrees(), sin_dec.asin().to_degrees())
}
