//! Protocol codecs: logical mount operations to wire bytes and back.
//!
//! Each mount family implements [`MountCodec`]. A codec is pure: it builds
//! [`Request`]s (bytes plus the shape of the expected reply) and decodes the
//! reply bytes the [`Link`](crate::transport::Link) hands back. It never
//! touches the transport and never changes the tracking state.
//!
//! Positions cross the codec boundary in the family's native frame,
//! declared by [`MountCodec::Frame`]. Synscan hand controllers speak J2000,
//! iOptron mounts speak JNow; the session converts exactly once on each side.
//!
//! Optional behaviour is exposed as capability traits ([`Parkable`],
//! [`TrackRateControllable`], [`HomeCapable`]) that a codec returns from
//! [`MountCodec::parking`] and friends, decided once from the model code
//! read during the handshake.

pub mod fixed_point;

#[cfg(feature = "ieq")]
pub mod ieq;
#[cfg(feature = "synscan")]
pub mod synscan;
#[cfg(feature = "synscan")]
pub mod synscan_legacy;

use std::fmt;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sky_math::{EquatorialPosition, Frame, HorizontalPosition, ObserverLocation};
use strum::{Display, EnumIter, EnumString};

use crate::error::{DecodeError, MountResult};
use crate::motion::{Axis, AxisRate, Direction};
use crate::state::{ParkCompletion, SlewCompletion};

/// Sidereal rate in arcseconds per second.
pub const SIDEREAL_RATE_ARCSEC: f64 = 15.041_067;

/// Expected shape of the reply to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Fire and forget.
    None,
    /// A single acknowledgement byte that must equal this value.
    Ack(u8),
    /// Bytes up to and including this terminator.
    Terminated(u8),
    /// Exactly this many bytes.
    Count(usize),
}

/// One command and the reply it expects.
#[derive(Clone, PartialEq, Eq)]
pub struct Request {
    pub bytes: Vec<u8>,
    pub reply: Reply,
}

impl Request {
    pub fn new(bytes: Vec<u8>, reply: Reply) -> Self {
        Self { bytes, reply }
    }

    pub fn ascii(command: &str, reply: Reply) -> Self {
        Self::new(command.as_bytes().to_vec(), reply)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Request({:?}, {:?})",
            crate::error::printable(&self.bytes),
            self.reply
        )
    }
}

/// Mount family, selecting the codec.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MountFamily {
    /// Synscan hand controller, firmware 3.38 / 4.38 and later
    Synscan,
    /// Synscan hand controller, older 24-bit firmware
    SynscanLegacy,
    /// iOptron iEQ, CEM and GEM series
    Ieq,
}

impl MountFamily {
    /// Serial baud rate the family's controllers use.
    pub fn default_baud(&self) -> u32 {
        match self {
            MountFamily::Synscan | MountFamily::SynscanLegacy => 9600,
            MountFamily::Ieq => 115_200,
        }
    }
}

/// Which side of the pier the tube hangs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum PierSide {
    East,
    West,
}

/// Tracking mode reported by the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, Default)]
pub enum TrackingFlag {
    #[default]
    Off,
    AltAz,
    Equatorial,
    Pec,
}

impl TrackingFlag {
    /// Decode the Synscan tracking byte (0 off, 1 alt-az, 2 EQ, 3 PEC).
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(TrackingFlag::Off),
            1 => Some(TrackingFlag::AltAz),
            2 => Some(TrackingFlag::Equatorial),
            3 => Some(TrackingFlag::Pec),
            _ => None,
        }
    }

    pub fn is_on(&self) -> bool {
        !matches!(self, TrackingFlag::Off)
    }
}

/// Fields decoded from one round of status queries.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusFields {
    /// A commanded slew is still running
    pub goto_in_progress: bool,
    pub tracking: TrackingFlag,
    /// Only reported by equatorial mounts
    pub pier_side: Option<PierSide>,
    /// The mount itself reports being parked
    pub parked: bool,
    /// The mount reports sitting at its home position
    pub at_home: bool,
}

/// Track rate selection for mounts that offer more than sidereal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, Default,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TrackMode {
    #[default]
    Sidereal,
    Lunar,
    Solar,
    King,
    Custom,
}

/// Tracking configuration held by the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSettings {
    pub mode: TrackMode,
    /// Custom RA rate as a multiple of sidereal
    pub custom_rate: f64,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            mode: TrackMode::Sidereal,
            custom_rate: 1.0,
        }
    }
}

/// What the handshake learned about the mount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MountIdentity {
    pub family: MountFamily,
    /// Human-readable model name
    pub model: String,
    /// Raw model code as the mount reported it
    pub model_code: String,
    pub firmware: String,
    /// Alt-azimuth rather than equatorial geometry
    pub alt_az: bool,
}

/// Capabilities reported in [`MountInfo`](crate::session::MountInfo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct Capabilities {
    pub park: bool,
    pub native_park: bool,
    pub set_park_position: bool,
    pub track_rates: bool,
    pub home: bool,
    pub find_home: bool,
    pub pier_side: bool,
    pub native_guiding: bool,
    pub custom_slew_rate: bool,
}

/// How a guide pulse is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideMode {
    /// The mount times the pulse itself.
    Native,
    /// The driver runs the axis at a guide speed and stops it on a timer.
    Timed,
}

/// How a park is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParkPlan {
    /// Send these requests; the mount knows the park position.
    Native(Vec<Request>),
    /// Convert the park alt/az to RA/Dec and issue an ordinary goto.
    EquatorialGoto,
}

/// Parking support.
pub trait Parkable {
    /// Park position used when none has been saved.
    fn default_park(&self, location: &ObserverLocation) -> HorizontalPosition;

    fn park_plan(&self, park: &HorizontalPosition) -> ParkPlan;

    fn park_completion(&self) -> ParkCompletion;

    /// Requests sent once the park slew has finished.
    fn park_finished_requests(&self) -> Vec<Request>;

    fn encode_unpark(&self) -> Vec<Request>;

    /// Requests that store a new park position in the mount, if it keeps one.
    fn encode_park_position(&self, _park: &HorizontalPosition) -> Vec<Request> {
        Vec::new()
    }

    /// Whether the current position may become the park position.
    fn supports_current_park(&self) -> bool {
        true
    }
}

/// Selectable track modes and custom track rates.
pub trait TrackRateControllable {
    fn encode_track_mode(&self, mode: TrackMode) -> Vec<Request>;

    /// Custom RA rate as a multiple of sidereal.
    fn encode_track_rate(&self, rate: f64) -> Vec<Request>;

    fn track_rate_range(&self) -> RangeInclusive<f64>;
}

/// Home sensors and home position.
pub trait HomeCapable {
    fn supports_find_home(&self) -> bool;

    fn encode_find_home(&self) -> Vec<Request>;

    fn encode_goto_home(&self) -> Vec<Request>;

    fn encode_set_home(&self) -> Vec<Request>;
}

/// Wire protocol of one mount family.
pub trait MountCodec {
    /// Frame the mount's RA/Dec are expressed in.
    type Frame: Frame;

    fn family(&self) -> MountFamily;

    /// Queries sent once at connect, in order.
    fn handshake_requests(&self) -> Vec<Request>;

    /// Absorb the handshake replies and report the mount identity.
    fn apply_handshake(&mut self, replies: &[Vec<u8>]) -> MountResult<MountIdentity>;

    fn capabilities(&self) -> Capabilities;

    fn encode_goto(&self, target: &EquatorialPosition<Self::Frame>) -> Vec<Request>;

    /// Native alt/az goto, when the mount has one.
    fn encode_goto_horizontal(&self, _target: &HorizontalPosition) -> Option<Vec<Request>> {
        None
    }

    /// Gotos must be servoed in alt/az by the driver.
    fn servo_goto(&self) -> bool {
        false
    }

    fn encode_sync(
        &self,
        target: &EquatorialPosition<Self::Frame>,
        horizontal: &HorizontalPosition,
    ) -> Vec<Request>;

    /// The sync sequence turns tracking off and it must be restored after.
    fn sync_stops_tracking(&self) -> bool {
        false
    }

    fn encode_abort(&self) -> Vec<Request>;

    fn encode_set_location(&self, location: &ObserverLocation) -> Vec<Request>;

    /// `utc_offset_hours` is the local offset east of Greenwich.
    fn encode_set_time(&self, utc: DateTime<Utc>, utc_offset_hours: f64) -> Vec<Request>;

    /// Queries for one status round: goto flag, pier side, tracking flag.
    fn status_requests(&self) -> Vec<Request>;

    fn decode_status(&self, replies: &[Vec<u8>]) -> Result<StatusFields, DecodeError>;

    fn position_request(&self) -> Request;

    fn decode_position(&self, reply: &[u8]) -> Result<EquatorialPosition<Self::Frame>, DecodeError>;

    /// Direct alt/az readout, if the protocol has one.
    fn horizontal_request(&self) -> Option<Request> {
        None
    }

    fn decode_horizontal(&self, reply: &[u8]) -> Result<HorizontalPosition, DecodeError> {
        Err(DecodeError::malformed("no horizontal readout", reply))
    }

    fn location_request(&self) -> Option<Request> {
        None
    }

    fn decode_location(&self, reply: &[u8]) -> Result<ObserverLocation, DecodeError> {
        Err(DecodeError::malformed("no location readout", reply))
    }

    fn time_request(&self) -> Option<Request> {
        None
    }

    /// Decode the mount clock as UTC plus its offset in hours.
    fn decode_time(&self, reply: &[u8]) -> Result<(DateTime<Utc>, f64), DecodeError> {
        Err(DecodeError::malformed("no time readout", reply))
    }

    fn encode_tracking(&self, enabled: bool, settings: &TrackSettings) -> Vec<Request>;

    fn encode_move(
        &self,
        direction: Direction,
        rate: AxisRate,
        pier_side: Option<PierSide>,
    ) -> Vec<Request>;

    fn encode_stop(&self, axis: Axis) -> Vec<Request>;

    /// Labels of the selectable slew rates, slowest first.
    fn slew_rate_labels(&self) -> &'static [&'static str];

    /// Requests selecting a slew rate on the mount, if it stores one.
    fn encode_slew_rate(&self, _index: usize) -> Vec<Request> {
        Vec::new()
    }

    /// Range of custom variable rates in arcsec/s, when the mount has them.
    ///
    /// When present, the last slew rate label selects the custom rate.
    fn custom_rate_range(&self) -> Option<RangeInclusive<f64>> {
        None
    }

    fn guide_mode(&self) -> GuideMode;

    /// Native guide pulse. Only used when [`guide_mode`](Self::guide_mode) is native.
    fn encode_guide_pulse(&self, _direction: Direction, _duration_ms: u32) -> Vec<Request> {
        Vec::new()
    }

    /// Largest pulse the mount accepts, in milliseconds.
    fn max_guide_pulse_ms(&self) -> u32 {
        u32::MAX
    }

    /// Allowed guide rates (RA, DEC) as fractions of sidereal.
    fn guide_rate_limits(&self) -> (RangeInclusive<f64>, RangeInclusive<f64>) {
        (0.1..=1.0, 0.1..=1.0)
    }

    fn encode_guide_rates(&self, _ra: f64, _de: f64) -> Vec<Request> {
        Vec::new()
    }

    fn slew_completion(&self) -> SlewCompletion {
        SlewCompletion::Immediate
    }

    fn parking(&self) -> Option<&dyn Parkable> {
        None
    }

    fn track_rates(&self) -> Option<&dyn TrackRateControllable> {
        None
    }

    fn homing(&self) -> Option<&dyn HomeCapable> {
        None
    }
}

/// Strip the expected terminator from a reply, failing if it is missing.
pub(crate) fn strip_terminator(reply: &[u8], end: u8) -> Result<&[u8], DecodeError> {
    match reply.split_last() {
        Some((last, body)) if *last == end => Ok(body),
        _ => Err(DecodeError::malformed("missing terminator", reply)),
    }
}

/// Parse a fixed-width ASCII decimal field.
pub(crate) fn parse_decimal(field: &[u8], what: &str) -> Result<i64, DecodeError> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| DecodeError::malformed(what, field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_family_names() {
        assert_eq!(MountFamily::SynscanLegacy.to_string(), "synscan-legacy");
        assert_eq!(MountFamily::from_str("ieq").unwrap(), MountFamily::Ieq);
        assert_eq!(MountFamily::Synscan.default_baud(), 9600);
        assert_eq!(MountFamily::Ieq.default_baud(), 115_200);
    }

    #[test]
    fn test_tracking_flag_bytes() {
        assert_eq!(TrackingFlag::from_byte(2), Some(TrackingFlag::Equatorial));
        assert_eq!(TrackingFlag::from_byte(7), None);
        assert!(!TrackingFlag::Off.is_on());
        assert!(TrackingFlag::Pec.is_on());
    }

    #[test]
    fn test_strip_terminator() {
        assert_eq!(strip_terminator(b"0#", b'#').unwrap(), b"0");
        assert!(strip_terminator(b"0", b'#').is_err());
        assert!(strip_terminator(b"", b'#').is_err());
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal(b"+0012345", "dec").unwrap(), 12345);
        assert_eq!(parse_decimal(b"-00000042", "dec").unwrap(), -42);
        assert!(parse_decimal(b"12a4", "ra").is_err());
    }

    #[test]
    fn test_request_debug_is_printable() {
        let request = Request::new(vec![b'P', 2, 16], Reply::Ack(b'#'));
        assert_eq!(format!("{request:?}"), "Request(\"P\\\\x02\\\\x10\", Ack(35))");
    }
}
