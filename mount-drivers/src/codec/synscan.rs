//! Synscan hand controller protocol (firmware 3.38 / 4.38 and later).
//!
//! Single-letter commands with binary or hex arguments, replies ending in
//! `#`. Positions are 32-bit fractions of a turn printed as hex, in J2000.
//!
//! # Command summary
//!
//! | Command | Meaning | Reply |
//! |---|---|---|
//! | `K<x>` | echo | `<x>#` |
//! | `J` | alignment complete | byte, `#` |
//! | `V` | firmware, three hex pairs | `XXXXXX#` |
//! | `m` | model code | byte, `#` |
//! | `e` / `z` | precise RA/Dec, Az/Alt | `XXXXXXXX,XXXXXXXX#` |
//! | `r` / `s` / `b` | goto RA/Dec, sync, goto Az/Alt | `#` |
//! | `L` | goto in progress | `0#` / `1#` |
//! | `p` | pier side | `W#` / `E#` |
//! | `t` / `T` | get / set tracking mode | byte, `#` / `#` |
//! | `P` | motor controller passthrough | `#` |
//! | `W` / `w` | set / get location | `#` / 8 bytes, `#` |
//! | `H` / `h` | set / get local time | `#` / 8 bytes, `#` |
//! | `M` | cancel goto | `#` |

use std::ops::RangeInclusive;

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Timelike, Utc};
use sky_math::angles::{range_360, range_dec, to_dms};
use sky_math::{Catalogue, CataloguePosition, HorizontalPosition, ObserverLocation};
use tracing::{info, warn};

use super::fixed_point::{degrees_to_u32, format_hex_pair, parse_hex_pair, u32_to_degrees};
use super::{
    strip_terminator, Capabilities, GuideMode, MountCodec, MountFamily, MountIdentity,
    ParkPlan, Parkable, PierSide, Reply, Request, StatusFields, TrackSettings, TrackingFlag,
};
use crate::error::{DecodeError, MountError, MountResult};
use crate::motion::{Axis, AxisRate, Direction};
use crate::state::ParkCompletion;

/// Passthrough target for the RA/azimuth motor.
pub(crate) const AXIS_PRIMARY: u8 = 16;
/// Passthrough target for the DEC/altitude motor.
pub(crate) const AXIS_SECONDARY: u8 = 17;

const FIXED_POSITIVE: u8 = 36;
const FIXED_NEGATIVE: u8 = 37;
const VARIABLE_POSITIVE: u8 = 6;
const VARIABLE_NEGATIVE: u8 = 7;

const ECHO_CHAR: u8 = b'x';

pub(crate) const SLEW_RATE_LABELS: &[&str] = &[
    "1x", "8x", "16x", "32x", "64x", "128x", "400x", "600x", "Max", "Custom",
];

/// Custom variable rate limits in arcsec/s.
pub(crate) const CUSTOM_RATE_RANGE: RangeInclusive<f64> = 0.05..=800.0;

/// Name of a Synscan model code.
pub fn model_name(code: u8) -> String {
    match code {
        0 => "EQ6".to_string(),
        1 => "HEQ5".to_string(),
        2 => "EQ5".to_string(),
        3 => "EQ3".to_string(),
        4 => "EQ8".to_string(),
        5 => "AZ-EQ6".to_string(),
        6 => "AZ-EQ5".to_string(),
        128..=143 => "AZ GOTO Series".to_string(),
        144..=159 => "Dob GOTO Series".to_string(),
        160 => "AllView GOTO".to_string(),
        161 => "Virtuoso".to_string(),
        165 => "AZ-GTi".to_string(),
        other => format!("Unknown model {other}"),
    }
}

pub(crate) fn axis_byte(axis: Axis) -> u8 {
    match axis {
        Axis::Primary => AXIS_PRIMARY,
        Axis::Secondary => AXIS_SECONDARY,
    }
}

/// Fixed-rate passthrough: `P 2 <axis> <cmd> <rate> 0 0 0`.
pub(crate) fn passthru_fixed(axis: u8, command: u8, rate: u8, reply: Reply) -> Request {
    Request::new(vec![b'P', 2, axis, command, rate, 0, 0, 0], reply)
}

/// Variable-rate passthrough: `P 3 <axis> <cmd> <hi> <lo> 0 0`, rate in
/// quarter arcseconds per second.
pub(crate) fn passthru_variable(axis: u8, command: u8, arcsec_per_sec: f64, reply: Reply) -> Request {
    let quarters = (arcsec_per_sec.abs() * 4.0).round().min(f64::from(u16::MAX)) as u16;
    let [hi, lo] = quarters.to_be_bytes();
    Request::new(vec![b'P', 3, axis, command, hi, lo, 0, 0], reply)
}

/// Whole degrees, minutes and rounded seconds, carrying a rounded 60.
fn dms_bytes(value: f64) -> [u8; 3] {
    let (mut d, mut m, s) = to_dms(value);
    let mut s = s.round() as u32;
    if s >= 60 {
        s -= 60;
        m += 1;
    }
    if m >= 60 {
        m -= 60;
        d += 1;
    }
    [d as u8, m as u8, s as u8]
}

fn dms_value(bytes: &[u8]) -> f64 {
    f64::from(bytes[0]) + f64::from(bytes[1]) / 60.0 + f64::from(bytes[2]) / 3600.0
}

/// `W` payload: latitude d/m/s + south flag, longitude d/m/s + west flag.
pub(crate) fn location_payload(location: &ObserverLocation) -> Vec<u8> {
    let mut bytes = vec![b'W'];
    bytes.extend(dms_bytes(location.latitude_deg));
    bytes.push(u8::from(location.latitude_deg < 0.0));

    let (longitude, west) = if location.longitude_deg > 180.0 {
        (360.0 - location.longitude_deg, true)
    } else {
        (location.longitude_deg, false)
    };
    bytes.extend(dms_bytes(longitude));
    bytes.push(u8::from(west));
    bytes
}

/// `H` payload: local time, date, signed UTC offset, DST flag.
pub(crate) fn time_payload(utc: DateTime<Utc>, utc_offset_hours: f64) -> Vec<u8> {
    let offset = utc_offset_hours.round().clamp(-12.0, 14.0) as i8;
    let local = utc + TimeDelta::hours(i64::from(offset));
    vec![
        b'H',
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
        local.month() as u8,
        local.day() as u8,
        (local.year().rem_euclid(100)) as u8,
        offset as u8,
        0,
    ]
}

pub(crate) fn decode_location_reply(reply: &[u8]) -> Result<ObserverLocation, DecodeError> {
    let body = strip_terminator(reply, b'#')?;
    if body.len() != 8 {
        return Err(DecodeError::malformed("location length", reply));
    }
    let mut latitude = dms_value(&body[0..3]);
    if body[3] != 0 {
        latitude = -latitude;
    }
    let mut longitude = dms_value(&body[4..7]);
    if body[7] != 0 {
        longitude = 360.0 - longitude;
    }
    Ok(ObserverLocation::new(latitude, longitude, 0.0))
}

pub(crate) fn decode_time_reply(reply: &[u8]) -> Result<(DateTime<Utc>, f64), DecodeError> {
    let body = strip_terminator(reply, b'#')?;
    if body.len() != 8 {
        return Err(DecodeError::malformed("time length", reply));
    }
    let offset = i64::from(body[6] as i8);
    let dst = i64::from(body[7] != 0);
    let local = NaiveDate::from_ymd_opt(
        2000 + i32::from(body[5]),
        u32::from(body[3]),
        u32::from(body[4]),
    )
    .and_then(|date| date.and_hms_opt(u32::from(body[0]), u32::from(body[1]), u32::from(body[2])))
    .ok_or_else(|| DecodeError::malformed("time fields", reply))?;

    let utc = (local - TimeDelta::hours(offset + dst)).and_utc();
    Ok((utc, offset as f64))
}

pub(crate) fn echo_ok(reply: &[u8], echo: u8) -> bool {
    reply == [echo, b'#']
}

/// Parse the `V` reply: three hex pairs, major.minor.sub.
pub(crate) fn parse_firmware(reply: &[u8]) -> Result<f64, DecodeError> {
    let body = strip_terminator(reply, b'#')?;
    let text = std::str::from_utf8(body).map_err(|_| DecodeError::malformed("firmware", reply))?;
    if text.len() != 6 {
        return Err(DecodeError::malformed("firmware length", reply));
    }
    let part = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&text[range], 16).map_err(|_| DecodeError::malformed("firmware", reply))
    };
    let major = part(0..2)?;
    let minor = part(2..4)?;
    let sub = part(4..6)?;
    Ok(f64::from(major) + f64::from(minor) / 100.0 + f64::from(sub) / 10_000.0)
}

pub(crate) fn firmware_outdated(version: f64) -> bool {
    version < 3.38 || (4.0..4.38).contains(&version)
}

/// Codec for current Synscan firmware.
#[derive(Debug, Clone)]
pub struct SynscanCodec {
    model_code: u8,
    firmware: f64,
    alt_az: bool,
}

impl SynscanCodec {
    pub fn new() -> Self {
        Self {
            model_code: 0,
            firmware: 0.0,
            alt_az: false,
        }
    }

    pub fn model_code(&self) -> u8 {
        self.model_code
    }

    pub fn is_alt_az(&self) -> bool {
        self.alt_az
    }

    fn tracking_mode_byte(&self) -> u8 {
        if self.alt_az {
            1
        } else {
            2
        }
    }

    fn ack() -> Reply {
        Reply::Ack(b'#')
    }

    fn hex_command(prefix: char, first_deg: f64, second_deg: f64) -> Request {
        let text = format!(
            "{prefix}{}",
            format_hex_pair(degrees_to_u32(first_deg), degrees_to_u32(second_deg))
        );
        Request::ascii(&text, Self::ack())
    }

    fn decode_pair(reply: &[u8]) -> Result<(f64, f64), DecodeError> {
        let (first, second) = parse_hex_pair(reply)?;
        Ok((
            range_360(u32_to_degrees(first)),
            range_dec(u32_to_degrees(second)),
        ))
    }
}

impl Default for SynscanCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MountCodec for SynscanCodec {
    type Frame = Catalogue;

    fn family(&self) -> MountFamily {
        MountFamily::Synscan
    }

    fn handshake_requests(&self) -> Vec<Request> {
        vec![
            Request::new(vec![b'K', ECHO_CHAR], Reply::Count(2)),
            Request::ascii("J", Reply::Count(2)),
            Request::ascii("V", Reply::Terminated(b'#')),
            Request::ascii("m", Reply::Count(2)),
        ]
    }

    fn apply_handshake(&mut self, replies: &[Vec<u8>]) -> MountResult<MountIdentity> {
        let [echo, aligned, version, model] = replies else {
            return Err(DecodeError::Malformed(format!(
                "expected 4 handshake replies, got {}",
                replies.len()
            ))
            .into());
        };

        if !echo_ok(echo, ECHO_CHAR) {
            return Err(MountError::Connection(
                "Synscan controller did not echo".to_string(),
            ));
        }
        if aligned.first() == Some(&0) {
            return Err(MountError::Connection(
                "Synscan controller is not aligned".to_string(),
            ));
        }

        self.firmware = parse_firmware(version)?;
        if firmware_outdated(self.firmware) {
            warn!(
                "Synscan firmware {:.4} is too old, update to 3.38 / 4.38 or later",
                self.firmware
            );
        }

        let body = strip_terminator(model, b'#')?;
        self.model_code = *body
            .first()
            .ok_or_else(|| DecodeError::malformed("model", model))?;
        self.alt_az = self.model_code > 4;

        let identity = MountIdentity {
            family: MountFamily::Synscan,
            model: model_name(self.model_code),
            model_code: self.model_code.to_string(),
            firmware: format!("{:.4}", self.firmware),
            alt_az: self.alt_az,
        };
        info!(
            "Synscan {} (code {}), firmware {}",
            identity.model, identity.model_code, identity.firmware
        );
        Ok(identity)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            park: true,
            native_park: self.alt_az,
            set_park_position: false,
            track_rates: false,
            home: false,
            find_home: false,
            pier_side: !self.alt_az,
            native_guiding: false,
            custom_slew_rate: true,
        }
    }

    fn encode_goto(&self, target: &CataloguePosition) -> Vec<Request> {
        vec![Self::hex_command('r', target.ra_degrees(), target.dec_degrees())]
    }

    fn encode_goto_horizontal(&self, target: &HorizontalPosition) -> Option<Vec<Request>> {
        self.alt_az
            .then(|| vec![Self::hex_command('b', target.azimuth_deg, target.altitude_deg)])
    }

    fn encode_sync(&self, target: &CataloguePosition, _horizontal: &HorizontalPosition) -> Vec<Request> {
        vec![Self::hex_command('s', target.ra_degrees(), target.dec_degrees())]
    }

    fn encode_abort(&self) -> Vec<Request> {
        vec![
            Request::new(vec![b'T', 0], Self::ack()),
            Request::ascii("M", Self::ack()),
            Request::ascii("M", Self::ack()),
        ]
    }

    fn encode_set_location(&self, location: &ObserverLocation) -> Vec<Request> {
        vec![Request::new(location_payload(location), Self::ack())]
    }

    fn encode_set_time(&self, utc: DateTime<Utc>, utc_offset_hours: f64) -> Vec<Request> {
        vec![Request::new(time_payload(utc, utc_offset_hours), Self::ack())]
    }

    fn status_requests(&self) -> Vec<Request> {
        let mut requests = vec![Request::ascii("L", Reply::Count(2))];
        if !self.alt_az {
            requests.push(Request::ascii("p", Reply::Count(2)));
        }
        requests.push(Request::ascii("t", Reply::Count(2)));
        requests
    }

    fn decode_status(&self, replies: &[Vec<u8>]) -> Result<StatusFields, DecodeError> {
        let expected = if self.alt_az { 2 } else { 3 };
        if replies.len() != expected {
            return Err(DecodeError::Malformed(format!(
                "expected {expected} status replies, got {}",
                replies.len()
            )));
        }

        let goto = strip_terminator(&replies[0], b'#')?;
        let goto_in_progress = match goto {
            b"0" => false,
            b"1" => true,
            _ => return Err(DecodeError::malformed("goto flag", &replies[0])),
        };

        let pier_side = if self.alt_az {
            None
        } else {
            let side = strip_terminator(&replies[1], b'#')?;
            // 'W' means the tube is east of the pier
            Some(if side == b"W" {
                PierSide::East
            } else {
                PierSide::West
            })
        };

        let last = &replies[expected - 1];
        let flag = strip_terminator(last, b'#')?;
        let tracking = flag
            .first()
            .and_then(|byte| TrackingFlag::from_byte(*byte))
            .ok_or_else(|| DecodeError::malformed("tracking flag", last))?;

        Ok(StatusFields {
            goto_in_progress,
            tracking,
            pier_side,
            parked: false,
            at_home: false,
        })
    }

    fn position_request(&self) -> Request {
        Request::ascii("e", Reply::Count(18))
    }

    fn decode_position(&self, reply: &[u8]) -> Result<CataloguePosition, DecodeError> {
        let (ra_deg, dec_deg) = Self::decode_pair(reply)?;
        Ok(CataloguePosition::from_degrees(ra_deg, dec_deg))
    }

    fn horizontal_request(&self) -> Option<Request> {
        Some(Request::ascii("z", Reply::Count(18)))
    }

    fn decode_horizontal(&self, reply: &[u8]) -> Result<HorizontalPosition, DecodeError> {
        let (az, alt) = Self::decode_pair(reply)?;
        Ok(HorizontalPosition::new(az, alt))
    }

    fn location_request(&self) -> Option<Request> {
        Some(Request::ascii("w", Reply::Count(9)))
    }

    fn decode_location(&self, reply: &[u8]) -> Result<ObserverLocation, DecodeError> {
        decode_location_reply(reply)
    }

    fn time_request(&self) -> Option<Request> {
        Some(Request::ascii("h", Reply::Count(9)))
    }

    fn decode_time(&self, reply: &[u8]) -> Result<(DateTime<Utc>, f64), DecodeError> {
        decode_time_reply(reply)
    }

    fn encode_tracking(&self, enabled: bool, _settings: &TrackSettings) -> Vec<Request> {
        let mode = if enabled { self.tracking_mode_byte() } else { 0 };
        vec![Request::new(vec![b'T', mode], Self::ack())]
    }

    fn encode_move(
        &self,
        direction: Direction,
        rate: AxisRate,
        pier_side: Option<PierSide>,
    ) -> Vec<Request> {
        let direction = match direction {
            Direction::North | Direction::South
                if !self.alt_az && pier_side != Some(PierSide::West) =>
            {
                direction.opposite()
            }
            other => other,
        };
        let axis = axis_byte(direction.axis());
        let north_or_west = matches!(direction, Direction::North | Direction::West);

        let request = match rate {
            AxisRate::Preset(speed) => {
                let positive = north_or_west != self.alt_az;
                let command = if positive { FIXED_POSITIVE } else { FIXED_NEGATIVE };
                passthru_fixed(axis, command, speed.min(9), Self::ack())
            }
            AxisRate::Custom(arcsec) => {
                let command = if north_or_west {
                    VARIABLE_POSITIVE
                } else {
                    VARIABLE_NEGATIVE
                };
                passthru_variable(axis, command, arcsec, Self::ack())
            }
        };
        vec![request]
    }

    fn encode_stop(&self, axis: Axis) -> Vec<Request> {
        vec![passthru_fixed(axis_byte(axis), FIXED_POSITIVE, 0, Self::ack())]
    }

    fn slew_rate_labels(&self) -> &'static [&'static str] {
        SLEW_RATE_LABELS
    }

    fn custom_rate_range(&self) -> Option<RangeInclusive<f64>> {
        Some(CUSTOM_RATE_RANGE)
    }

    fn guide_mode(&self) -> GuideMode {
        GuideMode::Timed
    }

    fn parking(&self) -> Option<&dyn Parkable> {
        Some(self)
    }
}

impl Parkable for SynscanCodec {
    fn default_park(&self, location: &ObserverLocation) -> HorizontalPosition {
        if self.alt_az {
            HorizontalPosition::new(359.0, 0.0)
        } else {
            HorizontalPosition::new(359.0, location.latitude_deg)
        }
    }

    fn park_plan(&self, park: &HorizontalPosition) -> ParkPlan {
        match self.encode_goto_horizontal(park) {
            Some(requests) => ParkPlan::Native(requests),
            None => ParkPlan::EquatorialGoto,
        }
    }

    fn park_completion(&self) -> ParkCompletion {
        ParkCompletion::GotoComplete
    }

    fn park_finished_requests(&self) -> Vec<Request> {
        self.encode_tracking(false, &TrackSettings::default())
    }

    fn encode_unpark(&self) -> Vec<Request> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    const QUANTUM: f64 = 360.0 / 4_294_967_296.0;

    fn connected(model: u8) -> SynscanCodec {
        let mut codec = SynscanCodec::new();
        codec
            .apply_handshake(&[
                b"x#".to_vec(),
                vec![1, b'#'],
                b"042705#".to_vec(),
                vec![model, b'#'],
            ])
            .unwrap();
        codec
    }

    #[test]
    fn test_handshake_identifies_model() {
        let mut codec = SynscanCodec::new();
        let identity = codec
            .apply_handshake(&[
                b"x#".to_vec(),
                vec![1, b'#'],
                b"042705#".to_vec(),
                vec![165, b'#'],
            ])
            .unwrap();
        assert_eq!(identity.model, "AZ-GTi");
        assert_eq!(identity.firmware, "4.3905");
        assert!(identity.alt_az);
        assert!(codec.is_alt_az());
    }

    #[test]
    fn test_handshake_rejects_unaligned() {
        let mut codec = SynscanCodec::new();
        let err = codec
            .apply_handshake(&[
                b"x#".to_vec(),
                vec![0, b'#'],
                b"042705#".to_vec(),
                vec![0, b'#'],
            ])
            .unwrap_err();
        assert!(matches!(err, MountError::Connection(_)));
    }

    #[test]
    fn test_firmware_age() {
        assert!(firmware_outdated(3.37));
        assert!(!firmware_outdated(3.39));
        assert!(firmware_outdated(4.1));
        assert!(!firmware_outdated(4.39));
    }

    #[test]
    fn test_goto_encoding() {
        let codec = connected(0);
        let requests = codec.encode_goto(&CataloguePosition::new(12.0, 30.0));
        assert_eq!(requests[0].bytes, b"r80000000,15555555");
        assert_eq!(requests[0].reply, Reply::Ack(b'#'));

        let south = codec.encode_goto(&CataloguePosition::new(0.0, -30.0));
        assert_eq!(south[0].bytes, b"r00000000,EAAAAAAB");
    }

    #[test]
    fn test_park_position_round_trip() {
        let codec = connected(165);
        let park = HorizontalPosition::new(180.0, 45.0);
        let ParkPlan::Native(requests) = codec.park_plan(&park) else {
            panic!("alt-az Synscan parks natively");
        };
        let bytes = &requests[0].bytes;
        assert_eq!(bytes[0], b'b');

        let mut reply = bytes[1..].to_vec();
        reply.push(b'#');
        let decoded = codec.decode_horizontal(&reply).unwrap();
        assert_abs_diff_eq!(decoded.azimuth_deg, 180.0, epsilon = QUANTUM);
        assert_abs_diff_eq!(decoded.altitude_deg, 45.0, epsilon = QUANTUM);
    }

    #[test]
    fn test_equatorial_model_parks_through_goto() {
        let codec = connected(1);
        assert_eq!(
            codec.park_plan(&HorizontalPosition::new(359.0, 50.0)),
            ParkPlan::EquatorialGoto
        );
        let location = ObserverLocation::new(50.0, 10.0, 0.0);
        let park = codec.default_park(&location);
        assert_abs_diff_eq!(park.azimuth_deg, 359.0);
        assert_abs_diff_eq!(park.altitude_deg, 50.0);
    }

    #[test]
    fn test_decode_position_negative_dec() {
        let codec = connected(0);
        let position = codec.decode_position(b"40000000,EAAAAAAB#").unwrap();
        assert_abs_diff_eq!(position.ra_hours(), 6.0, epsilon = 1e-9);
        assert_abs_diff_eq!(position.dec_degrees(), -30.0, epsilon = QUANTUM);
    }

    #[test]
    fn test_decode_status_equatorial() {
        let codec = connected(0);
        let fields = codec
            .decode_status(&[b"1#".to_vec(), b"W#".to_vec(), vec![2, b'#']])
            .unwrap();
        assert!(fields.goto_in_progress);
        assert_eq!(fields.pier_side, Some(PierSide::East));
        assert_eq!(fields.tracking, TrackingFlag::Equatorial);
    }

    #[test]
    fn test_decode_status_alt_az_skips_pier_side() {
        let codec = connected(165);
        assert_eq!(codec.status_requests().len(), 2);
        let fields = codec
            .decode_status(&[b"0#".to_vec(), vec![1, b'#']])
            .unwrap();
        assert!(!fields.goto_in_progress);
        assert_eq!(fields.pier_side, None);
        assert_eq!(fields.tracking, TrackingFlag::AltAz);
    }

    #[test]
    fn test_decode_status_rejects_bad_flag() {
        let codec = connected(0);
        let err = codec
            .decode_status(&[b"?#".to_vec(), b"W#".to_vec(), vec![2, b'#']])
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_location_payload_west_and_south() {
        let location = ObserverLocation::new(-33.5, -70.7, 0.0);
        assert_eq!(
            location_payload(&location),
            vec![b'W', 33, 30, 0, 1, 70, 42, 0, 1]
        );

        let mut reply = location_payload(&location)[1..].to_vec();
        reply.push(b'#');
        let decoded = decode_location_reply(&reply).unwrap();
        assert_abs_diff_eq!(decoded.latitude_deg, -33.5, epsilon = 1e-9);
        assert_abs_diff_eq!(decoded.longitude_deg, 289.3, epsilon = 1e-9);
    }

    #[test]
    fn test_time_payload_and_readback() {
        let utc = Utc.with_ymd_and_hms(2025, 3, 1, 22, 30, 15).unwrap();
        let payload = time_payload(utc, -5.0);
        assert_eq!(payload, vec![b'H', 17, 30, 15, 3, 1, 25, 251, 0]);

        let mut reply = payload[1..].to_vec();
        reply.push(b'#');
        let (decoded, offset) = decode_time_reply(&reply).unwrap();
        assert_eq!(decoded, utc);
        assert_abs_diff_eq!(offset, -5.0);
    }

    #[test]
    fn test_fixed_move_bytes() {
        let codec = connected(0);
        let north = codec.encode_move(Direction::North, AxisRate::Preset(3), Some(PierSide::West));
        assert_eq!(north[0].bytes, vec![b'P', 2, 17, 36, 3, 0, 0, 0]);

        // Tube east of the pier: north and south swap
        let swapped =
            codec.encode_move(Direction::North, AxisRate::Preset(3), Some(PierSide::East));
        assert_eq!(swapped[0].bytes, vec![b'P', 2, 17, 37, 3, 0, 0, 0]);

        // Until the pier side is known the east-of-pier mapping applies
        let unknown = codec.encode_move(Direction::North, AxisRate::Preset(3), None);
        assert_eq!(unknown[0].bytes, swapped[0].bytes);

        let alt_az = connected(165);
        let up = alt_az.encode_move(Direction::North, AxisRate::Preset(9), None);
        assert_eq!(up[0].bytes, vec![b'P', 2, 17, 37, 9, 0, 0, 0]);
    }

    #[test]
    fn test_variable_move_bytes() {
        let codec = connected(0);
        let west = codec.encode_move(Direction::West, AxisRate::Custom(30.0), None);
        assert_eq!(west[0].bytes, vec![b'P', 3, 16, 6, 0, 120, 0, 0]);

        let east = codec.encode_move(Direction::East, AxisRate::Custom(800.0), None);
        assert_eq!(east[0].bytes, vec![b'P', 3, 16, 7, 0x0C, 0x80, 0, 0]);
    }

    #[test]
    fn test_stop_and_tracking() {
        let codec = connected(0);
        assert_eq!(
            codec.encode_stop(Axis::Primary)[0].bytes,
            vec![b'P', 2, 16, 36, 0, 0, 0, 0]
        );
        let settings = TrackSettings::default();
        assert_eq!(codec.encode_tracking(true, &settings)[0].bytes, vec![b'T', 2]);
        assert_eq!(codec.encode_tracking(false, &settings)[0].bytes, vec![b'T', 0]);
        assert_eq!(
            connected(165).encode_tracking(true, &settings)[0].bytes,
            vec![b'T', 1]
        );
    }
}
