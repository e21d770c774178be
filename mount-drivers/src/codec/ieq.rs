//! iOptron iEQ / CEM / GEM ASCII protocol.
//!
//! Commands are `:`-prefixed and `#`-terminated; most setters reply with a
//! single `1`. Positions are decimal ASCII with an explicit sign and an
//! implied decimal point: RA in milliseconds of time, DEC and alt/az in
//! hundredths of an arcsecond. The mount works in JNow.
//!
//! Capabilities depend on the model: native parking only exists on the
//! CEM60, CEM40, GEM45 and iEQ families, home finding on the CEM60, CEM40
//! and GEM45, and alt-az ("AA") variants have no track or guide rate
//! control.

use std::ops::RangeInclusive;

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Timelike, Utc};
use sky_math::angles::{range_24, range_dec};
use sky_math::{HorizontalPosition, Observed, ObservedPosition, ObserverLocation};
use tracing::info;

use super::{
    parse_decimal, strip_terminator, Capabilities, GuideMode, HomeCapable, MountCodec,
    MountFamily, MountIdentity, ParkPlan, Parkable, PierSide, Reply, Request, StatusFields,
    TrackMode, TrackRateControllable, TrackSettings, TrackingFlag,
};
use crate::error::{DecodeError, MountError, MountResult};
use crate::motion::{Axis, AxisRate, Direction};
use crate::state::{ParkCompletion, SlewCompletion};

/// Known `:MountInfo#` codes.
pub const MOUNT_MODELS: &[(&str, &str)] = &[
    ("0010", "Cube II EQ"),
    ("0011", "SmartEQ Pro+"),
    ("0025", "CEM25"),
    ("0026", "CEM25-EC"),
    ("0030", "iEQ30 Pro"),
    ("0040", "CEM40"),
    ("0041", "CEM40-EC"),
    ("0043", "GEM45"),
    ("0045", "iEQ45 Pro EQ"),
    ("0046", "iEQ45 Pro AA"),
    ("0060", "CEM60"),
    ("0061", "CEM60-EC"),
    ("0070", "CEM70"),
    ("0120", "CEM120"),
    ("0121", "CEM120-EC"),
    ("0122", "CEM120-EC2"),
    ("5010", "Cube II AA"),
    ("5035", "AZ Mount Pro"),
    ("5045", "iEQ45 Pro AA"),
];

const SLEW_RATE_LABELS: &[&str] = &[
    "1x", "2x", "8x", "16x", "64x", "128x", "256x", "512x", "MAX",
];

/// Longest guide pulse the five-digit field can carry.
pub const MAX_GUIDE_PULSE_MS: u32 = 99_999;

const TRACK_RATE_RANGE: RangeInclusive<f64> = 0.5..=1.5;
const GUIDE_RATE_RA: RangeInclusive<f64> = 0.01..=0.9;
const GUIDE_RATE_DE: RangeInclusive<f64> = 0.1..=0.99;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;
const CENTI_ARCSEC_PER_DEG: f64 = 360_000.0;

/// Name for a `:MountInfo#` code.
pub fn model_name(code: &str) -> Option<&'static str> {
    MOUNT_MODELS
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
}

fn contains_any(model: &str, families: &[&str]) -> bool {
    families.iter().any(|family| model.contains(family))
}

fn sign(value: f64) -> char {
    if value >= 0.0 {
        '+'
    } else {
        '-'
    }
}

fn ok() -> Reply {
    Reply::Ack(b'1')
}

/// Codec for iOptron mounts.
#[derive(Debug, Clone, Default)]
pub struct IeqCodec {
    model_code: String,
    model: String,
    main_firmware: String,
    controller_firmware: String,
    ra_firmware: String,
    de_firmware: String,
    model_override: Option<String>,
}

impl IeqCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore the code the mount reports and use this one.
    pub fn with_model_override(code: impl Into<String>) -> Self {
        Self {
            model_override: Some(code.into()),
            ..Self::default()
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_alt_az(&self) -> bool {
        self.model.contains("AA")
    }

    pub fn native_park(&self) -> bool {
        contains_any(&self.model, &["CEM60", "CEM40", "GEM45", "iEQ"])
    }

    pub fn can_find_home(&self) -> bool {
        contains_any(&self.model, &["CEM60", "CEM40", "GEM45"])
    }

    fn target_requests(target: &ObservedPosition) -> [Request; 2] {
        let ra = (target.ra_hours() * MILLIS_PER_HOUR).round() as i64;
        let dec = target.dec_degrees();
        let dec_units = (dec.abs() * CENTI_ARCSEC_PER_DEG).round() as i64;
        [
            Request::ascii(&format!(":Sr{ra:08}#"), ok()),
            Request::ascii(&format!(":Sd{}{dec_units:08}#", sign(dec)), ok()),
        ]
    }

    fn track_mode_request(mode: TrackMode) -> Request {
        let index = match mode {
            TrackMode::Sidereal => 0,
            TrackMode::Lunar => 1,
            TrackMode::Solar => 2,
            TrackMode::King => 3,
            TrackMode::Custom => 4,
        };
        Request::ascii(&format!(":RT{index}#"), ok())
    }

    fn track_rate_request(rate: f64) -> Request {
        let rate = rate.clamp(*TRACK_RATE_RANGE.start(), *TRACK_RATE_RANGE.end());
        Request::ascii(&format!(":RR{:05}#", (rate * 1e5).round() as u32), ok())
    }

    fn firmware_pair(reply: &[u8]) -> Result<(String, String), DecodeError> {
        let body = strip_terminator(reply, b'#')?;
        let text =
            std::str::from_utf8(body).map_err(|_| DecodeError::malformed("firmware", reply))?;
        if text.len() < 6 || !text.is_char_boundary(6) {
            return Err(DecodeError::malformed("firmware length", reply));
        }
        let (first, rest) = text.split_at(6);
        Ok((first.to_string(), rest.chars().take(6).collect()))
    }

    fn field<'a>(body: &'a [u8], range: std::ops::Range<usize>, reply: &[u8]) -> Result<&'a [u8], DecodeError> {
        body.get(range)
            .ok_or_else(|| DecodeError::malformed("short reply", reply))
    }

    fn digit(body: &[u8], index: usize, reply: &[u8]) -> Result<u8, DecodeError> {
        match body.get(index) {
            Some(byte) if byte.is_ascii_digit() => Ok(byte - b'0'),
            _ => Err(DecodeError::malformed("status digit", reply)),
        }
    }
}

impl MountCodec for IeqCodec {
    type Frame = Observed;

    fn family(&self) -> MountFamily {
        MountFamily::Ieq
    }

    fn handshake_requests(&self) -> Vec<Request> {
        vec![
            Request::ascii(":MountInfo#", Reply::Count(4)),
            Request::ascii(":FW1#", Reply::Terminated(b'#')),
            Request::ascii(":FW2#", Reply::Terminated(b'#')),
        ]
    }

    fn apply_handshake(&mut self, replies: &[Vec<u8>]) -> MountResult<MountIdentity> {
        let [info, fw1, fw2] = replies else {
            return Err(DecodeError::Malformed(format!(
                "expected 3 handshake replies, got {}",
                replies.len()
            ))
            .into());
        };

        let reported = String::from_utf8_lossy(info).into_owned();
        let code = self.model_override.clone().unwrap_or(reported);
        let model = model_name(&code).ok_or_else(|| {
            MountError::Connection(format!("mount with code {code} is not recognized"))
        })?;
        self.model_code = code;
        self.model = model.to_string();

        (self.main_firmware, self.controller_firmware) = Self::firmware_pair(fw1)?;
        (self.ra_firmware, self.de_firmware) = Self::firmware_pair(fw2)?;

        let identity = MountIdentity {
            family: MountFamily::Ieq,
            model: self.model.clone(),
            model_code: self.model_code.clone(),
            firmware: format!(
                "main {} controller {} ra {} dec {}",
                self.main_firmware, self.controller_firmware, self.ra_firmware, self.de_firmware
            ),
            alt_az: self.is_alt_az(),
        };
        info!(
            "iOptron {} (code {}), main board firmware {}",
            identity.model, identity.model_code, self.main_firmware
        );
        Ok(identity)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            park: true,
            native_park: self.native_park(),
            set_park_position: self.native_park(),
            track_rates: !self.is_alt_az(),
            home: true,
            find_home: self.can_find_home(),
            pier_side: true,
            native_guiding: true,
            custom_slew_rate: false,
        }
    }

    fn encode_goto(&self, target: &ObservedPosition) -> Vec<Request> {
        let mut requests = Vec::from(Self::target_requests(target));
        requests.push(Request::ascii(":MS#", ok()));
        requests
    }

    /// `:Sz`/`:Sa` then `:MSS#`, slewing to the last alt/az target.
    fn encode_goto_horizontal(&self, target: &HorizontalPosition) -> Option<Vec<Request>> {
        let az = (target.azimuth_deg * CENTI_ARCSEC_PER_DEG).round() as u64;
        let alt = (target.altitude_deg.abs() * CENTI_ARCSEC_PER_DEG).round() as u64;
        Some(vec![
            Request::ascii(&format!(":Sz{az:09}#"), ok()),
            Request::ascii(
                &format!(":Sa{}{alt:08}#", sign(target.altitude_deg)),
                ok(),
            ),
            Request::ascii(":MSS#", ok()),
        ])
    }

    fn encode_sync(&self, target: &ObservedPosition, _horizontal: &HorizontalPosition) -> Vec<Request> {
        let mut requests = Vec::from(Self::target_requests(target));
        requests.push(Request::ascii(":CM#", ok()));
        requests
    }

    fn encode_abort(&self) -> Vec<Request> {
        vec![Request::ascii(":Q#", ok()), Request::ascii(":ST0#", ok())]
    }

    fn encode_set_location(&self, location: &ObserverLocation) -> Vec<Request> {
        let longitude = location.longitude_signed();
        let latitude = location.latitude_deg;
        let lon_arcsec = (longitude.abs() * 3600.0).round() as u32;
        let lat_arcsec = (latitude.abs() * 3600.0).round() as u32;
        vec![
            Request::ascii(&format!(":Sg{}{lon_arcsec:06}#", sign(longitude)), ok()),
            Request::ascii(&format!(":St{}{lat_arcsec:06}#", sign(latitude)), ok()),
        ]
    }

    fn encode_set_time(&self, utc: DateTime<Utc>, utc_offset_hours: f64) -> Vec<Request> {
        let offset_minutes = (utc_offset_hours * 60.0).round() as i64;
        let local = utc + TimeDelta::minutes(offset_minutes);
        vec![
            Request::ascii(
                &format!(":SG{}{:03}#", sign(utc_offset_hours), offset_minutes.abs()),
                ok(),
            ),
            Request::ascii(":SDS0#", ok()),
            Request::ascii(
                &format!(
                    ":SC{:02}{:02}{:02}#",
                    local.year().rem_euclid(100),
                    local.month(),
                    local.day()
                ),
                ok(),
            ),
            Request::ascii(
                &format!(
                    ":SL{:02}{:02}{:02}#",
                    local.hour(),
                    local.minute(),
                    local.second()
                ),
                ok(),
            ),
        ]
    }

    fn status_requests(&self) -> Vec<Request> {
        vec![
            Request::ascii(":GLS#", Reply::Terminated(b'#')),
            Request::ascii(":pS#", Reply::Terminated(b'#')),
        ]
    }

    fn decode_status(&self, replies: &[Vec<u8>]) -> Result<StatusFields, DecodeError> {
        let [status, side] = replies else {
            return Err(DecodeError::Malformed(format!(
                "expected 2 status replies, got {}",
                replies.len()
            )));
        };

        let body = strip_terminator(status, b'#')?;
        if body.len() < 19 {
            return Err(DecodeError::malformed("status length", status));
        }
        let system = Self::digit(body, 14, status)?;

        let mut fields = StatusFields::default();
        match system {
            0 => {}
            1 | 3 => fields.tracking = TrackingFlag::Equatorial,
            2 | 4 => fields.goto_in_progress = true,
            5 => fields.tracking = TrackingFlag::Pec,
            6 => fields.parked = true,
            7 => fields.at_home = true,
            _ => return Err(DecodeError::malformed("system status", status)),
        }

        fields.pier_side = match strip_terminator(side, b'#')? {
            b"0" => Some(PierSide::East),
            b"1" => Some(PierSide::West),
            _ => return Err(DecodeError::malformed("pier side", side)),
        };
        Ok(fields)
    }

    fn position_request(&self) -> Request {
        Request::ascii(":GEC#", Reply::Terminated(b'#'))
    }

    fn decode_position(&self, reply: &[u8]) -> Result<ObservedPosition, DecodeError> {
        let body = strip_terminator(reply, b'#')?;
        if body.len() != 17 {
            return Err(DecodeError::malformed("position length", reply));
        }
        let dec = parse_decimal(&body[..9], "declination")?;
        let ra = parse_decimal(&body[9..], "right ascension")?;
        Ok(ObservedPosition::new(
            range_24(ra as f64 / MILLIS_PER_HOUR),
            range_dec(dec as f64 / CENTI_ARCSEC_PER_DEG),
        ))
    }

    fn location_request(&self) -> Option<Request> {
        Some(Request::ascii(":GLS#", Reply::Terminated(b'#')))
    }

    fn decode_location(&self, reply: &[u8]) -> Result<ObserverLocation, DecodeError> {
        let body = strip_terminator(reply, b'#')?;
        let longitude = parse_decimal(Self::field(body, 0..7, reply)?, "longitude")?;
        let latitude = parse_decimal(Self::field(body, 7..13, reply)?, "latitude")?;
        Ok(ObserverLocation::new(
            latitude as f64 / 3600.0 - 90.0,
            longitude as f64 / 3600.0,
            0.0,
        ))
    }

    fn time_request(&self) -> Option<Request> {
        Some(Request::ascii(":GLT#", Reply::Terminated(b'#')))
    }

    fn decode_time(&self, reply: &[u8]) -> Result<(DateTime<Utc>, f64), DecodeError> {
        let body = strip_terminator(reply, b'#')?;
        let number = |range: std::ops::Range<usize>, what: &str| {
            Self::field(body, range, reply).and_then(|field| parse_decimal(field, what))
        };
        let offset_minutes = number(0..4, "utc offset")?;
        let year = number(5..7, "year")?;
        let month = number(7..9, "month")?;
        let day = number(9..11, "day")?;
        let hour = number(11..13, "hour")?;
        let minute = number(13..15, "minute")?;
        let second = number(15..17, "second")?;

        let local = NaiveDate::from_ymd_opt(2000 + year as i32, month as u32, day as u32)
            .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
            .ok_or_else(|| DecodeError::malformed("time fields", reply))?;
        let utc = (local - TimeDelta::minutes(offset_minutes)).and_utc();
        Ok((utc, offset_minutes as f64 / 60.0))
    }

    fn encode_tracking(&self, enabled: bool, settings: &TrackSettings) -> Vec<Request> {
        if !enabled {
            return vec![Request::ascii(":ST0#", ok())];
        }
        let mut requests = Vec::new();
        if !self.is_alt_az() {
            requests.push(Self::track_mode_request(settings.mode));
            if settings.mode == TrackMode::Custom {
                requests.push(Self::track_rate_request(settings.custom_rate));
            }
        }
        requests.push(Request::ascii(":ST1#", ok()));
        requests
    }

    fn encode_move(
        &self,
        direction: Direction,
        _rate: AxisRate,
        _pier_side: Option<PierSide>,
    ) -> Vec<Request> {
        // East and west are swapped on the wire
        let command = match direction {
            Direction::North => ":mn#",
            Direction::South => ":ms#",
            Direction::West => ":me#",
            Direction::East => ":mw#",
        };
        vec![Request::ascii(command, Reply::None)]
    }

    fn encode_stop(&self, axis: Axis) -> Vec<Request> {
        let command = match axis {
            Axis::Primary => ":qR#",
            Axis::Secondary => ":qD#",
        };
        vec![Request::ascii(command, ok())]
    }

    fn slew_rate_labels(&self) -> &'static [&'static str] {
        SLEW_RATE_LABELS
    }

    fn encode_slew_rate(&self, index: usize) -> Vec<Request> {
        let index = index.min(SLEW_RATE_LABELS.len() - 1);
        vec![Request::ascii(&format!(":SR{}#", index + 1), ok())]
    }

    fn guide_mode(&self) -> GuideMode {
        GuideMode::Native
    }

    fn encode_guide_pulse(&self, direction: Direction, duration_ms: u32) -> Vec<Request> {
        let letter = match direction {
            Direction::North => 'n',
            Direction::South => 's',
            Direction::West => 'w',
            Direction::East => 'e',
        };
        vec![Request::ascii(&format!(":M{letter}{duration_ms:05}#"), Reply::None)]
    }

    fn max_guide_pulse_ms(&self) -> u32 {
        MAX_GUIDE_PULSE_MS
    }

    fn guide_rate_limits(&self) -> (RangeInclusive<f64>, RangeInclusive<f64>) {
        (GUIDE_RATE_RA, GUIDE_RATE_DE)
    }

    fn encode_guide_rates(&self, ra: f64, de: f64) -> Vec<Request> {
        if self.is_alt_az() {
            return Vec::new();
        }
        let ra = (ra.clamp(*GUIDE_RATE_RA.start(), *GUIDE_RATE_RA.end()) * 100.0).round() as u32;
        let de = (de.clamp(*GUIDE_RATE_DE.start(), *GUIDE_RATE_DE.end()) * 100.0).round() as u32;
        vec![Request::ascii(&format!(":RG{ra:02}{de:02}#"), ok())]
    }

    fn slew_completion(&self) -> SlewCompletion {
        SlewCompletion::RequireMotion
    }

    fn parking(&self) -> Option<&dyn Parkable> {
        Some(self)
    }

    fn track_rates(&self) -> Option<&dyn TrackRateControllable> {
        if self.is_alt_az() {
            None
        } else {
            Some(self)
        }
    }

    fn homing(&self) -> Option<&dyn HomeCapable> {
        Some(self)
    }
}

impl Parkable for IeqCodec {
    fn default_park(&self, location: &ObserverLocation) -> HorizontalPosition {
        // Pointing at the visible celestial pole
        if location.is_southern() {
            HorizontalPosition::new(180.0, -location.latitude_deg)
        } else {
            HorizontalPosition::new(0.0, location.latitude_deg)
        }
    }

    fn park_plan(&self, _park: &HorizontalPosition) -> ParkPlan {
        ParkPlan::EquatorialGoto
    }

    fn park_completion(&self) -> ParkCompletion {
        if self.native_park() {
            ParkCompletion::Handoff
        } else {
            ParkCompletion::GotoComplete
        }
    }

    fn park_finished_requests(&self) -> Vec<Request> {
        if self.native_park() {
            vec![Request::ascii(":MP1#", ok())]
        } else {
            vec![Request::ascii(":ST0#", ok())]
        }
    }

    fn encode_unpark(&self) -> Vec<Request> {
        if self.native_park() {
            vec![Request::ascii(":MP0#", ok())]
        } else {
            Vec::new()
        }
    }

    fn encode_park_position(&self, park: &HorizontalPosition) -> Vec<Request> {
        if !self.native_park() {
            return Vec::new();
        }
        let az = (park.azimuth_deg * CENTI_ARCSEC_PER_DEG).round() as u64;
        let alt = (park.altitude_deg.max(0.0) * CENTI_ARCSEC_PER_DEG).round() as u64;
        vec![
            Request::ascii(&format!(":SPA{az:09}#"), ok()),
            Request::ascii(&format!(":SPH{alt:08}#"), ok()),
        ]
    }
}

impl TrackRateControllable for IeqCodec {
    fn encode_track_mode(&self, mode: TrackMode) -> Vec<Request> {
        vec![Self::track_mode_request(mode)]
    }

    fn encode_track_rate(&self, rate: f64) -> Vec<Request> {
        vec![Self::track_rate_request(rate)]
    }

    fn track_rate_range(&self) -> RangeInclusive<f64> {
        TRACK_RATE_RANGE
    }
}

impl HomeCapable for IeqCodec {
    fn supports_find_home(&self) -> bool {
        self.can_find_home()
    }

    fn encode_find_home(&self) -> Vec<Request> {
        vec![Request::ascii(":MSH#", ok())]
    }

    fn encode_goto_home(&self) -> Vec<Request> {
        vec![Request::ascii(":MH#", ok())]
    }

    fn encode_set_home(&self) -> Vec<Request> {
        vec![Request::ascii(":SZP#", ok())]
    }
}
