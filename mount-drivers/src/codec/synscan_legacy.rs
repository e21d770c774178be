//! Synscan hand controllers on firmware older than 3.38 / 4.38.
//!
//! Same command letters as the current protocol, but gotos and syncs carry
//! 24-bit positions in the top three bytes of each hex word, and alt-az
//! models (code 128 and up) have no usable RA/Dec goto: the driver servos
//! them in alt/az with fixed-rate passthrough commands. Parking has no
//! reliable goto flag either, so completion is decided when the alt/az
//! readout stops moving.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use sky_math::angles::{range_24, range_dec};
use sky_math::{Catalogue, CataloguePosition, HorizontalPosition, ObserverLocation};
use tracing::{info, warn};

use super::fixed_point::{
    degrees_to_u24, degrees_to_u24_shifted, degrees_to_u32, format_hex_pair, parse_hex_pair,
    u32_to_degrees,
};
use super::synscan::{
    axis_byte, decode_location_reply, decode_time_reply, echo_ok, firmware_outdated,
    location_payload, model_name, parse_firmware, passthru_fixed, passthru_variable,
    time_payload, AXIS_PRIMARY, AXIS_SECONDARY, CUSTOM_RATE_RANGE, SLEW_RATE_LABELS,
};
use super::{
    strip_terminator, Capabilities, GuideMode, MountCodec, MountFamily, MountIdentity,
    ParkPlan, Parkable, PierSide, Reply, Request, StatusFields, TrackSettings, TrackingFlag,
};
use crate::error::{DecodeError, MountError, MountResult};
use crate::motion::{Axis, AxisRate, Direction};
use crate::state::ParkCompletion;

const ECHO_CHAR: u8 = b'a';

/// First model code of the alt-az families.
const FIRST_ALT_AZ_CODE: u8 = 128;

/// Codec for legacy Synscan firmware.
#[derive(Debug, Clone, Default)]
pub struct SynscanLegacyCodec {
    model_code: u8,
    firmware: f64,
}

impl SynscanLegacyCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_alt_az(&self) -> bool {
        self.model_code >= FIRST_ALT_AZ_CODE
    }

    fn ack() -> Reply {
        Reply::Ack(b'#')
    }

    /// Legacy firmware replies to `V` either with three raw bytes or with
    /// six hex digits.
    fn parse_version(reply: &[u8]) -> Result<f64, DecodeError> {
        let body = strip_terminator(reply, b'#')?;
        match body {
            [major, minor, sub] => Ok(f64::from(*major)
                + f64::from(*minor) / 100.0
                + f64::from(*sub) / 10_000.0),
            _ => parse_firmware(reply),
        }
    }

    fn position_command(prefix: char, ra_deg: f64, dec_deg: f64) -> Request {
        let text = format!(
            "{prefix}{}",
            format_hex_pair(degrees_to_u24_shifted(ra_deg), degrees_to_u24_shifted(dec_deg))
        );
        Request::ascii(&text, Self::ack())
    }

    /// Passthrough that overwrites a motor's position counter.
    fn reset_axis_position(axis: u8, degrees: f64) -> Request {
        let [_, hi, mid, lo] = degrees_to_u24(degrees).to_be_bytes();
        Request::new(vec![b'P', 4, axis, 4, hi, mid, lo, 0], Reply::Count(1))
    }

    fn tracking_off() -> Request {
        Request::new(vec![b'T', 0], Self::ack())
    }
}

impl MountCodec for SynscanLegacyCodec {
    type Frame = Catalogue;

    fn family(&self) -> MountFamily {
        MountFamily::SynscanLegacy
    }

    fn handshake_requests(&self) -> Vec<Request> {
        vec![
            Request::new(vec![b'K', ECHO_CHAR], Reply::Count(2)),
            Request::ascii("V", Reply::Terminated(b'#')),
            Request::ascii("m", Reply::Count(2)),
        ]
    }

    fn apply_handshake(&mut self, replies: &[Vec<u8>]) -> MountResult<MountIdentity> {
        let [echo, version, model] = replies else {
            return Err(DecodeError::Malformed(format!(
                "expected 3 handshake replies, got {}",
                replies.len()
            ))
            .into());
        };

        if !echo_ok(echo, ECHO_CHAR) {
            return Err(MountError::Connection(
                "Synscan controller did not echo".to_string(),
            ));
        }

        self.firmware = Self::parse_version(version)?;
        if firmware_outdated(self.firmware) {
            warn!(
                "Synscan firmware {:.4} is old; update to 4.38 or later for full support",
                self.firmware
            );
        }

        let body = strip_terminator(model, b'#')?;
        self.model_code = *body
            .first()
            .ok_or_else(|| DecodeError::malformed("model", model))?;

        let identity = MountIdentity {
            family: MountFamily::SynscanLegacy,
            model: model_name(self.model_code),
            model_code: self.model_code.to_string(),
            firmware: format!("{:.4}", self.firmware),
            alt_az: self.is_alt_az(),
        };
        info!(
            "Synscan (legacy) {} (code {}), firmware {}",
            identity.model, identity.model_code, identity.firmware
        );
        Ok(identity)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            park: true,
            native_park: true,
            set_park_position: false,
            track_rates: false,
            home: false,
            find_home: false,
            pier_side: false,
            native_guiding: false,
            custom_slew_rate: true,
        }
    }

    fn encode_goto(&self, target: &CataloguePosition) -> Vec<Request> {
        vec![Self::position_command(
            'r',
            target.ra_degrees(),
            target.dec_degrees(),
        )]
    }

    fn servo_goto(&self) -> bool {
        self.is_alt_az()
    }

    fn encode_sync(
        &self,
        target: &CataloguePosition,
        horizontal: &HorizontalPosition,
    ) -> Vec<Request> {
        let mut requests = vec![Self::tracking_off()];
        if self.is_alt_az() {
            requests.push(Self::reset_axis_position(AXIS_PRIMARY, horizontal.azimuth_deg));
            requests.push(Self::reset_axis_position(AXIS_SECONDARY, horizontal.altitude_deg));
        }
        requests.push(Self::position_command(
            's',
            target.ra_degrees(),
            target.dec_degrees(),
        ));
        requests
    }

    fn sync_stops_tracking(&self) -> bool {
        true
    }

    fn encode_abort(&self) -> Vec<Request> {
        vec![
            Self::tracking_off(),
            Request::ascii("M", Reply::Count(1)),
            Request::ascii("M", Reply::Count(1)),
        ]
    }

    fn encode_set_location(&self, location: &ObserverLocation) -> Vec<Request> {
        vec![Request::new(location_payload(location), Self::ack())]
    }

    fn encode_set_time(&self, utc: DateTime<Utc>, utc_offset_hours: f64) -> Vec<Request> {
        vec![Request::new(time_payload(utc, utc_offset_hours), Self::ack())]
    }

    fn status_requests(&self) -> Vec<Request> {
        vec![
            Request::ascii("L", Reply::Count(2)),
            Request::ascii("t", Reply::Count(2)),
        ]
    }

    fn decode_status(&self, replies: &[Vec<u8>]) -> Result<StatusFields, DecodeError> {
        let [goto, tracking] = replies else {
            return Err(DecodeError::Malformed(format!(
                "expected 2 status replies, got {}",
                replies.len()
            )));
        };

        let goto_in_progress = strip_terminator(goto, b'#')? != b"0";
        let flag = strip_terminator(tracking, b'#')?;
        let tracking = match flag.first() {
            Some(0) => TrackingFlag::Off,
            Some(byte) => TrackingFlag::from_byte(*byte).unwrap_or(TrackingFlag::Equatorial),
            None => return Err(DecodeError::malformed("tracking flag", tracking)),
        };

        Ok(StatusFields {
            goto_in_progress,
            tracking,
            ..Default::default()
        })
    }

    fn position_request(&self) -> Request {
        Request::ascii("e", Reply::Count(18))
    }

    fn decode_position(&self, reply: &[u8]) -> Result<CataloguePosition, DecodeError> {
        let (ra, dec) = parse_hex_pair(reply)?;
        let ra_hours = range_24(u32_to_degrees(ra) / 15.0);
        Ok(CataloguePosition::new(ra_hours, range_dec(u32_to_degrees(dec))))
    }

    fn horizontal_request(&self) -> Option<Request> {
        Some(Request::ascii("z", Reply::Count(18)))
    }

    fn decode_horizontal(&self, reply: &[u8]) -> Result<HorizontalPosition, DecodeError> {
        let (az, alt) = parse_hex_pair(reply)?;
        Ok(HorizontalPosition::new(
            u32_to_degrees(az),
            u32_to_degrees(alt),
        ))
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
        let mode = match (enabled, self.is_alt_az()) {
            (false, _) => 0,
            (true, true) => 1,
            (true, false) => 2,
        };
        vec![Request::new(vec![b'T', mode], Self::ack())]
    }

    fn encode_move(
        &self,
        direction: Direction,
        rate: AxisRate,
        _pier_side: Option<PierSide>,
    ) -> Vec<Request> {
        let axis = axis_byte(direction.axis());
        let positive = matches!(direction, Direction::North | Direction::East);
        let request = match rate {
            AxisRate::Preset(speed) => {
                passthru_fixed(axis, if positive { 36 } else { 37 }, speed.min(9), Reply::Count(1))
            }
            AxisRate::Custom(arcsec) => {
                passthru_variable(axis, if positive { 6 } else { 7 }, arcsec, Reply::Count(1))
            }
        };
        vec![request]
    }

    fn encode_stop(&self, axis: Axis) -> Vec<Request> {
        vec![passthru_fixed(axis_byte(axis), 37, 0, Reply::Count(1))]
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

impl Parkable for SynscanLegacyCodec {
    fn default_park(&self, _location: &ObserverLocation) -> HorizontalPosition {
        HorizontalPosition::new(0.0, 90.0)
    }

    fn park_plan(&self, park: &HorizontalPosition) -> ParkPlan {
        let text = format!(
            "b{}",
            format_hex_pair(
                degrees_to_u32(park.azimuth_deg),
                degrees_to_u32(park.altitude_deg)
            )
        );
        ParkPlan::Native(vec![
            Self::tracking_off(),
            Request::ascii(&text, Self::ack()),
        ])
    }

    fn park_completion(&self) -> ParkCompletion {
        ParkCompletion::Settle
    }

    fn park_finished_requests(&self) -> Vec<Request> {
        Vec::new()
    }

    fn encode_unpark(&self) -> Vec<Request> {
        Vec::new()
    }

    fn supports_current_park(&self) -> bool {
        false
    }
}
