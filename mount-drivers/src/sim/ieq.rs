//! iOptron simulator.

use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use sky_math::{
    horizontal_to_equatorial, julian_day, HorizontalPosition, ObservedPosition, ObserverLocation,
};
use tracing::{debug, trace};

use super::{approach, approach_wrapped, ReplyQueue, GOTO_STEP_DEG};
use crate::error::{printable, MountResult};
use crate::transport::{Terminator, Transport};

const STOPPED: u8 = 0;
const TRACKING: u8 = 1;
const SLEWING: u8 = 2;
const PARKED: u8 = 6;
const AT_HOME: u8 = 7;

/// Degrees per poll while a manual move is running.
const MOVE_STEP_DEG: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Goal {
    Goto,
    Home,
}

/// Emulated iOptron mount speaking the colon-prefixed ASCII protocol.
pub struct IeqSimulator {
    model_code: String,
    position: ObservedPosition,
    pending_ra_ms: i64,
    pending_dec_centi: i64,
    pending_az_centi: i64,
    pending_alt_centi: i64,
    target: Option<(ObservedPosition, Goal)>,
    system: u8,
    tracking: bool,
    /// Signed degrees per poll on (RA, Dec)
    moves: [f64; 2],
    longitude_arcsec: i64,
    latitude_arcsec: i64,
    offset_minutes: i64,
    date: String,
    time: String,
    replies: ReplyQueue,
    commands: Vec<String>,
}

impl IeqSimulator {
    pub fn new(model_code: impl Into<String>) -> Self {
        Self {
            model_code: model_code.into(),
            position: ObservedPosition::new(0.0, 90.0),
            pending_ra_ms: 0,
            pending_dec_centi: 0,
            pending_az_centi: 0,
            pending_alt_centi: 0,
            target: None,
            system: STOPPED,
            tracking: false,
            moves: [0.0; 2],
            longitude_arcsec: 0,
            latitude_arcsec: 0,
            offset_minutes: 0,
            date: "250101".to_string(),
            time: "000000".to_string(),
            replies: ReplyQueue::default(),
            commands: Vec::new(),
        }
    }

    /// A CEM60, which parks natively and has home sensors.
    pub fn cem60() -> Self {
        Self::new("0060")
    }

    pub fn system_status(&self) -> u8 {
        self.system
    }

    pub fn position(&self) -> ObservedPosition {
        self.position
    }

    /// Every command received so far.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Start a slew the driver did not command, as the hand pad does.
    pub fn hand_pad_goto(&mut self, goal: ObservedPosition) {
        debug!("Simulated hand pad slew to {goal}");
        self.start_slew(goal, Goal::Goto);
    }

    fn resting_status(&self) -> u8 {
        if self.tracking {
            TRACKING
        } else {
            STOPPED
        }
    }

    fn advance(&mut self) {
        if let Some((goal, kind)) = self.target {
            let (ra, ra_done) = approach_wrapped(
                self.position.ra_degrees(),
                goal.ra_degrees(),
                GOTO_STEP_DEG,
            );
            let (dec, dec_done) =
                approach(self.position.dec_degrees(), goal.dec_degrees(), GOTO_STEP_DEG);
            self.position = ObservedPosition::from_degrees(ra, dec);
            if ra_done && dec_done {
                self.target = None;
                self.system = match kind {
                    Goal::Goto => {
                        self.tracking = true;
                        TRACKING
                    }
                    Goal::Home => {
                        self.tracking = false;
                        AT_HOME
                    }
                };
                debug!("Simulated slew arrived, status {}", self.system);
            }
        }

        let [ra_step, dec_step] = self.moves;
        if ra_step != 0.0 || dec_step != 0.0 {
            self.position = ObservedPosition::from_degrees(
                self.position.ra_degrees() + ra_step,
                (self.position.dec_degrees() + dec_step).clamp(-90.0, 90.0),
            );
        }
    }

    fn start_slew(&mut self, goal: ObservedPosition, kind: Goal) {
        self.target = Some((goal, kind));
        self.system = SLEWING;
    }

    fn pending_target(&self) -> ObservedPosition {
        ObservedPosition::new(
            self.pending_ra_ms as f64 / 3_600_000.0,
            self.pending_dec_centi as f64 / 360_000.0,
        )
    }

    fn location(&self) -> ObserverLocation {
        ObserverLocation::new(
            self.latitude_arcsec as f64 / 3600.0,
            self.longitude_arcsec as f64 / 3600.0,
            0.0,
        )
    }

    /// Julian Day of the mount's own clock: local date and time less the
    /// UTC offset.
    fn mount_julian_day(&self) -> Option<f64> {
        let date = NaiveDate::parse_from_str(&self.date, "%y%m%d").ok()?;
        let time = NaiveTime::parse_from_str(&self.time, "%H%M%S").ok()?;
        let utc = date.and_time(time).and_utc() - TimeDelta::minutes(self.offset_minutes);
        Some(julian_day(utc))
    }

    fn pending_horizontal(&self) -> HorizontalPosition {
        HorizontalPosition::new(
            self.pending_az_centi as f64 / 360_000.0,
            self.pending_alt_centi as f64 / 360_000.0,
        )
    }

    fn status_reply(&self) -> String {
        let longitude_sign = if self.longitude_arcsec < 0 { '-' } else { '+' };
        format!(
            "{longitude_sign}{:06}{:06}1{}051{}#",
            self.longitude_arcsec.abs(),
            self.latitude_arcsec + 90 * 3600,
            self.system,
            if self.latitude_arcsec < 0 { 0 } else { 1 },
        )
    }

    fn position_reply(&self) -> String {
        let dec = (self.position.dec_degrees() * 360_000.0).round() as i64;
        let ra = (self.position.ra_hours() * 3_600_000.0).round() as i64;
        let sign = if dec < 0 { '-' } else { '+' };
        format!("{sign}{:08}{ra:08}#", dec.abs())
    }

    fn time_reply(&self) -> String {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        format!(
            "{sign}{:03}0{}{}#",
            self.offset_minutes.abs(),
            self.date,
            self.time
        )
    }

    fn signed_number(text: &str) -> Option<i64> {
        text.trim_end_matches('#').parse().ok()
    }

    fn handle(&mut self, command: &str) -> Option<String> {
        let ok = Some("1".to_string());
        let body = command.strip_prefix(':')?.strip_suffix('#')?;

        match body {
            "MountInfo" => return Some(self.model_code.clone()),
            "FW1" => return Some("161101161101#".to_string()),
            "FW2" => return Some("140807140807#".to_string()),
            "GLS" => {
                let reply = self.status_reply();
                self.advance();
                return Some(reply);
            }
            "GEC" => return Some(self.position_reply()),
            "GLT" => return Some(self.time_reply()),
            "pS" => return Some("1#".to_string()),
            "MS" => {
                self.start_slew(self.pending_target(), Goal::Goto);
                return ok;
            }
            "MSS" => {
                let jd = self.mount_julian_day()?;
                let goal = horizontal_to_equatorial(&self.pending_horizontal(), &self.location(), jd);
                self.start_slew(goal, Goal::Goto);
                return ok;
            }
            "CM" => {
                self.position = self.pending_target();
                return ok;
            }
            "Q" => {
                self.target = None;
                self.moves = [0.0; 2];
                self.system = self.resting_status();
                return ok;
            }
            "ST0" => {
                self.tracking = false;
                if self.system == TRACKING {
                    self.system = STOPPED;
                }
                return ok;
            }
            "ST1" => {
                self.tracking = true;
                if matches!(self.system, STOPPED | AT_HOME) {
                    self.system = TRACKING;
                }
                return ok;
            }
            "MP1" => {
                self.target = None;
                self.tracking = false;
                self.system = PARKED;
                return ok;
            }
            "MP0" => {
                self.system = STOPPED;
                return ok;
            }
            "MH" | "MSH" => {
                self.start_slew(ObservedPosition::new(self.position.ra_hours(), 90.0), Goal::Home);
                return ok;
            }
            "SZP" | "SDS0" | "SDS1" => return ok,
            "mn" => {
                self.moves[1] = MOVE_STEP_DEG;
                return None;
            }
            "ms" => {
                self.moves[1] = -MOVE_STEP_DEG;
                return None;
            }
            "me" => {
                self.moves[0] = MOVE_STEP_DEG;
                return None;
            }
            "mw" => {
                self.moves[0] = -MOVE_STEP_DEG;
                return None;
            }
            "qR" => {
                self.moves[0] = 0.0;
                return ok;
            }
            "qD" => {
                self.moves[1] = 0.0;
                return ok;
            }
            _ => {}
        }

        let split = body.find(|c: char| c.is_ascii_digit() || c == '+' || c == '-')?;
        let (prefix, value) = body.split_at(split);
        match prefix {
            "Sr" => self.pending_ra_ms = Self::signed_number(value)?,
            "Sd" => self.pending_dec_centi = Self::signed_number(value)?,
            "Sz" => self.pending_az_centi = Self::signed_number(value)?,
            "Sa" => self.pending_alt_centi = Self::signed_number(value)?,
            "Sg" => self.longitude_arcsec = Self::signed_number(value)?,
            "St" => self.latitude_arcsec = Self::signed_number(value)?,
            "SG" => self.offset_minutes = Self::signed_number(value)?,
            "SC" => self.date = value.to_string(),
            "SL" => self.time = value.to_string(),
            "RT" | "RR" | "RG" | "SR" | "SPA" | "SPH" => {}
            // Guide pulses and unknown commands get no reply
            _ => return None,
        }
        ok
    }
}

impl Transport for IeqSimulator {
    fn write(&mut self, bytes: &[u8]) -> MountResult<usize> {
        let command = String::from_utf8_lossy(bytes).into_owned();
        match self.handle(&command) {
            Some(reply) => {
                trace!("Simulator reply: {reply:?}");
                self.replies.push(reply.as_bytes());
            }
            None => debug!("Simulator: no reply to {:?}", printable(bytes)),
        }
        self.commands.push(command);
        Ok(bytes.len())
    }

    fn read_until(&mut self, terminator: Terminator, timeout: Duration) -> MountResult<Vec<u8>> {
        self.replies.read(terminator, timeout)
    }

    fn flush_input(&mut self) -> MountResult<()> {
        self.replies.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ieq::IeqCodec;
    use crate::codec::MountCodec;
    use crate::transport::{Link, DEFAULT_TIMEOUT};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_handshake_against_codec() {
        let mut codec = IeqCodec::new();
        let mut link = Link::new(IeqSimulator::cem60(), DEFAULT_TIMEOUT);
        let replies = link.execute(&codec.handshake_requests()).unwrap();
        let identity = codec.apply_handshake(&replies).unwrap();
        assert_eq!(identity.model, "CEM60");
    }

    #[test]
    fn test_status_reply_decodes() {
        let codec = IeqCodec::new();
        let mut link = Link::new(IeqSimulator::cem60(), DEFAULT_TIMEOUT);
        link.execute(&codec.encode_set_location(&sky_math::ObserverLocation::new(-31.25, 149.0, 0.0)))
            .unwrap();

        let replies = link.execute(&codec.status_requests()).unwrap();
        let fields = codec.decode_status(&replies).unwrap();
        assert!(!fields.goto_in_progress);
        assert!(!fields.parked);

        let location = codec.decode_location(&replies[0]).unwrap();
        assert_abs_diff_eq!(location.latitude_deg, -31.25, epsilon = 1e-9);
        assert_abs_diff_eq!(location.longitude_signed(), 149.0, epsilon = 1e-9);
    }

    #[test]
    fn test_goto_reports_slewing_then_tracking() {
        let mut sim = IeqSimulator::cem60();
        for command in [":Sr43200000#", ":Sd+10800000#", ":MS#"] {
            sim.write(command.as_bytes()).unwrap();
        }
        assert_eq!(sim.system_status(), SLEWING);

        let mut polls = 0;
        while sim.system_status() == SLEWING {
            sim.write(b":GLS#").unwrap();
            polls += 1;
            assert!(polls < 50);
        }
        assert_eq!(sim.system_status(), TRACKING);
        assert_abs_diff_eq!(sim.position().ra_hours(), 12.0, epsilon = 1e-9);
        assert_abs_diff_eq!(sim.position().dec_degrees(), 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_altaz_goto_uses_mount_clock_and_site() {
        let mut sim = IeqSimulator::cem60();
        for command in [
            ":Sg+000000#",
            ":St+180000#",
            ":SG+000#",
            ":SC250301#",
            ":SL220000#",
            ":Sz090000000#",
            ":Sa+16200000#",
            ":MSS#",
        ] {
            sim.write(command.as_bytes()).unwrap();
        }
        assert_eq!(sim.system_status(), SLEWING);
        while sim.system_status() == SLEWING {
            sim.write(b":GLS#").unwrap();
        }

        let jd = sim.mount_julian_day().unwrap();
        let reached =
            sky_math::equatorial_to_horizontal(&sim.position(), &sim.location(), jd);
        assert_abs_diff_eq!(reached.azimuth_deg, 250.0, epsilon = 1e-6);
        assert_abs_diff_eq!(reached.altitude_deg, 45.0, epsilon = 1e-6);
    }

    #[test]
    fn test_moves_have_no_reply() {
        let mut sim = IeqSimulator::cem60();
        sim.write(b":mn#").unwrap();
        assert!(sim
            .read_until(Terminator::Count(1), Duration::from_millis(10))
            .is_err());
    }
}
