//! Synscan hand controller simulator, current and legacy firmware.

use std::time::Duration;

use sky_math::angles::{range_180, range_360};
use sky_math::{
    catalogue_to_observed, equatorial_to_horizontal, horizontal_to_equatorial,
    observed_to_catalogue, CataloguePosition, HorizontalPosition, ObserverLocation,
};
use tracing::{debug, trace};

use super::{approach, approach_wrapped, ReplyQueue, GOTO_STEP_DEG};
use crate::clock::Clock;
use crate::codec::fixed_point::{degrees_to_u32, format_hex_pair, parse_hex_pair, u32_to_degrees};
use crate::error::{printable, MountResult};
use crate::transport::{Terminator, Transport};

/// Which firmware generation to emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynscanProtocol {
    Current,
    Legacy,
}

/// Degrees moved per status poll at each fixed passthrough rate.
fn preset_step(rate: u8) -> f64 {
    match rate {
        0 => 0.0,
        1 => 0.002,
        2 => 0.005,
        3 => 0.02,
        4 => 0.15,
        5 => 0.3,
        6 => 0.6,
        7 => 1.0,
        8 => 3.0,
        _ => 5.0,
    }
}

/// Where the mount points. Tracking mounts hold a sky position, stopped
/// mounts hold their axes still.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Pointing {
    Sky(CataloguePosition),
    Ground(HorizontalPosition),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    Sky(CataloguePosition),
    Ground(HorizontalPosition),
}

/// Emulated Synscan controller.
pub struct SynscanSimulator<K: Clock> {
    protocol: SynscanProtocol,
    model_code: u8,
    clock: K,
    location: ObserverLocation,
    location_bytes: [u8; 8],
    time_bytes: [u8; 8],
    pointing: Pointing,
    target: Option<Target>,
    tracking: u8,
    /// Signed degrees per poll on (primary, secondary)
    axis_steps: [f64; 2],
    replies: ReplyQueue,
    commands: Vec<Vec<u8>>,
}

impl<K: Clock> SynscanSimulator<K> {
    pub fn new(protocol: SynscanProtocol, model_code: u8, clock: K) -> Self {
        let location = ObserverLocation::default();
        Self {
            protocol,
            model_code,
            clock,
            location,
            location_bytes: [0; 8],
            time_bytes: [0, 0, 0, 1, 1, 25, 0, 0],
            pointing: Pointing::Ground(HorizontalPosition::new(0.0, location.latitude_deg.abs())),
            target: None,
            tracking: 0,
            axis_steps: [0.0; 2],
            replies: ReplyQueue::default(),
            commands: Vec::new(),
        }
    }

    /// Equatorial EQ6 on current firmware.
    pub fn eq6(clock: K) -> Self {
        Self::new(SynscanProtocol::Current, 0, clock)
    }

    pub fn is_alt_az(&self) -> bool {
        match self.protocol {
            SynscanProtocol::Current => self.model_code > 4,
            SynscanProtocol::Legacy => self.model_code >= 128,
        }
    }

    pub fn tracking_mode(&self) -> u8 {
        self.tracking
    }

    pub fn is_slewing(&self) -> bool {
        self.target.is_some()
    }

    /// Every command received so far.
    pub fn commands(&self) -> &[Vec<u8>] {
        &self.commands
    }

    pub fn horizontal(&self) -> HorizontalPosition {
        match self.pointing {
            Pointing::Ground(hz) => hz,
            Pointing::Sky(sky) => {
                let jd = self.clock.julian_day();
                equatorial_to_horizontal(&catalogue_to_observed(&sky, jd), &self.location, jd)
            }
        }
    }

    pub fn equatorial(&self) -> CataloguePosition {
        match self.pointing {
            Pointing::Sky(sky) => sky,
            Pointing::Ground(hz) => {
                let jd = self.clock.julian_day();
                observed_to_catalogue(&horizontal_to_equatorial(&hz, &self.location, jd), jd)
            }
        }
    }

    fn set_tracking(&mut self, mode: u8) {
        self.tracking = mode;
        self.pointing = if mode == 0 {
            Pointing::Ground(self.horizontal())
        } else {
            Pointing::Sky(self.equatorial())
        };
    }

    fn advance(&mut self) {
        if let Some(target) = self.target {
            let arrived = match target {
                Target::Sky(goal) => {
                    let current = self.equatorial();
                    let (ra, ra_done) =
                        approach_wrapped(current.ra_degrees(), goal.ra_degrees(), GOTO_STEP_DEG);
                    let (dec, dec_done) =
                        approach(current.dec_degrees(), goal.dec_degrees(), GOTO_STEP_DEG);
                    self.pointing = Pointing::Sky(CataloguePosition::from_degrees(ra, dec));
                    ra_done && dec_done
                }
                Target::Ground(goal) => {
                    let current = self.horizontal();
                    let (az, az_done) =
                        approach_wrapped(current.azimuth_deg, goal.azimuth_deg, GOTO_STEP_DEG);
                    let (alt, alt_done) =
                        approach(current.altitude_deg, goal.altitude_deg, GOTO_STEP_DEG);
                    self.pointing = Pointing::Ground(HorizontalPosition::new(az, alt));
                    az_done && alt_done
                }
            };
            if arrived {
                self.target = None;
                if matches!(target, Target::Sky(_)) {
                    self.tracking = if self.is_alt_az() { 1 } else { 2 };
                }
                self.set_tracking(self.tracking);
                debug!("Simulated goto arrived");
            }
        }

        let [primary, secondary] = self.axis_steps;
        if primary == 0.0 && secondary == 0.0 {
            return;
        }
        if self.is_alt_az() {
            let hz = self.horizontal();
            let moved = HorizontalPosition::new(
                hz.azimuth_deg + primary,
                (hz.altitude_deg + secondary).clamp(-90.0, 90.0),
            );
            self.pointing = Pointing::Ground(moved);
            if self.tracking != 0 {
                self.set_tracking(self.tracking);
            }
        } else {
            let sky = self.equatorial();
            let moved = CataloguePosition::from_degrees(
                sky.ra_degrees() + primary,
                (sky.dec_degrees() + secondary).clamp(-90.0, 90.0),
            );
            self.pointing = Pointing::Sky(moved);
            if self.tracking == 0 {
                self.set_tracking(0);
            }
        }
    }

    fn sync_to(&mut self, position: CataloguePosition) {
        self.pointing = Pointing::Sky(position);
        self.set_tracking(self.tracking);
    }

    fn decode_pair(text: &[u8]) -> Option<(f64, f64)> {
        let mut reply = text.to_vec();
        reply.push(b'#');
        let (first, second) = parse_hex_pair(&reply).ok()?;
        let (first, second) = (u32_to_degrees(first), u32_to_degrees(second));
        Some((first, range_180(second)))
    }

    fn position_reply(first: f64, second: f64) -> Vec<u8> {
        let mut reply = format_hex_pair(degrees_to_u32(first), degrees_to_u32(second)).into_bytes();
        reply.push(b'#');
        reply
    }

    fn passthrough(&mut self, bytes: &[u8]) -> Option<Vec<u8>> {
        let &[_, len, axis, command, a, b, c, _] = bytes else {
            return None;
        };
        let index = match axis {
            16 => 0,
            17 => 1,
            _ => return None,
        };
        match (len, command) {
            (2, 36) => self.axis_steps[index] = preset_step(a),
            (2, 37) => self.axis_steps[index] = -preset_step(a),
            (3, 6 | 7) => {
                let arcsec = f64::from(u16::from_be_bytes([a, b])) / 4.0;
                let step = arcsec / 3600.0;
                self.axis_steps[index] = if command == 6 { step } else { -step };
            }
            (4, 4) => {
                let degrees = f64::from(u32::from_be_bytes([0, a, b, c])) / 16_777_216.0 * 360.0;
                let hz = self.horizontal();
                let hz = if index == 0 {
                    HorizontalPosition::new(degrees, hz.altitude_deg)
                } else {
                    HorizontalPosition::new(hz.azimuth_deg, range_180(degrees))
                };
                self.pointing = Pointing::Ground(hz);
                self.set_tracking(self.tracking);
            }
            _ => return None,
        }
        Some(b"#".to_vec())
    }

    fn handle(&mut self, bytes: &[u8]) -> Option<Vec<u8>> {
        let (&command, rest) = bytes.split_first()?;
        match command {
            b'K' => {
                let mut reply = rest.to_vec();
                reply.push(b'#');
                Some(reply)
            }
            b'J' => Some(vec![1, b'#']),
            b'V' => Some(match self.protocol {
                SynscanProtocol::Current => b"042705#".to_vec(),
                SynscanProtocol::Legacy => vec![3, 37, 2, b'#'],
            }),
            b'm' => Some(vec![self.model_code, b'#']),
            b'L' => {
                let reply = if self.target.is_some() { b"1#" } else { b"0#" };
                self.advance();
                Some(reply.to_vec())
            }
            b'p' => Some(b"E#".to_vec()),
            b't' => Some(vec![self.tracking, b'#']),
            b'T' => {
                self.set_tracking(*rest.first()?);
                Some(b"#".to_vec())
            }
            b'e' => {
                let sky = self.equatorial();
                Some(Self::position_reply(sky.ra_degrees(), sky.dec_degrees()))
            }
            b'z' => {
                let hz = self.horizontal();
                Some(Self::position_reply(hz.azimuth_deg, hz.altitude_deg))
            }
            b'r' => {
                let (ra, dec) = Self::decode_pair(rest)?;
                self.target = Some(Target::Sky(CataloguePosition::from_degrees(ra, dec)));
                Some(b"#".to_vec())
            }
            b's' => {
                let (ra, dec) = Self::decode_pair(rest)?;
                self.sync_to(CataloguePosition::from_degrees(ra, dec));
                Some(b"#".to_vec())
            }
            b'b' => {
                let (az, alt) = Self::decode_pair(rest)?;
                self.target = Some(Target::Ground(HorizontalPosition::new(range_360(az), alt)));
                Some(b"#".to_vec())
            }
            b'M' => {
                self.target = None;
                self.axis_steps = [0.0; 2];
                Some(b"#".to_vec())
            }
            b'P' => self.passthrough(bytes),
            b'W' => {
                self.location_bytes = rest.try_into().ok()?;
                self.location = location_from_bytes(&self.location_bytes);
                Some(b"#".to_vec())
            }
            b'w' => {
                let mut reply = self.location_bytes.to_vec();
                reply.push(b'#');
                Some(reply)
            }
            b'H' => {
                self.time_bytes = rest.try_into().ok()?;
                Some(b"#".to_vec())
            }
            b'h' => {
                let mut reply = self.time_bytes.to_vec();
                reply.push(b'#');
                Some(reply)
            }
            _ => None,
        }
    }
}

fn location_from_bytes(bytes: &[u8; 8]) -> ObserverLocation {
    let dms = |d: u8, m: u8, s: u8| f64::from(d) + f64::from(m) / 60.0 + f64::from(s) / 3600.0;
    let mut latitude = dms(bytes[0], bytes[1], bytes[2]);
    if bytes[3] != 0 {
        latitude = -latitude;
    }
    let mut longitude = dms(bytes[4], bytes[5], bytes[6]);
    if bytes[7] != 0 {
        longitude = -longitude;
    }
    ObserverLocation::new(latitude, longitude, 0.0)
}

impl<K: Clock> Transport for SynscanSimulator<K> {
    fn write(&mut self, bytes: &[u8]) -> MountResult<usize> {
        self.commands.push(bytes.to_vec());
        match self.handle(bytes) {
            Some(reply) => {
                trace!("Simulator reply: {:?}", printable(&reply));
                self.replies.push(&reply);
            }
            None => debug!("Simulator ignored {:?}", printable(bytes)),
        }
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
    use crate::clock::FakeClock;
    use approx::assert_abs_diff_eq;
    use chrono::{TimeZone, Utc};

    fn clock() -> FakeClock {
        FakeClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 22, 0, 0).unwrap())
    }

    fn send(sim: &mut SynscanSimulator<FakeClock>, bytes: &[u8], reply_len: usize) -> Vec<u8> {
        sim.write(bytes).unwrap();
        sim.read_until(Terminator::Count(reply_len), Duration::from_millis(10))
            .unwrap()
    }

    #[test]
    fn test_handshake_replies() {
        let mut sim = SynscanSimulator::eq6(clock());
        assert_eq!(send(&mut sim, b"Kx", 2), b"x#");
        assert_eq!(send(&mut sim, b"J", 2), vec![1, b'#']);
        assert_eq!(send(&mut sim, b"m", 2), vec![0, b'#']);

        let mut legacy = SynscanSimulator::new(SynscanProtocol::Legacy, 130, clock());
        assert_eq!(send(&mut legacy, b"V", 4), vec![3, 37, 2, b'#']);
        assert!(legacy.is_alt_az());
    }

    #[test]
    fn test_goto_takes_several_polls() {
        let mut sim = SynscanSimulator::eq6(clock());
        send(&mut sim, b"r80000000,15555555", 1);

        let mut polls = 0;
        while send(&mut sim, b"L", 2) == b"1#" {
            polls += 1;
            assert!(polls < 50);
        }
        assert!(polls > 1);
        assert_eq!(sim.tracking_mode(), 2);
        let sky = sim.equatorial();
        assert_abs_diff_eq!(sky.ra_hours(), 12.0, epsilon = 1e-6);
        assert_abs_diff_eq!(sky.dec_degrees(), 30.0, epsilon = 1e-6);
    }

    #[test]
    fn test_passthrough_moves_axis_until_stopped() {
        let mut sim = SynscanSimulator::new(SynscanProtocol::Legacy, 130, clock());
        let start = sim.horizontal();
        send(&mut sim, &[b'P', 2, 17, 36, 7, 0, 0, 0], 1);
        send(&mut sim, b"L", 2);
        send(&mut sim, b"L", 2);
        send(&mut sim, &[b'P', 2, 17, 37, 0, 0, 0, 0], 1);
        send(&mut sim, b"L", 2);
        assert_abs_diff_eq!(sim.horizontal().altitude_deg, start.altitude_deg + 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unknown_command_is_silent() {
        let mut sim = SynscanSimulator::eq6(clock());
        sim.write(b"Q").unwrap();
        let err = sim
            .read_until(Terminator::Count(2), Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, crate::MountError::TransportTimeout));
    }
}
