//! Manual motion, guide pulses and the alt/az servo.
//!
//! [`MotionController`] keeps the client-side motion bookkeeping: the
//! selected slew rate, per-axis custom rates, guide rates, which way each
//! axis is currently being driven, and the one-shot guide timers.
//! [`AltAzServo`] steps alt-az mounts that lack a native goto toward a
//! target using a handful of discrete speeds.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sky_math::angles::range_180;
use sky_math::HorizontalPosition;
use strum::{Display, EnumIter, EnumString};

use crate::codec::SIDEREAL_RATE_ARCSEC;
use crate::error::{MountError, MountResult};

/// Servo tolerance in degrees.
pub const SERVO_TOLERANCE_DEG: f64 = 0.01;

/// Default guide rate as a fraction of sidereal.
pub const DEFAULT_GUIDE_RATE: f64 = 0.5;

/// Mount axis. Primary is RA or azimuth, secondary is DEC or altitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Axis {
    Primary,
    Secondary,
}

impl Axis {
    pub fn index(&self) -> usize {
        match self {
            Axis::Primary => 0,
            Axis::Secondary => 1,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    South,
    West,
    East,
}

impl Direction {
    pub fn axis(&self) -> Axis {
        match self {
            Direction::North | Direction::South => Axis::Secondary,
            Direction::West | Direction::East => Axis::Primary,
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::East => Direction::West,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionCommand {
    Start,
    Stop,
}

/// Speed for a move request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisRate {
    /// One of the mount's preset speeds, 1 (slowest) to 9
    Preset(u8),
    /// Continuously variable speed in arcsec/s
    Custom(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GuideTimer {
    direction: Direction,
    deadline: DateTime<Utc>,
}

/// Client-side motion state.
#[derive(Debug, Clone)]
pub struct MotionController {
    slew_index: usize,
    custom_rates: [f64; 2],
    guide_ra: f64,
    guide_de: f64,
    moving: [Option<Direction>; 2],
    guide_timers: [Option<GuideTimer>; 2],
}

impl MotionController {
    /// Start at `slew_index` with the given per-axis custom rates (arcsec/s).
    pub fn new(slew_index: usize, custom_rates: [f64; 2]) -> Self {
        Self {
            slew_index,
            custom_rates,
            guide_ra: DEFAULT_GUIDE_RATE,
            guide_de: DEFAULT_GUIDE_RATE,
            moving: [None; 2],
            guide_timers: [None; 2],
        }
    }

    pub fn slew_index(&self) -> usize {
        self.slew_index
    }

    pub fn set_slew_index(&mut self, index: usize) {
        self.slew_index = index;
    }

    pub fn custom_rate(&self, axis: Axis) -> f64 {
        self.custom_rates[axis.index()]
    }

    pub fn set_custom_rate(
        &mut self,
        axis: Axis,
        arcsec_per_sec: f64,
        range: &RangeInclusive<f64>,
    ) -> MountResult<()> {
        if !range.contains(&arcsec_per_sec) {
            return Err(MountError::OutOfRange(format!(
                "custom rate {arcsec_per_sec} arcsec/s outside {}..={}",
                range.start(),
                range.end()
            )));
        }
        self.custom_rates[axis.index()] = arcsec_per_sec;
        Ok(())
    }

    pub fn guide_rates(&self) -> (f64, f64) {
        (self.guide_ra, self.guide_de)
    }

    pub fn set_guide_rates(&mut self, ra: f64, de: f64) {
        self.guide_ra = ra;
        self.guide_de = de;
    }

    /// Rate for a manual move on `axis` at the selected slew rate.
    ///
    /// With `custom_available`, the last slew-rate index selects the
    /// per-axis custom rate; every other index `i` is preset `i + 1`.
    pub fn slew_rate(&self, axis: Axis, labels: usize, custom_available: bool) -> AxisRate {
        if custom_available && self.slew_index + 1 == labels {
            AxisRate::Custom(self.custom_rates[axis.index()])
        } else {
            AxisRate::Preset(u8::try_from(self.slew_index + 1).unwrap_or(9))
        }
    }

    /// Speed of a timed guide pulse in arcsec/s.
    ///
    /// North/south and west run at sidereal plus the guide fraction; east
    /// runs at the guide fraction alone.
    pub fn guide_speed(&self, direction: Direction) -> f64 {
        match direction {
            Direction::North | Direction::South => SIDEREAL_RATE_ARCSEC * (1.0 + self.guide_de),
            Direction::West => SIDEREAL_RATE_ARCSEC * (1.0 + self.guide_ra),
            Direction::East => SIDEREAL_RATE_ARCSEC * self.guide_ra,
        }
    }

    pub fn moving(&self, axis: Axis) -> Option<Direction> {
        self.moving[axis.index()]
    }

    /// Whether starting `direction` must first stop the axis.
    pub fn needs_stop_before(&self, direction: Direction) -> bool {
        self.moving[direction.axis().index()] == Some(direction.opposite())
    }

    pub fn started(&mut self, direction: Direction) {
        self.moving[direction.axis().index()] = Some(direction);
    }

    pub fn stopped(&mut self, axis: Axis) {
        self.moving[axis.index()] = None;
        self.guide_timers[axis.index()] = None;
    }

    pub fn any_moving(&self) -> bool {
        self.moving.iter().any(Option::is_some)
    }

    /// Axes currently driven, in axis order.
    pub fn moving_axes(&self) -> Vec<Axis> {
        [Axis::Primary, Axis::Secondary]
            .into_iter()
            .filter(|axis| self.moving[axis.index()].is_some())
            .collect()
    }

    /// Arm (or replace) the stop timer for a guide pulse.
    ///
    /// Returns true if a pending pulse on the same axis was replaced.
    pub fn arm_guide(&mut self, direction: Direction, deadline: DateTime<Utc>) -> bool {
        let slot = &mut self.guide_timers[direction.axis().index()];
        let replaced = slot.is_some();
        *slot = Some(GuideTimer {
            direction,
            deadline,
        });
        self.moving[direction.axis().index()] = Some(direction);
        replaced
    }

    /// Take every guide timer due at `now`, returning the axes to stop.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<(Axis, Direction)> {
        let mut due = Vec::new();
        for axis in [Axis::Primary, Axis::Secondary] {
            if let Some(timer) = self.guide_timers[axis.index()] {
                if timer.deadline <= now {
                    self.guide_timers[axis.index()] = None;
                    due.push((axis, timer.direction));
                }
            }
        }
        due
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.guide_timers
            .iter()
            .flatten()
            .map(|timer| timer.deadline)
            .min()
    }

    pub fn guiding(&self, axis: Axis) -> bool {
        self.guide_timers[axis.index()].is_some()
    }

    /// Forget all motion and timers.
    pub fn clear(&mut self) {
        self.moving = [None; 2];
        self.guide_timers = [None; 2];
    }
}

/// One servo action for an axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServoCommand {
    Drive { direction: Direction, rate: u8 },
    Stop(Axis),
}

/// Discrete preset speed for an absolute error in degrees, or `None` once
/// inside tolerance.
pub fn speed_bucket(error_deg: f64) -> Option<u8> {
    let error = error_deg.abs();
    if error <= SERVO_TOLERANCE_DEG {
        None
    } else if error > 4.0 {
        Some(9)
    } else if error > 1.2 {
        Some(7)
    } else if error > 0.5 {
        Some(5)
    } else if error > 0.2 {
        Some(4)
    } else if error > 0.025 {
        Some(3)
    } else {
        Some(2)
    }
}

/// Alt/az servo memory: the last command issued per axis.
#[derive(Debug, Clone, Default)]
pub struct AltAzServo {
    last: [Option<(Direction, u8)>; 2],
}

impl AltAzServo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.last = [None; 2];
    }

    /// Compare `current` with `target` and return the commands to issue.
    ///
    /// A drive command is only returned when an axis changes speed bucket or
    /// direction; a stop only when the axis was being driven.
    pub fn step(
        &mut self,
        current: &HorizontalPosition,
        target: &HorizontalPosition,
    ) -> Vec<ServoCommand> {
        let alt_error = current.altitude_deg - target.altitude_deg;
        let az_error = range_180(current.azimuth_deg - target.azimuth_deg);

        let alt_direction = if alt_error < 0.0 {
            Direction::North
        } else {
            Direction::South
        };
        let az_direction = if az_error > 0.0 {
            Direction::West
        } else {
            Direction::East
        };

        let mut commands = Vec::new();
        self.step_axis(Axis::Secondary, alt_error, alt_direction, &mut commands);
        self.step_axis(Axis::Primary, az_error, az_direction, &mut commands);
        commands
    }

    fn step_axis(
        &mut self,
        axis: Axis,
        error: f64,
        direction: Direction,
        commands: &mut Vec<ServoCommand>,
    ) {
        let slot = &mut self.last[axis.index()];
        match speed_bucket(error) {
            None => {
                if slot.take().is_some() {
                    commands.push(ServoCommand::Stop(axis));
                }
            }
            Some(rate) => {
                if *slot != Some((direction, rate)) {
                    *slot = Some((direction, rate));
                    commands.push(ServoCommand::Drive { direction, rate });
                }
            }
        }
    }

    /// Both axes are inside tolerance of `target`.
    pub fn on_target(current: &HorizontalPosition, target: &HorizontalPosition) -> bool {
        speed_bucket(current.altitude_deg - target.altitude_deg).is_none()
            && speed_bucket(range_180(current.azimuth_deg - target.azimuth_deg)).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeDelta, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 22, 0, 0).unwrap()
    }

    #[test]
    fn test_speed_buckets() {
        assert_eq!(speed_bucket(10.0), Some(9));
        assert_eq!(speed_bucket(-2.0), Some(7));
        assert_eq!(speed_bucket(0.8), Some(5));
        assert_eq!(speed_bucket(0.3), Some(4));
        assert_eq!(speed_bucket(0.1), Some(3));
        assert_eq!(speed_bucket(0.02), Some(2));
        assert_eq!(speed_bucket(0.005), None);
    }

    #[test]
    fn test_slew_rate_selection() {
        let mut motion = MotionController::new(0, [10.0, 20.0]);
        assert_eq!(motion.slew_rate(Axis::Primary, 10, true), AxisRate::Preset(1));

        motion.set_slew_index(9);
        assert_eq!(motion.slew_rate(Axis::Secondary, 10, true), AxisRate::Custom(20.0));
        // Without custom support the top index is just the fastest preset
        assert_eq!(motion.slew_rate(Axis::Secondary, 10, false), AxisRate::Preset(10));
    }

    #[test]
    fn test_custom_rate_range_checked() {
        let mut motion = MotionController::new(0, [1.0, 1.0]);
        let range = 0.05..=800.0;
        assert!(motion.set_custom_rate(Axis::Primary, 900.0, &range).is_err());
        motion.set_custom_rate(Axis::Primary, 120.0, &range).unwrap();
        assert_relative_eq!(motion.custom_rate(Axis::Primary), 120.0);
    }

    #[test]
    fn test_guide_speeds() {
        let motion = MotionController::new(0, [0.0; 2]);
        assert_relative_eq!(motion.guide_speed(Direction::West), SIDEREAL_RATE_ARCSEC * 1.5);
        assert_relative_eq!(motion.guide_speed(Direction::East), SIDEREAL_RATE_ARCSEC * 0.5);
        assert_relative_eq!(motion.guide_speed(Direction::North), SIDEREAL_RATE_ARCSEC * 1.5);
    }

    #[test]
    fn test_reverse_needs_stop() {
        let mut motion = MotionController::new(0, [0.0; 2]);
        motion.started(Direction::North);
        assert!(motion.needs_stop_before(Direction::South));
        assert!(!motion.needs_stop_before(Direction::North));
        assert!(!motion.needs_stop_before(Direction::East));
        motion.stopped(Axis::Secondary);
        assert!(!motion.any_moving());
    }

    #[test]
    fn test_guide_timer_replaced_and_fired_once() {
        let mut motion = MotionController::new(0, [0.0; 2]);
        assert!(!motion.arm_guide(Direction::West, t0() + TimeDelta::milliseconds(100)));
        assert!(motion.arm_guide(Direction::East, t0() + TimeDelta::milliseconds(50)));
        assert_eq!(motion.next_deadline(), Some(t0() + TimeDelta::milliseconds(50)));

        assert!(motion.take_due(t0()).is_empty());
        let due = motion.take_due(t0() + TimeDelta::milliseconds(50));
        assert_eq!(due, vec![(Axis::Primary, Direction::East)]);
        assert!(motion.take_due(t0() + TimeDelta::seconds(1)).is_empty());
        assert_eq!(motion.next_deadline(), None);
    }

    #[test]
    fn test_servo_issues_commands_only_on_change() {
        let mut servo = AltAzServo::new();
        let target = HorizontalPosition::new(100.0, 40.0);

        let commands = servo.step(&HorizontalPosition::new(90.0, 45.0), &target);
        assert_eq!(
            commands,
            vec![
                ServoCommand::Drive {
                    direction: Direction::South,
                    rate: 9
                },
                ServoCommand::Drive {
                    direction: Direction::East,
                    rate: 9
                },
            ]
        );

        // Same buckets, nothing to send
        assert!(servo
            .step(&HorizontalPosition::new(91.0, 44.9), &target)
            .is_empty());

        // Altitude arrives, azimuth slows down
        let commands = servo.step(&HorizontalPosition::new(99.0, 40.005), &target);
        assert_eq!(
            commands,
            vec![
                ServoCommand::Stop(Axis::Secondary),
                ServoCommand::Drive {
                    direction: Direction::East,
                    rate: 5
                },
            ]
        );
    }

    #[test]
    fn test_servo_azimuth_wraps() {
        let mut servo = AltAzServo::new();
        let target = HorizontalPosition::new(1.0, 30.0);
        let commands = servo.step(&HorizontalPosition::new(359.0, 30.0), &target);
        assert_eq!(
            commands,
            vec![ServoCommand::Drive {
                direction: Direction::East,
                rate: 7
            }]
        );
        assert!(AltAzServo::on_target(
            &HorizontalPosition::new(0.995, 30.001),
            &target
        ));
    }
}
