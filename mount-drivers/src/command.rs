//! Mount commands as data.
//!
//! Clients (the CLI, a network front end, a script) build a [`MountCommand`]
//! once at their boundary, usually by deserializing JSON, and hand it to
//! [`dispatch`], which routes it to the matching [`MountSession`] operation.

use serde::{Deserialize, Serialize};
use sky_math::{CataloguePosition, HorizontalPosition, ObservedPosition, ObserverLocation};

use crate::clock::Clock;
use crate::codec::{MountCodec, TrackMode};
use crate::error::MountResult;
use crate::motion::{Axis, Direction, MotionCommand};
use crate::park::ParkStore;
use crate::poller::StatusSnapshot;
use crate::session::{MountInfo, MountSession};
use crate::transport::Transport;

/// Reference frame of coordinates in a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoordFrame {
    /// Mean place at J2000.0
    #[default]
    J2000,
    /// Apparent place at the current date
    JNow,
}

/// Custom slew rate target axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateAxis {
    Ra,
    Dec,
}

impl From<RateAxis> for Axis {
    fn from(axis: RateAxis) -> Self {
        match axis {
            RateAxis::Ra => Axis::Primary,
            RateAxis::Dec => Axis::Secondary,
        }
    }
}

/// One client request to the mount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MountCommand {
    /// Slew to RA/Dec.
    Goto {
        /// Right ascension in hours
        ra_hours: f64,
        /// Declination in degrees
        dec_deg: f64,
        #[serde(default)]
        frame: CoordFrame,
    },

    /// Slew to azimuth/altitude.
    GotoAltAz { azimuth_deg: f64, altitude_deg: f64 },

    /// Declare the mount to be pointing at RA/Dec.
    Sync {
        ra_hours: f64,
        dec_deg: f64,
        #[serde(default)]
        frame: CoordFrame,
    },

    Park,
    Unpark,
    Abort,

    SetTracking { enabled: bool },
    SetTrackMode { mode: TrackMode },
    /// Custom track rate as a multiple of sidereal.
    SetTrackRate { rate: f64 },

    /// Select a slew rate by index into the mount's rate labels.
    SetSlewRate { index: usize },
    SetCustomRate { axis: RateAxis, arcsec_per_sec: f64 },
    MoveAxis {
        direction: Direction,
        command: MotionCommand,
    },

    /// Guide rates as fractions of sidereal.
    SetGuideRates { ra: f64, de: f64 },
    Guide { direction: Direction, duration_ms: u32 },

    SetParkCurrent,
    SetParkDefault,
    SetParkPosition { azimuth_deg: f64, altitude_deg: f64 },

    FindHome,
    GotoHome,
    SetHome,

    SetLocation { location: ObserverLocation },

    /// Poll the mount once.
    Status,
    Info,
}

/// What a dispatched command returns.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Done,
    Status(StatusSnapshot),
    Info(MountInfo),
}

/// Run `command` against `session`.
pub fn dispatch<C, T, K, S>(
    session: &mut MountSession<C, T, K, S>,
    command: MountCommand,
) -> MountResult<CommandOutput>
where
    C: MountCodec,
    T: Transport,
    K: Clock,
    S: ParkStore,
{
    match command {
        MountCommand::Goto {
            ra_hours,
            dec_deg,
            frame,
        } => match frame {
            CoordFrame::J2000 => session.goto(CataloguePosition::new(ra_hours, dec_deg))?,
            CoordFrame::JNow => session.goto(ObservedPosition::new(ra_hours, dec_deg))?,
        },
        MountCommand::GotoAltAz {
            azimuth_deg,
            altitude_deg,
        } => session.goto_altaz(HorizontalPosition::new(azimuth_deg, altitude_deg))?,
        MountCommand::Sync {
            ra_hours,
            dec_deg,
            frame,
        } => match frame {
            CoordFrame::J2000 => session.sync(CataloguePosition::new(ra_hours, dec_deg))?,
            CoordFrame::JNow => session.sync(ObservedPosition::new(ra_hours, dec_deg))?,
        },
        MountCommand::Park => session.park()?,
        MountCommand::Unpark => session.unpark()?,
        MountCommand::Abort => session.abort()?,
        MountCommand::SetTracking { enabled } => session.set_track_enabled(enabled)?,
        MountCommand::SetTrackMode { mode } => session.set_track_mode(mode)?,
        MountCommand::SetTrackRate { rate } => session.set_track_rate(rate)?,
        MountCommand::SetSlewRate { index } => session.set_slew_rate(index)?,
        MountCommand::SetCustomRate {
            axis,
            arcsec_per_sec,
        } => session.set_custom_rate(axis.into(), arcsec_per_sec)?,
        MountCommand::MoveAxis { direction, command } => session.move_axis(direction, command)?,
        MountCommand::SetGuideRates { ra, de } => session.set_guide_rates(ra, de)?,
        MountCommand::Guide {
            direction,
            duration_ms,
        } => session.guide(direction, duration_ms)?,
        MountCommand::SetParkCurrent => session.set_park_current()?,
        MountCommand::SetParkDefault => session.set_park_default()?,
        MountCommand::SetParkPosition {
            azimuth_deg,
            altitude_deg,
        } => session.set_park_position(HorizontalPosition::new(azimuth_deg, altitude_deg))?,
        MountCommand::FindHome => session.find_home()?,
        MountCommand::GotoHome => session.goto_home()?,
        MountCommand::SetHome => session.set_current_as_home()?,
        MountCommand::SetLocation { location } => session.set_location(location)?,
        MountCommand::Status => return Ok(CommandOutput::Status(session.on_timer_tick())),
        MountCommand::Info => return Ok(CommandOutput::Info(session.mount_info())),
    }
    Ok(CommandOutput::Done)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goto_defaults_to_j2000() {
        let command: MountCommand =
            serde_json::from_str(r#"{"type": "goto", "ra_hours": 5.5, "dec_deg": -5.4}"#).unwrap();
        assert_eq!(
            command,
            MountCommand::Goto {
                ra_hours: 5.5,
                dec_deg: -5.4,
                frame: CoordFrame::J2000
            }
        );
    }

    #[test]
    fn test_move_axis_json() {
        let command: MountCommand = serde_json::from_str(
            r#"{"type": "move_axis", "direction": "west", "command": "start"}"#,
        )
        .unwrap();
        assert_eq!(
            command,
            MountCommand::MoveAxis {
                direction: Direction::West,
                command: MotionCommand::Start
            }
        );
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(serde_json::from_str::<MountCommand>(r#"{"type": "self_destruct"}"#).is_err());
    }

    #[test]
    fn test_frame_names() {
        assert_eq!(serde_json::to_string(&CoordFrame::JNow).unwrap(), "\"jnow\"");
        assert_eq!(Axis::from(RateAxis::Dec), Axis::Secondary);
    }
}
