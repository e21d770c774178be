//! Tracking/slewing/parking lifecycle.
//!
//! [`MountStateMachine`] owns the single authoritative [`TrackingState`].
//! Commands ask it for permission before any I/O ([`authorize`]) and report
//! back once their requests were acknowledged; status polls feed it decoded
//! [`StatusFields`]. Slews and parks only finish when a poll says so.
//!
//! [`authorize`]: MountStateMachine::authorize

use serde::{Deserialize, Serialize};
use sky_math::{HorizontalPosition, ObservedPosition};
use strum::{Display, IntoStaticStr};
use tracing::info;

use crate::codec::StatusFields;
use crate::error::{MountError, MountResult};

/// Polls to wait for a reported motion before trusting a "not slewing" status.
const MOTION_GRACE_POLLS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, Default)]
pub enum TrackingState {
    #[default]
    Idle,
    Slewing,
    Tracking,
    Parking,
    Parked,
}

/// Operations gated by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Goto,
    Sync,
    Park,
    Unpark,
    Abort,
    SetTracking,
    Move,
    Guide,
    SetPark,
    Home,
}

/// Answer to [`MountStateMachine::authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// Go ahead with the I/O.
    Proceed,
    /// Nothing to do; report success without I/O.
    AlreadySatisfied,
}

/// Where a slew is heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlewTarget {
    Equatorial(ObservedPosition),
    Horizontal(HorizontalPosition),
    Home,
}

/// When a slew counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlewCompletion {
    /// The first poll without the goto flag ends the slew.
    Immediate,
    /// The mount keeps reporting its previous status briefly after a goto,
    /// so the slew ends only after motion was seen (or a few polls passed).
    RequireMotion,
}

/// When a park counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkCompletion {
    /// Parked as soon as the park slew completes.
    GotoComplete,
    /// When the park slew completes the driver sends a "park now" command,
    /// and waits for the mount to report parked.
    Handoff,
    /// The mount has no usable goto flag while parking; parked is decided by
    /// the poller once the alt/az readout stops changing.
    Settle,
}

/// Outcome of feeding a status round to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    Changed {
        from: TrackingState,
        to: TrackingState,
    },
    /// A handoff park slew finished; the driver should send the park command.
    ParkSlewFinished,
}

#[derive(Debug, Clone)]
pub struct MountStateMachine {
    state: TrackingState,
    target: Option<SlewTarget>,
    servo: bool,
    slew_completion: SlewCompletion,
    park_completion: ParkCompletion,
    motion_seen: bool,
    polls_since_command: u32,
    handoff_sent: bool,
}

impl MountStateMachine {
    /// Start in `Parked` if the persisted flag says so, otherwise `Idle`.
    pub fn new(parked: bool, slew_completion: SlewCompletion) -> Self {
        Self {
            state: if parked {
                TrackingState::Parked
            } else {
                TrackingState::Idle
            },
            target: None,
            servo: false,
            slew_completion,
            park_completion: ParkCompletion::GotoComplete,
            motion_seen: false,
            polls_since_command: 0,
            handoff_sent: false,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn target(&self) -> Option<&SlewTarget> {
        self.target.as_ref()
    }

    /// The current slew is driven by the alt/az servo rather than the mount.
    pub fn servo_active(&self) -> bool {
        self.servo && self.state == TrackingState::Slewing
    }

    pub fn park_completion(&self) -> ParkCompletion {
        self.park_completion
    }

    /// Check whether `operation` is allowed from the current state.
    pub fn authorize(&self, operation: Operation) -> MountResult<Authorization> {
        use Authorization::{AlreadySatisfied, Proceed};
        use TrackingState::*;

        let decision = match (operation, self.state) {
            (Operation::Goto, Idle | Tracking | Slewing) => Some(Proceed),
            (Operation::Sync, Idle | Tracking) => Some(Proceed),
            (Operation::Park, Parked | Parking) => Some(AlreadySatisfied),
            (Operation::Park, _) => Some(Proceed),
            (Operation::Unpark, Parked) => Some(Proceed),
            (Operation::Abort, Idle | Parked) => Some(AlreadySatisfied),
            (Operation::Abort, _) => Some(Proceed),
            (Operation::SetTracking, Idle | Tracking) => Some(Proceed),
            (Operation::Move | Operation::Guide, Idle | Tracking | Slewing) => Some(Proceed),
            (Operation::SetPark, Idle | Tracking | Parked) => Some(Proceed),
            (Operation::Home, Idle | Tracking) => Some(Proceed),
            _ => None,
        };

        decision.ok_or(MountError::InvalidTransition {
            from: self.state,
            operation: operation.into(),
        })
    }

    /// A goto was acknowledged by the mount.
    pub fn goto_started(&mut self, target: SlewTarget, servo: bool) {
        self.target = Some(target);
        self.servo = servo;
        self.reset_motion();
        self.transition(TrackingState::Slewing, "goto");
    }

    /// A park slew was acknowledged by the mount.
    pub fn park_started(&mut self, target: SlewTarget, completion: ParkCompletion) {
        self.target = Some(target);
        self.servo = false;
        self.park_completion = completion;
        self.handoff_sent = false;
        self.reset_motion();
        self.transition(TrackingState::Parking, "park");
    }

    pub fn unparked(&mut self) {
        self.transition(TrackingState::Idle, "unpark");
    }

    /// Abort was acknowledged. Parking is abandoned without setting the park flag.
    pub fn aborted(&mut self) {
        self.clear_target();
        if self.state != TrackingState::Parked {
            self.transition(TrackingState::Idle, "abort");
        }
    }

    pub fn tracking_set(&mut self, enabled: bool) {
        let next = if enabled {
            TrackingState::Tracking
        } else {
            TrackingState::Idle
        };
        self.transition(next, "tracking command");
    }

    /// The alt/az servo brought both axes onto the target.
    pub fn servo_completed(&mut self, tracking: bool) {
        if self.servo_active() {
            self.clear_target();
            let next = if tracking {
                TrackingState::Tracking
            } else {
                TrackingState::Idle
            };
            self.transition(next, "servo on target");
        }
    }

    /// The poller decided a settle-style park has finished.
    pub fn park_completed(&mut self) {
        if self.state == TrackingState::Parking {
            self.clear_target();
            self.transition(TrackingState::Parked, "park settled");
        }
    }

    /// Apply one decoded status round.
    ///
    /// Never called with a partial round: a failed poll leaves the machine
    /// untouched.
    pub fn on_status(&mut self, fields: &StatusFields) -> Option<StatusEvent> {
        let from = self.state;

        if fields.parked && from != TrackingState::Parked {
            self.clear_target();
            self.transition(TrackingState::Parked, "mount reports parked");
            return self.changed(from);
        }

        match from {
            TrackingState::Slewing => {
                let home_reached =
                    fields.at_home && matches!(self.target, Some(SlewTarget::Home));
                if !home_reached && (self.servo || !self.slew_finished(fields)) {
                    return None;
                }
                self.clear_target();
                let next = if fields.tracking.is_on() {
                    TrackingState::Tracking
                } else {
                    TrackingState::Idle
                };
                self.transition(next, "slew complete");
                self.changed(from)
            }
            TrackingState::Parking => {
                if !self.slew_finished(fields) {
                    return None;
                }
                match self.park_completion {
                    ParkCompletion::GotoComplete => {
                        self.clear_target();
                        self.transition(TrackingState::Parked, "park slew complete");
                        self.changed(from)
                    }
                    ParkCompletion::Handoff if !self.handoff_sent => {
                        self.handoff_sent = true;
                        Some(StatusEvent::ParkSlewFinished)
                    }
                    ParkCompletion::Handoff | ParkCompletion::Settle => None,
                }
            }
            // Hand-pad gotos and meridian flips start without a command
            TrackingState::Idle | TrackingState::Tracking if fields.goto_in_progress => {
                self.clear_target();
                self.reset_motion();
                self.motion_seen = true;
                self.transition(TrackingState::Slewing, "mount reports slewing");
                self.changed(from)
            }
            TrackingState::Idle if fields.tracking.is_on() => {
                self.transition(TrackingState::Tracking, "mount reports tracking");
                self.changed(from)
            }
            TrackingState::Tracking if !fields.tracking.is_on() => {
                self.transition(TrackingState::Idle, "mount reports tracking off");
                self.changed(from)
            }
            _ => None,
        }
    }

    fn slew_finished(&mut self, fields: &StatusFields) -> bool {
        self.polls_since_command = self.polls_since_command.saturating_add(1);
        if fields.goto_in_progress {
            self.motion_seen = true;
            return false;
        }
        match self.slew_completion {
            SlewCompletion::Immediate => true,
            SlewCompletion::RequireMotion => {
                self.motion_seen || self.polls_since_command > MOTION_GRACE_POLLS
            }
        }
    }

    fn reset_motion(&mut self) {
        self.motion_seen = false;
        self.polls_since_command = 0;
    }

    fn clear_target(&mut self) {
        self.target = None;
        self.servo = false;
    }

    fn changed(&self, from: TrackingState) -> Option<StatusEvent> {
        (from != self.state).then_some(StatusEvent::Changed {
            from,
            to: self.state,
        })
    }

    fn transition(&mut self, next: TrackingState, cause: &str) {
        if next != self.state {
            info!("Mount state {} -> {} ({cause})", self.state, next);
            self.state = next;
        }
    }
}
