//! Telescope mount drivers.
//!
//! A [`MountSession`] drives one mount over a byte [`Transport`](transport::Transport):
//! a protocol codec turns logical operations into wire requests, the
//! [`MountStateMachine`](state::MountStateMachine) owns the single
//! authoritative [`TrackingState`], and a periodic
//! [`on_timer_tick`](MountSession::on_timer_tick) polls status and position,
//! finishing slews and parks. Positions are accepted and reported in either
//! J2000 (catalogue) or JNow (observed) using the frame-typed positions from
//! `sky-math`; each codec declares the frame its mount speaks.
//!
//! # Features
//!
//! ## Mount Families
//! - `synscan` - Sky-Watcher Synscan hand controllers (current 32-bit and
//!   legacy 24-bit firmware)
//! - `ieq` - iOptron iEQ/CEM/GEM mounts
//!
//! Both are enabled by default.

pub mod clock;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod motion;
pub mod park;
pub mod poller;
pub mod session;
pub mod sim;
pub mod state;
pub mod transport;

pub use clock::{Clock, FakeClock, SystemClock};
pub use codec::{MountCodec, MountFamily};
pub use command::{dispatch, MountCommand};
pub use config::MountConfig;
pub use error::{DecodeError, MountError, MountResult};
pub use motion::{Direction, MotionCommand};
pub use poller::StatusSnapshot;
pub use session::{MountInfo, MountSession};
pub use state::TrackingState;
