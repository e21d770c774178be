//! Protocol simulators.
//!
//! Each simulator is a [`Transport`](crate::transport::Transport) that
//! interprets the commands written to it the way the real controller would
//! and queues the replies. Motion advances whenever the driver polls the
//! goto/status flag, so a goto takes a few poll ticks to finish whatever the
//! wall-clock poll period is.

#[cfg(feature = "ieq")]
mod ieq;
#[cfg(feature = "synscan")]
mod synscan;

#[cfg(feature = "ieq")]
pub use ieq::IeqSimulator;
#[cfg(feature = "synscan")]
pub use synscan::{SynscanProtocol, SynscanSimulator};

use std::collections::VecDeque;
use std::time::Duration;

use sky_math::angles::range_180;

use crate::error::MountResult;
use crate::transport::{read_framed, Terminator};

/// Largest goto step per status poll, degrees.
pub const GOTO_STEP_DEG: f64 = 10.0;

/// Reply bytes waiting to be read.
#[derive(Debug, Default)]
pub(crate) struct ReplyQueue {
    bytes: VecDeque<u8>,
}

impl ReplyQueue {
    pub(crate) fn push(&mut self, reply: &[u8]) {
        self.bytes.extend(reply);
    }

    pub(crate) fn read(&mut self, terminator: Terminator, timeout: Duration) -> MountResult<Vec<u8>> {
        read_framed(&mut self.bytes, terminator, timeout)
    }

    pub(crate) fn clear(&mut self) {
        self.bytes.clear();
    }
}

/// Move `current` toward `target` by at most `step`. Returns the new value
/// and whether it arrived.
pub(crate) fn approach(current: f64, target: f64, step: f64) -> (f64, bool) {
    let error = target - current;
    if error.abs() <= step {
        (target, true)
    } else {
        (current + step.copysign(error), false)
    }
}

/// Like [`approach`] for an angle that wraps at 360 degrees.
pub(crate) fn approach_wrapped(current: f64, target: f64, step: f64) -> (f64, bool) {
    let error = range_180(target - current);
    if error.abs() <= step {
        (target, true)
    } else {
        (current + step.copysign(error), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_approach_stops_at_target() {
        assert_eq!(approach(0.0, 25.0, 10.0), (10.0, false));
        assert_eq!(approach(20.0, 25.0, 10.0), (25.0, true));
        assert_eq!(approach(0.0, -5.0, 10.0), (-5.0, true));
    }

    #[test]
    fn test_approach_wrapped_takes_short_way() {
        let (value, arrived) = approach_wrapped(355.0, 20.0, 10.0);
        assert!(!arrived);
        assert_abs_diff_eq!(value, 365.0);
    }

    #[test]
    fn test_reply_queue_frames_replies() {
        let mut queue = ReplyQueue::default();
        queue.push(b"1#0#");
        assert_eq!(queue.read(Terminator::Byte(b'#'), Duration::from_millis(10)).unwrap(), b"1#");
        assert_eq!(queue.read(Terminator::Count(2), Duration::from_millis(10)).unwrap(), b"0#");
        assert!(queue.read(Terminator::Count(1), Duration::from_millis(10)).is_err());
    }
}
