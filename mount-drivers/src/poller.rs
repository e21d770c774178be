//! One round of status reads per timer tick.
//!
//! The poller issues the family's status queries, then the position queries,
//! and hands decoded values to the session. It never changes state itself.
//! A round that fails part way leaves the previous snapshot in place,
//! flagged stale.

use chrono::{DateTime, Utc};
use sky_math::{
    equatorial_to_horizontal, CataloguePosition, Frame, HorizontalPosition, ObservedPosition,
    ObserverLocation,
};
use tracing::{debug, warn};

use crate::codec::{MountCodec, PierSide, StatusFields, TrackingFlag};
use crate::error::{MountError, MountResult};
use crate::state::TrackingState;
use crate::transport::{Link, Transport};

/// Identical alt/az reads needed before a settle-style park counts as done.
pub const SETTLE_REPEATS: u32 = 2;

/// How often a park that stopped short is re-commanded.
pub const MAX_REPARKS: u32 = 2;

/// Distance from the park target beyond which a settled mount is re-parked.
pub const PARK_MISS_DEG: f64 = 0.05;

/// What the last poll learned.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub state: TrackingState,
    /// Apparent place (JNow)
    pub observed: Option<ObservedPosition>,
    /// Mean place (J2000)
    pub catalogue: Option<CataloguePosition>,
    pub horizontal: Option<HorizontalPosition>,
    pub pier_side: Option<PierSide>,
    pub tracking: TrackingFlag,
    /// The last poll failed; positions are from an earlier round
    pub stale: bool,
    pub timestamp: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Snapshot before any successful poll.
    pub fn empty(state: TrackingState, timestamp: DateTime<Utc>) -> Self {
        Self {
            state,
            observed: None,
            catalogue: None,
            horizontal: None,
            pier_side: None,
            tracking: TrackingFlag::Off,
            stale: true,
            timestamp,
        }
    }
}

/// Positions read in one round, in every frame the session reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReading {
    pub observed: ObservedPosition,
    pub catalogue: CataloguePosition,
    pub horizontal: HorizontalPosition,
}

/// Run the status queries and decode them.
pub fn read_status<C, T>(codec: &C, link: &mut Link<T>) -> MountResult<StatusFields>
where
    C: MountCodec,
    T: Transport,
{
    let replies = link.execute(&codec.status_requests())?;
    let fields = codec.decode_status(&replies)?;
    debug!("Mount status: {fields:?}");
    Ok(fields)
}

/// Read RA/Dec, and alt/az when the protocol has a direct readout.
///
/// Without one, alt/az is computed from the observed place at `jd`.
pub fn read_position<C, T>(
    codec: &C,
    link: &mut Link<T>,
    location: &ObserverLocation,
    jd: f64,
) -> MountResult<PositionReading>
where
    C: MountCodec,
    T: Transport,
{
    let reply = link.exchange(&codec.position_request())?;
    let native = codec.decode_position(&reply)?;
    let observed = C::Frame::to_observed(native, jd);
    let catalogue = sky_math::observed_to_catalogue(&observed, jd);

    let horizontal = match codec.horizontal_request() {
        Some(request) => {
            let reply = link.exchange(&request)?;
            codec.decode_horizontal(&reply)?
        }
        None => equatorial_to_horizontal(&observed, location, jd),
    };

    Ok(PositionReading {
        observed,
        catalogue,
        horizontal,
    })
}

/// Log a failed poll, keeping timeouts and garbled replies apart.
pub fn log_poll_failure(err: &MountError) {
    match err {
        MountError::TransportTimeout => warn!("Status poll: no reply from mount"),
        MountError::Decode(e) => warn!("Status poll: {e}"),
        other => warn!("Status poll failed: {other}"),
    }
}

/// Verdict of one settle observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleVerdict {
    /// Still moving
    Moving,
    /// Stopped at the park position
    Settled,
    /// Stopped short; send the park again
    Repark,
}

/// Park completion for mounts without a goto flag: the mount has parked
/// once its alt/az readout stops changing.
#[derive(Debug, Clone, Default)]
pub struct ParkSettle {
    last: Option<HorizontalPosition>,
    identical: u32,
    reparks: u32,
}

impl ParkSettle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching a new park.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn reparks(&self) -> u32 {
        self.reparks
    }

    pub fn observe(&mut self, current: HorizontalPosition, target: &HorizontalPosition) -> SettleVerdict {
        if self.last == Some(current) {
            self.identical += 1;
        } else {
            self.identical = 1;
        }
        self.last = Some(current);

        if self.identical < SETTLE_REPEATS {
            return SettleVerdict::Moving;
        }

        let miss = horizontal_separation(&current, target);
        if miss > PARK_MISS_DEG && self.reparks < MAX_REPARKS {
            self.reparks += 1;
            self.last = None;
            self.identical = 0;
            warn!(
                "Mount stopped {miss:.3} deg short of park position, re-parking ({}/{MAX_REPARKS})",
                self.reparks
            );
            return SettleVerdict::Repark;
        }
        SettleVerdict::Settled
    }
}

/// Great-circle distance between two alt/az positions in degrees.
pub fn horizontal_separation(a: &HorizontalPosition, b: &HorizontalPosition) -> f64 {
    let (alt1, alt2) = (a.altitude_deg.to_radians(), b.altitude_deg.to_radians());
    let d_az = (a.azimuth_deg - b.azimuth_deg).to_radians();
    let cos_d = alt1.sin() * alt2.sin() + alt1.cos() * alt2.cos() * d_az.cos();
    cos_d.clamp(-1.0, 1.0).acos().to_degrees()
}

#[cfg(all(test, feature = "synscan"))]
mod tests {
    use super::*;
    use crate::codec::synscan::SynscanCodec;
    use crate::transport::{MockTransport, DEFAULT_TIMEOUT};
    use approx::assert_abs_diff_eq;

    fn connected_codec() -> SynscanCodec {
        let mut codec = SynscanCodec::new();
        codec
            .apply_handshake(&[
                b"x#".to_vec(),
                vec![1, b'#'],
                b"042705#".to_vec(),
                vec![0, b'#'],
            ])
            .unwrap();
        codec
    }

    #[test]
    fn test_read_status_round() {
        let codec = connected_codec();
        let mock = MockTransport::new();
        mock.queue_reply(b"1#");
        mock.queue_reply(b"E#");
        mock.queue_reply(&[2, b'#']);
        let mut link = Link::new(mock.clone(), DEFAULT_TIMEOUT);

        let fields = read_status(&codec, &mut link).unwrap();
        assert!(fields.goto_in_progress);
        assert_eq!(fields.pier_side, Some(PierSide::West));
        assert_eq!(mock.writes(), vec![b"L".to_vec(), b"p".to_vec(), b"t".to_vec()]);
    }

    #[test]
    fn test_read_status_timeout() {
        let codec = connected_codec();
        let mock = MockTransport::new();
        mock.queue_reply(b"0#");
        mock.queue_timeout();
        let mut link = Link::new(mock.clone(), DEFAULT_TIMEOUT);

        let err = read_status(&codec, &mut link).unwrap_err();
        assert!(matches!(err, MountError::TransportTimeout));
        // The round stops at the failed query
        assert_eq!(mock.writes().len(), 2);
    }

    #[test]
    fn test_read_position_in_all_frames() {
        let codec = connected_codec();
        let mock = MockTransport::new();
        mock.queue_reply(b"80000000,15555555#");
        mock.queue_reply(b"40000000,10000000#");
        let mut link = Link::new(mock, DEFAULT_TIMEOUT);
        let jd = sky_math::J2000 + 9000.0;

        let reading = read_position(&codec, &mut link, &ObserverLocation::default(), jd).unwrap();
        assert_abs_diff_eq!(reading.catalogue.ra_hours(), 12.0, epsilon = 1e-5);
        assert_abs_diff_eq!(reading.catalogue.dec_degrees(), 30.0, epsilon = 1e-5);
        // Twenty five years of precession separate the two frames
        assert!(reading.observed.separation(&reading.catalogue.into_observed(sky_math::J2000)) > 0.1);
        assert_abs_diff_eq!(reading.horizontal.azimuth_deg, 90.0, epsilon = 1e-6);
        assert_abs_diff_eq!(reading.horizontal.altitude_deg, 22.5, epsilon = 1e-6);
    }

    #[test]
    fn test_settle_needs_identical_reads() {
        let target = HorizontalPosition::new(0.0, 90.0);
        let mut settle = ParkSettle::new();
        assert_eq!(settle.observe(HorizontalPosition::new(0.0, 80.0), &target), SettleVerdict::Moving);
        assert_eq!(settle.observe(HorizontalPosition::new(0.0, 89.99), &target), SettleVerdict::Moving);
        assert_eq!(settle.observe(HorizontalPosition::new(0.0, 89.99), &target), SettleVerdict::Settled);
    }

    #[test]
    fn test_settle_reparks_at_most_twice() {
        let target = HorizontalPosition::new(0.0, 90.0);
        let short = HorizontalPosition::new(0.0, 85.0);
        let mut settle = ParkSettle::new();

        let mut verdicts = Vec::new();
        for _ in 0..6 {
            verdicts.push(settle.observe(short, &target));
        }
        assert_eq!(
            verdicts,
            vec![
                SettleVerdict::Moving,
                SettleVerdict::Repark,
                SettleVerdict::Moving,
                SettleVerdict::Repark,
                SettleVerdict::Moving,
                SettleVerdict::Settled,
            ]
        );
        assert_eq!(settle.reparks(), MAX_REPARKS);
    }

    #[test]
    fn test_horizontal_separation_at_zenith_ignores_azimuth() {
        let a = HorizontalPosition::new(0.0, 90.0);
        let b = HorizontalPosition::new(123.0, 90.0);
        assert_abs_diff_eq!(horizontal_separation(&a, &b), 0.0, epsilon = 1e-6);
        let c = HorizontalPosition::new(10.0, 0.0);
        assert_abs_diff_eq!(horizontal_separation(&a, &c), 90.0, epsilon = 1e-9);
    }
}
