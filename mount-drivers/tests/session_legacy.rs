//! Legacy Synscan firmware: alt/az servo gotos and settle-style parking.

#![cfg(feature = "synscan")]

use approx::assert_abs_diff_eq;
use chrono::{TimeZone, Utc};
use mount_drivers::codec::synscan_legacy::SynscanLegacyCodec;
use mount_drivers::park::MemoryParkStore;
use mount_drivers::sim::{SynscanProtocol, SynscanSimulator};
use mount_drivers::{
    FakeClock, MountCodec, MountConfig, MountError, MountFamily, MountSession, TrackingState,
};
use sky_math::{CataloguePosition, HorizontalPosition, ObserverLocation};

/// Legacy model codes from 128 up are alt/az mounts.
const ALT_AZ_MODEL: u8 = 130;

type Session =
    MountSession<SynscanLegacyCodec, SynscanSimulator<FakeClock>, FakeClock, MemoryParkStore>;

fn connect() -> (Session, MemoryParkStore) {
    let clock = FakeClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 22, 0, 0).unwrap());
    let store = MemoryParkStore::new();
    let config = MountConfig {
        location: ObserverLocation::new(51.5, -0.1, 10.0),
        ..MountConfig::for_family(MountFamily::SynscanLegacy)
    };
    let session = MountSession::connect(
        SynscanLegacyCodec::new(),
        SynscanSimulator::new(SynscanProtocol::Legacy, ALT_AZ_MODEL, clock.clone()),
        clock,
        store.clone(),
        &config,
    )
    .unwrap();
    (session, store)
}

fn run_while(session: &mut Session, busy: TrackingState) -> (TrackingState, usize) {
    for polls in 1..=200 {
        let snapshot = session.on_timer_tick();
        assert!(!snapshot.stale, "poll failed while {busy}");
        if snapshot.state != busy {
            return (snapshot.state, polls);
        }
    }
    panic!("still {busy} after 200 polls");
}

#[test]
fn test_servo_goto_altaz_converges_and_tracks() {
    let (mut session, _) = connect();
    assert!(session.codec().servo_goto());

    let target = HorizontalPosition::new(120.0, 45.0);
    session.goto_altaz(target).unwrap();
    assert_eq!(session.state(), TrackingState::Slewing);
    // Tracking is switched off before the servo starts driving
    assert_eq!(session.transport().tracking_mode(), 0);

    let (state, polls) = run_while(&mut session, TrackingState::Slewing);
    assert_eq!(state, TrackingState::Tracking);
    assert!(polls > 5);

    let sim = session.transport();
    assert_eq!(sim.tracking_mode(), 1);
    let reached = sim.horizontal();
    assert_abs_diff_eq!(reached.azimuth_deg, 120.0, epsilon = 0.02);
    assert_abs_diff_eq!(reached.altitude_deg, 45.0, epsilon = 0.02);
}

#[test]
fn test_servo_goto_equatorial_lands_on_target() {
    let (mut session, _) = connect();
    let target = CataloguePosition::new(9.0, 40.0);
    session.goto(target).unwrap();

    let (state, _) = run_while(&mut session, TrackingState::Slewing);
    assert_eq!(state, TrackingState::Tracking);
    assert!(target.separation(&session.transport().equatorial()) < 0.05);
}

#[test]
fn test_abort_stops_servo_axes() {
    let (mut session, _) = connect();
    session.goto_altaz(HorizontalPosition::new(200.0, 60.0)).unwrap();
    session.on_timer_tick();
    session.on_timer_tick();
    assert_eq!(session.state(), TrackingState::Slewing);

    session.abort().unwrap();
    assert_eq!(session.state(), TrackingState::Idle);

    let commands = session.transport().commands();
    for axis in [16, 17] {
        let stop = [b'P', 2, axis, 37, 0, 0, 0, 0];
        assert!(commands.iter().any(|c| c.as_slice() == stop));
    }

    let held = session.transport().horizontal();
    session.on_timer_tick();
    session.on_timer_tick();
    assert_eq!(session.transport().horizontal(), held);
}

#[test]
fn test_park_completes_when_position_settles() {
    let (mut session, store) = connect();
    session.park().unwrap();
    assert_eq!(session.state(), TrackingState::Parking);

    let (state, polls) = run_while(&mut session, TrackingState::Parking);
    assert_eq!(state, TrackingState::Parked);
    // Ten degrees per poll from the horizon plus two identical reads
    assert!(polls >= 10);
    assert!(store.current().unwrap().parked);
    assert_abs_diff_eq!(
        session.transport().horizontal().altitude_deg,
        90.0,
        epsilon = 1e-6
    );
}

#[test]
fn test_current_position_cannot_become_park() {
    let (mut session, _) = connect();
    let before = session.transport().commands().len();
    assert!(matches!(
        session.set_park_current(),
        Err(MountError::Unsupported(_))
    ));
    assert_eq!(session.transport().commands().len(), before);
}
