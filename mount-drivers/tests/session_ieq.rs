//! iOptron sessions against the simulated CEM60.

#![cfg(feature = "ieq")]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use chrono::{TimeZone, Utc};
use mount_drivers::codec::ieq::IeqCodec;
use mount_drivers::codec::{PierSide, TrackMode};
use mount_drivers::park::MemoryParkStore;
use mount_drivers::sim::IeqSimulator;
use mount_drivers::transport::{Terminator, Transport};
use mount_drivers::{
    Direction, FakeClock, MotionCommand, MountConfig, MountError, MountFamily, MountResult,
    MountSession, TrackingState,
};
use sky_math::{ObservedPosition, ObserverLocation};

type Session = MountSession<IeqCodec, IeqSimulator, FakeClock, MemoryParkStore>;

/// Simulator handle the test keeps while the session owns the transport.
#[derive(Clone)]
struct SharedSim(Rc<RefCell<IeqSimulator>>);

impl Transport for SharedSim {
    fn write(&mut self, bytes: &[u8]) -> MountResult<usize> {
        self.0.borrow_mut().write(bytes)
    }

    fn read_until(&mut self, terminator: Terminator, timeout: Duration) -> MountResult<Vec<u8>> {
        self.0.borrow_mut().read_until(terminator, timeout)
    }

    fn flush_input(&mut self) -> MountResult<()> {
        self.0.borrow_mut().flush_input()
    }
}

fn config() -> MountConfig {
    MountConfig {
        location: ObserverLocation::new(-31.25, 149.0, 1100.0),
        utc_offset_hours: 11.0,
        ..MountConfig::for_family(MountFamily::Ieq)
    }
}

fn clock() -> FakeClock {
    FakeClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 22, 0, 0).unwrap())
}

fn connect() -> (Session, MemoryParkStore) {
    let store = MemoryParkStore::new();
    let session = MountSession::connect(
        IeqCodec::new(),
        IeqSimulator::cem60(),
        clock(),
        store.clone(),
        &config(),
    )
    .unwrap();
    (session, store)
}

fn run_while(session: &mut Session, busy: TrackingState) -> TrackingState {
    for _ in 0..100 {
        let snapshot = session.on_timer_tick();
        assert!(!snapshot.stale, "poll failed while {busy}");
        if snapshot.state != busy {
            return snapshot.state;
        }
    }
    panic!("still {busy} after 100 polls");
}

fn sent(session: &Session, command: &str) -> bool {
    session.transport().commands().iter().any(|c| c == command)
}

#[test]
fn test_connect_identifies_and_pushes_site() {
    let (mut session, _) = connect();
    assert_eq!(session.identity().model, "CEM60");
    assert!(sent(&session, ":SDS0#"));

    let location = session.query_location().unwrap().unwrap();
    assert_abs_diff_eq!(location.latitude_deg, -31.25, epsilon = 1e-6);
    assert_abs_diff_eq!(location.longitude_signed(), 149.0, epsilon = 1e-6);
}

#[test]
fn test_goto_in_observed_frame_tracks_with_pier_side() {
    let (mut session, _) = connect();
    session.goto(ObservedPosition::new(5.5, -60.0)).unwrap();
    assert_eq!(run_while(&mut session, TrackingState::Slewing), TrackingState::Tracking);

    let position = session.transport().position();
    assert_abs_diff_eq!(position.ra_hours(), 5.5, epsilon = 1e-6);
    assert_abs_diff_eq!(position.dec_degrees(), -60.0, epsilon = 1e-5);
    assert_eq!(session.snapshot().pier_side, Some(PierSide::West));
}

#[test]
fn test_park_hands_off_to_native_park() {
    let (mut session, store) = connect();
    session.park().unwrap();
    assert_eq!(session.state(), TrackingState::Parking);
    assert!(!sent(&session, ":MP1#"));

    assert_eq!(run_while(&mut session, TrackingState::Parking), TrackingState::Parked);
    assert!(sent(&session, ":MP1#"));
    assert_eq!(session.transport().system_status(), 6);
    assert!(store.current().unwrap().parked);

    session.unpark().unwrap();
    assert!(sent(&session, ":MP0#"));
    assert_eq!(session.state(), TrackingState::Idle);
    assert!(!store.current().unwrap().parked);
}

#[test]
fn test_find_home_ends_idle_at_pole() {
    let (mut session, _) = connect();
    session.find_home().unwrap();
    assert!(sent(&session, ":MSH#"));
    assert_eq!(run_while(&mut session, TrackingState::Slewing), TrackingState::Idle);
    assert_abs_diff_eq!(session.transport().position().dec_degrees(), 90.0);
}

#[test]
fn test_tracking_modes_and_moves() {
    let (mut session, _) = connect();
    session.set_track_mode(TrackMode::Lunar).unwrap();
    session.set_track_enabled(true).unwrap();
    assert_eq!(session.state(), TrackingState::Tracking);
    assert!(sent(&session, ":RT1#"));

    // The simulator starts at the pole, so only south moves it
    session.move_axis(Direction::South, MotionCommand::Start).unwrap();
    let before = session.transport().position().dec_degrees();
    session.on_timer_tick();
    assert!(session.transport().position().dec_degrees() < before);

    session.move_axis(Direction::South, MotionCommand::Stop).unwrap();
    assert!(sent(&session, ":qD#"));
    assert_eq!(session.state(), TrackingState::Tracking);
}

#[test]
fn test_overlong_guide_pulse_rejected_without_io() {
    let (mut session, _) = connect();
    let before = session.transport().commands().len();
    assert!(matches!(
        session.guide(Direction::North, 150_000),
        Err(MountError::OutOfRange(_))
    ));
    assert_eq!(session.transport().commands().len(), before);

    session.guide(Direction::North, 99_999).unwrap();
    assert!(sent(&session, ":Mn99999#"));
}

#[test]
fn test_hand_pad_slew_while_tracking_is_followed() {
    let sim = SharedSim(Rc::new(RefCell::new(IeqSimulator::cem60())));
    let mut session = MountSession::connect(
        IeqCodec::new(),
        sim.clone(),
        clock(),
        MemoryParkStore::new(),
        &config(),
    )
    .unwrap();
    session.set_track_enabled(true).unwrap();
    assert_eq!(session.state(), TrackingState::Tracking);

    sim.0
        .borrow_mut()
        .hand_pad_goto(ObservedPosition::new(10.0, -45.0));
    assert_eq!(session.on_timer_tick().state, TrackingState::Slewing);

    let mut state = TrackingState::Slewing;
    for _ in 0..100 {
        state = session.on_timer_tick().state;
        if state != TrackingState::Slewing {
            break;
        }
    }
    assert_eq!(state, TrackingState::Tracking);
    assert_abs_diff_eq!(sim.0.borrow().position().dec_degrees(), -45.0, epsilon = 1e-5);
}
