//! A connected mount.
//!
//! [`MountSession`] owns the codec, the transport link, the clock, the park
//! store and the state machine, and exposes every mount operation. Each
//! operation follows the same shape:
//!
//! 1. check capability and ask the state machine for permission (no I/O on
//!    refusal),
//! 2. convert coordinates into the codec's frame exactly once,
//! 3. run the codec's requests through the link,
//! 4. report the acknowledged command back to the state machine.
//!
//! Slews and parks finish in [`MountSession::on_timer_tick`], which polls the
//! mount and drives the alt/az servo, the settle detector and the guide
//! timers.
//!
//! # Example
//!
//! ```no_run
//! use mount_drivers::codec::synscan::SynscanCodec;
//! use mount_drivers::config::MountConfig;
//! use mount_drivers::park::MemoryParkStore;
//! use mount_drivers::session::MountSession;
//! use mount_drivers::transport::SerialTransport;
//! use mount_drivers::SystemClock;
//! use sky_math::CataloguePosition;
//!
//! # fn main() -> Result<(), mount_drivers::MountError> {
//! let config = MountConfig::default();
//! let transport = SerialTransport::open("/dev/ttyUSB0", 9600)?;
//! let mut session = MountSession::connect(
//!     SynscanCodec::new(),
//!     transport,
//!     SystemClock,
//!     MemoryParkStore::new(),
//!     &config,
//! )?;
//!
//! session.goto(CataloguePosition::new(5.5881, -5.3911))?;
//! loop {
//!     let snapshot = session.on_timer_tick();
//!     println!("{:?} at {:?}", snapshot.state, snapshot.catalogue);
//!     std::thread::sleep(config.poll_period());
//! }
//! # }
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use shared::ParkState;
use sky_math::{
    equatorial_to_horizontal, horizontal_to_equatorial, EquatorialPosition, Frame,
    HorizontalPosition, ObservedPosition, ObserverLocation,
};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::codec::{
    Capabilities, GuideMode, MountCodec, MountFamily, MountIdentity, ParkPlan, PierSide, Request,
    TrackMode, TrackSettings,
};
use crate::config::MountConfig;
use crate::error::{MountError, MountResult};
use crate::motion::{AltAzServo, Axis, AxisRate, Direction, MotionCommand, MotionController, ServoCommand};
use crate::park::{park_position, ParkStore};
use crate::poller::{self, ParkSettle, PositionReading, SettleVerdict, StatusSnapshot};
use crate::state::{
    Authorization, MountStateMachine, Operation, ParkCompletion, SlewTarget, StatusEvent,
    TrackingState,
};
use crate::transport::{Link, Transport};

/// Identity and capabilities of the connected mount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MountInfo {
    pub identity: MountIdentity,
    pub capabilities: Capabilities,
    pub slew_rates: Vec<&'static str>,
}

/// A connected mount and everything needed to drive it.
pub struct MountSession<C, T, K, S>
where
    C: MountCodec,
    T: Transport,
    K: Clock,
    S: ParkStore,
{
    codec: C,
    link: Link<T>,
    clock: K,
    park_store: S,
    identity: MountIdentity,
    machine: MountStateMachine,
    motion: MotionController,
    servo: AltAzServo,
    settle: ParkSettle,
    location: ObserverLocation,
    utc_offset_hours: f64,
    track_settings: TrackSettings,
    park_record: ParkState,
    default_custom_rates: [f64; 2],
    pier_side: Option<PierSide>,
    snapshot: StatusSnapshot,
}

impl<C, T, K, S> MountSession<C, T, K, S>
where
    C: MountCodec,
    T: Transport,
    K: Clock,
    S: ParkStore,
{
    /// Handshake with the mount and restore the persisted park state.
    ///
    /// Location and time are pushed to the mount afterwards; a mount that
    /// refuses them is still usable, so those failures are only logged.
    pub fn connect(
        mut codec: C,
        transport: T,
        clock: K,
        park_store: S,
        config: &MountConfig,
    ) -> MountResult<Self> {
        let mut link = Link::new(transport, config.read_timeout());
        let replies = link.execute(&codec.handshake_requests())?;
        let identity = codec.apply_handshake(&replies)?;

        let stored = park_store.load().unwrap_or_else(|e| {
            warn!("Ignoring unreadable park state: {e}");
            None
        });
        let park_record = stored.unwrap_or_else(|| {
            let park = codec
                .parking()
                .map(|p| p.default_park(&config.location))
                .unwrap_or(HorizontalPosition::new(0.0, 90.0));
            ParkState::new(false, park.azimuth_deg, park.altitude_deg)
        });

        let machine = MountStateMachine::new(park_record.parked, codec.slew_completion());
        let labels = codec.slew_rate_labels().len();
        let motion = MotionController::new(
            config.slew_rate_index.min(labels.saturating_sub(1)),
            config.custom_rates_arcsec,
        );
        let snapshot = StatusSnapshot::empty(machine.state(), clock.now());

        let mut session = Self {
            codec,
            link,
            clock,
            park_store,
            identity,
            machine,
            motion,
            servo: AltAzServo::new(),
            settle: ParkSettle::new(),
            location: config.location,
            utc_offset_hours: config.utc_offset_hours,
            track_settings: TrackSettings::default(),
            park_record,
            default_custom_rates: config.custom_rates_arcsec,
            pier_side: None,
            snapshot,
        };

        if let Err(e) = session.set_location(config.location) {
            warn!("Mount did not accept the site location: {e}");
        }
        let now = session.clock.now();
        if let Err(e) = session.set_time(now, config.utc_offset_hours) {
            warn!("Mount did not accept the time: {e}");
        }

        info!(
            "Connected to {} {} ({}), {}",
            session.identity.family,
            session.identity.model,
            session.identity.firmware,
            session.machine.state()
        );
        Ok(session)
    }

    pub fn state(&self) -> TrackingState {
        self.machine.state()
    }

    pub fn identity(&self) -> &MountIdentity {
        &self.identity
    }

    pub fn family(&self) -> MountFamily {
        self.identity.family
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn transport(&self) -> &T {
        self.link.transport()
    }

    pub fn location(&self) -> &ObserverLocation {
        &self.location
    }

    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    pub fn motion(&self) -> &MotionController {
        &self.motion
    }

    /// Stored park position.
    pub fn park_position(&self) -> HorizontalPosition {
        park_position(&self.park_record)
    }

    pub fn mount_info(&self) -> MountInfo {
        MountInfo {
            identity: self.identity.clone(),
            capabilities: self.codec.capabilities(),
            slew_rates: self.codec.slew_rate_labels().to_vec(),
        }
    }

    fn send(&mut self, requests: &[Request]) -> MountResult<Vec<Vec<u8>>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        self.link.execute(requests)
    }

    fn persist_park(&mut self) {
        if let Err(e) = self.park_store.save(&self.park_record) {
            warn!("Failed to persist park state: {e}");
        }
    }

    // =========================================================================
    // Slewing
    // =========================================================================

    /// Slew to an equatorial position in any frame.
    pub fn goto<F: Frame>(&mut self, target: EquatorialPosition<F>) -> MountResult<()> {
        self.machine.authorize(Operation::Goto)?;
        let jd = self.clock.julian_day();
        let observed = target.into_observed(jd);

        if self.codec.servo_goto() {
            self.start_servo(SlewTarget::Equatorial(observed))?;
        } else {
            let native = C::Frame::from_observed(observed, jd);
            let requests = self.codec.encode_goto(&native);
            self.send(&requests)?;
            self.machine
                .goto_started(SlewTarget::Equatorial(observed), false);
        }
        info!("Slewing to {target}");
        Ok(())
    }

    /// Slew to an azimuth/altitude position.
    pub fn goto_altaz(&mut self, target: HorizontalPosition) -> MountResult<()> {
        self.machine.authorize(Operation::Goto)?;

        if let Some(requests) = self.codec.encode_goto_horizontal(&target) {
            self.send(&requests)?;
            self.machine
                .goto_started(SlewTarget::Horizontal(target), false);
        } else if self.codec.servo_goto() {
            self.start_servo(SlewTarget::Horizontal(target))?;
        } else {
            let jd = self.clock.julian_day();
            let observed = horizontal_to_equatorial(&target, &self.location, jd);
            let native = C::Frame::from_observed(observed, jd);
            let requests = self.codec.encode_goto(&native);
            self.send(&requests)?;
            self.machine
                .goto_started(SlewTarget::Equatorial(observed), false);
        }
        info!(
            "Slewing to Az {:.4} Alt {:.4}",
            target.azimuth_deg, target.altitude_deg
        );
        Ok(())
    }

    fn start_servo(&mut self, target: SlewTarget) -> MountResult<()> {
        let requests = self.codec.encode_tracking(false, &self.track_settings);
        self.send(&requests)?;
        self.servo.reset();
        self.machine.goto_started(target, true);
        Ok(())
    }

    /// Tell the mount it is pointing at `target`.
    pub fn sync<F: Frame>(&mut self, target: EquatorialPosition<F>) -> MountResult<()> {
        self.machine.authorize(Operation::Sync)?;
        let jd = self.clock.julian_day();
        let observed = target.into_observed(jd);
        let native = C::Frame::from_observed(observed, jd);
        let horizontal = equatorial_to_horizontal(&observed, &self.location, jd);

        let requests = self.codec.encode_sync(&native, &horizontal);
        self.send(&requests)?;

        if self.codec.sync_stops_tracking() && self.machine.state() == TrackingState::Tracking {
            let requests = self.codec.encode_tracking(true, &self.track_settings);
            self.send(&requests)?;
        }
        info!("Synced to {target}");
        Ok(())
    }

    /// Stop whatever the mount is doing.
    ///
    /// Parking is abandoned without marking the mount parked. A parked
    /// mount, or an idle one with no manual motion, is left alone.
    pub fn abort(&mut self) -> MountResult<()> {
        match self.machine.authorize(Operation::Abort)? {
            Authorization::AlreadySatisfied => {
                for axis in self.motion.moving_axes() {
                    let requests = self.codec.encode_stop(axis);
                    self.send(&requests)?;
                    self.motion.stopped(axis);
                }
                Ok(())
            }
            Authorization::Proceed => {
                if self.machine.servo_active() {
                    for axis in [Axis::Primary, Axis::Secondary] {
                        let requests = self.codec.encode_stop(axis);
                        self.send(&requests)?;
                    }
                }
                let requests = self.codec.encode_abort();
                self.send(&requests)?;

                self.motion.clear();
                self.servo.reset();
                self.settle.reset();
                if self.family() == MountFamily::SynscanLegacy {
                    self.restore_custom_rates();
                }
                self.machine.aborted();
                info!("Mount motion aborted");
                Ok(())
            }
        }
    }

    fn restore_custom_rates(&mut self) {
        let Some(range) = self.codec.custom_rate_range() else {
            return;
        };
        for axis in [Axis::Primary, Axis::Secondary] {
            let rate = self.default_custom_rates[axis.index()];
            if let Err(e) = self.motion.set_custom_rate(axis, rate, &range) {
                warn!("Configured custom rate not restored: {e}");
            }
        }
    }

    // =========================================================================
    // Parking
    // =========================================================================

    pub fn park(&mut self) -> MountResult<()> {
        let (plan, completion, target) = {
            let parking = self.codec.parking().ok_or(MountError::Unsupported("park"))?;
            let target = park_position(&self.park_record);
            (parking.park_plan(&target), parking.park_completion(), target)
        };
        if self.machine.authorize(Operation::Park)? == Authorization::AlreadySatisfied {
            return Ok(());
        }

        for axis in self.motion.moving_axes() {
            let requests = self.codec.encode_stop(axis);
            self.send(&requests)?;
        }
        self.motion.clear();

        match plan {
            ParkPlan::Native(requests) => {
                self.send(&requests)?;
            }
            ParkPlan::EquatorialGoto => {
                let jd = self.clock.julian_day();
                let observed = horizontal_to_equatorial(&target, &self.location, jd);
                let native = C::Frame::from_observed(observed, jd);
                let requests = self.codec.encode_goto(&native);
                self.send(&requests)?;
            }
        }

        self.settle.reset();
        self.machine
            .park_started(SlewTarget::Horizontal(target), completion);
        info!(
            "Parking at Az {:.4} Alt {:.4}",
            target.azimuth_deg, target.altitude_deg
        );
        Ok(())
    }

    pub fn unpark(&mut self) -> MountResult<()> {
        let requests = self
            .codec
            .parking()
            .ok_or(MountError::Unsupported("park"))?
            .encode_unpark();
        self.machine.authorize(Operation::Unpark)?;
        self.send(&requests)?;

        self.park_record = self.park_record.with_parked(false);
        self.persist_park();
        self.machine.unparked();
        info!("Mount unparked");
        Ok(())
    }

    /// Make the current position the park position.
    pub fn set_park_current(&mut self) -> MountResult<()> {
        let supported = self
            .codec
            .parking()
            .ok_or(MountError::Unsupported("park"))?
            .supports_current_park();
        if !supported {
            return Err(MountError::Unsupported("park at current position"));
        }
        self.machine.authorize(Operation::SetPark)?;

        let jd = self.clock.julian_day();
        let reading = poller::read_position(&self.codec, &mut self.link, &self.location, jd)?;
        self.store_park_position(reading.horizontal)
    }

    /// Restore the family's default park position.
    pub fn set_park_default(&mut self) -> MountResult<()> {
        let park = self
            .codec
            .parking()
            .ok_or(MountError::Unsupported("park"))?
            .default_park(&self.location);
        self.machine.authorize(Operation::SetPark)?;
        self.store_park_position(park)
    }

    /// Store an explicit park position.
    pub fn set_park_position(&mut self, park: HorizontalPosition) -> MountResult<()> {
        if self.codec.parking().is_none() {
            return Err(MountError::Unsupported("park"));
        }
        self.machine.authorize(Operation::SetPark)?;
        self.store_park_position(park)
    }

    fn store_park_position(&mut self, park: HorizontalPosition) -> MountResult<()> {
        let requests = self
            .codec
            .parking()
            .map(|p| p.encode_park_position(&park))
            .unwrap_or_default();
        self.send(&requests)?;

        self.park_record = self
            .park_record
            .with_position(park.azimuth_deg, park.altitude_deg);
        self.persist_park();
        info!(
            "Park position set to Az {:.4} Alt {:.4}",
            park.azimuth_deg, park.altitude_deg
        );
        Ok(())
    }

    fn park_finished(&mut self) {
        let requests = self
            .codec
            .parking()
            .map(|p| p.park_finished_requests())
            .unwrap_or_default();
        if let Err(e) = self.send(&requests) {
            warn!("Failed to finish park: {e}");
        }
    }

    fn mark_parked(&mut self) {
        self.park_record = self.park_record.with_parked(true);
        self.persist_park();
        info!("Mount parked");
    }

    // =========================================================================
    // Homing
    // =========================================================================

    pub fn find_home(&mut self) -> MountResult<()> {
        let requests = {
            let homing = self.codec.homing().ok_or(MountError::Unsupported("home"))?;
            if !homing.supports_find_home() {
                return Err(MountError::Unsupported("find home"));
            }
            homing.encode_find_home()
        };
        self.machine.authorize(Operation::Home)?;
        self.send(&requests)?;
        self.machine.goto_started(SlewTarget::Home, false);
        info!("Searching for home position");
        Ok(())
    }

    pub fn goto_home(&mut self) -> MountResult<()> {
        let requests = self
            .codec
            .homing()
            .ok_or(MountError::Unsupported("home"))?
            .encode_goto_home();
        self.machine.authorize(Operation::Home)?;
        self.send(&requests)?;
        self.machine.goto_started(SlewTarget::Home, false);
        info!("Slewing to home position");
        Ok(())
    }

    pub fn set_current_as_home(&mut self) -> MountResult<()> {
        let requests = self
            .codec
            .homing()
            .ok_or(MountError::Unsupported("home"))?
            .encode_set_home();
        self.machine.authorize(Operation::Home)?;
        self.send(&requests)?;
        info!("Current position stored as home");
        Ok(())
    }

    // =========================================================================
    // Tracking
    // =========================================================================

    pub fn set_track_enabled(&mut self, enabled: bool) -> MountResult<()> {
        self.machine.authorize(Operation::SetTracking)?;
        let requests = self.codec.encode_tracking(enabled, &self.track_settings);
        self.send(&requests)?;
        self.machine.tracking_set(enabled);
        Ok(())
    }

    pub fn set_track_mode(&mut self, mode: TrackMode) -> MountResult<()> {
        let requests = self
            .codec
            .track_rates()
            .ok_or(MountError::Unsupported("track modes"))?
            .encode_track_mode(mode);
        self.send(&requests)?;
        self.track_settings.mode = mode;
        Ok(())
    }

    /// Custom RA track rate as a multiple of sidereal.
    pub fn set_track_rate(&mut self, rate: f64) -> MountResult<()> {
        let requests = {
            let rates = self
                .codec
                .track_rates()
                .ok_or(MountError::Unsupported("track rates"))?;
            let range = rates.track_rate_range();
            if !range.contains(&rate) {
                return Err(MountError::OutOfRange(format!(
                    "track rate {rate} outside {}..={} x sidereal",
                    range.start(),
                    range.end()
                )));
            }
            rates.encode_track_rate(rate)
        };
        self.send(&requests)?;
        self.track_settings.custom_rate = rate;
        Ok(())
    }

    // =========================================================================
    // Manual motion and guiding
    // =========================================================================

    pub fn set_slew_rate(&mut self, index: usize) -> MountResult<()> {
        let labels = self.codec.slew_rate_labels();
        if index >= labels.len() {
            return Err(MountError::OutOfRange(format!(
                "slew rate index {index}, mount has {}",
                labels.len()
            )));
        }
        let requests = self.codec.encode_slew_rate(index);
        self.send(&requests)?;
        self.motion.set_slew_index(index);
        debug!("Slew rate set to {}", labels[index]);
        Ok(())
    }

    /// Custom slew rate for one axis in arcsec/s.
    pub fn set_custom_rate(&mut self, axis: Axis, arcsec_per_sec: f64) -> MountResult<()> {
        let range = self
            .codec
            .custom_rate_range()
            .ok_or(MountError::Unsupported("custom slew rate"))?;
        self.motion.set_custom_rate(axis, arcsec_per_sec, &range)
    }

    /// Start or stop manual motion in one direction.
    ///
    /// Reversing an axis stops it before starting the other way. Stopping
    /// is always allowed.
    pub fn move_axis(&mut self, direction: Direction, command: MotionCommand) -> MountResult<()> {
        let axis = direction.axis();
        match command {
            MotionCommand::Stop => {
                let requests = self.codec.encode_stop(axis);
                self.send(&requests)?;
                self.motion.stopped(axis);
                Ok(())
            }
            MotionCommand::Start => {
                self.machine.authorize(Operation::Move)?;
                self.stop_before_reverse(direction)?;
                let rate = self.motion.slew_rate(
                    axis,
                    self.codec.slew_rate_labels().len(),
                    self.codec.custom_rate_range().is_some(),
                );
                let requests = self.codec.encode_move(direction, rate, self.pier_side);
                self.send(&requests)?;
                self.motion.started(direction);
                debug!("Moving {direction} at {rate:?}");
                Ok(())
            }
        }
    }

    /// Guide rates (RA, DEC) as fractions of sidereal.
    pub fn set_guide_rates(&mut self, ra: f64, de: f64) -> MountResult<()> {
        let (ra_range, de_range) = self.codec.guide_rate_limits();
        if !ra_range.contains(&ra) || !de_range.contains(&de) {
            return Err(MountError::OutOfRange(format!(
                "guide rates {ra}/{de} outside {}..={} / {}..={}",
                ra_range.start(),
                ra_range.end(),
                de_range.start(),
                de_range.end()
            )));
        }
        let requests = self.codec.encode_guide_rates(ra, de);
        self.send(&requests)?;
        self.motion.set_guide_rates(ra, de);
        Ok(())
    }

    /// Pulse-guide for `duration_ms`. Never changes the tracking state.
    ///
    /// Pulses longer than the mount accepts are rejected before any I/O.
    /// Timed guiding returns once the axis is running; the stop is sent by
    /// [`service_timers`](Self::service_timers) when the pulse expires.
    pub fn guide(&mut self, direction: Direction, duration_ms: u32) -> MountResult<()> {
        let max_ms = self.codec.max_guide_pulse_ms();
        if duration_ms > max_ms {
            return Err(MountError::OutOfRange(format!(
                "guide pulse of {duration_ms} ms, mount accepts at most {max_ms} ms"
            )));
        }
        self.machine.authorize(Operation::Guide)?;
        if duration_ms == 0 {
            return Ok(());
        }

        match self.codec.guide_mode() {
            GuideMode::Native => {
                let requests = self.codec.encode_guide_pulse(direction, duration_ms);
                self.send(&requests)?;
            }
            GuideMode::Timed => {
                self.stop_before_reverse(direction)?;
                let speed = self.motion.guide_speed(direction);
                let requests =
                    self.codec
                        .encode_move(direction, AxisRate::Custom(speed), self.pier_side);
                self.send(&requests)?;
                let deadline =
                    self.clock.now() + TimeDelta::milliseconds(i64::from(duration_ms));
                if self.motion.arm_guide(direction, deadline) {
                    debug!("Guide pulse on {} replaced", direction.axis());
                }
            }
        }
        debug!("Guiding {direction} for {duration_ms} ms");
        Ok(())
    }

    /// Stop the axis if it is being driven the opposite way to `direction`.
    fn stop_before_reverse(&mut self, direction: Direction) -> MountResult<()> {
        if !self.motion.needs_stop_before(direction) {
            return Ok(());
        }
        let axis = direction.axis();
        if self.motion.guiding(axis) {
            debug!("Guide pulse on {axis} cut short by {direction}");
        }
        let requests = self.codec.encode_stop(axis);
        self.send(&requests)?;
        self.motion.stopped(axis);
        Ok(())
    }

    /// Stop every axis whose guide pulse has expired. Returns how many
    /// axes were stopped.
    pub fn service_timers(&mut self) -> MountResult<usize> {
        let due = self.motion.take_due(self.clock.now());
        let mut first_error = None;
        let mut stopped = 0;
        for (axis, direction) in due {
            let requests = self.codec.encode_stop(axis);
            match self.send(&requests) {
                Ok(_) => {
                    self.motion.stopped(axis);
                    stopped += 1;
                    debug!("Guide pulse {direction} finished");
                }
                Err(e) => {
                    warn!("Failed to end guide pulse {direction}: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(stopped),
        }
    }

    /// Earliest pending guide-pulse deadline.
    pub fn next_timer_deadline(&self) -> Option<DateTime<Utc>> {
        self.motion.next_deadline()
    }

    // =========================================================================
    // Site and time
    // =========================================================================

    pub fn set_location(&mut self, location: ObserverLocation) -> MountResult<()> {
        self.location = location;
        let requests = self.codec.encode_set_location(&location);
        self.send(&requests)?;
        info!(
            "Site set to lat {:.4} lon {:.4}",
            location.latitude_deg,
            location.longitude_signed()
        );
        Ok(())
    }

    pub fn set_time(&mut self, utc: DateTime<Utc>, utc_offset_hours: f64) -> MountResult<()> {
        self.utc_offset_hours = utc_offset_hours;
        let requests = self.codec.encode_set_time(utc, utc_offset_hours);
        self.send(&requests)?;
        debug!("Mount time set to {utc} (offset {utc_offset_hours} h)");
        Ok(())
    }

    /// Site the mount reports, when the protocol can read it back.
    pub fn query_location(&mut self) -> MountResult<Option<ObserverLocation>> {
        let Some(request) = self.codec.location_request() else {
            return Ok(None);
        };
        let reply = self.link.exchange(&request)?;
        Ok(Some(self.codec.decode_location(&reply)?))
    }

    /// Mount clock as UTC plus its offset, when the protocol can read it back.
    pub fn query_time(&mut self) -> MountResult<Option<(DateTime<Utc>, f64)>> {
        let Some(request) = self.codec.time_request() else {
            return Ok(None);
        };
        let reply = self.link.exchange(&request)?;
        Ok(Some(self.codec.decode_time(&reply)?))
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// One poll period: expire guide pulses, read status and position,
    /// advance slews and parks.
    ///
    /// Never fails. A failed round is logged and the previous snapshot is
    /// returned marked stale.
    pub fn on_timer_tick(&mut self) -> StatusSnapshot {
        if let Err(e) = self.service_timers() {
            warn!("Guide timer service failed: {e}");
        }

        if let Err(e) = self.poll() {
            poller::log_poll_failure(&e);
            self.snapshot.stale = true;
            self.snapshot.state = self.machine.state();
        }
        self.snapshot.clone()
    }

    fn poll(&mut self) -> MountResult<()> {
        let fields = poller::read_status(&self.codec, &mut self.link)?;
        if fields.pier_side.is_some() {
            self.pier_side = fields.pier_side;
        }

        let parking_completion = self.machine.park_completion();
        match self.machine.on_status(&fields) {
            Some(StatusEvent::Changed {
                from: TrackingState::Parking,
                to: TrackingState::Parked,
            }) => {
                if parking_completion == ParkCompletion::GotoComplete && !fields.parked {
                    self.park_finished();
                }
                self.mark_parked();
            }
            Some(StatusEvent::Changed {
                to: TrackingState::Parked,
                ..
            }) => self.mark_parked(),
            Some(StatusEvent::ParkSlewFinished) => {
                info!("Park slew finished, parking mount");
                self.park_finished();
            }
            Some(StatusEvent::Changed { .. }) | None => {}
        }

        let jd = self.clock.julian_day();
        let reading = poller::read_position(&self.codec, &mut self.link, &self.location, jd)?;

        if self.machine.state() == TrackingState::Parking
            && self.machine.park_completion() == ParkCompletion::Settle
        {
            self.advance_settle(&reading)?;
        }
        if self.machine.servo_active() {
            self.advance_servo(&reading, jd)?;
        }

        self.snapshot = StatusSnapshot {
            state: self.machine.state(),
            observed: Some(reading.observed),
            catalogue: Some(reading.catalogue),
            horizontal: Some(reading.horizontal),
            pier_side: self.pier_side,
            tracking: fields.tracking,
            stale: false,
            timestamp: self.clock.now(),
        };
        Ok(())
    }

    fn advance_settle(&mut self, reading: &PositionReading) -> MountResult<()> {
        let target = park_position(&self.park_record);
        match self.settle.observe(reading.horizontal, &target) {
            SettleVerdict::Moving => Ok(()),
            SettleVerdict::Settled => {
                if self.settle.reparks() > 0 {
                    info!("Park settled after {} re-park(s)", self.settle.reparks());
                }
                self.park_finished();
                self.machine.park_completed();
                self.mark_parked();
                Ok(())
            }
            SettleVerdict::Repark => {
                let plan = self.codec.parking().map(|p| p.park_plan(&target));
                if let Some(ParkPlan::Native(requests)) = plan {
                    self.send(&requests)?;
                }
                Ok(())
            }
        }
    }

    fn servo_target(&self, jd: f64) -> Option<HorizontalPosition> {
        match self.machine.target()? {
            SlewTarget::Horizontal(target) => Some(*target),
            SlewTarget::Equatorial(observed) => Some(equatorial_to_horizontal(
                observed,
                &self.location,
                jd,
            )),
            SlewTarget::Home => None,
        }
    }

    fn advance_servo(&mut self, reading: &PositionReading, jd: f64) -> MountResult<()> {
        let Some(target) = self.servo_target(jd) else {
            return Ok(());
        };
        for command in self.servo.step(&reading.horizontal, &target) {
            let requests = match command {
                ServoCommand::Drive { direction, rate } => {
                    self.codec
                        .encode_move(direction, AxisRate::Preset(rate), None)
                }
                ServoCommand::Stop(axis) => self.codec.encode_stop(axis),
            };
            self.send(&requests)?;
        }

        if AltAzServo::on_target(&reading.horizontal, &target) {
            let requests = self.codec.encode_tracking(true, &self.track_settings);
            self.send(&requests)?;
            self.servo.reset();
            self.machine.servo_completed(true);
        }
        Ok(())
    }

    /// Current observed place, from the last good poll.
    pub fn observed_position(&self) -> Option<ObservedPosition> {
        self.snapshot.observed
    }
}

#[cfg(all(test, feature = "synscan"))]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::codec::fixed_point::{parse_hex_pair, u32_to_degrees};
    use crate::codec::synscan::SynscanCodec;
    use crate::park::MemoryParkStore;
    use crate::transport::MockTransport;
    use chrono::TimeZone;
    use approx::assert_abs_diff_eq;
    use sky_math::CataloguePosition;

    type TestSession = MountSession<SynscanCodec, MockTransport, FakeClock, MemoryParkStore>;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 22, 0, 0).unwrap()
    }

    fn connect(model: u8, store: MemoryParkStore) -> (TestSession, MockTransport, FakeClock) {
        let mock = MockTransport::new();
        mock.queue_reply(b"x#");
        mock.queue_reply(&[1, b'#']);
        mock.queue_reply(b"042705#");
        mock.queue_reply(&[model, b'#']);
        mock.queue_reply(b"#");
        mock.queue_reply(b"#");
        let clock = FakeClock::new(start());
        let config = MountConfig {
            location: ObserverLocation::new(51.5, -0.1, 10.0),
            ..MountConfig::default()
        };
        let session =
            MountSession::connect(SynscanCodec::new(), mock.clone(), clock.clone(), store, &config)
                .unwrap();
        mock.take_writes();
        (session, mock, clock)
    }

    #[test]
    fn test_connect_pushes_location_and_time() {
        let mock = MockTransport::new();
        for reply in [&b"x#"[..], &[1, b'#'], b"042705#", &[0, b'#'], b"#", b"#"] {
            mock.queue_reply(reply);
        }
        let session = MountSession::connect(
            SynscanCodec::new(),
            mock.clone(),
            FakeClock::new(start()),
            MemoryParkStore::new(),
            &MountConfig::default(),
        )
        .unwrap();

        let writes = mock.writes();
        assert_eq!(writes.len(), 6);
        assert_eq!(writes[4][0], b'W');
        assert_eq!(writes[5][0], b'H');
        assert_eq!(session.state(), TrackingState::Idle);
    }

    #[test]
    fn test_connect_survives_rejected_site() {
        let mock = MockTransport::new();
        for reply in [&b"x#"[..], &[1, b'#'], b"042705#", &[0, b'#']] {
            mock.queue_reply(reply);
        }
        mock.queue_timeout();
        mock.queue_timeout();
        let session = MountSession::connect(
            SynscanCodec::new(),
            mock,
            FakeClock::new(start()),
            MemoryParkStore::new(),
            &MountConfig::default(),
        );
        assert!(session.is_ok());
    }

    #[test]
    fn test_connect_restores_parked_flag() {
        let store = MemoryParkStore::with_state(ParkState::new(true, 359.0, 51.5));
        let (session, _, _) = connect(0, store);
        assert_eq!(session.state(), TrackingState::Parked);
    }

    #[test]
    fn test_goto_converts_to_catalogue_once() {
        let (mut session, mock, _) = connect(0, MemoryParkStore::new());
        mock.queue_reply(b"#");
        session.goto(CataloguePosition::new(12.0, 30.0)).unwrap();

        let writes = mock.take_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0][0], b'r');
        let mut reply = writes[0][1..].to_vec();
        reply.push(b'#');
        let (ra, dec) = parse_hex_pair(&reply).unwrap();
        // Round trip through the observed frame stays within a few counts
        assert_abs_diff_eq!(u32_to_degrees(ra), 180.0, epsilon = 1e-5);
        assert_abs_diff_eq!(u32_to_degrees(dec), 30.0, epsilon = 1e-5);
        assert_eq!(session.state(), TrackingState::Slewing);
    }

    #[test]
    fn test_refused_goto_leaves_state() {
        let (mut session, mock, _) = connect(0, MemoryParkStore::new());
        mock.queue_reply(b"?");
        let err = session.goto(CataloguePosition::new(12.0, 30.0)).unwrap_err();
        assert!(matches!(err, MountError::Decode(_)));
        assert_eq!(session.state(), TrackingState::Idle);
    }

    #[test]
    fn test_unsupported_capability_without_io() {
        let (mut session, mock, _) = connect(0, MemoryParkStore::new());
        assert!(matches!(session.find_home(), Err(MountError::Unsupported(_))));
        assert!(matches!(session.set_track_mode(TrackMode::Lunar), Err(MountError::Unsupported(_))));
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn test_out_of_range_rates_rejected_before_io() {
        let (mut session, mock, _) = connect(0, MemoryParkStore::new());
        assert!(matches!(session.set_slew_rate(10), Err(MountError::OutOfRange(_))));
        assert!(matches!(session.set_guide_rates(1.5, 0.5), Err(MountError::OutOfRange(_))));
        assert!(matches!(
            session.set_custom_rate(Axis::Primary, 900.0),
            Err(MountError::OutOfRange(_))
        ));
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn test_reversing_move_stops_first() {
        let (mut session, mock, _) = connect(0, MemoryParkStore::new());
        mock.queue_reply(b"#");
        session.move_axis(Direction::West, MotionCommand::Start).unwrap();
        mock.queue_reply(b"#");
        mock.queue_reply(b"#");
        session.move_axis(Direction::East, MotionCommand::Start).unwrap();

        let writes = mock.take_writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[1], vec![b'P', 2, 16, 36, 0, 0, 0, 0]);
        assert_eq!(session.motion().moving(Axis::Primary), Some(Direction::East));
    }

    #[test]
    fn test_guide_pulse_timer() {
        let (mut session, mock, clock) = connect(0, MemoryParkStore::new());
        mock.queue_reply(b"#");
        session.guide(Direction::North, 200).unwrap();
        assert_eq!(mock.take_writes().len(), 1);

        clock.advance(std::time::Duration::from_millis(100));
        assert_eq!(session.service_timers().unwrap(), 0);

        clock.advance(std::time::Duration::from_millis(100));
        mock.queue_reply(b"#");
        assert_eq!(session.service_timers().unwrap(), 1);
        assert_eq!(mock.take_writes(), vec![vec![b'P', 2, 17, 36, 0, 0, 0, 0]]);
        assert_eq!(session.next_timer_deadline(), None);
        assert_eq!(session.state(), TrackingState::Idle);
    }

    #[test]
    fn test_reversing_guide_pulse_stops_first() {
        let (mut session, mock, clock) = connect(0, MemoryParkStore::new());
        mock.queue_reply(b"#");
        session.guide(Direction::West, 1000).unwrap();
        mock.queue_reply(b"#");
        mock.queue_reply(b"#");
        session.guide(Direction::East, 100).unwrap();

        let writes = mock.take_writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0][..4], [b'P', 3, 16, 6]);
        assert_eq!(writes[1], vec![b'P', 2, 16, 36, 0, 0, 0, 0]);
        assert_eq!(writes[2][..4], [b'P', 3, 16, 7]);
        assert_eq!(
            session.next_timer_deadline(),
            Some(clock.now() + TimeDelta::milliseconds(100))
        );
    }

    #[test]
    fn test_set_park_current_persists_position() {
        let store = MemoryParkStore::new();
        let (mut session, mock, _) = connect(0, store.clone());
        mock.queue_reply(b"80000000,15555555#");
        mock.queue_reply(b"40000000,10000000#");
        session.set_park_current().unwrap();

        let record = store.current().unwrap();
        assert!(!record.parked);
        assert!((record.axis1_deg - 90.0).abs() < 1e-6);
        assert!((record.axis2_deg - 22.5).abs() < 1e-6);
    }
}
