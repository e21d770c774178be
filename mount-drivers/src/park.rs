//! Park-state persistence.
//!
//! The session reads the park flag once at connect and writes it whenever a
//! park finishes, an unpark is acknowledged, or the park position changes.

use std::cell::RefCell;
use std::rc::Rc;

use shared::{ConfigStorage, ParkState};
use sky_math::HorizontalPosition;
use tracing::{debug, warn};

use crate::error::MountResult;

/// Where the park flag and park position live between runs.
pub trait ParkStore {
    /// The stored record, or `None` if nothing was ever saved.
    fn load(&self) -> MountResult<Option<ParkState>>;

    fn save(&mut self, state: &ParkState) -> MountResult<()>;
}

/// Park record in [`ConfigStorage`], one JSON file per device.
#[derive(Debug, Clone)]
pub struct FileParkStore {
    storage: ConfigStorage,
    device: String,
}

impl FileParkStore {
    pub fn new(storage: ConfigStorage, device: impl Into<String>) -> Self {
        Self {
            storage,
            device: device.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl ParkStore for FileParkStore {
    fn load(&self) -> MountResult<Option<ParkState>> {
        match self.storage.get_park_state(&self.device) {
            None => Ok(None),
            Some(Ok(state)) => Ok(Some(state)),
            Some(Err(e)) => {
                warn!("Unreadable park state for {}: {e}", self.device);
                Err(e.into())
            }
        }
    }

    fn save(&mut self, state: &ParkState) -> MountResult<()> {
        let path = self.storage.save_park_state(&self.device, state)?;
        debug!("Saved park state to {}", path.display());
        Ok(())
    }
}

/// In-memory park record. Clones share the record, which lets tests
/// inspect what the session persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryParkStore {
    state: Rc<RefCell<Option<ParkState>>>,
}

impl MemoryParkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that starts out holding `state`.
    pub fn with_state(state: ParkState) -> Self {
        Self {
            state: Rc::new(RefCell::new(Some(state))),
        }
    }

    pub fn current(&self) -> Option<ParkState> {
        self.state.borrow().clone()
    }
}

impl ParkStore for MemoryParkStore {
    fn load(&self) -> MountResult<Option<ParkState>> {
        Ok(self.current())
    }

    fn save(&mut self, state: &ParkState) -> MountResult<()> {
        *self.state.borrow_mut() = Some(state.clone());
        Ok(())
    }
}

impl<S: ParkStore + ?Sized> ParkStore for Box<S> {
    fn load(&self) -> MountResult<Option<ParkState>> {
        (**self).load()
    }

    fn save(&mut self, state: &ParkState) -> MountResult<()> {
        (**self).save(state)
    }
}

/// Park position held in a record, as azimuth/altitude.
pub fn park_position(state: &ParkState) -> HorizontalPosition {
    HorizontalPosition::new(state.axis1_deg, state.axis2_deg)
}
