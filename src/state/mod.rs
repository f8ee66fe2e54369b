pub mod core;
pub mod hub;
pub mod registry;
pub mod rooms;
pub mod round;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use self::{core::ServerCore, hub::Hub};
use crate::config::AppConfig;

pub type SharedState = Arc<AppState>;

/// Central application state: the serialized game core plus the connection hub.
pub struct AppState {
    config: AppConfig,
    core: Mutex<ServerCore>,
    hub: Hub,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        let core = ServerCore::new(&config);
        Arc::new(Self {
            config,
            core: Mutex::new(core),
            hub: Hub::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Lock the game core.
    ///
    /// Every mutation of players, room membership, and round state happens
    /// under this one lock, and holders never await; fan-out only pushes onto
    /// per-endpoint queues.
    pub fn lock_core(&self) -> MutexGuard<'_, ServerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
