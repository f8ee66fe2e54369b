//! Application-level configuration loading: listen port, room range, and round cadence.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZSTORM_BACK_CONFIG_PATH";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// TCP port the server listens on unless `PORT`/`SERVER_PORT` overrides it.
    pub port: u16,
    /// Lowest valid room id.
    pub min_room: u8,
    /// Number of difficulty rooms, addressed `min_room..min_room + num_rooms`.
    pub num_rooms: u8,
    /// Full round length in seconds (Play plus Lobby).
    pub cycle_secs: u64,
    /// Lobby length in seconds; Play is the remainder of the cycle.
    pub lobby_secs: u64,
    /// Cap on how many seconds of Lobby a single coarse correction may drop.
    pub max_skip_fwd_secs: u64,
    /// Enable the wider interval pair for hosts with noisy timers.
    pub large_skew: bool,
    /// Tick interval set and thresholds for the self-calibrating clock.
    pub cadence: CadenceConfig,
}

#[derive(Debug, Clone)]
/// Discrete recurring-timer intervals and the error thresholds that select them.
pub struct CadenceConfig {
    pub normal_ms: u64,
    pub fast_ms: u64,
    pub slow_ms: u64,
    pub faster_ms: u64,
    pub slower_ms: u64,
    /// Wall-clock error beyond which the fast/slow pair is selected.
    pub err_threshold_ms: i64,
    /// Wall-clock error beyond which the faster/slower pair is selected (large-skew mode).
    pub err_threshold_large_ms: i64,
    /// Offset applied to the first-tick delay so the clock fires just before the boundary.
    pub init_offset_ms: i64,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let loaded = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };
        loaded.validated()
    }

    /// Seconds of Play in each cycle.
    pub fn play_secs(&self) -> u64 {
        self.cycle_secs - self.lobby_secs
    }

    /// Reject configurations the scheduler cannot run on.
    fn validated(self) -> Self {
        let rooms_fit = self.num_rooms > 0 && self.min_room.checked_add(self.num_rooms - 1).is_some();
        if self.lobby_secs >= 2 && self.cycle_secs > self.lobby_secs && rooms_fit {
            self
        } else {
            warn!(
                cycle_secs = self.cycle_secs,
                lobby_secs = self.lobby_secs,
                min_room = self.min_room,
                num_rooms = self.num_rooms,
                "invalid configuration; falling back to defaults"
            );
            Self::default()
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 6789,
            min_room: 0,
            num_rooms: 4,
            cycle_secs: 180,
            lobby_secs: 30,
            max_skip_fwd_secs: 9,
            large_skew: false,
            cadence: CadenceConfig::default(),
        }
    }
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            normal_ms: 990,
            fast_ms: 976,
            slow_ms: 1004,
            faster_ms: 960,
            slower_ms: 1020,
            err_threshold_ms: 10,
            err_threshold_large_ms: 25,
            init_offset_ms: -10,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    port: Option<u16>,
    min_room: Option<u8>,
    num_rooms: Option<u8>,
    cycle_secs: Option<u64>,
    lobby_secs: Option<u64>,
    max_skip_fwd_secs: Option<u64>,
    large_skew: Option<bool>,
    cadence: Option<RawCadence>,
}

#[derive(Debug, Deserialize)]
struct RawCadence {
    normal_ms: Option<u64>,
    fast_ms: Option<u64>,
    slow_ms: Option<u64>,
    faster_ms: Option<u64>,
    slower_ms: Option<u64>,
    err_threshold_ms: Option<i64>,
    err_threshold_large_ms: Option<i64>,
    init_offset_ms: Option<i64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            port: value.port.unwrap_or(defaults.port),
            min_room: value.min_room.unwrap_or(defaults.min_room),
            num_rooms: value.num_rooms.unwrap_or(defaults.num_rooms),
            cycle_secs: value.cycle_secs.unwrap_or(defaults.cycle_secs),
            lobby_secs: value.lobby_secs.unwrap_or(defaults.lobby_secs),
            max_skip_fwd_secs: value.max_skip_fwd_secs.unwrap_or(defaults.max_skip_fwd_secs),
            large_skew: value.large_skew.unwrap_or(defaults.large_skew),
            cadence: value
                .cadence
                .map(Into::into)
                .unwrap_or(defaults.cadence),
        }
    }
}

impl From<RawCadence> for CadenceConfig {
    fn from(value: RawCadence) -> Self {
        let defaults = Self::default();
        Self {
            normal_ms: value.normal_ms.unwrap_or(defaults.normal_ms),
            fast_ms: value.fast_ms.unwrap_or(defaults.fast_ms),
            slow_ms: value.slow_ms.unwrap_or(defaults.slow_ms),
            faster_ms: value.faster_ms.unwrap_or(defaults.faster_ms),
            slower_ms: value.slower_ms.unwrap_or(defaults.slower_ms),
            err_threshold_ms: value.err_threshold_ms.unwrap_or(defaults.err_threshold_ms),
            err_threshold_large_ms: value
                .err_threshold_large_ms
                .unwrap_or(defaults.err_threshold_large_ms),
            init_offset_ms: value.init_offset_ms.unwrap_or(defaults.init_offset_ms),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
