//! Driver tuning knobs.
//!
//! Settings are captured by the registry's constructors, so every driver
//! created for a backend type shares them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts and session options applied by backend drivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Upper bound for establishing a session, in seconds.
    pub connect_timeout_secs: u64,
    /// Upper bound for a throwaway `test_connection` session, in seconds.
    pub test_timeout_secs: u64,
    /// Character set negotiated on connect.
    pub charset: String,
}

impl DriverSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            test_timeout_secs: 5,
            charset: "utf8mb4".to_string(),
        }
    }
}
