//! Registry configuration

use std::time::Duration;

/// Room lifecycle settings
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Empty rooms with no publisher activity for this long are reaped
    pub idle_room_timeout: Duration,

    /// How often the reaper runs
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_room_timeout: Duration::from_secs(600),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl RegistryConfig {
    pub fn idle_room_timeout(mut self, timeout: Duration) -> Self {
        self.idle_room_timeout = timeout;
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
