use std::time::Duration;

/// Timer settings for one collaboration session.
#[derive(Debug, Clone)]
pub struct CollabConfig {
    /// Quiet period after the last local edit before a snapshot is broadcast.
    pub broadcast_debounce: Duration,
    /// Quiet period after the last change before the layout is persisted.
    pub autosave_debounce: Duration,
    /// How often the local presence record is re-announced.
    pub heartbeat_interval: Duration,
    /// Peers silent for longer than this are dropped (and lose their locks).
    pub presence_timeout: Duration,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            broadcast_debounce: Duration::from_millis(50),
            autosave_debounce: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(10),
            presence_timeout: Duration::from_secs(30),
        }
    }
}

impl CollabConfig {
    /// Short heartbeat and timeout so tests can exercise pruning quickly.
    pub fn for_testing() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(100),
            presence_timeout: Duration::from_millis(300),
            ..Self::default()
        }
    }
}
