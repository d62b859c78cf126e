use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Delay between the end of one poll and the start of the next
    pub poll_interval: Duration,
    /// How far before "now" the first poll starts reading
    pub startup_margin: Duration,
    /// Per-query limit. An expired query halts the listener like any other
    /// query failure. `None` waits indefinitely.
    pub query_timeout: Option<Duration>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            startup_margin: Duration::from_secs(5),
            query_timeout: None,
        }
    }
}
