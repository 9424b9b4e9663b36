use std::time::Duration;

use crate::error::SessionError;

/// Timing knobs for the session lifecycle.
///
/// The defaults mirror the observed production values; every one of them is
/// a policy choice, not a protocol constant.
#[derive(Clone, Debug)]
pub struct ConnectionPolicy {
    /// Bounded wait inside `initialize` for the first liveness signal.
    /// Expiry is a soft failure: the call resolves and the session keeps
    /// connecting in the background.
    pub connect_timeout: Duration,
    /// Cadence for polling the media play state.
    pub liveness_poll: Duration,
    /// Cadence for keepalive probes while connected.
    pub probe_interval: Duration,
    /// Maximum silence from the engine before a reconnect is triggered.
    /// Must be strictly greater than `probe_interval`.
    pub staleness_threshold: Duration,
    /// Delay before the first reconnection attempt. Doubles after each
    /// failed attempt, capped at `reconnect_max_delay`.
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
    /// Debounce window for the command coalescer.
    pub debounce_window: Duration,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            liveness_poll: Duration::from_millis(500),
            probe_interval: Duration::from_secs(5),
            staleness_threshold: Duration::from_secs(30),
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            debounce_window: Duration::from_millis(100),
        }
    }
}

impl ConnectionPolicy {
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.staleness_threshold <= self.probe_interval {
            return Err(SessionError::InvalidPolicy(format!(
                "staleness_threshold ({:?}) must exceed probe_interval ({:?})",
                self.staleness_threshold, self.probe_interval
            )));
        }
        if self.reconnect_max_delay < self.reconnect_initial_delay {
            return Err(SessionError::InvalidPolicy(format!(
                "reconnect_max_delay ({:?}) is below reconnect_initial_delay ({:?})",
                self.reconnect_max_delay, self.reconnect_initial_delay
            )));
        }
        if self.liveness_poll.is_zero() || self.debounce_window.is_zero() {
            return Err(SessionError::InvalidPolicy(
                "liveness_poll and debounce_window must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
