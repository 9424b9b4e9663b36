use std::fmt;

/// Connection lifecycle of the single remote session.
///
/// Owned exclusively by the [`SessionManager`](crate::SessionManager); every
/// transition is broadcast to subscribers after the state has changed.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ConnectionState {
    /// No session. Terminal only after an explicit disconnect.
    Disconnected,
    /// A handle exists but the media stream has not been observed playing yet.
    Connecting,
    /// The media stream is playing and commands are being delivered.
    Connected,
    /// No inbound activity within the staleness threshold.
    Stalled,
    /// A reconnection attempt is scheduled or in flight.
    Reconnecting,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Stalled => "stalled",
            ConnectionState::Reconnecting => "reconnecting",
        };
        write!(f, "{}", s)
    }
}

/// Notification broadcast on every state transition.
///
/// `connected` is the boolean projection for subscribers that only render a
/// connected/disconnected indicator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StateChange {
    pub state: ConnectionState,
    pub connected: bool,
}

impl StateChange {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self {
            state,
            connected: state.is_connected(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connected_projects_true() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Stalled.is_connected());
        assert!(!ConnectionState::Reconnecting.is_connected());
    }

    #[test]
    fn state_change_carries_projection() {
        assert!(StateChange::new(ConnectionState::Connected).connected);
        assert!(!StateChange::new(ConnectionState::Reconnecting).connected);
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }
}
