//! Connection lifecycle state machine.
//!
//! Transitions are a pure function of the current state and one event, so
//! the whole table can be checked without any I/O.

use std::fmt;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Closed by the caller or cleanly by the radio
    Normal,
    /// Closed by a transport failure
    Error(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Normal => f.write_str("normal"),
            DisconnectReason::Error(message) => write!(f, "error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    ConnectingTcp,
    TcpConnected,
    UdpBound,
    ClientConnected,
    Disconnected(DisconnectReason),
    UpdateInProgress,
}

/// Inputs to [`ConnectionState::on`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    Connect,
    TcpLive,
    Abort,
    UdpBound,
    ClientAttached,
    UpdateStarted,
    ChannelClosed(DisconnectReason),
}

impl ConnectionState {
    /// Whether a session exists in this state
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::ConnectingTcp
                | ConnectionState::TcpConnected
                | ConnectionState::UdpBound
                | ConnectionState::ClientConnected
                | ConnectionState::UpdateInProgress
        )
    }

    /// Next state for `event`, or `None` when the event does not apply here
    pub fn on(&self, event: StateEvent) -> Option<ConnectionState> {
        use ConnectionState as S;

        match (self, event) {
            (S::Idle | S::Disconnected(_), StateEvent::Connect) => Some(S::ConnectingTcp),
            (S::ConnectingTcp, StateEvent::TcpLive) => Some(S::TcpConnected),
            (S::ConnectingTcp, StateEvent::Abort) => Some(S::Idle),
            (S::TcpConnected, StateEvent::UdpBound) => Some(S::UdpBound),
            (S::UdpBound, StateEvent::ClientAttached) => Some(S::ClientConnected),
            (S::ClientConnected, StateEvent::UpdateStarted) => Some(S::UpdateInProgress),
            (state, StateEvent::ChannelClosed(reason)) if state.is_active() => {
                Some(S::Disconnected(reason))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => f.write_str("idle"),
            ConnectionState::ConnectingTcp => f.write_str("connecting"),
            ConnectionState::TcpConnected => f.write_str("tcp connected"),
            ConnectionState::UdpBound => f.write_str("udp bound"),
            ConnectionState::ClientConnected => f.write_str("client connected"),
            ConnectionState::Disconnected(reason) => write!(f, "disconnected ({reason})"),
            ConnectionState::UpdateInProgress => f.write_str("update in progress"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_states() -> Vec<ConnectionState> {
        vec![
            ConnectionState::Idle,
            ConnectionState::ConnectingTcp,
            ConnectionState::TcpConnected,
            ConnectionState::UdpBound,
            ConnectionState::ClientConnected,
            ConnectionState::Disconnected(DisconnectReason::Normal),
            ConnectionState::Disconnected(DisconnectReason::Error("reset".into())),
            ConnectionState::UpdateInProgress,
        ]
    }

    fn all_events() -> Vec<StateEvent> {
        vec![
            StateEvent::Connect,
            StateEvent::TcpLive,
            StateEvent::Abort,
            StateEvent::UdpBound,
            StateEvent::ClientAttached,
            StateEvent::UpdateStarted,
            StateEvent::ChannelClosed(DisconnectReason::Normal),
            StateEvent::ChannelClosed(DisconnectReason::Error("eof".into())),
        ]
    }

    fn expected(state: &ConnectionState, event: &StateEvent) -> Option<ConnectionState> {
        use ConnectionState as S;
        use StateEvent as E;

        match (state, event) {
            (S::Idle, E::Connect) => Some(S::ConnectingTcp),
            (S::Disconnected(_), E::Connect) => Some(S::ConnectingTcp),
            (S::ConnectingTcp, E::TcpLive) => Some(S::TcpConnected),
            (S::ConnectingTcp, E::Abort) => Some(S::Idle),
            (S::TcpConnected, E::UdpBound) => Some(S::UdpBound),
            (S::UdpBound, E::ClientAttached) => Some(S::ClientConnected),
            (S::ClientConnected, E::UpdateStarted) => Some(S::UpdateInProgress),
            (
                S::ConnectingTcp
                | S::TcpConnected
                | S::UdpBound
                | S::ClientConnected
                | S::UpdateInProgress,
                E::ChannelClosed(reason),
            ) => Some(S::Disconnected(reason.clone())),
            _ => None,
        }
    }

    #[test]
    fn every_state_event_pair() {
        let mut accepted = 0;
        for state in all_states() {
            for event in all_events() {
                let next = state.on(event.clone());
                assert_eq!(next, expected(&state, &event), "{state:?} + {event:?}");
                accepted += usize::from(next.is_some());
            }
        }
        // 2 connects from Disconnected, 1 from Idle, 5 forward steps, 5 active states x 2 closes
        assert_eq!(accepted, 3 + 5 + 10);
    }

    #[test]
    fn close_carries_reason() {
        let next = ConnectionState::ClientConnected
            .on(StateEvent::ChannelClosed(DisconnectReason::Error(
                "connection reset".into(),
            )));
        assert_eq!(
            next,
            Some(ConnectionState::Disconnected(DisconnectReason::Error(
                "connection reset".into()
            )))
        );
    }

    #[test]
    fn idle_ignores_close() {
        assert_eq!(
            ConnectionState::Idle.on(StateEvent::ChannelClosed(DisconnectReason::Normal)),
            None
        );
        assert!(!ConnectionState::Disconnected(DisconnectReason::Normal).is_active());
    }
}
