//! Connection lifecycle states.

/// The connection-level state machine.
///
/// ```text
/// Connecting ──► Open ──► LocalClosing ──► Closed
///     │           └─────► RemoteClosing ──► Closed
///     ├──► Rejecting ──► Closed
///     └──► Closed
/// ```
///
/// `Open` is entered when the handshake succeeds. A locally sent close frame
/// moves to `LocalClosing`; a close frame from the peer moves to
/// `RemoteClosing`. The handshake reject path passes through `Rejecting`
/// while response body bytes stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Opening handshake in progress.
    #[default]
    Connecting,
    /// Handshake rejected; rejection response body streaming.
    Rejecting,
    /// Data transfer phase.
    Open,
    /// Peer sent a close frame; a reply close is owed.
    RemoteClosing,
    /// A local close frame was sent; the peer's close is awaited.
    LocalClosing,
    /// Fully closed.
    Closed,
}

impl ConnectionState {
    /// Whether the connection has not yet fully closed.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }

    /// Whether inbound bytes are still meaningful in this state.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Rejecting
                | ConnectionState::Open
                | ConnectionState::LocalClosing
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Rejecting => "Rejecting",
            ConnectionState::Open => "Open",
            ConnectionState::RemoteClosing => "RemoteClosing",
            ConnectionState::LocalClosing => "LocalClosing",
            ConnectionState::Closed => "Closed",
        };
        write!(f, "{name}")
    }
}
