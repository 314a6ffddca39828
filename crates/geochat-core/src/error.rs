//! Router errors.

use crate::registry::ConnectionId;
use thiserror::Error;
use tracing::error;

/// Errors returned by router and lifecycle operations.
///
/// `UnknownConnection` and `AlreadyRegistered` indicate miswired lifecycle
/// hooks. They panic in debug builds and are only returned in release builds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// Chat message body was empty or whitespace.
    #[error("Message body is empty")]
    EmptyMessage,

    /// Chat message sent before any location update.
    #[error("Connection {0} has not joined a channel yet")]
    NotJoined(ConnectionId),

    /// The connection is being or has been torn down.
    #[error("Connection {0} is disconnecting")]
    Disconnected(ConnectionId),

    /// Operation on a connection that was never registered.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// Registration of an id that is already live.
    #[error("Connection already registered: {0}")]
    AlreadyRegistered(ConnectionId),

    /// Maximum connections reached.
    #[error("Maximum connections reached")]
    MaxConnectionsReached,
}

/// Report a membership consistency failure.
///
/// Fatal in debug builds; logged and returned otherwise.
pub(crate) fn consistency_failure(err: RouterError) -> RouterError {
    error!(error = %err, "Membership consistency failure");
    debug_assert!(false, "consistency failure: {err}");
    err
}
