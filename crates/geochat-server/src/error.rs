//! Errors reported back to clients as `error` frames.

use geochat_core::{GeoError, RouterError};
use geochat_protocol::{error_codes, ProtocolError, ServerFrame};
use thiserror::Error;

/// A client request that could not be honored.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The frame could not be decoded.
    #[error("Malformed frame: {0}")]
    Malformed(#[from] ProtocolError),

    /// `join-room` carried an impossible position.
    #[error(transparent)]
    InvalidCoordinate(#[from] GeoError),

    /// The router refused the request.
    #[error(transparent)]
    Rejected(#[from] RouterError),
}

impl ClientError {
    /// Wire error code.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::Malformed(_) => error_codes::MALFORMED_FRAME,
            Self::InvalidCoordinate(_) => error_codes::INVALID_COORDINATE,
            Self::Rejected(RouterError::EmptyMessage) => error_codes::EMPTY_MESSAGE,
            Self::Rejected(RouterError::NotJoined(_)) => error_codes::NOT_JOINED,
            Self::Rejected(RouterError::MaxConnectionsReached) => error_codes::SERVER_FULL,
            Self::Rejected(_) => error_codes::UNAVAILABLE,
        }
    }

    /// Short label used for the error metric.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::InvalidCoordinate(_) => "invalid_coordinate",
            Self::Rejected(RouterError::EmptyMessage) => "empty_message",
            Self::Rejected(RouterError::NotJoined(_)) => "not_joined",
            Self::Rejected(RouterError::MaxConnectionsReached) => "server_full",
            Self::Rejected(_) => "unavailable",
        }
    }

    /// The `error` frame sent to the client.
    #[must_use]
    pub fn to_frame(&self) -> ServerFrame {
        ServerFrame::error(self.code(), self.to_string())
    }
}
