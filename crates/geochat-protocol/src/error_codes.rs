//! Error codes carried by `error` frames.

/// The frame could not be decoded.
pub const MALFORMED_FRAME: u16 = 4000;

/// The reported position is not a valid coordinate.
pub const INVALID_COORDINATE: u16 = 4001;

/// Chat message body was empty.
pub const EMPTY_MESSAGE: u16 = 4002;

/// Chat message sent before the first `join-room`.
pub const NOT_JOINED: u16 = 4003;

/// The server refused the connection.
pub const SERVER_FULL: u16 = 4004;

/// The connection is closing or unknown to the server.
pub const UNAVAILABLE: u16 = 4005;
