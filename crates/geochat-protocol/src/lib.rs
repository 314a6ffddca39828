//! # geochat-protocol
//!
//! Wire protocol definitions for the GeoChat realtime service.
//!
//! Clients and the server exchange named events. Each event is encoded as
//! `{"event": <name>, "data": <payload>}`, either as JSON text or as
//! length-prefixed MessagePack.
//!
//! ## Events
//!
//! - `join-room` - Report a position and move into its grid channel
//! - `chat-message` - Send to / receive from channel peers
//! - `user-joined` / `user-left` - Presence notices
//! - `connected` / `error` / `ping` / `pong` - Session plumbing
//!
//! ## Example
//!
//! ```rust
//! use geochat_protocol::{codec, ClientFrame};
//!
//! let frame = ClientFrame::join_room(37.7749, -122.4194);
//!
//! let text = codec::encode_json(&frame).unwrap();
//! let decoded: ClientFrame = codec::decode_json(&text).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod error_codes;
pub mod frames;
pub mod version;

pub use codec::{decode, encode, Encoding, ProtocolError};
pub use frames::{ClientFrame, EventName, Location, ServerFrame};
pub use version::{Version, PROTOCOL_VERSION};
