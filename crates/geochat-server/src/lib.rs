//! # geochat-server
//!
//! WebSocket front end for the GeoChat service: configuration, metrics and
//! the per-connection read/write loop feeding [`geochat_core`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;

pub use crate::config::{Cli, Config};
pub use crate::error::ClientError;
pub use crate::handlers::{app, dispatch, run_server, serve, AppState};
