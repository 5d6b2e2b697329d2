//! Tutor API Library Crate
//!
//! Application state, configuration, the per-connection tutoring controller,
//! session lifecycle, WebSocket protocol, REST handlers and routing. The
//! binaries in `bin/` are thin wrappers around this library.

pub mod assets;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;

#[cfg(test)]
mod testing;
