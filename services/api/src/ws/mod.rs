//! WebSocket tutoring sessions
//!
//! - `protocol`: the JSON message format between the browser and the server.
//! - `devices`: the browser's microphone and speaker behind the capture and playback seams.
//! - `session`: the connection lifecycle, from `init` handshake to teardown.

pub mod devices;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
