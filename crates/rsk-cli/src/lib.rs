//! rsk: command-line RSocket client
//!
//! Sends request-response, request-stream and fire-and-forget interactions
//! to an RSocket server over WebSocket or TCP.

pub mod commands;
pub mod output;
