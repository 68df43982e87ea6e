//! Transport gateway for the dispatch core.
//!
//! Speaks newline-delimited JSON frames over TCP, implements the core's
//! `Transport` trait on tokio channels, and turns boundary events (`join`,
//! `update-location`, ride operations, disconnects) into core calls.

pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;
