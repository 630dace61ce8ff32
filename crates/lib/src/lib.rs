//! Gateview core library — serial link, broadcast hub, digest auth, and the
//! HTTP/WebSocket gateway used by the CLI application.

pub mod auth;
pub mod config;
pub mod gateway;
pub mod hub;
pub mod message;
pub mod serial;
