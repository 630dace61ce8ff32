//! Gateway HTTP + WebSocket server (single port).

pub mod server;
pub mod session;
pub mod statics;

pub use server::{run_gateway, GatewayState};
