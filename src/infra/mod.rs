//! Infrastructure adapters and runtime bootstrap.

pub mod admin_client;
pub mod error;
pub mod http;
pub mod origin;
pub mod sweeper;
pub mod telemetry;
