//! Command-line and HTTP control surface for the tabpilot engine.

pub mod cli;
pub mod config;
pub mod server;

pub use config::{AppConfig, ServerConfig};
