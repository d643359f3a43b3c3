pub mod api;
pub mod config;
pub mod error;
pub mod retention;
pub mod state_factory;
pub mod telemetry;
