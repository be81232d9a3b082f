//! src/lib.rs
// make public to the generated application binaries (and their tests)
pub mod auth;
pub mod configuration;
pub mod database;
pub mod error;
pub mod notifications;
pub mod telemetry;
