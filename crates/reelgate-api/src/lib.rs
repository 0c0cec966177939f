//! Reelgate HTTP API
//!
//! The axum surface over the upload and transcoding services, plus the application
//! wiring used by the `reelgate-api` binary and the integration tests.

pub mod api_doc;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;
pub mod telemetry;
