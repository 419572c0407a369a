// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod dedupe;
pub mod digest;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod ranking;
pub mod store;
pub mod timezone;

pub use crate::api::{router, AppState};
pub use crate::error::ApiError;
