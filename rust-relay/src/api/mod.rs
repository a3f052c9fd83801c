//! HTTP command layer.
//!
//! A thin `axum` wrapper around [`crate::supervisor::SupervisorHandle`]:
//! stream commands, status, overlay upload and preview, log filter control
//! and the static dashboard.

pub mod error;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerConfig, AppState};
