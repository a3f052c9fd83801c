//! rust-relay library crate.
//!
//! Supervises a downloader-to-ffmpeg relay and exposes it over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod supervisor;

pub use error::{Error, Result};
