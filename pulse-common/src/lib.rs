//! # Pulse Common Library
//!
//! Shared code for the pulse services including:
//! - Error type shared by library crates
//! - Clock abstraction (wall clock + manually driven clock for tests)
//! - TOML configuration loading and root folder resolution
//! - Admin identity verification
//! - Server-Sent Events transport adapter

pub mod api;
pub mod config;
pub mod error;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use time::{Clock, ManualClock, SystemClock};
