//! API module for shared HTTP API functionality
//!
//! # Design Principle
//!
//! This module contains ONLY pure functions and shared types. The engine
//! wraps them with framework-specific middleware (Axum).

pub mod auth;

pub use auth::{parse_bearer, verify_admin_token, AdminAuthError};
