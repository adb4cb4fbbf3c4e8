//! # API Shared
//!
//! Shared definitions for the triage APIs.
//!
//! Contains:
//! - Wire types (`dto` module) with OpenAPI schemas
//! - Conversions between wire types and `triage-core` records
//! - Shared services like `HealthService`
//! - API key validation
//!
//! Used by `api-rest` and the CLI for common functionality.

pub mod auth;
pub mod convert;
pub mod dto;
pub mod health;

pub use convert::{DtoError, DtoResult};
pub use dto::*;
pub use health::HealthService;
