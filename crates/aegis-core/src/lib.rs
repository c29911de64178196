//! # Aegis Core
//!
//! Core types shared by every Aegis crate.
//!
//! - [`RequestId`] - UUID v7 request identifier used for log correlation
//! - [`ConfigurationError`] - build-time errors that abort startup
//! - [`ResolverError`] - per-request failures reported by CORS configuration sources

#![doc(html_root_url = "https://docs.rs/aegis-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;

pub use context::RequestId;
pub use error::{ConfigurationError, ConfigurationResult, ResolverError};
