//! # Aegis
//!
//! **Request-scoped security filter chain for HTTP services**
//!
//! Aegis runs every request through an ordered, immutable sequence of
//! security stages before it reaches the handler:
//!
//! - **CORS** – pre-flight answers, origin checks and `Access-Control-*` headers
//! - **Security headers** – `X-Content-Type-Options`, `X-Frame-Options`,
//!   `X-XSS-Protection`, `Referrer-Policy`, `Content-Security-Policy`
//! - **Typed configuration** – TOML/JSON files with environment overrides and
//!   hot reload
//! - **Observability** – structured `tracing` logs and Prometheus metrics
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use aegis::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut source = UrlBasedCorsConfigurationSource::new();
//! source.register(
//!     "/api/**",
//!     CorsConfiguration::builder().allow_origin("https://a.example"),
//! )?;
//!
//! let chain = ChainBuilder::with_defaults()
//!     .cors(|cors| cors.configuration_source = Some(Arc::new(source)))
//!     .xss_protection(|xss| xss.header_value = Some(XssProtectionValue::EnabledModeBlock))
//!     .build()?;
//!
//! let handle = ChainHandle::new(chain);
//!
//! let request = http::Request::builder().uri("/index.html").body(())?;
//! let outcome = handle.current().execute(&mut SecurityContext::new(), &request);
//! assert!(!outcome.is_short_circuit());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Stages run in a fixed priority order. The first stage that produces a
//! response ends the chain; the handler and later stages never run.
//!
//! ```text
//! Request → CORS → ContentTypeOptions → FrameOptions → XssProtection
//!         → ReferrerPolicy → ContentSecurityPolicy → Handler
//!                                                       ↓
//! Response ← headers drafted by the stages ←────────────┘
//! ```

#![doc(html_root_url = "https://docs.rs/aegis/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use aegis_core as core;

// Re-export the chain and its stages
pub use aegis_chain as chain;

// Re-export configuration loading and hot reload
pub use aegis_config as config;

// Re-export logging and metrics setup
pub use aegis_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use aegis::prelude::*;
///
/// let chain = ChainBuilder::with_defaults().build().unwrap();
/// assert_eq!(chain.stage_count(), 3);
/// ```
pub mod prelude {
    pub use aegis_core::{ConfigurationError, ConfigurationResult, RequestId, ResolverError};

    // Chain construction and execution
    pub use aegis_chain::{
        Chain, ChainBuilder, ChainHandle, ChainOutcome, SecurityContext, Stage, StageConfig,
        StageKind, StageOutcome,
    };

    // CORS
    pub use aegis_chain::{
        CorsConfiguration, CorsConfigurationSource, CorsRejectionPolicy, DisallowedOriginPolicy,
        FnCorsConfigurationSource, UrlBasedCorsConfigurationSource,
    };

    // Header values
    pub use aegis_chain::{
        ContentSecurityPolicyValue, ContentTypeOptionsValue, FrameOptionsValue,
        ReferrerPolicyValue, XssProtectionValue,
    };

    // Configuration
    pub use aegis_config::{AegisConfig, ChainReloader, ConfigError, ConfigLoader};

    // Telemetry
    pub use aegis_telemetry::{init_telemetry, TelemetryConfig};
}
