//! # Aegis Chain
//!
//! Request-scoped security stages for HTTP services.
//!
//! A [`Chain`] is an immutable, ordered list of stages built once from
//! [`StageConfig`]s. Each request walks the chain with its own
//! [`SecurityContext`]; a stage either continues, annotates the response, or
//! short-circuits with a finished response.
//!
//! ```text
//! Request → CORS → Content-Type-Options → Frame-Options → XSS → Referrer → CSP → Handler
//!             │                                                                  │
//!             └─ rejection / pre-flight (short-circuit)      drafted headers ────┘
//! ```
//!
//! Stage order comes from [`StageKind`], not from registration order.
//! Registering a kind twice keeps the last configuration.
//!
//! ## Example
//!
//! ```
//! use aegis_chain::{
//!     ChainBuilder, CorsConfiguration, SecurityContext, UrlBasedCorsConfigurationSource,
//!     XssProtectionValue,
//! };
//! use std::sync::Arc;
//!
//! let mut source = UrlBasedCorsConfigurationSource::new();
//! source
//!     .register("/api/**", CorsConfiguration::builder().allow_origin("https://a.example"))
//!     .unwrap();
//!
//! let chain = ChainBuilder::with_defaults()
//!     .cors(|cors| cors.configuration_source = Some(Arc::new(source)))
//!     .xss_protection(|xss| xss.header_value = Some(XssProtectionValue::Enabled))
//!     .build()
//!     .unwrap();
//!
//! let request = http::Request::builder()
//!     .method("OPTIONS")
//!     .uri("/api/widgets")
//!     .header("host", "api.example")
//!     .header("origin", "https://evil.example")
//!     .header("access-control-request-method", "POST")
//!     .body(())
//!     .unwrap();
//!
//! let outcome = chain.execute(&mut SecurityContext::new(), &request);
//! assert!(outcome.is_short_circuit());
//! assert_eq!(outcome.response.status(), Some(http::StatusCode::FORBIDDEN));
//! ```

#![doc(html_root_url = "https://docs.rs/aegis-chain/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod config;
pub mod context;
pub mod stage;
pub mod stages;
pub mod types;

pub use chain::{BoxFuture, Chain, ChainBuilder, ChainHandle, ChainOutcome};
pub use config::{
    ContentSecurityPolicySpec, ContentTypeOptionsSpec, CorsSpec, FrameOptionsSpec, HeaderSpec,
    ReferrerPolicySpec, StageConfig, StagePayload, XssProtectionSpec,
};
pub use context::{ChainState, SecurityContext};
pub use stage::{BoxedStage, DisabledStage, Stage, StageKind, StageOutcome};
pub use stages::cors::{
    AllowedOrigins, CorsConfigError, CorsConfiguration, CorsConfigurationBuilder,
    CorsConfigurationSource, CorsPayload, CorsRejectionPolicy, CorsStage,
    DisallowedOriginPolicy, FnCorsConfigurationSource, Origin, PathPattern, ResolveResult,
    UrlBasedCorsConfigurationSource,
};
pub use stages::headers::{
    ContentSecurityPolicyValue, ContentTypeOptionsValue, FrameOptionsValue, HeaderDirective,
    HeaderWriterStage, ReferrerPolicyValue, XssProtectionValue,
};
pub use types::{Request, RequestHead, Response, ResponseDraft};
