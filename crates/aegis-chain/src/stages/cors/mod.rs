//! Cross-Origin Resource Sharing.
//!
//! The CORS stage runs first in the chain. For each request carrying an
//! `Origin` header it:
//!
//! 1. lets same-origin requests through untouched;
//! 2. rejects every cross-origin request if no configuration source is set;
//! 3. resolves the [`CorsConfiguration`] for the request path, passing the
//!    request through unmodified when nothing matches (or the source fails);
//! 4. answers pre-flights itself, with `204 No Content` and the
//!    `Access-Control-Allow-*` headers, or with a rejection;
//! 5. annotates actual requests from allowed origins and lets them continue.
//!
//! A rejection is a plain-text `Invalid CORS request` response without any
//! CORS header. It short-circuits the whole chain.

mod configuration;
mod origin;
mod pattern;
mod source;

pub use configuration::{
    AllowedOrigins, CorsConfigError, CorsConfiguration, CorsConfigurationBuilder,
};
pub use origin::Origin;
pub use pattern::PathPattern;
pub use source::{
    CorsConfigurationSource, FnCorsConfigurationSource, ResolveResult,
    UrlBasedCorsConfigurationSource,
};

use crate::stage::{Stage, StageKind, StageOutcome};
use crate::types::{RequestHead, ResponseDraft};
use aegis_core::{ConfigurationError, ConfigurationResult};
use aegis_telemetry::metrics::record_cors_rejection;
use configuration::join_header;
use http::{header, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Body of every CORS rejection response.
pub const REJECTION_BODY: &str = "Invalid CORS request";

const PREFLIGHT_VARY: &str = "Origin, Access-Control-Request-Method, Access-Control-Request-Headers";

/// What happens to an actual (non-pre-flight) request from a disallowed origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisallowedOriginPolicy {
    /// Short-circuit with a rejection response.
    #[default]
    Reject,
    /// Continue the chain without writing CORS headers.
    PassWithoutHeaders,
}

/// How the CORS stage rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorsRejectionPolicy {
    /// Status of rejection responses. Must be 4xx or 5xx.
    pub rejection_status: StatusCode,
    /// Handling of actual requests from disallowed origins.
    pub on_disallowed_origin: DisallowedOriginPolicy,
}

impl Default for CorsRejectionPolicy {
    fn default() -> Self {
        Self {
            rejection_status: StatusCode::FORBIDDEN,
            on_disallowed_origin: DisallowedOriginPolicy::Reject,
        }
    }
}

impl CorsRejectionPolicy {
    /// Checks the rejection status.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidRejectionStatus` unless the status
    /// is a client or server error.
    pub fn validate(&self) -> ConfigurationResult<()> {
        let status = self.rejection_status;
        if status.is_client_error() || status.is_server_error() {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidRejectionStatus {
                status: status.as_u16(),
            })
        }
    }
}

/// Configuration payload of the CORS stage.
///
/// Without a source every cross-origin request is rejected.
#[derive(Clone, Default)]
pub struct CorsPayload {
    /// Resolver for per-path configurations.
    pub source: Option<Arc<dyn CorsConfigurationSource>>,
    /// Rejection behaviour.
    pub rejection_policy: CorsRejectionPolicy,
}

impl CorsPayload {
    /// Creates a payload with a source and the default rejection policy.
    pub fn with_source(source: impl CorsConfigurationSource + 'static) -> Self {
        Self {
            source: Some(Arc::new(source)),
            rejection_policy: CorsRejectionPolicy::default(),
        }
    }
}

impl fmt::Debug for CorsPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorsPayload")
            .field("source", &self.source.as_ref().map(|_| "<source>"))
            .field("rejection_policy", &self.rejection_policy)
            .finish()
    }
}

/// The CORS stage.
#[derive(Clone)]
pub struct CorsStage {
    source: Option<Arc<dyn CorsConfigurationSource>>,
    policy: CorsRejectionPolicy,
}

impl CorsStage {
    /// Builds the stage from its payload.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if the rejection policy is invalid.
    pub fn new(payload: CorsPayload) -> ConfigurationResult<Self> {
        payload.rejection_policy.validate()?;
        Ok(Self {
            source: payload.source,
            policy: payload.rejection_policy,
        })
    }

    /// Returns the rejection policy.
    #[must_use]
    pub const fn policy(&self) -> &CorsRejectionPolicy {
        &self.policy
    }

    /// Returns true if a configuration source is set.
    #[must_use]
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    fn is_preflight(head: &RequestHead<'_>) -> bool {
        head.method() == Method::OPTIONS
            && head
                .headers()
                .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    }

    fn reject(
        &self,
        head: &RequestHead<'_>,
        draft: &mut ResponseDraft,
        preflight: bool,
        reason: &'static str,
    ) -> StageOutcome {
        if !preflight && self.policy.on_disallowed_origin == DisallowedOriginPolicy::PassWithoutHeaders
        {
            tracing::debug!(
                http.path = head.path(),
                reason,
                "cross-origin request not allowed, continuing without CORS headers"
            );
            return StageOutcome::Continue;
        }

        record_cors_rejection(reason);
        tracing::debug!(
            http.method = %head.method(),
            http.path = head.path(),
            origin = head.header_str(header::ORIGIN).unwrap_or("<opaque>"),
            preflight,
            reason,
            "CORS request rejected"
        );
        *draft = ResponseDraft::plain_text(self.policy.rejection_status, REJECTION_BODY);
        StageOutcome::ShortCircuit
    }

    fn handle_preflight(
        &self,
        head: &RequestHead<'_>,
        draft: &mut ResponseDraft,
        config: &CorsConfiguration,
        raw_origin: &HeaderValue,
    ) -> StageOutcome {
        let requested_method = head
            .header_str(header::ACCESS_CONTROL_REQUEST_METHOD)
            .and_then(|m| m.trim().parse::<Method>().ok());
        match requested_method {
            Some(method) if config.allows_method(&method) => {}
            _ => return self.reject(head, draft, true, "method"),
        }

        let requested_headers: Vec<String> = head
            .headers()
            .get_all(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        if !requested_headers.iter().all(|h| config.allows_header(h)) {
            return self.reject(head, draft, true, "headers");
        }

        draft.set_status(StatusCode::NO_CONTENT);
        let headers = draft.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            config.allow_origin_value(raw_origin),
        );
        if let Some(methods) = config.allow_methods_value() {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
        }
        if let Some(allowed) = join_header(requested_headers.iter().map(String::as_str)) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allowed);
        }
        if config.allow_credentials() {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        if let Some(max_age) = config.max_age() {
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(max_age.as_secs()));
        }
        headers.insert(header::VARY, HeaderValue::from_static(PREFLIGHT_VARY));

        tracing::debug!(http.path = head.path(), "CORS pre-flight accepted");
        StageOutcome::ShortCircuit
    }

    fn annotate(draft: &mut ResponseDraft, config: &CorsConfiguration, raw_origin: &HeaderValue) {
        let headers = draft.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            config.allow_origin_value(raw_origin),
        );
        if config.allow_credentials() {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        if let Some(exposed) = config.exposed_headers_value() {
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, exposed);
        }
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    }
}

impl Stage for CorsStage {
    fn kind(&self) -> StageKind {
        StageKind::Cors
    }

    fn apply(&self, head: &RequestHead<'_>, draft: &mut ResponseDraft) -> StageOutcome {
        let Some(raw_origin) = head.headers().get(header::ORIGIN) else {
            return StageOutcome::Continue;
        };

        let origin = raw_origin.to_str().ok().and_then(Origin::parse);
        if origin.as_ref().is_some_and(|o| o.is_same_origin(head)) {
            return StageOutcome::Continue;
        }

        let preflight = Self::is_preflight(head);
        let Some(source) = &self.source else {
            return self.reject(head, draft, preflight, "no_source");
        };

        let config = match source.resolve(head.path()) {
            Ok(Some(config)) => config,
            Ok(None) => return StageOutcome::Continue,
            Err(error) => {
                tracing::warn!(
                    http.path = head.path(),
                    %error,
                    "CORS configuration source failed, treating as no match"
                );
                return StageOutcome::Continue;
            }
        };

        match origin {
            Some(origin) if config.allows_origin(&origin) => {}
            _ => return self.reject(head, draft, preflight, "origin"),
        }

        if preflight {
            self.handle_preflight(head, draft, &config, raw_origin)
        } else {
            Self::annotate(draft, &config, raw_origin);
            StageOutcome::Continue
        }
    }
}

impl fmt::Debug for CorsStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorsStage")
            .field("has_source", &self.has_source())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::ResolverError;
    use std::time::Duration;

    fn stage_for(config: CorsConfigurationBuilder) -> CorsStage {
        let mut source = UrlBasedCorsConfigurationSource::new();
        source.register("/api/**", config).unwrap();
        CorsStage::new(CorsPayload::with_source(source)).unwrap()
    }

    fn default_stage() -> CorsStage {
        stage_for(
            CorsConfiguration::builder()
                .allow_origin("https://a.example")
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(["Content-Type", "X-Request-Id"]),
        )
    }

    fn request(method: Method, path: &str, origin: Option<&str>) -> http::Request<()> {
        let mut builder = http::Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, "api.example");
        if let Some(origin) = origin {
            builder = builder.header(header::ORIGIN, origin);
        }
        builder.body(()).unwrap()
    }

    fn preflight(path: &str, origin: &str, method: &str, headers: Option<&str>) -> http::Request<()> {
        let mut request = request(Method::OPTIONS, path, Some(origin));
        request.headers_mut().insert(
            header::ACCESS_CONTROL_REQUEST_METHOD,
            HeaderValue::from_str(method).unwrap(),
        );
        if let Some(h) = headers {
            request.headers_mut().insert(
                header::ACCESS_CONTROL_REQUEST_HEADERS,
                HeaderValue::from_str(h).unwrap(),
            );
        }
        request
    }

    fn run(stage: &CorsStage, request: &http::Request<()>) -> (StageOutcome, ResponseDraft) {
        let mut draft = ResponseDraft::new();
        let outcome = stage.apply(&RequestHead::from_request(request), &mut draft);
        (outcome, draft)
    }

    fn assert_rejected(outcome: StageOutcome, draft: &ResponseDraft, status: StatusCode) {
        assert_eq!(outcome, StageOutcome::ShortCircuit);
        assert_eq!(draft.status(), Some(status));
        assert_eq!(draft.body().as_ref(), REJECTION_BODY.as_bytes());
        assert!(!draft
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[test]
    fn test_no_origin_passes() {
        let (outcome, draft) = run(&default_stage(), &request(Method::GET, "/api/x", None));
        assert_eq!(outcome, StageOutcome::Continue);
        assert!(draft.is_empty());
    }

    #[test]
    fn test_same_origin_passes() {
        let stage = CorsStage::new(CorsPayload::default()).unwrap();
        let (outcome, draft) = run(
            &stage,
            &request(Method::POST, "/api/x", Some("http://api.example")),
        );
        assert_eq!(outcome, StageOutcome::Continue);
        assert!(draft.is_empty());
    }

    #[test]
    fn test_same_origin_https_behind_origin_form_uri_passes() {
        let stage = CorsStage::new(CorsPayload::default()).unwrap();
        let (outcome, draft) = run(
            &stage,
            &request(Method::POST, "/api/x", Some("https://api.example")),
        );
        assert_eq!(outcome, StageOutcome::Continue);
        assert!(draft.is_empty());

        let (outcome, _) = run(
            &stage,
            &request(Method::POST, "/api/x", Some("https://api.example:8443")),
        );
        assert_eq!(outcome, StageOutcome::ShortCircuit);
    }

    #[test]
    fn test_no_source_rejects_cross_origin() {
        let stage = CorsStage::new(CorsPayload::default()).unwrap();
        let (outcome, draft) = run(
            &stage,
            &request(Method::GET, "/api/x", Some("https://a.example")),
        );
        assert_rejected(outcome, &draft, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_preflight_allowed() {
        let (outcome, draft) = run(
            &default_stage(),
            &preflight("/api/widgets", "https://a.example", "POST", Some("content-type")),
        );

        assert_eq!(outcome, StageOutcome::ShortCircuit);
        assert_eq!(draft.status(), Some(StatusCode::NO_CONTENT));
        let headers = draft.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://a.example");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "content-type");
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
        assert!(!headers.contains_key(header::ACCESS_CONTROL_ALLOW_CREDENTIALS));
        assert_eq!(headers[header::VARY], PREFLIGHT_VARY);
    }

    #[test]
    fn test_preflight_disallowed_origin() {
        let (outcome, draft) = run(
            &default_stage(),
            &preflight("/api/widgets", "https://evil.example", "POST", None),
        );
        assert_rejected(outcome, &draft, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_preflight_disallowed_method() {
        let (outcome, draft) = run(
            &default_stage(),
            &preflight("/api/widgets", "https://a.example", "DELETE", None),
        );
        assert_rejected(outcome, &draft, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_preflight_disallowed_header() {
        let (outcome, draft) = run(
            &default_stage(),
            &preflight(
                "/api/widgets",
                "https://a.example",
                "POST",
                Some("Content-Type, X-Forbidden"),
            ),
        );
        assert_rejected(outcome, &draft, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_preflight_with_credentials_and_max_age() {
        let stage = stage_for(
            CorsConfiguration::builder()
                .allow_origin("https://a.example")
                .allow_credentials(true)
                .max_age(Duration::from_secs(600)),
        );
        let (_, draft) = run(
            &stage,
            &preflight("/api/widgets", "https://a.example", "GET", None),
        );

        assert_eq!(draft.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(draft.headers()[header::ACCESS_CONTROL_MAX_AGE], "600");
        assert!(!draft
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
    }

    #[test]
    fn test_custom_rejection_status() {
        let mut source = UrlBasedCorsConfigurationSource::new();
        source
            .register("/api/**", CorsConfiguration::builder())
            .unwrap();
        let stage = CorsStage::new(CorsPayload {
            source: Some(Arc::new(source)),
            rejection_policy: CorsRejectionPolicy {
                rejection_status: StatusCode::UNAUTHORIZED,
                ..CorsRejectionPolicy::default()
            },
        })
        .unwrap();

        let (outcome, draft) = run(
            &stage,
            &preflight("/api/widgets", "https://a.example", "GET", None),
        );
        assert_rejected(outcome, &draft, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_invalid_rejection_status() {
        let payload = CorsPayload {
            source: None,
            rejection_policy: CorsRejectionPolicy {
                rejection_status: StatusCode::OK,
                ..CorsRejectionPolicy::default()
            },
        };
        assert!(matches!(
            CorsStage::new(payload),
            Err(ConfigurationError::InvalidRejectionStatus { status: 200 })
        ));
    }

    #[test]
    fn test_actual_request_annotated() {
        let stage = stage_for(
            CorsConfiguration::builder()
                .allow_origin("https://a.example")
                .allow_credentials(true)
                .expose_headers(["X-Request-Id"]),
        );
        let (outcome, draft) = run(
            &stage,
            &request(Method::GET, "/api/widgets", Some("https://a.example")),
        );

        assert_eq!(outcome, StageOutcome::Continue);
        assert_eq!(draft.status(), None);
        let headers = draft.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://a.example");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_EXPOSE_HEADERS], "x-request-id");
        assert_eq!(headers[header::VARY], "Origin");
    }

    #[test]
    fn test_actual_request_disallowed_origin_rejected() {
        let (outcome, draft) = run(
            &default_stage(),
            &request(Method::GET, "/api/widgets", Some("https://evil.example")),
        );
        assert_rejected(outcome, &draft, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_actual_request_disallowed_origin_passes_when_configured() {
        let mut source = UrlBasedCorsConfigurationSource::new();
        source
            .register(
                "/api/**",
                CorsConfiguration::builder().allow_origin("https://a.example"),
            )
            .unwrap();
        let stage = CorsStage::new(CorsPayload {
            source: Some(Arc::new(source)),
            rejection_policy: CorsRejectionPolicy {
                on_disallowed_origin: DisallowedOriginPolicy::PassWithoutHeaders,
                ..CorsRejectionPolicy::default()
            },
        })
        .unwrap();

        let (outcome, draft) = run(
            &stage,
            &request(Method::GET, "/api/widgets", Some("https://evil.example")),
        );
        assert_eq!(outcome, StageOutcome::Continue);
        assert!(draft.is_empty());

        // Pre-flights are still rejected.
        let (outcome, _) = run(
            &stage,
            &preflight("/api/widgets", "https://evil.example", "GET", None),
        );
        assert_eq!(outcome, StageOutcome::ShortCircuit);
    }

    #[test]
    fn test_malformed_and_null_origins_disallowed() {
        for origin in ["null", "not a url", "https://a.example/path"] {
            let (outcome, draft) = run(
                &default_stage(),
                &request(Method::GET, "/api/widgets", Some(origin)),
            );
            assert_rejected(outcome, &draft, StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn test_unmatched_path_passes_unmodified() {
        let (outcome, draft) = run(
            &default_stage(),
            &preflight("/static/app.js", "https://evil.example", "GET", None),
        );
        assert_eq!(outcome, StageOutcome::Continue);
        assert!(draft.is_empty());
    }

    #[test]
    fn test_resolver_failure_treated_as_no_match() {
        let source = FnCorsConfigurationSource::new(|_path: &str| {
            Err(ResolverError::new("backend unavailable"))
        });
        let stage = CorsStage::new(CorsPayload::with_source(source)).unwrap();

        let (outcome, draft) = run(
            &stage,
            &request(Method::GET, "/api/widgets", Some("https://a.example")),
        );
        assert_eq!(outcome, StageOutcome::Continue);
        assert!(draft.is_empty());
    }

    #[test]
    fn test_any_origin_renders_wildcard() {
        let stage = stage_for(CorsConfiguration::builder().allow_any_origin());
        let (_, draft) = run(
            &stage,
            &request(Method::GET, "/api/widgets", Some("https://anywhere.example")),
        );
        assert_eq!(draft.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
