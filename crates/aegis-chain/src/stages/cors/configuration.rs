//! CORS rules for one path mapping.

use super::origin::Origin;
use http::{HeaderName, HeaderValue, Method};
use indexmap::IndexSet;
use std::time::Duration;
use thiserror::Error;

/// Why a [`CorsConfigurationBuilder`] refused to build.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorsConfigError {
    /// `*` origins cannot be combined with credentials.
    #[error("cannot use wildcard origin (*) with credentials; list exact origins instead")]
    WildcardWithCredentials,

    /// An origin is not of the form `scheme://host[:port]`.
    #[error("invalid origin '{origin}', expected scheme://host[:port]")]
    InvalidOriginFormat {
        /// The rejected origin.
        origin: String,
    },

    /// A header name is not a valid HTTP token.
    #[error("invalid header name '{header}'")]
    InvalidHeaderName {
        /// The rejected header.
        header: String,
    },
}

/// The set of allowed origins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Any origin (`*`).
    Any,
    /// Exactly these origins.
    List(IndexSet<Origin>),
}

impl AllowedOrigins {
    /// Checks if an origin is allowed.
    #[must_use]
    pub fn is_allowed(&self, origin: &Origin) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.contains(origin),
        }
    }

    /// Returns true for [`AllowedOrigins::Any`].
    #[must_use]
    pub const fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

/// CORS rules resolved for a request path.
///
/// Sets keep insertion order so the rendered headers are deterministic.
///
/// # Example
///
/// ```
/// use aegis_chain::CorsConfiguration;
/// use http::Method;
///
/// let config = CorsConfiguration::builder()
///     .allow_origin("https://a.example")
///     .allow_methods([Method::GET, Method::POST])
///     .allow_headers(["Content-Type"])
///     .build()
///     .unwrap();
///
/// assert!(config.allows_method(&Method::POST));
/// assert!(config.allows_header("content-type"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfiguration {
    allowed_origins: AllowedOrigins,
    allowed_methods: IndexSet<Method>,
    allowed_headers: IndexSet<String>,
    exposed_headers: IndexSet<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl CorsConfiguration {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> CorsConfigurationBuilder {
        CorsConfigurationBuilder::new()
    }

    /// A configuration allowing any origin, method and header.
    ///
    /// Intended for development only.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            allowed_origins: AllowedOrigins::Any,
            allowed_methods: IndexSet::from([
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
                Method::OPTIONS,
            ]),
            allowed_headers: IndexSet::from(["*".to_string()]),
            exposed_headers: IndexSet::new(),
            allow_credentials: false,
            max_age: Some(Duration::from_secs(86400)),
        }
    }

    /// Returns the allowed origins.
    #[must_use]
    pub const fn allowed_origins(&self) -> &AllowedOrigins {
        &self.allowed_origins
    }

    /// Returns the allowed methods.
    #[must_use]
    pub const fn allowed_methods(&self) -> &IndexSet<Method> {
        &self.allowed_methods
    }

    /// Returns the allowed request headers, lowercased.
    #[must_use]
    pub const fn allowed_headers(&self) -> &IndexSet<String> {
        &self.allowed_headers
    }

    /// Returns the headers exposed to scripts, lowercased.
    #[must_use]
    pub const fn exposed_headers(&self) -> &IndexSet<String> {
        &self.exposed_headers
    }

    /// Returns whether credentials are allowed.
    #[must_use]
    pub const fn allow_credentials(&self) -> bool {
        self.allow_credentials
    }

    /// Returns the pre-flight cache duration.
    #[must_use]
    pub const fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Checks if an origin is allowed.
    #[must_use]
    pub fn allows_origin(&self, origin: &Origin) -> bool {
        self.allowed_origins.is_allowed(origin)
    }

    /// Checks if a method is allowed.
    #[must_use]
    pub fn allows_method(&self, method: &Method) -> bool {
        self.allowed_methods.contains(method)
    }

    /// Checks if a request header is allowed. Comparison ignores case.
    #[must_use]
    pub fn allows_header(&self, header: &str) -> bool {
        self.allowed_headers.contains("*")
            || self
                .allowed_headers
                .contains(header.trim().to_ascii_lowercase().as_str())
    }

    /// The `Access-Control-Allow-Origin` value for an allowed origin.
    ///
    /// With credentials the origin is echoed, otherwise `Any` renders `*`.
    pub(crate) fn allow_origin_value(&self, raw_origin: &HeaderValue) -> HeaderValue {
        if self.allowed_origins.is_any() && !self.allow_credentials {
            HeaderValue::from_static("*")
        } else {
            raw_origin.clone()
        }
    }

    pub(crate) fn allow_methods_value(&self) -> Option<HeaderValue> {
        join_header(self.allowed_methods.iter().map(Method::as_str))
    }

    pub(crate) fn exposed_headers_value(&self) -> Option<HeaderValue> {
        join_header(self.exposed_headers.iter().map(String::as_str))
    }
}

/// Joins values into one comma-separated header value.
pub(crate) fn join_header<'a>(values: impl Iterator<Item = &'a str>) -> Option<HeaderValue> {
    let joined = values.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        return None;
    }
    HeaderValue::from_str(&joined).ok()
}

/// Builder for [`CorsConfiguration`].
///
/// Defaults: no origins, methods GET, HEAD, POST, PUT, DELETE and PATCH,
/// no extra headers, no credentials, a 24 hour pre-flight cache.
#[derive(Debug, Clone)]
pub struct CorsConfigurationBuilder {
    any_origin: bool,
    origins: Vec<String>,
    methods: IndexSet<Method>,
    headers: Vec<String>,
    exposed: Vec<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl Default for CorsConfigurationBuilder {
    fn default() -> Self {
        Self {
            any_origin: false,
            origins: Vec::new(),
            methods: IndexSet::from([
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
            ]),
            headers: Vec::new(),
            exposed: Vec::new(),
            allow_credentials: false,
            max_age: Some(Duration::from_secs(86400)),
        }
    }
}

impl CorsConfigurationBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows any origin.
    #[must_use]
    pub fn allow_any_origin(mut self) -> Self {
        self.any_origin = true;
        self
    }

    /// Adds an allowed origin. `*` is the same as [`allow_any_origin`](Self::allow_any_origin).
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        if origin.trim() == "*" {
            self.any_origin = true;
        } else {
            self.origins.push(origin);
        }
        self
    }

    /// Adds several allowed origins.
    #[must_use]
    pub fn allow_origins<I, S>(self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        origins.into_iter().fold(self, Self::allow_origin)
    }

    /// Replaces the allowed methods.
    #[must_use]
    pub fn allow_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.methods = methods.into_iter().collect();
        self
    }

    /// Adds an allowed request header. `*` allows any header.
    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    /// Replaces the allowed request headers.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the headers exposed to scripts.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exposed = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether credentials are allowed.
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// Sets the pre-flight cache duration.
    #[must_use]
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.max_age = Some(duration);
        self
    }

    /// Omits `Access-Control-Max-Age`.
    #[must_use]
    pub fn no_max_age(mut self) -> Self {
        self.max_age = None;
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `CorsConfigError` if the wildcard origin is combined with
    /// credentials, or if an origin or header name is malformed.
    pub fn build(self) -> Result<CorsConfiguration, CorsConfigError> {
        if self.any_origin && self.allow_credentials {
            return Err(CorsConfigError::WildcardWithCredentials);
        }

        let allowed_origins = if self.any_origin {
            AllowedOrigins::Any
        } else {
            let origins = self
                .origins
                .into_iter()
                .map(|raw| {
                    Origin::parse(raw.trim())
                        .ok_or(CorsConfigError::InvalidOriginFormat { origin: raw })
                })
                .collect::<Result<IndexSet<_>, _>>()?;
            AllowedOrigins::List(origins)
        };

        Ok(CorsConfiguration {
            allowed_origins,
            allowed_methods: self.methods,
            allowed_headers: normalize_headers(self.headers, true)?,
            exposed_headers: normalize_headers(self.exposed, false)?,
            allow_credentials: self.allow_credentials,
            max_age: self.max_age,
        })
    }
}

fn normalize_headers(
    headers: Vec<String>,
    allow_wildcard: bool,
) -> Result<IndexSet<String>, CorsConfigError> {
    headers
        .into_iter()
        .map(|header| {
            let lowered = header.trim().to_ascii_lowercase();
            if allow_wildcard && lowered == "*" {
                return Ok(lowered);
            }
            HeaderName::from_bytes(lowered.as_bytes())
                .map(|_| lowered)
                .map_err(|_| CorsConfigError::InvalidHeaderName { header })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(s: &str) -> Origin {
        Origin::parse(s).unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let config = CorsConfiguration::builder().build().unwrap();
        assert!(!config.allow_credentials());
        assert_eq!(config.max_age(), Some(Duration::from_secs(86400)));
        assert_eq!(config.allowed_methods().len(), 6);
        assert!(!config.allows_origin(&origin("https://a.example")));
    }

    #[test]
    fn test_builder_allow_origin() {
        let config = CorsConfiguration::builder()
            .allow_origin("https://example.com")
            .allow_origin("https://app.example.com")
            .build()
            .unwrap();

        assert!(config.allows_origin(&origin("https://example.com")));
        assert!(config.allows_origin(&origin("https://APP.example.com:443")));
        assert!(!config.allows_origin(&origin("https://evil.com")));
    }

    #[test]
    fn test_star_origin_means_any() {
        let config = CorsConfiguration::builder()
            .allow_origins(["*"])
            .build()
            .unwrap();
        assert!(config.allowed_origins().is_any());
        assert!(config.allows_origin(&origin("https://anything.example")));
    }

    #[test]
    fn test_wildcard_with_credentials_rejected() {
        let err = CorsConfiguration::builder()
            .allow_any_origin()
            .allow_credentials(true)
            .build()
            .unwrap_err();
        assert_eq!(err, CorsConfigError::WildcardWithCredentials);
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let err = CorsConfiguration::builder()
            .allow_origin("a.example/path")
            .build()
            .unwrap_err();
        assert!(matches!(err, CorsConfigError::InvalidOriginFormat { .. }));
    }

    #[test]
    fn test_headers_lowercased_and_checked() {
        let config = CorsConfiguration::builder()
            .allow_headers(["Content-Type", "X-Custom-Header"])
            .build()
            .unwrap();

        assert!(config.allows_header("content-type"));
        assert!(config.allows_header("X-CUSTOM-HEADER"));
        assert!(!config.allows_header("authorization"));

        let err = CorsConfiguration::builder()
            .allow_header("bad header")
            .build()
            .unwrap_err();
        assert!(matches!(err, CorsConfigError::InvalidHeaderName { .. }));
    }

    #[test]
    fn test_wildcard_header() {
        let config = CorsConfiguration::permissive();
        assert!(config.allows_header("x-anything"));
        assert!(config.allows_method(&Method::OPTIONS));
    }

    #[test]
    fn test_allow_origin_value() {
        let raw = HeaderValue::from_static("https://a.example");

        let any = CorsConfiguration::permissive();
        assert_eq!(any.allow_origin_value(&raw), "*");

        let listed = CorsConfiguration::builder()
            .allow_origin("https://a.example")
            .build()
            .unwrap();
        assert_eq!(listed.allow_origin_value(&raw), "https://a.example");
    }

    #[test]
    fn test_methods_render_in_order() {
        let config = CorsConfiguration::builder()
            .allow_methods([Method::POST, Method::GET])
            .build()
            .unwrap();
        assert_eq!(config.allow_methods_value().unwrap(), "POST, GET");
    }
}
