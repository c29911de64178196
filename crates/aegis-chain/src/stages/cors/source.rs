//! Resolvers mapping request paths to CORS configurations.

use super::configuration::{CorsConfiguration, CorsConfigurationBuilder};
use super::pattern::PathPattern;
use aegis_core::{ConfigurationError, ConfigurationResult, ResolverError};
use std::fmt;
use std::sync::Arc;

/// Result of resolving a request path.
pub type ResolveResult = Result<Option<Arc<CorsConfiguration>>, ResolverError>;

/// Resolves the CORS configuration for a request path.
///
/// Called once per cross-origin request, from any number of tasks at once.
/// Implementations holding a mutable cache must synchronize it themselves.
/// `Ok(None)` means no mapping applies; an `Err` is logged by the CORS stage
/// and treated the same way.
pub trait CorsConfigurationSource: Send + Sync {
    /// Returns the configuration for `path`, if any.
    fn resolve(&self, path: &str) -> ResolveResult;
}

/// Ordered pattern mappings; the first registered match wins.
///
/// # Example
///
/// ```
/// use aegis_chain::{CorsConfiguration, CorsConfigurationSource, UrlBasedCorsConfigurationSource};
///
/// let mut source = UrlBasedCorsConfigurationSource::new();
/// source
///     .register(
///         "/api/**",
///         CorsConfiguration::builder().allow_origin("https://a.example"),
///     )
///     .unwrap();
///
/// assert!(source.resolve("/api/widgets").unwrap().is_some());
/// assert!(source.resolve("/admin").unwrap().is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct UrlBasedCorsConfigurationSource {
    mappings: Vec<(PathPattern, Arc<CorsConfiguration>)>,
}

impl UrlBasedCorsConfigurationSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a mapping.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPathPattern` for a malformed pattern, or
    /// `InvalidCors` if the builder rejects the configuration.
    pub fn register(
        &mut self,
        pattern: &str,
        configuration: CorsConfigurationBuilder,
    ) -> ConfigurationResult<&mut Self> {
        let compiled = PathPattern::parse(pattern)?;
        let configuration = configuration
            .build()
            .map_err(|e| ConfigurationError::invalid_cors(pattern, e.to_string()))?;
        Ok(self.register_built(compiled, configuration))
    }

    /// Registers an already-validated configuration.
    pub fn register_built(
        &mut self,
        pattern: PathPattern,
        configuration: CorsConfiguration,
    ) -> &mut Self {
        self.mappings.push((pattern, Arc::new(configuration)));
        self
    }

    /// Returns the registered patterns in match order.
    pub fn patterns(&self) -> impl Iterator<Item = &PathPattern> {
        self.mappings.iter().map(|(pattern, _)| pattern)
    }

    /// Returns the number of mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl CorsConfigurationSource for UrlBasedCorsConfigurationSource {
    fn resolve(&self, path: &str) -> ResolveResult {
        Ok(self
            .mappings
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, configuration)| Arc::clone(configuration)))
    }
}

/// A source backed by a closure.
///
/// # Example
///
/// ```
/// use aegis_chain::{CorsConfiguration, CorsConfigurationSource, FnCorsConfigurationSource};
/// use std::sync::Arc;
///
/// let shared = Arc::new(CorsConfiguration::permissive());
/// let source = FnCorsConfigurationSource::new(move |path: &str| {
///     Ok(path.starts_with("/public").then(|| Arc::clone(&shared)))
/// });
///
/// assert!(source.resolve("/public/logo.png").unwrap().is_some());
/// ```
pub struct FnCorsConfigurationSource<F> {
    func: F,
}

impl<F> FnCorsConfigurationSource<F>
where
    F: Fn(&str) -> ResolveResult + Send + Sync,
{
    /// Wraps a resolver function.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> CorsConfigurationSource for FnCorsConfigurationSource<F>
where
    F: Fn(&str) -> ResolveResult + Send + Sync,
{
    fn resolve(&self, path: &str) -> ResolveResult {
        (self.func)(path)
    }
}

impl<F> fmt::Debug for FnCorsConfigurationSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCorsConfigurationSource").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::cors::Origin;

    #[test]
    fn test_first_registered_match_wins() {
        let mut source = UrlBasedCorsConfigurationSource::new();
        source
            .register(
                "/api/public/**",
                CorsConfiguration::builder().allow_any_origin(),
            )
            .unwrap()
            .register(
                "/api/**",
                CorsConfiguration::builder().allow_origin("https://a.example"),
            )
            .unwrap();

        let public = source.resolve("/api/public/feed").unwrap().unwrap();
        assert!(public.allowed_origins().is_any());

        let private = source.resolve("/api/orders").unwrap().unwrap();
        assert!(!private.allowed_origins().is_any());
        assert!(private.allows_origin(&Origin::parse("https://a.example").unwrap()));

        let order: Vec<_> = source.patterns().map(PathPattern::as_str).collect();
        assert_eq!(order, vec!["/api/public/**", "/api/**"]);
    }

    #[test]
    fn test_no_match() {
        let mut source = UrlBasedCorsConfigurationSource::new();
        source
            .register("/api/**", CorsConfiguration::builder())
            .unwrap();
        assert!(source.resolve("/health").unwrap().is_none());
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_register_reports_pattern() {
        let mut source = UrlBasedCorsConfigurationSource::new();
        let err = source
            .register(
                "/api/**",
                CorsConfiguration::builder()
                    .allow_any_origin()
                    .allow_credentials(true),
            )
            .unwrap_err();

        match err {
            ConfigurationError::InvalidCors { pattern, .. } => assert_eq!(pattern, "/api/**"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(source.is_empty());

        assert!(matches!(
            source.register("api", CorsConfiguration::builder()),
            Err(ConfigurationError::InvalidPathPattern { .. })
        ));
    }

    #[test]
    fn test_fn_source_errors_propagate() {
        let source = FnCorsConfigurationSource::new(|_path: &str| {
            Err(ResolverError::new("backend unavailable"))
        });
        let err = source.resolve("/api").unwrap_err();
        assert_eq!(err.message(), "backend unavailable");
    }
}
