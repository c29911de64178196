//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use aegis_chain::{
    ContentTypeOptionsValue, DisallowedOriginPolicy, FrameOptionsValue, ReferrerPolicyValue,
    XssProtectionValue,
};
use aegis_core::ConfigurationError;

use crate::{AegisConfig, ConfigError, CspSettings, HeaderSettings, LogFormat};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use aegis_config::ConfigLoader;
///
/// # fn main() -> Result<(), aegis_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("aegis.toml")?
///     .with_env_prefix("AEGIS")
///     .load()?;
///
/// let chain = config.build_chain()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: AegisConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: AegisConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with default configuration values.
    ///
    /// This is what `new()` starts from; chain it for clarity or to reset.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = AegisConfig::default();
        self
    }

    /// Start with the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = AegisConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = AegisConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension: `.toml` or `.json`. The file
    /// replaces the current configuration; sections it omits take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The file contains invalid TOML/JSON
    /// - The file contains unknown fields
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`"toml"` or `"json"`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use aegis_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [chain.headers.xss_protection]
    ///     value = "ENABLED"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert!(config.chain.headers.xss_protection.is_some());
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`, for
    /// example with prefix "AEGIS":
    /// - `AEGIS__TELEMETRY__LOGGING__LEVEL=debug`
    /// - `AEGIS__CHAIN__CORS__REJECTION_STATUS=401`
    /// - `AEGIS__CHAIN__HEADERS__XSS_PROTECTION__VALUE=ENABLED_MODE_BLOCK`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a `.env` file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::validation_error(format!(
                "failed to load .env file: {e}"
            ))),
        }
    }

    /// Finalize, apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Environment variable parsing fails
    /// - Configuration validation fails
    pub fn load(mut self) -> Result<AegisConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> AegisConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<AegisConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        self.apply_env_vars(prefix, env::vars())
    }

    /// Applies every `PREFIX__...` pair; other variables are skipped.
    fn apply_env_vars<I>(&mut self, prefix: &str, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let separator = format!("{prefix}__");
        let overrides: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(k, _)| k.starts_with(&separator))
            .collect();

        for (key, value) in &overrides {
            self.apply_env_var(key, &key[separator.len()..], value)?;
        }

        Ok(())
    }

    fn apply_env_var(
        &mut self,
        key: &str,
        key_without_prefix: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let telemetry = &mut self.config.telemetry;
        let chain = &mut self.config.chain;

        match parts.as_slice() {
            // Telemetry
            ["TELEMETRY", "SERVICE_NAME"] => {
                telemetry.service_name = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                telemetry.logging.enabled = env_bool(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "LOGGING", "ANSI_ENABLED"] => {
                telemetry.logging.ansi_enabled = env_bool(key, value)?;
            }
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                telemetry.metrics.enabled = env_bool(key, value)?;
            }
            ["TELEMETRY", "METRICS", "ADDR"] => {
                telemetry.metrics.addr = value.to_string();
            }

            // CORS
            ["CHAIN", "CORS", "ENABLED"] => {
                chain.cors.get_or_insert_with(Default::default).enabled = env_bool(key, value)?;
            }
            ["CHAIN", "CORS", "REJECTION_STATUS"] => {
                chain.cors.get_or_insert_with(Default::default).rejection_status = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }
            ["CHAIN", "CORS", "ON_DISALLOWED_ORIGIN"] => {
                chain
                    .cors
                    .get_or_insert_with(Default::default)
                    .on_disallowed_origin = match value.to_lowercase().as_str() {
                    "reject" => DisallowedOriginPolicy::Reject,
                    "pass_without_headers" => DisallowedOriginPolicy::PassWithoutHeaders,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'reject' or 'pass_without_headers'",
                        ))
                    }
                };
            }

            // Header stages
            ["CHAIN", "HEADERS", "CONTENT_TYPE_OPTIONS", field] => {
                apply_header_override::<ContentTypeOptionsValue>(
                    &mut chain.headers.content_type_options,
                    field,
                    key,
                    value,
                )?;
            }
            ["CHAIN", "HEADERS", "FRAME_OPTIONS", field] => {
                apply_header_override::<FrameOptionsValue>(
                    &mut chain.headers.frame_options,
                    field,
                    key,
                    value,
                )?;
            }
            ["CHAIN", "HEADERS", "XSS_PROTECTION", field] => {
                apply_header_override::<XssProtectionValue>(
                    &mut chain.headers.xss_protection,
                    field,
                    key,
                    value,
                )?;
            }
            ["CHAIN", "HEADERS", "REFERRER_POLICY", field] => {
                apply_header_override::<ReferrerPolicyValue>(
                    &mut chain.headers.referrer_policy,
                    field,
                    key,
                    value,
                )?;
            }
            ["CHAIN", "HEADERS", "CONTENT_SECURITY_POLICY", field] => {
                let csp = chain
                    .headers
                    .content_security_policy
                    .get_or_insert_with(CspSettings::default);
                match *field {
                    "ENABLED" => csp.enabled = env_bool(key, value)?,
                    "POLICY_DIRECTIVES" => csp.policy_directives = Some(value.to_string()),
                    "REPORT_ONLY" => csp.report_only = env_bool(key, value)?,
                    _ => {}
                }
            }

            // Unknown PREFIX__ keys are ignored.
            _ => {}
        }

        Ok(())
    }
}

fn apply_header_override<V>(
    slot: &mut Option<HeaderSettings<V>>,
    field: &str,
    key: &str,
    value: &str,
) -> Result<(), ConfigError>
where
    V: FromStr<Err = ConfigurationError>,
{
    let settings = slot.get_or_insert_with(HeaderSettings::default);
    match field {
        "ENABLED" => settings.enabled = env_bool(key, value)?,
        "VALUE" => {
            settings.value = Some(
                value
                    .parse()
                    .map_err(|e: ConfigurationError| ConfigError::env_parse_error(key, e.to_string()))?,
            );
        }
        _ => {}
    }
    Ok(())
}

fn env_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn temp_file(suffix: &str) -> NamedTempFile {
        Builder::new().suffix(suffix).tempfile().unwrap()
    }

    fn apply_one(
        loader: &mut ConfigLoader,
        key: &str,
        value: &str,
        prefix: &str,
    ) -> Result<(), ConfigError> {
        loader.apply_env_vars(prefix, [(key.to_string(), value.to_string())])
    }

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, AegisConfig::default());
    }

    #[test]
    fn test_loader_with_development() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.telemetry.logging.level, "debug");
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.telemetry.logging.format, LogFormat::Json);
        assert!(config.telemetry.metrics.enabled);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"chain": {"headers": {"frame_options": {"value": "SAMEORIGIN"}}}}"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        let frame = config.chain.headers.frame_options.unwrap();
        assert_eq!(frame.value, Some(FrameOptionsValue::SameOrigin));
        // Sections the document names replace the defaults wholesale.
        assert!(config.chain.headers.xss_protection.is_none());
    }

    #[test]
    fn test_loader_unknown_format() {
        let result = ConfigLoader::new().with_string("", "yaml");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_loader_rejects_unknown_fields() {
        let toml = r#"
            [chain.cors]
            rejection_code = 401
        "#;
        let result = ConfigLoader::new().with_string(toml, "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_rejects_unknown_header_value() {
        let toml = r#"
            [chain.headers.xss_protection]
            value = "ALWAYS"
        "#;
        let err = ConfigLoader::new().with_string(toml, "toml").unwrap_err();
        assert!(err.to_string().contains("ALWAYS"));
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = temp_file(".toml");
        writeln!(
            file,
            r#"
            [chain.cors]
            on_disallowed_origin = "pass_without_headers"

            [[chain.cors.mappings]]
            pattern = "/api/**"
            allowed_origins = ["https://a.example"]
            "#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        let cors = config.chain.cors.unwrap();
        assert_eq!(cors.on_disallowed_origin, DisallowedOriginPolicy::PassWithoutHeaders);
        assert_eq!(cors.mappings[0].pattern, "/api/**");
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/aegis.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/aegis.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, AegisConfig::default());
    }

    #[test]
    fn test_loader_unsupported_extension() {
        let file = temp_file(".yaml");
        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_load_validates_chain() {
        let toml = r#"
            [chain.cors]
            rejection_status = 200
        "#;
        let loader = ConfigLoader::new().with_string(toml, "toml").unwrap();
        assert!(matches!(loader.load(), Err(ConfigError::Chain(_))));

        let loader = ConfigLoader::new().with_string(toml, "toml").unwrap();
        assert_eq!(loader.load_unvalidated().chain.cors.unwrap().rejection_status, 200);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    // Overrides are mostly exercised through apply_env_vars with explicit
    // pairs so tests never race on shared process environment.

    #[test]
    fn test_apply_env_var_telemetry() {
        let mut loader = ConfigLoader::new();
        apply_one(&mut loader, "TEST__TELEMETRY__LOGGING__LEVEL", "debug", "TEST")
            .unwrap();
        apply_one(&mut loader, "TEST__TELEMETRY__LOGGING__FORMAT", "pretty", "TEST")
            .unwrap();
        apply_one(&mut loader, "TEST__TELEMETRY__METRICS__ENABLED", "yes", "TEST")
            .unwrap();
        assert_eq!(loader.config.telemetry.logging.level, "debug");
        assert_eq!(loader.config.telemetry.logging.format, LogFormat::Pretty);
        assert!(loader.config.telemetry.metrics.enabled);
    }

    #[test]
    fn test_apply_env_var_cors_creates_section() {
        let mut loader = ConfigLoader::new();
        apply_one(&mut loader, "TEST__CHAIN__CORS__REJECTION_STATUS", "401", "TEST")
            .unwrap();
        let cors = loader.config.chain.cors.as_ref().unwrap();
        assert_eq!(cors.rejection_status, 401);
        assert!(cors.enabled);
    }

    #[test]
    fn test_apply_env_var_header_value() {
        let mut loader = ConfigLoader::new();
        apply_one(&mut loader, 
                "TEST__CHAIN__HEADERS__XSS_PROTECTION__VALUE",
                "enabled_mode_block",
                "TEST",
            )
            .unwrap();
        apply_one(&mut loader, "TEST__CHAIN__HEADERS__FRAME_OPTIONS__ENABLED", "false", "TEST")
            .unwrap();

        let headers = &loader.config.chain.headers;
        assert_eq!(
            headers.xss_protection.as_ref().unwrap().value,
            Some(XssProtectionValue::EnabledModeBlock)
        );
        assert!(!headers.frame_options.as_ref().unwrap().enabled);
    }

    #[test]
    fn test_apply_env_var_invalid_header_value() {
        let mut loader = ConfigLoader::new();
        let err = apply_one(&mut loader, "TEST__CHAIN__HEADERS__REFERRER_POLICY__VALUE", "sometimes", "TEST")
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { .. }));
    }

    #[test]
    fn test_apply_env_var_csp() {
        let mut loader = ConfigLoader::new();
        apply_one(&mut loader, 
                "TEST__CHAIN__HEADERS__CONTENT_SECURITY_POLICY__POLICY_DIRECTIVES",
                "default-src 'self'",
                "TEST",
            )
            .unwrap();
        let csp = loader.config.chain.headers.content_security_policy.as_ref().unwrap();
        assert_eq!(csp.policy_directives.as_deref(), Some("default-src 'self'"));
        assert!(loader.config.validate().is_ok());
    }

    #[test]
    fn test_apply_env_var_invalid_boolean() {
        let mut loader = ConfigLoader::new();
        let result = apply_one(&mut loader, "TEST__CHAIN__CORS__ENABLED", "sometimes", "TEST");
        assert!(result.is_err());
    }

    #[test]
    fn test_unrelated_prefixed_vars_are_skipped() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_vars(
                "AEGIS",
                [
                    ("AEGIS_HOME".to_string(), "/opt/aegis".to_string()),
                    ("AEGIS_LOG".to_string(), "verbose".to_string()),
                    ("AEGISX__CHAIN__CORS__ENABLED".to_string(), "sometimes".to_string()),
                    ("AEGIS__TELEMETRY__SERVICE_NAME".to_string(), "edge".to_string()),
                ],
            )
            .unwrap();

        assert_eq!(loader.config.telemetry.service_name, "edge");
        assert!(loader.config.chain.cors.is_none());
    }

    #[test]
    fn test_load_ignores_unrelated_process_env_var() {
        std::env::set_var("AEGISLOADERTEST_HOME", "/opt/aegis");
        std::env::set_var("AEGISLOADERTEST__TELEMETRY__SERVICE_NAME", "from-env");

        let config = ConfigLoader::new()
            .with_env_prefix("AEGISLOADERTEST")
            .load()
            .unwrap();

        std::env::remove_var("AEGISLOADERTEST_HOME");
        std::env::remove_var("AEGISLOADERTEST__TELEMETRY__SERVICE_NAME");
        assert_eq!(config.telemetry.service_name, "from-env");
    }
}
