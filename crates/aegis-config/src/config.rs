//! Root configuration type.
//!
//! This module provides the top-level [`AegisConfig`] struct and its builder.

use aegis_chain::Chain;
use aegis_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};

use crate::{ChainSettings, ConfigError, LogFormat, TelemetrySettings};

/// Complete Aegis configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use aegis_config::AegisConfig;
///
/// let config = AegisConfig::default();
/// let chain = config.build_chain().unwrap();
/// assert_eq!(
///     chain.stage_names(),
///     vec!["content_type_options", "frame_options", "xss_protection"]
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct AegisConfig {
    /// Telemetry configuration (logging, metrics).
    #[serde(default)]
    pub telemetry: TelemetrySettings,

    /// Security chain configuration.
    #[serde(default)]
    pub chain: ChainSettings,
}

impl AegisConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> AegisConfigBuilder {
        AegisConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// Every configured stage is built once and discarded, so a configuration
    /// that validates also builds.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The log level is empty
    /// - The metrics address is invalid while metrics are enabled
    /// - A stage configuration fails to build
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "telemetry.logging.level",
                "must not be empty",
            ));
        }

        if self.telemetry.metrics.enabled
            && self
                .telemetry
                .metrics
                .addr
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.addr",
                format!("invalid socket address: {}", self.telemetry.metrics.addr),
            ));
        }

        for config in self.chain.stage_configs()? {
            config.build()?;
        }

        Ok(())
    }

    /// Create a development configuration preset: pretty, colored debug logs.
    ///
    /// # Example
    ///
    /// ```
    /// use aegis_config::AegisConfig;
    ///
    /// let config = AegisConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.ansi_enabled = true;
        config.telemetry.logging.include_location = true;

        config
    }

    /// Create a production configuration preset: JSON logs and metrics.
    ///
    /// # Example
    ///
    /// ```
    /// use aegis_config::{AegisConfig, LogFormat};
    ///
    /// let config = AegisConfig::production();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Json);
    /// assert!(config.telemetry.metrics.enabled);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.metrics.enabled = true;
        config
    }

    /// Converts the telemetry section for [`aegis_telemetry::init_telemetry`].
    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let settings = &self.telemetry;
        TelemetryConfig::builder()
            .service_name(&settings.service_name)
            .logging(LogConfig {
                enabled: settings.logging.enabled,
                level: settings.logging.level.clone(),
                json_format: settings.logging.format == LogFormat::Json,
                ansi: settings.logging.ansi_enabled,
                file_line_info: settings.logging.include_location,
                service_name: settings.service_name.clone(),
                ..LogConfig::default()
            })
            .metrics(MetricsConfig {
                enabled: settings.metrics.enabled,
                addr: settings.metrics.addr.clone(),
            })
            .build()
    }

    /// Builds the security chain.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Chain` if a stage fails to build.
    pub fn build_chain(&self) -> Result<Chain, ConfigError> {
        Ok(self.chain.build_chain()?)
    }
}

/// Builder for [`AegisConfig`].
#[derive(Debug, Default)]
pub struct AegisConfigBuilder {
    telemetry: Option<TelemetrySettings>,
    chain: Option<ChainSettings>,
}

impl AegisConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetrySettings) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Set the chain configuration.
    #[must_use]
    pub fn chain(mut self, chain: ChainSettings) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> AegisConfig {
        AegisConfig {
            telemetry: self.telemetry.unwrap_or_default(),
            chain: self.chain.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CorsMapping, CorsSettings, CspSettings, HeadersSettings};

    #[test]
    fn test_default_config_validates() {
        let config = AegisConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.chain.cors.is_none());
    }

    #[test]
    fn test_production_differs_from_default_only_in_metrics() {
        let mut config = AegisConfig::production();
        assert!(config.telemetry.metrics.enabled);
        assert_eq!(config.telemetry.logging.format, LogFormat::Json);

        config.telemetry.metrics.enabled = false;
        assert_eq!(config, AegisConfig::default());
    }

    #[test]
    fn test_invalid_metrics_addr() {
        let mut config = AegisConfig::production();
        config.telemetry.metrics.addr = "not-an-address".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(err.to_string().contains("telemetry.metrics.addr"));
    }

    #[test]
    fn test_metrics_addr_ignored_when_disabled() {
        let mut config = AegisConfig::default();
        config.telemetry.metrics.addr = "not-an-address".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chain_errors_surface_in_validate() {
        let config = AegisConfig::builder()
            .chain(ChainSettings {
                headers: HeadersSettings {
                    content_security_policy: Some(CspSettings::default()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .build();

        assert!(matches!(config.validate(), Err(ConfigError::Chain(_))));
    }

    #[test]
    fn test_builder_chain_section() {
        let config = AegisConfig::builder()
            .chain(ChainSettings {
                cors: Some(CorsSettings {
                    mappings: vec![CorsMapping {
                        pattern: "/api/**".to_string(),
                        allowed_origins: vec!["https://a.example".to_string()],
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
                ..Default::default()
            })
            .build();

        let chain = config.build_chain().unwrap();
        assert_eq!(chain.stage_names()[0], "cors");
        assert_eq!(chain.stage_count(), 4);
    }

    #[test]
    fn test_telemetry_config_conversion() {
        let telemetry = AegisConfig::development().telemetry_config();
        assert!(!telemetry.logging.json_format);
        assert!(telemetry.logging.ansi);
        assert!(telemetry.logging.file_line_info);
        assert_eq!(telemetry.logging.level, "debug");
        assert_eq!(telemetry.service_name, "aegis");
        assert!(!telemetry.metrics.enabled);
    }
}
