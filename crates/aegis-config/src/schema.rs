//! Configuration schema types.
//!
//! This module defines the structure of every configuration section. All
//! sections reject unknown fields and fall back to defaults for missing ones.

use aegis_chain::{
    Chain, ChainBuilder, ContentSecurityPolicySpec, ContentSecurityPolicyValue,
    ContentTypeOptionsValue, CorsConfiguration, CorsConfigurationBuilder, CorsRejectionPolicy,
    CorsSpec, DisallowedOriginPolicy, FrameOptionsValue, HeaderDirective, HeaderSpec,
    ReferrerPolicyValue, StageConfig, UrlBasedCorsConfigurationSource, XssProtectionValue,
};
use aegis_core::{ConfigurationError, ConfigurationResult};
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

fn default_true() -> bool {
    true
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log filter directive (e.g., "info", "aegis_chain=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in output.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    /// Install the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus scrape endpoint address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySettings {
    /// Service name attached to log records.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

fn default_service_name() -> String {
    "aegis".to_string()
}

/// One path pattern and the CORS rules applied under it.
///
/// ```toml
/// [[chain.cors.mappings]]
/// pattern = "/api/**"
/// allowed_origins = ["https://a.example"]
/// allowed_methods = ["GET", "POST"]
/// allowed_headers = ["content-type"]
/// allow_credentials = true
/// max_age_secs = 600
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct CorsMapping {
    /// Path pattern, e.g. `/api/**`.
    pub pattern: String,

    /// Allowed origins; `"*"` allows any.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Allowed methods. Missing means GET, HEAD, POST, PUT, DELETE and PATCH.
    #[serde(default)]
    pub allowed_methods: Option<Vec<String>>,

    /// Allowed request headers; `"*"` allows any.
    #[serde(default)]
    pub allowed_headers: Vec<String>,

    /// Response headers exposed to scripts.
    #[serde(default)]
    pub exposed_headers: Vec<String>,

    /// Allow credentialed requests.
    #[serde(default)]
    pub allow_credentials: bool,

    /// Pre-flight cache lifetime. Missing means one day.
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl CorsMapping {
    fn builder(&self) -> ConfigurationResult<CorsConfigurationBuilder> {
        let mut builder = CorsConfiguration::builder()
            .allow_origins(self.allowed_origins.iter().cloned())
            .allow_headers(self.allowed_headers.iter().cloned())
            .expose_headers(self.exposed_headers.iter().cloned())
            .allow_credentials(self.allow_credentials);

        if let Some(methods) = &self.allowed_methods {
            let methods = methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                        .map_err(|_| ConfigurationError::unrecognized_value("allowed_methods", m))
                })
                .collect::<ConfigurationResult<Vec<_>>>()?;
            builder = builder.allow_methods(methods);
        }
        if let Some(secs) = self.max_age_secs {
            builder = builder.max_age(Duration::from_secs(secs));
        }
        Ok(builder)
    }
}

/// CORS stage configuration.
///
/// Without mappings there is no configuration source and every cross-origin
/// request is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CorsSettings {
    /// Run the CORS stage.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Status of rejection responses (4xx or 5xx).
    #[serde(default = "default_rejection_status")]
    pub rejection_status: u16,

    /// Handling of actual requests from disallowed origins.
    #[serde(default)]
    pub on_disallowed_origin: DisallowedOriginPolicy,

    /// Path mappings, first match wins.
    #[serde(default)]
    pub mappings: Vec<CorsMapping>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rejection_status: default_rejection_status(),
            on_disallowed_origin: DisallowedOriginPolicy::default(),
            mappings: Vec::new(),
        }
    }
}

fn default_rejection_status() -> u16 {
    403
}

impl CorsSettings {
    /// Builds the rejection policy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRejectionStatus` unless the status is 4xx or 5xx.
    pub fn rejection_policy(&self) -> ConfigurationResult<CorsRejectionPolicy> {
        let invalid = || ConfigurationError::InvalidRejectionStatus {
            status: self.rejection_status,
        };
        let status = StatusCode::from_u16(self.rejection_status).map_err(|_| invalid())?;
        let policy = CorsRejectionPolicy {
            rejection_status: status,
            on_disallowed_origin: self.on_disallowed_origin,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Builds the URL-based source, or `None` without mappings.
    ///
    /// # Errors
    ///
    /// Returns the first invalid pattern or CORS configuration.
    pub fn source(&self) -> ConfigurationResult<Option<UrlBasedCorsConfigurationSource>> {
        if self.mappings.is_empty() {
            return Ok(None);
        }
        let mut source = UrlBasedCorsConfigurationSource::new();
        for mapping in &self.mappings {
            source.register(&mapping.pattern, mapping.builder()?)?;
        }
        Ok(Some(source))
    }

    /// Converts the settings into the stage's typed spec.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` for an invalid mapping or status.
    pub fn to_spec(&self) -> ConfigurationResult<CorsSpec> {
        let mut spec = CorsSpec::new();
        spec.rejection_policy = self.rejection_policy()?;
        if let Some(source) = self.source()? {
            spec.configuration_source = Some(Arc::new(source));
        }
        if !self.enabled {
            spec.disable();
        }
        Ok(spec)
    }
}

/// Settings for one fixed-value header stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HeaderSettings<V> {
    /// Write the header at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Header value by constant name, e.g. `"ENABLED_MODE_BLOCK"`. Missing
    /// means the default value.
    #[serde(default)]
    pub value: Option<V>,
}

impl<V> Default for HeaderSettings<V> {
    fn default() -> Self {
        Self {
            enabled: true,
            value: None,
        }
    }
}

impl<V: HeaderDirective> HeaderSettings<V> {
    /// Converts the settings into a stage configuration.
    pub fn to_stage_config(&self) -> StageConfig {
        let mut spec = HeaderSpec::<V>::new();
        spec.header_value = self.value.clone();
        if !self.enabled {
            spec.disable();
        }
        spec.into()
    }
}

/// Content-Security-Policy settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CspSettings {
    /// Write the header.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Policy directives. Required when enabled.
    #[serde(default)]
    pub policy_directives: Option<String>,

    /// Write `Content-Security-Policy-Report-Only` instead.
    #[serde(default)]
    pub report_only: bool,
}

impl Default for CspSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            policy_directives: None,
            report_only: false,
        }
    }
}

impl CspSettings {
    /// Converts the settings into a stage configuration.
    pub fn to_stage_config(&self) -> StageConfig {
        let mut spec = ContentSecurityPolicySpec::new();
        spec.header_value = self
            .policy_directives
            .as_ref()
            .map(|directives| ContentSecurityPolicyValue {
                directives: directives.clone(),
                report_only: self.report_only,
            });
        if !self.enabled {
            spec.disable();
        }
        spec.into()
    }
}

/// Header stage settings. A missing section registers no stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HeadersSettings {
    /// `X-Content-Type-Options`.
    #[serde(default)]
    pub content_type_options: Option<HeaderSettings<ContentTypeOptionsValue>>,

    /// `X-Frame-Options`.
    #[serde(default)]
    pub frame_options: Option<HeaderSettings<FrameOptionsValue>>,

    /// `X-XSS-Protection`.
    #[serde(default)]
    pub xss_protection: Option<HeaderSettings<XssProtectionValue>>,

    /// `Referrer-Policy`.
    #[serde(default)]
    pub referrer_policy: Option<HeaderSettings<ReferrerPolicyValue>>,

    /// `Content-Security-Policy`.
    #[serde(default)]
    pub content_security_policy: Option<CspSettings>,
}

impl Default for HeadersSettings {
    /// Content-type-options, frame-options and xss-protection at their defaults.
    fn default() -> Self {
        Self {
            content_type_options: Some(HeaderSettings::default()),
            frame_options: Some(HeaderSettings::default()),
            xss_protection: Some(HeaderSettings::default()),
            referrer_policy: None,
            content_security_policy: None,
        }
    }
}

impl HeadersSettings {
    /// Returns the stage configurations of every configured header.
    pub fn stage_configs(&self) -> Vec<StageConfig> {
        let mut configs = Vec::new();
        if let Some(settings) = &self.content_type_options {
            configs.push(settings.to_stage_config());
        }
        if let Some(settings) = &self.frame_options {
            configs.push(settings.to_stage_config());
        }
        if let Some(settings) = &self.xss_protection {
            configs.push(settings.to_stage_config());
        }
        if let Some(settings) = &self.referrer_policy {
            configs.push(settings.to_stage_config());
        }
        if let Some(settings) = &self.content_security_policy {
            configs.push(settings.to_stage_config());
        }
        configs
    }
}

/// Security chain configuration section.
///
/// ```toml
/// [chain.cors]
/// rejection_status = 403
/// on_disallowed_origin = "reject"
///
/// [[chain.cors.mappings]]
/// pattern = "/api/**"
/// allowed_origins = ["https://a.example"]
///
/// [chain.headers.xss_protection]
/// value = "ENABLED_MODE_BLOCK"
///
/// [chain.headers.frame_options]
/// enabled = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ChainSettings {
    /// CORS stage. Missing registers no CORS stage.
    #[serde(default)]
    pub cors: Option<CorsSettings>,

    /// Header stages.
    #[serde(default)]
    pub headers: HeadersSettings,
}

impl ChainSettings {
    /// Returns the stage configuration of every configured stage.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` for invalid CORS settings.
    pub fn stage_configs(&self) -> ConfigurationResult<Vec<StageConfig>> {
        let mut configs = Vec::new();
        if let Some(cors) = &self.cors {
            configs.push(cors.to_spec()?.into());
        }
        configs.extend(self.headers.stage_configs());
        Ok(configs)
    }

    /// Returns a builder holding every configured stage.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` for invalid CORS settings.
    pub fn chain_builder(&self) -> ConfigurationResult<ChainBuilder> {
        Ok(self
            .stage_configs()?
            .into_iter()
            .fold(ChainBuilder::new(), |builder, config| builder.register(config)))
    }

    /// Builds the security chain.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigurationError` raised while building stages.
    pub fn build_chain(&self) -> ConfigurationResult<Chain> {
        self.chain_builder()?.build()
    }
}
