//! Typed configuration for the Aegis security chain.
//!
//! Configuration is loaded in layers (defaults, then a TOML or JSON file,
//! then environment variables), validated strictly (unknown fields fail) and
//! turned into a [`Chain`](aegis_chain::Chain). A [`ChainReloader`] watches
//! the file and republishes the chain when it changes.
//!
//! # Example
//!
//! ```no_run
//! use aegis_config::ConfigLoader;
//!
//! # fn main() -> Result<(), aegis_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("aegis.toml")?
//!     .with_env_prefix("AEGIS")
//!     .load()?;
//!
//! aegis_telemetry::init_telemetry(&config.telemetry_config()).ok();
//! let chain = config.build_chain()?;
//! println!("stages: {:?}", chain.stage_names());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [telemetry]
//! service_name = "edge-gateway"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//!
//! [chain.cors]
//! rejection_status = 403
//! on_disallowed_origin = "reject"
//!
//! [[chain.cors.mappings]]
//! pattern = "/api/**"
//! allowed_origins = ["https://app.example.com"]
//! allowed_methods = ["GET", "POST"]
//! allow_credentials = true
//!
//! [chain.headers.content_type_options]
//!
//! [chain.headers.frame_options]
//! value = "SAMEORIGIN"
//!
//! [chain.headers.xss_protection]
//! value = "ENABLED_MODE_BLOCK"
//!
//! [chain.headers.referrer_policy]
//! value = "NO_REFERRER"
//! ```
//!
//! Omitting `[chain.headers]` entirely gives content-type-options,
//! frame-options and xss-protection at their default values. Once the section
//! is present only the listed headers are registered.
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `AEGIS__TELEMETRY__LOGGING__LEVEL=debug`
//! - `AEGIS__CHAIN__CORS__ENABLED=false`
//! - `AEGIS__CHAIN__HEADERS__XSS_PROTECTION__VALUE=DISABLED`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;
mod watcher;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use watcher::{ChainReloader, ConfigWatcher, FileChangeEvent, FileChangeKind};

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_chain::StageKind;

    const FULL_EXAMPLE: &str = r#"
        [telemetry]
        service_name = "edge-gateway"

        [telemetry.logging]
        level = "info"
        format = "json"

        [telemetry.metrics]
        enabled = true
        addr = "0.0.0.0:9090"

        [chain.cors]
        rejection_status = 403
        on_disallowed_origin = "reject"

        [[chain.cors.mappings]]
        pattern = "/api/**"
        allowed_origins = ["https://app.example.com"]
        allowed_methods = ["GET", "POST"]
        allow_credentials = true

        [chain.headers.content_type_options]

        [chain.headers.frame_options]
        value = "SAMEORIGIN"

        [chain.headers.xss_protection]
        value = "ENABLED_MODE_BLOCK"

        [chain.headers.referrer_policy]
        value = "NO_REFERRER"
    "#;

    #[test]
    fn test_documented_example_loads() {
        let config = ConfigLoader::new()
            .with_string(FULL_EXAMPLE, "toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.telemetry.service_name, "edge-gateway");
        assert!(config.telemetry.metrics.enabled);

        let chain = config.build_chain().unwrap();
        assert_eq!(
            chain.stage_kinds(),
            vec![
                StageKind::Cors,
                StageKind::ContentTypeOptions,
                StageKind::FrameOptions,
                StageKind::XssProtection,
                StageKind::ReferrerPolicy,
            ]
        );
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = ConfigLoader::new().with_string(
            r#"
            [chain.headers.xss_protection]
            value = "ENABLED"
            mode = "block"
            "#,
            "toml",
        );
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_builder_round_trips_through_json() {
        let config = AegisConfig::builder()
            .telemetry(TelemetrySettings {
                service_name: "json-service".to_string(),
                ..Default::default()
            })
            .build();

        let json = serde_json::to_string(&config).unwrap();
        let loaded = ConfigLoader::new()
            .with_string(&json, "json")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(loaded, config);
    }
}
