//! Build-time stage configuration.
//!
//! A [`StageConfig`] is a kind, an enabled flag and an optional payload.
//! [`StageConfig::build`] turns it into a stage without side effects: the
//! same configuration always builds an equivalent stage.
//!
//! The spec types ([`CorsSpec`], [`HeaderSpec`]) are the typed surface used
//! by [`ChainBuilder`](crate::ChainBuilder) callbacks. Each exposes its
//! kind's fields plus `disable()` and converts into a `StageConfig`.
//!
//! # Example
//!
//! ```
//! use aegis_chain::{StageConfig, StageKind, XssProtectionValue};
//!
//! let mut config = StageConfig::new(StageKind::XssProtection);
//! config.set_payload(XssProtectionValue::Enabled).unwrap();
//! config.disable();
//!
//! let stage = config.build().unwrap();
//! assert!(stage.is_disabled());
//! ```

use crate::stage::{BoxedStage, DisabledStage, StageKind};
use crate::stages::cors::{CorsConfigurationSource, CorsPayload, CorsRejectionPolicy, CorsStage};
use crate::stages::headers::{
    ContentSecurityPolicyValue, ContentTypeOptionsValue, FrameOptionsValue, HeaderDirective,
    HeaderWriterStage, ReferrerPolicyValue, XssProtectionValue,
};
use aegis_core::{ConfigurationError, ConfigurationResult};
use std::fmt;
use std::sync::Arc;

/// Kind-specific payload. `None` selects the kind's built-in default.
#[derive(Debug, Clone)]
pub enum StagePayload {
    /// CORS source and rejection policy.
    Cors(Option<CorsPayload>),
    /// `X-Content-Type-Options` value.
    ContentTypeOptions(Option<ContentTypeOptionsValue>),
    /// `X-Frame-Options` value.
    FrameOptions(Option<FrameOptionsValue>),
    /// `X-XSS-Protection` value.
    XssProtection(Option<XssProtectionValue>),
    /// `Referrer-Policy` value.
    ReferrerPolicy(Option<ReferrerPolicyValue>),
    /// `Content-Security-Policy` value. Has no default.
    ContentSecurityPolicy(Option<ContentSecurityPolicyValue>),
}

impl StagePayload {
    /// An unset payload of the given kind.
    #[must_use]
    pub const fn empty(kind: StageKind) -> Self {
        match kind {
            StageKind::Cors => Self::Cors(None),
            StageKind::ContentTypeOptions => Self::ContentTypeOptions(None),
            StageKind::FrameOptions => Self::FrameOptions(None),
            StageKind::XssProtection => Self::XssProtection(None),
            StageKind::ReferrerPolicy => Self::ReferrerPolicy(None),
            StageKind::ContentSecurityPolicy => Self::ContentSecurityPolicy(None),
        }
    }

    /// Returns the stage kind this payload configures.
    #[must_use]
    pub const fn kind(&self) -> StageKind {
        match self {
            Self::Cors(_) => StageKind::Cors,
            Self::ContentTypeOptions(_) => StageKind::ContentTypeOptions,
            Self::FrameOptions(_) => StageKind::FrameOptions,
            Self::XssProtection(_) => StageKind::XssProtection,
            Self::ReferrerPolicy(_) => StageKind::ReferrerPolicy,
            Self::ContentSecurityPolicy(_) => StageKind::ContentSecurityPolicy,
        }
    }

    /// Returns true if an explicit value is set.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        match self {
            Self::Cors(p) => p.is_some(),
            Self::ContentTypeOptions(v) => v.is_some(),
            Self::FrameOptions(v) => v.is_some(),
            Self::XssProtection(v) => v.is_some(),
            Self::ReferrerPolicy(v) => v.is_some(),
            Self::ContentSecurityPolicy(v) => v.is_some(),
        }
    }
}

impl From<CorsPayload> for StagePayload {
    fn from(payload: CorsPayload) -> Self {
        Self::Cors(Some(payload))
    }
}

macro_rules! header_payload_from {
    ($($value:ty),+ $(,)?) => {
        $(
            impl From<$value> for StagePayload {
                fn from(value: $value) -> Self {
                    <$value as HeaderDirective>::into_payload(Some(value))
                }
            }
        )+
    };
}

header_payload_from!(
    ContentTypeOptionsValue,
    FrameOptionsValue,
    XssProtectionValue,
    ReferrerPolicyValue,
    ContentSecurityPolicyValue,
);

/// Configuration of one stage.
#[derive(Debug, Clone)]
pub struct StageConfig {
    enabled: bool,
    payload: StagePayload,
}

impl StageConfig {
    /// An enabled configuration with no explicit payload.
    #[must_use]
    pub const fn new(kind: StageKind) -> Self {
        Self {
            enabled: true,
            payload: StagePayload::empty(kind),
        }
    }

    /// An enabled configuration carrying `payload`.
    pub fn from_payload(payload: impl Into<StagePayload>) -> Self {
        Self {
            enabled: true,
            payload: payload.into(),
        }
    }

    /// Returns the stage kind.
    #[must_use]
    pub const fn kind(&self) -> StageKind {
        self.payload.kind()
    }

    /// Returns true unless [`disable`](Self::disable) was called.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &StagePayload {
        &self.payload
    }

    /// Disables the stage. Calling it again has no further effect.
    pub fn disable(&mut self) -> &mut Self {
        self.enabled = false;
        self
    }

    /// Replaces the payload.
    ///
    /// Allowed after [`disable`](Self::disable), though a disabled stage
    /// never runs whatever its payload.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::PayloadMismatch` if the payload belongs
    /// to another kind; the configuration is left unchanged.
    pub fn set_payload(
        &mut self,
        payload: impl Into<StagePayload>,
    ) -> ConfigurationResult<&mut Self> {
        let payload = payload.into();
        if payload.kind() != self.kind() {
            return Err(ConfigurationError::PayloadMismatch {
                stage: self.kind().name(),
                payload: payload.kind().name(),
            });
        }
        self.payload = payload;
        Ok(self)
    }

    /// Builds the stage.
    ///
    /// A disabled configuration always builds a [`DisabledStage`].
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if the stage is enabled and its payload
    /// is missing without a default, or is invalid.
    pub fn build(&self) -> ConfigurationResult<BoxedStage> {
        if !self.enabled {
            return Ok(Arc::new(DisabledStage::new(self.kind())));
        }

        let stage: BoxedStage = match &self.payload {
            StagePayload::Cors(payload) => {
                Arc::new(CorsStage::new(payload.clone().unwrap_or_default())?)
            }
            StagePayload::ContentTypeOptions(value) => {
                Arc::new(HeaderWriterStage::from_directive(*value)?)
            }
            StagePayload::FrameOptions(value) => {
                Arc::new(HeaderWriterStage::from_directive(*value)?)
            }
            StagePayload::XssProtection(value) => {
                Arc::new(HeaderWriterStage::from_directive(*value)?)
            }
            StagePayload::ReferrerPolicy(value) => {
                Arc::new(HeaderWriterStage::from_directive(*value)?)
            }
            StagePayload::ContentSecurityPolicy(value) => {
                Arc::new(HeaderWriterStage::from_directive(value.clone())?)
            }
        };
        Ok(stage)
    }
}

/// Typed configuration surface for the CORS stage.
///
/// # Example
///
/// ```
/// use aegis_chain::{
///     ChainBuilder, CorsConfiguration, UrlBasedCorsConfigurationSource,
/// };
/// use std::sync::Arc;
///
/// let mut source = UrlBasedCorsConfigurationSource::new();
/// source
///     .register("/api/**", CorsConfiguration::builder().allow_origin("https://a.example"))
///     .unwrap();
///
/// let chain = ChainBuilder::new()
///     .cors(|cors| cors.configuration_source = Some(Arc::new(source)))
///     .build()
///     .unwrap();
/// assert_eq!(chain.stage_names(), vec!["cors"]);
/// ```
#[derive(Clone, Default)]
pub struct CorsSpec {
    /// Resolver for per-path configurations. `None` denies cross-origin requests.
    pub configuration_source: Option<Arc<dyn CorsConfigurationSource>>,
    /// Rejection behaviour.
    pub rejection_policy: CorsRejectionPolicy,
    disabled: bool,
}

impl CorsSpec {
    /// Creates a spec with no source and the default rejection policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables CORS processing entirely.
    pub fn disable(&mut self) -> &mut Self {
        self.disabled = true;
        self
    }

    /// Returns true if [`disable`](Self::disable) was called.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.disabled
    }
}

impl fmt::Debug for CorsSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorsSpec")
            .field(
                "configuration_source",
                &self.configuration_source.as_ref().map(|_| "<source>"),
            )
            .field("rejection_policy", &self.rejection_policy)
            .field("disabled", &self.disabled)
            .finish()
    }
}

impl From<CorsSpec> for StageConfig {
    fn from(spec: CorsSpec) -> Self {
        Self {
            enabled: !spec.disabled,
            payload: StagePayload::Cors(Some(CorsPayload {
                source: spec.configuration_source,
                rejection_policy: spec.rejection_policy,
            })),
        }
    }
}

/// Typed configuration surface for a header stage.
#[derive(Debug, Clone)]
pub struct HeaderSpec<V> {
    /// Explicit header value. `None` writes the default.
    pub header_value: Option<V>,
    disabled: bool,
}

impl<V> Default for HeaderSpec<V> {
    fn default() -> Self {
        Self {
            header_value: None,
            disabled: false,
        }
    }
}

impl<V: HeaderDirective> HeaderSpec<V> {
    /// Creates a spec that writes the default value.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a spec with an explicit value.
    #[must_use]
    pub fn with_value(value: V) -> Self {
        Self {
            header_value: Some(value),
            disabled: false,
        }
    }

    /// Disables the header. Nothing is written, not even the default.
    pub fn disable(&mut self) -> &mut Self {
        self.disabled = true;
        self
    }

    /// Returns true if [`disable`](Self::disable) was called.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.disabled
    }
}

impl<V: HeaderDirective> From<HeaderSpec<V>> for StageConfig {
    fn from(spec: HeaderSpec<V>) -> Self {
        Self {
            enabled: !spec.disabled,
            payload: V::into_payload(spec.header_value),
        }
    }
}

/// Configures `X-XSS-Protection`.
pub type XssProtectionSpec = HeaderSpec<XssProtectionValue>;
/// Configures `X-Content-Type-Options`.
pub type ContentTypeOptionsSpec = HeaderSpec<ContentTypeOptionsValue>;
/// Configures `X-Frame-Options`.
pub type FrameOptionsSpec = HeaderSpec<FrameOptionsValue>;
/// Configures `Referrer-Policy`.
pub type ReferrerPolicySpec = HeaderSpec<ReferrerPolicyValue>;
/// Configures `Content-Security-Policy`.
pub type ContentSecurityPolicySpec = HeaderSpec<ContentSecurityPolicyValue>;
