//! Fixed response-header stages.
//!
//! Each header kind follows the same three-way contract:
//!
//! | Configuration        | Header written             |
//! |----------------------|----------------------------|
//! | disabled             | none                       |
//! | enabled, no value    | the kind's default literal |
//! | enabled, value `v`   | the literal of `v`         |
//!
//! "Enabled with the default" is not the same as "disabled". The
//! `X-XSS-Protection` default is `0`, which tells browsers to switch their
//! legacy filter off; disabling the stage omits the header entirely.
//!
//! Values come from closed sets and are parsed from their constant names
//! (`ENABLED_MODE_BLOCK`, `SAMEORIGIN`, ...). An unknown name fails when the
//! configuration is read, never while serving a request.

use crate::config::StagePayload;
use crate::stage::{Stage, StageKind, StageOutcome};
use crate::types::{RequestHead, ResponseDraft};
use aegis_core::{ConfigurationError, ConfigurationResult};
use http::header::{self, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A value that a header stage can render.
///
/// Implemented by every header value type. `KIND` ties the value to the
/// stage kind it configures.
pub trait HeaderDirective: Clone + fmt::Debug + Send + Sync + 'static {
    /// The stage kind this value configures.
    const KIND: StageKind;

    /// Name of the configuration field, for error messages.
    const FIELD: &'static str;

    /// The header this value is written under.
    fn header_name(&self) -> HeaderName;

    /// Renders the wire value.
    fn render(&self) -> ConfigurationResult<HeaderValue>;

    /// The value written when the stage is enabled without one.
    ///
    /// `None` means the kind has no default and an explicit value is required.
    fn default_value() -> Option<Self>;

    /// Wraps an optional value into the matching payload variant.
    fn into_payload(value: Option<Self>) -> StagePayload;
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_uppercase().replace('-', "_")
}

macro_rules! closed_header_value {
    (
        $(#[$meta:meta])*
        pub enum $name:ident as $field:literal {
            $( $(#[$vmeta:meta])* $variant:ident => ($constant:literal, $literal:literal), )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
        #[serde(try_from = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every value, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// Returns the configuration name of this value.
            #[must_use]
            pub const fn constant_name(self) -> &'static str {
                match self {
                    $(Self::$variant => $constant,)+
                }
            }

            /// Returns the literal written on the wire.
            #[must_use]
            pub const fn literal(self) -> &'static str {
                match self {
                    $(Self::$variant => $literal,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConfigurationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = normalize(s);
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.constant_name() == wanted)
                    .ok_or_else(|| ConfigurationError::unrecognized_value($field, s))
            }
        }

        impl TryFrom<String> for $name {
            type Error = ConfigurationError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.constant_name())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.constant_name())
            }
        }
    };
}

closed_header_value! {
    /// Values of the `X-XSS-Protection` header.
    pub enum XssProtectionValue as "xss_protection" {
        /// `0`: turn the browser's legacy XSS filter off.
        Disabled => ("DISABLED", "0"),
        /// `1`: enable the filter, sanitizing the page.
        Enabled => ("ENABLED", "1"),
        /// `1; mode=block`: enable the filter, blocking the page.
        EnabledModeBlock => ("ENABLED_MODE_BLOCK", "1; mode=block"),
    }
}

closed_header_value! {
    /// Values of the `X-Content-Type-Options` header.
    pub enum ContentTypeOptionsValue as "content_type_options" {
        /// `nosniff`: forbid MIME sniffing.
        Nosniff => ("NOSNIFF", "nosniff"),
    }
}

closed_header_value! {
    /// Values of the `X-Frame-Options` header.
    pub enum FrameOptionsValue as "frame_options" {
        /// The page cannot be framed.
        Deny => ("DENY", "DENY"),
        /// The page can only be framed by its own origin.
        SameOrigin => ("SAMEORIGIN", "SAMEORIGIN"),
    }
}

closed_header_value! {
    /// Values of the `Referrer-Policy` header.
    pub enum ReferrerPolicyValue as "referrer_policy" {
        /// `no-referrer`
        NoReferrer => ("NO_REFERRER", "no-referrer"),
        /// `no-referrer-when-downgrade`
        NoReferrerWhenDowngrade => ("NO_REFERRER_WHEN_DOWNGRADE", "no-referrer-when-downgrade"),
        /// `same-origin`
        SameOrigin => ("SAME_ORIGIN", "same-origin"),
        /// `origin`
        Origin => ("ORIGIN", "origin"),
        /// `strict-origin`
        StrictOrigin => ("STRICT_ORIGIN", "strict-origin"),
        /// `origin-when-cross-origin`
        OriginWhenCrossOrigin => ("ORIGIN_WHEN_CROSS_ORIGIN", "origin-when-cross-origin"),
        /// `strict-origin-when-cross-origin`
        StrictOriginWhenCrossOrigin => ("STRICT_ORIGIN_WHEN_CROSS_ORIGIN", "strict-origin-when-cross-origin"),
        /// `unsafe-url`
        UnsafeUrl => ("UNSAFE_URL", "unsafe-url"),
    }
}

impl Default for XssProtectionValue {
    fn default() -> Self {
        Self::Disabled
    }
}

impl Default for ContentTypeOptionsValue {
    fn default() -> Self {
        Self::Nosniff
    }
}

impl Default for FrameOptionsValue {
    fn default() -> Self {
        Self::Deny
    }
}

impl Default for ReferrerPolicyValue {
    fn default() -> Self {
        Self::NoReferrer
    }
}

impl HeaderDirective for XssProtectionValue {
    const KIND: StageKind = StageKind::XssProtection;
    const FIELD: &'static str = "header_value";

    fn header_name(&self) -> HeaderName {
        header::X_XSS_PROTECTION
    }

    fn render(&self) -> ConfigurationResult<HeaderValue> {
        Ok(HeaderValue::from_static(self.literal()))
    }

    fn default_value() -> Option<Self> {
        Some(Self::default())
    }

    fn into_payload(value: Option<Self>) -> StagePayload {
        StagePayload::XssProtection(value)
    }
}

impl HeaderDirective for ContentTypeOptionsValue {
    const KIND: StageKind = StageKind::ContentTypeOptions;
    const FIELD: &'static str = "header_value";

    fn header_name(&self) -> HeaderName {
        header::X_CONTENT_TYPE_OPTIONS
    }

    fn render(&self) -> ConfigurationResult<HeaderValue> {
        Ok(HeaderValue::from_static(self.literal()))
    }

    fn default_value() -> Option<Self> {
        Some(Self::default())
    }

    fn into_payload(value: Option<Self>) -> StagePayload {
        StagePayload::ContentTypeOptions(value)
    }
}

impl HeaderDirective for FrameOptionsValue {
    const KIND: StageKind = StageKind::FrameOptions;
    const FIELD: &'static str = "header_value";

    fn header_name(&self) -> HeaderName {
        header::X_FRAME_OPTIONS
    }

    fn render(&self) -> ConfigurationResult<HeaderValue> {
        Ok(HeaderValue::from_static(self.literal()))
    }

    fn default_value() -> Option<Self> {
        Some(Self::default())
    }

    fn into_payload(value: Option<Self>) -> StagePayload {
        StagePayload::FrameOptions(value)
    }
}

impl HeaderDirective for ReferrerPolicyValue {
    const KIND: StageKind = StageKind::ReferrerPolicy;
    const FIELD: &'static str = "header_value";

    fn header_name(&self) -> HeaderName {
        header::REFERRER_POLICY
    }

    fn render(&self) -> ConfigurationResult<HeaderValue> {
        Ok(HeaderValue::from_static(self.literal()))
    }

    fn default_value() -> Option<Self> {
        Some(Self::default())
    }

    fn into_payload(value: Option<Self>) -> StagePayload {
        StagePayload::ReferrerPolicy(value)
    }
}

/// A `Content-Security-Policy` value.
///
/// There is no sensible default policy, so an enabled stage without one is
/// a configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSecurityPolicyValue {
    /// The policy directives, e.g. `default-src 'self'`.
    pub directives: String,

    /// Write `Content-Security-Policy-Report-Only` instead.
    #[serde(default)]
    pub report_only: bool,
}

impl ContentSecurityPolicyValue {
    /// Creates an enforcing policy.
    pub fn new(directives: impl Into<String>) -> Self {
        Self {
            directives: directives.into(),
            report_only: false,
        }
    }

    /// Creates a report-only policy.
    pub fn report_only(directives: impl Into<String>) -> Self {
        Self {
            directives: directives.into(),
            report_only: true,
        }
    }
}

impl HeaderDirective for ContentSecurityPolicyValue {
    const KIND: StageKind = StageKind::ContentSecurityPolicy;
    const FIELD: &'static str = "policy_directives";

    fn header_name(&self) -> HeaderName {
        if self.report_only {
            header::CONTENT_SECURITY_POLICY_REPORT_ONLY
        } else {
            header::CONTENT_SECURITY_POLICY
        }
    }

    fn render(&self) -> ConfigurationResult<HeaderValue> {
        let directives = self.directives.trim();
        if directives.is_empty() {
            return Err(ConfigurationError::MissingPayload {
                stage: Self::KIND.name(),
                field: Self::FIELD,
            });
        }
        HeaderValue::from_str(directives).map_err(|e| {
            ConfigurationError::invalid_header_value(self.header_name().as_str(), e.to_string())
        })
    }

    fn default_value() -> Option<Self> {
        None
    }

    fn into_payload(value: Option<Self>) -> StagePayload {
        StagePayload::ContentSecurityPolicy(value)
    }
}

/// Writes one fixed header on every request.
///
/// The value is rendered when the stage is built, so `apply` cannot fail.
#[derive(Debug, Clone)]
pub struct HeaderWriterStage {
    kind: StageKind,
    name: HeaderName,
    value: HeaderValue,
}

impl HeaderWriterStage {
    /// Creates a stage writing `name: value`.
    #[must_use]
    pub const fn new(kind: StageKind, name: HeaderName, value: HeaderValue) -> Self {
        Self { kind, name, value }
    }

    /// Builds the stage for an optional value, falling back to the default.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::MissingPayload` if no value is given and
    /// the kind has no default, or `InvalidHeaderValue` if the value cannot
    /// be encoded.
    pub fn from_directive<V: HeaderDirective>(value: Option<V>) -> ConfigurationResult<Self> {
        let value = value
            .or_else(V::default_value)
            .ok_or(ConfigurationError::MissingPayload {
                stage: V::KIND.name(),
                field: V::FIELD,
            })?;
        Ok(Self::new(V::KIND, value.header_name(), value.render()?))
    }

    /// Returns the header name.
    #[must_use]
    pub const fn header_name(&self) -> &HeaderName {
        &self.name
    }

    /// Returns the header value.
    #[must_use]
    pub const fn header_value(&self) -> &HeaderValue {
        &self.value
    }
}

impl Stage for HeaderWriterStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn apply(&self, _head: &RequestHead<'_>, draft: &mut ResponseDraft) -> StageOutcome {
        draft.insert_header(self.name.clone(), self.value.clone());
        StageOutcome::Continue
    }
}
