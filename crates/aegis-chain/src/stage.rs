//! The [`Stage`] trait and the stage priority table.
//!
//! Every stage kind has a fixed position in the chain, declared by
//! [`StageKind`]. Registration order never affects execution order:
//! rejection-capable stages always run before stages that only annotate
//! the response, so a rejected pre-flight never reaches header logic.
//!
//! # Example
//!
//! ```
//! use aegis_chain::{RequestHead, ResponseDraft, Stage, StageKind, StageOutcome};
//!
//! struct AlwaysContinue;
//!
//! impl Stage for AlwaysContinue {
//!     fn kind(&self) -> StageKind {
//!         StageKind::ReferrerPolicy
//!     }
//!
//!     fn apply(&self, _head: &RequestHead<'_>, _draft: &mut ResponseDraft) -> StageOutcome {
//!         StageOutcome::Continue
//!     }
//! }
//!
//! assert_eq!(AlwaysContinue.name(), "referrer_policy");
//! assert_eq!(AlwaysContinue.order(), 5);
//! ```

use crate::types::{RequestHead, ResponseDraft};
use aegis_core::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A type-erased stage that can be shared across requests.
pub type BoxedStage = Arc<dyn Stage>;

/// What the chain does after a stage has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageOutcome {
    /// Proceed to the next stage.
    Continue,
    /// Stop here; the draft is the final response.
    ShortCircuit,
}

impl StageOutcome {
    /// Returns true for [`StageOutcome::ShortCircuit`].
    #[must_use]
    pub const fn is_short_circuit(self) -> bool {
        matches!(self, Self::ShortCircuit)
    }
}

/// One unit of per-request security processing.
///
/// Stages are built once and shared by every request, so `apply` takes
/// `&self`. Anything mutable a stage needs per request lives in the
/// [`ResponseDraft`]; shared caches must synchronize internally.
///
/// `apply` is synchronous. Stages decide from the request head alone and
/// must not block.
pub trait Stage: Send + Sync + 'static {
    /// Returns the kind of this stage.
    fn kind(&self) -> StageKind;

    /// Returns the stage name used in logs and metrics.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Returns the chain position of this stage.
    fn order(&self) -> u8 {
        self.kind().order()
    }

    /// Returns true if this stage must never run.
    fn is_disabled(&self) -> bool {
        false
    }

    /// Processes one request.
    fn apply(&self, head: &RequestHead<'_>, draft: &mut ResponseDraft) -> StageOutcome;
}

/// The declared priority table of stage kinds.
///
/// The discriminant is the chain position. The derived `Ord` follows it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StageKind {
    /// Cross-origin resource sharing; may reject.
    Cors = 1,
    /// `X-Content-Type-Options`.
    ContentTypeOptions = 2,
    /// `X-Frame-Options`.
    FrameOptions = 3,
    /// `X-XSS-Protection`.
    XssProtection = 4,
    /// `Referrer-Policy`.
    ReferrerPolicy = 5,
    /// `Content-Security-Policy`.
    ContentSecurityPolicy = 6,
}

impl StageKind {
    /// Returns the chain position.
    #[must_use]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cors => "cors",
            Self::ContentTypeOptions => "content_type_options",
            Self::FrameOptions => "frame_options",
            Self::XssProtection => "xss_protection",
            Self::ReferrerPolicy => "referrer_policy",
            Self::ContentSecurityPolicy => "content_security_policy",
        }
    }

    /// Returns true if stages of this kind may short-circuit the chain.
    #[must_use]
    pub const fn is_rejection_capable(self) -> bool {
        matches!(self, Self::Cors)
    }

    /// Returns all kinds in chain order.
    #[must_use]
    pub const fn all() -> [StageKind; 6] {
        [
            Self::Cors,
            Self::ContentTypeOptions,
            Self::FrameOptions,
            Self::XssProtection,
            Self::ReferrerPolicy,
            Self::ContentSecurityPolicy,
        ]
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::all()
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| ConfigurationError::unrecognized_value("stage kind", s))
    }
}

/// The stage every disabled configuration builds to.
///
/// It never writes a header and never short-circuits, whatever payload the
/// configuration carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisabledStage {
    kind: StageKind,
}

impl DisabledStage {
    /// Creates a disabled stage of the given kind.
    #[must_use]
    pub const fn new(kind: StageKind) -> Self {
        Self { kind }
    }
}

impl Stage for DisabledStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn is_disabled(&self) -> bool {
        true
    }

    fn apply(&self, _head: &RequestHead<'_>, _draft: &mut ResponseDraft) -> StageOutcome {
        StageOutcome::Continue
    }
}
