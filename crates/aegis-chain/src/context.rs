//! Per-request chain state.
//!
//! A [`SecurityContext`] is created for each request and owned by the task
//! serving it. The [`Chain`](crate::Chain) itself is shared; only the
//! context moves through the state machine.
//!
//! ```text
//! Pending ──begin──▶ Running(0) ──Continue──▶ Running(1) ── … ──▶ Complete
//!                         │                                          ▲
//!                         └──────────────ShortCircuit────────────────┘
//! ```

use crate::stage::StageOutcome;
use aegis_core::RequestId;
use std::time::{Duration, Instant};

/// Position of one request in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChainState {
    /// No stage has run yet.
    #[default]
    Pending,
    /// The stage at this index is running.
    Running(usize),
    /// The chain is finished. No stage runs after this.
    Complete,
}

impl ChainState {
    /// Enters the chain. An empty chain completes immediately.
    ///
    /// Has no effect unless the state is `Pending`.
    #[must_use]
    pub const fn begin(self, len: usize) -> Self {
        match self {
            Self::Pending if len == 0 => Self::Complete,
            Self::Pending => Self::Running(0),
            other => other,
        }
    }

    /// Moves past the running stage according to its outcome.
    ///
    /// `Continue` from the last stage and any `ShortCircuit` complete the
    /// chain. `Pending` and `Complete` are left unchanged.
    #[must_use]
    pub const fn advance(self, outcome: StageOutcome, len: usize) -> Self {
        match (self, outcome) {
            (Self::Running(i), StageOutcome::Continue) if i + 1 < len => Self::Running(i + 1),
            (Self::Running(_), _) => Self::Complete,
            (other, _) => other,
        }
    }

    /// Returns the index of the running stage.
    #[must_use]
    pub const fn current_stage(self) -> Option<usize> {
        match self {
            Self::Running(i) => Some(i),
            _ => None,
        }
    }

    /// Returns true once the chain has finished.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// State carried by one request through the chain.
///
/// A context is single-use: once its state is `Complete`, executing a chain
/// with it again runs no stages.
///
/// # Example
///
/// ```
/// use aegis_chain::{ChainState, SecurityContext};
///
/// let ctx = SecurityContext::new();
/// assert_eq!(ctx.state(), ChainState::Pending);
/// ```
#[derive(Debug)]
pub struct SecurityContext {
    request_id: RequestId,
    started_at: Instant,
    state: ChainState,
}

impl SecurityContext {
    /// Creates a context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates a context with a specific request ID.
    ///
    /// Useful when an upstream proxy already assigned one.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            started_at: Instant::now(),
            state: ChainState::Pending,
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns when the context was created.
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the time elapsed since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns the chain state.
    #[must_use]
    pub const fn state(&self) -> ChainState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ChainState) {
        self.state = state;
    }
}

impl Default for SecurityContext {
    fn default() -> Self {
        Self::new()
    }
}
