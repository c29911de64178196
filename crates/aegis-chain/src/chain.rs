//! Chain assembly and per-request execution.
//!
//! [`ChainBuilder`] collects one [`StageConfig`] per kind and freezes them
//! into a [`Chain`] ordered by [`StageKind`] priority. A `Chain` is immutable;
//! reconfiguration builds a new one and publishes it through a
//! [`ChainHandle`].

use crate::config::{
    ContentSecurityPolicySpec, ContentTypeOptionsSpec, CorsSpec, FrameOptionsSpec,
    ReferrerPolicySpec, StageConfig, XssProtectionSpec,
};
use crate::context::SecurityContext;
use crate::stage::{BoxedStage, StageKind, StageOutcome};
use crate::types::{RequestHead, Response, ResponseDraft};
use aegis_core::ConfigurationResult;
use aegis_telemetry::metrics::{
    record_chain_duration, record_chain_outcome, record_stage_short_circuit,
};
use arc_swap::ArcSwap;
use http::StatusCode;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// A boxed future returned by request handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Builder for a [`Chain`].
///
/// # Example
///
/// ```
/// use aegis_chain::{ChainBuilder, StageKind, XssProtectionValue};
///
/// let chain = ChainBuilder::new()
///     .xss_protection(|xss| xss.header_value = Some(XssProtectionValue::Enabled))
///     .register_with(StageKind::FrameOptions, |config| {
///         config.disable();
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(chain.stage_names(), vec!["frame_options", "xss_protection"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChainBuilder {
    configs: BTreeMap<StageKind, StageConfig>,
}

impl ChainBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder with the content-type-options, frame-options and
    /// xss-protection stages at their defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new()
            .register(StageConfig::new(StageKind::ContentTypeOptions))
            .register(StageConfig::new(StageKind::FrameOptions))
            .register(StageConfig::new(StageKind::XssProtection))
    }

    /// Registers a stage configuration. A later registration of the same kind
    /// replaces the earlier one.
    #[must_use]
    pub fn register(mut self, config: impl Into<StageConfig>) -> Self {
        let config = config.into();
        let kind = config.kind();
        if self.configs.insert(kind, config).is_some() {
            warn!(
                stage = kind.name(),
                "stage registered more than once; keeping the last registration"
            );
        }
        self
    }

    /// Registers a fresh configuration of `kind` after passing it to `configure`.
    #[must_use]
    pub fn register_with<F>(self, kind: StageKind, configure: F) -> Self
    where
        F: FnOnce(&mut StageConfig),
    {
        let mut config = StageConfig::new(kind);
        configure(&mut config);
        self.register(config)
    }

    /// Configures the CORS stage.
    #[must_use]
    pub fn cors<F: FnOnce(&mut CorsSpec)>(self, configure: F) -> Self {
        let mut spec = CorsSpec::default();
        configure(&mut spec);
        self.register(spec)
    }

    /// Configures the `X-Content-Type-Options` stage.
    #[must_use]
    pub fn content_type_options<F: FnOnce(&mut ContentTypeOptionsSpec)>(
        self,
        configure: F,
    ) -> Self {
        let mut spec = ContentTypeOptionsSpec::default();
        configure(&mut spec);
        self.register(spec)
    }

    /// Configures the `X-Frame-Options` stage.
    #[must_use]
    pub fn frame_options<F: FnOnce(&mut FrameOptionsSpec)>(self, configure: F) -> Self {
        let mut spec = FrameOptionsSpec::default();
        configure(&mut spec);
        self.register(spec)
    }

    /// Configures the `X-XSS-Protection` stage.
    #[must_use]
    pub fn xss_protection<F: FnOnce(&mut XssProtectionSpec)>(self, configure: F) -> Self {
        let mut spec = XssProtectionSpec::default();
        configure(&mut spec);
        self.register(spec)
    }

    /// Configures the `Referrer-Policy` stage.
    #[must_use]
    pub fn referrer_policy<F: FnOnce(&mut ReferrerPolicySpec)>(self, configure: F) -> Self {
        let mut spec = ReferrerPolicySpec::default();
        configure(&mut spec);
        self.register(spec)
    }

    /// Configures the `Content-Security-Policy` stage.
    #[must_use]
    pub fn content_security_policy<F: FnOnce(&mut ContentSecurityPolicySpec)>(
        self,
        configure: F,
    ) -> Self {
        let mut spec = ContentSecurityPolicySpec::default();
        configure(&mut spec);
        self.register(spec)
    }

    /// Returns the registered configurations in chain order.
    pub fn configs(&self) -> impl Iterator<Item = &StageConfig> {
        self.configs.values()
    }

    /// Builds every registered stage and freezes the chain.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigurationError` raised by a stage build.
    pub fn build(&self) -> ConfigurationResult<Chain> {
        let stages = self
            .configs
            .values()
            .map(StageConfig::build)
            .collect::<ConfigurationResult<Vec<_>>>()?;
        let chain = Chain { stages };

        info!(
            stages = ?chain.stage_names(),
            disabled = chain.stages.iter().filter(|s| s.is_disabled()).count(),
            "security chain built"
        );
        Ok(chain)
    }
}

/// Result of running the stages for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutcome {
    /// The drafted response: headers to merge, or the finished rejection.
    pub response: ResponseDraft,
    /// The stage that ended the chain early, if any.
    pub short_circuited_by: Option<StageKind>,
}

impl ChainOutcome {
    /// Returns true if a stage ended the chain early.
    #[must_use]
    pub const fn is_short_circuit(&self) -> bool {
        self.short_circuited_by.is_some()
    }
}

/// An immutable, ordered sequence of stages.
///
/// Shared read-only across requests; all per-request state lives in the
/// [`SecurityContext`] and the [`ResponseDraft`].
#[derive(Clone, Default)]
pub struct Chain {
    stages: Vec<BoxedStage>,
}

impl Chain {
    /// Creates a new chain builder.
    #[must_use]
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    /// Runs the stages for `request`.
    pub fn execute<B>(&self, ctx: &mut SecurityContext, request: &http::Request<B>) -> ChainOutcome {
        self.execute_head(ctx, &RequestHead::from_request(request))
    }

    /// Runs the stages for a borrowed request head.
    pub fn execute_head(&self, ctx: &mut SecurityContext, head: &RequestHead<'_>) -> ChainOutcome {
        let started = Instant::now();
        let len = self.stages.len();
        let mut draft = ResponseDraft::new();
        let mut short_circuited_by = None;

        let mut state = ctx.state().begin(len);
        ctx.set_state(state);

        while let Some(index) = state.current_stage() {
            let Some(stage) = self.stages.get(index) else {
                break;
            };

            let outcome = if stage.is_disabled() {
                trace!(stage = stage.name(), "stage disabled, skipping");
                StageOutcome::Continue
            } else {
                stage.apply(head, &mut draft)
            };

            if outcome.is_short_circuit() {
                short_circuited_by = Some(stage.kind());
                record_stage_short_circuit(stage.name());
                debug!(
                    request_id = %ctx.request_id(),
                    stage = stage.name(),
                    status = ?draft.status(),
                    path = head.path(),
                    "chain short-circuited"
                );
            }

            state = state.advance(outcome, len);
            ctx.set_state(state);
        }

        record_chain_outcome(short_circuited_by.is_some());
        record_chain_duration(started.elapsed());

        ChainOutcome {
            response: draft,
            short_circuited_by,
        }
    }

    /// Runs the chain, then the handler unless a stage short-circuited.
    ///
    /// Headers drafted by the stages are merged into the handler's response;
    /// headers the handler set itself are left alone.
    pub async fn process<B, H>(
        &self,
        mut ctx: SecurityContext,
        request: http::Request<B>,
        handler: H,
    ) -> Response
    where
        H: FnOnce(&mut SecurityContext, http::Request<B>) -> BoxFuture<'static, Response> + Send,
    {
        let outcome = self.execute(&mut ctx, &request);
        if outcome.is_short_circuit() {
            return outcome.response.into_response(StatusCode::OK);
        }

        let mut response = handler(&mut ctx, request).await;
        outcome.response.apply_to(&mut response);
        response
    }

    /// Returns the stage kinds in execution order.
    #[must_use]
    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns the number of stages, disabled ones included.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the chain has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Shared handle to the current chain.
///
/// Requests take a snapshot with [`current`](Self::current) and keep it for
/// their whole lifetime; [`publish`](Self::publish) swaps in a new chain
/// without blocking them.
#[derive(Clone)]
pub struct ChainHandle {
    inner: Arc<ArcSwap<Chain>>,
}

impl ChainHandle {
    /// Creates a handle serving `chain`.
    #[must_use]
    pub fn new(chain: Chain) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(chain)),
        }
    }

    /// Returns a snapshot of the current chain.
    #[must_use]
    pub fn current(&self) -> Arc<Chain> {
        self.inner.load_full()
    }

    /// Replaces the current chain and returns the previous one.
    pub fn publish(&self, chain: Chain) -> Arc<Chain> {
        let stages = chain.stage_names();
        let previous = self.inner.swap(Arc::new(chain));
        info!(stages = ?stages, "security chain published");
        previous
    }
}

impl fmt::Debug for ChainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainHandle")
            .field("current", &self.current())
            .finish()
    }
}
