//! Composite Resolution Strategy
//!
//! Combines several providers into one outcome, either by priority
//! (first resolved wins) or by consensus (union of all candidates).

use super::context::ResolutionContext;
use super::providers::TenantResolutionProvider;
use super::result::{CandidateSet, Confidence, ResolutionResult, ResolutionSource};
use crate::error::{Result, TenancyError};
use crate::options::ResolutionOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Composite resolution strategy
pub struct CompositeResolutionStrategy {
    providers: Vec<Arc<dyn TenantResolutionProvider>>,
    priority: Vec<ResolutionSource>,
    include_unlisted: bool,
    use_consensus: bool,
    timeout: Duration,
}

impl CompositeResolutionStrategy {
    /// Create a strategy with default options
    ///
    /// # Examples
    ///
    /// ```
    /// use tenantry_core::{CompositeResolutionStrategy, HeaderProvider, RouteValueProvider};
    /// use std::sync::Arc;
    ///
    /// let strategy = CompositeResolutionStrategy::new(vec![
    ///     Arc::new(HeaderProvider::new("X-Tenant-ID")),
    ///     Arc::new(RouteValueProvider::new("tenant")),
    /// ]);
    /// ```
    pub fn new(providers: Vec<Arc<dyn TenantResolutionProvider>>) -> Self {
        Self::from_options(providers, &ResolutionOptions::default())
    }

    /// Create a strategy from resolution options
    pub fn from_options(
        providers: Vec<Arc<dyn TenantResolutionProvider>>,
        options: &ResolutionOptions,
    ) -> Self {
        Self {
            providers,
            priority: options.priority.clone(),
            include_unlisted: options.include_unlisted_providers,
            use_consensus: options.use_consensus,
            timeout: options.timeout(),
        }
    }

    /// Set source priority order
    pub fn with_priority(mut self, priority: Vec<ResolutionSource>) -> Self {
        self.priority = priority;
        self
    }

    /// Append providers whose source is not in the priority list
    pub fn with_include_unlisted(mut self, include: bool) -> Self {
        self.include_unlisted = include;
        self
    }

    /// Switch between priority and consensus mode
    pub fn with_consensus(mut self, use_consensus: bool) -> Self {
        self.use_consensus = use_consensus;
        self
    }

    /// Set overall resolution timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a provider
    pub fn add_provider(&mut self, provider: Arc<dyn TenantResolutionProvider>) {
        self.providers.push(provider);
    }

    /// Providers in evaluation order.
    ///
    /// Grouped by source following the priority list; registration order is
    /// kept within a source. Unlisted sources follow when allowed.
    pub fn ordered_providers(&self) -> Vec<&Arc<dyn TenantResolutionProvider>> {
        let mut ordered = Vec::with_capacity(self.providers.len());
        let mut seen: Vec<ResolutionSource> = Vec::new();

        for source in &self.priority {
            if seen.contains(source) {
                continue;
            }
            seen.push(*source);
            ordered.extend(self.providers.iter().filter(|p| p.source() == *source));
        }

        if self.include_unlisted {
            ordered.extend(
                self.providers
                    .iter()
                    .filter(|p| !self.priority.contains(&p.source())),
            );
        }

        ordered
    }

    /// Resolve with the configured timeout
    pub async fn resolve(&self, context: &ResolutionContext) -> Result<ResolutionResult> {
        self.resolve_with_cancellation(context, &CancellationToken::new())
            .await
    }

    /// Resolve with the configured timeout and an external cancellation signal.
    ///
    /// Timeout or cancellation drops every in-flight provider call and
    /// returns a `Cancelled` error; no partial result is produced.
    pub async fn resolve_with_cancellation(
        &self,
        context: &ResolutionContext,
        token: &CancellationToken,
    ) -> Result<ResolutionResult> {
        let work = async {
            if self.use_consensus {
                self.resolve_consensus(context).await
            } else {
                self.resolve_priority(context).await
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Tenant resolution cancelled");
                Err(TenancyError::cancelled("Tenant resolution was cancelled"))
            }
            outcome = tokio::time::timeout(self.timeout, work) => {
                outcome.map_err(|_| {
                    debug!(timeout_ms = self.timeout.as_millis() as u64, "Tenant resolution timed out");
                    TenancyError::cancelled(format!(
                        "Tenant resolution timed out after {}ms",
                        self.timeout.as_millis()
                    ))
                })
            }
        }
    }

    async fn resolve_priority(&self, context: &ResolutionContext) -> ResolutionResult {
        let mut first_ambiguous: Option<ResolutionResult> = None;

        for provider in self.ordered_providers() {
            let result = provider.resolve(context).await;
            if result.is_resolved() {
                debug!(source = %result.source(), "Tenant resolved by priority");
                return result;
            }
            if result.is_ambiguous() && first_ambiguous.is_none() {
                first_ambiguous = Some(result);
            }
        }

        first_ambiguous.unwrap_or_else(|| ResolutionResult::not_found(ResolutionSource::Composite))
    }

    async fn resolve_consensus(&self, context: &ResolutionContext) -> ResolutionResult {
        let mut union = CandidateSet::new();
        let mut fallback = CandidateSet::new();

        let providers = self.ordered_providers_all();
        for provider in providers
            .iter()
            .filter(|p| p.source() != ResolutionSource::Default)
        {
            let result = provider.resolve(context).await;
            union.extend(result.candidates());
        }

        if !union.is_empty() {
            let result =
                ResolutionResult::from_set(ResolutionSource::Composite, union, Confidence::Medium);
            debug!(
                candidates = result.candidates().len(),
                "Tenant consensus computed"
            );
            return result;
        }

        for provider in providers
            .iter()
            .filter(|p| p.source() == ResolutionSource::Default)
        {
            let result = provider.resolve(context).await;
            fallback.extend(result.candidates());
        }

        if fallback.is_empty() {
            return ResolutionResult::not_found(ResolutionSource::Composite);
        }

        debug!("Tenant consensus fell back to default tenant");
        ResolutionResult::from_set(ResolutionSource::Default, fallback, Confidence::Low)
    }

    /// Every provider in priority order, unlisted ones included regardless
    /// of `include_unlisted`.
    fn ordered_providers_all(&self) -> Vec<&Arc<dyn TenantResolutionProvider>> {
        let mut ordered = self.ordered_providers();
        if !self.include_unlisted {
            ordered.extend(
                self.providers
                    .iter()
                    .filter(|p| !self.priority.contains(&p.source())),
            );
        }
        ordered
    }
}
