//! Tenant Resolution Service
//!
//! Chains the composite strategy and the validator into the consumer-facing
//! "resolve a request into a tenant context" operation.

use crate::context::TenantContext;
use crate::error::Result;
use crate::options::TenancyOptions;
use crate::resolution::{
    CompositeResolutionStrategy, ResolutionContext, TenantResolutionProvider,
};
use crate::validation::{TenantInfoCache, TenantStore, TenantValidator};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Resolves and validates tenants
pub struct TenantResolutionService {
    strategy: CompositeResolutionStrategy,
    validator: TenantValidator,
}

impl TenantResolutionService {
    pub fn new(strategy: CompositeResolutionStrategy, validator: TenantValidator) -> Self {
        Self {
            strategy,
            validator,
        }
    }

    /// Build the strategy and validator from options.
    ///
    /// Extra providers (custom delegates) are appended after the built-in
    /// ones.
    pub fn from_options(
        options: &TenancyOptions,
        extra_providers: Vec<Arc<dyn TenantResolutionProvider>>,
        store: Option<Arc<dyn TenantStore>>,
        cache: Option<Arc<dyn TenantInfoCache>>,
    ) -> Self {
        let mut providers = options.resolution.build_providers();
        providers.extend(extra_providers);

        let strategy = CompositeResolutionStrategy::from_options(providers, &options.resolution);
        let mut validator = TenantValidator::from_options(
            &options.validation,
            options.resolution.fallback_tenant.clone(),
        );
        if let Some(store) = store {
            validator = validator.with_store(store);
        }
        if let Some(cache) = cache {
            validator = validator.with_cache(cache);
        }

        Self::new(strategy, validator)
    }

    pub fn strategy(&self) -> &CompositeResolutionStrategy {
        &self.strategy
    }

    pub fn validator(&self) -> &TenantValidator {
        &self.validator
    }

    /// Resolve a request into a tenant context.
    ///
    /// `Ok(None)` means no single tenant was found (not found or
    /// ambiguous). Errors only on timeout or cancellation.
    pub async fn resolve(&self, context: &ResolutionContext) -> Result<Option<TenantContext>> {
        self.resolve_with_cancellation(context, &CancellationToken::new())
            .await
    }

    /// Resolve with an external cancellation signal
    pub async fn resolve_with_cancellation(
        &self,
        context: &ResolutionContext,
        token: &CancellationToken,
    ) -> Result<Option<TenantContext>> {
        let result = self
            .strategy
            .resolve_with_cancellation(context, token)
            .await?;

        if !result.is_resolved() {
            debug!(
                source = %result.source(),
                candidates = result.candidates().len(),
                "Tenant not resolved"
            );
            return Ok(None);
        }

        let correlation_id = context.correlation_id().map(str::to_string);
        Ok(self.validator.validate(result, correlation_id).await)
    }
}
