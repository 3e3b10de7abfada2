//! Tenant Context
//!
//! The outcome of resolving and validating a tenant for one logical
//! operation (request, job, migration run).

use crate::resolution::{Confidence, ResolutionResult, ResolutionSource};
use crate::tenant::TenantInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tenant context for one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    tenant_id: String,
    tenant: Option<TenantInfo>,
    resolution: ResolutionResult,
    correlation_id: Option<String>,
    resolved_at: DateTime<Utc>,
    is_validated: bool,
}

impl TenantContext {
    /// Create a context from a resolved result and its tenant metadata.
    ///
    /// Returns `None` when the result did not resolve to a single id.
    pub fn new(resolution: ResolutionResult, tenant: TenantInfo) -> Option<Self> {
        let tenant_id = resolution.tenant_id()?.to_string();
        Some(Self {
            tenant_id,
            tenant: Some(tenant),
            resolution,
            correlation_id: None,
            resolved_at: Utc::now(),
            is_validated: false,
        })
    }

    /// Create a context impersonating a known tenant.
    ///
    /// Used for out-of-band work such as migrations, where the tenant comes
    /// from a trusted list rather than a request.
    pub fn for_tenant(tenant: TenantInfo) -> Self {
        let resolution =
            ResolutionResult::resolved(ResolutionSource::Custom, &tenant.tenant_id, Confidence::High);
        Self {
            tenant_id: tenant.tenant_id.clone(),
            tenant: Some(tenant),
            resolution,
            correlation_id: None,
            resolved_at: Utc::now(),
            is_validated: true,
        }
    }

    /// Create a context with a resolved id but no tenant metadata
    pub fn without_metadata(resolution: ResolutionResult) -> Option<Self> {
        let tenant_id = resolution.tenant_id()?.to_string();
        Some(Self {
            tenant_id,
            tenant: None,
            resolution,
            correlation_id: None,
            resolved_at: Utc::now(),
            is_validated: false,
        })
    }

    /// Set correlation id
    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Set validation flag
    pub fn with_validated(mut self, validated: bool) -> Self {
        self.is_validated = validated;
        self
    }

    /// Set resolution timestamp
    pub fn with_resolved_at(mut self, resolved_at: DateTime<Utc>) -> Self {
        self.resolved_at = resolved_at;
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn tenant(&self) -> Option<&TenantInfo> {
        self.tenant.as_ref()
    }

    pub fn resolution(&self) -> &ResolutionResult {
        &self.resolution
    }

    pub fn source(&self) -> ResolutionSource {
        self.resolution.source()
    }

    pub fn confidence(&self) -> Confidence {
        self.resolution.confidence()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    pub fn is_validated(&self) -> bool {
        self.is_validated
    }

    /// Set validation flag in place
    pub fn set_validated(&mut self, validated: bool) {
        self.is_validated = validated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_resolved_result() {
        let ambiguous =
            ResolutionResult::from_candidates(ResolutionSource::Header, ["a", "b"], Confidence::Medium);
        assert!(TenantContext::new(ambiguous, TenantInfo::from_id("a")).is_none());

        let resolved = ResolutionResult::resolved(ResolutionSource::Header, "a", Confidence::Medium);
        let ctx = TenantContext::new(resolved, TenantInfo::from_id("a")).unwrap();
        assert_eq!(ctx.tenant_id(), "a");
        assert!(!ctx.is_validated());
    }

    #[test]
    fn test_serde_round_trip() {
        let tenant = TenantInfo::new("acme", "Acme")
            .with_metadata("plan", "enterprise")
            .with_metadata("tier", "gold");
        let resolution = ResolutionResult::resolved(ResolutionSource::Claim, "acme", Confidence::Medium);
        let ctx = TenantContext::new(resolution, tenant)
            .unwrap()
            .with_validated(true)
            .with_correlation_id(Some("corr-9".to_string()));

        let json = serde_json::to_string(&ctx).unwrap();
        let restored: TenantContext = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, ctx);
        assert_eq!(restored.tenant_id(), "acme");
        assert_eq!(restored.source(), ResolutionSource::Claim);
        assert_eq!(restored.confidence(), Confidence::Medium);
        assert!(restored.is_validated());
        assert_eq!(restored.resolved_at(), ctx.resolved_at());
        assert_eq!(
            restored.tenant().unwrap().metadata,
            ctx.tenant().unwrap().metadata
        );
    }

    #[test]
    fn test_for_tenant_is_validated() {
        let ctx = TenantContext::for_tenant(TenantInfo::new("acme", "Acme"));
        assert!(ctx.is_validated());
        assert_eq!(ctx.confidence(), Confidence::High);
        assert_eq!(ctx.source(), ResolutionSource::Custom);
    }
}
