//! Tenancy Options
//!
//! Serializable settings for resolution, validation and enforcement.

use crate::enforcement::RequirementMode;
use crate::resolution::{
    ClaimProvider, DefaultTenantProvider, HeaderProvider, HostProvider, QueryParameterProvider,
    ResolutionSource, RouteValueProvider, TenantResolutionProvider,
};
use crate::tenant::TenantInfo;
use crate::validation::ValidationMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Top-level tenancy options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenancyOptions {
    pub resolution: ResolutionOptions,
    pub validation: ValidationOptions,
    pub enforcement: EnforcementOptions,
}

/// Fallback tenant, configured either as a bare id or a full tenant object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FallbackTenant {
    Id(String),
    Tenant(TenantInfo),
}

impl FallbackTenant {
    pub fn tenant_id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Tenant(tenant) => &tenant.tenant_id,
        }
    }

    /// Tenant info for the fallback tenant
    pub fn to_tenant_info(&self) -> TenantInfo {
        match self {
            Self::Id(id) => TenantInfo::from_id(id.clone()),
            Self::Tenant(tenant) => {
                let mut tenant = tenant.clone();
                if tenant.name.is_empty() {
                    tenant.name = tenant.tenant_id.clone();
                }
                tenant
            }
        }
    }
}

/// Resolution options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionOptions {
    /// Headers read by the header provider
    pub header_names: Vec<String>,

    /// Claim read by the claim provider
    pub claim_type: String,

    /// Route value read by the route provider
    pub route_parameter: String,

    /// Query parameter read by the query provider
    pub query_parameter: String,

    /// Built-in providers to register
    pub providers: Vec<ResolutionSource>,

    /// Source evaluation order for priority mode
    pub priority: Vec<ResolutionSource>,

    /// Evaluate providers missing from `priority` after the listed ones
    pub include_unlisted_providers: bool,

    /// Use consensus mode instead of priority mode
    pub use_consensus: bool,

    /// Overall resolution timeout in milliseconds
    pub timeout_ms: u64,

    /// Fallback tenant used by the default provider
    pub fallback_tenant: Option<FallbackTenant>,
}

impl Default for ResolutionOptions {
    fn default() -> Self {
        Self {
            header_names: vec!["X-Tenant-ID".to_string()],
            claim_type: "tenant_id".to_string(),
            route_parameter: "tenant".to_string(),
            query_parameter: "tenant".to_string(),
            providers: vec![
                ResolutionSource::Route,
                ResolutionSource::Header,
                ResolutionSource::Claim,
                ResolutionSource::QueryString,
            ],
            priority: vec![
                ResolutionSource::Route,
                ResolutionSource::Header,
                ResolutionSource::Claim,
                ResolutionSource::QueryString,
                ResolutionSource::Host,
                ResolutionSource::Custom,
                ResolutionSource::Default,
            ],
            include_unlisted_providers: true,
            use_consensus: false,
            timeout_ms: 5_000,
            fallback_tenant: None,
        }
    }
}

impl ResolutionOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Build the built-in providers enabled by these options.
    ///
    /// The default provider is added whenever a fallback tenant is set.
    /// Custom delegates are not configurable here; hosts append them.
    pub fn build_providers(&self) -> Vec<Arc<dyn TenantResolutionProvider>> {
        let mut providers: Vec<Arc<dyn TenantResolutionProvider>> = Vec::new();

        for source in &self.providers {
            match source {
                ResolutionSource::Route => {
                    providers.push(Arc::new(RouteValueProvider::new(&self.route_parameter)))
                }
                ResolutionSource::Header => providers.push(Arc::new(
                    HeaderProvider::with_headers(self.header_names.iter().cloned()),
                )),
                ResolutionSource::Claim => {
                    providers.push(Arc::new(ClaimProvider::new(&self.claim_type)))
                }
                ResolutionSource::QueryString => {
                    providers.push(Arc::new(QueryParameterProvider::new(&self.query_parameter)))
                }
                ResolutionSource::Host => providers.push(Arc::new(HostProvider::new())),
                ResolutionSource::Default | ResolutionSource::Custom | ResolutionSource::Composite => {}
            }
        }

        if let Some(fallback) = &self.fallback_tenant {
            providers.push(Arc::new(DefaultTenantProvider::new(fallback.tenant_id())));
        }

        providers
    }
}

/// Validation options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    pub mode: ValidationMode,

    /// TTL for cache entries written after a repository hit, in seconds
    pub cache_ttl_secs: u64,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            mode: ValidationMode::None,
            cache_ttl_secs: 300,
        }
    }
}

impl ValidationOptions {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Enforcement options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcementOptions {
    /// Requirement applied when an operation declares none
    pub default_requirement: RequirementMode,

    /// Honor per-operation anonymous markers
    pub allow_anonymous: bool,
}

impl Default for EnforcementOptions {
    fn default() -> Self {
        Self {
            default_requirement: RequirementMode::Required,
            allow_anonymous: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = TenancyOptions::default();
        assert_eq!(options.resolution.header_names, vec!["X-Tenant-ID"]);
        assert_eq!(options.resolution.timeout(), Duration::from_secs(5));
        assert_eq!(options.validation.mode, ValidationMode::None);
        assert_eq!(
            options.enforcement.default_requirement,
            RequirementMode::Required
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let options: TenancyOptions = serde_json::from_value(serde_json::json!({
            "resolution": {
                "use_consensus": true,
                "fallback_tenant": "shared"
            },
            "validation": { "mode": "repository" }
        }))
        .unwrap();

        assert!(options.resolution.use_consensus);
        assert_eq!(options.resolution.claim_type, "tenant_id");
        assert_eq!(
            options.resolution.fallback_tenant,
            Some(FallbackTenant::Id("shared".to_string()))
        );
        assert_eq!(options.validation.mode, ValidationMode::Repository);
    }

    #[test]
    fn test_fallback_tenant_object() {
        let fallback: FallbackTenant = serde_json::from_value(serde_json::json!({
            "tenant_id": "shared",
            "region": "us-east-1"
        }))
        .unwrap();

        let info = fallback.to_tenant_info();
        assert_eq!(fallback.tenant_id(), "shared");
        assert_eq!(info.name, "shared");
        assert_eq!(info.region.as_deref(), Some("us-east-1"));
        assert!(info.is_active);
    }

    #[test]
    fn test_build_providers() {
        let mut options = ResolutionOptions::default();
        options.providers.push(ResolutionSource::Host);
        options.fallback_tenant = Some(FallbackTenant::Id("shared".to_string()));

        let sources: Vec<_> = options
            .build_providers()
            .iter()
            .map(|p| p.source())
            .collect();
        assert_eq!(
            sources,
            vec![
                ResolutionSource::Route,
                ResolutionSource::Header,
                ResolutionSource::Claim,
                ResolutionSource::QueryString,
                ResolutionSource::Host,
                ResolutionSource::Default,
            ]
        );
    }
}
