//! Tenant Resolution Providers
//!
//! Each provider reads one signal from a [`ResolutionContext`] and reports
//! the candidate tenant ids it found. Providers never fail: missing data is
//! a not-found result.

use super::context::ResolutionContext;
use super::result::{CandidateSet, Confidence, ResolutionResult, ResolutionSource};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;

/// Tenant resolution provider trait
///
/// Implement this trait to add a resolution strategy.
#[async_trait]
pub trait TenantResolutionProvider: Send + Sync {
    /// The source this provider reports under
    fn source(&self) -> ResolutionSource;

    /// Resolve candidates from the context
    async fn resolve(&self, context: &ResolutionContext) -> ResolutionResult;
}

/// Split a multi-valued signal on `,` and `;`.
fn split_candidates(raw: &str, set: &mut CandidateSet) {
    for part in raw.split([',', ';']) {
        set.insert(part);
    }
}

/// Route value provider
///
/// Reads a named route value (e.g. `/tenants/{tenant}/orders`). The value is
/// taken as-is and resolves at [`Confidence::High`].
pub struct RouteValueProvider {
    parameter: String,
}

impl RouteValueProvider {
    /// Create new route value provider
    ///
    /// # Examples
    ///
    /// ```
    /// use tenantry_core::RouteValueProvider;
    ///
    /// let provider = RouteValueProvider::new("tenant");
    /// ```
    pub fn new(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
        }
    }
}

#[async_trait]
impl TenantResolutionProvider for RouteValueProvider {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Route
    }

    async fn resolve(&self, context: &ResolutionContext) -> ResolutionResult {
        match context.route_value(&self.parameter) {
            Some(value) => ResolutionResult::resolved(self.source(), value, Confidence::High),
            None => ResolutionResult::not_found(self.source()),
        }
    }
}

/// Header-based provider
///
/// Reads one or more headers (e.g. `X-Tenant-ID`). Every configured header
/// that is present contributes candidates.
pub struct HeaderProvider {
    header_names: Vec<String>,
}

impl HeaderProvider {
    /// Create a provider for a single header
    ///
    /// # Examples
    ///
    /// ```
    /// use tenantry_core::HeaderProvider;
    ///
    /// let provider = HeaderProvider::new("X-Tenant-ID");
    /// ```
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_names: vec![header_name.into()],
        }
    }

    /// Create a provider reading several headers in order
    pub fn with_headers<I, S>(header_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            header_names: header_names.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TenantResolutionProvider for HeaderProvider {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Header
    }

    async fn resolve(&self, context: &ResolutionContext) -> ResolutionResult {
        let mut set = CandidateSet::new();
        for name in &self.header_names {
            if let Some(value) = context.header(name) {
                split_candidates(value, &mut set);
            }
        }
        ResolutionResult::from_set(self.source(), set, Confidence::Medium)
    }
}

/// Query parameter provider
pub struct QueryParameterProvider {
    parameter: String,
}

impl QueryParameterProvider {
    pub fn new(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
        }
    }
}

#[async_trait]
impl TenantResolutionProvider for QueryParameterProvider {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::QueryString
    }

    async fn resolve(&self, context: &ResolutionContext) -> ResolutionResult {
        let mut set = CandidateSet::new();
        if let Some(value) = context.query(&self.parameter) {
            split_candidates(value, &mut set);
        }
        ResolutionResult::from_set(self.source(), set, Confidence::Medium)
    }
}

/// Claim-based provider
///
/// Reads a claim from the already-authenticated principal. Token decoding is
/// the host's job.
pub struct ClaimProvider {
    claim_type: String,
}

impl ClaimProvider {
    pub fn new(claim_type: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
        }
    }
}

#[async_trait]
impl TenantResolutionProvider for ClaimProvider {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Claim
    }

    async fn resolve(&self, context: &ResolutionContext) -> ResolutionResult {
        let mut set = CandidateSet::new();
        if let Some(value) = context.claim(&self.claim_type) {
            split_candidates(value, &mut set);
        }
        ResolutionResult::from_set(self.source(), set, Confidence::Medium)
    }
}

/// Subdomain-based provider
///
/// Resolves the leftmost DNS label (e.g. `acme.example.com` -> `acme`).
pub struct HostProvider;

impl HostProvider {
    pub fn new() -> Self {
        Self
    }

    /// Extract the tenant label from a host value
    fn extract_subdomain(host: &str) -> Option<String> {
        let host = host.trim();

        // Bracketed IPv6 literal, with or without port
        if host.starts_with('[') {
            return None;
        }

        // Bare IPv6 literals carry several colons; only strip a single port
        if host.parse::<IpAddr>().is_ok() {
            return None;
        }
        let host = match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        };
        let host = host.trim_end_matches('.').to_ascii_lowercase();

        if host.is_empty() || host == "localhost" || host.parse::<IpAddr>().is_ok() {
            return None;
        }

        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
            return None;
        }

        Some(labels[0].to_string())
    }
}

impl Default for HostProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TenantResolutionProvider for HostProvider {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Host
    }

    async fn resolve(&self, context: &ResolutionContext) -> ResolutionResult {
        match context.host().and_then(Self::extract_subdomain) {
            Some(label) => ResolutionResult::resolved(self.source(), label, Confidence::Medium),
            None => ResolutionResult::not_found(self.source()),
        }
    }
}

/// Static fallback provider
///
/// Always offers the configured tenant id at [`Confidence::Low`].
pub struct DefaultTenantProvider {
    tenant_id: String,
}

impl DefaultTenantProvider {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
        }
    }
}

#[async_trait]
impl TenantResolutionProvider for DefaultTenantProvider {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Default
    }

    async fn resolve(&self, _context: &ResolutionContext) -> ResolutionResult {
        ResolutionResult::resolved(self.source(), &self.tenant_id, Confidence::Low)
    }
}

type ResolveFn = dyn Fn(&ResolutionContext) -> Option<String> + Send + Sync;

/// Delegate provider for host-specific extensions
pub struct DelegateProvider {
    confidence: Confidence,
    resolve_fn: Arc<ResolveFn>,
}

impl DelegateProvider {
    /// Create new delegate provider
    ///
    /// # Examples
    ///
    /// ```
    /// use tenantry_core::{Confidence, DelegateProvider};
    ///
    /// let provider = DelegateProvider::new(Confidence::High, |ctx| {
    ///     ctx.header("x-org").map(|org| format!("org-{}", org))
    /// });
    /// ```
    pub fn new<F>(confidence: Confidence, resolve_fn: F) -> Self
    where
        F: Fn(&ResolutionContext) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            confidence,
            resolve_fn: Arc::new(resolve_fn),
        }
    }
}

#[async_trait]
impl TenantResolutionProvider for DelegateProvider {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Custom
    }

    async fn resolve(&self, context: &ResolutionContext) -> ResolutionResult {
        match (self.resolve_fn)(context) {
            Some(id) => ResolutionResult::resolved(self.source(), id, self.confidence),
            None => ResolutionResult::not_found(self.source()),
        }
    }
}
