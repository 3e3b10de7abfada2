//! Resolution input populated by the host transport.

use std::collections::HashMap;

/// Request data that resolution providers read from.
///
/// Header names are stored lowercased; lookups through [`header`](Self::header)
/// are case-insensitive. Route values, query parameters and claims are
/// matched exactly.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    host: Option<String>,
    correlation_id: Option<String>,
    headers: HashMap<String, String>,
    route_values: HashMap<String, String>,
    query: HashMap<String, String>,
    claims: HashMap<String, String>,
}

impl ResolutionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set correlation id
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Add a header
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Add a route value
    pub fn with_route_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.route_values.insert(name.into(), value.into());
        self
    }

    /// Add a query parameter
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Add a claim
    pub fn with_claim(mut self, claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(claim_type.into(), value.into());
        self
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn route_value(&self, name: &str) -> Option<&str> {
        self.route_values.get(name).map(String::as_str)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn claim(&self, claim_type: &str) -> Option<&str> {
        self.claims.get(claim_type).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let ctx = ResolutionContext::new().with_header("X-Tenant-ID", "acme");
        assert_eq!(ctx.header("x-tenant-id"), Some("acme"));
        assert_eq!(ctx.header("X-TENANT-ID"), Some("acme"));
        assert_eq!(ctx.header("x-other"), None);
    }

    #[test]
    fn test_builder() {
        let ctx = ResolutionContext::new()
            .with_host("acme.example.com")
            .with_correlation_id("corr-1")
            .with_route_value("tenant", "acme")
            .with_query("tenant", "globex")
            .with_claim("tenant_id", "initech");

        assert_eq!(ctx.host(), Some("acme.example.com"));
        assert_eq!(ctx.correlation_id(), Some("corr-1"));
        assert_eq!(ctx.route_value("tenant"), Some("acme"));
        assert_eq!(ctx.query("tenant"), Some("globex"));
        assert_eq!(ctx.claim("tenant_id"), Some("initech"));
    }
}
