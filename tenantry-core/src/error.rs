//! Tenancy Errors
//!
//! A single error type carrying a kind tag plus a structured payload.
//! Callers match on [`TenancyErrorKind`] instead of downcasting.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result alias used across the tenantry crates.
pub type Result<T> = std::result::Result<T, TenancyError>;

/// Classification of a tenancy failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenancyErrorKind {
    /// No tenant could be determined where one is required
    NotResolved,
    /// A tenant id was resolved but could not be validated
    NotFound,
    /// The tenant is suspended
    Suspended,
    /// The tenant is soft-deleted, deleted, pending provisioning or expired
    Inactive,
    /// A write would touch another tenant's data
    CrossTenantWrite,
    /// Isolation or resolution is misconfigured
    Configuration,
    /// Resolution was cancelled or timed out
    Cancelled,
    /// The storage backend failed
    Storage,
}

impl TenancyErrorKind {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotResolved => "TENANT_NOT_RESOLVED",
            Self::NotFound => "TENANT_NOT_FOUND",
            Self::Suspended => "TENANT_SUSPENDED",
            Self::Inactive => "TENANT_INACTIVE",
            Self::CrossTenantWrite => "TENANT_CROSS_WRITE",
            Self::Configuration => "TENANT_CONFIGURATION",
            Self::Cancelled => "TENANT_RESOLUTION_CANCELLED",
            Self::Storage => "TENANT_STORAGE",
        }
    }

    /// Default severity for this kind.
    pub fn severity(&self) -> Severity {
        match self {
            Self::NotResolved | Self::NotFound | Self::Cancelled => Severity::Low,
            Self::Suspended | Self::Inactive => Severity::Medium,
            Self::Storage => Severity::High,
            Self::CrossTenantWrite | Self::Configuration => Severity::Critical,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Storage)
    }
}

impl std::fmt::Display for TenancyErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Error severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Tenancy error with structured payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct TenancyError {
    kind: TenancyErrorKind,
    code: String,
    message: String,
    severity: Severity,
    transient: bool,
    metadata: HashMap<String, String>,
}

impl TenancyError {
    /// Create an error of the given kind using the kind's defaults.
    pub fn new(kind: TenancyErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code().to_string(),
            message: message.into(),
            severity: kind.severity(),
            transient: kind.is_transient(),
            metadata: HashMap::new(),
        }
    }

    pub fn not_resolved() -> Self {
        Self::new(
            TenancyErrorKind::NotResolved,
            "No tenant could be resolved for this operation",
        )
    }

    pub fn not_found(tenant_id: &str) -> Self {
        Self::new(
            TenancyErrorKind::NotFound,
            format!("Tenant not found: {}", tenant_id),
        )
        .with_metadata("tenant_id", tenant_id)
    }

    pub fn suspended(tenant_id: &str) -> Self {
        Self::new(
            TenancyErrorKind::Suspended,
            format!("Tenant is suspended: {}", tenant_id),
        )
        .with_metadata("tenant_id", tenant_id)
    }

    pub fn inactive(tenant_id: &str, reason: &str) -> Self {
        Self::new(
            TenancyErrorKind::Inactive,
            format!("Tenant is inactive ({}): {}", reason, tenant_id),
        )
        .with_metadata("tenant_id", tenant_id)
        .with_metadata("reason", reason)
    }

    /// A write attempted to touch a record owned by another tenant.
    pub fn cross_tenant_write(entity: &str, expected: &str, actual: &str) -> Self {
        Self::new(
            TenancyErrorKind::CrossTenantWrite,
            format!(
                "Cross-tenant write rejected on {}: current tenant {}, record tenant {}",
                entity, expected, actual
            ),
        )
        .with_metadata("entity", entity)
        .with_metadata("expected_tenant", expected)
        .with_metadata("actual_tenant", actual)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(TenancyErrorKind::Configuration, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(TenancyErrorKind::Cancelled, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(TenancyErrorKind::Storage, message)
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Override the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn kind(&self) -> TenancyErrorKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Check the error kind.
    pub fn is(&self, kind: TenancyErrorKind) -> bool {
        self.kind == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TenancyError::not_found("acme");
        assert_eq!(err.to_string(), "TENANT_NOT_FOUND: Tenant not found: acme");
        assert_eq!(err.metadata().get("tenant_id"), Some(&"acme".to_string()));
    }

    #[test]
    fn test_kind_defaults() {
        let err = TenancyError::cross_tenant_write("Order", "a", "b");
        assert_eq!(err.kind(), TenancyErrorKind::CrossTenantWrite);
        assert_eq!(err.severity(), Severity::Critical);
        assert!(!err.is_transient());

        let err = TenancyError::storage("connection reset");
        assert!(err.is_transient());
        assert_eq!(err.code(), "TENANT_STORAGE");
    }

    #[test]
    fn test_with_severity() {
        let err = TenancyError::inactive("acme", "expired").with_severity(Severity::Low);
        assert_eq!(err.severity(), Severity::Low);
        assert!(err.is(TenancyErrorKind::Inactive));
    }
}
