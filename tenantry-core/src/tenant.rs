//! Tenant Information
//!
//! Tenant metadata as seen by resolution, validation and enforcement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle state of a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TenantState {
    /// State could not be determined (e.g. validation found nothing)
    #[default]
    Unknown,
    /// Tenant is active and operational
    Active,
    /// Tenant is temporarily suspended
    Suspended,
    /// Tenant resources are still being provisioned
    PendingProvision,
    /// Tenant has been deleted
    Deleted,
}

impl std::fmt::Display for TenantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
            Self::PendingProvision => write!(f, "pending_provision"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Tenant information
///
/// Immutable once attached to a [`TenantContext`](crate::TenantContext).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantInfo {
    /// External tenant identifier (what providers resolve)
    pub tenant_id: String,

    /// Internal identifier, if the store assigns one
    pub internal_id: Option<Uuid>,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Tenant type (e.g. "enterprise", "trial")
    pub tenant_type: Option<String>,

    /// Hosting region
    pub region: Option<String>,

    /// Whether tenant is active
    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Whether tenant has been soft-deleted
    #[serde(default)]
    pub is_soft_deleted: bool,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Expiry timestamp, if the tenant is time-limited
    pub expires_at: Option<DateTime<Utc>>,

    /// Parent tenant for hierarchical setups
    pub parent_id: Option<String>,

    /// Lifecycle state
    #[serde(default = "default_state")]
    pub state: TenantState,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_active() -> bool {
    true
}

fn default_state() -> TenantState {
    TenantState::Active
}

impl TenantInfo {
    /// Create a new active tenant
    ///
    /// # Examples
    ///
    /// ```
    /// use tenantry_core::{TenantInfo, TenantState};
    ///
    /// let tenant = TenantInfo::new("tenant-123", "Acme Corp");
    /// assert_eq!(tenant.state, TenantState::Active);
    /// ```
    pub fn new(tenant_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            internal_id: None,
            name: name.into(),
            tenant_type: None,
            region: None,
            is_active: true,
            is_soft_deleted: false,
            created_at: Utc::now(),
            expires_at: None,
            parent_id: None,
            state: TenantState::Active,
            metadata: HashMap::new(),
        }
    }

    /// Synthesize an active tenant from a bare id.
    ///
    /// Used when validation is disabled and for fallback tenants configured
    /// by id only.
    pub fn from_id(tenant_id: impl Into<String>) -> Self {
        let tenant_id = tenant_id.into();
        Self::new(tenant_id.clone(), tenant_id)
    }

    /// Stub for an id that validation could not find.
    ///
    /// The stub is inactive with state [`TenantState::Unknown`], leaving the
    /// accept/reject decision to enforcement.
    pub fn unknown(tenant_id: impl Into<String>) -> Self {
        let tenant_id = tenant_id.into();
        Self {
            is_active: false,
            state: TenantState::Unknown,
            ..Self::new(tenant_id.clone(), tenant_id)
        }
    }

    /// Set internal id
    pub fn with_internal_id(mut self, id: Uuid) -> Self {
        self.internal_id = Some(id);
        self
    }

    /// Set tenant type
    pub fn with_type(mut self, tenant_type: impl Into<String>) -> Self {
        self.tenant_type = Some(tenant_type.into());
        self
    }

    /// Set region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set active status
    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// Mark soft-deleted
    pub fn with_soft_deleted(mut self, soft_deleted: bool) -> Self {
        self.is_soft_deleted = soft_deleted;
        self
    }

    /// Set lifecycle state
    pub fn with_state(mut self, state: TenantState) -> Self {
        self.state = state;
        self
    }

    /// Set creation timestamp
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Set expiry
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set parent tenant
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the tenant has expired at `now`.
    ///
    /// An expiry equal to `now` counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// Whether the tenant may serve requests at `now`.
    pub fn is_operational_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && !self.is_soft_deleted
            && self.state == TenantState::Active
            && !self.is_expired_at(now)
    }

    /// Get cache key for this tenant
    ///
    /// # Examples
    ///
    /// ```
    /// use tenantry_core::TenantInfo;
    ///
    /// let tenant = TenantInfo::new("tenant-123", "acme-corp");
    /// assert_eq!(tenant.cache_key("info"), "tenant:tenant-123:info");
    /// ```
    pub fn cache_key(&self, key: &str) -> String {
        format!("tenant:{}:{}", self.tenant_id, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_tenant_new() {
        let tenant = TenantInfo::new("tenant-1", "acme");
        assert_eq!(tenant.tenant_id, "tenant-1");
        assert_eq!(tenant.name, "acme");
        assert!(tenant.is_active);
        assert_eq!(tenant.state, TenantState::Active);
    }

    #[test]
    fn test_tenant_builder() {
        let tenant = TenantInfo::new("tenant-1", "acme")
            .with_type("enterprise")
            .with_region("eu-west-1")
            .with_parent("holding")
            .with_metadata("plan", "premium");

        assert_eq!(tenant.tenant_type.as_deref(), Some("enterprise"));
        assert_eq!(tenant.region.as_deref(), Some("eu-west-1"));
        assert_eq!(tenant.parent_id.as_deref(), Some("holding"));
        assert_eq!(tenant.metadata.get("plan"), Some(&"premium".to_string()));
    }

    #[test]
    fn test_unknown_stub() {
        let tenant = TenantInfo::unknown("ghost");
        assert_eq!(tenant.tenant_id, "ghost");
        assert!(!tenant.is_active);
        assert_eq!(tenant.state, TenantState::Unknown);
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let tenant = TenantInfo::new("t", "t").with_expires_at(now);
        assert!(tenant.is_expired_at(now));
        assert!(!tenant.is_expired_at(now - Duration::seconds(1)));
        assert!(!tenant.is_operational_at(now));
    }

    #[test]
    fn test_operational() {
        let now = Utc::now();
        assert!(TenantInfo::new("t", "t").is_operational_at(now));
        assert!(
            !TenantInfo::new("t", "t")
                .with_state(TenantState::Suspended)
                .is_operational_at(now)
        );
        assert!(
            !TenantInfo::new("t", "t")
                .with_soft_deleted(true)
                .is_operational_at(now)
        );
    }
}
