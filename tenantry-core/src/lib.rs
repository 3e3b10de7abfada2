//! Multi-Tenancy Core for Tenantry
//!
//! Determines which tenant owns an operation, validates that tenant's
//! lifecycle state, and carries it through the call chain.
//!
//! # Features
//!
//! - 🔍 **Tenant Resolution** - Route, host, header, query, claim, fallback
//!   and custom providers
//! - 🧮 **Composite Strategy** - Priority or consensus aggregation with timeout
//! - ✅ **Validation** - Cache-then-store lookup chain
//! - 🧵 **Ambient Context** - Task-local tenant scope with safe nesting
//! - 🚦 **Enforcement** - Per-operation requirement and lifecycle checks
//!
//! # Quick Start
//!
//! ```rust
//! use tenantry_core::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(InMemoryTenantStore::new());
//! store.insert(TenantInfo::new("acme", "Acme Corp"));
//!
//! let mut options = TenancyOptions::default();
//! options.validation.mode = ValidationMode::Repository;
//!
//! let service = TenantResolutionService::from_options(&options, vec![], Some(store), None);
//! let request = ResolutionContext::new().with_header("X-Tenant-ID", "acme");
//! let tenant = service.resolve(&request).await?.expect("resolved");
//!
//! let enforcer = TenantEnforcer::new(options.enforcement.clone());
//! ambient::with_tenant(tenant, async {
//!     enforcer.enforce_current(&OperationRequirement::required())?;
//!     assert_eq!(CurrentTenant::tenant_id().as_deref(), Some("acme"));
//!     Ok::<_, TenancyError>(())
//! })
//! .await?;
//! # Ok::<_, TenancyError>(())
//! # }).unwrap();
//! ```

pub mod ambient;
pub mod context;
pub mod enforcement;
pub mod error;
pub mod options;
pub mod resolution;
pub mod service;
pub mod tenant;
pub mod validation;

pub use ambient::{CurrentTenant, TenantScopeGuard};
pub use context::TenantContext;
pub use enforcement::{OperationRequirement, RequirementMode, TenantEnforcer};
pub use error::{Result, Severity, TenancyError, TenancyErrorKind};
pub use options::{
    EnforcementOptions, FallbackTenant, ResolutionOptions, TenancyOptions, ValidationOptions,
};
pub use resolution::{
    ClaimProvider, CompositeResolutionStrategy, Confidence, DefaultTenantProvider,
    DelegateProvider, HeaderProvider, HostProvider, QueryParameterProvider, ResolutionContext,
    ResolutionResult, ResolutionSource, RouteValueProvider, TenantResolutionProvider,
};
pub use service::TenantResolutionService;
pub use tenant::{TenantInfo, TenantState};
pub use validation::{
    InMemoryTenantCache, InMemoryTenantStore, TenantInfoCache, TenantStore, TenantValidator,
    ValidationMode,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ambient::{self, CurrentTenant};
    pub use crate::context::TenantContext;
    pub use crate::enforcement::{OperationRequirement, RequirementMode, TenantEnforcer};
    pub use crate::error::{TenancyError, TenancyErrorKind};
    pub use crate::options::TenancyOptions;
    pub use crate::resolution::{
        CompositeResolutionStrategy, ResolutionContext, ResolutionResult, ResolutionSource,
        TenantResolutionProvider,
    };
    pub use crate::service::TenantResolutionService;
    pub use crate::tenant::{TenantInfo, TenantState};
    pub use crate::validation::{TenantInfoCache, TenantStore, TenantValidator};
}
