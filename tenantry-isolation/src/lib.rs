//! Tenant Data Isolation for Tenantry
//!
//! Keeps each tenant's data apart at the storage layer, driven by the
//! ambient tenant from `tenantry-core`.
//!
//! # Features
//!
//! - 🗂️ **Shared Database** - Row-level tenant column with automatic filters
//! - 🏷️ **Schema Per Tenant** - Sanitized, validated schema names per tenant
//! - 🗄️ **Database Per Tenant** - Connection resolution with cached backends
//! - 🛡️ **Write Guard** - Tenant stamping and cross-tenant write rejection
//! - 🚚 **Migrations** - Per-tenant migration runner
//!
//! # Quick Start
//!
//! ```rust
//! use tenantry_core::{TenantContext, TenantInfo, ambient};
//! use tenantry_isolation::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let engine = IsolationEngine::builder(IsolationConfig::default())
//!     .register_descriptor(EntityDescriptor::new("Order").with_fields(["id", "tenant_id", "total"]))
//!     .with_backend(Arc::new(InMemoryBackend::new()))
//!     .build()?;
//!
//! let acme = TenantContext::for_tenant(TenantInfo::new("acme", "Acme"));
//! ambient::with_tenant(acme, async {
//!     let mut storage = engine.context().await?;
//!     let record = json!({"id": 1, "total": 10}).as_object().cloned().unwrap_or_default();
//!     storage.insert("Order", record)?;
//!     storage.save_changes().await?;
//!
//!     let rows = storage.query("Order", None).await?;
//!     assert_eq!(rows[0]["tenant_id"], json!("acme"));
//!     Ok::<_, tenantry_core::TenancyError>(())
//! })
//! .await?;
//! # Ok::<_, tenantry_core::TenancyError>(())
//! # }).unwrap();
//! ```

pub mod backend;
pub mod connection;
pub mod context;
pub mod engine;
pub mod entity;
pub mod guard;
pub mod migration;
pub mod model;
pub mod options;
pub mod predicate;
pub mod schema;

pub use backend::{
    Change, ChangeOp, InMemoryBackend, OwnerCheck, StorageBackend, StorageTarget,
};
pub use connection::{
    ConnectionFactory, ConnectionResolver, InMemoryConnectionFactory, TenantConnectionManager,
};
pub use context::TenantStorageContext;
pub use engine::{IsolationEngine, IsolationEngineBuilder};
pub use entity::{Entity, EntityDescriptor, Record, is_identity_entity};
pub use guard::WriteGuard;
pub use migration::{
    Migration, MigrationPolicy, MigrationReport, MigrationRunner, MigrationSet, MigrationStep,
    SharedMigration, TenantMigration, TenantMigrationFailure,
};
pub use model::{CompiledModel, EntityScope, Exemption, ModelCacheKey};
pub use options::{IsolationConfig, IsolationMode, IsolationOptions, TargetResolverFn};
pub use predicate::{CompareOp, DEFAULT_PARAMETER, Expr, ExprRewriter};
pub use schema::{SchemaNameResolver, sanitize_schema_name, validate_schema_name};
