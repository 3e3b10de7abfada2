//! Tenant Migrations
//!
//! Applies an ordered set of migrations to every tenant's storage target.
//! Each tenant is migrated inside its own ambient tenant scope, so the
//! engine picks the right schema or connection for it and nothing leaks
//! from one iteration into the next.
//!
//! With schema-per-tenant isolation, global and other unscoped entities
//! live in the default schema. That schema is migrated once before the
//! tenants, with the steps touching those entities; tenant schemas get the
//! remaining steps.

use crate::backend::StorageTarget;
use crate::context::TenantStorageContext;
use crate::engine::IsolationEngine;
use crate::model::CompiledModel;
use crate::options::IsolationMode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tenantry_core::{
    CurrentTenant, Result, TenancyError, TenantContext, TenantInfo, TenantState, ambient,
};
use tracing::{info, warn};

/// One structural change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MigrationStep {
    CreateEntity {
        entity: String,
    },
    AddField {
        entity: String,
        field: String,
        #[serde(default)]
        default: Value,
    },
    RenameField {
        entity: String,
        from: String,
        to: String,
    },
    DropField {
        entity: String,
        field: String,
    },
    DropEntity {
        entity: String,
    },
}

impl MigrationStep {
    /// Entity the step changes
    pub fn entity(&self) -> &str {
        match self {
            Self::CreateEntity { entity }
            | Self::AddField { entity, .. }
            | Self::RenameField { entity, .. }
            | Self::DropField { entity, .. }
            | Self::DropEntity { entity } => entity,
        }
    }
}

/// A named, ordered list of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<MigrationStep>,
}

impl Migration {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_step(mut self, step: MigrationStep) -> Self {
        self.steps.push(step);
        self
    }
}

/// Ordered migrations with unique ids
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    pub fn new(migrations: Vec<Migration>) -> Result<Self> {
        let mut seen = HashSet::new();
        for migration in &migrations {
            if migration.id.trim().is_empty() {
                return Err(TenancyError::configuration("Migration id cannot be empty"));
            }
            if !seen.insert(migration.id.as_str()) {
                return Err(TenancyError::configuration(format!(
                    "Duplicate migration id '{}'",
                    migration.id
                )));
            }
        }
        Ok(Self { migrations })
    }

    /// Migrations not yet in `applied`, in order
    pub fn pending<'a>(&'a self, applied: &[String]) -> Vec<&'a Migration> {
        self.migrations
            .iter()
            .filter(|m| !applied.contains(&m.id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }
}

/// What to do when one tenant fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPolicy {
    /// Stop at the first failing tenant
    #[default]
    FailFast,
    /// Record the failure and move on
    ContinueOnError,
}

/// Result for one tenant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantMigration {
    pub tenant_id: String,
    pub target: StorageTarget,
    /// Migrations applied during this run (empty when already up to date)
    pub applied: Vec<String>,
}

/// Result for the default schema shared by unscoped entities
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedMigration {
    pub target: StorageTarget,
    pub applied: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantMigrationFailure {
    pub tenant_id: String,
    pub error: TenancyError,
}

/// Migration run summary
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    /// Default schema run; only present with schema-per-tenant isolation
    pub shared: Option<SharedMigration>,
    pub migrated: Vec<TenantMigration>,
    /// Deleted tenants are not migrated
    pub skipped: Vec<String>,
    pub failed: Vec<TenantMigrationFailure>,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn migrated_tenants(&self) -> Vec<&str> {
        self.migrated.iter().map(|m| m.tenant_id.as_str()).collect()
    }
}

/// Migration runner
pub struct MigrationRunner {
    engine: Arc<IsolationEngine>,
    policy: MigrationPolicy,
}

impl MigrationRunner {
    pub fn new(engine: Arc<IsolationEngine>) -> Self {
        Self {
            engine,
            policy: MigrationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MigrationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> MigrationPolicy {
        self.policy
    }

    /// Migrate the default schema, then every tenant in order.
    ///
    /// A default schema failure aborts the run under either policy, since
    /// every tenant reads from it. Under [`MigrationPolicy::FailFast`] the
    /// first tenant failure is returned with `tenant_id` and
    /// `migrated_tenants` metadata attached; tenants migrated before it keep
    /// their changes.
    pub async fn migrate_all(
        &self,
        tenants: &[TenantInfo],
        migrations: &MigrationSet,
    ) -> Result<MigrationReport> {
        let mut report = MigrationReport {
            shared: self.migrate_shared(migrations).await?,
            ..Default::default()
        };

        for tenant in tenants {
            if tenant.is_soft_deleted || tenant.state == TenantState::Deleted {
                report.skipped.push(tenant.tenant_id.clone());
                continue;
            }

            match self.migrate_tenant(tenant, migrations).await {
                Ok(outcome) => report.migrated.push(outcome),
                Err(error) => {
                    warn!(tenant_id = %tenant.tenant_id, code = error.code(), "Tenant migration failed");
                    match self.policy {
                        MigrationPolicy::FailFast => {
                            return Err(error
                                .with_metadata("tenant_id", tenant.tenant_id.as_str())
                                .with_metadata(
                                    "migrated_tenants",
                                    report.migrated_tenants().join(","),
                                ));
                        }
                        MigrationPolicy::ContinueOnError => {
                            report.failed.push(TenantMigrationFailure {
                                tenant_id: tenant.tenant_id.clone(),
                                error,
                            });
                        }
                    }
                }
            }
        }

        info!(
            migrated = report.migrated.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Tenant migrations finished"
        );
        Ok(report)
    }

    /// Migrate one tenant inside its own ambient scope
    pub async fn migrate_tenant(
        &self,
        tenant: &TenantInfo,
        migrations: &MigrationSet,
    ) -> Result<TenantMigration> {
        let context = TenantContext::for_tenant(tenant.clone());
        ambient::with_tenant(context, self.migrate_current(migrations)).await
    }

    /// Migrate the default schema holding unscoped entities.
    ///
    /// Returns `None` unless isolation is schema per tenant; in the other
    /// modes unscoped entities share the tenant's target.
    pub async fn migrate_shared(&self, migrations: &MigrationSet) -> Result<Option<SharedMigration>> {
        if self.engine.config().mode() != IsolationMode::SchemaPerTenant {
            return Ok(None);
        }

        let storage = self.engine.context_for(None).await?;
        let applied = apply_pending(&storage, migrations, Some(Placement::Shared))
            .await
            .map_err(|e| {
                warn!(target = %storage.target(), code = e.code(), "Default schema migration failed");
                e.with_metadata("target", storage.target().to_string())
            })?;

        info!(target = %storage.target(), applied = applied.len(), "Default schema migrated");
        Ok(Some(SharedMigration {
            target: storage.target().clone(),
            applied,
        }))
    }

    async fn migrate_current(&self, migrations: &MigrationSet) -> Result<TenantMigration> {
        let tenant_id = CurrentTenant::tenant_id().ok_or_else(TenancyError::not_resolved)?;
        let storage = self.engine.context().await?;
        let placement = (self.engine.config().mode() == IsolationMode::SchemaPerTenant)
            .then_some(Placement::Tenant);
        let applied = apply_pending(&storage, migrations, placement).await?;

        info!(
            tenant_id = %tenant_id,
            target = %storage.target(),
            applied = applied.len(),
            "Tenant migrated"
        );
        Ok(TenantMigration {
            tenant_id,
            target: storage.target().clone(),
            applied,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Shared,
    Tenant,
}

/// Steps of `migration` that belong in a target of the given placement.
/// Entities the model does not know stay with the tenant targets.
fn placed(model: &CompiledModel, migration: &Migration, placement: Placement) -> Migration {
    let mut placed = migration.clone();
    placed.steps.retain(|step| {
        let shared = model
            .entity(step.entity())
            .is_some_and(|scope| !scope.is_tenant_scoped());
        shared == (placement == Placement::Shared)
    });
    placed
}

async fn apply_pending(
    storage: &TenantStorageContext<'_>,
    migrations: &MigrationSet,
    placement: Option<Placement>,
) -> Result<Vec<String>> {
    let already = storage.applied_migrations().await?;

    let mut applied = Vec::new();
    for migration in migrations.pending(&already) {
        match placement {
            Some(placement) => {
                let migration = placed(storage.model(), migration, placement);
                storage.apply_migration(&migration).await?;
            }
            None => storage.apply_migration(migration).await?,
        }
        applied.push(migration.id.clone());
    }
    Ok(applied)
}
