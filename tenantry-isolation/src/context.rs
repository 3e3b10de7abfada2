//! Tenant Storage Context
//!
//! A unit of work bound to one tenant and one storage target. Queries get
//! the compiled tenant filter; writes are buffered and go through the
//! write guard on [`TenantStorageContext::save_changes`].

use crate::backend::{Change, ChangeOp, StorageBackend, StorageTarget};
use crate::engine::IsolationEngine;
use crate::entity::{Entity, Record};
use crate::guard::WriteGuard;
use crate::migration::Migration;
use crate::model::{CompiledModel, EntityScope};
use crate::predicate::Expr;
use serde_json::Value;
use std::sync::Arc;
use tenantry_core::{Result, TenancyError};
use tracing::debug;

/// Storage context for one tenant
pub struct TenantStorageContext<'a> {
    engine: &'a IsolationEngine,
    tenant_id: Option<String>,
    target: StorageTarget,
    model: Arc<CompiledModel>,
    backend: Arc<dyn StorageBackend>,
    pending: Vec<Change>,
}

impl<'a> TenantStorageContext<'a> {
    pub(crate) fn new(
        engine: &'a IsolationEngine,
        tenant_id: Option<String>,
        target: StorageTarget,
        model: Arc<CompiledModel>,
        backend: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            engine,
            tenant_id,
            target,
            model,
            backend,
            pending: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Target of tenant-scoped entities
    pub fn target(&self) -> &StorageTarget {
        &self.target
    }

    pub fn model(&self) -> &CompiledModel {
        &self.model
    }

    pub fn pending_changes(&self) -> &[Change] {
        &self.pending
    }

    pub fn discard_changes(&mut self) {
        self.pending.clear();
    }

    fn scope(&self, entity: &str) -> Result<&EntityScope> {
        self.model.entity(entity).ok_or_else(|| {
            TenancyError::configuration(format!("Entity '{}' is not registered", entity))
        })
    }

    fn target_for(&self, scope: &EntityScope) -> StorageTarget {
        StorageTarget {
            connection: self.target.connection.clone(),
            schema: scope.schema().map(str::to_string),
        }
    }

    /// The filter a query on `entity` runs with: the compiled filter ANDed
    /// with `filter`, tenant placeholders bound.
    pub fn effective_filter(&self, entity: &str, filter: Option<&Expr>) -> Result<Option<Expr>> {
        let scope = self.scope(entity)?;
        let combined = match (scope.filter(), filter) {
            (Some(base), Some(extra)) => Some(base.clone().and_rebound(extra)),
            (Some(base), None) => Some(base.clone()),
            (None, Some(extra)) => Some(extra.clone()),
            (None, None) => None,
        };
        Ok(combined.map(|f| f.bind_tenant(self.tenant_id())))
    }

    /// Rows of `entity` visible to this tenant
    pub async fn query(&self, entity: &str, filter: Option<Expr>) -> Result<Vec<Record>> {
        let scope = self.scope(entity)?;
        let effective = self.effective_filter(entity, filter.as_ref())?;
        let mut rows = self
            .backend
            .scan(&self.target_for(scope), entity, effective.as_ref())
            .await?;

        if scope.is_shadow() {
            if let Some(field) = scope.tenant_field() {
                for row in &mut rows {
                    row.remove(field);
                }
            }
        }

        debug!(entity, rows = rows.len(), tenant_id = ?self.tenant_id, "Query");
        Ok(rows)
    }

    /// Typed query
    pub async fn query_as<T: Entity>(&self, filter: Option<Expr>) -> Result<Vec<T>> {
        let descriptor = T::descriptor();
        self.query(descriptor.name(), filter)
            .await?
            .into_iter()
            .map(|row| {
                serde_json::from_value(Value::Object(row)).map_err(|e| {
                    TenancyError::storage(format!("Cannot decode {}: {}", descriptor.name(), e))
                })
            })
            .collect()
    }

    fn push(&mut self, entity: &str, op: ChangeOp) -> Result<()> {
        let scope = self.scope(entity)?;
        let change = Change {
            target: self.target_for(scope),
            entity: entity.to_string(),
            key_field: scope.key().map(str::to_string),
            op,
            owner: None,
        };
        self.pending.push(change);
        Ok(())
    }

    fn key_of(&self, entity: &str, record: &Record) -> Result<Value> {
        let scope = self.scope(entity)?;
        let key_field = scope.key().ok_or_else(|| {
            TenancyError::configuration(format!("Entity '{}' has no key", entity))
        })?;
        record
            .get(key_field)
            .filter(|k| !k.is_null())
            .cloned()
            .ok_or_else(|| TenancyError::storage(format!("{} record has no '{}'", entity, key_field)))
    }

    pub fn insert(&mut self, entity: &str, record: Record) -> Result<()> {
        self.push(entity, ChangeOp::Insert(record))
    }

    pub fn update(&mut self, entity: &str, record: Record) -> Result<()> {
        let key = self.key_of(entity, &record)?;
        self.push(entity, ChangeOp::Update { key, record })
    }

    pub fn delete(&mut self, entity: &str, key: impl Into<Value>) -> Result<()> {
        self.scope(entity)?
            .key()
            .ok_or_else(|| TenancyError::configuration(format!("Entity '{}' has no key", entity)))?;
        self.push(entity, ChangeOp::Delete { key: key.into() })
    }

    pub fn insert_entity<T: Entity>(&mut self, value: &T) -> Result<()> {
        let record = to_record(value)?;
        self.insert(T::descriptor().name(), record)
    }

    pub fn update_entity<T: Entity>(&mut self, value: &T) -> Result<()> {
        let record = to_record(value)?;
        self.update(T::descriptor().name(), record)
    }

    /// Run the write guard and commit every pending change atomically.
    ///
    /// The pending batch is consumed either way; a rejected batch leaves
    /// storage untouched.
    pub async fn save_changes(&mut self) -> Result<usize> {
        let mut changes = std::mem::take(&mut self.pending);
        if changes.is_empty() {
            return Ok(0);
        }

        let options = self.engine.config().options();
        if options.enable_write_enforcement {
            WriteGuard::new(&self.model, options)
                .check(&mut changes, self.tenant_id(), self.backend.as_ref())
                .await?;
        }

        self.backend.commit(&changes).await?;
        debug!(changes = changes.len(), tenant_id = ?self.tenant_id, "Saved changes");
        Ok(changes.len())
    }

    pub async fn applied_migrations(&self) -> Result<Vec<String>> {
        self.backend.applied_migrations(&self.target).await
    }

    pub async fn apply_migration(&self, migration: &Migration) -> Result<()> {
        self.backend.apply_migration(&self.target, migration).await
    }
}

fn to_record<T: Entity>(value: &T) -> Result<Record> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TenancyError::storage(format!(
            "{} does not serialize to an object",
            T::descriptor().name()
        ))),
        Err(e) => Err(TenancyError::storage(e.to_string())),
    }
}
