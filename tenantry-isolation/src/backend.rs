//! Storage Backends
//!
//! The storage seam: users implement [`StorageBackend`] for their database.
//! [`InMemoryBackend`] is a complete in-process implementation used for
//! tests and local development.

use crate::entity::Record;
use crate::migration::{Migration, MigrationStep};
use crate::predicate::Expr;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tenantry_core::{Result, TenancyError};
use tracing::debug;

/// Physical location of a set of tables
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StorageTarget {
    pub connection: Option<String>,
    pub schema: Option<String>,
}

impl StorageTarget {
    pub fn shared() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }
}

impl fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.connection, &self.schema) {
            (Some(c), Some(s)) => write!(f, "{}/{}", c, s),
            (Some(c), None) => write!(f, "{}", c),
            (None, Some(s)) => write!(f, "{}", s),
            (None, None) => write!(f, "default"),
        }
    }
}

/// Pending write
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOp {
    Insert(Record),
    /// Merge `record` into the row identified by `key`
    Update { key: Value, record: Record },
    Delete { key: Value },
}

/// Owner a persisted row must have for an update or delete to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerCheck {
    pub field: String,
    pub tenant_id: String,
}

impl OwnerCheck {
    pub fn new(field: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            tenant_id: tenant_id.into(),
        }
    }

    /// Fails with `CrossTenantWrite` unless `row` belongs to the tenant
    pub fn verify(&self, entity: &str, row: &Record) -> Result<()> {
        match row.get(&self.field) {
            Some(Value::String(owner)) if *owner == self.tenant_id => Ok(()),
            Some(Value::String(owner)) => Err(TenancyError::cross_tenant_write(
                entity,
                &self.tenant_id,
                owner,
            )),
            Some(Value::Null) | None => Err(TenancyError::cross_tenant_write(
                entity,
                &self.tenant_id,
                "<none>",
            )),
            Some(other) => Err(TenancyError::cross_tenant_write(
                entity,
                &self.tenant_id,
                &other.to_string(),
            )),
        }
    }
}

/// A pending write against one entity
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub target: StorageTarget,
    pub entity: String,
    pub key_field: Option<String>,
    pub op: ChangeOp,
    /// Checked against the stored row inside [`StorageBackend::commit`]
    pub owner: Option<OwnerCheck>,
}

impl Change {
    pub fn kind(&self) -> &'static str {
        match self.op {
            ChangeOp::Insert(_) => "insert",
            ChangeOp::Update { .. } => "update",
            ChangeOp::Delete { .. } => "delete",
        }
    }
}

/// Storage backend trait
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Rows of `entity` matching `filter`
    async fn scan(
        &self,
        target: &StorageTarget,
        entity: &str,
        filter: Option<&Expr>,
    ) -> Result<Vec<Record>>;

    /// Row of `entity` whose `key_field` equals `key`, unfiltered
    async fn find(
        &self,
        target: &StorageTarget,
        entity: &str,
        key_field: &str,
        key: &Value,
    ) -> Result<Option<Record>>;

    /// Apply every change or none of them.
    ///
    /// Updates and deletes carrying an [`OwnerCheck`] must verify it against
    /// the row they modify in the same critical section that writes it.
    async fn commit(&self, changes: &[Change]) -> Result<()>;

    /// Ids of migrations already applied to `target`
    async fn applied_migrations(&self, target: &StorageTarget) -> Result<Vec<String>>;

    /// Apply one migration to `target` and record it as applied
    async fn apply_migration(&self, target: &StorageTarget, migration: &Migration) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
struct TargetState {
    tables: HashMap<String, Vec<Record>>,
    migrations: Vec<String>,
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    targets: RwLock<HashMap<StorageTarget, TargetState>>,
    commits: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw rows, bypassing every filter
    pub fn records(&self, target: &StorageTarget, entity: &str) -> Vec<Record> {
        self.targets
            .read()
            .get(target)
            .and_then(|state| state.tables.get(entity))
            .cloned()
            .unwrap_or_default()
    }

    /// Insert rows directly, bypassing the write path
    pub fn seed<I>(&self, target: &StorageTarget, entity: &str, records: I)
    where
        I: IntoIterator<Item = Record>,
    {
        self.targets
            .write()
            .entry(target.clone())
            .or_default()
            .tables
            .entry(entity.to_string())
            .or_default()
            .extend(records);
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::Relaxed)
    }

    /// Targets that hold any state
    pub fn targets(&self) -> Vec<StorageTarget> {
        self.targets.read().keys().cloned().collect()
    }
}

fn position(rows: &[Record], key_field: &str, key: &Value) -> Option<usize> {
    rows.iter().position(|row| row.get(key_field) == Some(key))
}

fn apply_change(state: &mut TargetState, change: &Change) -> Result<()> {
    let entity = change.entity.as_str();

    if let ChangeOp::Insert(record) = &change.op {
        let rows = state.tables.entry(entity.to_string()).or_default();
        if let Some(key_field) = &change.key_field {
            let key = record
                .get(key_field)
                .filter(|k| !k.is_null())
                .ok_or_else(|| {
                    TenancyError::storage(format!("{} insert is missing key '{}'", entity, key_field))
                })?;
            if position(rows, key_field, key).is_some() {
                return Err(TenancyError::storage(format!(
                    "Duplicate key {} for {}",
                    key, entity
                )));
            }
        }
        rows.push(record.clone());
        return Ok(());
    }

    let key_field = change.key_field.as_deref().ok_or_else(|| {
        TenancyError::storage(format!("{} has no key; {} is not supported", entity, change.kind()))
    })?;
    let rows = state
        .tables
        .get_mut(entity)
        .ok_or_else(|| TenancyError::storage(format!("Unknown entity '{}'", entity)))?;

    let key = match &change.op {
        ChangeOp::Update { key, .. } | ChangeOp::Delete { key } => key,
        ChangeOp::Insert(_) => return Ok(()),
    };
    let index = position(rows, key_field, key)
        .ok_or_else(|| TenancyError::storage(format!("{} {} not found", entity, key)))?;
    if let Some(owner) = &change.owner {
        owner.verify(entity, &rows[index])?;
    }

    match &change.op {
        ChangeOp::Update { record, .. } => {
            for (field, value) in record {
                rows[index].insert(field.clone(), value.clone());
            }
        }
        ChangeOp::Delete { .. } => {
            rows.remove(index);
        }
        ChangeOp::Insert(_) => {}
    }
    Ok(())
}

fn existing(tables: &HashMap<String, Vec<Record>>, entity: &str) -> Result<()> {
    if tables.contains_key(entity) {
        Ok(())
    } else {
        Err(TenancyError::storage(format!(
            "Entity '{}' does not exist",
            entity
        )))
    }
}

fn apply_step(tables: &mut HashMap<String, Vec<Record>>, step: &MigrationStep) -> Result<()> {
    match step {
        MigrationStep::CreateEntity { entity } => {
            tables.entry(entity.clone()).or_default();
        }
        MigrationStep::AddField {
            entity,
            field,
            default,
        } => {
            existing(tables, entity)?;
            for row in tables.get_mut(entity).into_iter().flatten() {
                row.entry(field.clone()).or_insert_with(|| default.clone());
            }
        }
        MigrationStep::RenameField { entity, from, to } => {
            existing(tables, entity)?;
            for row in tables.get_mut(entity).into_iter().flatten() {
                if let Some(value) = row.remove(from) {
                    row.insert(to.clone(), value);
                }
            }
        }
        MigrationStep::DropField { entity, field } => {
            existing(tables, entity)?;
            for row in tables.get_mut(entity).into_iter().flatten() {
                row.remove(field);
            }
        }
        MigrationStep::DropEntity { entity } => {
            tables.remove(entity);
        }
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn scan(
        &self,
        target: &StorageTarget,
        entity: &str,
        filter: Option<&Expr>,
    ) -> Result<Vec<Record>> {
        let targets = self.targets.read();
        let rows = targets
            .get(target)
            .and_then(|state| state.tables.get(entity))
            .map(|rows| {
                rows.iter()
                    .filter(|row| filter.is_none_or(|f| f.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn find(
        &self,
        target: &StorageTarget,
        entity: &str,
        key_field: &str,
        key: &Value,
    ) -> Result<Option<Record>> {
        let targets = self.targets.read();
        Ok(targets
            .get(target)
            .and_then(|state| state.tables.get(entity))
            .and_then(|rows| rows.iter().find(|row| row.get(key_field) == Some(key)))
            .cloned())
    }

    async fn commit(&self, changes: &[Change]) -> Result<()> {
        let mut targets = self.targets.write();
        let mut staged: HashMap<StorageTarget, TargetState> = HashMap::new();

        for change in changes {
            let state = match staged.entry(change.target.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    entry.insert(targets.get(&change.target).cloned().unwrap_or_default())
                }
            };
            apply_change(state, change)?;
        }

        targets.extend(staged);
        self.commits.fetch_add(1, Ordering::Relaxed);
        debug!(changes = changes.len(), "Committed changes");
        Ok(())
    }

    async fn applied_migrations(&self, target: &StorageTarget) -> Result<Vec<String>> {
        Ok(self
            .targets
            .read()
            .get(target)
            .map(|state| state.migrations.clone())
            .unwrap_or_default())
    }

    async fn apply_migration(&self, target: &StorageTarget, migration: &Migration) -> Result<()> {
        let mut targets = self.targets.write();
        let state = targets.entry(target.clone()).or_default();
        if state.migrations.contains(&migration.id) {
            return Ok(());
        }

        let mut tables = state.tables.clone();
        for step in &migration.steps {
            apply_step(&mut tables, step)
                .map_err(|e| e.with_metadata("migration", migration.id.as_str()))?;
        }

        state.tables = tables;
        state.migrations.push(migration.id.clone());
        debug!(migration = %migration.id, target = %target, "Applied migration");
        Ok(())
    }
}
