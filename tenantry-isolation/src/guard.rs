//! Write Guard
//!
//! Inspects a pending batch before it is committed. Inserts into scoped
//! entities are stamped with the current tenant; updates and deletes must
//! target rows the current tenant already owns. One violation rejects the
//! whole batch.
//!
//! The persisted owner is read here for an early rejection, and every
//! update and delete also carries an [`OwnerCheck`] that the backend
//! re-verifies while committing, so a row replaced after the read is still
//! protected.

use crate::backend::{Change, ChangeOp, OwnerCheck, StorageBackend};
use crate::entity::Record;
use crate::model::CompiledModel;
use crate::options::IsolationOptions;
use serde_json::Value;
use tenantry_core::{Result, TenancyError};
use tracing::warn;

/// Write guard
pub struct WriteGuard<'a> {
    model: &'a CompiledModel,
    options: &'a IsolationOptions,
}

impl<'a> WriteGuard<'a> {
    pub fn new(model: &'a CompiledModel, options: &'a IsolationOptions) -> Self {
        Self { model, options }
    }

    /// Check (and stamp) every change in the batch
    pub async fn check(
        &self,
        changes: &mut [Change],
        tenant_id: Option<&str>,
        backend: &dyn StorageBackend,
    ) -> Result<()> {
        for change in changes.iter_mut() {
            let kind = change.kind();
            let Change {
                target,
                entity,
                key_field,
                op,
                owner,
            } = change;

            let Some(field) = self
                .model
                .entity(entity)
                .filter(|scope| scope.is_tenant_scoped())
                .and_then(|scope| scope.tenant_field())
            else {
                continue;
            };

            let tenant = match tenant_id {
                Some(tenant) => tenant,
                None if self.options.require_tenant_for_writes => {
                    warn!(entity = %entity, kind, "Write without tenant rejected");
                    return Err(TenancyError::not_resolved()
                        .with_metadata("entity", entity.as_str())
                        .with_metadata("operation", kind));
                }
                None => continue,
            };

            let check = OwnerCheck::new(field, tenant);
            let key = match op {
                ChangeOp::Insert(record) => {
                    record.insert(field.to_string(), Value::String(tenant.to_string()));
                    continue;
                }
                ChangeOp::Update { key, record } => {
                    if let Some(value) = record.get(field) {
                        let mut claimed = Record::new();
                        claimed.insert(field.to_string(), value.clone());
                        reject_foreign(&check, entity, &claimed)?;
                    }
                    key
                }
                ChangeOp::Delete { key } => key,
            };

            let key_field = key_field.as_deref().ok_or_else(|| {
                TenancyError::storage(format!("{} has no key; {} is not supported", entity, kind))
            })?;
            let persisted = backend.find(target, entity, key_field, key).await?;
            if let Some(row) = persisted {
                reject_foreign(&check, entity, &row)?;
            }
            *owner = Some(check);
        }
        Ok(())
    }
}

fn reject_foreign(check: &OwnerCheck, entity: &str, row: &Record) -> Result<()> {
    check.verify(entity, row).inspect_err(|e| {
        warn!(
            entity,
            expected = %check.tenant_id,
            actual = e.metadata().get("actual_tenant").map(String::as_str).unwrap_or("<none>"),
            "Cross-tenant write rejected"
        );
    })
}
