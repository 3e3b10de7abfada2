//! Compiled Models
//!
//! Applies the isolation rules to the registered entities once per storage
//! target. Compilation decides for every entity whether it is tenant
//! scoped, where its tenant column lives, which filter its queries get,
//! and which schema it belongs to.

use crate::entity::{EntityDescriptor, is_identity_entity};
use crate::options::{IsolationConfig, IsolationMode};
use crate::predicate::Expr;
use serde::Serialize;
use std::collections::HashMap;
use tenantry_core::{Result, TenancyError};
use tracing::debug;

/// Why an entity is not tenant scoped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exemption {
    /// Embedded in another entity
    Owned,
    /// No primary key
    Keyless,
    /// Shared across tenants
    Global,
    /// No tenant column in a non row-level mode
    NoTenantField,
}

/// Compiled isolation rules for one entity
#[derive(Debug, Clone)]
pub struct EntityScope {
    name: String,
    key: Option<String>,
    exemption: Option<Exemption>,
    tenant_field: Option<String>,
    shadow: bool,
    filter: Option<Expr>,
    schema: Option<String>,
}

impl EntityScope {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn exemption(&self) -> Option<Exemption> {
        self.exemption
    }

    pub fn is_tenant_scoped(&self) -> bool {
        self.exemption.is_none()
    }

    /// Tenant column, present only on scoped entities
    pub fn tenant_field(&self) -> Option<&str> {
        self.tenant_field.as_deref()
    }

    /// The tenant column is tracked outside the entity's own fields
    pub fn is_shadow(&self) -> bool {
        self.shadow
    }

    /// Query filter with [`Expr::CurrentTenant`] left unbound
    pub fn filter(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }
}

/// Cache key for compiled models
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelCacheKey {
    pub mode: IsolationMode,
    pub schema: Option<String>,
}

/// Compiled model
#[derive(Debug)]
pub struct CompiledModel {
    key: ModelCacheKey,
    entities: HashMap<String, EntityScope>,
}

impl CompiledModel {
    /// Compile the entities for one cache key.
    ///
    /// Fails when a scoped entity lacks the tenant column, shadow fields are
    /// disabled, and the mode is row-level; or when an entity is registered
    /// twice.
    pub fn compile(
        config: &IsolationConfig,
        entities: &[EntityDescriptor],
        key: ModelCacheKey,
    ) -> Result<Self> {
        let options = config.options();
        let mode = config.mode();
        let mut scopes = HashMap::with_capacity(entities.len());

        for descriptor in entities {
            let name = descriptor.name();
            if scopes.contains_key(name) {
                return Err(TenancyError::configuration(format!(
                    "Entity '{}' is registered more than once",
                    name
                )));
            }

            let mut exemption = classify(config, descriptor);
            let mut tenant_field = None;
            let mut shadow = false;

            if exemption.is_none() {
                if descriptor.has_field(&options.tenant_field) {
                    tenant_field = Some(options.tenant_field.clone());
                } else if options.allow_shadow_field {
                    tenant_field = Some(options.tenant_field.clone());
                    shadow = true;
                } else if mode.is_row_level() {
                    return Err(TenancyError::configuration(format!(
                        "Entity '{}' has no '{}' field and shadow fields are disabled",
                        name, options.tenant_field
                    ))
                    .with_metadata("entity", name));
                } else {
                    exemption = Some(Exemption::NoTenantField);
                }
            }

            let filter = match (&tenant_field, descriptor.filter()) {
                (Some(field), existing) if mode.is_row_level() && options.enable_query_filter => {
                    let tenant = Expr::field(field.as_str()).eq(Expr::current_tenant());
                    Some(match existing {
                        Some(existing) => tenant.and_rebound(existing),
                        None => tenant,
                    })
                }
                (_, existing) => existing.cloned(),
            };

            let schema = match mode {
                IsolationMode::SchemaPerTenant if exemption.is_none() => key.schema.clone(),
                IsolationMode::SchemaPerTenant => Some(options.default_schema.clone()),
                _ => None,
            };

            scopes.insert(
                name.to_string(),
                EntityScope {
                    name: name.to_string(),
                    key: descriptor.key().map(str::to_string),
                    exemption,
                    tenant_field,
                    shadow,
                    filter,
                    schema,
                },
            );
        }

        debug!(
            mode = %mode,
            schema = ?key.schema,
            entities = scopes.len(),
            "Compiled isolation model"
        );
        Ok(Self {
            key,
            entities: scopes,
        })
    }

    pub fn key(&self) -> &ModelCacheKey {
        &self.key
    }

    pub fn entity(&self, name: &str) -> Option<&EntityScope> {
        self.entities.get(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityScope> {
        self.entities.values()
    }

    pub fn scoped_count(&self) -> usize {
        self.entities.values().filter(|e| e.is_tenant_scoped()).count()
    }
}

fn classify(config: &IsolationConfig, descriptor: &EntityDescriptor) -> Option<Exemption> {
    if descriptor.is_owned() {
        return Some(Exemption::Owned);
    }
    if descriptor.key().is_none() {
        return Some(Exemption::Keyless);
    }

    let global = descriptor.is_global()
        || descriptor
            .type_id()
            .is_some_and(|id| config.is_global_type(id))
        || config.is_global_name(descriptor.name())
        || (config.options().treat_identity_as_global && is_identity_entity(descriptor.name()));

    global.then_some(Exemption::Global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::IsolationOptions;
    use tenantry_core::TenancyErrorKind;

    fn shared_key() -> ModelCacheKey {
        ModelCacheKey {
            mode: IsolationMode::SharedDatabase,
            schema: None,
        }
    }

    fn order() -> EntityDescriptor {
        EntityDescriptor::new("Order").with_fields(["id", "tenant_id", "total"])
    }

    #[test]
    fn test_scoped_entity_gets_filter() {
        let model =
            CompiledModel::compile(&IsolationConfig::default(), &[order()], shared_key()).unwrap();
        let scope = model.entity("Order").unwrap();

        assert!(scope.is_tenant_scoped());
        assert_eq!(scope.tenant_field(), Some("tenant_id"));
        assert!(!scope.is_shadow());
        assert!(scope.filter().unwrap().references_current_tenant());
        assert!(scope.schema().is_none());
    }

    #[test]
    fn test_exemptions() {
        struct Country;
        let config = IsolationConfig::new(IsolationOptions {
            treat_identity_as_global: true,
            ..Default::default()
        })
        .with_global_type::<Country>()
        .with_global_entity("Currency");

        let entities = [
            EntityDescriptor::new("Address").owned(),
            EntityDescriptor::new("SalesView").keyless(),
            EntityDescriptor::new("Setting").global(),
            EntityDescriptor::of::<Country>("Country"),
            EntityDescriptor::new("Currency"),
            EntityDescriptor::new("IdentityUser"),
        ];
        let model = CompiledModel::compile(&config, &entities, shared_key()).unwrap();

        assert_eq!(model.entity("Address").unwrap().exemption(), Some(Exemption::Owned));
        assert_eq!(model.entity("SalesView").unwrap().exemption(), Some(Exemption::Keyless));
        for name in ["Setting", "Country", "Currency", "IdentityUser"] {
            let scope = model.entity(name).unwrap();
            assert_eq!(scope.exemption(), Some(Exemption::Global), "{}", name);
            assert!(scope.filter().is_none());
            assert!(scope.tenant_field().is_none());
        }
        assert_eq!(model.scoped_count(), 0);
    }

    #[test]
    fn test_shadow_field() {
        let entity = EntityDescriptor::new("Note").with_fields(["id", "body"]);
        let model =
            CompiledModel::compile(&IsolationConfig::default(), &[entity], shared_key()).unwrap();
        let scope = model.entity("Note").unwrap();
        assert!(scope.is_shadow());
        assert_eq!(scope.tenant_field(), Some("tenant_id"));
    }

    #[test]
    fn test_missing_field_fails_in_shared_mode() {
        let config = IsolationConfig::new(IsolationOptions {
            allow_shadow_field: false,
            ..Default::default()
        });
        let entity = EntityDescriptor::new("Note").with_fields(["id", "body"]);
        let err = CompiledModel::compile(&config, &[entity], shared_key()).unwrap_err();
        assert_eq!(err.kind(), TenancyErrorKind::Configuration);
        assert_eq!(err.metadata().get("entity").map(String::as_str), Some("Note"));
    }

    #[test]
    fn test_missing_field_unscoped_in_schema_mode() {
        let config = IsolationConfig::new(IsolationOptions {
            mode: IsolationMode::SchemaPerTenant,
            allow_shadow_field: false,
            ..Default::default()
        });
        let entity = EntityDescriptor::new("Note").with_fields(["id", "body"]);
        let key = ModelCacheKey {
            mode: IsolationMode::SchemaPerTenant,
            schema: Some("tenant_acme".to_string()),
        };
        let model = CompiledModel::compile(&config, &[entity], key).unwrap();
        let scope = model.entity("Note").unwrap();
        assert_eq!(scope.exemption(), Some(Exemption::NoTenantField));
        assert_eq!(scope.schema(), Some("public"));
    }

    #[test]
    fn test_schema_assignment() {
        let config = IsolationConfig::default().with_mode(IsolationMode::SchemaPerTenant);
        let key = ModelCacheKey {
            mode: IsolationMode::SchemaPerTenant,
            schema: Some("tenant_acme".to_string()),
        };
        let entities = [order(), EntityDescriptor::new("Country").global()];
        let model = CompiledModel::compile(&config, &entities, key).unwrap();

        assert_eq!(model.entity("Order").unwrap().schema(), Some("tenant_acme"));
        assert_eq!(model.entity("Country").unwrap().schema(), Some("public"));
        // Schema isolation does not install row filters
        assert!(model.entity("Order").unwrap().filter().is_none());
    }

    #[test]
    fn test_existing_filter_is_combined() {
        let entity = order().with_filter(Expr::field_of("o", "deleted").eq(Expr::value(false)));
        let model =
            CompiledModel::compile(&IsolationConfig::default(), &[entity], shared_key()).unwrap();
        let filter = model.entity("Order").unwrap().filter().unwrap();

        assert!(filter.references_current_tenant());
        assert_eq!(filter.parameters().len(), 1);
    }

    #[test]
    fn test_duplicate_registration() {
        let result =
            CompiledModel::compile(&IsolationConfig::default(), &[order(), order()], shared_key());
        assert!(result.is_err());
    }
}
