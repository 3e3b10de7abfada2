//! Isolation Options

use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Where tenant data lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// One database, rows tagged with a tenant column
    #[default]
    SharedDatabase,
    /// One database, a schema per tenant
    SchemaPerTenant,
    /// A database (connection) per tenant
    DatabasePerTenant,
}

impl IsolationMode {
    /// Row-level modes require a tenant column on scoped entities
    pub fn is_row_level(&self) -> bool {
        matches!(self, IsolationMode::SharedDatabase)
    }
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationMode::SharedDatabase => write!(f, "shared_database"),
            IsolationMode::SchemaPerTenant => write!(f, "schema_per_tenant"),
            IsolationMode::DatabasePerTenant => write!(f, "database_per_tenant"),
        }
    }
}

/// Serializable isolation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationOptions {
    pub mode: IsolationMode,

    /// Column carrying the tenant id
    pub tenant_field: String,

    /// Track the tenant column outside the entity's own fields
    pub allow_shadow_field: bool,

    pub enable_query_filter: bool,
    pub enable_write_enforcement: bool,

    /// Reject writes to scoped entities when no tenant is resolved
    pub require_tenant_for_writes: bool,

    /// Schema name template, `{id}` is replaced by the tenant id
    pub schema_name_format: Option<String>,

    /// Connection string template, `{id}` is replaced by the tenant id
    pub connection_string_format: Option<String>,

    /// Schema used for exempt entities and when no tenant is present
    pub default_schema: String,

    /// Entity names shared across tenants
    pub global_entities: Vec<String>,

    /// Treat identity-framework entities as global
    pub treat_identity_as_global: bool,
}

impl Default for IsolationOptions {
    fn default() -> Self {
        Self {
            mode: IsolationMode::SharedDatabase,
            tenant_field: "tenant_id".to_string(),
            allow_shadow_field: true,
            enable_query_filter: true,
            enable_write_enforcement: true,
            require_tenant_for_writes: true,
            schema_name_format: None,
            connection_string_format: None,
            default_schema: "public".to_string(),
            global_entities: Vec::new(),
            treat_identity_as_global: false,
        }
    }
}

/// Maps a tenant id to a schema name or connection string
pub type TargetResolverFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Options plus the non-serializable pieces (resolver functions, global types)
#[derive(Clone, Default)]
pub struct IsolationConfig {
    options: IsolationOptions,
    schema_resolver: Option<TargetResolverFn>,
    connection_resolver: Option<TargetResolverFn>,
    global_types: HashSet<TypeId>,
}

impl IsolationConfig {
    pub fn new(options: IsolationOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: IsolationMode) -> Self {
        self.options.mode = mode;
        self
    }

    pub fn with_schema_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.schema_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_connection_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.connection_resolver = Some(Arc::new(resolver));
        self
    }

    /// Mark a Rust type as shared across tenants
    pub fn with_global_type<T: 'static>(mut self) -> Self {
        self.global_types.insert(TypeId::of::<T>());
        self
    }

    /// Mark an entity name as shared across tenants
    pub fn with_global_entity(mut self, name: impl Into<String>) -> Self {
        self.options.global_entities.push(name.into());
        self
    }

    pub fn options(&self) -> &IsolationOptions {
        &self.options
    }

    pub fn mode(&self) -> IsolationMode {
        self.options.mode
    }

    pub fn schema_resolver(&self) -> Option<&TargetResolverFn> {
        self.schema_resolver.as_ref()
    }

    pub fn connection_resolver(&self) -> Option<&TargetResolverFn> {
        self.connection_resolver.as_ref()
    }

    pub fn is_global_type(&self, type_id: TypeId) -> bool {
        self.global_types.contains(&type_id)
    }

    pub fn is_global_name(&self, name: &str) -> bool {
        self.options
            .global_entities
            .iter()
            .any(|g| g.eq_ignore_ascii_case(name))
    }
}

impl From<IsolationOptions> for IsolationConfig {
    fn from(options: IsolationOptions) -> Self {
        Self::new(options)
    }
}

impl fmt::Debug for IsolationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolationConfig")
            .field("options", &self.options)
            .field("schema_resolver", &self.schema_resolver.is_some())
            .field("connection_resolver", &self.connection_resolver.is_some())
            .field("global_types", &self.global_types.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = IsolationOptions::default();
        assert_eq!(options.mode, IsolationMode::SharedDatabase);
        assert_eq!(options.tenant_field, "tenant_id");
        assert!(options.allow_shadow_field);
        assert!(options.enable_query_filter);
        assert!(options.enable_write_enforcement);
        assert!(options.require_tenant_for_writes);
        assert!(!options.treat_identity_as_global);
    }

    #[test]
    fn test_deserialize_partial() {
        let options: IsolationOptions = serde_json::from_str(
            r#"{"mode": "schema_per_tenant", "schema_name_format": "t_{id}"}"#,
        )
        .unwrap();
        assert_eq!(options.mode, IsolationMode::SchemaPerTenant);
        assert_eq!(options.schema_name_format.as_deref(), Some("t_{id}"));
        assert_eq!(options.default_schema, "public");
    }

    #[test]
    fn test_global_markers() {
        struct Country;
        let config = IsolationConfig::default()
            .with_global_type::<Country>()
            .with_global_entity("Currency");

        assert!(config.is_global_type(TypeId::of::<Country>()));
        assert!(config.is_global_name("currency"));
        assert!(!config.is_global_name("Order"));
    }
}
