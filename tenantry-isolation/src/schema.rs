//! Schema Per Tenant
//!
//! Maps tenant ids onto schema names. Names come from a resolver function
//! or a `{id}` template, are sanitized (`-` and `.` become `_`) and must be
//! plain SQL identifiers.

use crate::options::{IsolationConfig, TargetResolverFn};
use once_cell::sync::Lazy;
use regex::Regex;
use tenantry_core::{Result, TenancyError};

static SCHEMA_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap());

/// Replace characters that are common in tenant ids but invalid in identifiers
pub fn sanitize_schema_name(raw: &str) -> String {
    raw.trim().replace(['-', '.'], "_")
}

/// Check a schema name is a plain identifier
pub fn validate_schema_name(name: &str) -> Result<()> {
    if SCHEMA_IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(TenancyError::configuration(format!(
            "Invalid schema name '{}'",
            name
        )))
    }
}

/// Schema name resolver
#[derive(Clone)]
pub struct SchemaNameResolver {
    format: Option<String>,
    resolver: Option<TargetResolverFn>,
    default_schema: String,
}

impl SchemaNameResolver {
    pub fn new(default_schema: impl Into<String>) -> Self {
        Self {
            format: None,
            resolver: None,
            default_schema: default_schema.into(),
        }
    }

    pub fn from_config(config: &IsolationConfig) -> Self {
        let options = config.options();
        Self {
            format: options.schema_name_format.clone(),
            resolver: config.schema_resolver().cloned(),
            default_schema: options.default_schema.clone(),
        }
    }

    /// Set the `{id}` template
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_resolver(mut self, resolver: TargetResolverFn) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Whether per-tenant names can be produced at all
    pub fn is_configured(&self) -> bool {
        self.format.is_some() || self.resolver.is_some()
    }

    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    /// Schema for a tenant, or the default schema without one.
    ///
    /// The resolver function wins over the template.
    pub fn resolve(&self, tenant_id: Option<&str>) -> Result<String> {
        let Some(tenant_id) = tenant_id else {
            return Ok(self.default_schema.clone());
        };

        let raw = if let Some(resolver) = &self.resolver {
            resolver(tenant_id).ok_or_else(|| {
                TenancyError::configuration(format!(
                    "No schema configured for tenant '{}'",
                    tenant_id
                ))
                .with_metadata("tenant_id", tenant_id)
            })?
        } else if let Some(format) = &self.format {
            format.replace("{id}", tenant_id)
        } else {
            return Err(TenancyError::configuration(
                "Schema-per-tenant isolation needs a schema resolver or name format",
            ));
        };

        let name = sanitize_schema_name(&raw);
        validate_schema_name(&name)?;
        Ok(name)
    }
}

impl std::fmt::Debug for SchemaNameResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaNameResolver")
            .field("format", &self.format)
            .field("resolver", &self.resolver.is_some())
            .field("default_schema", &self.default_schema)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tenantry_core::TenancyErrorKind;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_schema_name("acme-corp.eu"), "acme_corp_eu");
        assert_eq!(sanitize_schema_name(" tenant_1 "), "tenant_1");
    }

    #[test]
    fn test_validate() {
        assert!(validate_schema_name("tenant_acme").is_ok());
        assert!(validate_schema_name("_private").is_ok());
        assert!(validate_schema_name("1tenant").is_err());
        assert!(validate_schema_name("tenant;drop").is_err());
        assert!(validate_schema_name("").is_err());
        assert!(validate_schema_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_format() {
        let resolver = SchemaNameResolver::new("public").with_format("tenant_{id}");
        assert_eq!(resolver.resolve(Some("acme-corp")).unwrap(), "tenant_acme_corp");
        assert_eq!(resolver.resolve(None).unwrap(), "public");
    }

    #[test]
    fn test_resolver_wins_over_format() {
        let resolver = SchemaNameResolver::new("public")
            .with_format("tenant_{id}")
            .with_resolver(Arc::new(|id: &str| {
                (id == "acme").then(|| "acme_schema".to_string())
            }));

        assert_eq!(resolver.resolve(Some("acme")).unwrap(), "acme_schema");
        let err = resolver.resolve(Some("globex")).unwrap_err();
        assert_eq!(err.kind(), TenancyErrorKind::Configuration);
    }

    #[test]
    fn test_rejects_unsafe_names() {
        let resolver = SchemaNameResolver::new("public").with_format("{id}");
        assert!(resolver.resolve(Some("acme; DROP SCHEMA public")).is_err());
    }

    #[test]
    fn test_unconfigured() {
        let resolver = SchemaNameResolver::new("public");
        assert!(!resolver.is_configured());
        assert!(resolver.resolve(Some("acme")).is_err());
    }
}
