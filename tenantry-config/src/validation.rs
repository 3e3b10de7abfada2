// Configuration validation

use crate::settings::TenancySettings;
use crate::{ConfigError, Result};
use std::fmt::Display;
use tenantry_core::{ResolutionSource, ValidationMode};
use tenantry_isolation::{IsolationMode, validate_schema_name};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Configuration validator with rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a list has at least one entry and no blank entries
    pub fn not_empty_list(values: &[String], field: &str) -> Result<()> {
        if values.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} needs at least one entry",
                field
            )));
        }
        for value in values {
            Self::not_empty(value, field)?;
        }
        Ok(())
    }

    /// Validate that a number is within range
    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between {} and {}",
                field, min, max
            )));
        }
        Ok(())
    }

    /// Validate that a template carries a placeholder
    pub fn has_placeholder(template: &str, placeholder: &str, field: &str) -> Result<()> {
        if !template.contains(placeholder) {
            return Err(ConfigError::ValidationError(format!(
                "{} must contain {}",
                field, placeholder
            )));
        }
        Ok(())
    }

    /// Validate that an optional template is present
    pub fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
        value.ok_or_else(|| ConfigError::ValidationError(format!("{} is required", field)))
    }
}

impl Validate for TenancySettings {
    fn validate(&self) -> Result<()> {
        let resolution = &self.resolution;
        if resolution.providers.contains(&ResolutionSource::Header) {
            ConfigValidator::not_empty_list(&resolution.header_names, "resolution.header_names")?;
        }
        ConfigValidator::not_empty(&resolution.claim_type, "resolution.claim_type")?;
        ConfigValidator::not_empty(&resolution.route_parameter, "resolution.route_parameter")?;
        ConfigValidator::not_empty(&resolution.query_parameter, "resolution.query_parameter")?;
        ConfigValidator::in_range(resolution.timeout_ms, 1, 600_000, "resolution.timeout_ms")?;
        if let Some(fallback) = &resolution.fallback_tenant {
            ConfigValidator::not_empty(fallback.tenant_id(), "resolution.fallback_tenant")?;
        }

        if self.validation.mode == ValidationMode::Repository {
            ConfigValidator::in_range(
                self.validation.cache_ttl_secs,
                1,
                u64::MAX,
                "validation.cache_ttl_secs",
            )?;
        }

        let isolation = &self.isolation;
        ConfigValidator::not_empty(&isolation.tenant_field, "isolation.tenant_field")?;
        validate_schema_name(&isolation.default_schema)
            .map_err(|e| ConfigError::ValidationError(format!("isolation.default_schema: {}", e)))?;

        if isolation.mode == IsolationMode::SchemaPerTenant {
            ConfigValidator::required(
                isolation.schema_name_format.as_deref(),
                "isolation.schema_name_format",
            )?;
        }
        if let Some(format) = &isolation.schema_name_format {
            ConfigValidator::has_placeholder(format, "{id}", "isolation.schema_name_format")?;
        }

        if isolation.mode == IsolationMode::DatabasePerTenant {
            ConfigValidator::required(
                isolation.connection_string_format.as_deref(),
                "isolation.connection_string_format",
            )?;
        }
        if let Some(format) = &isolation.connection_string_format {
            ConfigValidator::has_placeholder(
                format,
                "{id}",
                "isolation.connection_string_format",
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantry_core::FallbackTenant;

    #[test]
    fn test_rules() {
        assert!(ConfigValidator::not_empty("value", "field").is_ok());
        assert!(ConfigValidator::not_empty("  ", "field").is_err());
        assert!(ConfigValidator::in_range(5, 1, 10, "field").is_ok());
        assert!(ConfigValidator::in_range(0, 1, 10, "field").is_err());
        assert!(ConfigValidator::has_placeholder("t_{id}", "{id}", "field").is_ok());
        assert!(ConfigValidator::has_placeholder("t_", "{id}", "field").is_err());
        assert!(ConfigValidator::not_empty_list(&[], "field").is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(TenancySettings::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_settings() {
        let mut settings = TenancySettings::default();
        settings.resolution.header_names.clear();
        assert!(settings.validate().is_err());

        let mut settings = TenancySettings::default();
        settings.resolution.timeout_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = TenancySettings::default();
        settings.validation.mode = ValidationMode::Repository;
        settings.validation.cache_ttl_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = TenancySettings::default();
        settings.resolution.fallback_tenant = Some(FallbackTenant::Id(String::new()));
        assert!(settings.validate().is_err());

        let mut settings = TenancySettings::default();
        settings.isolation.default_schema = "bad schema".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_isolation_templates() {
        let mut settings = TenancySettings::default();
        settings.isolation.mode = IsolationMode::SchemaPerTenant;
        assert!(settings.validate().is_err());

        settings.isolation.schema_name_format = Some("tenant".to_string());
        assert!(settings.validate().is_err());

        settings.isolation.schema_name_format = Some("tenant_{id}".to_string());
        assert!(settings.validate().is_ok());

        settings.isolation.mode = IsolationMode::DatabasePerTenant;
        assert!(settings.validate().is_err());

        settings.isolation.connection_string_format = Some("postgres://db/{id}".to_string());
        assert!(settings.validate().is_ok());
    }
}
