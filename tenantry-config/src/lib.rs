// Configuration loading for Tenantry
//
// Tenancy settings come from defaults, then files (JSON, TOML, `.env`), then
// `TENANTRY_` environment variables, where `__` separates nesting levels:
//
//     TENANTRY_RESOLUTION__USE_CONSENSUS=true
//     TENANTRY_ISOLATION__MODE=schema_per_tenant
//     TENANTRY_ISOLATION__SCHEMA_NAME_FORMAT=tenant_{id}

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::{DEFAULT_PREFIX, EnvLoader, NESTING_SEPARATOR};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{SettingsBuilder, TenancySettings, merge};
pub use validation::{ConfigValidator, Validate};

use std::path::Path;

/// Load settings from an optional file followed by the process environment
pub fn load(path: Option<&Path>) -> Result<TenancySettings> {
    let mut builder = TenancySettings::builder();
    if let Some(path) = path {
        builder = builder.add_file(path);
    }
    builder.load_env().build()
}
