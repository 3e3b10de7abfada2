// Layered tenancy settings

use crate::env::{DEFAULT_PREFIX, EnvLoader};
use crate::loader::{ConfigLoader, FileFormat};
use crate::validation::Validate;
use crate::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tenantry_core::{EnforcementOptions, ResolutionOptions, TenancyOptions, ValidationOptions};
use tenantry_isolation::{IsolationConfig, IsolationOptions};
use tracing::debug;

/// Every recognized tenancy option, as read from configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenancySettings {
    pub resolution: ResolutionOptions,
    pub validation: ValidationOptions,
    pub enforcement: EnforcementOptions,
    pub isolation: IsolationOptions,
}

impl TenancySettings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Options for the resolution service and enforcement
    pub fn tenancy_options(&self) -> TenancyOptions {
        self.clone().into()
    }

    /// Isolation configuration; resolver functions are attached afterwards
    pub fn isolation_config(&self) -> IsolationConfig {
        IsolationConfig::from(self.isolation.clone())
    }
}

enum Layer {
    File(PathBuf, Option<FileFormat>),
    Source(Value),
    Dotenv(Option<PathBuf>),
    ProcessEnv,
    Vars(Vec<(String, String)>),
}

/// Builds [`TenancySettings`] from layered sources.
///
/// Layers apply in the order they are added on top of the defaults. Objects
/// merge key by key; any other value replaces what was there.
pub struct SettingsBuilder {
    prefix: String,
    layers: Vec<Layer>,
    validate: bool,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            layers: Vec::new(),
            validate: true,
        }
    }

    /// Environment variable prefix (default `TENANTRY_`)
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Add a configuration file; the format comes from its extension
    pub fn add_file(mut self, path: impl AsRef<Path>) -> Self {
        self.layers
            .push(Layer::File(path.as_ref().to_path_buf(), None));
        self
    }

    /// Add a configuration file with an explicit format
    pub fn add_file_with_format(mut self, path: impl AsRef<Path>, format: FileFormat) -> Self {
        self.layers
            .push(Layer::File(path.as_ref().to_path_buf(), Some(format)));
        self
    }

    /// Add an in-memory source
    pub fn add_source(mut self, source: Value) -> Self {
        self.layers.push(Layer::Source(source));
        self
    }

    /// Overlay prefixed variables from a `.env` file
    pub fn load_dotenv(mut self, path: Option<&Path>) -> Self {
        self.layers
            .push(Layer::Dotenv(path.map(Path::to_path_buf)));
        self
    }

    /// Overlay prefixed variables from the process environment
    pub fn load_env(mut self) -> Self {
        self.layers.push(Layer::ProcessEnv);
        self
    }

    /// Overlay prefixed variables given explicitly
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.layers.push(Layer::Vars(vars));
        self
    }

    /// Skip [`Validate`] on build
    pub fn skip_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn build(self) -> Result<TenancySettings> {
        let env = EnvLoader::new(self.prefix);
        let mut config = serde_json::to_value(TenancySettings::default())
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        for layer in self.layers {
            let overlay = match layer {
                Layer::File(path, format) => {
                    let loader = match format {
                        Some(format) => ConfigLoader::new(format),
                        None => ConfigLoader::auto(&path)?,
                    };
                    let data = loader.load_file(&path)?;
                    debug!(path = %path.display(), format = ?loader.format(), "Loaded tenancy configuration file");
                    if loader.format() == FileFormat::Env {
                        env.overlay(string_entries(&data))
                    } else {
                        data
                    }
                }
                Layer::Source(value) => value,
                Layer::Dotenv(path) => env.load_dotenv(path.as_deref())?,
                Layer::ProcessEnv => env.load(),
                Layer::Vars(vars) => env.overlay(vars),
            };
            merge(&mut config, overlay);
        }

        let settings: TenancySettings = serde_json::from_value(config)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;

        if self.validate {
            settings.validate()?;
        }

        debug!(
            isolation_mode = %settings.isolation.mode,
            validation_mode = ?settings.validation.mode,
            consensus = settings.resolution.use_consensus,
            "Built tenancy settings"
        );

        Ok(settings)
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn string_entries(data: &Value) -> Vec<(String, String)> {
    match data {
        Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

/// Deep-merge `overlay` into `base`
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

impl From<TenancySettings> for TenancyOptions {
    fn from(settings: TenancySettings) -> Self {
        Self {
            resolution: settings.resolution,
            validation: settings.validation,
            enforcement: settings.enforcement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tenantry_isolation::IsolationMode;

    #[test]
    fn test_merge() {
        let mut base = json!({"a": {"b": 1, "c": [1, 2]}, "d": "x"});
        merge(&mut base, json!({"a": {"c": [3]}, "e": true}));
        assert_eq!(base, json!({"a": {"b": 1, "c": [3]}, "d": "x", "e": true}));
    }

    #[test]
    fn test_defaults() {
        let settings = TenancySettings::builder().build().unwrap();
        assert_eq!(settings.isolation, IsolationOptions::default());
        assert_eq!(settings.resolution.header_names, vec!["X-Tenant-ID"]);
    }

    #[test]
    fn test_layer_order() {
        let settings = TenancySettings::builder()
            .add_source(json!({"resolution": {"claim_type": "tid", "timeout_ms": 100}}))
            .with_env_vars([("TENANTRY_RESOLUTION__TIMEOUT_MS", "250")])
            .build()
            .unwrap();

        assert_eq!(settings.resolution.claim_type, "tid");
        assert_eq!(settings.resolution.timeout_ms, 250);
        assert_eq!(settings.resolution.route_parameter, "tenant");
    }

    #[test]
    fn test_validation_on_build() {
        let builder = || {
            TenancySettings::builder()
                .with_env_vars([("TENANTRY_ISOLATION__MODE", "schema_per_tenant")])
        };
        assert!(matches!(
            builder().build(),
            Err(ConfigError::ValidationError(_))
        ));

        let settings = builder().skip_validation().build().unwrap();
        assert_eq!(settings.isolation.mode, IsolationMode::SchemaPerTenant);
    }

    #[test]
    fn test_bad_type() {
        let result = TenancySettings::builder()
            .add_source(json!({"resolution": {"timeout_ms": "soon"}}))
            .build();
        assert!(matches!(result, Err(ConfigError::DeserializationError(_))));
    }

    #[test]
    fn test_options_split() {
        let mut settings = TenancySettings::default();
        settings.resolution.use_consensus = true;
        settings.isolation.mode = IsolationMode::DatabasePerTenant;

        let options = settings.tenancy_options();
        assert!(options.resolution.use_consensus);
        assert_eq!(
            settings.isolation_config().mode(),
            IsolationMode::DatabasePerTenant
        );
    }
}
