//! Database Per Tenant
//!
//! Resolves a tenant's connection string and hands out one backend per
//! connection through an injected [`ConnectionFactory`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let factory = Arc::new(MyPoolFactory::new());
//! let manager = TenantConnectionManager::new(factory);
//!
//! let backend = manager.get_backend("postgres://db/tenant_acme").await?;
//! ```

use crate::backend::{InMemoryBackend, StorageBackend};
use crate::options::{IsolationConfig, TargetResolverFn};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tenantry_core::{Result, TenancyError};
use tokio::sync::RwLock;
use tracing::debug;

/// Connection string resolver
#[derive(Clone, Default)]
pub struct ConnectionResolver {
    format: Option<String>,
    resolver: Option<TargetResolverFn>,
}

impl ConnectionResolver {
    pub fn from_config(config: &IsolationConfig) -> Self {
        Self {
            format: config.options().connection_string_format.clone(),
            resolver: config.connection_resolver().cloned(),
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

    pub fn is_configured(&self) -> bool {
        self.format.is_some() || self.resolver.is_some()
    }

    /// Connection string for a tenant.
    ///
    /// There is no shared fallback: a missing tenant or an unmapped tenant
    /// is a configuration error.
    pub fn resolve(&self, tenant_id: Option<&str>) -> Result<String> {
        let tenant_id = tenant_id.ok_or_else(|| {
            TenancyError::configuration("No tenant resolved; cannot select a tenant database")
        })?;

        let connection = if let Some(resolver) = &self.resolver {
            resolver(tenant_id)
        } else {
            self.format
                .as_ref()
                .map(|format| format.replace("{id}", tenant_id))
        };

        connection
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                TenancyError::configuration(format!(
                    "No connection string configured for tenant '{}'",
                    tenant_id
                ))
                .with_metadata("tenant_id", tenant_id)
            })
    }
}

impl std::fmt::Debug for ConnectionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionResolver")
            .field("format", &self.format)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

/// Opens a backend for a connection string
///
/// Users implement this with their pool of choice.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, connection_string: &str) -> Result<Arc<dyn StorageBackend>>;
}

/// Caches one backend per connection string
pub struct TenantConnectionManager {
    factory: Arc<dyn ConnectionFactory>,
    cache: RwLock<HashMap<String, Arc<dyn StorageBackend>>>,
}

impl TenantConnectionManager {
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Cached backend for a connection, connecting on first use
    pub async fn get_backend(&self, connection_string: &str) -> Result<Arc<dyn StorageBackend>> {
        {
            let cache = self.cache.read().await;
            if let Some(backend) = cache.get(connection_string) {
                return Ok(Arc::clone(backend));
            }
        }

        let mut cache = self.cache.write().await;
        if let Some(backend) = cache.get(connection_string) {
            return Ok(Arc::clone(backend));
        }

        debug!("Opening tenant connection");
        let backend = self.factory.connect(connection_string).await?;
        cache.insert(connection_string.to_string(), Arc::clone(&backend));
        Ok(backend)
    }

    pub async fn invalidate(&self, connection_string: &str) {
        self.cache.write().await.remove(connection_string);
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// Factory creating an [`InMemoryBackend`] per connection string
#[derive(Debug, Default)]
pub struct InMemoryConnectionFactory {
    backends: parking_lot::Mutex<HashMap<String, Arc<InMemoryBackend>>>,
}

impl InMemoryConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend created for a connection string, if any
    pub fn backend(&self, connection_string: &str) -> Option<Arc<InMemoryBackend>> {
        self.backends.lock().get(connection_string).cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.backends.lock().len()
    }
}

#[async_trait]
impl ConnectionFactory for InMemoryConnectionFactory {
    async fn connect(&self, connection_string: &str) -> Result<Arc<dyn StorageBackend>> {
        let backend: Arc<dyn StorageBackend> = self
            .backends
            .lock()
            .entry(connection_string.to_string())
            .or_default()
            .clone();
        Ok(backend)
    }
}
