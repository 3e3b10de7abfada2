//! Isolation Engine
//!
//! Owns the isolation configuration, the registered entities, the storage
//! backend(s) and the compiled-model cache. Storage contexts are created
//! from it, bound to the ambient tenant or to an explicit one.

use crate::backend::{StorageBackend, StorageTarget};
use crate::connection::{ConnectionFactory, ConnectionResolver, TenantConnectionManager};
use crate::context::TenantStorageContext;
use crate::entity::{Entity, EntityDescriptor};
use crate::model::{CompiledModel, ModelCacheKey};
use crate::options::{IsolationConfig, IsolationMode};
use crate::schema::SchemaNameResolver;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tenantry_core::{CurrentTenant, Result, TenancyError};
use tracing::{debug, info};

enum Backends {
    Shared(Arc<dyn StorageBackend>),
    PerConnection(TenantConnectionManager),
}

/// Isolation engine
pub struct IsolationEngine {
    config: IsolationConfig,
    entities: Vec<EntityDescriptor>,
    backends: Backends,
    schemas: SchemaNameResolver,
    connections: ConnectionResolver,
    models: RwLock<HashMap<ModelCacheKey, Arc<CompiledModel>>>,
}

/// Builder for [`IsolationEngine`]
pub struct IsolationEngineBuilder {
    config: IsolationConfig,
    entities: Vec<EntityDescriptor>,
    backend: Option<Arc<dyn StorageBackend>>,
    factory: Option<Arc<dyn ConnectionFactory>>,
}

impl IsolationEngineBuilder {
    /// Register a typed entity
    pub fn register<T: Entity>(mut self) -> Self {
        self.entities.push(T::descriptor());
        self
    }

    pub fn register_descriptor(mut self, descriptor: EntityDescriptor) -> Self {
        self.entities.push(descriptor);
        self
    }

    /// Backend shared by every target
    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Per-connection backends for database-per-tenant isolation
    pub fn with_connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Validate the configuration and build the engine.
    ///
    /// Every model-level error (missing tenant columns, duplicate entities)
    /// and every missing target mapping surfaces here rather than on first
    /// query.
    pub fn build(self) -> Result<IsolationEngine> {
        let mode = self.config.mode();
        let schemas = SchemaNameResolver::from_config(&self.config);
        let connections = ConnectionResolver::from_config(&self.config);

        match mode {
            IsolationMode::SchemaPerTenant if !schemas.is_configured() => {
                return Err(TenancyError::configuration(
                    "Schema-per-tenant isolation needs a schema resolver or name format",
                ));
            }
            IsolationMode::DatabasePerTenant if !connections.is_configured() => {
                return Err(TenancyError::configuration(
                    "Database-per-tenant isolation needs a connection resolver or string format",
                ));
            }
            _ => {}
        }

        let backends = match (self.factory, self.backend) {
            (Some(factory), _) if mode == IsolationMode::DatabasePerTenant => {
                Backends::PerConnection(TenantConnectionManager::new(factory))
            }
            (_, Some(backend)) => Backends::Shared(backend),
            _ => {
                return Err(TenancyError::configuration("No storage backend configured"));
            }
        };

        let probe = ModelCacheKey {
            mode,
            schema: None,
        };
        CompiledModel::compile(&self.config, &self.entities, probe)?;

        info!(
            mode = %mode,
            entities = self.entities.len(),
            "Isolation engine built"
        );

        Ok(IsolationEngine {
            config: self.config,
            entities: self.entities,
            backends,
            schemas,
            connections,
            models: RwLock::new(HashMap::new()),
        })
    }
}

impl IsolationEngine {
    pub fn builder(config: impl Into<IsolationConfig>) -> IsolationEngineBuilder {
        IsolationEngineBuilder {
            config: config.into(),
            entities: Vec::new(),
            backend: None,
            factory: None,
        }
    }

    pub fn config(&self) -> &IsolationConfig {
        &self.config
    }

    pub fn entities(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    /// Storage target for a tenant's scoped entities
    pub fn resolve_target(&self, tenant_id: Option<&str>) -> Result<StorageTarget> {
        match self.config.mode() {
            IsolationMode::SharedDatabase => Ok(StorageTarget::shared()),
            IsolationMode::SchemaPerTenant => {
                Ok(StorageTarget::shared().with_schema(self.schemas.resolve(tenant_id)?))
            }
            IsolationMode::DatabasePerTenant => {
                Ok(StorageTarget::shared().with_connection(self.connections.resolve(tenant_id)?))
            }
        }
    }

    /// Compiled model for a target, compiled at most once per schema
    pub fn model_for(&self, target: &StorageTarget) -> Result<Arc<CompiledModel>> {
        let key = ModelCacheKey {
            mode: self.config.mode(),
            schema: target.schema.clone(),
        };

        if let Some(model) = self.models.read().get(&key) {
            return Ok(Arc::clone(model));
        }

        let compiled = Arc::new(CompiledModel::compile(
            &self.config,
            &self.entities,
            key.clone(),
        )?);
        let mut models = self.models.write();
        Ok(Arc::clone(models.entry(key).or_insert(compiled)))
    }

    /// Number of cached compiled models
    pub fn model_cache_len(&self) -> usize {
        self.models.read().len()
    }

    /// Drop every cached model
    pub fn invalidate_models(&self) {
        self.models.write().clear();
        debug!("Compiled model cache cleared");
    }

    async fn backend_for(&self, target: &StorageTarget) -> Result<Arc<dyn StorageBackend>> {
        match &self.backends {
            Backends::Shared(backend) => Ok(Arc::clone(backend)),
            Backends::PerConnection(manager) => {
                let connection = target.connection.as_deref().ok_or_else(|| {
                    TenancyError::configuration("Storage target has no connection")
                })?;
                manager.get_backend(connection).await
            }
        }
    }

    /// Context bound to the ambient tenant
    pub async fn context(&self) -> Result<TenantStorageContext<'_>> {
        let tenant_id = CurrentTenant::tenant_id();
        self.context_for(tenant_id.as_deref()).await
    }

    /// Context bound to an explicit tenant (or none)
    pub async fn context_for(&self, tenant_id: Option<&str>) -> Result<TenantStorageContext<'_>> {
        let target = self.resolve_target(tenant_id)?;
        let model = self.model_for(&target)?;
        let backend = self.backend_for(&target).await?;
        Ok(TenantStorageContext::new(
            self,
            tenant_id.map(str::to_string),
            target,
            model,
            backend,
        ))
    }
}
