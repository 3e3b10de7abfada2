//! Tenant Validation
//!
//! Turns a resolved tenant id into tenant metadata using a cache-then-store
//! lookup chain. Validation never fails: unknown ids produce an inactive
//! stub so that enforcement makes the final call.

use crate::context::TenantContext;
use crate::error::Result;
use crate::options::{FallbackTenant, ValidationOptions};
use crate::resolution::{ResolutionResult, ResolutionSource};
use crate::tenant::TenantInfo;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How resolved ids are validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Trust the id and synthesize an active tenant
    #[default]
    None,
    /// Look up the tenant cache only
    Cache,
    /// Look up the cache, then the tenant store
    Repository,
}

/// Tenant store trait (implement with your database)
///
/// Users provide their own implementation using their database of choice.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Find tenant by id
    async fn find_tenant_by_id(&self, tenant_id: &str) -> Result<Option<TenantInfo>>;
}

/// Tenant info cache trait
///
/// Must tolerate concurrent reads and writes.
#[async_trait]
pub trait TenantInfoCache: Send + Sync {
    /// Get cached tenant
    async fn get(&self, tenant_id: &str) -> Result<Option<TenantInfo>>;

    /// Cache tenant for `ttl`
    async fn set(&self, tenant: &TenantInfo, ttl: Duration) -> Result<()>;
}

/// In-memory tenant store
#[derive(Default)]
pub struct InMemoryTenantStore {
    tenants: RwLock<HashMap<String, TenantInfo>>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tenant
    pub fn insert(&self, tenant: TenantInfo) {
        self.tenants.write().insert(tenant.tenant_id.clone(), tenant);
    }

    pub fn remove(&self, tenant_id: &str) -> Option<TenantInfo> {
        self.tenants.write().remove(tenant_id)
    }

    pub fn len(&self) -> usize {
        self.tenants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.read().is_empty()
    }

    /// All tenants, sorted by id
    pub fn list(&self) -> Vec<TenantInfo> {
        let mut tenants: Vec<_> = self.tenants.read().values().cloned().collect();
        tenants.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        tenants
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn find_tenant_by_id(&self, tenant_id: &str) -> Result<Option<TenantInfo>> {
        Ok(self.tenants.read().get(tenant_id).cloned())
    }
}

struct CacheEntry {
    tenant: TenantInfo,
    expires_at: Instant,
}

/// In-memory tenant cache with per-entry TTL
#[derive(Default)]
pub struct InMemoryTenantCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryTenantCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop expired entries
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, entry| entry.expires_at > now);
    }
}

#[async_trait]
impl TenantInfoCache for InMemoryTenantCache {
    async fn get(&self, tenant_id: &str) -> Result<Option<TenantInfo>> {
        let entries = self.entries.read();
        Ok(entries
            .get(&cache_key(tenant_id))
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.tenant.clone()))
    }

    async fn set(&self, tenant: &TenantInfo, ttl: Duration) -> Result<()> {
        self.entries.write().insert(
            tenant.cache_key("info"),
            CacheEntry {
                tenant: tenant.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

fn cache_key(tenant_id: &str) -> String {
    format!("tenant:{}:info", tenant_id)
}

/// Tenant validator
pub struct TenantValidator {
    mode: ValidationMode,
    cache: Option<Arc<dyn TenantInfoCache>>,
    store: Option<Arc<dyn TenantStore>>,
    cache_ttl: Duration,
    fallback: Option<FallbackTenant>,
}

impl TenantValidator {
    /// Create a validator for `mode` with no collaborators attached
    pub fn new(mode: ValidationMode) -> Self {
        Self {
            mode,
            cache: None,
            store: None,
            cache_ttl: Duration::from_secs(300),
            fallback: None,
        }
    }

    /// Create a validator from options
    pub fn from_options(options: &ValidationOptions, fallback: Option<FallbackTenant>) -> Self {
        Self {
            mode: options.mode,
            cache: None,
            store: None,
            cache_ttl: options.cache_ttl(),
            fallback,
        }
    }

    /// Attach tenant cache
    pub fn with_cache(mut self, cache: Arc<dyn TenantInfoCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach tenant store
    pub fn with_store(mut self, store: Arc<dyn TenantStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set TTL for entries cached after a store hit
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set fallback tenant
    pub fn with_fallback(mut self, fallback: FallbackTenant) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Validate a resolution result.
    ///
    /// Returns `None` if the result is not resolved. Otherwise always
    /// returns a context; `is_validated` reports whether metadata was found.
    pub async fn validate(
        &self,
        resolution: ResolutionResult,
        correlation_id: Option<String>,
    ) -> Option<TenantContext> {
        let tenant_id = resolution.tenant_id()?.to_string();

        if resolution.source() == ResolutionSource::Default {
            let tenant = match &self.fallback {
                Some(fallback) if fallback.tenant_id().eq_ignore_ascii_case(&tenant_id) => {
                    fallback.to_tenant_info()
                }
                _ => TenantInfo::from_id(tenant_id),
            };
            return TenantContext::new(resolution, tenant).map(|ctx| {
                ctx.with_validated(true)
                    .with_correlation_id(correlation_id)
            });
        }

        let (tenant, validated) = match self.mode {
            ValidationMode::None => (TenantInfo::from_id(tenant_id.as_str()), true),
            ValidationMode::Cache => match self.lookup_cache(&tenant_id).await {
                Some(tenant) => (tenant, true),
                None => (TenantInfo::unknown(tenant_id.as_str()), false),
            },
            ValidationMode::Repository => match self.lookup_repository(&tenant_id).await {
                Some(tenant) => (tenant, true),
                None => (TenantInfo::unknown(tenant_id.as_str()), false),
            },
        };

        if !validated {
            debug!(tenant_id = %tenant_id, mode = ?self.mode, "Tenant could not be validated");
        }

        TenantContext::new(resolution, tenant).map(|ctx| {
            ctx.with_validated(validated)
                .with_correlation_id(correlation_id)
        })
    }

    async fn lookup_cache(&self, tenant_id: &str) -> Option<TenantInfo> {
        let cache = self.cache.as_ref()?;
        match cache.get(tenant_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "Tenant cache lookup failed");
                None
            }
        }
    }

    async fn lookup_repository(&self, tenant_id: &str) -> Option<TenantInfo> {
        if let Some(tenant) = self.lookup_cache(tenant_id).await {
            return Some(tenant);
        }

        let store = self.store.as_ref()?;
        let tenant = match store.find_tenant_by_id(tenant_id).await {
            Ok(found) => found?,
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "Tenant store lookup failed");
                return None;
            }
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&tenant, self.cache_ttl).await {
                warn!(tenant_id = %tenant_id, error = %e, "Failed to cache tenant");
            }
        }

        Some(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TenancyError;
    use crate::resolution::Confidence;
    use crate::tenant::TenantState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        inner: InMemoryTenantStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TenantStore for CountingStore {
        async fn find_tenant_by_id(&self, tenant_id: &str) -> Result<Option<TenantInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_tenant_by_id(tenant_id).await
        }
    }

    struct FailingStore;

    #[async_trait]
    impl TenantStore for FailingStore {
        async fn find_tenant_by_id(&self, _tenant_id: &str) -> Result<Option<TenantInfo>> {
            Err(TenancyError::storage("connection refused"))
        }
    }

    fn header(id: &str) -> ResolutionResult {
        ResolutionResult::resolved(ResolutionSource::Header, id, Confidence::Medium)
    }

    #[tokio::test]
    async fn test_unresolved_yields_none() {
        let validator = TenantValidator::new(ValidationMode::None);
        let result = ResolutionResult::not_found(ResolutionSource::Composite);
        assert!(validator.validate(result, None).await.is_none());
    }

    #[tokio::test]
    async fn test_mode_none_synthesizes_active() {
        let validator = TenantValidator::new(ValidationMode::None);
        let ctx = validator
            .validate(header("acme"), Some("corr".to_string()))
            .await
            .unwrap();
        assert!(ctx.is_validated());
        assert_eq!(ctx.tenant().unwrap().state, TenantState::Active);
        assert_eq!(ctx.correlation_id(), Some("corr"));
    }

    #[tokio::test]
    async fn test_default_source_short_circuits() {
        let validator = TenantValidator::new(ValidationMode::Repository)
            .with_fallback(FallbackTenant::Tenant(
                TenantInfo::new("shared", "Shared").with_region("eu"),
            ));
        let result = ResolutionResult::resolved(ResolutionSource::Default, "shared", Confidence::Low);

        let ctx = validator.validate(result, None).await.unwrap();
        assert!(ctx.is_validated());
        assert_eq!(ctx.tenant().unwrap().region.as_deref(), Some("eu"));
    }

    #[tokio::test]
    async fn test_cache_mode() {
        let cache = Arc::new(InMemoryTenantCache::new());
        cache
            .set(&TenantInfo::new("acme", "Acme"), Duration::from_secs(60))
            .await
            .unwrap();
        let validator = TenantValidator::new(ValidationMode::Cache).with_cache(cache);

        let hit = validator.validate(header("acme"), None).await.unwrap();
        assert!(hit.is_validated());
        assert_eq!(hit.tenant().unwrap().name, "Acme");

        let miss = validator.validate(header("ghost"), None).await.unwrap();
        assert!(!miss.is_validated());
        assert_eq!(miss.tenant().unwrap().state, TenantState::Unknown);
        assert!(!miss.tenant().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_repository_populates_cache() {
        let inner = InMemoryTenantStore::new();
        inner.insert(TenantInfo::new("acme", "Acme"));
        let store = Arc::new(CountingStore {
            inner,
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(InMemoryTenantCache::new());
        let validator = TenantValidator::new(ValidationMode::Repository)
            .with_store(store.clone())
            .with_cache(cache.clone())
            .with_cache_ttl(Duration::from_secs(60));

        let first = validator.validate(header("acme"), None).await.unwrap();
        assert!(first.is_validated());
        assert_eq!(cache.len(), 1);

        let second = validator.validate(header("acme"), None).await.unwrap();
        assert!(second.is_validated());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repository_failure_is_not_validated() {
        let validator =
            TenantValidator::new(ValidationMode::Repository).with_store(Arc::new(FailingStore));
        let ctx = validator.validate(header("acme"), None).await.unwrap();
        assert!(!ctx.is_validated());
    }

    #[tokio::test]
    async fn test_cache_entry_expires() {
        let cache = InMemoryTenantCache::new();
        cache
            .set(&TenantInfo::new("acme", "Acme"), Duration::ZERO)
            .await
            .unwrap();
        assert!(cache.get("acme").await.unwrap().is_none());
        cache.purge_expired();
        assert!(cache.is_empty());
    }
}
