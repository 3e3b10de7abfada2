//! Integration tests for tenantry-core

use std::sync::Arc;
use tenantry_core::*;

fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}

fn all_providers() -> Vec<Arc<dyn TenantResolutionProvider>> {
    vec![
        Arc::new(RouteValueProvider::new("tenant")),
        Arc::new(HeaderProvider::new("X-Tenant-ID")),
        Arc::new(ClaimProvider::new("tenant_id")),
        Arc::new(QueryParameterProvider::new("tenant")),
    ]
}

#[tokio::test]
async fn test_priority_mode_follows_configured_order() {
    let sources = [
        ResolutionSource::Route,
        ResolutionSource::Header,
        ResolutionSource::Claim,
        ResolutionSource::QueryString,
    ];
    // Header is ambiguous, claim and query resolve, route is absent
    let request = ResolutionContext::new()
        .with_header("X-Tenant-ID", "h1,h2")
        .with_claim("tenant_id", "from-claim")
        .with_query("tenant", "from-query");

    for order in permutations(&sources) {
        let strategy =
            CompositeResolutionStrategy::new(all_providers()).with_priority(order.clone());
        let result = strategy.resolve(&request).await.unwrap();

        let expected = order
            .iter()
            .find(|s| matches!(s, ResolutionSource::Claim | ResolutionSource::QueryString))
            .copied()
            .unwrap();
        assert_eq!(result.source(), expected, "order {:?}", order);
        assert!(result.is_resolved());
    }
}

#[tokio::test]
async fn test_priority_mode_first_ambiguous_when_nothing_resolves() {
    let sources = [ResolutionSource::Header, ResolutionSource::Claim];
    let request = ResolutionContext::new()
        .with_header("X-Tenant-ID", "h1,h2")
        .with_claim("tenant_id", "c1;c2");

    for order in permutations(&sources) {
        let strategy = CompositeResolutionStrategy::new(all_providers())
            .with_priority(order.clone())
            .with_include_unlisted(false);
        let result = strategy.resolve(&request).await.unwrap();
        assert!(result.is_ambiguous());
        assert_eq!(result.source(), order[0]);
    }
}

#[tokio::test]
async fn test_consensus_mode_properties() {
    let mut providers = all_providers();
    providers.push(Arc::new(DefaultTenantProvider::new("fallback")));
    let strategy = CompositeResolutionStrategy::new(providers).with_consensus(true);

    let agreeing = ResolutionContext::new()
        .with_route_value("tenant", "acme")
        .with_claim("tenant_id", "Acme");
    let result = strategy.resolve(&agreeing).await.unwrap();
    assert_eq!(result.tenant_id(), Some("acme"));
    assert_eq!(result.confidence(), Confidence::Medium);

    let disagreeing = ResolutionContext::new()
        .with_route_value("tenant", "acme")
        .with_query("tenant", "globex");
    let result = strategy.resolve(&disagreeing).await.unwrap();
    assert!(result.is_ambiguous());
    assert_eq!(result.candidates(), &["acme", "globex"]);

    let empty = ResolutionContext::new();
    let result = strategy.resolve(&empty).await.unwrap();
    assert_eq!(result.tenant_id(), Some("fallback"));
    assert_eq!(result.source(), ResolutionSource::Default);
    assert_eq!(result.confidence(), Confidence::Low);
}

#[tokio::test]
async fn test_header_examples() {
    let provider = HeaderProvider::new("X-Tenant-ID");

    let two = ResolutionContext::new().with_header("X-Tenant-ID", "tenant-a, tenant-b");
    let result = provider.resolve(&two).await;
    assert!(result.is_ambiguous());
    assert_eq!(result.candidates().len(), 2);

    let one = ResolutionContext::new().with_header("X-Tenant-ID", "tenant-a");
    let result = provider.resolve(&one).await;
    assert!(result.is_resolved());
    assert_eq!(result.tenant_id(), Some("tenant-a"));
}

#[tokio::test]
async fn test_host_examples() {
    let provider = HostProvider::new();
    let resolve = |host: &str| {
        let ctx = ResolutionContext::new().with_host(host);
        let provider = &provider;
        async move { provider.resolve(&ctx).await }
    };

    assert_eq!(resolve("acme.example.com").await.tenant_id(), Some("acme"));
    assert!(resolve("localhost").await.is_not_found());
    assert!(resolve("127.0.0.1").await.is_not_found());
}

#[tokio::test]
async fn test_request_pipeline_with_enforcement() {
    let store = Arc::new(InMemoryTenantStore::new());
    store.insert(TenantInfo::new("acme", "Acme"));
    store.insert(TenantInfo::new("frozen", "Frozen").with_state(TenantState::Suspended));

    let mut options = TenancyOptions::default();
    options.validation.mode = ValidationMode::Repository;
    let service = TenantResolutionService::from_options(
        &options,
        vec![],
        Some(store),
        Some(Arc::new(InMemoryTenantCache::new())),
    );
    let enforcer = TenantEnforcer::new(options.enforcement.clone());
    let required = OperationRequirement::required();

    let handle = |tenant_id: &'static str| {
        let service = &service;
        let enforcer = &enforcer;
        let required = &required;
        async move {
            let request = ResolutionContext::new().with_header("X-Tenant-ID", tenant_id);
            let tenant = service.resolve(&request).await?;
            ambient::scope(tenant, async { enforcer.enforce_current(required) }).await
        }
    };

    assert!(handle("acme").await.is_ok());
    assert_eq!(
        handle("frozen").await.unwrap_err().kind(),
        TenancyErrorKind::Suspended
    );
    assert_eq!(
        handle("ghost").await.unwrap_err().kind(),
        TenancyErrorKind::NotFound
    );
}

#[tokio::test]
async fn test_nested_overrides_restore_outer() {
    let outer = TenantContext::for_tenant(TenantInfo::new("outer", "Outer"));
    ambient::with_tenant(outer, async {
        for id in ["a", "b", "c"] {
            let ctx = TenantContext::for_tenant(TenantInfo::new(id, id));
            ambient::with_tenant(ctx, async move {
                assert_eq!(CurrentTenant::tenant_id().as_deref(), Some(id));
            })
            .await;
            assert_eq!(CurrentTenant::tenant_id().as_deref(), Some("outer"));
        }
    })
    .await;
    assert!(CurrentTenant::get().is_none());
}
