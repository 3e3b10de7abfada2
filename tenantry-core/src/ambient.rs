//! Ambient Tenant Context
//!
//! Carries the current [`TenantContext`] through a call chain without
//! threading it as a parameter. The slot lives in tokio task-local storage,
//! so concurrent tasks never observe each other's tenant.
//!
//! # Usage
//!
//! ```rust
//! use tenantry_core::{ambient, CurrentTenant, TenantContext, TenantInfo};
//!
//! # tokio_test::block_on(async {
//! let ctx = TenantContext::for_tenant(TenantInfo::new("acme", "Acme"));
//!
//! ambient::with_tenant(ctx, async {
//!     assert_eq!(CurrentTenant::tenant_id().as_deref(), Some("acme"));
//! })
//! .await;
//!
//! assert_eq!(CurrentTenant::tenant_id(), None);
//! # });
//! ```

use crate::context::TenantContext;
use crate::error::{Result, TenancyError};
use crate::resolution::{Confidence, ResolutionSource};
use crate::tenant::TenantInfo;
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

tokio::task_local! {
    static AMBIENT_TENANT: RefCell<Option<Arc<TenantContext>>>;
}

/// Run `future` inside a fresh ambient slot holding `context`.
///
/// The enclosing value (if any) is restored when the future completes,
/// is dropped, or panics.
pub async fn scope<F>(context: Option<TenantContext>, future: F) -> F::Output
where
    F: Future,
{
    AMBIENT_TENANT
        .scope(RefCell::new(context.map(Arc::new)), future)
        .await
}

/// Run `future` with `context` as the ambient tenant.
pub async fn with_tenant<F>(context: TenantContext, future: F) -> F::Output
where
    F: Future,
{
    scope(Some(context), future).await
}

/// Synchronous counterpart of [`scope`].
pub fn sync_scope<F, R>(context: Option<TenantContext>, f: F) -> R
where
    F: FnOnce() -> R,
{
    AMBIENT_TENANT.sync_scope(RefCell::new(context.map(Arc::new)), f)
}

/// Read and override the ambient tenant.
///
/// Reads outside any scope report "no tenant".
pub struct CurrentTenant;

impl CurrentTenant {
    /// The ambient context, if any
    pub fn get() -> Option<Arc<TenantContext>> {
        AMBIENT_TENANT
            .try_with(|slot| slot.borrow().clone())
            .ok()
            .flatten()
    }

    /// Whether an ambient slot is established for this task
    pub fn in_scope() -> bool {
        AMBIENT_TENANT.try_with(|_| ()).is_ok()
    }

    pub fn tenant_id() -> Option<String> {
        Self::get().map(|ctx| ctx.tenant_id().to_string())
    }

    pub fn tenant() -> Option<TenantInfo> {
        Self::get().and_then(|ctx| ctx.tenant().cloned())
    }

    pub fn is_validated() -> bool {
        Self::get().is_some_and(|ctx| ctx.is_validated())
    }

    pub fn source() -> Option<ResolutionSource> {
        Self::get().map(|ctx| ctx.source())
    }

    pub fn confidence() -> Confidence {
        Self::get().map_or(Confidence::None, |ctx| ctx.confidence())
    }

    /// Replace the ambient value for the rest of the current scope.
    pub fn set(context: Option<TenantContext>) -> Result<()> {
        AMBIENT_TENANT
            .try_with(|slot| {
                *slot.borrow_mut() = context.map(Arc::new);
            })
            .map_err(|_| TenancyError::configuration("No ambient tenant scope is established"))
    }

    /// Push `context` as the ambient tenant until the guard drops.
    ///
    /// Guards restore the value they replaced, so they must be dropped in
    /// reverse order of creation; lexical scoping does this naturally.
    pub fn enter(context: TenantContext) -> Result<TenantScopeGuard> {
        let previous = AMBIENT_TENANT
            .try_with(|slot| slot.replace(Some(Arc::new(context))))
            .map_err(|_| TenancyError::configuration("No ambient tenant scope is established"))?;
        Ok(TenantScopeGuard { previous })
    }
}

/// Restores the previous ambient tenant on drop
#[must_use = "the previous tenant is restored as soon as the guard is dropped"]
pub struct TenantScopeGuard {
    previous: Option<Arc<TenantContext>>,
}

impl Drop for TenantScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = AMBIENT_TENANT.try_with(|slot| {
            *slot.borrow_mut() = previous;
        });
    }
}
