//! Tenant Resolution
//!
//! Providers extract candidate tenant ids from request data; the composite
//! strategy turns their results into one outcome.

pub mod composite;
pub mod context;
pub mod providers;
pub mod result;

pub use composite::CompositeResolutionStrategy;
pub use context::ResolutionContext;
pub use providers::{
    ClaimProvider, DefaultTenantProvider, DelegateProvider, HeaderProvider, HostProvider,
    QueryParameterProvider, RouteValueProvider, TenantResolutionProvider,
};
pub use result::{Confidence, ResolutionResult, ResolutionSource};
