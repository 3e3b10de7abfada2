//! Tenant Enforcement
//!
//! Checks tenant presence and lifecycle state against a per-operation
//! requirement. This is the first layer that fails hard.

use crate::ambient::CurrentTenant;
use crate::context::TenantContext;
use crate::error::{Result, TenancyError};
use crate::options::EnforcementOptions;
use crate::tenant::TenantState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Whether an operation needs a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequirementMode {
    #[default]
    Required,
    Optional,
}

/// Declarative requirement marker for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationRequirement {
    /// Explicit declaration, if the operation makes one
    pub declared: Option<RequirementMode>,

    /// The operation admits anonymous callers
    pub anonymous: bool,
}

impl OperationRequirement {
    /// No declaration; the global default applies
    pub fn undeclared() -> Self {
        Self::default()
    }

    pub fn required() -> Self {
        Self {
            declared: Some(RequirementMode::Required),
            anonymous: false,
        }
    }

    pub fn optional() -> Self {
        Self {
            declared: Some(RequirementMode::Optional),
            anonymous: false,
        }
    }

    /// Operation open to anonymous callers
    pub fn anonymous() -> Self {
        Self {
            declared: None,
            anonymous: true,
        }
    }
}

/// Tenant enforcer
pub struct TenantEnforcer {
    options: EnforcementOptions,
}

impl TenantEnforcer {
    pub fn new(options: EnforcementOptions) -> Self {
        Self { options }
    }

    /// Effective requirement for an operation.
    ///
    /// An explicit declaration wins. Without one, an anonymous operation is
    /// optional when `allow_anonymous` is set; otherwise the global default
    /// governs.
    pub fn requirement_for(&self, requirement: &OperationRequirement) -> RequirementMode {
        if let Some(declared) = requirement.declared {
            return declared;
        }
        if requirement.anonymous && self.options.allow_anonymous {
            return RequirementMode::Optional;
        }
        self.options.default_requirement
    }

    /// Enforce against an explicit context
    pub fn enforce(
        &self,
        context: Option<&TenantContext>,
        requirement: &OperationRequirement,
    ) -> Result<()> {
        self.enforce_at(context, requirement, Utc::now())
    }

    /// Enforce against the ambient tenant
    pub fn enforce_current(&self, requirement: &OperationRequirement) -> Result<()> {
        let current = CurrentTenant::get();
        self.enforce(current.as_deref(), requirement)
    }

    /// Enforce with an explicit clock.
    ///
    /// Rules are checked in a fixed order and the first violation is
    /// returned.
    pub fn enforce_at(
        &self,
        context: Option<&TenantContext>,
        requirement: &OperationRequirement,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.requirement_for(requirement) == RequirementMode::Optional {
            return Ok(());
        }

        let outcome = check_lifecycle(context, now);
        if let Err(e) = &outcome {
            debug!(code = e.code(), "Tenant enforcement failed");
        }
        outcome
    }
}

impl Default for TenantEnforcer {
    fn default() -> Self {
        Self::new(EnforcementOptions::default())
    }
}

fn check_lifecycle(context: Option<&TenantContext>, now: DateTime<Utc>) -> Result<()> {
    let context = match context {
        Some(ctx) if !ctx.tenant_id().is_empty() => ctx,
        _ => return Err(TenancyError::not_resolved()),
    };
    let tenant_id = context.tenant_id();

    if !context.is_validated() {
        return Err(TenancyError::not_found(tenant_id));
    }

    let tenant = context
        .tenant()
        .ok_or_else(|| TenancyError::not_found(tenant_id))?;

    if tenant.state == TenantState::Suspended {
        return Err(TenancyError::suspended(tenant_id));
    }

    if !tenant.is_active {
        return Err(TenancyError::inactive(tenant_id, "inactive"));
    }
    if tenant.is_soft_deleted {
        return Err(TenancyError::inactive(tenant_id, "soft_deleted"));
    }
    if matches!(
        tenant.state,
        TenantState::Deleted | TenantState::PendingProvision
    ) {
        return Err(TenancyError::inactive(tenant_id, &tenant.state.to_string()));
    }

    if tenant.is_expired_at(now) {
        return Err(TenancyError::inactive(tenant_id, "expired"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TenancyErrorKind;
    use crate::resolution::{Confidence, ResolutionResult, ResolutionSource};
    use crate::tenant::TenantInfo;
    use chrono::Duration;

    fn validated(tenant: TenantInfo) -> TenantContext {
        TenantContext::for_tenant(tenant)
    }

    fn kind(result: Result<()>) -> TenancyErrorKind {
        result.unwrap_err().kind()
    }

    #[test]
    fn test_requirement_resolution() {
        let strict = TenantEnforcer::default();
        assert_eq!(
            strict.requirement_for(&OperationRequirement::undeclared()),
            RequirementMode::Required
        );
        assert_eq!(
            strict.requirement_for(&OperationRequirement::anonymous()),
            RequirementMode::Required
        );
        assert_eq!(
            strict.requirement_for(&OperationRequirement::optional()),
            RequirementMode::Optional
        );

        let lenient = TenantEnforcer::new(EnforcementOptions {
            default_requirement: RequirementMode::Required,
            allow_anonymous: true,
        });
        assert_eq!(
            lenient.requirement_for(&OperationRequirement::anonymous()),
            RequirementMode::Optional
        );
        assert_eq!(
            lenient.requirement_for(&OperationRequirement::undeclared()),
            RequirementMode::Required
        );

        let optional_default = TenantEnforcer::new(EnforcementOptions {
            default_requirement: RequirementMode::Optional,
            allow_anonymous: false,
        });
        assert_eq!(
            optional_default.requirement_for(&OperationRequirement::required()),
            RequirementMode::Required
        );
    }

    #[test]
    fn test_optional_always_passes() {
        let enforcer = TenantEnforcer::default();
        assert!(enforcer.enforce(None, &OperationRequirement::optional()).is_ok());
    }

    #[test]
    fn test_rule_order() {
        let enforcer = TenantEnforcer::default();
        let req = OperationRequirement::required();

        assert_eq!(kind(enforcer.enforce(None, &req)), TenancyErrorKind::NotResolved);

        let unvalidated = TenantContext::new(
            ResolutionResult::resolved(ResolutionSource::Header, "acme", Confidence::Medium),
            TenantInfo::unknown("acme"),
        )
        .unwrap();
        assert_eq!(
            kind(enforcer.enforce(Some(&unvalidated), &req)),
            TenancyErrorKind::NotFound
        );

        let no_metadata = TenantContext::without_metadata(ResolutionResult::resolved(
            ResolutionSource::Header,
            "acme",
            Confidence::Medium,
        ))
        .unwrap()
        .with_validated(true);
        assert_eq!(
            kind(enforcer.enforce(Some(&no_metadata), &req)),
            TenancyErrorKind::NotFound
        );
    }

    #[test]
    fn test_suspended_checked_before_inactive() {
        let enforcer = TenantEnforcer::default();
        let req = OperationRequirement::required();

        let suspended_active =
            validated(TenantInfo::new("acme", "Acme").with_state(TenantState::Suspended));
        assert_eq!(
            kind(enforcer.enforce(Some(&suspended_active), &req)),
            TenancyErrorKind::Suspended
        );

        let suspended_inactive = validated(
            TenantInfo::new("acme", "Acme")
                .with_state(TenantState::Suspended)
                .with_active(false),
        );
        assert_eq!(
            kind(enforcer.enforce(Some(&suspended_inactive), &req)),
            TenancyErrorKind::Suspended
        );
    }

    #[test]
    fn test_inactive_variants() {
        let enforcer = TenantEnforcer::default();
        let req = OperationRequirement::required();

        for tenant in [
            TenantInfo::new("t", "t").with_active(false),
            TenantInfo::new("t", "t").with_soft_deleted(true),
            TenantInfo::new("t", "t").with_state(TenantState::Deleted),
            TenantInfo::new("t", "t").with_state(TenantState::PendingProvision),
        ] {
            assert_eq!(
                kind(enforcer.enforce(Some(&validated(tenant)), &req)),
                TenancyErrorKind::Inactive
            );
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let enforcer = TenantEnforcer::default();
        let req = OperationRequirement::required();
        let now = Utc::now();

        let expiring_now = validated(TenantInfo::new("t", "t").with_expires_at(now));
        assert_eq!(
            kind(enforcer.enforce_at(Some(&expiring_now), &req, now)),
            TenancyErrorKind::Inactive
        );

        let expiring_later =
            validated(TenantInfo::new("t", "t").with_expires_at(now + Duration::seconds(1)));
        assert!(enforcer.enforce_at(Some(&expiring_later), &req, now).is_ok());
    }

    #[tokio::test]
    async fn test_enforce_current() {
        let enforcer = TenantEnforcer::default();
        let req = OperationRequirement::required();

        assert_eq!(kind(enforcer.enforce_current(&req)), TenancyErrorKind::NotResolved);

        crate::ambient::with_tenant(validated(TenantInfo::new("acme", "Acme")), async {
            assert!(enforcer.enforce_current(&req).is_ok());
        })
        .await;
    }
}
