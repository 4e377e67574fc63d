//! The permission matcher.
//!
//! [`AccessPolicy`] is the static requirement set a route declares at
//! registration time; [`Gate::authorize`] evaluates one request against one
//! policy in a fixed, short-circuiting order. The ordering is part of the
//! contract: cheaper checks run first, and the first failure determines the
//! denial reason, so a caller probing the system learns as little as
//! possible.
//!
//! Denials are ordinary return values. `Err` is reserved for configuration
//! bugs (a policy naming a permission the catalog has never heard of), which
//! callers should surface as internal errors, not 403s.

use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{perm, ConfigurationError, Permission, PermissionCatalog};
use crate::condition::{ConditionError, PolicyCondition};
use crate::context::{ResourceDescriptor, TenantContext};

/// Which evaluation step produced the denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStep {
    Permission,
    OrganizationScope,
    Condition { index: usize, kind: &'static str },
}

/// Coarse denial category. Safe to log and to branch on; the detailed reason
/// stays in [`AuthorizationDecision::reason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialCategory {
    /// The role holds neither the required nor the fallback permission.
    InsufficientRole,
    /// Cross-organization access attempt.
    ResourceScope,
    /// A declared condition was not met (or failed to evaluate).
    ConditionUnmet,
    /// A condition needed a context field the resolver did not supply.
    IncompleteContext,
}

/// The outcome of an authorization check. A pure value: identical inputs
/// always produce an identical decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub category: Option<DenialCategory>,
    /// Diagnostic for the boundary layer's logs. Never show this to end
    /// users; use [`AuthorizationDecision::public_message`] instead.
    pub reason: Option<String>,
    pub failed_at: Option<DecisionStep>,
}

impl AuthorizationDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            category: None,
            reason: None,
            failed_at: None,
        }
    }

    fn deny(category: DenialCategory, step: DecisionStep, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            category: Some(category),
            reason: Some(reason.into()),
            failed_at: Some(step),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// The minimal, non-leaking string suitable for an end-user response.
    pub fn public_message(&self) -> &'static str {
        if self.allowed {
            "allowed"
        } else {
            "access denied"
        }
    }

    /// Converts the decision into a `Result`, mapping a denial into an error
    /// built from the public (non-leaking) message.
    pub fn to_result<E>(&self, error_fn: impl FnOnce(&str) -> E) -> Result<(), E> {
        if self.allowed {
            Ok(())
        } else {
            Err(error_fn(self.public_message()))
        }
    }
}

/// Static, route-attached access requirements, built once at route
/// registration and passed to [`Gate::authorize`] per request.
///
/// An empty policy declares no requirement and always allows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccessPolicy {
    required: Option<Permission>,
    fallback: Option<Permission>,
    owner_exempt: bool,
    org_scoped: bool,
    conditions: Vec<PolicyCondition>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// The permission the caller's role must hold.
    pub fn require(mut self, permission: impl Into<Permission>) -> Self {
        self.required = Some(permission.into());
        self
    }

    /// An alternate elevated permission accepted when the required one is
    /// missing (e.g. an admin override for a self-service route).
    pub fn fallback(mut self, permission: impl Into<Permission>) -> Self {
        self.fallback = Some(permission.into());
        self
    }

    /// Lets the resource owner through the permission check even without the
    /// required permission.
    pub fn owner_exempt(mut self) -> Self {
        self.owner_exempt = true;
        self
    }

    /// Enforces organization isolation against the resource's owning
    /// organization.
    pub fn organization_scoped(mut self) -> Self {
        self.org_scoped = true;
        self
    }

    /// Appends a condition. Conditions are evaluated in declaration order.
    pub fn condition(mut self, condition: PolicyCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_none() && !self.org_scoped && self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[PolicyCondition] {
        &self.conditions
    }
}

/// The authorization decision engine. Holds the immutable permission catalog
/// and nothing else; evaluations share no state and may run concurrently.
#[derive(Clone)]
pub struct Gate {
    catalog: Arc<PermissionCatalog>,
}

impl Gate {
    pub fn new(catalog: Arc<PermissionCatalog>) -> Self {
        Self { catalog }
    }

    pub fn with_standard_catalog() -> Self {
        Self::new(Arc::new(PermissionCatalog::standard()))
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// Evaluates one request against one policy.
    ///
    /// Steps, in order, short-circuiting on the first failure:
    ///
    /// 1. an empty policy allows;
    /// 2. the role must hold the required permission, retrying the declared
    ///    fallback and honoring owner exemption before denying;
    /// 3. organization scope: a resource owned by another organization is
    ///    refused regardless of role, unless the role holds
    ///    [`perm::SYSTEM_ADMIN`];
    /// 4. conditions in declaration order, denying on the first unmet one;
    /// 5. otherwise allow.
    #[tracing::instrument(skip_all, fields(action = action, subject = %context.subject_id))]
    pub fn authorize(
        &self,
        action: &str,
        resource: &ResourceDescriptor,
        context: &TenantContext,
        policy: &AccessPolicy,
    ) -> Result<AuthorizationDecision, ConfigurationError> {
        if policy.is_empty() {
            tracing::trace!("no declared requirement, allowing");
            return Ok(AuthorizationDecision::allow());
        }

        if let Some(required) = &policy.required {
            let decision = self.check_permission(required, policy, resource, context)?;
            self.emit_security_event(action, context, "permission", decision.is_none());
            if let Some(denial) = decision {
                return Ok(denial);
            }
        }

        if policy.org_scoped {
            if let Some(owner_org) = resource.owner_organization_id {
                let cross_tenant = owner_org != context.organization_id;
                if cross_tenant && !self.catalog.has_permission(context.role, perm::SYSTEM_ADMIN) {
                    tracing::debug!(
                        target: "coursegate::security",
                        message = "cross-organization access refused",
                        subject.organization = %context.organization_id,
                        resource.organization = %owner_org,
                        event.outcome = "failure",
                    );
                    return Ok(AuthorizationDecision::deny(
                        DenialCategory::ResourceScope,
                        DecisionStep::OrganizationScope,
                        format!(
                            "resource belongs to organization {owner_org}, caller belongs to {}",
                            context.organization_id
                        ),
                    ));
                }
            }
        }

        for (index, condition) in policy.conditions.iter().enumerate() {
            let kind = condition.kind();
            match condition.evaluate(context) {
                Ok(check) if check.met => {
                    tracing::trace!(
                        target: "coursegate::security",
                        message = "condition evaluated",
                        event.outcome = "success",
                        condition.kind = kind,
                    );
                }
                Ok(check) => {
                    tracing::trace!(
                        target: "coursegate::security",
                        message = "condition evaluated",
                        condition.kind = kind,
                        event.outcome = "failure",
                    );
                    return Ok(AuthorizationDecision::deny(
                        DenialCategory::ConditionUnmet,
                        DecisionStep::Condition { index, kind },
                        check.detail,
                    ));
                }
                Err(error @ ConditionError::ContextIncomplete { .. }) => {
                    // Fail closed: a context the resolver could not complete
                    // denies rather than silently passing.
                    return Ok(AuthorizationDecision::deny(
                        DenialCategory::IncompleteContext,
                        DecisionStep::Condition { index, kind },
                        error.to_string(),
                    ));
                }
                Err(error) => {
                    return Ok(AuthorizationDecision::deny(
                        DenialCategory::ConditionUnmet,
                        DecisionStep::Condition { index, kind },
                        error.to_string(),
                    ));
                }
            }
        }

        Ok(AuthorizationDecision::allow())
    }

    /// Step 2: permission lookup with fallback and owner exemption.
    /// Returns `Some(denial)` when the caller does not get through.
    fn check_permission(
        &self,
        required: &Permission,
        policy: &AccessPolicy,
        resource: &ResourceDescriptor,
        context: &TenantContext,
    ) -> Result<Option<AuthorizationDecision>, ConfigurationError> {
        if !self.catalog.is_known(required.as_str()) {
            return Err(ConfigurationError::UnknownPermission(
                required.as_str().to_string(),
            ));
        }

        if self.catalog.has_permission(context.role, required.as_str()) {
            return Ok(None);
        }

        if let Some(fallback) = &policy.fallback {
            if !self.catalog.is_known(fallback.as_str()) {
                return Err(ConfigurationError::UnknownPermission(
                    fallback.as_str().to_string(),
                ));
            }
            if self.catalog.has_permission(context.role, fallback.as_str()) {
                return Ok(None);
            }
        }

        if policy.owner_exempt && resource.owner_user_id == Some(context.subject_id) {
            return Ok(None);
        }

        Ok(Some(AuthorizationDecision::deny(
            DenialCategory::InsufficientRole,
            DecisionStep::Permission,
            format!("role '{}' does not hold '{required}'", context.role),
        )))
    }

    fn emit_security_event(
        &self,
        action: &str,
        context: &TenantContext,
        step: &'static str,
        passed: bool,
    ) {
        let outcome = if passed { "success" } else { "failure" };
        tracing::trace!(
            target: "coursegate::security",
            action = action,
            subject.role = context.role.as_str(),
            decision.step = step,
            event.outcome = outcome,
            "access step evaluated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::perm;
    use crate::role::Role;
    use uuid::Uuid;

    fn context(role: Role, org: Uuid) -> TenantContext {
        let catalog = PermissionCatalog::standard();
        TenantContext::builder(Uuid::new_v4(), role, org).resolve(&catalog)
    }

    fn course(org: Uuid) -> ResourceDescriptor {
        ResourceDescriptor::new("course", Uuid::new_v4()).in_organization(org)
    }

    #[test]
    fn empty_policy_allows() {
        let gate = Gate::with_standard_catalog();
        let org = Uuid::new_v4();
        let decision = gate
            .authorize(
                "course.read",
                &course(org),
                &context(Role::Viewer, org),
                &AccessPolicy::new(),
            )
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[test]
    fn student_cannot_create_courses() {
        let gate = Gate::with_standard_catalog();
        let org = Uuid::new_v4();
        let policy = AccessPolicy::new().require(perm::COURSE_CREATE);

        let decision = gate
            .authorize("course.create", &course(org), &context(Role::Student, org), &policy)
            .unwrap();

        assert!(!decision.is_allowed());
        assert_eq!(decision.category, Some(DenialCategory::InsufficientRole));
        assert_eq!(decision.failed_at, Some(DecisionStep::Permission));
        assert_eq!(decision.public_message(), "access denied");
    }

    #[test]
    fn admin_passes_with_an_empty_condition_list() {
        let gate = Gate::with_standard_catalog();
        let org = Uuid::new_v4();
        let policy = AccessPolicy::new().require(perm::COURSE_CREATE);

        let decision = gate
            .authorize("course.create", &course(org), &context(Role::Admin, org), &policy)
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[test]
    fn fallback_permission_admits_elevated_roles() {
        let gate = Gate::with_standard_catalog();
        let org = Uuid::new_v4();
        // enrollment:manage is the elevated alternative to enrollment:create.
        let policy = AccessPolicy::new()
            .require(perm::ENROLLMENT_CREATE)
            .fallback(perm::ENROLLMENT_MANAGE);

        // Viewer holds neither.
        let decision = gate
            .authorize("enroll", &course(org), &context(Role::Viewer, org), &policy)
            .unwrap();
        assert!(!decision.is_allowed());

        // Manager lacks nothing here, but construct a case where only the
        // fallback applies: managers do hold enrollment:create, so check a
        // policy requiring a permission managers lack with a manager-held
        // fallback instead.
        let policy = AccessPolicy::new()
            .require(perm::SYSTEM_ADMIN)
            .fallback(perm::ENROLLMENT_MANAGE);
        let decision = gate
            .authorize("enroll.force", &course(org), &context(Role::Manager, org), &policy)
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[test]
    fn owner_exemption_admits_the_resource_owner() {
        let gate = Gate::with_standard_catalog();
        let org = Uuid::new_v4();
        let caller = context(Role::Student, org);
        let resource = ResourceDescriptor::new("submission", Uuid::new_v4())
            .owned_by(caller.subject_id)
            .in_organization(org);
        let policy = AccessPolicy::new()
            .require(perm::ASSESSMENT_GRADE)
            .owner_exempt();

        let decision = gate
            .authorize("submission.view", &resource, &caller, &policy)
            .unwrap();
        assert!(decision.is_allowed());

        // A different student is still refused.
        let other = context(Role::Student, org);
        let decision = gate
            .authorize("submission.view", &resource, &other, &policy)
            .unwrap();
        assert!(!decision.is_allowed());
    }

    #[test]
    fn cross_organization_access_is_refused_regardless_of_role() {
        let gate = Gate::with_standard_catalog();
        let home_org = Uuid::new_v4();
        let other_org = Uuid::new_v4();
        let policy = AccessPolicy::new()
            .require(perm::COURSE_VIEW)
            .organization_scoped();

        for role in [Role::Viewer, Role::Teacher, Role::Manager] {
            let decision = gate
                .authorize(
                    "course.read",
                    &course(other_org),
                    &context(role, home_org),
                    &policy,
                )
                .unwrap();
            assert!(!decision.is_allowed(), "{role} crossed organizations");
            assert_eq!(decision.category, Some(DenialCategory::ResourceScope));
            assert_eq!(decision.failed_at, Some(DecisionStep::OrganizationScope));
            // The reason carries both organization ids for the security log.
            let reason = decision.reason.unwrap();
            assert!(reason.contains(&other_org.to_string()));
            assert!(reason.contains(&home_org.to_string()));
        }
    }

    #[test]
    fn system_admin_permission_crosses_organizations() {
        let gate = Gate::with_standard_catalog();
        let policy = AccessPolicy::new()
            .require(perm::COURSE_VIEW)
            .organization_scoped();

        let decision = gate
            .authorize(
                "course.read",
                &course(Uuid::new_v4()),
                &context(Role::Admin, Uuid::new_v4()),
                &policy,
            )
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[test]
    fn conditions_deny_in_declaration_order() {
        let gate = Gate::with_standard_catalog();
        let org = Uuid::new_v4();
        let policy = AccessPolicy::new()
            .require(perm::COURSE_VIEW)
            .condition(PolicyCondition::EmailVerified)
            .condition(PolicyCondition::SubscriptionActive);

        let decision = gate
            .authorize("course.read", &course(org), &context(Role::Student, org), &policy)
            .unwrap();

        assert!(!decision.is_allowed());
        assert_eq!(decision.category, Some(DenialCategory::ConditionUnmet));
        assert_eq!(
            decision.failed_at,
            Some(DecisionStep::Condition {
                index: 0,
                kind: "email-verified"
            })
        );
    }

    #[test]
    fn failed_permission_check_never_reaches_conditions() {
        let gate = Gate::with_standard_catalog();
        let org = Uuid::new_v4();
        // This condition would error if evaluated: the context has no
        // creation time. The permission denial must come first.
        let policy = AccessPolicy::new()
            .require(perm::COURSE_CREATE)
            .condition(PolicyCondition::WithinTrialPeriod { trial_days: 14 });

        let decision = gate
            .authorize("course.create", &course(org), &context(Role::Student, org), &policy)
            .unwrap();

        assert_eq!(decision.category, Some(DenialCategory::InsufficientRole));
        assert_eq!(decision.failed_at, Some(DecisionStep::Permission));
    }

    #[test]
    fn incomplete_context_denies_with_its_own_category() {
        let gate = Gate::with_standard_catalog();
        let org = Uuid::new_v4();
        let policy = AccessPolicy::new()
            .require(perm::COURSE_VIEW)
            .condition(PolicyCondition::WithinTrialPeriod { trial_days: 14 });

        let decision = gate
            .authorize("course.read", &course(org), &context(Role::Student, org), &policy)
            .unwrap();

        assert!(!decision.is_allowed());
        assert_eq!(decision.category, Some(DenialCategory::IncompleteContext));
    }

    #[test]
    fn unknown_permission_is_a_configuration_error_not_a_denial() {
        let gate = Gate::with_standard_catalog();
        let org = Uuid::new_v4();
        let policy = AccessPolicy::new().require("course:transmogrify");

        let err = gate
            .authorize("course.create", &course(org), &context(Role::Admin, org), &policy)
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownPermission("course:transmogrify".to_string())
        );
    }

    #[test]
    fn decisions_are_deterministic() {
        let gate = Gate::with_standard_catalog();
        let org = Uuid::new_v4();
        let caller = context(Role::Student, org);
        let resource = course(org);
        let policy = AccessPolicy::new()
            .require(perm::COURSE_CREATE)
            .condition(PolicyCondition::EmailVerified);

        let first = gate
            .authorize("course.create", &resource, &caller, &policy)
            .unwrap();
        let second = gate
            .authorize("course.create", &resource, &caller, &policy)
            .unwrap();
        assert_eq!(first, second);
    }
}
