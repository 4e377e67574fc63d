//! A tenant-aware access-control and enrollment-eligibility engine.
//! The crate combines a fixed role hierarchy, an immutable role → permission
//! catalog, conditional access policies (subscription state, business hours,
//! IP allowlists, trial windows, custom rules), and a course prerequisite
//! evaluator that separates hard blockers from advisory warnings.
//!
//! # Overview
//!
//! Everything here is a library consumed by an HTTP/RPC layer: the caller's
//! session layer builds a [`TenantContext`] per request, route handlers
//! describe what is being accessed with a [`ResourceDescriptor`], and routes
//! declare their requirements as an [`AccessPolicy`] at registration time.
//! A [`Gate`] evaluates one request against one policy and returns an
//! [`AuthorizationDecision`]; an [`EligibilityEvaluator`] walks a course's
//! prerequisite definitions and returns an [`EligibilityReport`]. Both are
//! pure functions of their inputs with no shared mutable state, so separate
//! requests can be evaluated concurrently without coordination.
//!
//! ## Authorizing a request
//!
//! ```rust
//! use coursegate::{
//!     perm, AccessPolicy, Gate, PolicyCondition, ResourceDescriptor, Role, TenantContext,
//! };
//! use uuid::Uuid;
//!
//! let gate = Gate::with_standard_catalog();
//!
//! // Declared once at route registration: publishing a course needs the
//! // permission, stays inside the caller's organization, and requires a
//! // verified email address.
//! let publish_policy = AccessPolicy::new()
//!     .require(perm::COURSE_PUBLISH)
//!     .organization_scoped()
//!     .condition(PolicyCondition::EmailVerified);
//!
//! // Built once per request by the session layer.
//! let org = Uuid::new_v4();
//! let teacher = TenantContext::builder(Uuid::new_v4(), Role::Teacher, org)
//!     .email_verified(true)
//!     .resolve(gate.catalog());
//!
//! let course = ResourceDescriptor::new("course", Uuid::new_v4()).in_organization(org);
//!
//! let decision = gate
//!     .authorize("course.publish", &course, &teacher, &publish_policy)
//!     .expect("policy names only cataloged permissions");
//! assert!(decision.is_allowed());
//!
//! // A student lacks course:publish, and the denial says which step failed.
//! let student = TenantContext::builder(Uuid::new_v4(), Role::Student, org)
//!     .email_verified(true)
//!     .resolve(gate.catalog());
//! let decision = gate
//!     .authorize("course.publish", &course, &student, &publish_policy)
//!     .unwrap();
//! assert!(!decision.is_allowed());
//! // End users only ever see the non-leaking message.
//! assert_eq!(decision.public_message(), "access denied");
//! ```
//!
//! Evaluation order is fixed and short-circuiting: permission (with optional
//! fallback and owner exemption), then organization scope, then conditions in
//! declaration order. The first failure determines the denial reason, so
//! cheap checks always run before expensive ones and a probing caller learns
//! as little as possible. Cross-organization access is refused for every
//! role unless it holds [`perm::SYSTEM_ADMIN`].
//!
//! ## Checking enrollment eligibility
//!
//! Prerequisite definitions and learning history arrive through two
//! read-only, async data-access traits ([`PrerequisiteSource`],
//! [`LearningHistorySource`]) implemented by the caller's repository layer;
//! the evaluator itself never issues queries of its own.
//!
//! ```rust
//! # use async_trait::async_trait;
//! # use std::sync::Arc;
//! # use uuid::Uuid;
//! # use coursegate::{
//! #     CompareOp, CourseId, EligibilityEvaluator, LearningHistory, LearningHistorySource,
//! #     NodeMetadata, PrerequisiteKind, PrerequisiteNode, PrerequisiteSource, RequiredValue,
//! #     SubjectId,
//! # };
//! struct InMemoryCatalog {
//!     nodes: Vec<PrerequisiteNode>,
//! }
//!
//! #[async_trait]
//! impl PrerequisiteSource for InMemoryCatalog {
//!     async fn prerequisites(&self, course_id: CourseId) -> Vec<PrerequisiteNode> {
//!         self.nodes
//!             .iter()
//!             .filter(|n| n.course_id == course_id)
//!             .cloned()
//!             .collect()
//!     }
//!
//!     async fn course_is_active(&self, _course_id: CourseId) -> bool {
//!         true
//!     }
//! }
//!
//! struct InMemoryHistory(LearningHistory);
//!
//! #[async_trait]
//! impl LearningHistorySource for InMemoryHistory {
//!     async fn snapshot(&self, _subject_id: SubjectId) -> LearningHistory {
//!         self.0.clone()
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let course_id = Uuid::new_v4();
//! let node = PrerequisiteNode {
//!     id: Uuid::new_v4(),
//!     course_id,
//!     kind: PrerequisiteKind::AssessmentScore,
//!     operator: CompareOp::GreaterOrEqual,
//!     required: RequiredValue::Number(70.0),
//!     reference: Some("placement-test".to_string()),
//!     is_required: true,
//!     order_index: 0,
//!     active: true,
//!     metadata: NodeMetadata::default(),
//! };
//!
//! let mut history = LearningHistory::default();
//! history.assessment_scores.insert("placement-test".to_string(), 82.0);
//!
//! let evaluator = EligibilityEvaluator::new(
//!     Arc::new(InMemoryCatalog { nodes: vec![node] }),
//!     Arc::new(InMemoryHistory(history)),
//! );
//!
//! let report = evaluator.check_eligibility(course_id, Uuid::new_v4()).await;
//! assert!(report.is_eligible);
//! # });
//! ```
//!
//! A course with no active prerequisites is always eligible. Orphaned
//! references (a prerequisite course that was deleted) and malformed node
//! definitions are skipped with explicit markers instead of blocking
//! enrollment or failing the report.
//!
//! ## Custom rules
//!
//! Custom conditions and custom prerequisite rules share one restricted
//! expression language (comparisons, boolean connectives, and list
//! membership over named, typed variables) parsed and interpreted entirely
//! inside the crate. There is no dynamic code evaluation anywhere:
//!
//! ```rust
//! use coursegate::Expression;
//! use std::collections::HashMap;
//!
//! let rule = Expression::parse("total_minutes >= 300 && skills.rust >= 2").unwrap();
//! let mut scope = HashMap::new();
//! scope.insert("total_minutes".to_string(), coursegate::Value::Number(420.0));
//! scope.insert("skills.rust".to_string(), coursegate::Value::Number(3.0));
//! assert!(rule.evaluate(&scope).unwrap());
//!
//! assert!(Expression::parse("score >= ").is_err());
//! ```
//!
//! ## Errors
//!
//! Denials and unmet prerequisites are ordinary return values. `Err` is
//! reserved for configuration bugs, such as a policy naming an uncataloged
//! permission or a catalog with an orphaned permission, which callers should
//! surface as internal errors (5xx), never as denials (403). See
//! [`ConfigurationError`].

pub mod authorize;
pub mod catalog;
pub mod condition;
pub mod context;
pub mod eligibility;
pub mod expr;
pub mod role;

pub use authorize::{AccessPolicy, AuthorizationDecision, DecisionStep, DenialCategory, Gate};
pub use catalog::{perm, ConfigurationError, Permission, PermissionCatalog};
pub use condition::{ConditionCheck, ConditionError, IpRule, PolicyCondition};
pub use context::{ResourceDescriptor, TenantContext, TenantContextBuilder};
pub use eligibility::{
    CheckStatus, CompareOp, CourseId, EligibilityEvaluator, EligibilityReport, LearningHistory,
    LearningHistorySource, NodeMetadata, PrerequisiteCheck, PrerequisiteKind, PrerequisiteNode,
    PrerequisiteSource, RequiredValue, SkipReason, SubjectId,
};
pub use expr::{Expression, ExpressionError, Value, VariableScope};
pub use role::{Role, UnknownRoleError};
