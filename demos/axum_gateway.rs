// Axum service that authorizes course routes and gates enrollment on
// prerequisite eligibility using a single shared engine. Identity arrives in
// headers the way an upstream session layer would supply it:
//
//   x-subject-id, x-role, x-org-id, x-email-verified, x-subscription-active
//
// and `x-course-org-id` lets callers simulate a course owned by another
// organization.

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts, Path},
    http::{request::Parts, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use coursegate::{
    perm, AccessPolicy, CompareOp, CourseId, EligibilityEvaluator, Gate, LearningHistory,
    LearningHistorySource, NodeMetadata, PolicyCondition, PrerequisiteKind, PrerequisiteNode,
    PrerequisiteSource, RequiredValue, ResourceDescriptor, Role, SubjectId, TenantContext,
};
use std::sync::Arc;
use uuid::Uuid;

// --------------------
// 1) Identity Extraction
// --------------------

#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub subject_id: Uuid,
    pub role: Role,
    pub organization_id: Uuid,
    pub email_verified: bool,
    pub subscription_active: bool,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        // An unknown role is an authentication failure, not a silent
        // downgrade to viewer.
        let role = header(headers, "x-role")
            .unwrap_or_else(|| "viewer".to_string())
            .to_ascii_lowercase()
            .parse::<Role>()
            .map_err(|error| (StatusCode::UNAUTHORIZED, error.to_string()))?;

        let subject_id = header(headers, "x-subject-id")
            .and_then(|raw| Uuid::parse_str(&raw).ok())
            .unwrap_or_else(Uuid::nil);

        let organization_id = header(headers, "x-org-id")
            .and_then(|raw| Uuid::parse_str(&raw).ok())
            .unwrap_or_else(demo_organization_id);

        let email_verified = header(headers, "x-email-verified")
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(false);

        let subscription_active = header(headers, "x-subscription-active")
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(false);

        Ok(CallerIdentity {
            subject_id,
            role,
            organization_id,
            email_verified,
            subscription_active,
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct CourseOverrides {
    pub organization_id: Option<Uuid>,
}

impl<S> FromRequestParts<S> for CourseOverrides
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            organization_id: header(&parts.headers, "x-course-org-id")
                .and_then(|raw| Uuid::parse_str(&raw).ok()),
        })
    }
}

// --------------------------
// 2) Seeded Demo Data
// --------------------------

pub fn demo_organization_id() -> Uuid {
    Uuid::parse_str("00000000-0000-0000-0000-00000000feed").unwrap()
}

/// The one course in the demo catalog; it requires a placement-test score.
pub fn gated_course_id() -> Uuid {
    Uuid::parse_str("cccccccc-cccc-cccc-cccc-cccccccccccc").unwrap()
}

/// A subject that already passed the placement test.
pub fn experienced_subject_id() -> Uuid {
    Uuid::parse_str("aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa").unwrap()
}

pub struct SeededPrerequisites;

#[async_trait]
impl PrerequisiteSource for SeededPrerequisites {
    async fn prerequisites(&self, course_id: CourseId) -> Vec<PrerequisiteNode> {
        if course_id != gated_course_id() {
            return Vec::new();
        }
        vec![PrerequisiteNode {
            id: Uuid::parse_str("dddddddd-dddd-dddd-dddd-dddddddddddd").unwrap(),
            course_id,
            kind: PrerequisiteKind::AssessmentScore,
            operator: CompareOp::GreaterOrEqual,
            required: RequiredValue::Number(70.0),
            reference: Some("placement-test".to_string()),
            is_required: true,
            order_index: 0,
            active: true,
            metadata: NodeMetadata {
                custom_rule: None,
                estimated_minutes_to_complete: Some(90.0),
            },
        }]
    }

    async fn course_is_active(&self, _course_id: CourseId) -> bool {
        true
    }
}

pub struct SeededHistory;

#[async_trait]
impl LearningHistorySource for SeededHistory {
    async fn snapshot(&self, subject_id: SubjectId) -> LearningHistory {
        let mut history = LearningHistory::default();
        if subject_id == experienced_subject_id() {
            history
                .assessment_scores
                .insert("placement-test".to_string(), 82.0);
        }
        history
    }
}

// --------------------------
// 3) Engine and Route Policies
// --------------------------

#[derive(Clone)]
pub struct Engine {
    pub gate: Gate,
    pub evaluator: EligibilityEvaluator,
    pub view_policy: AccessPolicy,
    pub create_policy: AccessPolicy,
    pub enroll_policy: AccessPolicy,
}

pub fn build_engine() -> Engine {
    let gate = Gate::with_standard_catalog();
    let evaluator =
        EligibilityEvaluator::new(Arc::new(SeededPrerequisites), Arc::new(SeededHistory));

    Engine {
        view_policy: AccessPolicy::new()
            .require(perm::COURSE_VIEW)
            .organization_scoped(),
        create_policy: AccessPolicy::new()
            .require(perm::COURSE_CREATE)
            .condition(PolicyCondition::EmailVerified),
        enroll_policy: AccessPolicy::new()
            .require(perm::ENROLLMENT_CREATE)
            .fallback(perm::ENROLLMENT_MANAGE),
        gate,
        evaluator,
    }
}

fn context_for(engine: &Engine, caller: &CallerIdentity) -> TenantContext {
    TenantContext::builder(caller.subject_id, caller.role, caller.organization_id)
        .email_verified(caller.email_verified)
        .subscription_active(caller.subscription_active)
        .resolve(engine.gate.catalog())
}

/// Maps a decision into an HTTP response: denials are 403 with the
/// non-leaking message, configuration errors are 500.
fn enforce(
    engine: &Engine,
    action: &str,
    resource: &ResourceDescriptor,
    context: &TenantContext,
    policy: &AccessPolicy,
) -> Result<(), (StatusCode, String)> {
    match engine.gate.authorize(action, resource, context, policy) {
        Ok(decision) => decision.to_result(|message| (StatusCode::FORBIDDEN, message.to_string())),
        Err(error) => Err((StatusCode::INTERNAL_SERVER_ERROR, error.to_string())),
    }
}

// -------------------------
// 4) Handlers
// -------------------------

pub async fn view_course_handler(
    Path(course_id): Path<Uuid>,
    caller: CallerIdentity,
    overrides: CourseOverrides,
    Extension(engine): Extension<Engine>,
) -> impl IntoResponse {
    let context = context_for(&engine, &caller);
    let course_org = overrides
        .organization_id
        .unwrap_or(caller.organization_id);
    let resource = ResourceDescriptor::new("course", course_id).in_organization(course_org);

    match enforce(&engine, "course.read", &resource, &context, &engine.view_policy) {
        Ok(()) => (StatusCode::OK, "Here is your course".to_string()),
        Err((status, message)) => (status, message),
    }
}

pub async fn create_course_handler(
    caller: CallerIdentity,
    Extension(engine): Extension<Engine>,
) -> impl IntoResponse {
    let context = context_for(&engine, &caller);
    let resource = ResourceDescriptor::new("course", Uuid::new_v4());

    match enforce(&engine, "course.create", &resource, &context, &engine.create_policy) {
        Ok(()) => (StatusCode::CREATED, "Course created".to_string()),
        Err((status, message)) => (status, message),
    }
}

pub async fn enroll_handler(
    Path(course_id): Path<Uuid>,
    caller: CallerIdentity,
    Extension(engine): Extension<Engine>,
) -> axum::response::Response {
    let context = context_for(&engine, &caller);
    let resource = ResourceDescriptor::new("course", course_id)
        .in_organization(caller.organization_id);

    if let Err((status, message)) = enforce(
        &engine,
        "enrollment.create",
        &resource,
        &context,
        &engine.enroll_policy,
    ) {
        return (status, message).into_response();
    }

    let report = engine
        .evaluator
        .check_eligibility(course_id, caller.subject_id)
        .await;

    if report.is_eligible {
        (StatusCode::OK, "Enrolled".to_string()).into_response()
    } else {
        // Structured "not eligible": the report lists blockers and the
        // remediation estimate.
        (StatusCode::FORBIDDEN, Json(report)).into_response()
    }
}

// -------------------------
// 5) App Assembly
// -------------------------

pub fn build_app() -> Router {
    Router::new()
        .route("/courses/{course_id}", get(view_course_handler))
        .route("/courses", post(create_course_handler))
        .route("/courses/{course_id}/enroll", post(enroll_handler))
        .layer(Extension(build_engine()))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080")
        .await
        .expect("bind 127.0.0.1:8080");

    println!("coursegate axum gateway on http://127.0.0.1:8080");
    println!("Try:");
    println!(
        "  curl -i http://127.0.0.1:8080/courses/{} -H 'x-role: student'",
        gated_course_id()
    );
    println!(
        "  curl -i -X POST http://127.0.0.1:8080/courses/{}/enroll \\",
        gated_course_id()
    );
    println!(
        "    -H 'x-role: student' -H 'x-subject-id: {}'",
        experienced_subject_id()
    );

    axum::serve(listener, build_app()).await.expect("serve");
}
