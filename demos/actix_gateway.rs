// Actix Web variant of the course gateway. The server exposes two routes:
//
// - `GET /courses/{id}` reads a course when the caller's organization owns it.
// - `POST /courses/{id}/publish` publishes a course for teaching staff with a
//   verified email address.
//
// Identity arrives in the same headers an upstream session layer would set:
// `x-subject-id`, `x-role`, `x-org-id`, `x-email-verified`, and
// `x-course-org-id` simulates a course owned by another organization.
//
// Try it with curl:
//
// ```bash
// # Students can read courses in their organization
// curl -i http://127.0.0.1:8080/courses/cccccccc-cccc-cccc-cccc-cccccccccccc \
//   -H "x-role: student"
//
// # Publishing requires teaching staff with a verified email
// curl -i -X POST http://127.0.0.1:8080/courses/cccccccc-cccc-cccc-cccc-cccccccccccc/publish \
//   -H "x-role: teacher" -H "x-email-verified: true"
// ```

use actix_web::{dev::Payload, web, App, FromRequest, HttpRequest, HttpResponse, HttpServer, Responder};
use coursegate::{
    perm, AccessPolicy, Gate, PolicyCondition, ResourceDescriptor, Role, TenantContext,
};
use std::future::{ready, Ready};
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
}

fn header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
}

pub fn default_organization_id() -> Uuid {
    Uuid::parse_str("00000000-0000-0000-0000-00000000feed").unwrap()
}

impl FromRequest for CallerIdentity {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let role = match header(req, "x-role")
            .unwrap_or_else(|| "viewer".to_string())
            .to_ascii_lowercase()
            .parse::<Role>()
        {
            Ok(role) => role,
            Err(error) => {
                return ready(Err(actix_web::error::ErrorUnauthorized(error.to_string())))
            }
        };

        let subject_id = header(req, "x-subject-id")
            .and_then(|raw| Uuid::parse_str(&raw).ok())
            .unwrap_or_else(Uuid::nil);

        let organization_id = header(req, "x-org-id")
            .and_then(|raw| Uuid::parse_str(&raw).ok())
            .unwrap_or_else(default_organization_id);

        let email_verified = header(req, "x-email-verified")
            .map(|raw| matches!(raw.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        ready(Ok(CallerIdentity {
            subject_id,
            role,
            organization_id,
            email_verified,
        }))
    }
}

// --------------------------
// 2) Engine and Route Policies
// --------------------------

#[derive(Clone)]
pub struct Engine {
    pub gate: Gate,
    pub view_policy: AccessPolicy,
    pub publish_policy: AccessPolicy,
}

pub fn build_engine() -> Engine {
    Engine {
        gate: Gate::with_standard_catalog(),
        view_policy: AccessPolicy::new()
            .require(perm::COURSE_VIEW)
            .organization_scoped(),
        publish_policy: AccessPolicy::new()
            .require(perm::COURSE_PUBLISH)
            .organization_scoped()
            .condition(PolicyCondition::EmailVerified),
    }
}

fn context_for(engine: &Engine, caller: &CallerIdentity) -> TenantContext {
    TenantContext::builder(caller.subject_id, caller.role, caller.organization_id)
        .email_verified(caller.email_verified)
        .resolve(engine.gate.catalog())
}

fn respond(
    engine: &Engine,
    action: &str,
    resource: &ResourceDescriptor,
    context: &TenantContext,
    policy: &AccessPolicy,
    granted_body: &str,
) -> HttpResponse {
    match engine.gate.authorize(action, resource, context, policy) {
        Ok(decision) if decision.is_allowed() => HttpResponse::Ok().body(granted_body.to_string()),
        Ok(decision) => HttpResponse::Forbidden().body(decision.public_message().to_string()),
        Err(error) => HttpResponse::InternalServerError().body(error.to_string()),
    }
}

// -------------------------
// 3) Handlers
// -------------------------

pub async fn view_course(
    req: HttpRequest,
    path: web::Path<Uuid>,
    caller: CallerIdentity,
    engine: web::Data<Engine>,
) -> impl Responder {
    let context = context_for(&engine, &caller);
    let course_org = header(&req, "x-course-org-id")
        .and_then(|raw| Uuid::parse_str(&raw).ok())
        .unwrap_or(caller.organization_id);
    let resource = ResourceDescriptor::new("course", *path).in_organization(course_org);

    respond(
        &engine,
        "course.read",
        &resource,
        &context,
        &engine.view_policy,
        "Here is your course",
    )
}

pub async fn publish_course(
    req: HttpRequest,
    path: web::Path<Uuid>,
    caller: CallerIdentity,
    engine: web::Data<Engine>,
) -> impl Responder {
    let context = context_for(&engine, &caller);
    let course_org = header(&req, "x-course-org-id")
        .and_then(|raw| Uuid::parse_str(&raw).ok())
        .unwrap_or(caller.organization_id);
    let resource = ResourceDescriptor::new("course", *path).in_organization(course_org);

    respond(
        &engine,
        "course.publish",
        &resource,
        &context,
        &engine.publish_policy,
        "Course published",
    )
}

// -------------------------
// 4) App Startup
// -------------------------

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let engine = web::Data::new(build_engine());

    println!("coursegate actix gateway on http://127.0.0.1:8080");
    println!("Use the curl commands from the top of this file to try it out.\n");

    HttpServer::new(move || {
        App::new()
            .app_data(engine.clone())
            .route("/courses/{id}", web::get().to(view_course))
            .route("/courses/{id}/publish", web::post().to(publish_course))
    })
    .bind(("127.0.0.1", 8080))?
    .run()
    .await
}
