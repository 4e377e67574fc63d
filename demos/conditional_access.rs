//! # Conditional Access Example
//!
//! Builds a policy combining a permission requirement with business hours,
//! an IP allowlist, and a custom-rule expression, then evaluates it for a few
//! callers and prints which step denied each one.
//!
//! To run this example:
//! ```
//! cargo run --example conditional_access
//! ```

use chrono::{NaiveTime, TimeZone, Utc};
use coursegate::{
    perm, AccessPolicy, Gate, IpRule, PolicyCondition, ResourceDescriptor, Role, TenantContext,
};
use uuid::Uuid;

fn main() {
    let gate = Gate::with_standard_catalog();
    let org = Uuid::new_v4();

    // Analytics exports: managers only, from the office network, during an
    // evening maintenance window that wraps midnight, and only on paid plans.
    let export_policy = AccessPolicy::new()
        .require(perm::ANALYTICS_VIEW)
        .condition(PolicyCondition::IpAllowlist {
            rules: vec!["10.20.0.0/16".parse::<IpRule>().unwrap()],
        })
        .condition(PolicyCondition::BusinessHours {
            start: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            utc_offset_minutes: 0,
        })
        .condition(PolicyCondition::CustomExpression {
            source: "subscription_active && role_rank >= 3".to_string(),
        });

    let resource = ResourceDescriptor::new("analytics-export", Uuid::new_v4());
    let evening = Utc.with_ymd_and_hms(2024, 6, 3, 23, 0, 0).unwrap();
    let midday = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();

    let cases = [
        (
            "manager, office IP, 23:00",
            TenantContext::builder(Uuid::new_v4(), Role::Manager, org)
                .request_ip("10.20.3.4".parse().unwrap())
                .request_time(evening)
                .subscription_active(true)
                .resolve(gate.catalog()),
        ),
        (
            "manager, office IP, 12:00",
            TenantContext::builder(Uuid::new_v4(), Role::Manager, org)
                .request_ip("10.20.3.4".parse().unwrap())
                .request_time(midday)
                .subscription_active(true)
                .resolve(gate.catalog()),
        ),
        (
            "manager, home IP, 23:00",
            TenantContext::builder(Uuid::new_v4(), Role::Manager, org)
                .request_ip("203.0.113.9".parse().unwrap())
                .request_time(evening)
                .subscription_active(true)
                .resolve(gate.catalog()),
        ),
        (
            "student, office IP, 23:00",
            TenantContext::builder(Uuid::new_v4(), Role::Student, org)
                .request_ip("10.20.3.4".parse().unwrap())
                .request_time(evening)
                .subscription_active(true)
                .resolve(gate.catalog()),
        ),
    ];

    println!("=== Conditional Access ===\n");
    for (label, context) in &cases {
        let decision = gate
            .authorize("analytics.export", &resource, context, &export_policy)
            .expect("catalog knows analytics:view");

        if decision.is_allowed() {
            println!("  {label}: ALLOWED");
        } else {
            println!(
                "  {label}: DENIED at {:?} ({})",
                decision.failed_at.as_ref().unwrap(),
                decision.reason.as_deref().unwrap_or("no detail"),
            );
        }
    }
}
