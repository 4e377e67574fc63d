//! # Role Hierarchy and Permission Catalog Example
//!
//! This example walks the fixed role hierarchy and the stock permission
//! catalog, then runs a few authorization checks against it.
//!
//! To run this example:
//! ```
//! cargo run --example role_permissions
//! ```

use coursegate::{perm, AccessPolicy, Gate, ResourceDescriptor, Role, TenantContext};
use uuid::Uuid;

fn main() {
    println!("=== Role Hierarchy ===\n");

    for role in Role::ALL {
        println!("  {role:<8} rank {}", role.rank());
    }
    println!();
    println!("  manager dominates teacher: {}", Role::Manager.dominates(Role::Teacher));
    println!("  student dominates teacher: {}", Role::Student.dominates(Role::Teacher));
    println!();

    let gate = Gate::with_standard_catalog();

    println!("=== Permission Catalog ===\n");
    for role in Role::ALL {
        let permissions = gate.catalog().permissions_for(role);
        println!("  {role} ({} permissions):", permissions.len());
        for permission in permissions {
            println!("    {permission}");
        }
    }
    println!();

    println!("=== Authorization Checks ===\n");

    let org = Uuid::new_v4();
    let course = ResourceDescriptor::new("course", Uuid::new_v4()).in_organization(org);
    let grade_policy = AccessPolicy::new().require(perm::ASSESSMENT_GRADE);

    for role in Role::ALL {
        let context = TenantContext::builder(Uuid::new_v4(), role, org).resolve(gate.catalog());
        let decision = gate
            .authorize("assessment.grade", &course, &context, &grade_policy)
            .expect("catalog knows assessment:grade");
        println!(
            "  {role:<8} grading an assessment: {}",
            if decision.is_allowed() { "ALLOWED" } else { "DENIED" }
        );
    }
}
