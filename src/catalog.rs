//! Permission catalog: the immutable role → permission mapping.
//!
//! The catalog is built once at process start and never mutated afterwards;
//! request handling only reads it. Construction validates exhaustiveness so a
//! misconfigured deployment fails fast instead of producing surprising
//! denials at request time.

use std::borrow::{Borrow, Cow};
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::role::Role;

/// Permission identifier namespaced as `resource:action`, e.g. `course:create`.
///
/// Permissions are opaque, case-sensitive strings, immutable once defined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Permission {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for Permission {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl Borrow<str> for Permission {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

/// Stock permission identifiers granted by [`PermissionCatalog::standard`].
pub mod perm {
    pub const COURSE_VIEW: &str = "course:view";
    pub const COURSE_CREATE: &str = "course:create";
    pub const COURSE_UPDATE: &str = "course:update";
    pub const COURSE_DELETE: &str = "course:delete";
    pub const COURSE_PUBLISH: &str = "course:publish";
    pub const CONTENT_VIEW: &str = "content:view";
    pub const CONTENT_UPLOAD: &str = "content:upload";
    pub const ENROLLMENT_CREATE: &str = "enrollment:create";
    pub const ENROLLMENT_MANAGE: &str = "enrollment:manage";
    pub const ASSESSMENT_TAKE: &str = "assessment:take";
    pub const ASSESSMENT_GRADE: &str = "assessment:grade";
    pub const USER_VIEW: &str = "user:view";
    pub const USER_MANAGE: &str = "user:manage";
    pub const ANALYTICS_VIEW: &str = "analytics:view";
    pub const BILLING_MANAGE: &str = "billing:manage";
    pub const ORG_MANAGE: &str = "org:manage";
    /// Grants cross-organization access; see `Gate::authorize` step 3.
    pub const SYSTEM_ADMIN: &str = "system:admin";

    pub(crate) const ALL: [&str; 17] = [
        COURSE_VIEW,
        COURSE_CREATE,
        COURSE_UPDATE,
        COURSE_DELETE,
        COURSE_PUBLISH,
        CONTENT_VIEW,
        CONTENT_UPLOAD,
        ENROLLMENT_CREATE,
        ENROLLMENT_MANAGE,
        ASSESSMENT_TAKE,
        ASSESSMENT_GRADE,
        USER_VIEW,
        USER_MANAGE,
        ANALYTICS_VIEW,
        BILLING_MANAGE,
        ORG_MANAGE,
        SYSTEM_ADMIN,
    ];
}

/// Configuration-level failure: a deployment/programming bug, never a normal
/// denial. Callers should treat these as 5xx-equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("permission '{0}' is not part of the declared universe")]
    UnknownPermission(String),

    #[error("permission '{0}' is granted to no role")]
    OrphanedPermission(String),

    #[error("role '{0}' has no grant entry")]
    MissingRole(Role),

    #[error("prerequisite node {node} cannot be evaluated: {detail}")]
    InvalidNode { node: Uuid, detail: String },
}

/// Immutable mapping from each role to its granted permission set.
///
/// Grants are stored indexed by [`Role::rank`], so `permissions_for` is total
/// over the role enumeration by construction.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    universe: BTreeSet<Permission>,
    grants: [BTreeSet<Permission>; 6],
}

impl PermissionCatalog {
    /// The stock catalog.
    ///
    /// Sets grow with rank: each role inherits everything below it plus its
    /// own grants. Admin and owner hold the full universe, which also makes
    /// the exhaustiveness requirement hold trivially.
    pub fn standard() -> Self {
        let universe: BTreeSet<Permission> =
            perm::ALL.iter().map(|name| Permission::from(*name)).collect();

        let viewer: BTreeSet<Permission> = [perm::COURSE_VIEW, perm::CONTENT_VIEW]
            .into_iter()
            .map(Permission::from)
            .collect();

        let mut student = viewer.clone();
        student.extend(
            [perm::ENROLLMENT_CREATE, perm::ASSESSMENT_TAKE, perm::USER_VIEW]
                .into_iter()
                .map(Permission::from),
        );

        let mut teacher = student.clone();
        teacher.extend(
            [
                perm::COURSE_CREATE,
                perm::COURSE_UPDATE,
                perm::COURSE_PUBLISH,
                perm::CONTENT_UPLOAD,
                perm::ASSESSMENT_GRADE,
            ]
            .into_iter()
            .map(Permission::from),
        );

        let mut manager = teacher.clone();
        manager.extend(
            [perm::ENROLLMENT_MANAGE, perm::USER_MANAGE, perm::ANALYTICS_VIEW]
                .into_iter()
                .map(Permission::from),
        );

        let admin = universe.clone();
        let owner = universe.clone();

        Self {
            universe,
            grants: [viewer, student, teacher, manager, admin, owner],
        }
    }

    /// Builds a custom catalog from explicit per-role grants.
    ///
    /// Validates the configuration the way startup code should: every role
    /// needs an entry, every granted permission must belong to the declared
    /// universe, and every universe permission must be granted to at least
    /// one role (no orphans).
    pub fn from_grants<I, P>(
        universe: impl IntoIterator<Item = Permission>,
        grants: I,
    ) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (Role, P)>,
        P: IntoIterator<Item = Permission>,
    {
        let universe: BTreeSet<Permission> = universe.into_iter().collect();
        let mut sets: [Option<BTreeSet<Permission>>; 6] = Default::default();

        for (role, permissions) in grants {
            let set: BTreeSet<Permission> = permissions.into_iter().collect();
            for permission in &set {
                if !universe.contains(permission) {
                    return Err(ConfigurationError::UnknownPermission(
                        permission.as_str().to_string(),
                    ));
                }
            }
            sets[role.rank() as usize] = Some(set);
        }

        let mut grants: [BTreeSet<Permission>; 6] = Default::default();
        for role in Role::ALL {
            match sets[role.rank() as usize].take() {
                Some(set) => grants[role.rank() as usize] = set,
                None => return Err(ConfigurationError::MissingRole(role)),
            }
        }

        for permission in &universe {
            if !grants.iter().any(|set| set.contains(permission)) {
                return Err(ConfigurationError::OrphanedPermission(
                    permission.as_str().to_string(),
                ));
            }
        }

        Ok(Self { universe, grants })
    }

    /// The permission set granted to a role. Total over the role enumeration.
    pub fn permissions_for(&self, role: Role) -> &BTreeSet<Permission> {
        &self.grants[role.rank() as usize]
    }

    pub fn has_permission(&self, role: Role, permission: &str) -> bool {
        self.permissions_for(role).contains(permission)
    }

    /// Whether the permission identifier is part of the declared universe.
    pub fn is_known(&self, permission: &str) -> bool {
        self.universe.contains(permission)
    }

    pub fn universe(&self) -> &BTreeSet<Permission> {
        &self.universe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_has_a_nonempty_subset_of_the_universe() {
        let catalog = PermissionCatalog::standard();
        for role in Role::ALL {
            let set = catalog.permissions_for(role);
            assert!(!set.is_empty(), "{role} has no permissions");
            assert!(set.is_subset(catalog.universe()));
        }
    }

    #[test]
    fn admin_holds_the_full_universe() {
        let catalog = PermissionCatalog::standard();
        assert_eq!(catalog.permissions_for(Role::Admin), catalog.universe());
        assert_eq!(catalog.permissions_for(Role::Owner), catalog.universe());
    }

    #[test]
    fn sets_grow_with_rank_in_the_standard_catalog() {
        let catalog = PermissionCatalog::standard();
        for pair in Role::ALL.windows(2) {
            let lower = catalog.permissions_for(pair[0]);
            let higher = catalog.permissions_for(pair[1]);
            assert!(
                lower.is_subset(higher),
                "{} should inherit everything {} holds",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn has_permission_matches_set_membership() {
        let catalog = PermissionCatalog::standard();
        assert!(catalog.has_permission(Role::Teacher, perm::COURSE_CREATE));
        assert!(!catalog.has_permission(Role::Student, perm::COURSE_CREATE));
        assert!(catalog.has_permission(Role::Student, perm::ENROLLMENT_CREATE));
        assert!(!catalog.has_permission(Role::Manager, perm::SYSTEM_ADMIN));
    }

    #[test]
    fn from_grants_rejects_orphaned_permissions() {
        let universe = vec![
            Permission::from("course:view"),
            Permission::from("course:create"),
        ];
        let grants = Role::ALL
            .into_iter()
            .map(|role| (role, vec![Permission::from("course:view")]));

        let err = PermissionCatalog::from_grants(universe, grants).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::OrphanedPermission("course:create".to_string())
        );
    }

    #[test]
    fn from_grants_rejects_permissions_outside_the_universe() {
        let universe = vec![Permission::from("course:view")];
        let grants = Role::ALL
            .into_iter()
            .map(|role| (role, vec![Permission::from("course:delete")]));

        let err = PermissionCatalog::from_grants(universe, grants).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownPermission("course:delete".to_string())
        );
    }

    #[test]
    fn from_grants_requires_an_entry_for_every_role() {
        let universe = vec![Permission::from("course:view")];
        let grants = vec![(Role::Admin, vec![Permission::from("course:view")])];

        let err = PermissionCatalog::from_grants(universe, grants).unwrap_err();
        assert_eq!(err, ConfigurationError::MissingRole(Role::Viewer));
    }
}
