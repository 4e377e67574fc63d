//! Request-scoped input contracts.
//!
//! [`TenantContext`] is built once per inbound request by the caller's
//! identity/session layer, read by every evaluation in that request, and
//! discarded at request end. It is never persisted and never shared across
//! subjects. [`ResourceDescriptor`] identifies what is being accessed and is
//! assembled by the route handler from path/query parameters.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::catalog::{Permission, PermissionCatalog};
use crate::role::Role;

/// Everything the decision engine knows about the caller.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub subject_id: Uuid,
    pub role: Role,
    pub organization_id: Uuid,
    /// The subject's resolved permission set, a convenience copy for the
    /// boundary layer; the authoritative lookup goes through the catalog.
    pub permissions: BTreeSet<Permission>,
    pub subscription_active: bool,
    pub email_verified: bool,
    pub request_ip: IpAddr,
    pub request_time: DateTime<Utc>,
    /// When the subject's account was created. Optional because not every
    /// identity provider exposes it; the trial-period condition refuses to
    /// evaluate without it.
    pub subject_created_at: Option<DateTime<Utc>>,
}

impl TenantContext {
    /// Starts a builder for the given subject identity.
    pub fn builder(subject_id: Uuid, role: Role, organization_id: Uuid) -> TenantContextBuilder {
        TenantContextBuilder {
            subject_id,
            role,
            organization_id,
            subscription_active: false,
            email_verified: false,
            request_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            request_time: None,
            subject_created_at: None,
        }
    }
}

/// Fluent construction of a [`TenantContext`], finished by resolving the
/// subject's permission set from a catalog.
#[derive(Debug, Clone)]
pub struct TenantContextBuilder {
    subject_id: Uuid,
    role: Role,
    organization_id: Uuid,
    subscription_active: bool,
    email_verified: bool,
    request_ip: IpAddr,
    request_time: Option<DateTime<Utc>>,
    subject_created_at: Option<DateTime<Utc>>,
}

impl TenantContextBuilder {
    pub fn subscription_active(mut self, active: bool) -> Self {
        self.subscription_active = active;
        self
    }

    pub fn email_verified(mut self, verified: bool) -> Self {
        self.email_verified = verified;
        self
    }

    pub fn request_ip(mut self, ip: IpAddr) -> Self {
        self.request_ip = ip;
        self
    }

    pub fn request_time(mut self, time: DateTime<Utc>) -> Self {
        self.request_time = Some(time);
        self
    }

    pub fn subject_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.subject_created_at = Some(created_at);
        self
    }

    /// Finishes the context, filling the permission set from `catalog`.
    ///
    /// The request time defaults to now when the transport layer did not
    /// supply one.
    pub fn resolve(self, catalog: &PermissionCatalog) -> TenantContext {
        TenantContext {
            subject_id: self.subject_id,
            role: self.role,
            organization_id: self.organization_id,
            permissions: catalog.permissions_for(self.role).clone(),
            subscription_active: self.subscription_active,
            email_verified: self.email_verified,
            request_ip: self.request_ip,
            request_time: self.request_time.unwrap_or_else(Utc::now),
            subject_created_at: self.subject_created_at,
        }
    }
}

/// What is being accessed: type, identity, and ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub resource_type: Cow<'static, str>,
    pub resource_id: Uuid,
    pub owner_user_id: Option<Uuid>,
    pub owner_organization_id: Option<Uuid>,
}

impl ResourceDescriptor {
    pub fn new(resource_type: impl Into<Cow<'static, str>>, resource_id: Uuid) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id,
            owner_user_id: None,
            owner_organization_id: None,
        }
    }

    pub fn owned_by(mut self, user_id: Uuid) -> Self {
        self.owner_user_id = Some(user_id);
        self
    }

    pub fn in_organization(mut self, organization_id: Uuid) -> Self {
        self.owner_organization_id = Some(organization_id);
        self
    }
}
