//! Static role-to-permission mapping.
//!
//! Permissions are a pure function of the role. Keeping the mapping in one
//! table avoids scattered role branching in handlers and makes missed-case
//! bugs impossible to introduce silently when a role is added: the match
//! below stops compiling instead.

use crate::db::UserRole;

const GUEST_PERMISSIONS: &[&str] = &[
    "listings:read",
    "bookings:create",
    "bookings:read:own",
    "bookings:cancel:own",
    "profile:write:own",
    "reviews:write:own",
];

const HOST_PERMISSIONS: &[&str] = &[
    "listings:read",
    "listings:manage:own",
    "bookings:create",
    "bookings:read:own",
    "bookings:cancel:own",
    "bookings:manage:listing",
    "profile:write:own",
    "reviews:write:own",
    "payouts:read:own",
];

const ADMIN_PERMISSIONS: &[&str] = &[
    "listings:read",
    "listings:manage:any",
    "bookings:read:any",
    "bookings:manage:any",
    "users:manage",
    "sessions:revoke:any",
    "reviews:moderate",
];

/// Permission set for a role.
pub fn for_role(role: UserRole) -> &'static [&'static str] {
    match role {
        UserRole::Guest => GUEST_PERMISSIONS,
        UserRole::Host => HOST_PERMISSIONS,
        UserRole::Admin => ADMIN_PERMISSIONS,
    }
}
