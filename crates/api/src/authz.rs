//! API-side authorization guard for commands and queries.
//!
//! This enforces authorization at the service boundary (before any unit of work
//! is opened), while keeping domain aggregates and infra auth-agnostic.

use stockroom_auth::{AuthzError, CommandAuthorization, Permission, Principal, Role, authorize};

use crate::context::PrincipalContext;

/// Check authorization for a command in the current request context.
///
/// This is intended to be called **before** executing a command.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = resolve(principal);
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}

/// Require a single permission (query routes).
pub fn require(principal: &PrincipalContext, permission: &Permission) -> Result<(), AuthzError> {
    authorize(&resolve(principal), permission)
}

pub fn has_permission(principal: &PrincipalContext, permission: &Permission) -> bool {
    resolve(principal).has_permission(permission)
}

pub fn resolve(principal: &PrincipalContext) -> Principal {
    Principal {
        user_id: principal.user_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    }
}

/// Static role→permission policy.
///
/// `admin` grants everything; `staff` may submit requests, read their own
/// requests and browse goods. Unknown roles grant nothing.
pub fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.contains(&Role::ADMIN) {
        return vec![Permission::ALL];
    }

    let mut permissions = Vec::new();
    if roles.contains(&Role::STAFF) {
        permissions.extend([
            Permission::REQUESTS_CREATE,
            Permission::REQUESTS_READ_OWN,
            Permission::GOODS_READ,
        ]);
    }
    permissions
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::UserId;

    fn ctx(roles: &[Role]) -> PrincipalContext {
        PrincipalContext::new(UserId::new(), roles.to_vec())
    }

    #[test]
    fn admin_holds_every_permission() {
        let admin = ctx(&[Role::ADMIN]);
        assert!(has_permission(&admin, &Permission::REQUESTS_VERIFY));
        assert!(has_permission(&admin, &Permission::new("anything.else")));
    }

    #[test]
    fn staff_cannot_verify_or_manage_goods() {
        let staff = ctx(&[Role::STAFF]);
        assert!(has_permission(&staff, &Permission::REQUESTS_CREATE));
        assert!(has_permission(&staff, &Permission::GOODS_READ));
        assert!(require(&staff, &Permission::REQUESTS_VERIFY).is_err());
        assert!(require(&staff, &Permission::GOODS_MANAGE).is_err());
        assert!(!has_permission(&staff, &Permission::REQUESTS_READ_ALL));
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let guest = ctx(&[Role::new("guest")]);
        assert!(permissions_from_roles(guest.roles()).is_empty());
        assert!(require(&guest, &Permission::GOODS_READ).is_err());
    }
}
