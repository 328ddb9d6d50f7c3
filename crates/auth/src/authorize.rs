use thiserror::Error;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked at the command boundary).
///
/// The API layer enforces these requirements before calling a service.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal for a single permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.has_permission(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use stockroom_core::UserId;

    fn principal(permissions: Vec<Permission>) -> Principal {
        Principal {
            user_id: UserId::new(),
            roles: vec![Role::STAFF],
            permissions,
        }
    }

    #[test]
    fn explicit_permission_is_granted() {
        let p = principal(vec![Permission::REQUESTS_CREATE]);
        assert!(authorize(&p, &Permission::REQUESTS_CREATE).is_ok());
    }

    #[test]
    fn wildcard_grants_everything() {
        let p = principal(vec![Permission::ALL]);
        assert!(authorize(&p, &Permission::REQUESTS_VERIFY).is_ok());
        assert!(authorize(&p, &Permission::new("anything.else")).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let p = principal(vec![Permission::REQUESTS_CREATE]);
        assert_eq!(
            authorize(&p, &Permission::REQUESTS_VERIFY),
            Err(AuthzError::Forbidden("requests.verify".to_string()))
        );
    }
}
