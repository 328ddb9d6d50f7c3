//! `stockroom-auth`: authentication/authorization boundary.
//!
//! Identity itself (login, token issuance, revocation) lives outside this
//! workspace; this crate only verifies tokens and answers permission checks.
//! It is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, AuthzError, CommandAuthorization};
pub use claims::{validate_claims, JwtClaims, TokenValidationError};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
