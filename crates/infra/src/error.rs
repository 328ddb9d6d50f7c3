use thiserror::Error;

use stockroom_core::DomainError;

/// Storage operation error.
///
/// These are **infrastructure errors** (connectivity, serialization failures,
/// corrupt rows) as opposed to domain errors (validation, business rules).
///
/// ## Error Categories
///
/// - **Transient**: Retryable (serialization failure, deadlock, lock timeout, pool exhausted)
/// - **Conflict**: Optimistic version check failed on write
/// - **Duplicate**: A uniqueness constraint was violated
/// - **Database**: Any other backend failure
/// - **Corrupt**: A stored row could not be mapped back into the domain
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient storage failure: {0}")]
    Transient(String),

    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Error returned by the application services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Surface storage conflicts as the domain's `Conflict` so callers see one kind.
    pub fn normalize(self) -> Self {
        match self {
            ServiceError::Store(StoreError::Conflict(msg))
            | ServiceError::Store(StoreError::Duplicate(msg)) => {
                ServiceError::Domain(DomainError::conflict(msg))
            }
            other => other,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_normalize_to_domain_conflict() {
        let err = ServiceError::from(StoreError::Duplicate("goods_code_key".into())).normalize();
        assert!(matches!(err, ServiceError::Domain(DomainError::Conflict(_))));

        let err = ServiceError::from(StoreError::Transient("40001".into())).normalize();
        assert!(matches!(err, ServiceError::Store(StoreError::Transient(_))));
    }
}
