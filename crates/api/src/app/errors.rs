use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use stockroom_auth::AuthzError;
use stockroom_core::DomainError;
use stockroom_infra::{ServiceError, StoreError};

pub fn service_error_to_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Store(e) => store_error_to_response(e),
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let status = match &err {
        DomainError::NotFound => StatusCode::NOT_FOUND,
        DomainError::AlreadyVerified | DomainError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    };

    let details = match &err {
        DomainError::InvalidGoods(ids) => Some(json!({
            "good_ids": ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
        })),
        DomainError::InsufficientStock {
            good_id,
            requested,
            available,
        } => Some(json!({
            "good_id": good_id.to_string(),
            "requested": requested,
            "available": available,
        })),
        DomainError::ExceedsRequested {
            line_id,
            good_id,
            requested,
            approved,
        } => Some(json!({
            "line_id": line_id.to_string(),
            "good_id": good_id.to_string(),
            "requested": requested,
            "approved": approved,
        })),
        _ => None,
    };

    json_error_with_details(status, err.code(), err.to_string(), details)
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::Transient(msg) => {
            tracing::warn!(error = %msg, "transient store failure");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                "storage is temporarily unavailable, retry the request",
            )
        }
        StoreError::Conflict(msg) | StoreError::Duplicate(msg) => {
            json_error(StatusCode::CONFLICT, "conflict", msg)
        }
        other => {
            tracing::error!(error = %other, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "internal storage error")
        }
    }
}

pub fn forbidden(err: AuthzError) -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn json_rejection(rejection: JsonRejection) -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_query", rejection.body_text())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    json_error_with_details(status, code, message, None)
}

pub fn json_error_with_details(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    details: Option<Value>,
) -> Response {
    let mut body = json!({
        "error": code,
        "message": message.into(),
    });
    if let Some(details) = details {
        body["details"] = details;
    }
    (status, axum::Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::GoodId;

    #[test]
    fn domain_errors_map_to_http_statuses() {
        let cases = [
            (DomainError::NotFound, StatusCode::NOT_FOUND),
            (DomainError::AlreadyVerified, StatusCode::CONFLICT),
            (DomainError::conflict("code taken"), StatusCode::CONFLICT),
            (DomainError::EmptyRequest, StatusCode::BAD_REQUEST),
            (DomainError::InvalidGoods(vec![GoodId::new()]), StatusCode::BAD_REQUEST),
            (DomainError::malformed_decision("missing line"), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn store_errors_map_to_http_statuses() {
        let transient = ServiceError::Store(StoreError::Transient("40001".into()));
        assert_eq!(
            service_error_to_response(transient).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let corrupt = ServiceError::Store(StoreError::Corrupt("bad row".into()));
        assert_eq!(
            service_error_to_response(corrupt).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
