use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};

use stockroom_auth::Permission;
use stockroom_core::DomainError;
use stockroom_infra::store::{Pagination, RequestFilter};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/requests", get(list_requests).post(create_request))
        .route("/requests/summary", get(request_summary))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/verify", patch(verify_request))
}

/// How much of the request log a caller may see.
enum ReadScope {
    All,
    Own,
}

fn read_scope(principal: &PrincipalContext) -> Option<ReadScope> {
    if authz::has_permission(principal, &Permission::REQUESTS_READ_ALL) {
        Some(ReadScope::All)
    } else if authz::has_permission(principal, &Permission::REQUESTS_READ_OWN) {
        Some(ReadScope::Own)
    } else {
        None
    }
}

pub async fn create_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::CreateRequestBody>, JsonRejection>,
) -> Response {
    let cmd_auth = CmdAuth::new(body, Permission::REQUESTS_CREATE);
    if let Err(e) = authz::authorize_command(&principal, &cmd_auth) {
        return errors::forbidden(e);
    }
    let Json(body) = match cmd_auth.inner {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let items = match body.items() {
        Ok(items) => items,
        Err(res) => return res,
    };

    match services
        .creation
        .create_request(principal.user_id(), items, body.note)
        .await
    {
        Ok(request) => {
            (StatusCode::CREATED, Json(dto::RequestResponse::from(&request))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn verify_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::VerifyRequestBody>, JsonRejection>,
) -> Response {
    let cmd_auth = CmdAuth::new(body, Permission::REQUESTS_VERIFY);
    if let Err(e) = authz::authorize_command(&principal, &cmd_auth) {
        return errors::forbidden(e);
    }
    let request_id = match dto::parse_request_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let Json(body) = match cmd_auth.inner {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    // Payload errors are ranked by the engine, after NotFound and AlreadyVerified.
    match services
        .verification
        .verify_submitted(request_id, principal.user_id(), body.decision())
        .await
    {
        Ok(request) => Json(dto::RequestResponse::from(&request)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let Some(scope) = read_scope(&principal) else {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", "missing permission: requests.read.own");
    };
    let request_id = match dto::parse_request_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.queries.request(request_id).await {
        // Other users' requests are indistinguishable from missing ones.
        Ok(request)
            if matches!(scope, ReadScope::Own) && request.requester() != Some(principal.user_id()) =>
        {
            errors::domain_error_to_response(DomainError::NotFound)
        }
        Ok(request) => Json(dto::RequestResponse::from(&request)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<dto::ListRequestsQuery>, QueryRejection>,
) -> Response {
    let Some(scope) = read_scope(&principal) else {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", "missing permission: requests.read.own");
    };
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };

    let status = match query.status.as_deref().map(dto::parse_status).transpose() {
        Ok(v) => v,
        Err(res) => return res,
    };
    let requester = match scope {
        ReadScope::Own => Some(principal.user_id()),
        ReadScope::All => match query.requester.as_deref().map(dto::parse_user_id).transpose() {
            Ok(v) => v,
            Err(res) => return res,
        },
    };

    let filter = RequestFilter {
        status,
        requester,
        submitted_from: query.submitted_from,
        submitted_to: query.submitted_to,
    };
    let page = Pagination::new(query.page, query.per_page);

    match services.queries.list_requests(&filter, page).await {
        Ok(page) => Json(page.map(|r| dto::RequestResponse::from(&r))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn request_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(e) = authz::require(&principal, &Permission::REQUESTS_READ_ALL) {
        return errors::forbidden(e);
    }
    match services.queries.request_summary().await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
