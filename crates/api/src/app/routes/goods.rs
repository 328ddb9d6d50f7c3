use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use stockroom_auth::Permission;
use stockroom_infra::services::{GoodChanges, NewGood};
use stockroom_infra::store::{GoodFilter, Pagination};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/goods", get(list_active).post(register_good))
        .route("/goods/critical", get(list_critical))
        .route("/goods/search", get(search_goods))
        .route("/goods/:id", get(get_good).patch(update_good))
        .route("/goods/:id/stock", post(adjust_stock))
        .route("/goods/:id/deactivate", post(deactivate_good))
        .route("/goods/:id/reactivate", post(reactivate_good))
}

fn goods_response(goods: &[stockroom_inventory::Good]) -> Response {
    Json(goods.iter().map(dto::GoodResponse::from).collect::<Vec<_>>()).into_response()
}

pub async fn list_active(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(e) = authz::require(&principal, &Permission::GOODS_READ) {
        return errors::forbidden(e);
    }
    match services.ledger.active_goods().await {
        Ok(goods) => goods_response(&goods),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_critical(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(e) = authz::require(&principal, &Permission::GOODS_READ) {
        return errors::forbidden(e);
    }
    match services.ledger.critical_goods().await {
        Ok(goods) => goods_response(&goods),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn search_goods(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<dto::SearchGoodsQuery>, QueryRejection>,
) -> Response {
    if let Err(e) = authz::require(&principal, &Permission::GOODS_READ) {
        return errors::forbidden(e);
    }
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };

    let filter = GoodFilter {
        include_inactive: query.include_inactive,
        search: query.q,
    };
    let page = Pagination::new(query.page, query.per_page);

    match services.queries.list_goods(&filter, page).await {
        Ok(page) => Json(page.map(|g| dto::GoodResponse::from(&g))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_good(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = authz::require(&principal, &Permission::GOODS_READ) {
        return errors::forbidden(e);
    }
    let id = match dto::parse_good_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.ledger.good(id).await {
        Ok(good) => Json(dto::GoodResponse::from(&good)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn register_good(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::RegisterGoodBody>, JsonRejection>,
) -> Response {
    let cmd_auth = CmdAuth::new(body, Permission::GOODS_MANAGE);
    if let Err(e) = authz::authorize_command(&principal, &cmd_auth) {
        return errors::forbidden(e);
    }
    let Json(body) = match cmd_auth.inner {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.ledger.register_good(NewGood::from(body)).await {
        Ok(good) => (StatusCode::CREATED, Json(dto::GoodResponse::from(&good))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::AdjustStockBody>, JsonRejection>,
) -> Response {
    let cmd_auth = CmdAuth::new(body, Permission::GOODS_MANAGE);
    if let Err(e) = authz::authorize_command(&principal, &cmd_auth) {
        return errors::forbidden(e);
    }
    let id = match dto::parse_good_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let Json(body) = match cmd_auth.inner {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.ledger.adjust_stock(id, body.delta).await {
        Ok(good) => Json(dto::GoodResponse::from(&good)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_good(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateGoodBody>, JsonRejection>,
) -> Response {
    let cmd_auth = CmdAuth::new(body, Permission::GOODS_MANAGE);
    if let Err(e) = authz::authorize_command(&principal, &cmd_auth) {
        return errors::forbidden(e);
    }
    let id = match dto::parse_good_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let Json(body) = match cmd_auth.inner {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.ledger.update_details(id, GoodChanges::from(body)).await {
        Ok(good) => Json(dto::GoodResponse::from(&good)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn deactivate_good(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = authz::require(&principal, &Permission::GOODS_MANAGE) {
        return errors::forbidden(e);
    }
    let id = match dto::parse_good_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.ledger.deactivate(id).await {
        Ok(good) => Json(dto::GoodResponse::from(&good)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn reactivate_good(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = authz::require(&principal, &Permission::GOODS_MANAGE) {
        return errors::forbidden(e);
    }
    let id = match dto::parse_good_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.ledger.reactivate(id).await {
        Ok(good) => Json(dto::GoodResponse::from(&good)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
