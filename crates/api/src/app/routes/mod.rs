use axum::{routing::get, Router};

pub mod common;
pub mod goods;
pub mod requests;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .merge(goods::router())
        .merge(requests::router())
}
