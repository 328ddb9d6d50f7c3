use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use stockroom_auth::{JwtClaims, Role};
use stockroom_core::UserId;
use stockroom_infra::store::InMemoryStore;

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = stockroom_api::app::build_app(JWT_SECRET, Arc::new(InMemoryStore::new()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).bearer_auth(token).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn patch(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .patch(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn register_good(&self, admin: &str, code: &str, qty: i64) -> String {
        let (status, body) = self
            .post(
                admin,
                "/goods",
                json!({
                    "code": code,
                    "name": format!("{code} name"),
                    "unit": "pcs",
                    "critical_threshold": 2,
                    "initial_quantity": qty,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(user_id: UserId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: user_id,
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin() -> String {
    mint_jwt(UserId::new(), vec![Role::ADMIN])
}

fn staff(user_id: UserId) -> String {
    mint_jwt(user_id, vec![Role::STAFF])
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .get(srv.url("/goods"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn principal_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let user = UserId::new();

    let (status, body) = srv.get(&staff(user), "/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"].as_str().unwrap(), user.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "staff"));
    assert!(body["permissions"].as_array().unwrap().iter().any(|p| p == "requests.create"));
}

#[tokio::test]
async fn request_lifecycle_submit_verify_and_reverify() {
    let srv = TestServer::spawn().await;
    let admin = admin();
    let requester = UserId::new();
    let staff = staff(requester);
    let paper = srv.register_good(&admin, "PAPER", 10).await;

    // Overdraw at creation
    let (status, body) = srv
        .post(&staff, "/requests", json!({ "items": [{ "good_id": paper, "quantity": 12 }] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["details"]["available"], 10);

    // Submit
    let (status, created) = srv
        .post(
            &staff,
            "/requests",
            json!({ "items": [{ "good_id": paper, "quantity": 5 }], "note": "printer room" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["requester"].as_str().unwrap(), requester.to_string());
    let id = created["id"].as_str().unwrap().to_string();
    let line_id = created["lines"][0]["line_id"].as_str().unwrap().to_string();

    // Staff cannot verify
    let verify_body = json!({
        "decision": "Approve",
        "items": [{ "line_id": line_id, "quantity_approved": 5 }],
    });
    let (status, _) = srv
        .patch(&staff, &format!("/requests/{id}/verify"), verify_body.clone())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Approve
    let (status, verified) = srv
        .patch(&admin, &format!("/requests/{id}/verify"), verify_body.clone())
        .await;
    assert_eq!(status, StatusCode::OK, "{verified}");
    assert_eq!(verified["status"], "approved");
    assert_eq!(verified["lines"][0]["quantity_approved"], 5);

    let (_, good) = srv.get(&admin, &format!("/goods/{paper}")).await;
    assert_eq!(good["quantity_on_hand"], 5);

    // Verify again
    let (status, body) = srv
        .patch(&admin, &format!("/requests/{id}/verify"), verify_body)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_verified");
}

#[tokio::test]
async fn malformed_decisions_are_bad_requests() {
    let srv = TestServer::spawn().await;
    let admin = admin();
    let pens = srv.register_good(&admin, "PEN", 10).await;
    let (_, created) = srv
        .post(&admin, "/requests", json!({ "items": [{ "good_id": pens, "quantity": 4 }] }))
        .await;
    let id = created["id"].as_str().unwrap().to_string();
    let line_id = created["lines"][0]["line_id"].as_str().unwrap().to_string();

    let (status, body) = srv
        .patch(&admin, &format!("/requests/{id}/verify"), json!({ "decision": "Approve", "items": [] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "malformed_decision");

    let (status, body) = srv
        .patch(
            &admin,
            &format!("/requests/{id}/verify"),
            json!({ "decision": "Approve", "items": [{ "line_id": line_id, "quantity_approved": 2 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "decision_mismatch");

    let (status, body) = srv
        .patch(
            &admin,
            &format!("/requests/{}/verify", UserId::new()),
            json!({ "decision": "Reject", "items": [] }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn payload_errors_rank_behind_not_found_and_already_verified() {
    let srv = TestServer::spawn().await;
    let admin = admin();
    let pens = srv.register_good(&admin, "PEN", 10).await;
    let (_, created) = srv
        .post(&admin, "/requests", json!({ "items": [{ "good_id": pens, "quantity": 4 }] }))
        .await;
    let id = created["id"].as_str().unwrap().to_string();
    let line_id = created["lines"][0]["line_id"].as_str().unwrap().to_string();
    let garbage = json!({ "decision": "approve", "items": [{ "line_id": "not-a-uuid", "quantity_approved": 1 }] });

    // Unknown request
    let (status, body) = srv
        .patch(
            &admin,
            &format!("/requests/{}/verify", UserId::new()),
            json!({ "decision": "Bogus", "items": [] }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    // Pending request: the payload itself is the problem
    let (status, body) = srv
        .patch(&admin, &format!("/requests/{id}/verify"), garbage.clone())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "malformed_decision");

    let (status, _) = srv
        .patch(
            &admin,
            &format!("/requests/{id}/verify"),
            json!({ "decision": "Reject", "items": [{ "line_id": line_id, "quantity_approved": 0 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Already verified, whatever the payload
    let (status, body) = srv
        .patch(&admin, &format!("/requests/{id}/verify"), garbage)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_verified");
}

#[tokio::test]
async fn authorization_is_checked_before_the_body() {
    let srv = TestServer::spawn().await;
    let admin = admin();
    let staff = staff(UserId::new());
    let pens = srv.register_good(&admin, "PEN", 10).await;

    let (status, _) = srv
        .patch(
            &staff,
            &format!("/requests/{}/verify", UserId::new()),
            json!({ "decision": "Bogus", "items": [{ "line_id": "not-a-uuid", "quantity_approved": 1 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv
        .post(&staff, &format!("/goods/{pens}/stock"), json!({ "delta": "lots" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv.post(&staff, "/goods", json!({ "code": 7 })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv
        .patch(&staff, "/goods/not-a-uuid", json!({ "name": "Pencil" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admins still get the validation error
    let (status, body) = srv
        .post(&admin, &format!("/goods/{pens}/stock"), json!({ "delta": "lots" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_body");
}

#[tokio::test]
async fn staff_only_see_their_own_requests() {
    let srv = TestServer::spawn().await;
    let admin = admin();
    let alice = UserId::new();
    let bob = UserId::new();
    let pens = srv.register_good(&admin, "PEN", 10).await;

    let (_, alices) = srv
        .post(&staff(alice), "/requests", json!({ "items": [{ "good_id": pens, "quantity": 1 }] }))
        .await;
    srv.post(&staff(bob), "/requests", json!({ "items": [{ "good_id": pens, "quantity": 2 }] }))
        .await;

    let (status, page) = srv.get(&staff(bob), "/requests").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["requester"].as_str().unwrap(), bob.to_string());

    let (status, _) = srv
        .get(&staff(bob), &format!("/requests/{}", alices["id"].as_str().unwrap()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, page) = srv.get(&admin, "/requests?status=pending&per_page=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["has_more"], true);

    let (status, _) = srv.get(&staff(bob), "/requests/summary").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, summary) = srv.get(&admin, "/requests/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["pending"], 2);
    assert_eq!(summary["total"], 2);

    let (status, body) = srv.get(&admin, "/requests?status=lost").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn goods_management_and_listings() {
    let srv = TestServer::spawn().await;
    let admin = admin();
    let staff = staff(UserId::new());

    let toner = srv.register_good(&admin, "TONER", 1).await;
    let paper = srv.register_good(&admin, "PAPER", 40).await;

    // Staff may browse but not manage
    let (status, _) = srv
        .post(&staff, "/goods", json!({ "code": "X", "name": "X", "unit": "pcs" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, goods) = srv.get(&staff, "/goods").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(goods.as_array().unwrap().len(), 2);

    // Duplicate code
    let (status, body) = srv
        .post(&admin, "/goods", json!({ "code": "TONER", "name": "Toner 2", "unit": "pcs" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    // Critical list
    let (_, critical) = srv.get(&staff, "/goods/critical").await;
    let critical = critical.as_array().unwrap();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0]["id"].as_str().unwrap(), toner);

    // Stock adjustments
    let (status, body) = srv
        .post(&admin, &format!("/goods/{toner}/stock"), json!({ "delta": -2 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_operation");
    let (status, body) = srv
        .post(&admin, &format!("/goods/{toner}/stock"), json!({ "delta": 9 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity_on_hand"], 10);

    // Deactivate hides from listings and from new requests
    let (status, body) = srv
        .post(&admin, &format!("/goods/{paper}/deactivate"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);
    let (_, goods) = srv.get(&staff, "/goods").await;
    assert_eq!(goods.as_array().unwrap().len(), 1);

    let (status, body) = srv
        .post(&staff, "/requests", json!({ "items": [{ "good_id": paper, "quantity": 1 }] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_goods");
    assert_eq!(body["details"]["good_ids"][0].as_str().unwrap(), paper);

    let (_, page) = srv
        .get(&staff, "/goods/search?q=pap&include_inactive=true")
        .await;
    assert_eq!(page["total"], 1);

    // Details
    let (status, body) = srv
        .patch(&admin, &format!("/goods/{paper}"), json!({ "name": "A4 paper" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "A4 paper");
    assert_eq!(body["code"], "PAPER");

    let (status, body) = srv.get(&staff, "/goods/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");
}
