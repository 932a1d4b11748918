//! Shared utilities for integration testing.
//!
//! Collaborators are programmable axum servers on ephemeral ports; the
//! gateway router is driven in-process with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, Request, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use library_gateway::config::GatewayConfig;
use library_gateway::HttpServer;

pub const USER: &str = "Test Max";
pub const LIBRARY_UID: &str = "83575e12-7ce0-48ee-9931-51919ff3c9ee";
pub const BOOK_UID: &str = "f7cdc58f-2caf-4b15-9727-f89dcc629b27";
pub const RESERVATION_UID: &str = "3a2b1c4d-0000-4000-8000-000000000001";

/// One request a mock service received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub user: Option<String>,
    pub idempotency_key: Option<String>,
    pub body: String,
}

impl RecordedCall {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Clone, Default)]
struct MockState {
    routes: Arc<Mutex<HashMap<(String, String), (u16, Value, Duration)>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

/// A collaborator stand-in answering canned responses per method and path.
pub struct MockService {
    pub addr: SocketAddr,
    state: MockState,
}

impl MockService {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .fallback(record_and_respond)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Register (or replace) the answer for `method path`. `Value::Null` sends no body.
    pub fn respond(&self, method: &str, path: &str, status: u16, body: Value) {
        self.respond_after(method, path, Duration::ZERO, status, body);
    }

    /// Like [`MockService::respond`], answering only after `delay`.
    pub fn respond_after(&self, method: &str, path: &str, delay: Duration, status: u16, body: Value) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body, delay));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path == path)
            .collect()
    }
}

async fn record_and_respond(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.calls.lock().unwrap().push(RecordedCall {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        user: header_value("x-user-name"),
        idempotency_key: header_value("idempotency-key"),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let answer = state
        .routes
        .lock()
        .unwrap()
        .get(&(method.to_string(), uri.path().to_string()))
        .cloned();
    let (status, body, delay) = answer.unwrap_or((404, json!({ "message": "not found" }), Duration::ZERO));
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let body = if body.is_null() {
        Body::empty()
    } else {
        Body::from(body.to_string())
    };
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap()
}

/// A URL nothing listens on, for transport failures.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn book_path() -> String {
    format!("/api/v1/libraries/{LIBRARY_UID}/books/{BOOK_UID}")
}

pub fn library_path() -> String {
    format!("/api/v1/libraries/{LIBRARY_UID}")
}

pub fn book_json(available_count: i64, condition: &str) -> Value {
    json!({
        "bookUid": BOOK_UID,
        "name": "Краткий курс C++ в 7 томах",
        "author": "Бьерн Страуструп",
        "genre": "Научная фантастика",
        "condition": condition,
        "availableCount": available_count,
    })
}

pub fn library_json() -> Value {
    json!({
        "libraryUid": LIBRARY_UID,
        "name": "Библиотека имени 7 Непьющих",
        "address": "2-я Бауманская ул., д.5, стр.1",
        "city": "Москва",
    })
}

pub fn reservation_json(till_date: &str, condition: &str) -> Value {
    json!({
        "reservationUid": RESERVATION_UID,
        "status": "RENTED",
        "startDate": "2024-01-01",
        "tillDate": till_date,
        "bookUid": BOOK_UID,
        "libraryUid": LIBRARY_UID,
        "bookCondition": condition,
    })
}

/// The three collaborators, primed for a successful reservation and return.
pub struct Collaborators {
    pub catalog: MockService,
    pub reputation: MockService,
    pub ledger: MockService,
}

impl Collaborators {
    pub async fn start() -> Self {
        let catalog = MockService::start().await;
        catalog.respond("GET", &book_path(), 200, book_json(1, "EXCELLENT"));
        catalog.respond("GET", &library_path(), 200, library_json());
        catalog.respond("POST", &format!("{}/decrease", book_path()), 200, json!({}));
        catalog.respond("POST", &format!("{}/increase", book_path()), 200, json!({}));

        let reputation = MockService::start().await;
        reputation.respond("GET", "/api/v1/rating", 200, json!({ "stars": 5 }));
        reputation.respond("POST", "/api/v1/rating/adjust", 200, json!({}));

        let ledger = MockService::start().await;
        ledger.respond("GET", "/api/v1/reservations/active/count", 200, json!({ "count": 0 }));
        ledger.respond("POST", "/api/v1/reservations", 200, reservation_json("2024-01-10", "EXCELLENT"));
        ledger.respond(
            "GET",
            "/api/v1/reservations",
            200,
            json!([reservation_json("2024-01-10", "EXCELLENT")]),
        );
        ledger.respond(
            "POST",
            &format!("/api/v1/reservations/{RESERVATION_UID}/return"),
            204,
            Value::Null,
        );
        ledger.respond(
            "DELETE",
            &format!("/api/v1/reservations/{RESERVATION_UID}/rollback"),
            204,
            Value::Null,
        );
        ledger.respond(
            "POST",
            &format!("/api/v1/reservations/{RESERVATION_UID}/rollback-return"),
            204,
            Value::Null,
        );

        Self {
            catalog,
            reputation,
            ledger,
        }
    }

    pub fn config(&self) -> GatewayConfig {
        config_for(&self.catalog.url(), &self.reputation.url(), &self.ledger.url())
    }
}

pub fn config_for(catalog: &str, reputation: &str, ledger: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.services.catalog_url = catalog.to_string();
    config.services.reputation_url = reputation.to_string();
    config.services.ledger_url = ledger.to_string();
    config.timeouts.upstream_secs = 2;
    config.observability.metrics_enabled = false;
    config
}

pub fn gateway(config: GatewayConfig) -> HttpServer {
    HttpServer::new(config).unwrap()
}

/// Send one request through `router` and decode the JSON answer (`Null` when empty).
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("X-User-Name", user);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, headers, json)
}
