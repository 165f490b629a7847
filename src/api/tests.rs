//! Router-level tests.
//!
//! These drive the real router, middleware included, against the in-memory
//! repositories so the full request path runs without Postgres.

#![allow(clippy::unwrap_used)]

use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE},
        Method, Request, StatusCode,
    },
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{path::PathBuf, sync::Arc};
use tower::ServiceExt;

use super::{app, cors, AppState};
use crate::{
    auth::{AuthConfig, AuthState},
    inference::ModelStore,
    store::{memory::MemoryStore, Repositories},
};

const EMAIL: &str = "test@example.com";
const PASSWORD: &str = "Aa1!thisisstrong";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_model(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("artifacts/iris_clf.json"))
    }

    fn with_model(model_path: PathBuf) -> Self {
        let store = Arc::new(MemoryStore::default());
        let state = AppState {
            repos: Repositories::from_backend(store.clone()),
            auth: Arc::new(AuthState::new(
                AuthConfig::default(),
                SecretString::from("router-test-secret-key".to_string()),
            )),
            models: Arc::new(ModelStore::new(model_path)),
        };
        let cors = cors(&["http://localhost:3000".to_string()]).unwrap();
        Self {
            router: app(state, cors),
            store,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.send(request).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    async fn register(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.json(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    async fn login(&self, username: &str, password: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "grant_type=password&username={}&password={}",
                urlencode(username),
                urlencode(password)
            )))
            .unwrap();
        let response = self.send(request).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    async fn token(&self) -> String {
        let (status, _) = self.register(EMAIL, PASSWORD).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = self.login(EMAIL, PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
        body["access_token"].as_str().unwrap().to_string()
    }
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}

#[tokio::test]
async fn register_returns_public_projection() {
    let app = TestApp::new();
    let (status, body) = app.register(" Test@Example.com ", PASSWORD).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], EMAIL);
    assert!(body["id"].is_i64());
    assert!(body["created_at"].is_string());
    assert!(body.get("hashed_password").is_none());
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let app = TestApp::new();
    app.register(EMAIL, PASSWORD).await;
    let (status, body) = app.register("TEST@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "detail": "Email already registered" }));
}

#[tokio::test]
async fn weak_password_is_rejected_with_field_detail() {
    let app = TestApp::new();
    let (status, body) = app.register(EMAIL, "alllowercase1!").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"][0]["field"], "password");
    assert!(app.store.user(EMAIL).is_none());
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/register")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_json_field_names_the_field() {
    let app = TestApp::new();
    let token = app.token().await;
    let (status, body) = app
        .json(
            Method::POST,
            "/items",
            Some(&token),
            Some(json!({ "description": "no name" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"][0]["field"], "body");
    let message = body["detail"][0]["message"].as_str().unwrap();
    assert!(message.contains("`name`"), "{message}");
    assert!(app.store.items().is_empty());
}

#[tokio::test]
async fn incomplete_login_form_names_the_field() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/login")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={}", urlencode(EMAIL))))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"][0]["field"], "body");
    let message = body["detail"][0]["message"].as_str().unwrap();
    assert!(message.contains("`password`"), "{message}");
}

#[tokio::test]
async fn login_and_me() {
    let app = TestApp::new();
    let token = app.token().await;

    let (status, body) = app.login(EMAIL, PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");

    let (status, body) = app.json(Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], EMAIL);
}

#[tokio::test]
async fn bad_credentials_are_uniform() {
    let app = TestApp::new();
    app.register(EMAIL, PASSWORD).await;

    let (wrong_status, wrong_body) = app.login(EMAIL, "Aa1!notmypassword").await;
    let (unknown_status, unknown_body) = app.login("ghost@example.com", PASSWORD).await;
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);
}

#[tokio::test]
async fn me_requires_valid_bearer() {
    let app = TestApp::new();
    let response = app
        .send(
            Request::builder()
                .uri("/auth/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");

    let (status, _) = app
        .json(Method::GET, "/auth/me", Some("not.a.token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn change_password_flow() {
    let app = TestApp::new();
    let token = app.token().await;

    let (status, body) = app
        .json(
            Method::POST,
            "/auth/change-password",
            Some(&token),
            Some(json!({ "old_password": "Aa1!wrongpassword", "new_password": "Bb2@anotherstrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "detail": "Old password is incorrect" }));

    let (status, _) = app
        .json(
            Method::POST,
            "/auth/change-password",
            Some(&token),
            Some(json!({ "old_password": PASSWORD, "new_password": "Bb2@anotherstrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.login(EMAIL, PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.login(EMAIL, "Bb2@anotherstrong").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn item_lifecycle() {
    let app = TestApp::new();
    let token = app.token().await;

    let (status, created) = app
        .json(
            Method::POST,
            "/items",
            Some(&token),
            Some(json!({ "name": "x", "description": "y" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_i64().unwrap();

    let (status, listed) = app.json(Method::GET, "/items", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed
        .as_array()
        .unwrap()
        .iter()
        .any(|item| item["id"] == id));

    let (status, updated) = app
        .json(
            Method::PUT,
            &format!("/items/{id}"),
            Some(&token),
            Some(json!({ "name": "x2", "description": "y2" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["id"], id);

    let (status, fetched) = app
        .json(Method::GET, &format!("/items/{id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "x2");
    assert_eq!(fetched["description"], "y2");

    let (status, _) = app
        .json(Method::DELETE, &format!("/items/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .json(Method::GET, &format!("/items/{id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "Item not found" }));

    let (status, _) = app
        .json(Method::DELETE, &format!("/items/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unauthenticated_mutations_change_nothing() {
    let app = TestApp::new();
    let token = app.token().await;
    let (_, created) = app
        .json(
            Method::POST,
            "/items",
            Some(&token),
            Some(json!({ "name": "keep" })),
        )
        .await;
    let id = created["id"].as_i64().unwrap();
    let before = app.store.items();

    let (status, _) = app
        .json(Method::POST, "/items", None, Some(json!({ "name": "new" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(
            Method::PUT,
            &format!("/items/{id}"),
            None,
            Some(json!({ "name": "changed" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(Method::DELETE, &format!("/items/{id}"), Some("forged"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(
            Method::POST,
            "/ml/predict",
            None,
            Some(json!({
                "sepal_length": 5.1, "sepal_width": 3.5,
                "petal_length": 1.4, "petal_width": 0.2
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.store.items(), before);
    assert!(app.store.predictions().is_empty());
}

#[tokio::test]
async fn list_filters_and_validates_query() {
    let app = TestApp::new();
    let token = app.token().await;
    for name in ["Apple", "banana", "Pineapple"] {
        app.json(Method::POST, "/items", Some(&token), Some(json!({ "name": name })))
            .await;
    }

    let (status, body) = app
        .json(Method::GET, "/items?q=apple&limit=1", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|item| item["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Pineapple"]);

    let (status, _) = app.json(Method::GET, "/items?limit=-1", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.json(Method::GET, "/items?offset=abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.json(Method::GET, "/items/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn blank_item_name_is_rejected() {
    let app = TestApp::new();
    let token = app.token().await;
    let (status, body) = app
        .json(Method::POST, "/items", Some(&token), Some(json!({ "name": "  " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"][0]["field"], "name");
    assert!(app.store.items().is_empty());
}

#[tokio::test]
async fn predict_returns_argmax_label() {
    let app = TestApp::new();
    let token = app.token().await;

    let (status, body) = app
        .json(
            Method::POST,
            "/ml/predict",
            Some(&token),
            Some(json!({
                "sepal_length": 5.1, "sepal_width": 3.5,
                "petal_length": 1.4, "petal_width": 0.2
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let probabilities = body["probabilities"].as_object().unwrap();
    let total: f64 = probabilities.values().filter_map(Value::as_f64).sum();
    assert!((total - 1.0).abs() < 1e-6);

    let (best, _) = probabilities
        .iter()
        .filter_map(|(name, p)| p.as_f64().map(|p| (name, p)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap();
    assert_eq!(body["label"], best.as_str());
    assert!(["setosa", "versicolor", "virginica"].contains(&best.as_str()));

    let recorded = app.store.predictions();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].pred_label, *best);
}

#[tokio::test]
async fn predict_rejects_out_of_range_measurements() {
    let app = TestApp::new();
    let token = app.token().await;

    let (status, body) = app
        .json(
            Method::POST,
            "/ml/predict",
            Some(&token),
            Some(json!({
                "sepal_length": 1.7e308, "sepal_width": 1.7e308,
                "petal_length": 1.4, "petal_width": 0.2
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"][0]["field"], "sepal_length");
    assert_eq!(body["detail"][1]["field"], "sepal_width");
    assert!(app.store.predictions().is_empty());
}

#[tokio::test]
async fn missing_model_is_server_error() {
    let app = TestApp::with_model(PathBuf::from("/nonexistent/iris_clf.json"));
    let token = app.token().await;

    let (status, body) = app
        .json(
            Method::POST,
            "/ml/predict",
            Some(&token),
            Some(json!({
                "sepal_length": 5.1, "sepal_width": 3.5,
                "petal_length": 1.4, "petal_width": 0.2
            })),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "detail": "Internal server error" }));
    assert!(app.store.predictions().is_empty());
}

#[tokio::test]
async fn health_reports_database_and_build() {
    let app = TestApp::new();
    let response = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
}

#[tokio::test]
async fn request_id_is_propagated() {
    let app = TestApp::new();
    let response = app
        .send(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new();
    let (status, body) = app.json(Method::GET, "/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/ml/predict"].is_object());
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let app = TestApp::new();
    let response = app
        .send(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/items")
                .header("origin", "http://localhost:3000")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );
    assert_eq!(response.headers()["access-control-allow-credentials"], "true");
}
