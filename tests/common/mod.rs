#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing_subscriber::EnvFilter;

use rester::{JwtValidator, Options};

pub const SECRET: &[u8] = b"rester-test-secret";

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Sign an HS256 token carrying `permissions` that expires `expires_in` seconds from now
pub fn token(permissions: u32, expires_in: i64) -> String {
    sign(json!({ "permissions": permissions, "exp": now() + expires_in }))
}

pub fn sign(claims: Value) -> String {
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).expect("failed to sign token")
}

pub fn validator() -> JwtValidator {
    JwtValidator::from_secret(SECRET)
}

/// Route test logs through the test harness, set RUST_LOG to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn secured() -> Options {
    init_tracing();
    Options::new().with_token_validator(validator())
}

pub async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = builder.body(Body::empty()).expect("failed to build request");
    app.clone().oneshot(request).await.expect("router is infallible")
}

pub async fn get(app: &Router, uri: &str) -> Response {
    send(app, Method::GET, uri, None).await
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    String::from_utf8(bytes.to_vec()).expect("body is not utf-8")
}

pub async fn body_json(response: Response) -> Value {
    let body = body_string(response).await;
    serde_json::from_str(&body).unwrap_or_else(|e| panic!("body {:?} is not json: {}", body, e))
}

pub fn assert_status(response: &Response, status: StatusCode) {
    assert_eq!(response.status(), status, "unexpected status for response {:?}", response);
}
