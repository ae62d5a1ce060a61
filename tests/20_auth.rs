mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{body_json, get, secured, send, sign, token};
use rester::{Options, Permissions, Project, Request, Resource, Response, Rester, Route, Routes};

struct Greeting;

async fn hello(req: Request) -> Response {
    Response::payload(json!({
        "message": "Hello World !",
        "permissions": req.permissions().bits(),
        "sub": req.claim("sub"),
    }))
}

async fn admin(_req: Request) -> Response {
    Response::payload(json!({ "message": "Hello Admin !" }))
}

struct Profile {
    name: &'static str,
    email: &'static str,
}

impl Project for Profile {
    fn project(&self, permissions: Permissions) -> Value {
        if permissions.intersects(Permissions::ADMIN | Permissions::SUPER) {
            json!({ "name": self.name, "email": self.email })
        } else {
            json!({ "name": self.name })
        }
    }
}

async fn profile(_req: Request) -> Response {
    Response::projected(Profile {
        name: "alice",
        email: "alice@example.com",
    })
}

async fn public_profile(_req: Request) -> Response {
    Response::projected(Profile {
        name: "alice",
        email: "alice@example.com",
    })
    .with_permission(Permissions::BASIC)
}

impl Resource for Greeting {
    fn routes(&self) -> Routes {
        vec![
            Route::get("/", hello),
            Route::get("/admin", admin).allow(Permissions::ADMIN),
            Route::get("/staff", admin).allow(Permissions::ADMIN | Permissions::SUPER),
            Route::get("/profile", profile).allow(Permissions::BASIC | Permissions::ADMIN),
            Route::get("/profile/public", public_profile).allow(Permissions::BASIC | Permissions::ADMIN),
        ]
    }
}

fn app(options: Options) -> axum::Router {
    let mut rester = Rester::new(options);
    rester.resource("/", &Greeting);
    rester.build()
}

#[tokio::test]
async fn test_anonymous_route_without_token() {
    let response = get(&app(secured()), "/").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["permissions"], Permissions::ANONYMOUS.bits());
    assert_eq!(body["sub"], Value::Null);
}

#[tokio::test]
async fn test_anonymous_route_with_token_sees_claims() {
    let token = sign(json!({ "permissions": 4, "exp": common::now() + 60, "sub": "alice" }));
    let response = send(&app(secured()), Method::GET, "/", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["permissions"], 4);
    assert_eq!(body["sub"], "alice");
}

#[tokio::test]
async fn test_anonymous_route_rejects_invalid_token() {
    let response = send(&app(secured()), Method::GET, "/", Some("garbage")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let response = get(&app(secured()), "/admin").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn test_admin_token_passes_guard() {
    let token = token(Permissions::ADMIN.bits(), 60);
    let response = send(&app(secured()), Method::GET, "/admin", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "message": "Hello Admin !" }));
}

#[tokio::test]
async fn test_guard_is_any_bit_overlap() {
    let app = app(secured());

    let super_token = token(Permissions::SUPER.bits(), 60);
    let response = send(&app, Method::GET, "/staff", Some(&super_token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let basic_token = token(Permissions::BASIC.bits(), 60);
    let response = send(&app, Method::GET, "/staff", Some(&basic_token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "you don't have permission to access this resource" })
    );
}

#[tokio::test]
async fn test_expired_token_is_unauthorized() {
    let expired = token(Permissions::ADMIN.bits(), -3600);
    let response = send(&app(secured()), Method::GET, "/admin", Some(&expired)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, json!({ "error": "token is expired" }));
}

#[tokio::test]
async fn test_leeway_accepts_recently_expired_token() {
    let options = Options::new().with_token_validator(common::validator().with_leeway(120));
    let recently_expired = token(Permissions::ADMIN.bits(), -30);

    let response = send(&app(options), Method::GET, "/admin", Some(&recently_expired)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unregistered_permission_is_unauthorized() {
    let combined = token((Permissions::ADMIN | Permissions::BASIC).bits(), 60);
    let response = send(&app(secured()), Method::GET, "/admin", Some(&combined)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_without_expiry_is_unauthorized() {
    let token = sign(json!({ "permissions": 8 }));
    let response = send(&app(secured()), Method::GET, "/admin", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_no_validator_means_open_routes() {
    let response = get(&app(Options::new()), "/admin").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_projection_uses_caller_permissions() {
    let app = app(secured());

    let admin = token(Permissions::ADMIN.bits(), 60);
    let response = send(&app, Method::GET, "/profile", Some(&admin)).await;
    assert_eq!(
        body_json(response).await,
        json!({ "name": "alice", "email": "alice@example.com" })
    );

    let basic = token(Permissions::BASIC.bits(), 60);
    let response = send(&app, Method::GET, "/profile", Some(&basic)).await;
    assert_eq!(body_json(response).await, json!({ "name": "alice" }));
}

#[tokio::test]
async fn test_projection_prefers_response_permission() {
    let admin = token(Permissions::ADMIN.bits(), 60);
    let response = send(&app(secured()), Method::GET, "/profile/public", Some(&admin)).await;
    assert_eq!(body_json(response).await, json!({ "name": "alice" }));
}

#[tokio::test]
async fn test_guard_runs_before_query_and_handler() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let called = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&called);

    struct Reports(Arc<AtomicBool>);
    impl Resource for Reports {
        fn routes(&self) -> Routes {
            let called = Arc::clone(&self.0);
            vec![Route::get("/", move |_req: Request| {
                called.store(true, Ordering::SeqCst);
                async { Response::ok() }
            })
            .allow(Permissions::ADMIN)
            .query("page", rester::ValueType::Int, true)]
        }
    }

    let mut rester = Rester::new(secured());
    rester.resource("/reports", &Reports(seen));
    let app = rester.build();

    let basic = token(Permissions::BASIC.bits(), 60);
    let response = send(&app, Method::GET, "/reports?page=abc", Some(&basic)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!called.load(Ordering::SeqCst));

    // the same request with enough permissions reaches query parsing
    let admin = token(Permissions::ADMIN.bits(), 60);
    let response = send(&app, Method::GET, "/reports?page=abc", Some(&admin)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!called.load(Ordering::SeqCst));

    let response = send(&app, Method::GET, "/reports?page=2", Some(&admin)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(called.load(Ordering::SeqCst));
}
