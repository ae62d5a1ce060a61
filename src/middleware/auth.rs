use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::permission::Permissions;
use crate::token::{AuthError, Claims, TokenValidator};

/// Caller context extracted from a verified token
#[derive(Clone, Debug)]
pub struct Caller {
    pub permissions: Permissions,
    pub claims: Option<Arc<Claims>>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self {
            permissions: Permissions::ANONYMOUS,
            claims: None,
        }
    }
}

/// State handed to [`token_middleware`] for one route
#[derive(Clone)]
pub(crate) struct TokenGate {
    pub validator: Arc<dyn TokenValidator>,
    /// The route is open to anonymous callers, so a request without an
    /// Authorization header is let through as anonymous
    pub allow_anonymous: bool,
}

/// Token middleware that validates bearer tokens and injects the caller context
pub(crate) async fn token_middleware(
    State(gate): State<TokenGate>,
    mut request: Request,
    next: Next,
) -> Response {
    if gate.allow_anonymous && !request.headers().contains_key(header::AUTHORIZATION) {
        request.extensions_mut().insert(Caller::anonymous());
        return next.run(request).await;
    }

    let claims = match gate.validator.verify(request.headers()).await {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(
                "Rejected token for {} {}: {}",
                request.method(),
                request.uri().path(),
                e
            );
            return ApiError::from(e).into_response();
        }
    };

    // Validators other than JwtValidator may hand back claims without a usable mask
    let Some(permissions) = claims.permissions() else {
        tracing::warn!(
            "Token for {} {} carries no usable permissions claim",
            request.method(),
            request.uri().path()
        );
        return ApiError::from(AuthError::InvalidPermissions).into_response();
    };

    request.extensions_mut().insert(Caller {
        permissions,
        claims: Some(Arc::new(claims)),
    });

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{HeaderMap, StatusCode},
        routing::get,
        Extension, Router,
    };
    use serde_json::json;
    use tower::ServiceExt;

    struct Fixed(Result<Claims, AuthError>);

    #[async_trait]
    impl TokenValidator for Fixed {
        async fn verify(&self, _headers: &HeaderMap) -> Result<Claims, AuthError> {
            self.0.clone()
        }
    }

    fn app(validator: Fixed, allow_anonymous: bool) -> Router {
        let gate = TokenGate {
            validator: Arc::new(validator),
            allow_anonymous,
        };
        Router::new()
            .route(
                "/",
                get(|Extension(caller): Extension<Caller>| async move {
                    caller.permissions.bits().to_string()
                }),
            )
            .layer(axum::middleware::from_fn_with_state(gate, token_middleware))
    }

    fn request(token: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_verified_caller_is_injected() {
        let claims: Claims = serde_json::from_value(json!({ "exp": 1, "permissions": 8 })).unwrap();
        let response = app(Fixed(Ok(claims)), false)
            .oneshot(request(Some("t")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "8");
    }

    #[tokio::test]
    async fn test_verification_failure_is_unauthorized() {
        let response = app(Fixed(Err(AuthError::Expired)), false)
            .oneshot(request(Some("t")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(response).await, "{\"error\":\"token is expired\"}\n");
    }

    #[tokio::test]
    async fn test_claims_without_permissions_are_rejected() {
        let claims: Claims = serde_json::from_value(json!({ "exp": 1 })).unwrap();
        let response = app(Fixed(Ok(claims)), false)
            .oneshot(request(Some("t")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_anonymous_routes_skip_missing_header() {
        let response = app(Fixed(Err(AuthError::MissingHeader)), true)
            .oneshot(request(None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, Permissions::ANONYMOUS.bits().to_string());

        // a token that is present still has to be valid
        let response = app(Fixed(Err(AuthError::Expired)), true)
            .oneshot(request(Some("t")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
