pub mod auth;

use std::future::Future;
use std::sync::Arc;

use axum::{extract::Request, middleware::Next, response::Response};
use futures::future::BoxFuture;

pub use auth::Caller;
pub(crate) use auth::{token_middleware, TokenGate};

type MiddlewareFn = dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync;

/// A middleware function wrapped around a route or the whole router.
///
/// ```ignore
/// let mw = Middleware::new(|req, next: Next| async move {
///     let mut res = next.run(req).await;
///     res.headers_mut().insert("x-served-by", HeaderValue::from_static("rester"));
///     res
/// });
/// ```
#[derive(Clone)]
pub struct Middleware(Arc<MiddlewareFn>);

impl Middleware {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self(Arc::new(move |request, next| Box::pin(f(request, next))))
    }

    pub fn call(&self, request: Request, next: Next) -> BoxFuture<'static, Response> {
        (self.0)(request, next)
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Middleware")
    }
}
