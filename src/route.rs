use std::future::Future;
use std::sync::Arc;

use axum::http::Method;
use futures::future::BoxFuture;

use crate::middleware::Middleware;
use crate::permission::Permissions;
use crate::query::QueryPairs;
use crate::request::Request;
use crate::response::Response;
use crate::value::ValueType;

/// An async function turning a [`Request`] into a [`Response`]
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request) -> BoxFuture<'static, Response>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, request: Request) -> BoxFuture<'static, Response> {
        Box::pin(self(request))
    }
}

pub type BoxedHandler = Arc<dyn Handler>;

/// One method + URL binding of a resource.
///
/// `allow` left at zero means the route is open to anonymous callers.
#[derive(Clone, Default)]
pub struct Route {
    pub allow: Permissions,
    pub method: Method,
    pub url: String,
    pub handler: Option<BoxedHandler>,
    pub query_pairs: QueryPairs,
    pub middleware: Vec<Middleware>,
}

pub type Routes = Vec<Route>;

impl Route {
    pub fn new(method: Method, url: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            method,
            url: url.into(),
            handler: Some(Arc::new(handler)),
            ..Self::default()
        }
    }

    pub fn get(url: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::GET, url, handler)
    }

    pub fn head(url: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::HEAD, url, handler)
    }

    pub fn post(url: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::POST, url, handler)
    }

    pub fn put(url: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::PUT, url, handler)
    }

    pub fn patch(url: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::PATCH, url, handler)
    }

    pub fn delete(url: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::DELETE, url, handler)
    }

    pub fn connect(url: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::CONNECT, url, handler)
    }

    pub fn options(url: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::OPTIONS, url, handler)
    }

    pub fn trace(url: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::TRACE, url, handler)
    }

    /// Permission bits allowed to reach this route
    pub fn allow(mut self, permissions: Permissions) -> Self {
        self.allow = permissions;
        self
    }

    /// Declare a query parameter
    pub fn query(mut self, name: impl Into<String>, value_type: ValueType, required: bool) -> Self {
        self.query_pairs.register(name, value_type, required);
        self
    }

    /// Run `middleware` around this route only. The first one added runs first.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("allow", &self.allow)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("has_handler", &self.handler.is_some())
            .field("query_pairs", &self.query_pairs)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// A group of routes mounted under one base path
pub trait Resource {
    fn routes(&self) -> Routes;
}

/// Several resources sharing a single base path
pub trait ResourceInliner {
    fn resources(&self) -> Vec<Box<dyn Resource>>;
}
