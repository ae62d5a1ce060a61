//! The [`Rester`] router: collects resources, then builds an `axum::Router`
//! where every route runs the token check, the permission guard and the
//! required query parsing before its handler.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::Path,
    http::{HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state, Next},
    response::{IntoResponse, Response as HttpResponse},
    routing::{any, MethodRouter},
    Router,
};
use tower::ServiceExt;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::middleware::{token_middleware, Caller, Middleware, TokenGate};
use crate::permission::{guard, Permissions};
use crate::query::QueryPairs;
use crate::request::Request;
use crate::response::Response;
use crate::route::{BoxedHandler, Handler, Resource, ResourceInliner, Route};
use crate::token::TokenValidator;

pub const FORBIDDEN_MESSAGE: &str = "you don't have permission to access this resource";

const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Router wide options
#[derive(Clone)]
pub struct Options {
    validator: Option<Arc<dyn TokenValidator>>,
    version: Option<String>,
    cors: Option<CorsLayer>,
    trace: bool,
    max_body_bytes: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            validator: None,
            version: None,
            cors: None,
            trace: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options derived from the application config. The token validator is
    /// not part of it since it needs key material; add it with
    /// [`Options::with_token_validator`].
    pub fn from_config(config: &AppConfig) -> Self {
        let mut options = Self::new()
            .with_tracing(config.api.enable_request_logging)
            .with_max_body_bytes(config.api.max_request_size_bytes);

        if let Some(version) = &config.server.api_version {
            options = options.with_versioning(version.clone());
        }

        if config.security.enable_cors {
            options = options.with_cors(cors_layer(&config.security.cors_origins));
        }

        options
    }

    /// Verify a bearer token on every route and guard routes by permission
    pub fn with_token_validator(mut self, validator: impl TokenValidator) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Mount every resource under `/<version>`
    pub fn with_versioning(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_cors(mut self, cors: CorsLayer) -> Self {
        self.cors = Some(cors);
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// A route that passed registration checks
struct Mounted {
    path: String,
    /// The route sits at its resource's base, e.g. url `/`
    root: bool,
    method: Method,
    allow: Permissions,
    handler: BoxedHandler,
    query_pairs: Arc<QueryPairs>,
    middleware: Vec<Middleware>,
}

/// Composes resources into an HTTP router
pub struct Rester {
    options: Options,
    bases: HashSet<String>,
    routes: Vec<Mounted>,
    not_found: Option<BoxedHandler>,
    method_not_allowed: Option<BoxedHandler>,
    middleware: Vec<Middleware>,
}

impl Rester {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            bases: HashSet::new(),
            routes: Vec::new(),
            not_found: None,
            method_not_allowed: None,
            middleware: Vec::new(),
        }
    }

    /// Mount all routes of `resource` under `base`.
    ///
    /// Panics if `base` is already taken or a route has no handler or URL.
    pub fn resource(&mut self, base: &str, resource: &dyn Resource) -> &mut Self {
        self.claim_base(base);
        for route in resource.routes() {
            self.mount(base, route);
        }
        self
    }

    /// Mount several resources under the same `base`
    pub fn resource_inline(&mut self, base: &str, inliner: &dyn ResourceInliner) -> &mut Self {
        self.claim_base(base);
        for resource in inliner.resources() {
            for route in resource.routes() {
                self.mount(base, route);
            }
        }
        self
    }

    /// Handler answering requests no route matches
    pub fn not_found(&mut self, handler: impl Handler) -> &mut Self {
        self.not_found = Some(Arc::new(handler));
        self
    }

    /// Handler answering requests whose path matches but method does not
    pub fn method_not_allowed(&mut self, handler: impl Handler) -> &mut Self {
        self.method_not_allowed = Some(Arc::new(handler));
        self
    }

    /// Middleware wrapped around the whole router
    pub fn middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    fn claim_base(&mut self, base: &str) {
        let key = base.trim_matches('/').to_string();
        if !self.bases.insert(key) {
            panic!("a resource is already registered at base path {:?}", base);
        }
    }

    fn mount(&mut self, base: &str, route: Route) {
        let Route {
            allow,
            method,
            url,
            handler,
            query_pairs,
            middleware,
        } = route;

        let Some(handler) = handler else {
            panic!("cannot use a nil handler for {} {:?}", method, url);
        };
        if url.is_empty() {
            panic!("cannot use an empty URL route under {:?}", base);
        }

        let allow = if allow.is_empty() {
            Permissions::ANONYMOUS
        } else {
            allow
        };

        self.routes.push(Mounted {
            path: join_path(&[base, &url]),
            root: url.trim_matches('/').is_empty(),
            method,
            allow,
            handler,
            query_pairs: Arc::new(query_pairs),
            middleware,
        });
    }

    /// Finalize into an `axum::Router`.
    ///
    /// Panics if two routes bind the same method and path.
    pub fn build(self) -> Router {
        let Rester {
            options,
            routes,
            not_found,
            method_not_allowed,
            middleware,
            ..
        } = self;

        let not_found = Fallback {
            handler: not_found,
            default: || Response::from(ApiError::not_found("not found")),
            max_body: options.max_body_bytes,
        };
        let method_not_allowed = Arc::new(Fallback {
            handler: method_not_allowed,
            default: || Response::from(ApiError::method_not_allowed("method not allowed")),
            max_body: options.max_body_bytes,
        });

        let mut paths: BTreeMap<String, HashMap<Method, MethodRouter>> = BTreeMap::new();
        for route in routes {
            let path = match &options.version {
                Some(version) => join_path(&[version, &route.path]),
                None => route.path.clone(),
            };
            let method = route.method.clone();

            // a resource root answers both `/base` and `/base/`
            let mut variants = vec![path.clone()];
            if route.root && path != "/" {
                variants.push(format!("{}/", path));
            }

            let endpoint = endpoint(route, &options);
            for path in variants {
                if paths
                    .entry(path.clone())
                    .or_default()
                    .insert(method.clone(), endpoint.clone())
                    .is_some()
                {
                    panic!("route {} {} is registered twice", method, path);
                }
                tracing::debug!("Mounted {} {}", method, path);
            }
        }

        let mut router = Router::new();
        for (path, methods) in paths {
            router = router.route(&path, by_method(methods, Arc::clone(&method_not_allowed)));
        }
        router = router.fallback(move |request: axum::extract::Request| {
            let not_found = not_found.clone();
            async move { not_found.respond(request).await }
        });

        for mw in middleware.into_iter().rev() {
            router = router.layer(from_fn(move |request: axum::extract::Request, next: Next| {
                mw.call(request, next)
            }));
        }
        if options.trace {
            router = router.layer(TraceLayer::new_for_http());
        }
        if let Some(cors) = options.cors {
            router = router.layer(cors);
        }

        router
    }

    /// Build and serve on `listener` until the server stops
    pub async fn serve(self, listener: tokio::net::TcpListener) -> std::io::Result<()> {
        axum::serve(listener, self.build()).await
    }
}

/// Join path segments into `/a/b/c`, tolerating missing or doubled slashes
fn join_path(segments: &[&str]) -> String {
    let joined = segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", joined)
}

/// One path's method table; methods it does not know go to `method_not_allowed`
fn by_method(methods: HashMap<Method, MethodRouter>, method_not_allowed: Arc<Fallback>) -> MethodRouter {
    let methods = Arc::new(methods);
    any(move |request: axum::extract::Request| {
        let methods = Arc::clone(&methods);
        let method_not_allowed = Arc::clone(&method_not_allowed);
        async move {
            match methods.get(request.method()) {
                Some(endpoint) => match endpoint.clone().oneshot(request).await {
                    Ok(response) => response,
                    Err(never) => match never {},
                },
                None => method_not_allowed.respond(request).await,
            }
        }
    })
}

/// Per-route state shared by every request hitting the route
struct Endpoint {
    allow: Permissions,
    guarded: bool,
    handler: BoxedHandler,
    query_pairs: Arc<QueryPairs>,
    max_body: usize,
}

fn endpoint(route: Mounted, options: &Options) -> MethodRouter {
    let state = Arc::new(Endpoint {
        allow: route.allow,
        guarded: options.validator.is_some() && route.allow != Permissions::ANONYMOUS,
        handler: route.handler,
        query_pairs: route.query_pairs,
        max_body: options.max_body_bytes,
    });

    let mut method_router = any(
        move |params: Option<Path<HashMap<String, String>>>, request: axum::extract::Request| {
            let state = Arc::clone(&state);
            async move { state.dispatch(params, request).await }
        },
    );

    for mw in route.middleware.into_iter().rev() {
        method_router = method_router.layer(from_fn(
            move |request: axum::extract::Request, next: Next| mw.call(request, next),
        ));
    }

    if let Some(validator) = &options.validator {
        let gate = TokenGate {
            validator: Arc::clone(validator),
            allow_anonymous: route.allow == Permissions::ANONYMOUS,
        };
        method_router = method_router.layer(from_fn_with_state(gate, token_middleware));
    }

    method_router
}

impl Endpoint {
    async fn dispatch(
        &self,
        params: Option<Path<HashMap<String, String>>>,
        request: axum::extract::Request,
    ) -> HttpResponse {
        if self.guarded {
            let have = request
                .extensions()
                .get::<Caller>()
                .map(|caller| caller.permissions)
                .unwrap_or_default();
            if !guard(have, self.allow) {
                tracing::warn!(
                    "Denied {} {}: caller {} does not match {}",
                    request.method(),
                    request.uri().path(),
                    have,
                    self.allow
                );
                return ApiError::forbidden(FORBIDDEN_MESSAGE).into_response();
            }
        }

        let mut request =
            match Request::read(request, params, Arc::clone(&self.query_pairs), self.max_body).await {
                Ok(request) => request,
                Err(e) => return e.into_response(),
            };

        if let Err(e) = request.parse_required() {
            return ApiError::from(e).into_response();
        }

        let permissions = request.permissions();

        self.handler.call(request).await.render(permissions)
    }
}

/// Not-found and method-not-allowed responders
#[derive(Clone)]
struct Fallback {
    handler: Option<BoxedHandler>,
    default: fn() -> Response,
    max_body: usize,
}

impl Fallback {
    async fn respond(&self, request: axum::extract::Request) -> HttpResponse {
        let Some(handler) = &self.handler else {
            return (self.default)().into_response();
        };

        let request =
            match Request::read(request, None, Arc::new(QueryPairs::new()), self.max_body).await {
                Ok(request) => request,
                Err(e) => return e.into_response(),
            };
        let permissions = request.permissions();
        handler.call(request).await.render(permissions)
    }
}
