use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Path,
    http::{header, request::Parts, Extensions, HeaderMap, Method, Uri},
};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::ApiError;
use crate::middleware::Caller;
use crate::permission::Permissions;
use crate::query::{parse_query_string, Query, QueryError, QueryPairs, QueryValues};
use crate::token::Claims;
use crate::value::Value;

/// What a route handler gets to see of an incoming request
#[derive(Debug)]
pub struct Request {
    parts: Parts,
    params: HashMap<String, String>,
    caller: Caller,
    query: Query,
    body: Bytes,
}

impl Request {
    /// Split an axum request into the handler view, reading at most `max_body` bytes
    pub(crate) async fn read(
        request: axum::extract::Request,
        params: Option<Path<HashMap<String, String>>>,
        pairs: Arc<QueryPairs>,
        max_body: usize,
    ) -> Result<Self, ApiError> {
        let (parts, body) = request.into_parts();

        let declared_len = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared_len.is_some_and(|len| len > max_body) {
            return Err(ApiError::payload_too_large(format!(
                "request body exceeds {} bytes",
                max_body
            )));
        }

        let body = axum::body::to_bytes(body, max_body)
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read request body: {}", e)))?;

        let caller = parts
            .extensions
            .get::<Caller>()
            .cloned()
            .unwrap_or_else(Caller::anonymous);
        let query = Query::new(pairs, parse_query_string(parts.uri.query()));
        let params = params.map(|Path(params)| params).unwrap_or_default();

        Ok(Self {
            parts,
            params,
            caller,
            query,
            body,
        })
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Values put in place by middleware
    pub fn extensions(&self) -> &Extensions {
        &self.parts.extensions
    }

    /// Path parameter captured by the route pattern, e.g. `id` for `/users/:id`
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Permission mask of the caller, anonymous when no token was verified
    pub fn permissions(&self) -> Permissions {
        self.caller.permissions
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.caller.claims.as_deref()
    }

    pub fn claim(&self, name: &str) -> Option<&JsonValue> {
        self.claims().and_then(|claims| claims.get(name))
    }

    /// Value of a declared query parameter. Required parameters were already
    /// resolved by the router; optional ones are parsed on first access.
    ///
    /// Panics if `name` is not declared on the route.
    pub fn query(&mut self, name: &str) -> Result<&Value, QueryError> {
        self.query.parse(name)
    }

    /// Raw query string values, declared or not
    pub fn query_values(&self) -> &QueryValues {
        self.query.values()
    }

    pub(crate) fn parse_required(&mut self) -> Result<(), QueryError> {
        self.query.parse_required()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}
