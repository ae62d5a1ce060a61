use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
};
use serde::{ser::Error as _, ser::SerializeMap, Serialize, Serializer};
use serde_json::Value;

use crate::permission::Permissions;

type HttpResponse = axum::response::Response;

/// Error message rendered as `{"error": "<message>"}`.
/// Serializing an empty message fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorMessage(String);

impl ErrorMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for ErrorMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_empty() {
            return Err(S::Error::custom("cannot marshal an empty error in response"));
        }
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("error", &self.0)?;
        map.end()
    }
}

/// Payloads that render differently depending on who is asking, e.g. to
/// hide fields from lower privileged callers.
pub trait Project: Send {
    fn project(&self, permissions: Permissions) -> Value;
}

trait JsonBody: Send {
    fn to_json(&self) -> serde_json::Result<Vec<u8>>;
}

impl<T: Serialize + Send> JsonBody for T {
    fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

enum Payload {
    Plain(Box<dyn JsonBody>),
    Projected(Box<dyn Project>),
}

/// An HTTP response produced by a route handler.
///
/// When an error message is set the payload is ignored and the status defaults
/// to 500, otherwise it defaults to 200.
#[derive(Default)]
pub struct Response {
    status: Option<StatusCode>,
    payload: Option<Payload>,
    error: ErrorMessage,
    headers: HeaderMap,
    permission: Option<Permissions>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("has_payload", &self.payload.is_some())
            .field("error", &self.error)
            .field("headers", &self.headers)
            .field("permission", &self.permission)
            .finish()
    }
}

impl Response {
    /// Empty 200 response
    pub fn ok() -> Self {
        Self::status(StatusCode::OK)
    }

    /// Empty response with the given status
    pub fn status(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Error response, 500 unless another status is set
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            error: ErrorMessage::new(message),
            ..Self::default()
        }
    }

    /// Error response with an explicit status
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::err(message).with_status(status)
    }

    /// 200 response with a JSON payload
    pub fn payload<T: Serialize + Send + 'static>(payload: T) -> Self {
        Self {
            status: Some(StatusCode::OK),
            payload: Some(Payload::Plain(Box::new(payload))),
            ..Self::default()
        }
    }

    /// 201 response with a JSON payload
    pub fn created<T: Serialize + Send + 'static>(payload: T) -> Self {
        Self::payload(payload).with_status(StatusCode::CREATED)
    }

    /// 200 response whose payload is projected for the caller's permissions
    pub fn projected<P: Project + 'static>(payload: P) -> Self {
        Self {
            status: Some(StatusCode::OK),
            payload: Some(Payload::Projected(Box::new(payload))),
            ..Self::default()
        }
    }

    /// Empty 200 response carrying one header
    pub fn header(key: &str, value: &str) -> Self {
        Self::ok().with_header(key, value)
    }

    /// Empty 200 response carrying the given headers
    pub fn headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        headers
            .into_iter()
            .fold(Self::ok(), |response, (key, value)| response.with_header(key, value))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::error(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::error(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::error(StatusCode::NOT_FOUND, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::error(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::error(StatusCode::CONFLICT, message)
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::error(StatusCode::PRECONDITION_FAILED, message)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Add a header. Names or values that are not valid HTTP are logged and skipped.
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!("Skipping invalid response header {:?}: {:?}", key, value),
        }
        self
    }

    /// Project the payload for `permission` instead of the caller's permissions
    pub fn with_permission(mut self, permission: Permissions) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn error_message(&self) -> &ErrorMessage {
        &self.error
    }

    /// Write the response out. `caller` is the requesting party's permission mask,
    /// used for projected payloads unless the response carries its own.
    pub fn render(self, caller: Permissions) -> HttpResponse {
        let Response {
            status,
            payload,
            error,
            headers,
            permission,
        } = self;

        let (status, encoded) = if !error.is_empty() {
            let status = status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Some(serde_json::to_vec(&error)))
        } else {
            let permissions = permission.unwrap_or(caller);
            let encoded = payload.map(|payload| match payload {
                Payload::Plain(body) => body.to_json(),
                Payload::Projected(body) => serde_json::to_vec(&body.project(permissions)),
            });
            (status.unwrap_or(StatusCode::OK), encoded)
        };

        let body = match encoded {
            None => None,
            Some(Ok(mut bytes)) => {
                bytes.push(b'\n');
                Some(bytes)
            }
            Some(Err(e)) => {
                tracing::error!("Failed to encode response payload: {}", e);
                None
            }
        };

        let mut response = match body {
            Some(bytes) => {
                let mut response = HttpResponse::new(Body::from(bytes));
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                response
            }
            None => HttpResponse::new(Body::empty()),
        };
        *response.status_mut() = status;

        let out = response.headers_mut();
        for name in headers.keys() {
            out.remove(name);
            for value in headers.get_all(name) {
                out.append(name.clone(), value.clone());
            }
        }

        response
    }
}

impl IntoResponse for Response {
    fn into_response(self) -> HttpResponse {
        self.render(Permissions::NO_PERMISSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Message {
        message: &'static str,
    }

    struct Account {
        name: &'static str,
        email: &'static str,
    }

    impl Project for Account {
        fn project(&self, permissions: Permissions) -> Value {
            if permissions.intersects(Permissions::ADMIN) {
                json!({ "name": self.name, "email": self.email })
            } else {
                json!({ "name": self.name })
            }
        }
    }

    async fn body_string(response: HttpResponse) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_render_payload_defaults_to_ok() {
        let response = Response {
            payload: Some(Payload::Plain(Box::new(Message { message: "test" }))),
            ..Response::default()
        }
        .render(Permissions::ANONYMOUS);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_string(response).await, "{\"message\":\"test\"}\n");
    }

    #[tokio::test]
    async fn test_render_error_defaults_to_internal_error() {
        let response = Response::err("x").render(Permissions::ANONYMOUS);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response).await, "{\"error\":\"x\"}\n");
    }

    #[tokio::test]
    async fn test_error_wins_over_payload() {
        let response = Response::payload(Message { message: "ignored" })
            .with_status(StatusCode::CONFLICT);
        let response = Response {
            error: ErrorMessage::new("taken"),
            ..response
        }
        .render(Permissions::ANONYMOUS);

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_string(response).await, "{\"error\":\"taken\"}\n");
    }

    #[test]
    fn test_empty_error_message_fails_to_encode() {
        assert!(serde_json::to_vec(&ErrorMessage::default()).is_err());
        assert_eq!(
            serde_json::to_string(&ErrorMessage::new("boom")).unwrap(),
            "{\"error\":\"boom\"}"
        );
    }

    #[tokio::test]
    async fn test_empty_response_has_no_body() {
        let response = Response::ok().render(Permissions::ANONYMOUS);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
        assert_eq!(body_string(response).await, "");

        let response = Response::status(StatusCode::NO_CONTENT).render(Permissions::ANONYMOUS);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_headers_are_written() {
        let response = Response::headers([("X-Total", "3"), ("Location", "/things/3")])
            .render(Permissions::ANONYMOUS);
        assert_eq!(response.headers()["x-total"], "3");
        assert_eq!(response.headers()["location"], "/things/3");

        let response = Response::payload(json!({ "a": 1 }))
            .with_header("Content-Type", "application/vnd.api+json")
            .render(Permissions::ANONYMOUS);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/vnd.api+json"
        );
    }

    #[test]
    fn test_invalid_header_is_skipped() {
        let response = Response::header("bad header", "value");
        assert!(response.headers.is_empty());
    }

    #[tokio::test]
    async fn test_projection_uses_caller_permissions() {
        let account = || Account {
            name: "ana",
            email: "ana@example.com",
        };

        let response = Response::projected(account()).render(Permissions::BASIC);
        assert_eq!(body_string(response).await, "{\"name\":\"ana\"}\n");

        let response = Response::projected(account()).render(Permissions::ADMIN);
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body, json!({ "name": "ana", "email": "ana@example.com" }));

        let response = Response::projected(account())
            .with_permission(Permissions::ADMIN)
            .render(Permissions::BASIC);
        assert!(body_string(response).await.contains("email"));
    }

    #[tokio::test]
    async fn test_created_status() {
        let response = Response::created(json!({ "id": 1 })).render(Permissions::ANONYMOUS);
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_encoding_failure_drops_body() {
        use std::collections::BTreeMap;

        // serde_json refuses maps with non-string keys
        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], 1);
        let response = Response::payload(bad).render(Permissions::ANONYMOUS);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "");
    }
}
