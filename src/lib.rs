//! A small REST toolkit on top of axum: resources declare routes with typed
//! query parameters and permission masks, and [`Rester`] wires them into a
//! router with bearer token validation, permission guards and JSON rendering.

pub mod config;
pub mod error;
pub mod middleware;
pub mod permission;
pub mod query;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod token;
pub mod value;

pub use error::ApiError;
pub use middleware::{Caller, Middleware};
pub use permission::{guard, PermissionRegistry, Permissions};
pub use query::{QueryError, QueryPairs};
pub use request::Request;
pub use response::{Project, Response};
pub use route::{Handler, Resource, ResourceInliner, Route, Routes};
pub use router::{Options, Rester};
pub use token::{AuthError, Claims, JwtValidator, TokenValidator};
pub use value::{Value, ValueType};
