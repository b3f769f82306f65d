//! HTTP layer of the NeoFS S3 gateway.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> GateHttpService (hyper Service)
//!     -> /-/healthy, /-/ready probes
//!     -> Body collection
//!     -> X-Amz-Content-Sha256 check
//!     -> AuthCenter::authenticate (BearerToken into request extensions)
//!     -> GateHandler (object layer)
//!     -> Common response headers (x-amz-request-id, Server)
//!   <- HTTP Response
//! ```
//!
//! Requests failing authentication are rejected with `403 AccessDenied`
//! unless [`GateHttpConfig::auth_permissive`] is set, in which case they
//! reach the handler without a token.

pub mod body;
pub mod error;
pub mod handler;
pub mod service;

pub use body::{BodyError, GateBody};
pub use error::{ApiError, ApiErrorCode};
pub use handler::{GateHandler, NotImplementedHandler, bearer_token};
pub use service::{GateHttpConfig, GateHttpService};
