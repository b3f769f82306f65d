//! The boundary between the HTTP layer and the object layer.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use neofs_gate_auth::BearerToken;
use neofs_gate_core::OwnerId;

use crate::body::GateBody;
use crate::error::{ApiError, ApiErrorCode};

/// Future returned by [`GateHandler::handle`].
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<http::Response<GateBody>, ApiError>> + Send>>;

/// Serves authenticated S3 requests.
///
/// The request carries its [`BearerToken`] in its extensions (see
/// [`bearer_token`]) unless the gateway runs in permissive mode and the
/// request failed authentication.
pub trait GateHandler: Send + Sync + 'static {
    /// Handle a request whose body has already been read.
    fn handle(&self, request: http::Request<Bytes>) -> HandlerFuture;
}

/// The bearer token attached to an authenticated request.
#[must_use]
pub fn bearer_token<B>(request: &http::Request<B>) -> Option<&BearerToken> {
    request.extensions().get::<BearerToken>()
}

/// Object layer stand-in that answers every request with `NotImplemented`.
#[derive(Debug, Clone)]
pub struct NotImplementedHandler {
    owner_id: OwnerId,
}

impl NotImplementedHandler {
    /// Create a handler acting on behalf of `owner_id`.
    #[must_use]
    pub fn new(owner_id: OwnerId) -> Self {
        Self { owner_id }
    }

    /// Owner ID the handler acts for.
    #[must_use]
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }
}

impl GateHandler for NotImplementedHandler {
    fn handle(&self, request: http::Request<Bytes>) -> HandlerFuture {
        let resource = request.uri().path().to_owned();
        let authenticated = bearer_token(&request).is_some();
        let owner_id = self.owner_id;
        Box::pin(async move {
            tracing::debug!(%owner_id, resource, authenticated, "object layer is not available");
            Err(ApiError::new(ApiErrorCode::NotImplemented).with_resource(resource))
        })
    }
}
