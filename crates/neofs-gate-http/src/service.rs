//! The gateway hyper service.
//!
//! [`GateHttpService`] runs every request through:
//!
//! 1. Liveness and readiness probes (`GET /-/healthy`, `GET /-/ready`)
//! 2. Body collection, bounded by the configured size limit
//! 3. `X-Amz-Content-Sha256` validation
//! 4. SigV4 authentication against the [`AuthCenter`]
//! 5. Dispatch to the [`GateHandler`]
//! 6. Common response headers (`x-amz-request-id`, `Server`)
//!
//! Steps 2 to 5 share one deadline, the configured request timeout.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body::Body;
use hyper::body::Incoming;
use hyper::service::Service;
use neofs_gate_auth::{AuthCenter, BearerToken, sha256_hex};
use neofs_gate_core::Pool;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::body::{BodyError, GateBody, collect_body};
use crate::error::{ApiError, ApiErrorCode, error_to_response};
use crate::handler::GateHandler;

const HEALTHY_PATH: &str = "/-/healthy";
const READY_PATH: &str = "/-/ready";
const SERVER_NAME: &str = "NeoFS-S3-Gate";
const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Settings of the HTTP layer.
#[derive(Debug, Clone)]
pub struct GateHttpConfig {
    /// Forward requests that fail authentication instead of rejecting them.
    pub auth_permissive: bool,
    /// Deadline for reading, authenticating and handling one request.
    pub request_timeout: Duration,
    /// Largest request body read into memory, in bytes.
    pub max_body_size: usize,
}

impl Default for GateHttpConfig {
    fn default() -> Self {
        Self {
            auth_permissive: false,
            request_timeout: Duration::from_secs(15),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// The gateway service, generic over the object layer handler.
pub struct GateHttpService<H: GateHandler> {
    handler: Arc<H>,
    center: Arc<AuthCenter>,
    pool: Arc<dyn Pool>,
    config: Arc<GateHttpConfig>,
}

impl<H: GateHandler> fmt::Debug for GateHttpService<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateHttpService")
            .field("center", &self.center)
            .field("pool", &self.pool)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<H: GateHandler> Clone for GateHttpService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            center: Arc::clone(&self.center),
            pool: Arc::clone(&self.pool),
            config: Arc::clone(&self.config),
        }
    }
}

impl<H: GateHandler> GateHttpService<H> {
    /// Create a service.
    #[must_use]
    pub fn new(
        handler: Arc<H>,
        center: Arc<AuthCenter>,
        pool: Arc<dyn Pool>,
        config: GateHttpConfig,
    ) -> Self {
        Self {
            handler,
            center,
            pool,
            config: Arc::new(config),
        }
    }

    /// Process one request and produce the response, common headers included.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<GateBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let request_id = Uuid::new_v4().to_string();
        let response = self.process_request(req, &request_id).await;
        add_common_headers(response, &request_id)
    }

    async fn process_request<B>(
        &self,
        req: http::Request<B>,
        request_id: &str,
    ) -> http::Response<GateBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let method = req.method().clone();
        let uri = req.uri().clone();
        debug!(%method, %uri, request_id, "processing request");

        if method == http::Method::GET {
            match uri.path() {
                HEALTHY_PATH => return probe_response(http::StatusCode::OK),
                READY_PATH => return self.readiness().await,
                _ => {}
            }
        }

        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.authenticate_and_dispatch(req, request_id)).await {
            Ok(Ok(response)) => response,
            Ok(Err(mut err)) => {
                if err.resource.is_none() {
                    err.resource = Some(uri.path().to_owned());
                }
                error_to_response(&err, request_id)
            }
            Err(_) => {
                warn!(%method, %uri, request_id, ?timeout, "request timed out");
                error_to_response(&ApiError::new(ApiErrorCode::RequestTimeout), request_id)
            }
        }
    }

    async fn authenticate_and_dispatch<B>(
        &self,
        req: http::Request<B>,
        request_id: &str,
    ) -> Result<http::Response<GateBody>, ApiError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let body = match collect_body(body, self.config.max_body_size).await {
            Ok(body) => body,
            Err(err @ BodyError::TooLarge { .. }) => {
                warn!(error = %err, request_id, "request body too large");
                return Err(ApiError::new(ApiErrorCode::EntityTooLarge));
            }
            Err(err) => {
                error!(error = %err, request_id, "failed to collect request body");
                return Err(ApiError::with_message(
                    ApiErrorCode::InternalError,
                    "Failed to read request body",
                ));
            }
        };

        if let Err(err) = validate_content_sha256(&parts.headers, &body) {
            warn!(error = %err.message, request_id, "content SHA256 mismatch");
            return Err(err);
        }

        let mut req = http::Request::from_parts(parts, body);
        match self.center.authenticate::<BearerToken>(&req) {
            Ok(token) => {
                debug!(request_id, "request authenticated");
                req.extensions_mut().insert(token);
            }
            Err(err) if self.config.auth_permissive => {
                warn!(
                    error = %err,
                    kind = ?err.kind(),
                    request_id,
                    "authentication failed, forwarding without token"
                );
            }
            Err(err) => {
                // Codec causes stay in the log, clients get the generic message.
                warn!(error = %err, kind = ?err.kind(), request_id, "authentication failed");
                return Err(ApiError::new(ApiErrorCode::AccessDenied));
            }
        }

        self.handler.handle(req).await
    }

    async fn readiness(&self) -> http::Response<GateBody> {
        match self.pool.connection().await {
            Ok(conn) => {
                debug!(address = %conn.address, "ready");
                probe_response(http::StatusCode::OK)
            }
            Err(err) => {
                warn!(error = %err, "not ready");
                probe_response(http::StatusCode::SERVICE_UNAVAILABLE)
            }
        }
    }
}

impl<H: GateHandler> Service<http::Request<Incoming>> for GateHttpService<H> {
    type Response = http::Response<GateBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

/// Check `X-Amz-Content-Sha256` against the body when it carries a digest.
///
/// Unsigned and streaming placeholders are accepted as-is.
fn validate_content_sha256(headers: &http::HeaderMap, body: &[u8]) -> Result<(), ApiError> {
    let Some(header_value) = headers.get("x-amz-content-sha256") else {
        return Ok(());
    };

    let hash_str = header_value.to_str().map_err(|_| {
        ApiError::with_message(
            ApiErrorCode::XAmzContentSHA256Mismatch,
            "Invalid X-Amz-Content-Sha256 header encoding",
        )
    })?;

    if matches!(
        hash_str,
        "UNSIGNED-PAYLOAD"
            | "STREAMING-AWS4-HMAC-SHA256-PAYLOAD"
            | "STREAMING-AWS4-HMAC-SHA256-PAYLOAD-TRAILER"
            | "STREAMING-UNSIGNED-PAYLOAD-TRAILER"
    ) {
        return Ok(());
    }

    if hash_str.len() != 64 || !hash_str.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ApiError::with_message(
            ApiErrorCode::XAmzContentSHA256Mismatch,
            format!("The provided 'x-amz-content-sha256' header is not valid: {hash_str}"),
        ));
    }

    if !sha256_hex(body).eq_ignore_ascii_case(hash_str) {
        return Err(ApiError::new(ApiErrorCode::XAmzContentSHA256Mismatch));
    }

    Ok(())
}

fn probe_response(status: http::StatusCode) -> http::Response<GateBody> {
    http::Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(GateBody::from_string(
            status.canonical_reason().unwrap_or_default(),
        ))
        .expect("static probe response should be valid")
}

fn add_common_headers(
    mut response: http::Response<GateBody>,
    request_id: &str,
) -> http::Response<GateBody> {
    let headers = response.headers_mut();
    if let Ok(hv) = http::header::HeaderValue::from_str(request_id) {
        headers.insert("x-amz-request-id", hv);
    }
    headers.insert(
        http::header::SERVER,
        http::header::HeaderValue::from_static(SERVER_NAME),
    );
    response
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http_body_util::{BodyExt, Full};
    use neofs_gate_auth::{Credentials, SigningParams, sign_request};
    use neofs_gate_core::keys::parse_auth_key;
    use neofs_gate_core::{Connection, GateError, GateResult, IdentityKey};

    use super::*;
    use crate::handler::{HandlerFuture, bearer_token};

    const AUTH_KEY: &str = include_str!("../../../testdata/auth_key.pem");

    #[derive(Debug)]
    struct StaticPool {
        ready: bool,
    }

    #[async_trait::async_trait]
    impl Pool for StaticPool {
        async fn rebalance(&self) {}

        async fn connection(&self) -> GateResult<Connection> {
            if self.ready {
                Ok(Connection {
                    address: "127.0.0.1:8080".to_owned(),
                    weight: 1.0,
                })
            } else {
                Err(GateError::NoHealthyPeers)
            }
        }

        fn close(&self) {}
    }

    /// Records what reached the object layer and answers 200.
    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<(Bytes, Option<BearerToken>)>>,
    }

    impl GateHandler for RecordingHandler {
        fn handle(&self, request: http::Request<Bytes>) -> HandlerFuture {
            let token = bearer_token(&request).cloned();
            self.seen
                .lock()
                .unwrap()
                .push((request.body().clone(), token));
            Box::pin(async {
                Ok(http::Response::builder()
                    .status(http::StatusCode::OK)
                    .body(GateBody::empty())
                    .unwrap())
            })
        }
    }

    struct SlowHandler;

    impl GateHandler for SlowHandler {
        fn handle(&self, _request: http::Request<Bytes>) -> HandlerFuture {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(http::Response::new(GateBody::empty()))
            })
        }
    }

    fn center() -> Arc<AuthCenter> {
        Arc::new(AuthCenter::new(
            IdentityKey::generate(),
            parse_auth_key(AUTH_KEY).unwrap(),
        ))
    }

    fn service<H: GateHandler>(handler: Arc<H>, config: GateHttpConfig) -> GateHttpService<H> {
        GateHttpService::new(handler, center(), Arc::new(StaticPool { ready: true }), config)
    }

    fn signed_put(credentials: &Credentials, body: &'static [u8]) -> http::Request<Full<Bytes>> {
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::HOST, "s3.neofs.local".parse().unwrap());
        let timestamp =
            chrono::NaiveDateTime::parse_from_str("20240311T101500Z", "%Y%m%dT%H%M%SZ").unwrap();
        let params = SigningParams {
            access_key_id: &credentials.access_key_id,
            secret_access_key: &credentials.secret_access_key,
            region: "",
            service: "s3",
            timestamp,
        };
        let uri: http::Uri = "/bucket/object".parse().unwrap();
        let authorization = sign_request(&params, &http::Method::PUT, &uri, &headers, body);

        http::Request::builder()
            .method(http::Method::PUT)
            .uri(uri)
            .header(http::header::HOST, "s3.neofs.local")
            .header("x-amz-date", "20240311T101500Z")
            .header(http::header::AUTHORIZATION, authorization)
            .body(Full::new(Bytes::from_static(body)))
            .unwrap()
    }

    async fn body_string(response: http::Response<GateBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_should_answer_liveness_probe() {
        let svc = service(Arc::new(RecordingHandler::default()), GateHttpConfig::default());
        let req = http::Request::get(HEALTHY_PATH).body(Full::new(Bytes::new())).unwrap();

        let resp = svc.handle(req).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert!(resp.headers().contains_key("x-amz-request-id"));
        assert_eq!(
            resp.headers().get(http::header::SERVER).and_then(|v| v.to_str().ok()),
            Some(SERVER_NAME)
        );
    }

    #[tokio::test]
    async fn test_should_report_readiness_from_pool() {
        let ready = service(Arc::new(RecordingHandler::default()), GateHttpConfig::default());
        let req = http::Request::get(READY_PATH).body(Full::new(Bytes::new())).unwrap();
        assert_eq!(ready.handle(req).await.status(), http::StatusCode::OK);

        let not_ready = GateHttpService::new(
            Arc::new(RecordingHandler::default()),
            center(),
            Arc::new(StaticPool { ready: false }),
            GateHttpConfig::default(),
        );
        let req = http::Request::get(READY_PATH).body(Full::new(Bytes::new())).unwrap();
        assert_eq!(
            not_ready.handle(req).await.status(),
            http::StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_should_forward_authenticated_request_with_same_body() {
        let handler = Arc::new(RecordingHandler::default());
        let svc = service(Arc::clone(&handler), GateHttpConfig::default());
        let token = BearerToken::from_claims(&("alice", "read")).unwrap();
        let credentials = svc.center.pack(&token).unwrap();

        let resp = svc.handle(signed_put(&credentials, b"object payload")).await;
        assert_eq!(resp.status(), http::StatusCode::OK);

        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, Bytes::from_static(b"object payload"));
        assert_eq!(seen[0].1.as_ref(), Some(&token));
    }

    #[tokio::test]
    async fn test_should_reject_unauthenticated_request() {
        let handler = Arc::new(RecordingHandler::default());
        let svc = service(Arc::clone(&handler), GateHttpConfig::default());
        let req = http::Request::put("/bucket/object")
            .body(Full::new(Bytes::from_static(b"data")))
            .unwrap();

        let resp = svc.handle(req).await;
        assert_eq!(resp.status(), http::StatusCode::FORBIDDEN);
        let body = body_string(resp).await;
        assert!(body.contains("<Code>AccessDenied</Code>"));
        assert!(body.contains("<Resource>/bucket/object</Resource>"));
        assert!(handler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_hide_codec_details_from_client() {
        let handler = Arc::new(RecordingHandler::default());
        let svc = service(Arc::clone(&handler), GateHttpConfig::default());
        let req = http::Request::get("/bucket/object")
            .header(http::header::HOST, "s3.neofs.local")
            .header("x-amz-date", "20240311T101500Z")
            .header(
                http::header::AUTHORIZATION,
                "AWS4-HMAC-SHA256 Credential=not-hex/20240311//s3/aws4_request, \
                 SignedHeaders=host;x-amz-date, Signature=00",
            )
            .body(Full::new(Bytes::new()))
            .unwrap();

        let resp = svc.handle(req).await;
        assert_eq!(resp.status(), http::StatusCode::FORBIDDEN);
        let body = body_string(resp).await;
        assert!(body.contains("<Message>Access Denied</Message>"));
        assert!(!body.contains("access key ID"));
        assert!(handler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_body_over_limit() {
        let handler = Arc::new(RecordingHandler::default());
        let config = GateHttpConfig {
            auth_permissive: true,
            max_body_size: 8,
            ..GateHttpConfig::default()
        };
        let svc = service(Arc::clone(&handler), config);
        let req = http::Request::put("/bucket/object")
            .body(Full::new(Bytes::from_static(b"more than eight bytes")))
            .unwrap();

        let resp = svc.handle(req).await;
        assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST);
        assert!(body_string(resp).await.contains("<Code>EntityTooLarge</Code>"));
        assert!(handler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_forward_without_token_in_permissive_mode() {
        let handler = Arc::new(RecordingHandler::default());
        let config = GateHttpConfig {
            auth_permissive: true,
            ..GateHttpConfig::default()
        };
        let svc = service(Arc::clone(&handler), config);
        let req = http::Request::put("/bucket/object")
            .body(Full::new(Bytes::from_static(b"data")))
            .unwrap();

        let resp = svc.handle(req).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen[0].0, Bytes::from_static(b"data"));
        assert!(seen[0].1.is_none());
    }

    #[tokio::test]
    async fn test_should_reject_wrong_content_sha256_before_auth() {
        let svc = service(Arc::new(RecordingHandler::default()), GateHttpConfig::default());
        let req = http::Request::put("/bucket/object")
            .header("x-amz-content-sha256", sha256_hex(b"other"))
            .body(Full::new(Bytes::from_static(b"data")))
            .unwrap();

        let resp = svc.handle(req).await;
        assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST);
        assert!(body_string(resp).await.contains("XAmzContentSHA256Mismatch"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_time_out_slow_handler() {
        let config = GateHttpConfig {
            auth_permissive: true,
            request_timeout: Duration::from_secs(1),
            ..GateHttpConfig::default()
        };
        let svc = service(Arc::new(SlowHandler), config);
        let req = http::Request::get("/bucket/object")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let resp = svc.handle(req).await;
        assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST);
        assert!(body_string(resp).await.contains("RequestTimeout"));
    }

    #[test]
    fn test_should_accept_placeholder_and_matching_digests() {
        let mut headers = http::HeaderMap::new();
        assert!(validate_content_sha256(&headers, b"hello").is_ok());

        headers.insert("x-amz-content-sha256", "UNSIGNED-PAYLOAD".parse().unwrap());
        assert!(validate_content_sha256(&headers, b"hello").is_ok());

        headers.insert("x-amz-content-sha256", sha256_hex(b"hello").parse().unwrap());
        assert!(validate_content_sha256(&headers, b"hello").is_ok());

        headers.insert("x-amz-content-sha256", "not-a-digest".parse().unwrap());
        assert_eq!(
            validate_content_sha256(&headers, b"hello").unwrap_err().code,
            ApiErrorCode::XAmzContentSHA256Mismatch
        );
    }
}
