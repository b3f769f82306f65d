//! S3 error responses.
//!
//! S3 errors are a flat `<Error>` document:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <Error>
//!   <Code>AccessDenied</Code>
//!   <Message>Access Denied</Message>
//!   <Resource>/bucket/object</Resource>
//!   <RequestId>3f1c...</RequestId>
//! </Error>
//! ```

use std::fmt;
use std::io;

use bytes::Bytes;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

use crate::body::GateBody;

/// S3 error codes the gateway emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorCode {
    /// The request could not be authenticated.
    AccessDenied,
    /// The request body is larger than the gateway accepts.
    EntityTooLarge,
    /// Unexpected server-side failure.
    InternalError,
    /// The operation is not served by this gateway.
    NotImplemented,
    /// The request did not complete within the request timeout.
    RequestTimeout,
    /// `X-Amz-Content-Sha256` does not match the body.
    XAmzContentSHA256Mismatch,
}

impl ApiErrorCode {
    /// Wire name of the code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::EntityTooLarge => "EntityTooLarge",
            Self::InternalError => "InternalError",
            Self::NotImplemented => "NotImplemented",
            Self::RequestTimeout => "RequestTimeout",
            Self::XAmzContentSHA256Mismatch => "XAmzContentSHA256Mismatch",
        }
    }

    /// HTTP status S3 uses for the code.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        match self {
            Self::AccessDenied => http::StatusCode::FORBIDDEN,
            Self::InternalError => http::StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotImplemented => http::StatusCode::NOT_IMPLEMENTED,
            Self::EntityTooLarge | Self::RequestTimeout | Self::XAmzContentSHA256Mismatch => {
                http::StatusCode::BAD_REQUEST
            }
        }
    }

    /// Message used when none is given.
    #[must_use]
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::AccessDenied => "Access Denied",
            Self::EntityTooLarge => "Your proposed upload exceeds the maximum allowed object size.",
            Self::InternalError => "We encountered an internal error. Please try again.",
            Self::NotImplemented => {
                "A header you provided implies functionality that is not implemented"
            }
            Self::RequestTimeout => {
                "Your socket connection to the server was not read from or written to within the timeout period"
            }
            Self::XAmzContentSHA256Mismatch => {
                "The provided 'x-amz-content-sha256' header does not match what was computed"
            }
        }
    }
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An S3 error response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    /// The error code.
    pub code: ApiErrorCode,
    /// A human-readable error message.
    pub message: String,
    /// The resource the error refers to.
    pub resource: Option<String>,
}

impl ApiError {
    /// Create an error with the code's default message.
    #[must_use]
    pub fn new(code: ApiErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Create an error with a custom message.
    #[must_use]
    pub fn with_message(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            resource: None,
        }
    }

    /// Set the resource the error refers to.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// HTTP status of the response.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        self.code.status_code()
    }
}

/// Format an S3 error document.
#[must_use]
pub fn error_to_xml(err: &ApiError, request_id: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    if let Err(e) = write_error_xml(&mut buf, err, request_id) {
        tracing::error!(error = %e, "failed to serialize S3 error XML");
        buf.clear();
    }
    buf
}

fn write_error_xml(buf: &mut Vec<u8>, err: &ApiError, request_id: &str) -> io::Result<()> {
    let mut writer = Writer::new(buf);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.create_element("Error").write_inner_content(|w| {
        w.create_element("Code")
            .write_text_content(BytesText::new(err.code.as_str()))?;
        w.create_element("Message")
            .write_text_content(BytesText::new(&err.message))?;
        if let Some(resource) = &err.resource {
            w.create_element("Resource")
                .write_text_content(BytesText::new(resource))?;
        }
        w.create_element("RequestId")
            .write_text_content(BytesText::new(request_id))?;
        Ok(())
    })?;

    Ok(())
}

/// Turn an error into an `application/xml` response.
#[must_use]
pub fn error_to_response(err: &ApiError, request_id: &str) -> http::Response<GateBody> {
    let body = GateBody::from_bytes(Bytes::from(error_to_xml(err, request_id)));
    http::Response::builder()
        .status(err.status_code())
        .header(http::header::CONTENT_TYPE, "application/xml")
        .body(body)
        .unwrap_or_else(|_| {
            http::Response::builder()
                .status(http::StatusCode::INTERNAL_SERVER_ERROR)
                .body(GateBody::empty())
                .expect("static response should be valid")
        })
}
