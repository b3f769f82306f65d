//! Error types for credential packing and SigV4 authentication.
//!
//! [`CodecError`] covers every way turning a bearer token into an access key
//! ID (and back) can fail. [`AuthError`] covers the whole authentication
//! pipeline and wraps [`CodecError`] when the access key ID itself is bad.

/// Errors raised while packing or unpacking bearer token credentials.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The token could not be serialized.
    #[error("failed to serialize bearer token: {0}")]
    Serialization(String),

    /// The serialized token could not be compressed.
    #[error("failed to compress bearer token: {0}")]
    Compression(#[source] std::io::Error),

    /// The compressed token does not fit into a single RSA block.
    #[error("bearer token of {size} bytes exceeds the {capacity}-byte encryption capacity")]
    PayloadTooLarge {
        /// Size of the compressed token.
        size: usize,
        /// Largest payload the key can encrypt.
        capacity: usize,
    },

    /// RSA encryption failed.
    #[error("failed to encrypt bearer token: {0}")]
    Encryption(#[source] rsa::Error),

    /// The access key ID is not valid hex.
    #[error("failed to decode access key ID: {0}")]
    Decode(#[from] hex::FromHexError),

    /// The access key ID was not sealed with this gateway's key, or is corrupt.
    #[error("failed to decrypt access key ID: {0}")]
    Decryption(#[source] rsa::Error),

    /// The decrypted payload is not a valid compressed frame.
    #[error("failed to decompress access key ID: {0}")]
    Decompression(#[source] std::io::Error),

    /// The embedded token could not be deserialized.
    #[error("failed to unmarshal embedded bearer token: {0}")]
    Deserialization(String),
}

/// Coarse classification of [`AuthError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// The request uses a signing form the gateway does not accept.
    UnsupportedRequest,
    /// A header required for authentication is missing or malformed.
    Parse,
    /// The access key ID could not be turned back into a bearer token.
    Codec,
    /// The recomputed signature differs from the presented one.
    SignatureMismatch,
}

/// Errors that can occur while authenticating a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request is signed in presigned URL form.
    #[error("pre-signed form of request is not supported")]
    PresignedNotSupported,

    /// The `Authorization` header is missing from the request.
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// The `Authorization` header appears more than once.
    #[error("expected exactly one Authorization header, found {0}")]
    MultipleAuthHeaders(usize),

    /// The `Authorization` header could not be parsed.
    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    /// `SignedHeaders` names no header.
    #[error("wrong format of signed headers part")]
    EmptySignedHeaders,

    /// The `X-Amz-Date` header is missing.
    #[error("Missing required header: x-amz-date")]
    MissingDateHeader,

    /// The `X-Amz-Date` header is not in `YYYYMMDDThhmmssZ` form.
    #[error("failed to parse x-amz-date header field: {0:?}")]
    InvalidDate(String),

    /// The access key ID could not be unpacked.
    #[error("failed to unpack bearer token: {0}")]
    Codec(#[from] CodecError),

    /// The computed signature does not match the provided signature.
    #[error("Signature does not match")]
    SignatureDoesNotMatch,
}

impl AuthError {
    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::PresignedNotSupported => AuthErrorKind::UnsupportedRequest,
            Self::MissingAuthHeader
            | Self::MultipleAuthHeaders(_)
            | Self::InvalidAuthHeader
            | Self::EmptySignedHeaders
            | Self::MissingDateHeader
            | Self::InvalidDate(_) => AuthErrorKind::Parse,
            Self::Codec(_) => AuthErrorKind::Codec,
            Self::SignatureDoesNotMatch => AuthErrorKind::SignatureMismatch,
        }
    }
}
