//! Bearer token credentials and AWS Signature Version 4 authentication for
//! the NeoFS S3 gateway.
//!
//! # Overview
//!
//! S3 clients authenticate with an access key ID and a secret access key.
//! The gateway issues neither: a bearer token is sealed into the access key
//! ID, and the secret is a hash of the token. When a signed request arrives,
//! the [`AuthCenter`] opens the access key ID, recomputes the secret and
//! re-signs the request to check the client's signature.
//!
//! # Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use neofs_gate_auth::{AuthCenter, BearerToken};
//! use neofs_gate_core::{IdentityKey, generate_auth_key};
//!
//! let center = AuthCenter::new(IdentityKey::generate(), generate_auth_key().unwrap());
//!
//! // Hand these to the client.
//! let token = BearerToken::from_claims(&("alice", "read")).unwrap();
//! let credentials = center.pack(&token).unwrap();
//!
//! // Later, for each SigV4-signed request:
//! # let request = http::Request::new(Bytes::new());
//! let token: BearerToken = center.authenticate(&request).unwrap();
//! ```
//!
//! # Modules
//!
//! - [`canonical`] - Canonical request construction
//! - [`center`] - The authentication center
//! - [`codec`] - Hashing, compression and RSA-OAEP primitives
//! - [`credentials`] - Packing tokens into credential pairs
//! - [`error`] - Error types
//! - [`sigv4`] - Signing and signature verification
//! - [`token`] - The opaque bearer token type

pub mod canonical;
pub mod center;
pub mod codec;
pub mod credentials;
pub mod error;
pub mod sigv4;
pub mod token;

pub use center::AuthCenter;
pub use codec::sha256_hex;
pub use credentials::{CredentialResolver, Credentials, pack_bearer_token, unpack_bearer_token};
pub use error::{AuthError, AuthErrorKind, CodecError};
pub use sigv4::{SigningParams, sign_request, verify_sigv4};
pub use token::BearerToken;
