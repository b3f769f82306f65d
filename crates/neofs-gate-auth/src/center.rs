//! The authentication center.

use std::fmt;

use bytes::Bytes;
use http::Request;
use neofs_gate_core::{IdentityKey, OwnerId};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::credentials::{CredentialResolver, Credentials, pack_bearer_token, unpack_bearer_token};
use crate::error::{AuthError, CodecError};
use crate::sigv4::verify_sigv4;

/// Holds the gateway's keys and authenticates S3 requests against them.
///
/// Key material is fixed at construction, so a single center can be shared
/// across request tasks behind an `Arc`.
pub struct AuthCenter {
    identity: IdentityKey,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl fmt::Debug for AuthCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCenter")
            .field("owner_id", self.identity.owner_id())
            .finish_non_exhaustive()
    }
}

impl AuthCenter {
    /// Create a center from the identity key and the token encryption key.
    #[must_use]
    pub fn new(identity: IdentityKey, private_key: RsaPrivateKey) -> Self {
        let public_key = private_key.to_public_key();
        Self {
            identity,
            private_key,
            public_key,
        }
    }

    /// Owner ID of the gateway identity.
    #[must_use]
    pub fn owner_id(&self) -> &OwnerId {
        self.identity.owner_id()
    }

    /// The gateway identity key.
    #[must_use]
    pub fn identity(&self) -> &IdentityKey {
        &self.identity
    }

    /// Public half of the token encryption key.
    #[must_use]
    pub fn encryption_public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Pack `token` into credentials this center can later verify.
    pub fn pack<T: Serialize + ?Sized>(&self, token: &T) -> Result<Credentials, CodecError> {
        pack_bearer_token(token, &self.public_key)
    }

    /// Recover the token and secret access key behind `access_key_id`.
    pub fn unpack<T: DeserializeOwned>(
        &self,
        access_key_id: &str,
    ) -> Result<(T, String), CodecError> {
        unpack_bearer_token(access_key_id, &self.private_key)
    }

    /// Verify the SigV4 signature of `request` and return its bearer token.
    pub fn authenticate<T: DeserializeOwned>(
        &self,
        request: &Request<Bytes>,
    ) -> Result<T, AuthError> {
        verify_sigv4(request, self)
    }
}

impl CredentialResolver for AuthCenter {
    fn resolve<T: DeserializeOwned>(&self, access_key_id: &str) -> Result<(T, String), CodecError> {
        self.unpack(access_key_id)
    }
}
