//! Bearer tokens packed into S3 credentials.
//!
//! A token becomes an access key ID by serializing it (CBOR), compressing
//! the bytes and sealing them with the gateway's RSA public key. The secret
//! access key is the SHA-256 of the serialized token, so whoever holds the
//! gateway's private key can recompute it from the access key ID alone and
//! nothing has to be stored server-side.
//!
//! ```text
//! AccessKeyID     = hex(rsa_oaep(pub, zstd(cbor(token))))
//! SecretAccessKey = hex(sha256(cbor(token)))
//! ```

use std::fmt;

use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::codec::{compress, decompress, decrypt, encrypt, sha256_hex};
use crate::error::CodecError;

/// An S3 credential pair derived from a bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Hex of the sealed token.
    pub access_key_id: String,
    /// Hex SHA-256 of the serialized token.
    pub secret_access_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Recovers the token and secret behind an access key ID.
///
/// The signature verifier only needs this seam; [`crate::AuthCenter`]
/// implements it with the gateway's private key.
pub trait CredentialResolver: Send + Sync {
    /// Return the embedded token and the secret access key for `access_key_id`.
    fn resolve<T: DeserializeOwned>(&self, access_key_id: &str) -> Result<(T, String), CodecError>;
}

/// Pack `token` into a credential pair sealed for `key`.
pub fn pack_bearer_token<T: Serialize + ?Sized>(
    token: &T,
    key: &RsaPublicKey,
) -> Result<Credentials, CodecError> {
    let mut data = Vec::new();
    ciborium::into_writer(token, &mut data)
        .map_err(|e| CodecError::Serialization(e.to_string()))?;

    let compressed = compress(&data)?;
    let sealed = encrypt(key, &compressed)?;
    debug!(
        token_size = data.len(),
        compressed_size = compressed.len(),
        "packed bearer token"
    );

    Ok(Credentials {
        access_key_id: hex::encode(sealed),
        secret_access_key: sha256_hex(&data),
    })
}

/// Reverse [`pack_bearer_token`], returning the token and its secret access key.
pub fn unpack_bearer_token<T: DeserializeOwned>(
    access_key_id: &str,
    key: &RsaPrivateKey,
) -> Result<(T, String), CodecError> {
    let sealed = hex::decode(access_key_id)?;
    let compressed = decrypt(key, &sealed)?;
    let data = decompress(&compressed)?;
    let token = ciborium::from_reader(data.as_slice())
        .map_err(|e| CodecError::Deserialization(e.to_string()))?;
    Ok((token, sha256_hex(&data)))
}
