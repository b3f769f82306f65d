//! The bearer token carried inside an access key ID.
//!
//! The gateway does not interpret bearer tokens: it only moves them from the
//! access key ID to the request extensions. [`BearerToken`] therefore keeps
//! the decoded CBOR value as-is, and callers that know the token layout can
//! convert it with [`BearerToken::decode`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// An opaque bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BearerToken(ciborium::Value);

impl BearerToken {
    /// Build a token from any serializable claim set.
    pub fn from_claims<T: Serialize + ?Sized>(claims: &T) -> Result<Self, CodecError> {
        ciborium::Value::serialized(claims)
            .map(Self)
            .map_err(|e| CodecError::Serialization(e.to_string()))
    }

    /// Convert the token into a concrete claim type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        self.0
            .deserialized()
            .map_err(|e| CodecError::Deserialization(e.to_string()))
    }

    /// The raw CBOR value.
    #[must_use]
    pub fn as_value(&self) -> &ciborium::Value {
        &self.0
    }
}

impl From<ciborium::Value> for BearerToken {
    fn from(value: ciborium::Value) -> Self {
        Self(value)
    }
}
