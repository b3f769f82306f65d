//! One-shot byte transforms used to seal bearer tokens.
//!
//! - SHA-256 hashing ([`sha256_hex`])
//! - zstd compression ([`compress`], [`decompress`])
//! - RSA-OAEP (SHA-256, empty label) encryption ([`encrypt`], [`decrypt`])
//!
//! Every call builds its own zstd context. Nothing here holds state between
//! calls, so all functions are safe to use from concurrent requests.

use rand_core::OsRng;
use rsa::sha2::Sha256 as OaepDigest;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::CodecError;

/// Upper bound on the size of a decompressed token.
pub const MAX_TOKEN_SIZE: usize = 64 * 1024;

/// Output size of the OAEP digest in bytes.
const OAEP_HASH_LEN: usize = 32;

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
///
/// # Examples
///
/// ```
/// use neofs_gate_auth::codec::sha256_hex;
///
/// assert_eq!(
///     sha256_hex(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compress `data` into a single zstd frame.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    zstd::bulk::compress(data, zstd::DEFAULT_COMPRESSION_LEVEL).map_err(CodecError::Compression)
}

/// Decompress a single zstd frame of at most [`MAX_TOKEN_SIZE`] bytes.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    zstd::bulk::decompress(data, MAX_TOKEN_SIZE).map_err(CodecError::Decompression)
}

/// Largest plaintext `key` can encrypt in one OAEP block.
///
/// ```text
/// capacity = modulus_bytes - 2 * hash_len - 2
/// ```
#[must_use]
pub fn encryption_capacity(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(2 * OAEP_HASH_LEN + 2)
}

/// Encrypt `data` with RSA-OAEP.
///
/// Fails with [`CodecError::PayloadTooLarge`] when `data` exceeds
/// [`encryption_capacity`].
pub fn encrypt(key: &RsaPublicKey, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let capacity = encryption_capacity(key);
    if data.len() > capacity {
        return Err(CodecError::PayloadTooLarge {
            size: data.len(),
            capacity,
        });
    }
    key.encrypt(&mut OsRng, Oaep::new::<OaepDigest>(), data)
        .map_err(CodecError::Encryption)
}

/// Decrypt an RSA-OAEP ciphertext.
pub fn decrypt(key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    key.decrypt_blinded(&mut OsRng, Oaep::new::<OaepDigest>(), data)
        .map_err(CodecError::Decryption)
}

#[cfg(test)]
mod tests {
    use neofs_gate_core::keys::parse_auth_key;

    use super::*;

    const AUTH_KEY: &str = include_str!("../../../testdata/auth_key.pem");
    const OTHER_AUTH_KEY: &str = include_str!("../../../testdata/other_auth_key.pem");

    fn auth_key() -> RsaPrivateKey {
        parse_auth_key(AUTH_KEY).unwrap()
    }

    #[test]
    fn test_should_hash_nonempty_payload() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_should_restore_compressed_bytes() {
        let data = b"bearer token bearer token bearer token".repeat(8);
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_should_reject_garbage_frame() {
        let result = decompress(b"definitely not zstd");
        assert!(matches!(result, Err(CodecError::Decompression(_))));
    }

    #[test]
    fn test_should_reject_frame_larger_than_token_limit() {
        let compressed = compress(&vec![0u8; MAX_TOKEN_SIZE + 1]).unwrap();
        let result = decompress(&compressed);
        assert!(matches!(result, Err(CodecError::Decompression(_))));
    }

    #[test]
    fn test_should_report_oaep_capacity_for_2048_bit_key() {
        assert_eq!(encryption_capacity(&auth_key().to_public_key()), 190);
    }

    #[test]
    fn test_should_decrypt_what_was_encrypted() {
        let key = auth_key();
        let ciphertext = encrypt(&key.to_public_key(), b"payload").unwrap();
        assert_eq!(ciphertext.len(), 256);
        assert_eq!(decrypt(&key, &ciphertext).unwrap(), b"payload");
    }

    #[test]
    fn test_should_reject_payload_over_capacity() {
        let key = auth_key();
        let result = encrypt(&key.to_public_key(), &[7u8; 191]);
        assert!(matches!(
            result,
            Err(CodecError::PayloadTooLarge {
                size: 191,
                capacity: 190
            })
        ));
    }

    #[test]
    fn test_should_fail_to_decrypt_with_other_key() {
        let ciphertext = encrypt(&auth_key().to_public_key(), b"payload").unwrap();
        let other = parse_auth_key(OTHER_AUTH_KEY).unwrap();
        assert!(matches!(
            decrypt(&other, &ciphertext),
            Err(CodecError::Decryption(_))
        ));
    }
}
