//! Canonical request construction for AWS Signature Version 4.
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! A [`CanonicalRequest`] signs every header added to it, so callers decide
//! what is signed by deciding what they add.

use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::codec::sha256_hex;

/// Everything except RFC 3986 unreserved characters is encoded in a path segment.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A request reduced to the parts SigV4 signs.
///
/// # Examples
///
/// ```
/// use neofs_gate_auth::canonical::CanonicalRequest;
///
/// let canonical = CanonicalRequest::new(
///     "GET",
///     "/bucket/object",
///     "",
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
/// )
/// .with_header("X-Amz-Date", "20240101T000000Z")
/// .with_header("Host", "s3.neofs.local");
///
/// assert_eq!(canonical.signed_headers(), "host;x-amz-date");
/// assert!(canonical.to_string().starts_with("GET\n/bucket/object\n\nhost:s3.neofs.local\n"));
/// ```
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    method: String,
    uri: String,
    query: String,
    headers: BTreeMap<String, String>,
    payload_hash: String,
}

impl CanonicalRequest {
    /// Start a canonical request with no headers.
    #[must_use]
    pub fn new(method: &str, path: &str, query: &str, payload_hash: &str) -> Self {
        Self {
            method: method.to_owned(),
            uri: canonical_uri(path),
            query: canonical_query(query),
            headers: BTreeMap::new(),
            payload_hash: payload_hash.to_owned(),
        }
    }

    /// Add a header to the signed set.
    ///
    /// Names are lowercased; values are trimmed with inner whitespace runs
    /// collapsed. Repeated names are joined with `,` in insertion order.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// In-place form of [`CanonicalRequest::with_header`].
    pub fn add_header(&mut self, name: &str, value: &str) {
        let value = collapse_whitespace(value.trim());
        self.headers
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    /// Whether a header with this (case-insensitive) name was added.
    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_ascii_lowercase())
    }

    /// Sorted, `;`-joined names of all added headers.
    #[must_use]
    pub fn signed_headers(&self) -> String {
        self.headers.keys().map(String::as_str).collect::<Vec<_>>().join(";")
    }

    /// Hex SHA-256 of the canonical form, as used in the string to sign.
    #[must_use]
    pub fn hash(&self) -> String {
        sha256_hex(self.to_string().as_bytes())
    }
}

impl fmt::Display for CanonicalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.method)?;
        writeln!(f, "{}", self.uri)?;
        writeln!(f, "{}", self.query)?;
        for (name, value) in &self.headers {
            writeln!(f, "{name}:{value}")?;
        }
        writeln!(f)?;
        writeln!(f, "{}", self.signed_headers())?;
        write!(f, "{}", self.payload_hash)
    }
}

/// Encode each path segment, keeping `/` separators. An empty path becomes `/`.
///
/// Segments are decoded before encoding so an already-encoded path is not
/// encoded twice.
#[must_use]
pub fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }

    path.split('/')
        .map(|segment| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            utf8_percent_encode(&decoded, URI_ENCODE_SET).to_string()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Sort query parameters by name, then value.
///
/// Values are kept exactly as the client sent them, since that is the
/// encoding it signed. A parameter without `=` gets an empty value.
#[must_use]
pub fn canonical_query(query: &str) -> String {
    let mut params: Vec<(&str, &str)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|param| param.split_once('=').unwrap_or((param, "")))
        .collect();
    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
            }
            prev_was_space = true;
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}
