//! AWS Signature Version 4 signing and verification.
//!
//! The gateway never stores a secret access key. To verify a request it
//! unpacks the secret from the access key ID, re-signs a copy of the request
//! holding only the headers the client signed, and compares the result with
//! the signature the client sent:
//!
//! 1. Reject presigned requests.
//! 2. Parse the single `Authorization` header.
//! 3. Parse `X-Amz-Date`.
//! 4. Resolve the access key ID into a token and its secret.
//! 5. Sign the header-filtered request with [`sign_request`].
//! 6. Compare signatures in constant time.
//!
//! The main entry point is [`verify_sigv4`].

use std::sync::LazyLock;

use bytes::Bytes;
use chrono::NaiveDateTime;
use hmac::{Hmac, KeyInit, Mac};
use http::header::{AUTHORIZATION, HOST};
use http::{HeaderMap, Method, Request, Uri};
use regex::Regex;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::canonical::CanonicalRequest;
use crate::codec::sha256_hex;
use crate::credentials::CredentialResolver;
use crate::error::AuthError;

/// The only algorithm supported by this implementation.
const SUPPORTED_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// `X-Amz-Date` layout.
const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Credential scope date layout.
const SCOPE_DATE_FORMAT: &str = "%Y%m%d";

const AMZ_DATE_HEADER: &str = "x-amz-date";
const AMZ_CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";

type HmacSha256 = Hmac<Sha256>;

static AUTH_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^AWS4-HMAC-SHA256 ",
        r"Credential=(?P<access_key_id>[^/]+)/(?P<date>[^/]+)/(?P<region>[^/]*)/(?P<service>[^/]+)/aws4_request,\s*",
        r"SignedHeaders=(?P<signed_headers>[^,]*),\s*",
        r"Signature=(?P<signature>[^,\s]+)$",
    ))
    .expect("authorization header pattern is valid")
});

/// Parsed components of an AWS SigV4 `Authorization` header.
///
/// ```text
/// AWS4-HMAC-SHA256 Credential=<akid>/<date>/<region>/<service>/aws4_request,
///   SignedHeaders=host;x-amz-date,
///   Signature=<hex-signature>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuth {
    /// The access key ID, i.e. the sealed bearer token.
    pub access_key_id: String,
    /// The date component of the credential scope (YYYYMMDD).
    pub date: String,
    /// The region from the credential scope. May be empty.
    pub region: String,
    /// The service from the credential scope.
    pub service: String,
    /// Signed header names in the order the client listed them, lowercased.
    pub signed_headers: Vec<String>,
    /// The hex-encoded signature.
    pub signature: String,
}

/// Parse an AWS SigV4 `Authorization` header value into its components.
///
/// # Errors
///
/// Returns [`AuthError::InvalidAuthHeader`] if the value does not match the
/// grammar and [`AuthError::EmptySignedHeaders`] if `SignedHeaders` names no
/// header.
pub fn parse_authorization_header(header: &str) -> Result<ParsedAuth, AuthError> {
    let caps = AUTH_HEADER_RE
        .captures(header.trim())
        .ok_or(AuthError::InvalidAuthHeader)?;

    let signed_headers: Vec<String> = caps["signed_headers"]
        .split(';')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    if signed_headers.is_empty() {
        return Err(AuthError::EmptySignedHeaders);
    }

    Ok(ParsedAuth {
        access_key_id: caps["access_key_id"].to_owned(),
        date: caps["date"].to_owned(),
        region: caps["region"].to_owned(),
        service: caps["service"].to_owned(),
        signed_headers,
        signature: caps["signature"].to_owned(),
    })
}

/// Parse an `X-Amz-Date` value, which must be exactly `YYYYMMDDThhmmssZ`.
pub fn parse_amz_date(value: &str) -> Result<NaiveDateTime, AuthError> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 16
        && bytes[8] == b'T'
        && bytes[15] == b'Z'
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[9..15].iter().all(u8::is_ascii_digit);
    if !well_formed {
        return Err(AuthError::InvalidDate(value.to_owned()));
    }
    NaiveDateTime::parse_from_str(value, AMZ_DATE_FORMAT)
        .map_err(|_| AuthError::InvalidDate(value.to_owned()))
}

/// Whether the query string carries a presigned SigV4 signature.
#[must_use]
pub fn is_presigned(query: Option<&str>) -> bool {
    query.is_some_and(|query| {
        form_urlencoded::parse(query.as_bytes())
            .any(|(k, v)| k == "X-Amz-Algorithm" && v == SUPPORTED_ALGORITHM)
    })
}

/// Build the SigV4 string to sign.
///
/// ```text
/// AWS4-HMAC-SHA256\n
/// <ISO8601 timestamp>\n
/// <credential_scope>\n
/// <hex(SHA256(canonical_request))>
/// ```
#[must_use]
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request_hash: &str,
) -> String {
    format!("{SUPPORTED_ALGORITHM}\n{timestamp}\n{credential_scope}\n{canonical_request_hash}")
}

/// Derive the SigV4 signing key using the HMAC-SHA256 chain.
///
/// ```text
/// DateKey              = HMAC-SHA256("AWS4" + secret_key, date)
/// DateRegionKey        = HMAC-SHA256(DateKey, region)
/// DateRegionServiceKey = HMAC-SHA256(DateRegionKey, service)
/// SigningKey           = HMAC-SHA256(DateRegionServiceKey, "aws4_request")
/// ```
#[must_use]
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let date_region_key = hmac_sha256(&date_key, region.as_bytes());
    let date_region_service_key = hmac_sha256(&date_region_key, service.as_bytes());
    hmac_sha256(&date_region_service_key, b"aws4_request")
}

/// Hex HMAC-SHA256 of `data` under `signing_key`.
#[must_use]
pub fn compute_signature(signing_key: &[u8], data: &str) -> String {
    hex::encode(hmac_sha256(signing_key, data.as_bytes()))
}

/// Static credentials and scope for [`sign_request`].
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    /// Access key ID placed in the credential scope.
    pub access_key_id: &'a str,
    /// Secret the signing key is derived from.
    pub secret_access_key: &'a str,
    /// Scope region.
    pub region: &'a str,
    /// Scope service.
    pub service: &'a str,
    /// Signing time; also provides the scope date.
    pub timestamp: NaiveDateTime,
}

/// Sign a request and return the `Authorization` header value.
///
/// Every header in `headers` except `Authorization` is signed. `X-Amz-Date`
/// is always signed with the value taken from `params.timestamp`, and `Host`
/// falls back to the URI authority when the header is absent. The payload
/// hash is the `X-Amz-Content-Sha256` header when present and the SHA-256 of
/// `body` otherwise.
#[must_use]
pub fn sign_request(
    params: &SigningParams<'_>,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> String {
    let amz_date = params.timestamp.format(AMZ_DATE_FORMAT).to_string();
    let scope_date = params.timestamp.format(SCOPE_DATE_FORMAT).to_string();

    let payload_hash = headers
        .get(AMZ_CONTENT_SHA256_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| sha256_hex(body), ToOwned::to_owned);

    let mut canonical = CanonicalRequest::new(
        method.as_str(),
        uri.path(),
        uri.query().unwrap_or(""),
        &payload_hash,
    );
    for (name, value) in headers {
        if *name == AUTHORIZATION || name.as_str() == AMZ_DATE_HEADER {
            continue;
        }
        canonical.add_header(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
    }
    canonical.add_header(AMZ_DATE_HEADER, &amz_date);
    if !canonical.has_header(HOST.as_str()) {
        if let Some(authority) = uri.authority() {
            canonical.add_header(HOST.as_str(), authority.as_str());
        }
    }

    let credential_scope = format!(
        "{scope_date}/{}/{}/aws4_request",
        params.region, params.service
    );
    let string_to_sign = build_string_to_sign(&amz_date, &credential_scope, &canonical.hash());
    let signing_key = derive_signing_key(
        params.secret_access_key,
        &scope_date,
        params.region,
        params.service,
    );
    let signature = compute_signature(&signing_key, &string_to_sign);

    format!(
        "{SUPPORTED_ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={}, Signature={signature}",
        params.access_key_id,
        canonical.signed_headers(),
    )
}

/// Verify a SigV4-signed request and return the token behind its access key ID.
///
/// `resolver` turns the access key ID into the token and the secret the
/// client must have signed with.
///
/// # Errors
///
/// Returns an [`AuthError`] if:
/// - the request is presigned
/// - the `Authorization` header is missing, repeated or malformed
/// - `X-Amz-Date` is missing or malformed
/// - the access key ID cannot be resolved
/// - the signature does not match
pub fn verify_sigv4<T, R>(request: &Request<Bytes>, resolver: &R) -> Result<T, AuthError>
where
    T: DeserializeOwned,
    R: CredentialResolver,
{
    if is_presigned(request.uri().query()) {
        return Err(AuthError::PresignedNotSupported);
    }

    let mut values = request.headers().get_all(AUTHORIZATION).iter();
    let auth_header = match (values.next(), values.count()) {
        (None, _) => return Err(AuthError::MissingAuthHeader),
        (Some(value), 0) => value.to_str().map_err(|_| AuthError::InvalidAuthHeader)?,
        (Some(_), extra) => return Err(AuthError::MultipleAuthHeaders(extra + 1)),
    };

    let parsed = parse_authorization_header(auth_header)?;

    let amz_date = request
        .headers()
        .get(AMZ_DATE_HEADER)
        .ok_or(AuthError::MissingDateHeader)?;
    let timestamp = amz_date
        .to_str()
        .map_err(|_| {
            AuthError::InvalidDate(String::from_utf8_lossy(amz_date.as_bytes()).into_owned())
        })
        .and_then(parse_amz_date)?;

    debug!(
        date = %parsed.date,
        region = %parsed.region,
        service = %parsed.service,
        signed_headers = ?parsed.signed_headers,
        "verifying SigV4 signature"
    );

    let (token, secret) = resolver.resolve::<T>(&parsed.access_key_id)?;

    let mut signed = HeaderMap::with_capacity(parsed.signed_headers.len());
    for (name, value) in request.headers() {
        if parsed.signed_headers.iter().any(|s| name.as_str().eq_ignore_ascii_case(s)) {
            signed.append(name.clone(), value.clone());
        }
    }

    let params = SigningParams {
        access_key_id: &parsed.access_key_id,
        secret_access_key: &secret,
        region: &parsed.region,
        service: &parsed.service,
        timestamp,
    };
    let fresh = sign_request(&params, request.method(), request.uri(), &signed, request.body());
    let expected = parse_authorization_header(&fresh)?;

    if parsed
        .signature
        .as_bytes()
        .ct_eq(expected.signature.as_bytes())
        .into()
    {
        debug!("signature verification succeeded");
        Ok(token)
    } else {
        debug!("signature mismatch");
        Err(AuthError::SignatureDoesNotMatch)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can accept keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
