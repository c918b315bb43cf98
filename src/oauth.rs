//! OAuth 1.0a request signing.
//!
//! Builds the `Authorization` header and the fully-formed upstream request for
//! a given method/URL/query/body and `(consumer, access)` credential pair, per
//! <https://developer.twitter.com/en/docs/authentication/oauth-1-0a/creating-a-signature>.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use crate::codec::{base36_encode, percent_encode_str, Params};
use crate::error::Error;

type HmacSha1 = Hmac<Sha1>;

const OAUTH_VERSION: &str = "1.0";
const OAUTH_SIGNATURE_METHOD: &str = "HMAC-SHA1";
const NONCE_BYTES: usize = 32;

/// The Twitter API version path segment every upstream request carries
/// (spec.md §6: "HTTPS to `api.twitter.com`, version path segment `1.1`").
/// Joined into the base URL here rather than baked into `endpoint::CATALOGUE`
/// paths, so every `SignableRequest` gets it regardless of where the request
/// came from.
const API_VERSION: &str = "1.1";

/// One half of a credential pair: a key/token combination. Used for both the
/// app-level `consumer` credential and the user-level `access` credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Auth {
    pub key: String,
    pub token: String,
}

impl Auth {
    pub fn new(key: impl Into<String>, token: impl Into<String>) -> Self {
        Self { key: key.into(), token: token.into() }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth").field("key", &self.key).field("token", &"<redacted>").finish()
    }
}

/// The full credential needed to sign a request: an app-level consumer
/// identity and a user-level access identity. Immutable and never persisted
/// by this crate (per the data model contract).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub consumer: Auth,
    pub access: Auth,
}

impl Credential {
    pub fn new(consumer: Auth, access: Auth) -> Self {
        Self { consumer, access }
    }

    /// The RateCoord session key for this credential: the access token.
    pub fn session_key(&self) -> &str {
        &self.access.token
    }
}

/// An unsigned request destined for the upstream API. `path` excludes the
/// `1.1/` version segment — [`OAuthSigner`] joins that in once when building
/// the base URL, so every caller (the endpoint catalogue included) only ever
/// deals in version-less paths.
#[derive(Clone, Debug)]
pub struct SignableRequest {
    pub method: Method,
    pub protocol: String,
    pub host: String,
    pub path: String,
    pub query: Params,
    pub body: Params,
}

/// HTTP method used by the endpoint catalogue. Goldcrest only ever issues GET
/// or POST requests upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// The output of signing: a URL, an optional form-encoded body, and the
/// headers to send with the request.
#[derive(Clone, Debug)]
pub struct SignedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub authorization: String,
    pub content_type: Option<&'static str>,
}

/// Builds OAuth 1.0a signed requests.
pub struct OAuthSigner;

impl OAuthSigner {
    /// Signs `request` with `credential`, generating a fresh cryptographically
    /// strong nonce and the current Unix timestamp.
    pub fn sign(request: &SignableRequest, credential: &Credential) -> Result<SignedRequest, Error> {
        let nonce = generate_nonce();
        let timestamp = current_timestamp();
        Self::sign_with(request, credential, &nonce, &timestamp)
    }

    /// The deterministic core of signing: given an explicit nonce and
    /// timestamp, produces a byte-identical result for the same inputs every
    /// time (P6). Exposed separately so tests can pin the nonce/timestamp to
    /// a known fixture instead of relying on `sign`'s randomness.
    pub fn sign_with(
        request: &SignableRequest,
        credential: &Credential,
        nonce: &str,
        timestamp: &str,
    ) -> Result<SignedRequest, Error> {
        let base_url = format!("{}://{}/{}/{}", request.protocol, request.host, API_VERSION, request.path);

        let mut oauth_params = Params::new();
        oauth_params
            .set("oauth_consumer_key", credential.consumer.key.clone())
            .map_err(conflict_to_signing_error)?;
        oauth_params
            .set("oauth_token", credential.access.key.clone())
            .map_err(conflict_to_signing_error)?;
        oauth_params
            .set("oauth_signature_method", OAUTH_SIGNATURE_METHOD)
            .map_err(conflict_to_signing_error)?;
        oauth_params.set("oauth_version", OAUTH_VERSION).map_err(conflict_to_signing_error)?;
        oauth_params.set("oauth_timestamp", timestamp).map_err(conflict_to_signing_error)?;
        oauth_params.set("oauth_nonce", nonce).map_err(conflict_to_signing_error)?;

        let base_string = Self::sign_base_string(
            request.method,
            &base_url,
            &oauth_params,
            &request.query,
            &request.body,
        )?;

        let signing_key =
            format!("{}&{}", percent_encode_str(&credential.consumer.token), percent_encode_str(&credential.access.token));

        let signature = Self::signature(&signing_key, &base_string);
        oauth_params.set("oauth_signature", signature).map_err(conflict_to_signing_error)?;

        let authorization = format!("OAuth {}", oauth_params.encode(", ", true));

        let query_str = request.query.encode("&", false);
        let url = if query_str.is_empty() { base_url } else { format!("{base_url}?{query_str}") };

        let body_str = request.body.encode("&", false);
        let (body, content_type) =
            if body_str.is_empty() { (None, None) } else { (Some(body_str), Some("application/x-www-form-urlencoded")) };

        Ok(SignedRequest { method: request.method, url, body, authorization, content_type })
    }

    /// Builds `METHOD&percent_encode(url)&percent_encode(sorted_params)` where
    /// `sorted_params` is the union of the OAuth, query, and body parameter
    /// sets. The three sets are required to be disjoint by contract; an
    /// overlap is a signing error rather than a silently-last-write-wins
    /// merge.
    fn sign_base_string(
        method: Method,
        base_url: &str,
        oauth_params: &Params,
        query: &Params,
        body: &Params,
    ) -> Result<String, Error> {
        let mut all = oauth_params.clone();
        all.extend(query.clone()).map_err(conflict_to_signing_error)?;
        all.extend(body.clone()).map_err(conflict_to_signing_error)?;

        let param_str = all.encode("&", false);
        Ok(format!("{}&{}&{}", method.as_str(), percent_encode_str(base_url), percent_encode_str(&param_str)))
    }

    /// HMAC-SHA1(signing_key, base_string), base64-encoded.
    fn signature(signing_key: &str, base_string: &str) -> String {
        let mut mac = HmacSha1::new_from_slice(signing_key.as_bytes())
            .expect("HMAC accepts a key of any length");
        mac.update(base_string.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }
}

fn conflict_to_signing_error(conflict: crate::codec::ParamConflict) -> Error {
    Error::Signing(format!("overlapping parameter in signature base string: {conflict}"))
}

/// Generates a fresh nonce: 32 cryptographically-strong random bytes, encoded
/// as base-36 ASCII. Uses `rand::rngs::OsRng` rather than a thread-local PRNG
/// because nonce generation is off the hot path (one per request at most) and
/// the spec calls for an RNG that is unambiguously cryptographically strong.
fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base36_encode(&bytes)
}

fn current_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs()
        .to_string()
}
