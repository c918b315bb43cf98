//! `UpstreamPipeline`: composes admission, signing, the HTTP round trip, and
//! response classification into the single operation spec.md §4.4 describes
//! (the "control flow for one request" in §2).
//!
//! Grounded on the original Go implementation's `proxy/twitter.go`
//! (`twitterClient.request`, `rateLimitHeaders`) for the control flow, and on
//! the teacher's `twitter/api.rs::make_authenticated_request` for the Rust
//! shape of building a `reqwest::RequestBuilder`, sending it, and logging at
//! each stage with `log::info!`/`warn!`/`error!`. Unlike the teacher's 401
//! retry loop (specific to OAuth2 token refresh, which OAuth 1.0a has no
//! counterpart for), this pipeline makes exactly one upstream attempt per
//! call, per §7's "no automatic retry inside the core."

use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use reqwest::header::HeaderMap;
use reqwest::Client;

use crate::config::RateLimitConfig;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::limit::{AdmitResult, FinalizeUpdate, RateCoord};
use crate::oauth::{Credential, Method, OAuthSigner, SignableRequest};

const DEFAULT_PROTOCOL: &str = "https";
const DEFAULT_HOST: &str = "api.twitter.com";

/// How much of an error response body to retain in an `Error`, so logs and
/// callers see enough to diagnose a failure without unbounded memory growth
/// on a pathological upstream response.
const BODY_PREFIX_LEN: usize = 512;

/// A successful upstream response, handed back verbatim. Decoding into
/// domain types is a collaborator's job, not this crate's — see §6.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Executes signed, rate-limit-aware requests against the upstream API.
pub struct UpstreamPipeline {
    coord: RateCoord,
    client: Client,
    protocol: String,
    host: String,
}

impl UpstreamPipeline {
    /// Builds the pipeline's own [`RateCoord`] from `config`, so every
    /// behavioural knob (`assume_next`, the stuck guard) flows from the one
    /// config value a caller supplies, rather than requiring the caller to
    /// assemble a `RateCoord` separately.
    pub fn new(config: RateLimitConfig, client: Client) -> Self {
        Self {
            coord: RateCoord::new(config),
            client,
            protocol: DEFAULT_PROTOCOL.to_string(),
            host: DEFAULT_HOST.to_string(),
        }
    }

    /// As [`UpstreamPipeline::new`], but targeting an explicit host — used by
    /// tests to point the pipeline at a local `wiremock` server instead of
    /// the real upstream.
    pub fn with_host(
        config: RateLimitConfig,
        client: Client,
        protocol: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self { coord: RateCoord::new(config), client, protocol: protocol.into(), host: host.into() }
    }

    /// Runs the full admit → sign → execute → parse → finalize → classify
    /// procedure for one logical request (spec.md §4.4).
    pub async fn send(
        &self,
        endpoint: &Endpoint,
        credential: &Credential,
        query: crate::codec::Params,
        body: crate::codec::Params,
        deadline: Duration,
    ) -> Result<RawResponse, Error> {
        let session_key = credential.session_key().to_string();
        let endpoint_key = endpoint.limit_key();

        // Step 1: admit.
        let admission = self.coord.admit(&session_key, &endpoint_key, deadline).await?;
        if let AdmitResult::Retry(retry_at) = admission {
            debug!("admission denied for session {session_key} endpoint {endpoint_key}");
            return Err(Error::RateLimit { retry_at });
        }

        // Steps 2–3: sign and execute. Every exit path below runs through
        // `finalize` exactly once, mirroring the original Go's `defer`.
        let (result, update) = self.execute(endpoint, credential, query, body, deadline).await;
        self.coord.finalize(&session_key, &endpoint_key, update).await;
        result
    }

    /// Returns the classified outcome alongside the `FinalizeUpdate` that
    /// must be reported regardless of that outcome — the update is computed
    /// from whatever rate-limit headers were available even on an error
    /// path, and is `FinalizeUpdate::default()` only when the request never
    /// produced a response at all (step 6 of §4.4).
    async fn execute(
        &self,
        endpoint: &Endpoint,
        credential: &Credential,
        query: crate::codec::Params,
        body: crate::codec::Params,
        deadline: Duration,
    ) -> (Result<RawResponse, Error>, FinalizeUpdate) {
        let request = SignableRequest {
            method: endpoint.method,
            protocol: self.protocol.clone(),
            host: self.host.clone(),
            path: endpoint.path.to_string(),
            query,
            body,
        };
        let signed = match OAuthSigner::sign(&request, credential) {
            Ok(signed) => signed,
            Err(err) => return (Err(err), FinalizeUpdate::default()),
        };

        info!("sending {} {}", signed.method.as_str(), endpoint.path);

        let mut builder = match signed.method {
            Method::Get => self.client.get(&signed.url),
            Method::Post => self.client.post(&signed.url),
        };
        builder = builder.header("Authorization", &signed.authorization).timeout(deadline);
        if let Some(content_type) = signed.content_type {
            builder = builder.header("Content-Type", content_type);
        }
        if let Some(form_body) = signed.body {
            builder = builder.body(form_body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return (Err(Error::Connection(err.to_string())), FinalizeUpdate::default()),
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let update = match parse_rate_limit_update(&headers) {
            Ok(update) => update,
            Err(err) => return (Err(err), FinalizeUpdate::default()),
        };
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => return (Err(Error::Connection(err.to_string())), update),
        };

        if status == 429 {
            warn!("upstream rejected request with 429 for {}", endpoint.path);
            let update = FinalizeUpdate { current: Some(0), force_sync: true, ..update };
            return (Err(Error::RateLimit { retry_at: update.resets_at }), update);
        }

        let result = if (200..300).contains(&status) {
            Ok(RawResponse { status, headers, body })
        } else if (400..500).contains(&status) {
            Err(Error::BadRequest { status, body_prefix: body_prefix(&body) })
        } else {
            Err(Error::Upstream { status, body_prefix: body_prefix(&body) })
        };
        (result, update)
    }
}

fn body_prefix(body: &Bytes) -> String {
    let text = String::from_utf8_lossy(body);
    text.chars().take(BODY_PREFIX_LEN).collect()
}

/// Parses `X-Rate-Limit-Limit`/`-Remaining`/`-Reset` (case-insensitive, per
/// `reqwest::header::HeaderMap::get`) into a [`FinalizeUpdate`]. Header
/// absence is allowed; a present-but-unparseable value is a hard error (§4.4
/// step 4) even though the caller still runs `finalize` afterward.
fn parse_rate_limit_update(headers: &HeaderMap) -> Result<FinalizeUpdate, Error> {
    let next = parse_header(headers, "x-rate-limit-limit")?;
    let current = parse_header(headers, "x-rate-limit-remaining")?;
    let resets_at = parse_header(headers, "x-rate-limit-reset")?
        .map(|secs: u64| std::time::UNIX_EPOCH + Duration::from_secs(secs));
    Ok(FinalizeUpdate { current, next, resets_at, force_sync: false })
}

fn parse_header<T: std::str::FromStr>(headers: &HeaderMap, name: &'static str) -> Result<Option<T>, Error> {
    let Some(value) = headers.get(name) else { return Ok(None) };
    let text = value.to_str().map_err(|_| Error::BadResponse { header: name, value: "<non-ASCII>".to_string() })?;
    text.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::BadResponse { header: name, value: text.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Params;
    use crate::endpoint::{endpoint_for, LogicalOp};
    use crate::oauth::Auth;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential() -> Credential {
        Credential::new(Auth::new("ck", "cs"), Auth::new("ak", "as"))
    }

    fn pipeline_for(server: &MockServer) -> UpstreamPipeline {
        let uri = server.uri();
        let host = uri.trim_start_matches("http://").to_string();
        UpstreamPipeline::with_host(RateLimitConfig::default(), Client::new(), "http", host)
    }

    #[test]
    fn parses_all_three_rate_limit_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-rate-limit-limit", "100".parse().unwrap());
        headers.insert("x-rate-limit-remaining", "97".parse().unwrap());
        headers.insert("x-rate-limit-reset", "1700000000".parse().unwrap());

        let update = parse_rate_limit_update(&headers).unwrap();
        assert_eq!(update.next, Some(100));
        assert_eq!(update.current, Some(97));
        assert_eq!(update.resets_at, Some(std::time::UNIX_EPOCH + Duration::from_secs(1700000000)));
    }

    #[test]
    fn missing_headers_are_all_none() {
        let headers = HeaderMap::new();
        let update = parse_rate_limit_update(&headers).unwrap();
        assert_eq!(update.next, None);
        assert_eq!(update.current, None);
        assert_eq!(update.resets_at, None);
    }

    #[test]
    fn malformed_header_value_is_bad_response() {
        let mut headers = HeaderMap::new();
        headers.insert("x-rate-limit-remaining", "not-a-number".parse().unwrap());
        let err = parse_rate_limit_update(&headers).unwrap_err();
        assert!(matches!(err, Error::BadResponse { header: "x-rate-limit-remaining", .. }));
    }

    // Scenario 1 (cold probe) end to end: admit probes, the mock responds,
    // and finalize records the observed budget.
    #[tokio::test]
    async fn successful_get_returns_raw_response_and_updates_the_cell() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.1/statuses/show.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-rate-limit-limit", "180")
                    .insert_header("x-rate-limit-remaining", "179")
                    .insert_header("x-rate-limit-reset", "9999999999")
                    .set_body_string("{\"id\":1}"),
            )
            .mount(&server)
            .await;

        let pipeline = pipeline_for(&server);
        let endpoint = endpoint_for(LogicalOp::ShowTweet);
        let mut query = Params::new();
        query.set("id", "1").unwrap();

        let response =
            pipeline.send(&endpoint, &credential(), query, Params::new(), Duration::from_secs(5)).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(body_prefix(&response.body), "{\"id\":1}");
    }

    // Scenario 2 (exhaustion): a 429 is surfaced as a typed rate-limit error
    // and still finalizes the cell with the upstream-declared reset.
    #[tokio::test]
    async fn rate_limited_response_is_classified_and_still_finalizes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/statuses/update.json"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("x-rate-limit-reset", "9999999999")
                    .set_body_string("{\"errors\":[{\"code\":88}]}"),
            )
            .mount(&server)
            .await;

        let pipeline = pipeline_for(&server);
        let endpoint = endpoint_for(LogicalOp::Publish);
        let mut body = Params::new();
        body.set("status", "hello").unwrap();

        let err = pipeline.send(&endpoint, &credential(), Params::new(), body, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, Error::RateLimit { retry_at: Some(_) }));
    }

    // A 4xx that isn't 429 is classified as BadRequest, not RateLimit.
    #[tokio::test]
    async fn client_error_is_bad_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.1/statuses/show.json"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let pipeline = pipeline_for(&server);
        let endpoint = endpoint_for(LogicalOp::ShowTweet);

        let err =
            pipeline.send(&endpoint, &credential(), Params::new(), Params::new(), Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest { status: 404, .. }));
    }

    // A 5xx is classified as Upstream.
    #[tokio::test]
    async fn server_error_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.1/statuses/show.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let pipeline = pipeline_for(&server);
        let endpoint = endpoint_for(LogicalOp::ShowTweet);

        let err =
            pipeline.send(&endpoint, &credential(), Params::new(), Params::new(), Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 503, .. }));
    }
}
