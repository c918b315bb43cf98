//! `ProxyFacade`: the outward surface, one method per logical endpoint
//! (spec.md §4.5), plus the tweet-option/timeline-option/publish-option
//! serialisation rules from §6.
//!
//! Grounded on the original Go implementation's `proxy/request.go`
//! (`tweetOptions.encode()`, `timelineOptions`) for the option-to-parameter
//! mapping, translated from a literal `map[string]string` builder to the
//! same `codec::Params` sorted-builder the signer already uses — the option
//! structs just feed the one parameter type used everywhere else in this
//! crate, rather than re-deriving string-keyed maps per call site.

use std::time::Duration;

use crate::codec::Params;
use crate::config::RateLimitConfig;
use crate::endpoint::{endpoint_for, LogicalOp};
use crate::error::Error;
use crate::oauth::Credential;
use crate::pipeline::{RawResponse, UpstreamPipeline};

/// `tweet_mode` query value (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TweetMode {
    #[default]
    Compat,
    Extended,
}

impl TweetMode {
    fn as_str(self) -> &'static str {
        match self {
            TweetMode::Compat => "compat",
            TweetMode::Extended => "extended",
        }
    }
}

/// Shared display options accepted by the single- and multi-tweet lookup
/// endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct TweetOptions {
    pub trim_user: bool,
    pub include_my_retweet: bool,
    pub include_entities: bool,
    pub include_ext_alt_text: bool,
    pub include_card_uri: bool,
    pub tweet_mode: TweetMode,
}

impl TweetOptions {
    fn encode_into(&self, params: &mut Params) -> Result<(), Error> {
        set_bool(params, "trim_user", self.trim_user)?;
        set_bool(params, "include_my_retweet", self.include_my_retweet)?;
        set_bool(params, "include_entities", self.include_entities)?;
        set_bool(params, "include_ext_alt_text", self.include_ext_alt_text)?;
        set_bool(params, "include_card_uri", self.include_card_uri)?;
        params.set("tweet_mode", self.tweet_mode.as_str()).map_err(conflict_to_signing_error)?;
        Ok(())
    }
}

/// Paging options for the three timeline endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimelineOptions {
    pub count: Option<u32>,
    /// The oldest tweet id the caller has already seen; encoded upstream as
    /// `since_id = min_id - 1` per §6.
    pub min_id: Option<u64>,
    pub max_id: Option<u64>,
    pub tweet: TweetOptions,
}

impl TimelineOptions {
    fn encode(&self) -> Result<Params, Error> {
        let mut params = Params::new();
        if let Some(count) = self.count {
            params.set("count", count.to_string()).map_err(conflict_to_signing_error)?;
        }
        if let Some(min_id) = self.min_id {
            if min_id > 0 {
                params.set("since_id", (min_id - 1).to_string()).map_err(conflict_to_signing_error)?;
            }
        }
        if let Some(max_id) = self.max_id {
            params.set("max_id", max_id.to_string()).map_err(conflict_to_signing_error)?;
        }
        self.tweet.encode_into(&mut params)?;
        Ok(params)
    }
}

/// Inputs for `statuses/update.json` (spec.md §6 publish keys).
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub status: String,
    pub auto_populate_reply_metadata: bool,
    pub possibly_sensitive: bool,
    pub enable_dmcommands: bool,
    pub fail_dmcommands: bool,
    pub in_reply_to_status_id: Option<u64>,
    pub attachment_url: Option<String>,
    pub exclude_reply_user_ids: Vec<u64>,
    pub media_ids: Vec<u64>,
}

impl PublishOptions {
    fn encode(&self) -> Result<Params, Error> {
        let mut params = Params::new();
        params.set("status", self.status.clone()).map_err(conflict_to_signing_error)?;
        set_bool(&mut params, "auto_populate_reply_metadata", self.auto_populate_reply_metadata)?;
        set_bool(&mut params, "possibly_sensitive", self.possibly_sensitive)?;
        set_bool(&mut params, "enable_dmcommands", self.enable_dmcommands)?;
        set_bool(&mut params, "fail_dmcommands", self.fail_dmcommands)?;
        if let Some(reply_to) = self.in_reply_to_status_id {
            params.set("in_reply_to_status_id", reply_to.to_string()).map_err(conflict_to_signing_error)?;
        }
        if let Some(url) = &self.attachment_url {
            params.set("attachment_url", url.clone()).map_err(conflict_to_signing_error)?;
        }
        if !self.exclude_reply_user_ids.is_empty() {
            params.set("exclude_reply_user_ids", join_ids(&self.exclude_reply_user_ids)).map_err(conflict_to_signing_error)?;
        }
        if !self.media_ids.is_empty() {
            params.set("media_ids", join_ids(&self.media_ids)).map_err(conflict_to_signing_error)?;
        }
        Ok(params)
    }
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter().map(u64::to_string).collect::<Vec<_>>().join(",")
}

fn set_bool(params: &mut Params, key: &str, value: bool) -> Result<(), Error> {
    params.set(key, if value { "true" } else { "false" }).map_err(conflict_to_signing_error)
}

fn conflict_to_signing_error(conflict: crate::codec::ParamConflict) -> Error {
    Error::Signing(format!("duplicate query parameter: {conflict}"))
}

/// The outward surface of the proxy core: one method per logical operation,
/// dispatching through [`UpstreamPipeline::send`]. Stateless — all
/// contention lives inside the pipeline's `RateCoord`.
pub struct ProxyFacade {
    pipeline: UpstreamPipeline,
    request_timeout: Duration,
}

impl ProxyFacade {
    /// `config.request_timeout` becomes the deadline passed to every
    /// dispatched request; `assume_next`/`stuck_guard` are already baked into
    /// `pipeline`'s own `RateCoord` by the time it reaches here.
    pub fn new(pipeline: UpstreamPipeline, config: RateLimitConfig) -> Self {
        Self { pipeline, request_timeout: config.request_timeout }
    }

    async fn dispatch(
        &self,
        op: LogicalOp,
        credential: &Credential,
        query: Params,
        body: Params,
    ) -> Result<RawResponse, Error> {
        let endpoint = endpoint_for(op);
        self.pipeline.send(&endpoint, credential, query, body, self.request_timeout).await
    }

    pub async fn show_tweet(&self, credential: &Credential, id: u64, options: TweetOptions) -> Result<RawResponse, Error> {
        let mut query = Params::new();
        query.set("id", id.to_string()).map_err(conflict_to_signing_error)?;
        options.encode_into(&mut query)?;
        self.dispatch(LogicalOp::ShowTweet, credential, query, Params::new()).await
    }

    pub async fn show_tweets(
        &self,
        credential: &Credential,
        ids: &[u64],
        options: TweetOptions,
    ) -> Result<RawResponse, Error> {
        let mut query = Params::new();
        query.set("id", join_ids(ids)).map_err(conflict_to_signing_error)?;
        options.encode_into(&mut query)?;
        self.dispatch(LogicalOp::ShowTweets, credential, query, Params::new()).await
    }

    pub async fn home_timeline(&self, credential: &Credential, options: TimelineOptions) -> Result<RawResponse, Error> {
        self.dispatch(LogicalOp::HomeTimeline, credential, options.encode()?, Params::new()).await
    }

    pub async fn mention_timeline(&self, credential: &Credential, options: TimelineOptions) -> Result<RawResponse, Error> {
        self.dispatch(LogicalOp::MentionTimeline, credential, options.encode()?, Params::new()).await
    }

    pub async fn user_timeline(&self, credential: &Credential, options: TimelineOptions) -> Result<RawResponse, Error> {
        self.dispatch(LogicalOp::UserTimeline, credential, options.encode()?, Params::new()).await
    }

    pub async fn publish(&self, credential: &Credential, options: PublishOptions) -> Result<RawResponse, Error> {
        self.dispatch(LogicalOp::Publish, credential, Params::new(), options.encode()?).await
    }

    pub async fn delete(&self, credential: &Credential, id: u64) -> Result<RawResponse, Error> {
        let mut body = Params::new();
        body.set("id", id.to_string()).map_err(conflict_to_signing_error)?;
        self.dispatch(LogicalOp::Delete, credential, Params::new(), body).await
    }

    pub async fn retweet(&self, credential: &Credential, id: u64) -> Result<RawResponse, Error> {
        let mut body = Params::new();
        body.set("id", id.to_string()).map_err(conflict_to_signing_error)?;
        self.dispatch(LogicalOp::Retweet, credential, Params::new(), body).await
    }

    pub async fn unretweet(&self, credential: &Credential, id: u64) -> Result<RawResponse, Error> {
        let mut body = Params::new();
        body.set("id", id.to_string()).map_err(conflict_to_signing_error)?;
        self.dispatch(LogicalOp::Unretweet, credential, Params::new(), body).await
    }

    pub async fn like(&self, credential: &Credential, id: u64) -> Result<RawResponse, Error> {
        let mut body = Params::new();
        body.set("id", id.to_string()).map_err(conflict_to_signing_error)?;
        self.dispatch(LogicalOp::Like, credential, Params::new(), body).await
    }

    pub async fn unlike(&self, credential: &Credential, id: u64) -> Result<RawResponse, Error> {
        let mut body = Params::new();
        body.set("id", id.to_string()).map_err(conflict_to_signing_error)?;
        self.dispatch(LogicalOp::Unlike, credential, Params::new(), body).await
    }

    pub async fn update_profile(&self, credential: &Credential, fields: Params) -> Result<RawResponse, Error> {
        self.dispatch(LogicalOp::UpdateProfile, credential, Params::new(), fields).await
    }

    pub async fn search(&self, credential: &Credential, query_text: &str, options: TweetOptions) -> Result<RawResponse, Error> {
        let mut query = Params::new();
        query.set("q", query_text.to_string()).map_err(conflict_to_signing_error)?;
        options.encode_into(&mut query)?;
        self.dispatch(LogicalOp::Search, credential, query, Params::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tweet_options_encode_booleans_and_mode() {
        let mut params = Params::new();
        let options =
            TweetOptions { trim_user: true, include_entities: false, tweet_mode: TweetMode::Extended, ..Default::default() };
        options.encode_into(&mut params).unwrap();
        let encoded = params.encode("&", false);
        assert!(encoded.contains("trim_user=true"));
        assert!(encoded.contains("include_entities=false"));
        assert!(encoded.contains("tweet_mode=extended"));
    }

    #[test]
    fn timeline_options_convert_min_id_to_since_id() {
        let options = TimelineOptions { min_id: Some(101), count: Some(20), ..Default::default() };
        let encoded = options.encode().unwrap().encode("&", false);
        assert!(encoded.contains("since_id=100"));
        assert!(encoded.contains("count=20"));
        assert!(!encoded.contains("min_id"));
    }

    #[test]
    fn timeline_options_omit_since_id_when_min_id_is_zero() {
        let options = TimelineOptions { min_id: Some(0), ..Default::default() };
        let encoded = options.encode().unwrap().encode("&", false);
        assert!(!encoded.contains("since_id"));
    }

    #[test]
    fn publish_options_join_ids_and_omit_empty_lists() {
        let options = PublishOptions {
            status: "hello".to_string(),
            media_ids: vec![1, 2, 3],
            ..Default::default()
        };
        let encoded = options.encode().unwrap().encode("&", false);
        assert!(encoded.contains("status=hello"));
        assert!(encoded.contains("media_ids=1%2C2%2C3"));
        assert!(!encoded.contains("exclude_reply_user_ids"));
    }
}
