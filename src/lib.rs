//! # Goldcrest
//!
//! A credential-aware reverse proxy core for the Twitter v1.1 REST API.
//!
//! The hard problem this crate solves is coordinating concurrent callers that
//! share one OAuth 1.0a credential: multiple in-flight requests must discover
//! the upstream rate-limit budget by letting exactly one "probe" request
//! through when it is unknown, block or fail fast once it is exhausted,
//! recover once the reset deadline passes, and reconcile with upstream truth
//! whenever a `429` disagrees with local bookkeeping. [`limit::RateCoord`] is
//! that coordinator; [`oauth::OAuthSigner`] builds the signed requests it
//! gates; [`pipeline::UpstreamPipeline`] wires the two together against a
//! real HTTP client; [`facade::ProxyFacade`] is the crate's outward surface.
//!
//! ## Scope
//!
//! This crate signs requests, coordinates the rate-limit budget, and hands
//! back the raw successful HTTP response (status, headers, body). It does
//! not decode Twitter's JSON into domain types, persist credentials, retry
//! failed requests, or manage an RPC transport — those are collaborator
//! concerns layered on top.

pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod facade;
pub mod limit;
pub mod oauth;
pub mod pipeline;

pub use config::RateLimitConfig;
pub use endpoint::{Endpoint, LogicalOp};
pub use error::Error;
pub use facade::{ProxyFacade, PublishOptions, TimelineOptions, TweetMode, TweetOptions};
pub use limit::{AdmitResult, RateCoord};
pub use oauth::{Auth, Credential, OAuthSigner};
pub use pipeline::{RawResponse, UpstreamPipeline};
