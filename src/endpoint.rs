//! The static endpoint catalogue (spec.md §6), and the rate-limit bucketing
//! rule it feeds into RateCoord.
//!
//! Grounded on the original Go implementation's `proxy/twitter.go`, which
//! lists each endpoint as a package-level `var endpoint{...}` and computes
//! `limitKey()` from its optional `group` tag. The Design Notes (§9)
//! recommend representing the catalogue "as data, not code... keyed by a
//! small variant, so the facade's dispatch is one lookup and the catalogue is
//! exhaustively checkable" — `LogicalOp` is that variant, and `CATALOGUE` is
//! the constant table.

use crate::oauth::Method;

/// One row of the endpoint catalogue: a path, an HTTP method, and an optional
/// rate-limit group tag. Endpoints sharing a group tag share an upstream
/// quota bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    pub method: Method,
    pub group: Option<&'static str>,
}

impl Endpoint {
    /// The RateCoord key for this endpoint: `"group:<tag>"` when the
    /// endpoint has a group, else `"singleton:<path>"`.
    pub fn limit_key(&self) -> String {
        match self.group {
            Some(group) => format!("group:{group}"),
            None => format!("singleton:{}", self.path),
        }
    }
}

/// The logical operations Goldcrest exposes, one per row of spec.md §6's
/// catalogue table. Used as the dispatch key by [`crate::facade::ProxyFacade`]
/// and as the lookup key into [`CATALOGUE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    ShowTweet,
    ShowTweets,
    HomeTimeline,
    MentionTimeline,
    UserTimeline,
    Publish,
    Delete,
    Retweet,
    Unretweet,
    Like,
    Unlike,
    UpdateProfile,
    Search,
}

const PUBLISH_GROUP: &str = "publish";

/// The full, exhaustively-checkable endpoint catalogue. Order matches
/// spec.md §6's table.
pub const CATALOGUE: &[(LogicalOp, Endpoint)] = &[
    (LogicalOp::ShowTweet, Endpoint { path: "statuses/show.json", method: Method::Get, group: None }),
    (LogicalOp::ShowTweets, Endpoint { path: "statuses/lookup.json", method: Method::Get, group: None }),
    (LogicalOp::HomeTimeline, Endpoint { path: "statuses/home_timeline.json", method: Method::Get, group: None }),
    (
        LogicalOp::MentionTimeline,
        Endpoint { path: "statuses/mentions_timeline.json", method: Method::Get, group: None },
    ),
    (LogicalOp::UserTimeline, Endpoint { path: "statuses/user_timeline.json", method: Method::Get, group: None }),
    (LogicalOp::Publish, Endpoint { path: "statuses/update.json", method: Method::Post, group: Some(PUBLISH_GROUP) }),
    (LogicalOp::Delete, Endpoint { path: "statuses/destroy.json", method: Method::Post, group: None }),
    (LogicalOp::Retweet, Endpoint { path: "statuses/retweet.json", method: Method::Post, group: Some(PUBLISH_GROUP) }),
    (LogicalOp::Unretweet, Endpoint { path: "statuses/unretweet.json", method: Method::Post, group: None }),
    (LogicalOp::Like, Endpoint { path: "favorites/create.json", method: Method::Post, group: None }),
    (LogicalOp::Unlike, Endpoint { path: "favorites/destroy.json", method: Method::Post, group: None }),
    (LogicalOp::UpdateProfile, Endpoint { path: "account/update_profile.json", method: Method::Post, group: None }),
    (LogicalOp::Search, Endpoint { path: "search/tweets.json", method: Method::Get, group: None }),
];

/// Looks up the endpoint for a logical operation. Panics only if `CATALOGUE`
/// is missing a row for `op`, which would be a bug in this module, not a
/// runtime condition — exercised exhaustively by `catalogue_covers_every_op`.
pub fn endpoint_for(op: LogicalOp) -> Endpoint {
    CATALOGUE
        .iter()
        .find(|(catalogued_op, _)| *catalogued_op == op)
        .map(|(_, endpoint)| *endpoint)
        .unwrap_or_else(|| panic!("endpoint catalogue is missing a row for {op:?}"))
}
