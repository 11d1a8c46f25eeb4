//! Header-bidding domain types shared across the auction core and the
//! bidder adapter layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested creative size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdSize {
    pub width: u32,
    pub height: u32,
}

impl AdSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for AdSize {
    /// Ad-server convention: `300x250`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One bid solicitation for a single placement, created by the auction
/// controller per round. Read-only to adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidRequest {
    /// Unique per (bidder, placement) pair within an auction round.
    pub request_id: String,
    /// Identifier of the ad slot this request bids for.
    pub placement_code: String,
    #[serde(default)]
    pub sizes: Vec<AdSize>,
    /// Bidder-specific parameters, opaque to the auction core.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The set of bid requests routed to one bidder for one auction round.
///
/// An empty `bids` list is a no-op for every adapter: no validation, no
/// request building, no transport call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidRequestBatch {
    pub bidder_code: String,
    /// Page the auction runs for; forwarded to bidders that want a
    /// location parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default)]
    pub bids: Vec<BidRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

/// An outbound call produced by a bidder spec's request builder. One
/// response is expected per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Payload bag; serialized as a JSON body for POST, query fields for GET.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Media types a bidder can serve, declared on its spec and recorded with
/// the primary registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Banner,
    Video,
    Native,
}

/// Terminal status of a bid outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    /// Usable bid with a price and a creative.
    Good,
    /// Explicit decline: the bidder passed or the transport failed.
    NoBid,
}

/// Normalized bid pushed into the auction's response store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    /// `request_id` of the originating [`BidRequest`].
    pub request_id: String,
    pub placement_code: String,
    /// Code of the adapter that produced this outcome. For aliased
    /// bidders this is the alias, not the primary code.
    pub bidder_code: String,
    pub status: BidStatus,
    /// Price in CPM. Zero for no-bids.
    #[serde(default)]
    pub cpm: f64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Ad markup, when the bidder returns the creative inline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad: Option<String>,
    /// Creative URL, when the bidder returns a content reference instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_url: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Bid {
    /// A valid bid outcome. Adapters stamp `bidder_code` on the way into
    /// the response store.
    pub fn new(request_id: &str, placement_code: &str, cpm: f64) -> Self {
        Self {
            request_id: request_id.to_string(),
            placement_code: placement_code.to_string(),
            bidder_code: String::new(),
            status: BidStatus::Good,
            cpm,
            width: 0,
            height: 0,
            ad: None,
            ad_url: None,
            received_at: Utc::now(),
        }
    }

    /// An explicit no-bid outcome for the given placement.
    pub fn no_bid(request_id: &str, placement_code: &str, bidder_code: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            placement_code: placement_code.to_string(),
            bidder_code: bidder_code.to_string(),
            status: BidStatus::NoBid,
            cpm: 0.0,
            width: 0,
            height: 0,
            ad: None,
            ad_url: None,
            received_at: Utc::now(),
        }
    }
}

/// How a user-sync URL should be materialized by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Image,
    Iframe,
}

/// A user-sync descriptor declared by a bidder after an auction round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSync {
    pub sync_type: SyncType,
    pub url: String,
}
