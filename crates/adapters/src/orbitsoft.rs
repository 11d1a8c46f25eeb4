//! Legacy Orbitsoft adapter.
//!
//! Kept on the pre-factory contract for backward compatibility: the bid
//! call goes out as a script URL through a [`ScriptLoader`], and the ad
//! server answers through [`OrbitsoftAdapter::handle_response`], the typed
//! replacement for the globally reachable callback the old contract relied
//! on. Responses are correlated to pending requests by `callback_uid`.

use crate::bidder::BidAdapter;
use crate::loader::ScriptLoader;
use async_trait::async_trait;
use bidexpress_core::auction::AuctionContext;
use bidexpress_core::config::OrbitsoftConfig;
use bidexpress_core::types::{Bid, BidRequest, BidRequestBatch};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const ORBITSOFT_CODE: &str = "orbitsoft";

/// Response payload the Orbitsoft ad server delivers for one bid call.
#[derive(Debug, Clone, Deserialize)]
pub struct OrbitsoftResponse {
    /// Correlation identifier echoing the originating request's id.
    #[serde(default)]
    pub callback_uid: Option<String>,
    #[serde(default)]
    pub cpm: f64,
    #[serde(default)]
    pub content_url: Option<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

struct PendingBid {
    request_id: String,
    placement_code: String,
    params: Value,
    enqueued_at: DateTime<Utc>,
}

pub struct OrbitsoftAdapter {
    config: OrbitsoftConfig,
    loader: Arc<dyn ScriptLoader>,
    pending: DashMap<String, PendingBid>,
}

impl OrbitsoftAdapter {
    pub fn new(config: OrbitsoftConfig, loader: Arc<dyn ScriptLoader>) -> Self {
        Self {
            config,
            loader,
            pending: DashMap::new(),
        }
    }

    fn bid_url(&self, bid: &BidRequest, page_url: Option<&str>) -> String {
        let mut url = format!(
            "{}?scid={}",
            self.config.endpoint,
            param_str(&bid.params, "placementId")
        );
        if let Some(size) = bid.sizes.first() {
            url.push_str(&format!("&size={size}"));
        }
        let location = page_url.unwrap_or(&self.config.default_location);
        url.push_str(&format!("&loc={}", url_encode(location)));
        url.push_str(&format!("&callback_uid={}", bid.request_id));
        url
    }

    /// Drop pending bid calls enqueued before `cutoff` and return how many
    /// were expired. The ad server never answers for most timed-out
    /// rounds, so embeddings must call this when a round closes or the
    /// correlation map grows for the adapter's lifetime. Responses
    /// arriving after expiry are treated as unknown uids.
    pub fn expire_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, pending| pending.enqueued_at >= cutoff);
        let expired = before - self.pending.len();
        if expired > 0 {
            debug!(
                bidder = ORBITSOFT_CODE,
                expired, "Expired unanswered bid calls"
            );
        }
        expired
    }

    /// Bid calls still waiting on an ad server response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Handle an ad server response. Exactly one terminal outcome is
    /// recorded for the correlated placement; responses that cannot be
    /// correlated (missing or unknown `callback_uid`) are logged and
    /// dropped, since there is no placement to attribute a no-bid to.
    pub fn handle_response(&self, response: &OrbitsoftResponse, auction: &AuctionContext) {
        let Some(uid) = response.callback_uid.as_deref() else {
            warn!(
                bidder = ORBITSOFT_CODE,
                "Ad server response without callback_uid, dropped"
            );
            return;
        };
        let Some((_, pending)) = self.pending.remove(uid) else {
            warn!(
                bidder = ORBITSOFT_CODE,
                callback_uid = uid,
                "No pending bid request for callback_uid, response dropped"
            );
            return;
        };

        let content_url = response.content_url.as_deref().filter(|u| !u.is_empty());
        match content_url {
            Some(content_url) if response.cpm > 0.0 => {
                let mut bid = Bid::new(&pending.request_id, &pending.placement_code, response.cpm);
                bid.bidder_code = ORBITSOFT_CODE.to_string();
                bid.width = response.width;
                bid.height = response.height;
                bid.ad_url = Some(decorated_ad_url(content_url, &pending.params));
                auction.add_bid_response(&pending.placement_code, bid);
            }
            _ => {
                auction.add_bid_response(
                    &pending.placement_code,
                    Bid::no_bid(&pending.request_id, &pending.placement_code, ORBITSOFT_CODE),
                );
            }
        }
    }
}

#[async_trait]
impl BidAdapter for OrbitsoftAdapter {
    fn bidder_code(&self) -> &str {
        ORBITSOFT_CODE
    }

    async fn call_bids(&self, batch: &BidRequestBatch, _auction: &AuctionContext) {
        for bid in &batch.bids {
            let url = self.bid_url(bid, batch.page_url.as_deref());
            self.pending.insert(
                bid.request_id.clone(),
                PendingBid {
                    request_id: bid.request_id.clone(),
                    placement_code: bid.placement_code.clone(),
                    params: bid.params.clone(),
                    enqueued_at: Utc::now(),
                },
            );
            debug!(bidder = ORBITSOFT_CODE, url = %url, "Enqueueing bid call");
            self.loader.load_script(&url);
        }
    }
}

/// Append the request's `style` and `customParams` param objects to the
/// creative URL as URL-encoded `path=value` pairs. Style children flatten
/// from their own names (`title.family=Tahoma`); custom params keep the
/// `customParams.` prefix.
fn decorated_ad_url(content_url: &str, params: &Value) -> String {
    let mut pairs = Vec::new();
    if let Some(style) = params.get("style") {
        flatten_params(style, "", &mut pairs);
    }
    if let Some(custom) = params.get("customParams") {
        flatten_params(custom, "customParams", &mut pairs);
    }

    let mut url = content_url.to_string();
    for (path, value) in pairs {
        url.push_str(&format!("&{}={}", path, url_encode(&value)));
    }
    url
}

fn flatten_params(value: &Value, prefix: &str, out: &mut Vec<(String, String)>) {
    let Some(map) = value.as_object() else {
        return;
    };
    for (key, child) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match child {
            Value::Object(_) => flatten_params(child, &path, out),
            Value::String(s) => out.push((path, s.clone())),
            other => out.push((path, other.to_string())),
        }
    }
}

fn param_str(params: &Value, key: &str) -> String {
    match params.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn url_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
