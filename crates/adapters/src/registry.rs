//! Adapter registry and auction-round driver.
//!
//! An owned registry value rather than a process-global: each embedding
//! constructs its own, registers bidders into it, and drives rounds
//! through it against an [`AuctionContext`].

use crate::bidder::{BidAdapter, BidderAdapter, BidderSpec};
use crate::transport::Transport;
use bidexpress_core::auction::AuctionContext;
use bidexpress_core::types::{BidRequestBatch, MediaType};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Capabilities recorded alongside a primary adapter registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterOptions {
    pub supported_media_types: Option<Vec<MediaType>>,
}

pub struct AdapterRegistry {
    adapters: DashMap<String, Arc<dyn BidAdapter>>,
    options: DashMap<String, AdapterOptions>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: DashMap::new(),
            options: DashMap::new(),
        }
    }

    /// Register an adapter under a bidder code. Re-registration replaces
    /// the previous entry.
    pub fn register_bid_adapter(
        &self,
        adapter: Arc<dyn BidAdapter>,
        code: &str,
        options: Option<AdapterOptions>,
    ) {
        info!(bidder = code, "Bid adapter registered");
        self.adapters.insert(code.to_string(), adapter);
        if let Some(options) = options {
            self.options.insert(code.to_string(), options);
        }
    }

    pub fn adapter(&self, code: &str) -> Option<Arc<dyn BidAdapter>> {
        self.adapters.get(code).map(|entry| entry.value().clone())
    }

    pub fn options_for(&self, code: &str) -> Option<AdapterOptions> {
        self.options.get(code).map(|entry| entry.value().clone())
    }

    pub fn codes(&self) -> Vec<String> {
        self.adapters.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Run one auction round: dispatch each batch to its registered
    /// adapter concurrently, bounded by the round timeout. Batches for
    /// unknown bidder codes are skipped with a warning. On expiry the
    /// round closes with whatever outcomes have landed.
    pub async fn call_bids(
        &self,
        batches: &[BidRequestBatch],
        auction: &AuctionContext,
        timeout: Duration,
    ) {
        let mut rounds = Vec::new();
        for batch in batches {
            match self.adapter(&batch.bidder_code) {
                Some(adapter) => rounds.push(async move {
                    adapter.call_bids(batch, auction).await;
                }),
                None => {
                    warn!(
                        bidder = %batch.bidder_code,
                        "No adapter registered for bidder, batch skipped"
                    );
                    metrics::counter!("registry.unknown_bidder").increment(1);
                }
            }
        }

        if tokio::time::timeout(timeout, join_all(rounds)).await.is_err() {
            warn!(
                auction_id = %auction.auction_id(),
                "Auction round timed out before all adapters completed"
            );
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap a bidder spec into adapters and register them: the primary code
/// carries the spec's media-type capabilities, and every alias gets an
/// independent adapter reporting the alias as its own bidder code.
pub fn register_bidder(
    registry: &AdapterRegistry,
    spec: Arc<dyn BidderSpec>,
    transport: Arc<dyn Transport>,
) {
    let options = spec
        .supported_media_types()
        .map(|media_types| AdapterOptions {
            supported_media_types: Some(media_types),
        });
    let primary = Arc::new(BidderAdapter::new(spec.clone(), transport.clone()));
    registry.register_bid_adapter(primary, spec.code(), options);

    for alias in spec.aliases() {
        let adapter = Arc::new(BidderAdapter::with_code(
            spec.clone(),
            transport.clone(),
            &alias,
        ));
        registry.register_bid_adapter(adapter, &alias, None);
    }
}
