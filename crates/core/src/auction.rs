//! Per-auction response store.
//!
//! Replaces the traditional shared, globally reachable bid manager with an
//! explicitly constructed context passed to each adapter invocation, so
//! concurrent auction rounds cannot clobber each other. Placement keys are
//! expected to be write-once per adapter per round; this is adapter
//! discipline, not enforced here.

use crate::types::{Bid, UserSync};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// Collects terminal bid outcomes and user-sync declarations for one
/// auction round. Cheap to share across adapters via reference.
pub struct AuctionContext {
    auction_id: Uuid,
    responses: DashMap<String, Vec<Bid>>,
    user_syncs: DashMap<String, Vec<UserSync>>,
}

impl AuctionContext {
    pub fn new() -> Self {
        Self {
            auction_id: Uuid::new_v4(),
            responses: DashMap::new(),
            user_syncs: DashMap::new(),
        }
    }

    pub fn auction_id(&self) -> Uuid {
        self.auction_id
    }

    /// Record a terminal outcome for a placement. Every bid request routed
    /// into an adapter must end up here exactly once, as a valid bid or an
    /// explicit no-bid.
    pub fn add_bid_response(&self, placement_code: &str, bid: Bid) {
        debug!(
            auction_id = %self.auction_id,
            placement = placement_code,
            bidder = %bid.bidder_code,
            status = ?bid.status,
            cpm = bid.cpm,
            "Bid response recorded"
        );
        self.responses
            .entry(placement_code.to_string())
            .or_default()
            .push(bid);
    }

    /// Outcomes recorded for a placement, in arrival order.
    pub fn responses_for(&self, placement_code: &str) -> Vec<Bid> {
        self.responses
            .get(placement_code)
            .map(|bids| bids.clone())
            .unwrap_or_default()
    }

    /// Placement codes with at least one recorded outcome.
    pub fn placements(&self) -> Vec<String> {
        self.responses.iter().map(|e| e.key().clone()).collect()
    }

    /// Total outcomes recorded across all placements.
    pub fn bid_count(&self) -> usize {
        self.responses.iter().map(|e| e.value().len()).sum()
    }

    /// Record the user syncs a bidder declared for this round.
    pub fn add_user_syncs(&self, bidder_code: &str, syncs: Vec<UserSync>) {
        if syncs.is_empty() {
            return;
        }
        self.user_syncs
            .entry(bidder_code.to_string())
            .or_default()
            .extend(syncs);
    }

    pub fn user_syncs_for(&self, bidder_code: &str) -> Vec<UserSync> {
        self.user_syncs
            .get(bidder_code)
            .map(|syncs| syncs.clone())
            .unwrap_or_default()
    }
}

impl Default for AuctionContext {
    fn default() -> Self {
        Self::new()
    }
}
