//! Bidder adapter factory.
//!
//! A demand partner supplies a declarative [`BidderSpec`] (validate, build,
//! interpret, sync); [`BidderAdapter`] wraps it into the uniform
//! [`BidAdapter`] lifecycle the registry dispatches auction rounds through:
//! validate params, build server requests, issue them over the transport,
//! interpret the responses, backfill no-bids, report user syncs.

use crate::transport::{Transport, TransportOptions};
use async_trait::async_trait;
use bidexpress_core::auction::AuctionContext;
use bidexpress_core::error::BidResult;
use bidexpress_core::types::{
    Bid, BidRequest, BidRequestBatch, HttpMethod, MediaType, ServerRequest, UserSync,
};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Declarative description of one bidder. Implementations must be cheap to
/// share; all methods take `&self` and may run concurrently.
pub trait BidderSpec: Send + Sync {
    /// Primary bidder code, unique across the registry.
    fn code(&self) -> &str;

    /// Alternate codes this bidder also answers to.
    fn aliases(&self) -> Vec<String> {
        Vec::new()
    }

    /// Media types this bidder can serve; recorded with the primary
    /// registry entry only.
    fn supported_media_types(&self) -> Option<Vec<MediaType>> {
        None
    }

    /// Whether a request's params are usable. Requests failing this check
    /// are silently excluded from request building.
    fn are_params_valid(&self, request: &BidRequest) -> bool;

    /// Turn the validated requests into zero or more outbound calls.
    fn build_requests(&self, requests: &[BidRequest]) -> Vec<ServerRequest>;

    /// Turn one raw response body into zero or more normalized bids.
    fn interpret_response(&self, body: &str) -> Vec<Bid>;

    /// User syncs to run after the round, given the raw bodies of the
    /// successful responses.
    fn get_user_syncs(&self, response_bodies: &[String]) -> Vec<UserSync> {
        let _ = response_bodies;
        Vec::new()
    }
}

/// Uniform adapter surface consumed by the registry.
#[async_trait]
pub trait BidAdapter: Send + Sync {
    /// Code this adapter answers to. For aliased registrations this is the
    /// alias, not the spec's primary code.
    fn bidder_code(&self) -> &str;

    /// Solicit bids for one batch, recording a terminal outcome per
    /// placement on the auction context. Never fails the round: adapter
    /// errors degrade to no-bid.
    async fn call_bids(&self, batch: &BidRequestBatch, auction: &AuctionContext);
}

/// Factory-produced adapter wrapping a [`BidderSpec`].
pub struct BidderAdapter {
    spec: Arc<dyn BidderSpec>,
    transport: Arc<dyn Transport>,
    code: String,
}

impl BidderAdapter {
    pub fn new(spec: Arc<dyn BidderSpec>, transport: Arc<dyn Transport>) -> Self {
        let code = spec.code().to_string();
        Self {
            spec,
            transport,
            code,
        }
    }

    /// Adapter registered under an alias: same spec, same transport, its
    /// own bidder-code identity.
    pub fn with_code(spec: Arc<dyn BidderSpec>, transport: Arc<dyn Transport>, code: &str) -> Self {
        Self {
            spec,
            transport,
            code: code.to_string(),
        }
    }

    async fn execute(&self, request: &ServerRequest) -> BidResult<String> {
        match request.method {
            HttpMethod::Post => {
                let body = serde_json::to_string(&request.data)?;
                let options = TransportOptions {
                    method: HttpMethod::Post,
                    content_type: Some("text/plain"),
                    with_credentials: true,
                };
                self.transport.call(&request.url, Some(body), &options).await
            }
            HttpMethod::Get => {
                let url = format!("{}?{}", request.url, format_query(&request.data));
                let options = TransportOptions {
                    method: HttpMethod::Get,
                    content_type: None,
                    with_credentials: true,
                };
                self.transport.call(&url, None, &options).await
            }
        }
    }
}

/// Serialize a payload bag into `key=value&` pairs. The trailing separator
/// is part of the wire contract bidder endpoints already tolerate. Values
/// are interpolated verbatim, no percent-encoding: request builders must
/// pre-encode any value carrying `&`, `=`, or spaces.
fn format_query(data: &serde_json::Value) -> String {
    let mut query = String::new();
    if let Some(map) = data.as_object() {
        for (key, value) in map {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            query.push_str(&format!("{key}={rendered}&"));
        }
    }
    query
}

#[async_trait]
impl BidAdapter for BidderAdapter {
    fn bidder_code(&self) -> &str {
        &self.code
    }

    async fn call_bids(&self, batch: &BidRequestBatch, auction: &AuctionContext) {
        if batch.bids.is_empty() {
            return;
        }

        let valid: Vec<BidRequest> = batch
            .bids
            .iter()
            .filter(|bid| self.spec.are_params_valid(bid))
            .cloned()
            .collect();

        let server_requests = if valid.is_empty() {
            debug!(bidder = %self.code, "No bid requests passed parameter validation");
            Vec::new()
        } else {
            self.spec.build_requests(&valid)
        };

        let mut response_bodies: Vec<String> = Vec::new();
        let mut covered: HashSet<String> = HashSet::new();

        if !server_requests.is_empty() {
            debug!(
                bidder = %self.code,
                requests = server_requests.len(),
                "Issuing bidder server requests"
            );
            metrics::counter!("adapter.requests", "bidder" => self.code.clone())
                .increment(server_requests.len() as u64);

            let results = join_all(server_requests.iter().map(|r| self.execute(r))).await;
            for result in results {
                match result {
                    Ok(body) => {
                        for mut bid in self.spec.interpret_response(&body) {
                            bid.bidder_code = self.code.clone();
                            let placement = bid.placement_code.clone();
                            covered.insert(placement.clone());
                            metrics::counter!("adapter.bids", "bidder" => self.code.clone())
                                .increment(1);
                            auction.add_bid_response(&placement, bid);
                        }
                        response_bodies.push(body);
                    }
                    Err(e) => {
                        warn!(bidder = %self.code, error = %e, "Bidder transport call failed");
                        metrics::counter!("adapter.transport_errors", "bidder" => self.code.clone())
                            .increment(1);
                    }
                }
            }

            // Terminal-outcome invariant: once transport was attempted,
            // every placement in the batch gets exactly one response.
            for bid in &batch.bids {
                if covered.insert(bid.placement_code.clone()) {
                    auction.add_bid_response(
                        &bid.placement_code,
                        Bid::no_bid(&bid.request_id, &bid.placement_code, &self.code),
                    );
                }
            }
        }

        let syncs = self.spec.get_user_syncs(&response_bodies);
        auction.add_user_syncs(&self.code, syncs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidexpress_core::error::BidError;
    use bidexpress_core::types::BidStatus;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const CODE: &str = "sampleBidder";

    // Recording spec double: scripted outputs, observed inputs.
    struct MockSpec {
        valid_ids: Option<Vec<&'static str>>,
        server_requests: Vec<ServerRequest>,
        interpret_bids: Vec<Bid>,
        valid_calls: AtomicUsize,
        build_inputs: Mutex<Vec<Vec<String>>>,
        interpret_bodies: Mutex<Vec<String>>,
        sync_calls: Mutex<Vec<Vec<String>>>,
    }

    impl MockSpec {
        fn new() -> Self {
            Self {
                valid_ids: None,
                server_requests: Vec::new(),
                interpret_bids: Vec::new(),
                valid_calls: AtomicUsize::new(0),
                build_inputs: Mutex::new(Vec::new()),
                interpret_bodies: Mutex::new(Vec::new()),
                sync_calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl BidderSpec for MockSpec {
        fn code(&self) -> &str {
            CODE
        }

        fn are_params_valid(&self, request: &BidRequest) -> bool {
            self.valid_calls.fetch_add(1, Ordering::SeqCst);
            match &self.valid_ids {
                None => true,
                Some(ids) => ids.iter().any(|id| *id == request.request_id),
            }
        }

        fn build_requests(&self, requests: &[BidRequest]) -> Vec<ServerRequest> {
            self.build_inputs
                .lock()
                .unwrap()
                .push(requests.iter().map(|r| r.request_id.clone()).collect());
            self.server_requests.clone()
        }

        fn interpret_response(&self, body: &str) -> Vec<Bid> {
            self.interpret_bodies.lock().unwrap().push(body.to_string());
            self.interpret_bids.clone()
        }

        fn get_user_syncs(&self, response_bodies: &[String]) -> Vec<UserSync> {
            self.sync_calls
                .lock()
                .unwrap()
                .push(response_bodies.to_vec());
            Vec::new()
        }
    }

    enum Outcome {
        Succeed(&'static str),
        Fail(&'static str),
    }

    struct MockTransport {
        outcome: Outcome,
        calls: Mutex<Vec<(String, Option<String>, TransportOptions)>>,
    }

    impl MockTransport {
        fn succeeding(body: &'static str) -> Self {
            Self {
                outcome: Outcome::Succeed(body),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(reason: &'static str) -> Self {
            Self {
                outcome: Outcome::Fail(reason),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn call(
            &self,
            url: &str,
            body: Option<String>,
            options: &TransportOptions,
        ) -> BidResult<String> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), body, options.clone()));
            match &self.outcome {
                Outcome::Succeed(body) => Ok(body.to_string()),
                Outcome::Fail(reason) => Err(BidError::Transport(reason.to_string())),
            }
        }
    }

    fn mock_batch() -> BidRequestBatch {
        BidRequestBatch {
            bidder_code: CODE.to_string(),
            page_url: None,
            bids: vec![
                BidRequest {
                    request_id: "first-bid-id".to_string(),
                    placement_code: "mock/placement".to_string(),
                    sizes: Vec::new(),
                    params: json!({ "param": 5 }),
                },
                BidRequest {
                    request_id: "second-bid-id".to_string(),
                    placement_code: "mock/placement2".to_string(),
                    sizes: Vec::new(),
                    params: json!({ "badParam": 6 }),
                },
            ],
        }
    }

    fn post_request(data: serde_json::Value) -> ServerRequest {
        ServerRequest {
            method: HttpMethod::Post,
            url: "test.url.com".to_string(),
            data,
        }
    }

    fn adapter_with(
        spec: MockSpec,
        transport: MockTransport,
    ) -> (Arc<MockSpec>, Arc<MockTransport>, BidderAdapter) {
        let spec = Arc::new(spec);
        let transport = Arc::new(transport);
        let adapter = BidderAdapter::new(spec.clone(), transport.clone());
        (spec, transport, adapter)
    }

    // 1. Batch shape and validation filtering --------------------------------

    #[tokio::test]
    async fn test_empty_batch_is_a_complete_noop() {
        let (spec, transport, adapter) =
            adapter_with(MockSpec::new(), MockTransport::succeeding("irrelevant"));
        let auction = AuctionContext::new();

        let batch = BidRequestBatch {
            bidder_code: CODE.to_string(),
            page_url: None,
            bids: Vec::new(),
        };
        adapter.call_bids(&batch, &auction).await;

        assert_eq!(transport.call_count(), 0);
        assert_eq!(spec.valid_calls.load(Ordering::SeqCst), 0);
        assert!(spec.build_inputs.lock().unwrap().is_empty());
        assert!(spec.interpret_bodies.lock().unwrap().is_empty());
        assert!(spec.sync_calls.lock().unwrap().is_empty());
        assert_eq!(auction.bid_count(), 0);
    }

    #[tokio::test]
    async fn test_valid_requests_reach_the_builder() {
        let (spec, transport, adapter) =
            adapter_with(MockSpec::new(), MockTransport::succeeding("irrelevant"));
        let auction = AuctionContext::new();

        adapter.call_bids(&mock_batch(), &auction).await;

        assert_eq!(transport.call_count(), 0);
        assert_eq!(spec.valid_calls.load(Ordering::SeqCst), 2);
        let inputs = spec.build_inputs.lock().unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0], vec!["first-bid-id", "second-bid-id"]);
    }

    #[tokio::test]
    async fn test_builder_skipped_when_nothing_validates() {
        let mut spec = MockSpec::new();
        spec.valid_ids = Some(Vec::new());
        let (spec, transport, adapter) =
            adapter_with(spec, MockTransport::succeeding("irrelevant"));
        let auction = AuctionContext::new();

        adapter.call_bids(&mock_batch(), &auction).await;

        assert_eq!(transport.call_count(), 0);
        assert_eq!(spec.valid_calls.load(Ordering::SeqCst), 2);
        assert!(spec.build_inputs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_requests_filtered_before_the_builder() {
        let mut spec = MockSpec::new();
        spec.valid_ids = Some(vec!["first-bid-id"]);
        let (spec, transport, adapter) =
            adapter_with(spec, MockTransport::succeeding("irrelevant"));
        let auction = AuctionContext::new();

        adapter.call_bids(&mock_batch(), &auction).await;

        assert_eq!(transport.call_count(), 0);
        let inputs = spec.build_inputs.lock().unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0], vec!["first-bid-id"]);
    }

    // 2. Server request formatting -------------------------------------------

    #[tokio::test]
    async fn test_post_request_formatting() {
        let mut spec = MockSpec::new();
        spec.server_requests = vec![post_request(json!({ "arg": 2 }))];
        let (_, transport, adapter) =
            adapter_with(spec, MockTransport::succeeding("response body"));
        let auction = AuctionContext::new();

        adapter.call_bids(&mock_batch(), &auction).await;

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (url, body, options) = &calls[0];
        assert_eq!(url, "test.url.com");
        assert_eq!(body.as_deref(), Some(r#"{"arg":2}"#));
        assert_eq!(
            options,
            &TransportOptions {
                method: HttpMethod::Post,
                content_type: Some("text/plain"),
                with_credentials: true,
            }
        );
    }

    #[tokio::test]
    async fn test_get_request_formatting() {
        let mut spec = MockSpec::new();
        spec.server_requests = vec![ServerRequest {
            method: HttpMethod::Get,
            url: "test.url.com".to_string(),
            data: json!({ "arg": 2 }),
        }];
        let (_, transport, adapter) =
            adapter_with(spec, MockTransport::succeeding("response body"));
        let auction = AuctionContext::new();

        adapter.call_bids(&mock_batch(), &auction).await;

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (url, body, options) = &calls[0];
        assert_eq!(url, "test.url.com?arg=2&");
        assert!(body.is_none());
        assert_eq!(
            options,
            &TransportOptions {
                method: HttpMethod::Get,
                content_type: None,
                with_credentials: true,
            }
        );
    }

    #[tokio::test]
    async fn test_each_server_request_gets_its_own_call() {
        let mut spec = MockSpec::new();
        spec.server_requests = vec![
            post_request(json!({ "arg": 2 })),
            ServerRequest {
                method: HttpMethod::Get,
                url: "test.url.com".to_string(),
                data: json!({ "arg": 2 }),
            },
        ];
        let (_, transport, adapter) =
            adapter_with(spec, MockTransport::succeeding("response body"));
        let auction = AuctionContext::new();

        adapter.call_bids(&mock_batch(), &auction).await;

        assert_eq!(transport.call_count(), 2);
    }

    // 3. Response interpretation and terminal outcomes -----------------------

    #[tokio::test]
    async fn test_interpret_called_once_per_response() {
        let mut spec = MockSpec::new();
        spec.server_requests = vec![post_request(json!({})), post_request(json!({}))];
        let (spec, _, adapter) =
            adapter_with(spec, MockTransport::succeeding("response body"));
        let auction = AuctionContext::new();

        adapter.call_bids(&mock_batch(), &auction).await;

        let bodies = spec.interpret_bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        assert!(bodies.iter().all(|b| b == "response body"));
    }

    #[tokio::test]
    async fn test_unbid_placements_are_backfilled_on_success() {
        let mut spec = MockSpec::new();
        spec.server_requests = vec![post_request(json!({}))];
        let mut bid = Bid::new("some-id", "mock/placement", 0.5);
        bid.width = 300;
        bid.height = 200;
        bid.ad_url = Some("ad-url.com".to_string());
        spec.interpret_bids = vec![bid];
        let (_, _, adapter) = adapter_with(spec, MockTransport::succeeding("response body"));
        let auction = AuctionContext::new();

        adapter.call_bids(&mock_batch(), &auction).await;

        let first = auction.responses_for("mock/placement");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, BidStatus::Good);
        assert_eq!(first[0].bidder_code, CODE);
        assert_eq!(first[0].cpm, 0.5);

        let second = auction.responses_for("mock/placement2");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].status, BidStatus::NoBid);
        assert_eq!(second[0].request_id, "second-bid-id");
    }

    #[tokio::test]
    async fn test_transport_failure_backfills_every_placement() {
        let mut spec = MockSpec::new();
        spec.server_requests = vec![post_request(json!({}))];
        let (spec, _, adapter) = adapter_with(spec, MockTransport::failing("ajax call failed."));
        let auction = AuctionContext::new();

        adapter.call_bids(&mock_batch(), &auction).await;

        assert!(spec.interpret_bodies.lock().unwrap().is_empty());
        for placement in ["mock/placement", "mock/placement2"] {
            let outcomes = auction.responses_for(placement);
            assert_eq!(outcomes.len(), 1, "one terminal outcome for {placement}");
            assert_eq!(outcomes[0].status, BidStatus::NoBid);
        }
    }

    // 4. User syncs -----------------------------------------------------------

    #[tokio::test]
    async fn test_user_syncs_called_once_with_successful_bodies() {
        let mut spec = MockSpec::new();
        spec.server_requests = vec![post_request(json!({}))];
        let (spec, _, adapter) =
            adapter_with(spec, MockTransport::succeeding("response body"));
        let auction = AuctionContext::new();

        adapter.call_bids(&mock_batch(), &auction).await;

        let syncs = spec.sync_calls.lock().unwrap();
        assert_eq!(syncs.len(), 1);
        assert_eq!(syncs[0], vec!["response body"]);
    }

    #[tokio::test]
    async fn test_user_syncs_called_once_with_no_bodies_on_failure() {
        let mut spec = MockSpec::new();
        spec.server_requests = vec![post_request(json!({}))];
        let (spec, _, adapter) = adapter_with(spec, MockTransport::failing("ajax call failed."));
        let auction = AuctionContext::new();

        adapter.call_bids(&mock_batch(), &auction).await;

        let syncs = spec.sync_calls.lock().unwrap();
        assert_eq!(syncs.len(), 1);
        assert!(syncs[0].is_empty());
    }

    // 5. Alias identity -------------------------------------------------------

    #[tokio::test]
    async fn test_alias_adapter_stamps_alias_code_on_bids() {
        let mut spec = MockSpec::new();
        spec.server_requests = vec![post_request(json!({}))];
        spec.interpret_bids = vec![Bid::new("first-bid-id", "mock/placement", 1.0)];
        let spec = Arc::new(spec);
        let transport = Arc::new(MockTransport::succeeding("response body"));
        let adapter = BidderAdapter::with_code(spec, transport, "foo");
        let auction = AuctionContext::new();

        assert_eq!(adapter.bidder_code(), "foo");
        adapter.call_bids(&mock_batch(), &auction).await;

        let outcomes = auction.responses_for("mock/placement");
        assert_eq!(outcomes[0].bidder_code, "foo");
    }

    // 6. Query formatting ----------------------------------------------------

    #[test]
    fn test_format_query_renders_scalars_bare() {
        assert_eq!(format_query(&json!({ "arg": 2 })), "arg=2&");
        assert_eq!(format_query(&json!({ "s": "text" })), "s=text&");
        assert_eq!(format_query(&serde_json::Value::Null), "");
    }

    #[test]
    fn test_format_query_passes_pre_encoded_values_through() {
        assert_eq!(
            format_query(&json!({ "loc": "https%3A%2F%2Fpublisher.example%2Fhome" })),
            "loc=https%3A%2F%2Fpublisher.example%2Fhome&"
        );
    }
}
