//! Bidder adapter layer — turns declarative bidder specs into adapters and
//! routes auction rounds through them.

pub mod bidder;
pub mod loader;
pub mod orbitsoft;
pub mod registry;
pub mod transport;

pub use bidder::{BidAdapter, BidderAdapter, BidderSpec};
pub use registry::{register_bidder, AdapterOptions, AdapterRegistry};
pub use transport::{HttpTransport, Transport, TransportOptions};
