pub mod auction;
pub mod config;
pub mod error;
pub mod types;

pub use auction::AuctionContext;
pub use config::AppConfig;
pub use error::{BidError, BidResult};
