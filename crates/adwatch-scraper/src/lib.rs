pub mod client;
pub mod error;
pub mod normalize;
pub mod source;
pub mod types;

pub use client::AdSourceClient;
pub use error::ScraperError;
pub use normalize::{normalize_record, parse_start_date};
pub use source::AdScraper;
pub use types::{AdsResponse, WireAdRecord};
