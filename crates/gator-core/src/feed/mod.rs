mod fetcher;
mod models;
mod parser;

pub use fetcher::{FeedFetcher, FeedSource};
pub use models::{Feed, FeedFollow, FeedListing, NewFeed};
pub use parser::{parse_feed, ParsedFeed, ParsedItem};
