use chrono::Utc;

use crate::feed::{Feed, FeedSource, ParsedFeed};
use crate::storage::{Database, FeedRepository};
use crate::{Error, Result};

/// What a single fetch cycle did
#[derive(Debug)]
pub enum CycleOutcome {
    /// The feed was fetched and parsed
    Fetched { feed: Feed, parsed: ParsedFeed },
    /// The feed was claimed but fetching or parsing failed; it keeps its new
    /// place in the rotation
    Failed { feed: Feed, error: Error },
    /// There is nothing to fetch
    NoFeeds,
}

/// Run one fetch cycle: claim the next feed, then fetch it.
///
/// The feed is stamped as fetched before the network call. Fetch and parse
/// failures are reported in the outcome; store failures are returned as
/// errors.
pub async fn fetch_next_feed(db: &Database, source: &dyn FeedSource) -> Result<CycleOutcome> {
    let feed_repo = FeedRepository::new(db);

    let feed = match feed_repo.select_next_to_fetch(Utc::now()).await {
        Ok(feed) => feed,
        Err(Error::NoFeedsAvailable) => return Ok(CycleOutcome::NoFeeds),
        Err(e) => return Err(e),
    };

    tracing::info!("Fetching feed '{}' ({})", feed.name, feed.url);

    match source.fetch(&feed.url).await {
        Ok(parsed) => {
            tracing::info!("Feed '{}': {} items", feed.name, parsed.items.len());
            Ok(CycleOutcome::Fetched { feed, parsed })
        }
        Err(error) => {
            tracing::warn!("Failed to fetch feed '{}': {}", feed.name, error);
            Ok(CycleOutcome::Failed { feed, error })
        }
    }
}
