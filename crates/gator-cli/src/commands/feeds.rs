use anyhow::Result;
use url::Url;

use gator_core::{
    feed::NewFeed,
    storage::{FeedRepository, FollowRepository},
    Error, User,
};

use super::State;

/// Accept only absolute http(s) URLs
pub fn validate_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw)
        .map_err(|e| Error::InvalidArgument(format!("invalid feed URL '{}': {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        scheme => Err(Error::InvalidArgument(format!(
            "unsupported URL scheme '{}' in {}",
            scheme, raw
        ))
        .into()),
    }
}

/// Register a feed and follow it as `user`
pub async fn add(state: &State, user: User, name: &str, url: &str) -> Result<()> {
    let feed = FeedRepository::new(&state.db)
        .create(&NewFeed {
            name: name.to_string(),
            url: url.to_string(),
            user_id: user.id,
        })
        .await?;

    FollowRepository::new(&state.db).create(user.id, feed.id).await?;

    println!("Added feed '{}' ({})", feed.name, feed.url);
    println!("{} now follows '{}'", user.name, feed.name);
    Ok(())
}

pub async fn list(state: &State) -> Result<()> {
    let listings = FeedRepository::new(&state.db).list_all().await?;

    if listings.is_empty() {
        println!("No feeds yet.");
        println!("\nTo add one, run:");
        println!("  gator addfeed <name> <url>");
        return Ok(());
    }

    println!("Feeds ({}):\n", listings.len());

    for listing in &listings {
        let feed = &listing.feed;
        println!("  {} (added by {})", feed.name, listing.owner_name);
        println!("    URL: {}", feed.url);
        match feed.last_fetched_at {
            Some(last) => println!("    Last fetched: {}", last.format("%Y-%m-%d %H:%M")),
            None => println!("    Last fetched: never"),
        }
    }

    Ok(())
}
