use anyhow::Result;

use gator_core::{
    storage::{FeedRepository, FollowRepository},
    User,
};

use super::State;

pub async fn follow(state: &State, user: User, url: &str) -> Result<()> {
    let feed = FeedRepository::new(&state.db).get_by_url(url).await?;
    FollowRepository::new(&state.db).create(user.id, feed.id).await?;

    println!("{} now follows '{}'", user.name, feed.name);
    Ok(())
}

pub async fn unfollow(state: &State, user: User, url: &str) -> Result<()> {
    if FollowRepository::new(&state.db).delete(user.id, url).await? {
        println!("{} unfollowed {}", user.name, url);
    } else {
        println!("{} was not following {}", user.name, url);
    }
    Ok(())
}

pub async fn following(state: &State, user: User) -> Result<()> {
    let names = FollowRepository::new(&state.db).list_feed_names(user.id).await?;

    if names.is_empty() {
        println!("{} is not following any feeds.", user.name);
        return Ok(());
    }

    println!("{} follows:", user.name);
    for name in &names {
        println!("  * {}", name);
    }
    Ok(())
}
