use chrono::Utc;
use uuid::Uuid;

use super::database::{is_foreign_key_violation, is_unique_violation};
use super::{Database, FeedRepository, UserRepository};
use crate::feed::FeedFollow;
use crate::{Error, Result};

/// Repository for the user/feed follow relation
pub struct FollowRepository<'a> {
    db: &'a Database,
}

impl<'a> FollowRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Follow a feed. Both ends must exist and a pair can only be followed once.
    pub async fn create(&self, user_id: Uuid, feed_id: Uuid) -> Result<FeedFollow> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let inserted = sqlx::query(
            r#"
            INSERT INTO feed_follows (id, user_id, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(feed_id.to_string())
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await;

        match inserted {
            Ok(_) => Ok(FeedFollow {
                id,
                user_id,
                feed_id,
                created_at: now,
                updated_at: now,
            }),
            Err(e) if is_unique_violation(&e) => Err(self.duplicate_error(user_id, feed_id).await),
            Err(e) if is_foreign_key_violation(&e) => {
                Err(self.missing_reference_error(user_id, feed_id).await)
            }
            Err(e) => Err(Error::Database(e)),
        }
    }

    /// Names of the feeds a user follows, in the order they were followed
    pub async fn list_feed_names(&self, user_id: Uuid) -> Result<Vec<String>> {
        let names: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT f.name
            FROM feed_follows ff
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.user_id = ?
            ORDER BY ff.created_at ASC, f.name ASC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(self.db.pool())
        .await?;

        Ok(names.into_iter().map(|(name,)| name).collect())
    }

    /// Unfollow the feed at `feed_url`.
    ///
    /// Returns whether a follow was removed; unfollowing a feed the user
    /// does not follow is not an error. An URL that matches no feed is.
    pub async fn delete(&self, user_id: Uuid, feed_url: &str) -> Result<bool> {
        let feed = FeedRepository::new(self.db).get_by_url(feed_url).await?;

        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id.to_string())
            .bind(feed.id.to_string())
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn duplicate_error(&self, user_id: Uuid, feed_id: Uuid) -> Error {
        let user = UserRepository::new(self.db).find_by_id(user_id).await;
        let feed = FeedRepository::new(self.db).find_by_id(feed_id).await;

        Error::DuplicateFollow {
            user: match user {
                Ok(Some(u)) => u.name,
                _ => user_id.to_string(),
            },
            feed: match feed {
                Ok(Some(f)) => f.url,
                _ => feed_id.to_string(),
            },
        }
    }

    async fn missing_reference_error(&self, user_id: Uuid, feed_id: Uuid) -> Error {
        match UserRepository::new(self.db).find_by_id(user_id).await {
            Ok(None) => Error::UserNotFound(user_id.to_string()),
            Err(e) => e,
            Ok(Some(_)) => Error::FeedNotFound(feed_id.to_string()),
        }
    }
}
