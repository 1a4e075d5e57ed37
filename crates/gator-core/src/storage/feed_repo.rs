use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::database::{is_foreign_key_violation, is_unique_violation};
use super::retry::with_retry;
use super::Database;
use crate::feed::{Feed, FeedListing, NewFeed};
use crate::{Error, Result};

/// Repository for feed CRUD and the fetch rotation
pub struct FeedRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct FeedRow {
    id: String,
    name: String,
    url: String,
    user_id: String,
    last_fetched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct FeedListingRow {
    #[sqlx(flatten)]
    feed: FeedRow,
    owner_name: String,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            name: row.name,
            url: row.url,
            user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_fetched_at: row.last_fetched_at,
        }
    }
}

/// Rotation order: never-fetched first, then oldest fetch; ties by age, then id
const ROTATION_ORDER: &str = "last_fetched_at ASC NULLS FIRST, created_at ASC, id ASC";

impl<'a> FeedRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Register a new feed. URLs are unique across all users.
    pub async fn create(&self, new_feed: &NewFeed) -> Result<Feed> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO feeds (id, name, url, user_id, last_fetched_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&new_feed.name)
        .bind(&new_feed.url)
        .bind(new_feed.user_id.to_string())
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateUrl(new_feed.url.clone())
            } else if is_foreign_key_violation(&e) {
                Error::UserNotFound(new_feed.user_id.to_string())
            } else {
                Error::Database(e)
            }
        })?;

        tracing::debug!(feed_id = %id, url = %new_feed.url, "Created feed");

        Ok(Feed {
            id,
            name: new_feed.name.clone(),
            url: new_feed.url.clone(),
            user_id: new_feed.user_id,
            created_at: now,
            updated_at: now,
            last_fetched_at: None,
        })
    }

    /// Find a feed by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Feed>> {
        let row: Option<FeedRow> = sqlx::query_as(
            r#"
            SELECT id, name, url, user_id, last_fetched_at, created_at, updated_at
            FROM feeds
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(Feed::from))
    }

    /// Find a feed by URL
    pub async fn find_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let row: Option<FeedRow> = sqlx::query_as(
            r#"
            SELECT id, name, url, user_id, last_fetched_at, created_at, updated_at
            FROM feeds
            WHERE url = ?
            "#,
        )
        .bind(url)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(Feed::from))
    }

    pub async fn get_by_url(&self, url: &str) -> Result<Feed> {
        self.find_by_url(url)
            .await?
            .ok_or_else(|| Error::FeedNotFound(url.to_string()))
    }

    /// Get all feeds with the name of the user who added each, oldest first
    pub async fn list_all(&self) -> Result<Vec<FeedListing>> {
        let rows: Vec<FeedListingRow> = sqlx::query_as(
            r#"
            SELECT f.id, f.name, f.url, f.user_id, f.last_fetched_at,
                   f.created_at, f.updated_at, u.name AS owner_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.created_at ASC, f.id ASC
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| FeedListing {
                feed: Feed::from(row.feed),
                owner_name: row.owner_name,
            })
            .collect())
    }

    /// The feed the next fetch cycle would pick, without claiming it
    pub async fn peek_next_to_fetch(&self) -> Result<Option<Feed>> {
        let sql = format!(
            r#"
            SELECT id, name, url, user_id, last_fetched_at, created_at, updated_at
            FROM feeds
            ORDER BY {ROTATION_ORDER}
            LIMIT 1
            "#
        );
        let row: Option<FeedRow> = sqlx::query_as(&sql)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(Feed::from))
    }

    /// Claim the next feed in the rotation and stamp it as fetched at `now`.
    ///
    /// Selection and the timestamp update are a single statement, so two
    /// aggregators sharing the database can never claim the same feed for
    /// the same turn. The returned feed carries the new `last_fetched_at`.
    pub async fn select_next_to_fetch(&self, now: DateTime<Utc>) -> Result<Feed> {
        let sql = format!(
            r#"
            UPDATE feeds
            SET last_fetched_at = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM feeds
                ORDER BY {ROTATION_ORDER}
                LIMIT 1
            )
            RETURNING id, name, url, user_id, last_fetched_at, created_at, updated_at
            "#
        );

        let row: Option<FeedRow> = with_retry(|| {
            sqlx::query_as(&sql)
                .bind(now)
                .bind(now)
                .fetch_optional(self.db.pool())
        })
        .await?;

        row.map(Feed::from).ok_or(Error::NoFeedsAvailable)
    }

    /// Record that a feed was fetched at `fetched_at`
    pub async fn mark_fetched(&self, id: Uuid, fetched_at: DateTime<Utc>) -> Result<()> {
        let result = with_retry(|| {
            sqlx::query(
                r#"
                UPDATE feeds
                SET last_fetched_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(fetched_at)
            .bind(fetched_at)
            .bind(id.to_string())
            .execute(self.db.pool())
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::FeedNotFound(id.to_string()));
        }

        Ok(())
    }

    /// Get total feed count
    pub async fn count(&self) -> Result<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds")
            .fetch_one(self.db.pool())
            .await?;

        // COUNT(*) is never negative
        Ok(u64::try_from(count.0).unwrap_or_default())
    }
}
