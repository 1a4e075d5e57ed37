use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Feed not found: {0}")]
    FeedNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("A feed with URL {0} already exists")]
    DuplicateUrl(String),

    #[error("User '{user}' already follows {feed}")]
    DuplicateFollow { user: String, feed: String },

    #[error("User '{0}' already exists")]
    DuplicateUser(String),

    #[error("No feeds available to fetch")]
    NoFeedsAvailable,

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Parse failed: {0}")]
    ParseFailed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller can keep going after this error.
    ///
    /// Store connectivity, filesystem and configuration failures are fatal;
    /// everything else is scoped to a single command or fetch cycle.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Database(_) | Error::Io(_) | Error::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
