mod database;
mod feed_repo;
mod follow_repo;
pub mod retry;
mod user_repo;

pub use database::Database;
pub use feed_repo::FeedRepository;
pub use follow_repo::FollowRepository;
pub use user_repo::UserRepository;
