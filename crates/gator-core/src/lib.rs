pub mod config;
pub mod error;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod user;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use user::User;
