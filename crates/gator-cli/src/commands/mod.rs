use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use gator_core::{storage::Database, storage::UserRepository, AppConfig, Error, User};

pub mod agg;
pub mod feeds;
pub mod follows;
pub mod users;

/// Everything a command handler can touch
pub struct State {
    pub config: AppConfig,
    pub config_path: PathBuf,
    pub db: Arc<Database>,
}

impl State {
    pub fn save_config(&self) -> Result<()> {
        self.config.save_to(&self.config_path)?;
        Ok(())
    }
}

/// Resolve the configured current user against the store
pub async fn current_user(state: &State) -> Result<User> {
    let name = state.config.current_user().ok_or_else(|| {
        Error::UserNotFound(
            "no current user; run `gator register <name>` or `gator login <name>` first"
                .to_string(),
        )
    })?;

    Ok(UserRepository::new(&state.db).get_by_name(name).await?)
}

/// Run `handler` as the current user. Fails before the handler runs when
/// no user is logged in or the logged-in user no longer exists.
pub async fn logged_in<F, Fut>(state: &State, handler: F) -> Result<()>
where
    F: FnOnce(User) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let user = current_user(state).await?;
    handler(user).await
}
