use anyhow::Result;

use gator_core::storage::UserRepository;

use super::State;

pub async fn register(state: &mut State, name: &str) -> Result<()> {
    let user = UserRepository::new(&state.db).create(name).await?;

    state.config.set_current_user(&user.name);
    state.save_config()?;

    println!("User created:");
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

pub async fn login(state: &mut State, name: &str) -> Result<()> {
    let user = UserRepository::new(&state.db).get_by_name(name).await?;

    state.config.set_current_user(&user.name);
    state.save_config()?;

    println!("Logged in as {}", user.name);
    Ok(())
}

pub async fn reset(state: &State) -> Result<()> {
    let deleted = UserRepository::new(&state.db).delete_all().await?;
    println!("Deleted {} users along with their feeds and follows", deleted);
    Ok(())
}

pub async fn list(state: &State) -> Result<()> {
    let users = UserRepository::new(&state.db).list_all().await?;

    if users.is_empty() {
        println!("No users yet. Run `gator register <name>` to create one.");
        return Ok(());
    }

    let current = state.config.current_user();
    for user in &users {
        if current == Some(user.name.as_str()) {
            println!("* {} (current)", user.name);
        } else {
            println!("* {}", user.name);
        }
    }

    Ok(())
}
