//! Handlers for the application user registry commands.

use color_eyre::Result;
use tracing::debug;

use crate::registry::{Registry, user_exists, user_info, user_list};

/// Handles `user-exists`: result is carried in the exit code, no output.
pub(crate) async fn exists<R: Registry>(registry: &R, username: &str) -> Result<i32> {
    if user_exists(registry, username).await? {
        Ok(0)
    } else {
        debug!("No application user named '{}'", username);
        Ok(1)
    }
}

/// Handles `user-info`: prints the field value on stdout.
pub(crate) async fn info<R: Registry>(registry: &R, username: &str, key: &str) -> Result<i32> {
    let value = user_info(registry, username, key).await?;
    println!("{}", value);
    Ok(0)
}

/// Handles `user-list`: prints one username per line, in listing order.
pub(crate) async fn list<R: Registry>(registry: &R) -> Result<i32> {
    for username in user_list(registry).await? {
        println!("{}", username);
    }
    Ok(0)
}
