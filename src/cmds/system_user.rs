//! Handlers for the OS-level user and group commands.

use color_eyre::Result;
use tracing::debug;

use crate::system::{CreateUser, Identities, ensure_system_user, remove_system_user};

/// Handles `system-user-exists`: result is carried in the exit code.
pub(crate) async fn exists<I: Identities>(identities: &I, username: &str) -> Result<i32> {
    if identities.user_exists(username).await? {
        Ok(0)
    } else {
        debug!("No system user named '{}'", username);
        Ok(1)
    }
}

/// Handles `system-group-exists`: result is carried in the exit code.
pub(crate) async fn group_exists<I: Identities>(identities: &I, group: &str) -> Result<i32> {
    if identities.group_exists(group).await? {
        Ok(0)
    } else {
        debug!("No system group named '{}'", group);
        Ok(1)
    }
}

/// Handles `system-user-create`. Failure to create is fatal for the surrounding operation.
pub(crate) async fn create<I: Identities>(identities: &I, request: &CreateUser) -> Result<i32> {
    ensure_system_user(identities, request).await?;
    Ok(0)
}

/// Handles `system-user-delete`. Safe to call unconditionally during cleanup.
pub(crate) async fn delete<I: Identities>(identities: &I, username: &str) -> Result<i32> {
    remove_system_user(identities, username).await?;
    Ok(0)
}
