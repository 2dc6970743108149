//! OS-level user and group management.
//!
//! System accounts for hosted applications are created and removed through the [`Identities`]
//! trait. The real implementation reads the OS identity database natively for lookups and shells
//! out to `useradd`/`deluser`/`delgroup` under the privilege manager for mutations. The
//! higher-level operations in this module implement the lifecycle rules: creation is idempotent
//! and fatal on failure, deletion is safe to call unconditionally and sweeps the same-named
//! group separately.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use tracing::{debug, info, warn};

use crate::utils::sudo::PrivilegeManager;

// -------------------------------------------------------------------------------------------------
// Identity interface
// -------------------------------------------------------------------------------------------------

/// Request to create one system account.
#[derive(Debug, Clone)]
pub(crate) struct CreateUser {
    /// Name of the account (and of its auto-created primary group).
    pub(crate) username: String,
    /// Home directory to assign. `None` means the account gets no home directory at all.
    pub(crate) home_dir: Option<PathBuf>,
    /// Whether the account keeps the OS default login shell. When false, a non-interactive
    /// shell that forbids login is forced.
    pub(crate) use_shell: bool,
}

/// Capability set for the OS identity database: existence checks and user/group lifecycle.
pub(crate) trait Identities {
    async fn user_exists(&self, username: &str) -> Result<bool>;
    async fn group_exists(&self, group: &str) -> Result<bool>;
    async fn create_user(&self, request: &CreateUser) -> Result<()>;
    async fn delete_user(&self, username: &str) -> Result<()>;
    async fn delete_group(&self, group: &str) -> Result<()>;
}

// -------------------------------------------------------------------------------------------------
// Real implementation
// -------------------------------------------------------------------------------------------------

/// Identity management against the real OS: native database lookups, escalated tool invocations
/// for mutations.
#[derive(Debug)]
pub(crate) struct ShellIdentities {
    pm: Arc<PrivilegeManager>,
    /// Shell assigned to accounts that must not be able to log in.
    nologin_shell: PathBuf,
}

impl ShellIdentities {
    pub(crate) fn new(pm: Arc<PrivilegeManager>, nologin_shell: PathBuf) -> Self {
        Self { pm, nologin_shell }
    }
}

impl Identities for ShellIdentities {
    async fn user_exists(&self, username: &str) -> Result<bool> {
        let user = nix::unistd::User::from_name(username)
            .wrap_err_with(|| format!("Failed to look up system user '{}'", username))?;
        Ok(user.is_some())
    }

    async fn group_exists(&self, group: &str) -> Result<bool> {
        let group = nix::unistd::Group::from_name(group)
            .wrap_err_with(|| format!("Failed to look up system group '{}'", group))?;
        Ok(group.is_some())
    }

    async fn create_user(&self, request: &CreateUser) -> Result<()> {
        let args = useradd_args(request, &self.nologin_shell);
        self.pm
            .sudo_exec(
                "useradd",
                &args,
                Some(&format!("Creating system user '{}'", request.username)),
            )
            .await
    }

    async fn delete_user(&self, username: &str) -> Result<()> {
        self.pm
            .sudo_exec(
                "deluser",
                &[username],
                Some(&format!("Deleting system user '{}'", username)),
            )
            .await
    }

    async fn delete_group(&self, group: &str) -> Result<()> {
        self.pm
            .sudo_exec(
                "delgroup",
                &[group],
                Some(&format!("Deleting system group '{}'", group)),
            )
            .await
    }
}

/// Builds the `useradd` argument list for a creation request.
///
/// Accounts are always created as system accounts with a same-named primary group. Without a
/// home directory the account gets none at all, not merely the tool's default location.
fn useradd_args(request: &CreateUser, nologin_shell: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    match &request.home_dir {
        Some(home_dir) => {
            args.push("--home-dir".into());
            args.push(home_dir.into());
        }
        None => args.push("--no-create-home".into()),
    }
    args.push("--system".into());
    args.push("--user-group".into());
    args.push(request.username.clone().into());
    if !request.use_shell {
        args.push("--shell".into());
        args.push(nologin_shell.into());
    }
    args
}

// -------------------------------------------------------------------------------------------------
// Lifecycle operations
// -------------------------------------------------------------------------------------------------

/// Idempotently creates a system account.
///
/// A no-op when the account already exists. A failed creation is unrecoverable for the
/// surrounding install/remove operation and is reported as a hard error.
pub(crate) async fn ensure_system_user<I: Identities>(
    identities: &I,
    request: &CreateUser,
) -> Result<()> {
    if identities.user_exists(&request.username).await? {
        debug!(
            "System user '{}' already exists, nothing to do",
            request.username
        );
        return Ok(());
    }

    info!("Creating system user '{}'", request.username);
    identities
        .create_user(request)
        .await
        .wrap_err_with(|| format!("Unable to create system user '{}'", request.username))
}

/// Removes a system account and its same-named group.
///
/// Deleting an absent user is not an error; a warning is emitted and the group sweep still
/// runs. The group is checked separately because user deletion does not remove an auto-created
/// same-named group under all OS configurations.
pub(crate) async fn remove_system_user<I: Identities>(
    identities: &I,
    username: &str,
) -> Result<()> {
    if identities.user_exists(username).await? {
        info!("Deleting system user '{}'", username);
        identities
            .delete_user(username)
            .await
            .wrap_err_with(|| format!("Unable to delete system user '{}'", username))?;
    } else {
        warn!("The system user '{}' was not found, nothing to delete", username);
    }

    if identities.group_exists(username).await? {
        info!("Deleting system group '{}'", username);
        identities
            .delete_group(username)
            .await
            .wrap_err_with(|| format!("Unable to delete system group '{}'", username))?;
    }

    Ok(())
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::bail;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory stand-in for the OS identity database.
    ///
    /// `delete_user` intentionally leaves the auto-created group behind, mirroring the OS
    /// configurations where the group survives the user.
    struct InMemoryIdentities {
        users: Mutex<HashSet<String>>,
        groups: Mutex<HashSet<String>>,
        create_calls: Mutex<u32>,
        fail_create: bool,
    }

    impl InMemoryIdentities {
        fn new() -> Self {
            Self {
                users: Mutex::new(HashSet::new()),
                groups: Mutex::new(HashSet::new()),
                create_calls: Mutex::new(0),
                fail_create: false,
            }
        }

        fn failing_create() -> Self {
            Self {
                fail_create: true,
                ..Self::new()
            }
        }

        fn create_calls(&self) -> u32 {
            *self.create_calls.lock().unwrap()
        }
    }

    impl Identities for InMemoryIdentities {
        async fn user_exists(&self, username: &str) -> Result<bool> {
            Ok(self.users.lock().unwrap().contains(username))
        }

        async fn group_exists(&self, group: &str) -> Result<bool> {
            Ok(self.groups.lock().unwrap().contains(group))
        }

        async fn create_user(&self, request: &CreateUser) -> Result<()> {
            *self.create_calls.lock().unwrap() += 1;
            if self.fail_create {
                bail!("useradd failed");
            }
            self.users.lock().unwrap().insert(request.username.clone());
            // useradd --user-group also creates the primary group
            self.groups.lock().unwrap().insert(request.username.clone());
            Ok(())
        }

        async fn delete_user(&self, username: &str) -> Result<()> {
            self.users.lock().unwrap().remove(username);
            Ok(())
        }

        async fn delete_group(&self, group: &str) -> Result<()> {
            self.groups.lock().unwrap().remove(group);
            Ok(())
        }
    }

    fn request(username: &str) -> CreateUser {
        CreateUser {
            username: username.to_string(),
            home_dir: None,
            use_shell: false,
        }
    }

    // --
    // * Argument construction

    #[test]
    fn test_useradd_args_without_home() {
        let args = useradd_args(&request("app"), Path::new("/usr/sbin/nologin"));
        assert_eq!(
            args,
            vec![
                OsString::from("--no-create-home"),
                OsString::from("--system"),
                OsString::from("--user-group"),
                OsString::from("app"),
                OsString::from("--shell"),
                OsString::from("/usr/sbin/nologin"),
            ]
        );
    }

    #[test]
    fn test_useradd_args_with_home_and_shell() {
        let req = CreateUser {
            username: "app".to_string(),
            home_dir: Some(PathBuf::from("/var/www/app")),
            use_shell: true,
        };
        let args = useradd_args(&req, Path::new("/usr/sbin/nologin"));
        assert_eq!(
            args,
            vec![
                OsString::from("--home-dir"),
                OsString::from("/var/www/app"),
                OsString::from("--system"),
                OsString::from("--user-group"),
                OsString::from("app"),
            ]
        );
    }

    // --
    // * Creation

    #[tokio::test]
    async fn test_ensure_system_user_creates_once() -> Result<()> {
        let identities = InMemoryIdentities::new();
        ensure_system_user(&identities, &request("app")).await?;
        assert!(identities.user_exists("app").await?);
        assert!(identities.group_exists("app").await?);

        // Second call must be a no-op
        ensure_system_user(&identities, &request("app")).await?;
        assert_eq!(identities.create_calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_system_user_failure_is_fatal() {
        let identities = InMemoryIdentities::failing_create();
        let result = ensure_system_user(&identities, &request("app")).await;
        assert!(result.is_err());
        let report = format!("{:?}", result.unwrap_err());
        assert!(report.contains("Unable to create system user 'app'"));
    }

    // --
    // * Deletion

    #[tokio::test]
    async fn test_remove_system_user_removes_user_and_group() -> Result<()> {
        let identities = InMemoryIdentities::new();
        ensure_system_user(&identities, &request("app")).await?;

        remove_system_user(&identities, "app").await?;
        assert!(!identities.user_exists("app").await?);
        // The group does not vanish with the user in the fake; the sweep must get it
        assert!(!identities.group_exists("app").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_system_user_absent_is_not_fatal() -> Result<()> {
        let identities = InMemoryIdentities::new();
        remove_system_user(&identities, "ghost").await?;
        assert_eq!(identities.create_calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_system_user_sweeps_leftover_group() -> Result<()> {
        let identities = InMemoryIdentities::new();
        identities
            .groups
            .lock()
            .unwrap()
            .insert("app".to_string());

        // User already gone, group still there
        remove_system_user(&identities, "app").await?;
        assert!(!identities.group_exists("app").await?);
        Ok(())
    }
}
