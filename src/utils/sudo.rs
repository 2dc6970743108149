//! Privilege escalation module.
//!
//! This module provides functionality for executing commands with elevated privileges, or as
//! another OS user, through an escalation tool such as `sudo` or `doas`. It includes a mechanism
//! to maintain an active `sudo` session so that a sequence of privileged operations only prompts
//! for a password once.
//!
//! When the current process already runs as root, commands are executed directly and no
//! escalation tool is involved.

use std::ffi::{OsStr, OsString};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use color_eyre::eyre::{WrapErr, bail, eyre};
use color_eyre::{Result, Section};
use derive_builder::Builder;
use tokio::sync::Mutex;
use tracing::debug;

use crate::utils::commands::format_args;

// -------------------------------------------------------------------------------------------------
// Escalation command
// -------------------------------------------------------------------------------------------------

/// The external tool used to obtain root privileges or switch identity.
#[derive(Debug, Clone)]
pub(crate) enum GetRootCmd {
    Sudo {
        cmd: String,
        initial_flags: Vec<String>,
        keepalive_flags: Vec<String>,
    },
    Doas {
        cmd: String,
    },
}

impl GetRootCmd {
    pub(crate) fn use_sudo() -> Self {
        GetRootCmd::Sudo {
            cmd: "sudo".to_string(),
            initial_flags: vec!["-v".to_string()],
            keepalive_flags: vec!["-v".to_string(), "-n".to_string()],
        }
    }

    pub(crate) fn use_doas() -> Self {
        GetRootCmd::Doas {
            cmd: "doas".to_string(),
        }
    }

    fn cmd(&self) -> &str {
        match self {
            GetRootCmd::Sudo { cmd, .. } => cmd,
            GetRootCmd::Doas { cmd } => cmd,
        }
    }

    /// Flags used to validate the session up front, prompting for a password if necessary.
    /// `doas` has no session caching, so there is nothing to validate.
    fn initial_flags(&self) -> Option<&[String]> {
        match self {
            GetRootCmd::Sudo { initial_flags, .. } => Some(initial_flags),
            GetRootCmd::Doas { .. } => None,
        }
    }

    /// Flags used to refresh an already established session without prompting.
    fn keepalive_flags(&self) -> Option<&[String]> {
        match self {
            GetRootCmd::Sudo {
                keepalive_flags, ..
            } => Some(keepalive_flags),
            GetRootCmd::Doas { .. } => None,
        }
    }

    /// Arguments that make the tool run the following command as `user`.
    ///
    /// The `--` terminator for sudo keeps the target command's own flags from being interpreted
    /// by the escalation tool.
    pub(crate) fn as_user_args(&self, user: &str) -> Vec<OsString> {
        match self {
            GetRootCmd::Sudo { .. } => {
                vec!["-u".into(), user.into(), "--".into()]
            }
            GetRootCmd::Doas { .. } => vec!["-u".into(), user.into()],
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Privilege manager
// -------------------------------------------------------------------------------------------------

/// Holds the escalation configuration and the state of the session keepalive loop.
///
/// Shared across the application via `Arc`; all methods take `&self`.
#[derive(Debug, Builder)]
#[builder(pattern = "owned", setter(prefix = "with"))]
pub(crate) struct PrivilegeManager {
    /// Whether privilege escalation is allowed at all.
    use_sudo: bool,
    /// The escalation tool to use.
    root_cmd: GetRootCmd,
    /// Whether the keepalive refresh loop has been started.
    #[builder(setter(skip), default)]
    loop_running: AtomicBool,
    /// Serializes keepalive loop startup.
    #[builder(setter(skip), default)]
    loop_mutex: Mutex<()>,
}

impl PrivilegeManager {
    /// Whether the current process already has root privileges.
    fn is_root() -> bool {
        nix::unistd::geteuid().is_root()
    }

    /// Conditionally validates the escalation session and spawns a keepalive thread that
    /// periodically refreshes it.
    ///
    /// Ensures that a sequence of privileged operations can proceed without the user having to
    /// re-enter a password in the middle. A no-op when already running as root.
    ///
    /// # Arguments
    ///
    /// * `reason` - A string slice explaining the reason for requesting privileges.
    ///
    /// # Errors
    ///
    /// Fails when escalation is disabled by configuration or the initial validation command
    /// fails.
    pub(crate) async fn spawn_sudo_maybe<S: AsRef<str>>(&self, reason: S) -> Result<()> {
        if Self::is_root() {
            return Ok(());
        }
        if !self.use_sudo {
            return Err(eyre!("Use of privilege escalation is disabled").suggestion(
                "Check the value of `use_sudo` in `$HOME/.config/userdeploy/config.toml`",
            ));
        }

        debug!("Requesting ROOT privileges. Reason: {}", reason.as_ref());
        if !self.loop_running.load(Ordering::Relaxed) {
            let _guard = self.loop_mutex.lock().await;
            // Double-check the flag to handle race conditions
            if !self.loop_running.load(Ordering::Relaxed) {
                let root_cmd = self.root_cmd.clone();
                if let Some(flags) = root_cmd.initial_flags() {
                    validate_session(root_cmd.cmd(), flags)?;
                }
                if root_cmd.keepalive_flags().is_some() {
                    thread::spawn(move || keepalive_loop(&root_cmd));
                }
                self.loop_running.store(true, Ordering::Relaxed);
            }
        } else {
            debug!("privilege keepalive already running")
        }
        Ok(())
    }

    /// Builds the command line for a privileged invocation, prefixing the escalation tool
    /// unless already root.
    fn escalated<S: AsRef<OsStr>>(&self, cmd: &str, args: &[S]) -> tokio::process::Command {
        if Self::is_root() {
            let mut exec = tokio::process::Command::new(cmd);
            exec.args(args);
            exec
        } else {
            let mut exec = tokio::process::Command::new(self.root_cmd.cmd());
            exec.arg(cmd).args(args);
            exec
        }
    }

    /// Executes a command with elevated privileges.
    ///
    /// # Arguments
    ///
    /// * `cmd` - The command to execute.
    /// * `args` - Arguments for the command.
    /// * `reason` - Optional reason for the escalation, used for logging.
    ///
    /// # Errors
    ///
    /// Fails when the command cannot be executed or returns a non-zero exit status.
    pub(crate) async fn sudo_exec<S: AsRef<OsStr>>(
        &self,
        cmd: &str,
        args: &[S],
        reason: Option<&str>,
    ) -> Result<()> {
        let reason = if let Some(reason) = reason {
            reason.to_string()
        } else {
            format!("Executing: {} {}", cmd, format_args(args))
        };
        self.spawn_sudo_maybe(reason)
            .await
            .wrap_err("Failed to obtain privileges")?;

        let status = self
            .escalated(cmd, args)
            .status()
            .await
            .wrap_err_with(|| format!("Failed to execute {} {}", cmd, format_args(args)))?;

        if status.success() {
            Ok(())
        } else {
            bail!("Failed to execute {} {}", cmd, format_args(args))
        }
    }

    /// Executes a command as another OS user, with stdio inherited and the exit status passed
    /// through unchanged.
    ///
    /// Each argument is handed to the escalation tool as one token; there is no shell
    /// re-interpretation layer in between.
    pub(crate) async fn sudo_exec_as(
        &self,
        user: &str,
        argv: &[OsString],
    ) -> Result<ExitStatus> {
        self.spawn_sudo_maybe(format!("Running a command as '{}'", user))
            .await
            .wrap_err("Failed to obtain privileges")?;

        let status = tokio::process::Command::new(self.root_cmd.cmd())
            .args(self.root_cmd.as_user_args(user))
            .args(argv)
            .status()
            .await
            .wrap_err_with(|| format!("Failed to execute command as '{}'", user))?;

        Ok(status)
    }
}

/// Runs the escalation tool once with its session validation flags, inheriting the terminal's
/// stdin to allow for password input if necessary.
fn validate_session(cmd: &str, flags: &[String]) -> Result<()> {
    let status = std::process::Command::new(cmd)
        .args(flags)
        .stdin(Stdio::inherit())
        .status()
        .wrap_err_with(|| format!("Failed to execute {}", cmd))?;

    if !status.success() {
        bail!("Privilege escalation command failed");
    }
    Ok(())
}

/// Runs an infinite loop that periodically refreshes the escalation session.
///
/// Intended to be run in its own thread; it dies with the process.
fn keepalive_loop(root_cmd: &GetRootCmd) -> Result<()> {
    let flags = root_cmd
        .keepalive_flags()
        .expect("keepalive loop spawned without keepalive flags");
    debug!("Running privilege keepalive loop");
    loop {
        let status = std::process::Command::new(root_cmd.cmd())
            .args(flags)
            .status()
            .wrap_err("Failed to refresh the escalation session")?;
        if !status.success() {
            bail!("Privilege escalation refresh failed");
        }
        thread::sleep(Duration::from_secs(60));
    }
}

//
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_all_fields() {
        assert!(PrivilegeManagerBuilder::default().build().is_err());
        assert!(
            PrivilegeManagerBuilder::default()
                .with_use_sudo(true)
                .with_root_cmd(GetRootCmd::use_sudo())
                .build()
                .is_ok()
        );
    }

    #[test]
    fn test_as_user_args_preserves_tokens() {
        let sudo = GetRootCmd::use_sudo();
        assert_eq!(
            sudo.as_user_args("deploy"),
            vec![
                OsString::from("-u"),
                OsString::from("deploy"),
                OsString::from("--")
            ]
        );

        let doas = GetRootCmd::use_doas();
        assert_eq!(
            doas.as_user_args("deploy"),
            vec![OsString::from("-u"), OsString::from("deploy")]
        );
    }

    #[tokio::test]
    async fn test_disabled_escalation_bails() -> Result<()> {
        // Meaningless as root, where no escalation is needed in the first place
        if nix::unistd::geteuid().is_root() {
            return Ok(());
        }
        let pm = PrivilegeManagerBuilder::default()
            .with_use_sudo(false)
            .with_root_cmd(GetRootCmd::use_sudo())
            .build()?;
        assert!(pm.sudo_exec("true", &[] as &[&str], None).await.is_err());
        Ok(())
    }
}
