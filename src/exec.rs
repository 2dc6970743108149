//! Running commands as another OS user.
//!
//! The current identity is carried in an explicit [`ExecContext`] value instead of being read
//! ambiently at the point of use, so the planning step is a pure function that tests can drive
//! with any identity. When the target user is the current one, the command runs directly in the
//! current context (inheriting environment and shell state); anything else goes through the
//! privilege manager. Exit status and output are passed through from whichever path is taken.

use std::ffi::OsString;
use std::process::ExitStatus;

use color_eyre::Result;
use color_eyre::eyre::ensure;
use tracing::debug;

use crate::utils::commands::exec_status;
use crate::utils::sudo::PrivilegeManager;

// -------------------------------------------------------------------------------------------------
// Execution context
// -------------------------------------------------------------------------------------------------

/// The OS identity a command runs under right now.
#[derive(Debug, Clone)]
pub(crate) struct ExecContext {
    pub(crate) username: String,
}

impl ExecContext {
    /// Captures the identity of the current process.
    pub(crate) fn current() -> Self {
        let username = match nix::unistd::User::from_uid(nix::unistd::getuid()) {
            Ok(Some(user)) => user.name,
            // The uid has no passwd entry (or the lookup failed); fall back to the environment
            _ => whoami::username(),
        };
        Self { username }
    }
}

// -------------------------------------------------------------------------------------------------
// Planning and execution
// -------------------------------------------------------------------------------------------------

/// How a command will be run: directly, or through privilege escalation as another user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Invocation {
    Direct { argv: Vec<OsString> },
    Escalated { user: String, argv: Vec<OsString> },
}

/// Decides the execution path for running `argv` as `user`.
///
/// Escalating to one's own identity is unnecessary and handles the environment differently
/// from direct execution, so the same-user case deliberately short-circuits.
pub(crate) fn plan_exec(context: &ExecContext, user: &str, argv: Vec<OsString>) -> Invocation {
    if user == context.username {
        Invocation::Direct { argv }
    } else {
        Invocation::Escalated {
            user: user.to_string(),
            argv,
        }
    }
}

/// Runs a planned invocation, passing the child's exit status through unchanged.
///
/// Arguments are preserved token-for-token on both paths; no shell re-interpretation happens in
/// between.
pub(crate) async fn run_invocation(
    pm: &PrivilegeManager,
    invocation: Invocation,
) -> Result<ExitStatus> {
    match invocation {
        Invocation::Direct { argv } => {
            ensure!(!argv.is_empty(), "No command given");
            debug!("Running command directly: {:?}", argv);
            exec_status(&argv[0], &argv[1..]).await
        }
        Invocation::Escalated { user, argv } => {
            ensure!(!argv.is_empty(), "No command given");
            debug!("Running command as '{}': {:?}", user, argv);
            pm.sudo_exec_as(&user, &argv).await
        }
    }
}

//
// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::sudo::{GetRootCmd, PrivilegeManagerBuilder};

    fn argv(parts: &[&str]) -> Vec<OsString> {
        parts.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_plan_exec_same_user_is_direct() {
        let context = ExecContext {
            username: "deploy".to_string(),
        };
        let plan = plan_exec(&context, "deploy", argv(&["ls", "-l", "/srv"]));
        assert_eq!(
            plan,
            Invocation::Direct {
                argv: argv(&["ls", "-l", "/srv"])
            }
        );
    }

    #[test]
    fn test_plan_exec_other_user_is_escalated() {
        let context = ExecContext {
            username: "root".to_string(),
        };
        let plan = plan_exec(&context, "deploy", argv(&["ls", "-l", "some dir"]));
        // Argument tokens survive unchanged, including the one with a space
        assert_eq!(
            plan,
            Invocation::Escalated {
                user: "deploy".to_string(),
                argv: argv(&["ls", "-l", "some dir"])
            }
        );
    }

    #[tokio::test]
    async fn test_run_invocation_direct_passes_status_through() -> Result<()> {
        let pm = PrivilegeManagerBuilder::default()
            .with_use_sudo(false)
            .with_root_cmd(GetRootCmd::use_sudo())
            .build()?;

        let ok = run_invocation(&pm, Invocation::Direct { argv: argv(&["true"]) }).await?;
        assert!(ok.success());

        let failed = run_invocation(&pm, Invocation::Direct { argv: argv(&["false"]) }).await?;
        assert_eq!(failed.code(), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_run_invocation_rejects_empty_command() -> Result<()> {
        let pm = PrivilegeManagerBuilder::default()
            .with_use_sudo(false)
            .with_root_cmd(GetRootCmd::use_sudo())
            .build()?;
        assert!(
            run_invocation(&pm, Invocation::Direct { argv: vec![] })
                .await
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn test_current_context_has_a_name() {
        assert!(!ExecContext::current().username.is_empty());
    }
}
