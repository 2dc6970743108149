//! Plain (non-escalated) execution of external commands.

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use std::ffi::{OsStr, OsString};
use std::process::ExitStatus;
use tokio::process::Command;

/// Executes a command with inherited stdio and returns its exit status.
///
/// The child shares the terminal and environment of the current process, so its output and
/// prompts reach the user directly.
///
/// # Arguments
///
/// * `cmd` - The command to execute.
/// * `args` - Arguments for the command.
///
/// # Errors
/// Returns an error if the command fails to spawn.
pub(crate) async fn exec_status<C, S, I>(cmd: C, args: I) -> Result<ExitStatus>
where
    C: AsRef<OsStr>,
    S: AsRef<OsStr>,
    I: IntoIterator<Item = S>,
{
    let cmd_os = cmd.as_ref();
    let args_os: Vec<OsString> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();

    let status = Command::new(cmd_os)
        .args(&args_os)
        .status()
        .await
        .wrap_err_with(|| {
            format!(
                "Failed to execute {} {}",
                cmd_os.to_string_lossy(),
                format_args(&args_os)
            )
        })?;

    Ok(status)
}

/// Formats the given arguments into a single string for error messages.
pub(crate) fn format_args<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.iter()
        .map(|s| s.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

//
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exec_status() -> Result<()> {
        assert!(exec_status("test", &["4", "-gt", "0"]).await?.success());
        assert!(!exec_status("test", &["4", "-eq", "0"]).await?.success());
        Ok(())
    }

    #[test]
    fn test_format_args() {
        assert_eq!(format_args(&["-u", "admin", "--"]), "-u admin --");
        assert_eq!(format_args::<&str>(&[]), "");
    }
}
