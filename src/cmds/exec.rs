//! Handler for the `exec` command.

use std::ffi::OsString;
use std::os::unix::process::ExitStatusExt;

use color_eyre::Result;

use crate::exec::{ExecContext, plan_exec, run_invocation};
use crate::utils::sudo::PrivilegeManager;

/// Handles `exec`: runs a command as another OS user and passes its exit status through.
pub(crate) async fn exec(
    pm: &PrivilegeManager,
    context: &ExecContext,
    user: &str,
    command: Vec<OsString>,
) -> Result<i32> {
    let invocation = plan_exec(context, user, command);
    let status = run_invocation(pm, invocation).await?;

    // Mirror the shell convention for signal deaths
    Ok(status
        .code()
        .unwrap_or_else(|| status.signal().map_or(1, |sig| 128 + sig)))
}
