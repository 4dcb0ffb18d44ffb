//! Helpers for external commands and straggler processes.

use crate::error::{PoolError, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::time::Duration;
use tokio::process::Command;

/// Run an external command to completion, capturing output.
///
/// Non-zero exit becomes [`PoolError::CommandFailed`] with the captured
/// stderr, so mount and cgroup failures surface with their actual cause.
pub async fn run_command(program: &str, args: &[&str]) -> Result<()> {
    let command_line = format!("{program} {}", args.join(" "));
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| PoolError::Spawn {
            command: command_line.clone(),
            source,
        })?;
    if !output.status.success() {
        return Err(PoolError::CommandFailed {
            command: command_line,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(())
}

/// Run a command with superuser assistance.
pub async fn sudo(args: &[&str]) -> Result<()> {
    run_command("sudo", args).await
}

/// Kill processes in two phases: SIGTERM, then SIGKILL for whatever is
/// still alive once `grace` has passed.
pub async fn kill_pids(pids: &[i32], grace: Duration) {
    for &pid in pids {
        // ESRCH just means the process beat us to it.
        let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
    }

    let deadline = tokio::time::Instant::now() + grace;
    loop {
        let alive: Vec<i32> = pids
            .iter()
            .copied()
            .filter(|&pid| kill(Pid::from_raw(pid), None).is_ok())
            .collect();
        if alive.is_empty() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            for pid in alive {
                let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
            }
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
