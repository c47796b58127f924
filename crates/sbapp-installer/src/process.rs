use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub(crate) fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}

/// Trimmed stdout of a successful command, `None` on any failure.
pub(crate) fn command_stdout(command: &mut Command) -> Option<String> {
    let output = command.output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!stdout.is_empty()).then_some(stdout)
}

/// Runs a command with inherited output, killing it once `cancel` is set.
pub fn run_interruptible(
    command: &mut Command,
    cancel: &CancelToken,
    context_message: &str,
) -> Result<()> {
    let mut child = command
        .stdin(Stdio::null())
        .spawn()
        .with_context(|| format!("{context_message}: command failed to start"))?;

    loop {
        if cancel.is_cancelled() {
            debug!(pid = child.id(), "cancelling subprocess");
            let _ = child.kill();
            let _ = child.wait();
            return Err(anyhow!("{context_message}: cancelled"));
        }
        match child
            .try_wait()
            .with_context(|| format!("{context_message}: failed to poll subprocess"))?
        {
            Some(status) if status.success() => return Ok(()),
            Some(status) => return Err(anyhow!("{context_message}: status={status}")),
            None => thread::sleep(CANCEL_POLL_INTERVAL),
        }
    }
}
