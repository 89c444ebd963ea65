//! Stdio transport for filter plugin child processes
//!
//! [`StdioTransport`] spawns a plugin executable and talks to it over its
//! stdin/stdout pipes using newline-delimited framing.
//!
//! - Outbound lines are written to the child's stdin followed by `\n`.
//! - Inbound lines are read from the child's stdout with the newline
//!   stripped; the first one is the handshake.
//! - The child's stderr is logged via `tracing::debug!` and never treated as
//!   an error condition.
//!
//! The parent environment is inherited and the magic cookie variable is
//! added on top. [`StdioTransport::shutdown`] kills and reaps the child;
//! dropping the transport additionally sends SIGTERM (Unix) if the child is
//! still known to be alive.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

use crate::error::{CtMonitorError, Result};
use crate::filter::{MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE};

/// Child-process transport for one plugin invocation.
#[derive(Debug)]
pub struct StdioTransport {
    executable: PathBuf,
    /// `send()` writes here; a background task forwards to the child's stdin.
    stdin_tx: mpsc::UnboundedSender<String>,
    /// Lines read from the child's stdout.
    stdout_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    child: Arc<Mutex<Child>>,
}

impl StdioTransport {
    /// Spawn `executable` with piped stdio and start the pump tasks.
    ///
    /// # Errors
    ///
    /// Returns `CtMonitorError::FilterSpawn` if the process cannot be started
    /// or its pipes are unavailable.
    pub fn spawn(executable: &Path) -> Result<Self> {
        let mut cmd = Command::new(executable);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            CtMonitorError::FilterSpawn(format!(
                "failed to spawn filter `{}`: {}",
                executable.display(),
                e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CtMonitorError::FilterSpawn("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CtMonitorError::FilterSpawn("child stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CtMonitorError::FilterSpawn("child stderr unavailable".into()))?;

        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = stdin_rx.recv().await {
                let line = format!("{}\n", msg);
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if stdout_tx.send(line).is_err() {
                    break;
                }
            }
        });

        let name = executable.display().to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(
                    target: "ct_monitor::filter::transport",
                    filter = %name,
                    "filter stderr: {}",
                    line
                );
            }
        });

        Ok(Self {
            executable: executable.to_path_buf(),
            stdin_tx,
            stdout_rx: Arc::new(Mutex::new(stdout_rx)),
            child: Arc::new(Mutex::new(child)),
        })
    }

    /// Queue one line for the child's stdin.
    ///
    /// # Errors
    ///
    /// Returns `CtMonitorError::FilterRpc` if the writer task has exited.
    pub fn send(&self, message: String) -> Result<()> {
        self.stdin_tx.send(message).map_err(|e| {
            CtMonitorError::FilterRpc(format!(
                "stdin of `{}` closed: {}",
                self.executable.display(),
                e
            ))
            .into()
        })
    }

    /// Stream of lines read from the child's stdout. Ends when the child
    /// closes stdout.
    pub fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.stdout_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    /// Kill the child and wait for it to be reaped.
    pub async fn shutdown(&self) {
        let mut child = self.child.lock().await;
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(
                    filter = %self.executable.display(),
                    %status,
                    "Filter process already exited"
                );
            }
            _ => {
                if let Err(e) = child.kill().await {
                    tracing::debug!(
                        filter = %self.executable.display(),
                        error = %e,
                        "Failed to kill filter process"
                    );
                }
            }
        }
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        // Skip if the lock is held elsewhere; kill_on_drop still applies.
        if let Ok(mut child) = self.child.try_lock() {
            if let Ok(Some(_)) = child.try_wait() {
                return;
            }
            #[cfg(unix)]
            {
                if let Some(pid) = child.id() {
                    // SAFETY: pid belongs to a child we spawned and have not reaped.
                    unsafe {
                        libc::kill(pid as libc::pid_t, libc::SIGTERM);
                    }
                }
            }
            #[cfg(not(unix))]
            {
                let _ = child.start_kill();
            }
        }
    }
}
