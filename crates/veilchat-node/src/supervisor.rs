//! Crypto engine sidecar supervision.
//!
//! [`EngineSupervisor`] owns the lifecycle of the `veilchat-engine`
//! child process: port allocation, spawn, log capture, and teardown.
//! At most one sidecar is live at a time; start and stop serialize
//! on an internal lock.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use veilchat_types::{Result, VeilError};

/// File name of the sidecar binary.
#[cfg(windows)]
const ENGINE_BIN: &str = "veilchat-engine.exe";
#[cfg(not(windows))]
const ENGINE_BIN: &str = "veilchat-engine";

/// Handle to the live sidecar; cancelling the token kills the child.
struct EngineHandle {
    port: u16,
    cancel: CancellationToken,
    /// Start counter linking the handle to its exit watcher.
    generation: u64,
}

/// Supervises the crypto engine child process.
pub struct EngineSupervisor {
    binary_dir: PathBuf,
    inner: Arc<Mutex<Option<EngineHandle>>>,
    generation: AtomicU64,
}

impl EngineSupervisor {
    /// Creates a supervisor looking for the sidecar binary next to
    /// the workspace build output (`target/debug`).
    pub fn new() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_binary_dir(cwd.join("target").join("debug"))
    }

    /// Creates a supervisor with an explicit binary directory.
    pub fn with_binary_dir(binary_dir: PathBuf) -> Self {
        Self {
            binary_dir,
            inner: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// Whether a sidecar is currently supervised.
    pub fn is_running(&self) -> bool {
        self.inner.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// The port of the live sidecar, if any.
    pub fn port(&self) -> Option<u16> {
        self.inner.lock().ok().and_then(|g| g.as_ref().map(|h| h.port))
    }

    /// Starts the sidecar: allocates a free loopback port, spawns
    /// the binary with `--port`, and wires up log capture plus an
    /// exit watcher. Returns the allocated port.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`VeilError::Spawn`] if a sidecar is already running or the
    ///   process cannot be started.
    /// - [`VeilError::NotFound`] if the binary is missing; the error
    ///   hint names the build command that produces it.
    ///
    /// All of these are soft failures: the caller logs them and the
    /// node keeps running without crypto features.
    pub fn start(&self) -> Result<u16> {
        let mut guard = self.inner.lock().map_err(|_| VeilError::Spawn {
            reason: "supervisor lock poisoned".into(),
        })?;
        if guard.is_some() {
            return Err(VeilError::Spawn {
                reason: "crypto engine already running".into(),
            });
        }

        let binary = self.binary_dir.join(ENGINE_BIN);
        if !binary.is_file() {
            return Err(VeilError::NotFound {
                reason: format!("crypto engine binary not found at {}", binary.display()),
                hint: "run `cargo build -p veilchat-engine` first".into(),
            });
        }

        let port = allocate_free_port()?;

        let mut child = Command::new(&binary)
            .arg("--port")
            .arg(port.to_string())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VeilError::Spawn {
                reason: format!("failed to spawn {}: {e}", binary.display()),
            })?;

        tracing::info!(port, binary = %binary.display(), "crypto engine started");

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, true));
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let watcher_cancel = cancel.clone();
        let watcher_inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = watcher_cancel.cancelled() => {
                    match child.kill().await {
                        Ok(()) => tracing::info!("crypto engine terminated"),
                        Err(e) => tracing::debug!(%e, "crypto engine kill failed (already gone?)"),
                    }
                }
                status = child.wait() => {
                    match status {
                        Ok(status) => tracing::warn!(%status, "crypto engine exited on its own"),
                        Err(e) => tracing::warn!(%e, "crypto engine wait failed"),
                    }
                    // Free the slot so a later start is not blocked by
                    // a dead child. Only our own handle is cleared; a
                    // newer start owns the slot.
                    if let Ok(mut guard) = watcher_inner.lock() {
                        if guard.as_ref().map(|h| h.generation) == Some(generation) {
                            guard.take();
                        }
                    }
                }
            }
        });

        *guard = Some(EngineHandle {
            port,
            cancel,
            generation,
        });
        Ok(port)
    }

    /// Stops the sidecar if one is running. Stopping an already
    /// stopped supervisor is a no-op.
    pub fn stop(&self) {
        let handle = match self.inner.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                tracing::warn!("supervisor lock poisoned during stop");
                return;
            }
        };
        match handle {
            Some(handle) => {
                tracing::info!(port = handle.port, "stopping crypto engine");
                handle.cancel.cancel();
            }
            None => tracing::debug!("no crypto engine running; nothing to stop"),
        }
    }
}

impl Default for EngineSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Asks the OS for a free loopback TCP port. The listener is dropped
/// before the sidecar binds, so a race is possible but harmless: the
/// sidecar fails to bind and the exit watcher reports it.
fn allocate_free_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).map_err(|e| VeilError::Spawn {
        reason: format!("failed to allocate sidecar port: {e}"),
    })?;
    let port = listener
        .local_addr()
        .map_err(|e| VeilError::Spawn {
            reason: format!("failed to read allocated port: {e}"),
        })?
        .port();
    Ok(port)
}

/// Re-emits child output line-by-line under the `engine` log target.
async fn forward_lines<R>(reader: R, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if is_stderr {
                    tracing::error!(target: "engine", "{line}");
                } else {
                    tracing::info!(target: "engine", "{line}");
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(%e, "engine log stream closed");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
