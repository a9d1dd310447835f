//! Managed CoreNLP server process
//!
//! `ServerSupervisor` owns the child process and the temp files capturing its
//! output. Teardown happens in `stop()` or, failing that, on drop, so the
//! child dies on error and panic paths too. Only one managed server may be
//! alive per host process.

use crate::config::ServerConfig;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::process::{Child, Command};

/// Set while a managed server is alive anywhere in this process
static SERVER_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Errors from launching or supervising the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("CoreNLP files not found at {path}. Run `kindred download` first")]
    ResourceMissing { path: PathBuf },

    #[error("A managed CoreNLP server is already running in this process")]
    AlreadyRunning,

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to connect to launched CoreNLP server at {url} after {attempts} attempts: {reason}")]
    Connectivity {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Process-wide claim on the single managed server slot
#[derive(Debug)]
struct ServerClaim;

impl ServerClaim {
    fn acquire() -> Option<Self> {
        SERVER_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ServerClaim)
    }
}

impl Drop for ServerClaim {
    fn drop(&mut self) {
        SERVER_CLAIMED.store(false, Ordering::Release);
    }
}

/// Owner of a running CoreNLP child process
#[derive(Debug)]
pub struct ServerSupervisor {
    child: Option<Child>,
    stdout: Option<File>,
    stderr: Option<File>,
    url: String,
    claim: Option<ServerClaim>,
}

impl ServerSupervisor {
    /// Launch the server from `server_dir` and wait until it answers.
    ///
    /// Fails with `ResourceMissing` if the directory doesn't exist and with
    /// `Connectivity` if no health check succeeds; the child is killed before
    /// returning an error.
    pub async fn start(server_dir: &Path, config: &ServerConfig) -> ServerResult<Self> {
        if !server_dir.is_dir() {
            return Err(ServerError::ResourceMissing {
                path: server_dir.to_path_buf(),
            });
        }

        let claim = ServerClaim::acquire().ok_or(ServerError::AlreadyRunning)?;

        let stdout = tempfile::tempfile()?;
        let stderr = tempfile::tempfile()?;

        let args = config.command_args();
        tracing::info!(
            dir = %server_dir.display(),
            "Launching {} {}",
            config.program,
            args.join(" ")
        );

        let child = Command::new(&config.program)
            .args(&args)
            .current_dir(server_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout.try_clone()?))
            .stderr(Stdio::from(stderr.try_clone()?))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ServerError::Spawn {
                program: config.program.clone(),
                source,
            })?;

        let mut supervisor = Self {
            child: Some(child),
            stdout: Some(stdout),
            stderr: Some(stderr),
            url: config.health_url(),
            claim: Some(claim),
        };

        if let Err(e) = supervisor.wait_until_ready(config).await {
            if let Some(captured) = supervisor.captured_stderr() {
                tracing::warn!(stderr = %captured.trim_end(), "CoreNLP server failed to start");
            }
            supervisor.stop().await;
            return Err(e);
        }

        tracing::info!(url = %supervisor.url, pid = ?supervisor.pid(), "CoreNLP server ready");
        Ok(supervisor)
    }

    /// Poll the health URL; any HTTP response counts as alive.
    async fn wait_until_ready(&mut self, config: &ServerConfig) -> ServerResult<()> {
        let http = reqwest::Client::builder()
            .timeout(config.health_check_interval.max(std::time::Duration::from_secs(1)))
            .build()?;

        let mut last_error = String::from("no attempts made");
        for attempt in 1..=config.health_check_attempts {
            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    return Err(ServerError::Connectivity {
                        url: self.url.clone(),
                        attempts: attempt - 1,
                        reason: format!("server process exited with {}", status),
                    });
                }
            }

            match http.get(&self.url).send().await {
                Ok(_) => {
                    tokio::time::sleep(config.startup_grace).await;
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "Health check failed");
                    last_error = e.to_string();
                    tokio::time::sleep(config.health_check_interval).await;
                }
            }
        }

        Err(ServerError::Connectivity {
            url: self.url.clone(),
            attempts: config.health_check_attempts,
            reason: last_error,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Whether the child is still alive
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Everything the server wrote to stderr so far
    pub fn captured_stderr(&self) -> Option<String> {
        read_captured(self.stderr.as_ref()?)
    }

    /// Everything the server wrote to stdout so far
    pub fn captured_stdout(&self) -> Option<String> {
        read_captured(self.stdout.as_ref()?)
    }

    /// Kill the child and release the captured output. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            tracing::info!(pid = ?child.id(), "Stopping CoreNLP server");
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill CoreNLP server");
            }
        }
        self.stdout = None;
        self.stderr = None;
        self.claim = None;
    }
}

impl Drop for ServerSupervisor {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            tracing::debug!(pid = ?child.id(), "Killing CoreNLP server on drop");
            let _ = child.start_kill();
        }
    }
}

fn read_captured(file: &File) -> Option<String> {
    let mut handle = file.try_clone().ok()?;
    handle.seek(SeekFrom::Start(0)).ok()?;
    let mut out = String::new();
    handle.read_to_string(&mut out).ok()?;
    Some(out)
}
