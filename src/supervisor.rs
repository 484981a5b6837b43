//! Launches serve-tool against an extracted bundle, waits for the emulated API server to become
//! ready, and terminates it cleanly. Modeled on `ServiceManager`'s readiness-polling and
//! SIGTERM/SIGKILL shutdown sequence.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::{info, warn};

use crate::error::SupervisorError;
use crate::model::Diagnostics;

const RING_BUFFER_CAPACITY: usize = 200;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Default)]
struct RingBuffer {
    lines: VecDeque<String>,
}

impl RingBuffer {
    fn push(&mut self, line: String) {
        if self.lines.len() >= RING_BUFFER_CAPACITY {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn tail(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

type SharedBuffer = Arc<Mutex<RingBuffer>>;

/// One running (or exited) serve-tool instance.
pub struct ServeToolHandle {
    child: Mutex<Option<Child>>,
    stdout_buf: SharedBuffer,
    stderr_buf: SharedBuffer,
    pub kubeconfig_path: PathBuf,
    pub pid: Option<u32>,
    binary: PathBuf,
}

impl ServeToolHandle {
    /// Launch serve-tool against `bundle_root`, writing its kubeconfig to `kubeconfig_path`, and
    /// poll until both the kubeconfig file and a kctl readiness probe succeed, or `deadline`
    /// elapses.
    pub async fn start(
        serve_tool_bin: &str,
        bundle_root: &Path,
        kubeconfig_path: &Path,
        kctl_bin: &str,
        deadline: Duration,
    ) -> Result<(Self, bool, Diagnostics), SupervisorError> {
        let binary = which::which(serve_tool_bin).unwrap_or_else(|_| PathBuf::from(serve_tool_bin));

        info!(bin = %binary.display(), bundle = %bundle_root.display(), "starting serve-tool");

        let mut child = Command::new(&binary)
            .arg("serve")
            .arg(bundle_root)
            .arg("--kubeconfig")
            .arg(kubeconfig_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SupervisorError::StartFailed(e.to_string()))?;

        let pid = child.id();
        let stdout_buf: SharedBuffer = Arc::new(Mutex::new(RingBuffer::default()));
        let stderr_buf: SharedBuffer = Arc::new(Mutex::new(RingBuffer::default()));

        if let Some(stdout) = child.stdout.take() {
            spawn_drain(stdout, stdout_buf.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_drain(stderr, stderr_buf.clone());
        }

        let handle = ServeToolHandle {
            child: Mutex::new(Some(child)),
            stdout_buf,
            stderr_buf,
            kubeconfig_path: kubeconfig_path.to_path_buf(),
            pid,
            binary,
        };

        let (api_available, diag) = handle
            .wait_for_ready(kubeconfig_path, kctl_bin, deadline)
            .await;
        Ok((handle, api_available, diag))
    }

    async fn wait_for_ready(
        &self,
        kubeconfig_path: &Path,
        kctl_bin: &str,
        deadline: Duration,
    ) -> (bool, Diagnostics) {
        let start = Instant::now();
        let hard_deadline = start + deadline;
        let mut last_probe_error = None;

        while Instant::now() < hard_deadline {
            if let Some(status) = self.try_wait().await {
                last_probe_error = Some(format!("serve-tool exited early with status {}", status));
                break;
            }

            let kubeconfig_ready = kubeconfig_path
                .metadata()
                .map(|m| m.len() > 0)
                .unwrap_or(false);

            if kubeconfig_ready {
                match probe_kctl(kctl_bin, kubeconfig_path).await {
                    Ok(()) => {
                        info!(elapsed_ms = start.elapsed().as_millis(), "serve-tool API available");
                        return (true, self.diagnostics(start.elapsed(), None).await);
                    }
                    Err(e) => last_probe_error = Some(e),
                }
            }

            sleep(POLL_INTERVAL).await;
        }

        warn!("serve-tool did not become ready within the configured deadline");
        (false, self.diagnostics(start.elapsed(), last_probe_error).await)
    }

    async fn try_wait(&self) -> Option<std::process::ExitStatus> {
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                return Some(status);
            }
        }
        None
    }

    /// Fresh diagnostics snapshot, used by `BundleManager::get_diagnostics`.
    pub async fn current_diagnostics(&self) -> Diagnostics {
        self.diagnostics(Duration::ZERO, None).await
    }

    async fn diagnostics(&self, waited: Duration, last_probe_error: Option<String>) -> Diagnostics {
        let alive = self.try_wait().await.is_none();
        let kubeconfig_meta = self.kubeconfig_path.metadata().ok();

        Diagnostics {
            process_alive: alive,
            stdout_tail: self.stdout_buf.lock().await.tail(),
            stderr_tail: self.stderr_buf.lock().await.tail(),
            kubeconfig_exists: kubeconfig_meta.is_some(),
            kubeconfig_size: kubeconfig_meta.map(|m| m.len()),
            serve_tool_binary: which::which(&self.binary).ok(),
            waited_ms: waited.as_millis(),
            last_probe_error,
        }
    }

    /// Send SIGTERM, wait a grace period, then SIGKILL.
    pub async fn stop(&self, grace: Duration, kill_grace: Duration) {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        match timeout(grace, child.wait()).await {
            Ok(Ok(_)) => info!("serve-tool stopped gracefully"),
            _ => {
                warn!("serve-tool did not stop gracefully, sending SIGKILL");
                let _ = child.kill().await;
                match timeout(kill_grace, child.wait()).await {
                    Ok(Ok(_)) => {}
                    _ => warn!("serve-tool did not exit after SIGKILL"),
                }
            }
        }
    }
}

fn spawn_drain<R>(reader: R, buf: SharedBuffer)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            buf.lock().await.push(line);
        }
    });
}

/// Run a single fresh readiness probe, used by `BundleManager::check_api_available`, which
/// re-checks liveness rather than trusting the cached flag from startup.
pub async fn probe_once(kctl_bin: &str, kubeconfig_path: &Path) -> bool {
    kubeconfig_path.metadata().map(|m| m.len() > 0).unwrap_or(false)
        && probe_kctl(kctl_bin, kubeconfig_path).await.is_ok()
}

async fn probe_kctl(kctl_bin: &str, kubeconfig_path: &Path) -> Result<(), String> {
    let output = timeout(
        Duration::from_secs(5),
        Command::new(kctl_bin)
            .env("KUBECONFIG", kubeconfig_path)
            .args(["get", "--raw=/readyz"])
            .output(),
    )
    .await
    .map_err(|_| "readiness probe timed out".to_string())?
    .map_err(|e| format!("failed to spawn readiness probe: {}", e))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

/// Opportunistically terminate stray serve-tool processes left behind by a prior crashed run.
/// Never touches `skip_pid`, the process this run just spawned.
pub async fn reap_orphans(binary_name: &str, skip_pid: Option<u32>) {
    #[cfg(unix)]
    {
        let output = Command::new("pgrep").arg("-f").arg(binary_name).output().await;
        let Ok(output) = output else { return };
        if !output.status.success() {
            return;
        }
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            if let Ok(pid) = line.trim().parse::<i32>() {
                if Some(pid as u32) == skip_pid {
                    continue;
                }
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;
                if kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok() {
                    warn!(pid, "sent SIGTERM to orphaned serve-tool process");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ring_buffer_drops_oldest_past_capacity() {
        let mut buf = RingBuffer::default();
        for i in 0..(RING_BUFFER_CAPACITY + 10) {
            buf.push(format!("line {}", i));
        }
        assert_eq!(buf.lines.len(), RING_BUFFER_CAPACITY);
        assert_eq!(buf.lines.front().unwrap(), &format!("line {}", 10));
    }

    #[tokio::test]
    async fn start_fails_cleanly_for_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let kubeconfig = dir.path().join("kubeconfig");
        let result = ServeToolHandle::start(
            "definitely-not-a-real-binary-xyz",
            dir.path(),
            &kubeconfig,
            "kubectl",
            Duration::from_millis(200),
        )
        .await;
        assert!(result.is_err());
    }
}
