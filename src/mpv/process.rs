//! MPV process detection and spawning.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("MPV executable not found")]
  NotFound,
  #[error("Failed to spawn MPV: {0}")]
  SpawnFailed(#[from] std::io::Error),
}

/// Get the IPC socket/pipe path for one playback session.
pub fn ipc_endpoint(session_id: &str) -> String {
  #[cfg(windows)]
  {
    format!(r"\\.\pipe\mpv-handler-{}", session_id)
  }
  #[cfg(not(windows))]
  {
    std::env::temp_dir()
      .join(format!("mpv-handler-{}.sock", session_id))
      .to_string_lossy()
      .into_owned()
  }
}

/// Remove a leftover socket file for `endpoint`.
pub fn cleanup_ipc(endpoint: &str) {
  #[cfg(not(windows))]
  {
    let _ = std::fs::remove_file(endpoint);
  }
  #[cfg(windows)]
  {
    // Windows named pipes are cleaned up automatically
    let _ = endpoint;
  }
}

/// Pick the configured executable, falling back to auto-detection.
pub fn resolve_mpv(configured: Option<&Path>) -> Result<PathBuf, ProcessError> {
  match configured {
    Some(path) if !path.as_os_str().is_empty() => Ok(path.to_path_buf()),
    _ => find_mpv().ok_or(ProcessError::NotFound),
  }
}

/// Find MPV executable in common locations.
pub fn find_mpv() -> Option<PathBuf> {
  // Check PATH first
  if let Ok(path) = which::which("mpv") {
    return Some(path);
  }

  if let Some(path) = bundled_mpv().filter(|p| p.exists()) {
    return Some(path);
  }

  #[cfg(windows)]
  let common_paths: &[&str] = &[
    r"C:\Program Files\mpv\mpv.exe",
    r"C:\Program Files (x86)\mpv\mpv.exe",
    r"C:\mpv\mpv.exe",
  ];
  #[cfg(target_os = "macos")]
  let common_paths: &[&str] = &[
    "/usr/local/bin/mpv",
    "/opt/homebrew/bin/mpv",
    "/Applications/mpv.app/Contents/MacOS/mpv",
  ];
  #[cfg(not(any(windows, target_os = "macos")))]
  let common_paths: &[&str] = &["/usr/bin/mpv", "/usr/local/bin/mpv"];

  common_paths
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

/// `mpv-binaries/<platform>/mpv` shipped next to our own executable.
fn bundled_mpv() -> Option<PathBuf> {
  let exe = std::env::current_exe().ok()?;
  let dir = exe.parent()?.join("mpv-binaries");

  #[cfg(windows)]
  let path = dir.join("windows-x64").join("mpv.exe");
  #[cfg(target_os = "macos")]
  let path = dir.join("macos").join("mpv");
  #[cfg(not(any(windows, target_os = "macos")))]
  let path = dir.join("linux-x64").join("mpv");

  Some(path)
}

/// A running player process.
pub struct PlayerProcess {
  child: Child,
  pid: Option<u32>,
}

impl PlayerProcess {
  /// OS process identifier.
  pub fn pid(&self) -> Option<u32> {
    self.pid
  }

  /// Wait for the process to exit.
  ///
  /// Returns the exit code, or `None` when the process was ended by a signal
  /// or its status could not be collected.
  pub async fn wait(&mut self) -> Option<i32> {
    match self.child.wait().await {
      Ok(status) => {
        log::info!("MPV process (pid: {:?}) exited with: {}", self.pid, status);
        status.code()
      }
      Err(e) => {
        log::error!("wait() failed: {}", e);
        None
      }
    }
  }

  /// Terminate the process.
  pub async fn kill(&mut self) {
    log::info!("Killing MPV process (pid: {:?})", self.pid);
    if let Err(e) = self.child.kill().await {
      log::error!("kill() failed: {}", e);
    }
  }
}

/// Spawn the player as an independent process.
///
/// Standard streams are inherited so the player stays visible and its own
/// console output is not swallowed.
pub fn launch(executable: &Path, args: &[String]) -> Result<PlayerProcess, ProcessError> {
  let child = Command::new(executable)
    .args(args)
    .stdin(Stdio::inherit())
    .stdout(Stdio::inherit())
    .stderr(Stdio::inherit())
    .spawn()
    .map_err(|e| {
      log::error!("Failed to spawn {:?}: {}", executable, e);
      ProcessError::SpawnFailed(e)
    })?;

  let pid = child.id();
  log::info!("Spawned MPV {:?} (pid: {:?})", executable, pid);

  Ok(PlayerProcess { child, pid })
}
