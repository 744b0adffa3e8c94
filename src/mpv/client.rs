//! High-level playback dispatch: link in, running player and position events out.

use std::path::PathBuf;

use async_channel::Sender;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use super::command::{build_args, redact_args, AuthCredential};
use super::ipc::{IpcConnectionState, IpcPollingClient, PollConfig};
use super::process::{cleanup_ipc, ipc_endpoint, launch, PlayerProcess, ProcessError};
use super::uri::{ParseError, PlaybackRequest};

#[derive(Error, Debug)]
pub enum MpvError {
  #[error("Invalid playback link: {0}")]
  Parse(#[from] ParseError),
  #[error("Process error: {0}")]
  Process(#[from] ProcessError),
}

/// Notifications delivered to the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
  /// Whole seconds of playback, always greater than zero.
  PositionChanged(i64),
  /// The player exited; `None` when no exit code was available.
  Exited(Option<i32>),
}

/// Everything needed to launch the player, passed explicitly per call.
#[derive(Debug, Clone)]
pub struct PlayerOptions {
  pub executable: PathBuf,
  /// Appended after the generated arguments.
  pub extra_args: Vec<String>,
  pub poll: PollConfig,
}

impl PlayerOptions {
  pub fn new(executable: impl Into<PathBuf>) -> Self {
    Self {
      executable: executable.into(),
      extra_args: Vec::new(),
      poll: PollConfig::default(),
    }
  }
}

/// One spawned player and the IPC client watching it.
pub struct PlayerProcessHandle {
  session_id: Uuid,
  endpoint: String,
  request: PlaybackRequest,
  process: PlayerProcess,
  ipc: IpcPollingClient,
  exit_code: Option<Option<i32>>,
  events: Sender<PlayerEvent>,
}

impl PlayerProcessHandle {
  pub fn session_id(&self) -> Uuid {
    self.session_id
  }

  pub fn pid(&self) -> Option<u32> {
    self.process.pid()
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  pub fn request(&self) -> &PlaybackRequest {
    &self.request
  }

  /// Exit code once the process has been waited on.
  pub fn exit_code(&self) -> Option<Option<i32>> {
    self.exit_code
  }

  pub fn ipc_state(&self) -> IpcConnectionState {
    self.ipc.state()
  }

  pub fn subscribe_ipc_state(&self) -> watch::Receiver<IpcConnectionState> {
    self.ipc.subscribe_state()
  }

  /// Wait for the player to exit, then tear down the IPC client.
  ///
  /// Emits [`PlayerEvent::Exited`] once and returns the exit code. The exit
  /// event waits for room on a bounded channel rather than being dropped.
  pub async fn wait(&mut self) -> Option<i32> {
    if let Some(code) = self.exit_code() {
      return code;
    }

    let code = self.process.wait().await;
    self.ipc.stop().await;
    cleanup_ipc(&self.endpoint);

    self.exit_code = Some(code);
    if self.events.send(PlayerEvent::Exited(code)).await.is_err() {
      log::debug!("No listener for exit of session {}", self.session_id);
    }
    log::info!("Playback session {} finished (exit code {:?})", self.session_id, code);
    code
  }

  /// Kill the player and wait for it.
  pub async fn kill(&mut self) -> Option<i32> {
    if self.exit_code().is_none() {
      self.process.kill().await;
    }
    self.wait().await
  }
}

impl Drop for PlayerProcessHandle {
  fn drop(&mut self) {
    cleanup_ipc(&self.endpoint);
  }
}

/// Parse `uri`, spawn the player and start polling its position.
pub fn launch_player(
  uri: &str,
  credential: &AuthCredential,
  options: &PlayerOptions,
  events: Sender<PlayerEvent>,
) -> Result<PlayerProcessHandle, MpvError> {
  let request = PlaybackRequest::parse(uri).inspect_err(|e| {
    log::warn!("Ignoring link {:?}: {}", uri, e);
  })?;
  log::info!(
    "Playing {} (start: {:?}, subtitles: {})",
    request.target_url,
    request.start_position(),
    request.subtitle_url.is_some()
  );

  let session_id = Uuid::new_v4();
  let endpoint = ipc_endpoint(&session_id.simple().to_string());

  let mut args = build_args(&request, credential, &endpoint);
  args.extend(
    options
      .extra_args
      .iter()
      .filter(|arg| !arg.trim().is_empty())
      .cloned(),
  );
  log::info!(
    "{} {}",
    options.executable.display(),
    redact_args(&args).join(" ")
  );

  let process = launch(&options.executable, &args)?;

  let ipc = IpcPollingClient::new(endpoint.clone(), options.poll, events.clone());
  ipc.start();

  Ok(PlayerProcessHandle {
    session_id,
    endpoint,
    request,
    process,
    ipc,
    exit_code: None,
    events,
  })
}

/// Handle one playback link end to end.
///
/// Resolves when the player exits. Position updates and the final exit
/// notification are sent on `events`.
pub async fn handle_uri(
  uri: &str,
  credential: &AuthCredential,
  options: &PlayerOptions,
  events: Sender<PlayerEvent>,
) -> Result<Option<i32>, MpvError> {
  let mut handle = launch_player(uri, credential, options, events)?;
  Ok(handle.wait().await)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn test_malformed_link_spawns_nothing() {
    let (tx, rx) = async_channel::unbounded();
    let options = PlayerOptions::new("/definitely/not/a/real/mpv");
    let result = handle_uri("https://host/video", &AuthCredential::default(), &options, tx).await;
    assert!(matches!(result, Err(MpvError::Parse(_))));
    assert!(rx.is_empty());
  }

  #[tokio::test]
  async fn test_spawn_failure_is_reported_once() {
    let (tx, rx) = async_channel::unbounded();
    let options = PlayerOptions::new("/definitely/not/a/real/mpv");
    let result = handle_uri("mpv://host/video?pos=1", &AuthCredential::default(), &options, tx).await;
    assert!(matches!(
      result,
      Err(MpvError::Process(ProcessError::SpawnFailed(_)))
    ));
    assert!(rx.is_empty());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_exit_is_notified_and_client_closed() {
    let (tx, rx) = async_channel::unbounded();
    // `sh <target-url> ...` fails to open the URL as a script and exits non-zero.
    let mut options = PlayerOptions::new("/bin/sh");
    options.extra_args = vec![String::new(), "  ".into()];
    options.poll = PollConfig {
      connect_delay: Duration::from_millis(10),
      poll_interval: Duration::from_millis(50),
      ..PollConfig::default()
    };

    let mut handle = launch_player(
      "mpvs://host/video?pos=42&hasSrt",
      &AuthCredential::new("u", "p"),
      &options,
      tx,
    )
    .unwrap();

    assert_eq!(handle.request().start_position_seconds, 42);
    assert!(handle.pid().is_some());
    assert!(handle.endpoint().contains(&handle.session_id().simple().to_string()));

    let code = handle.wait().await;
    assert!(matches!(code, Some(c) if c != 0));
    assert_eq!(handle.exit_code(), Some(code));
    assert_eq!(handle.ipc_state(), IpcConnectionState::Closed);
    assert_eq!(rx.recv().await.unwrap(), PlayerEvent::Exited(code));

    // A second wait returns the cached code without a second notification.
    assert_eq!(handle.wait().await, code);
    assert!(rx.is_empty());
  }

  #[cfg(unix)]
  fn quick_options() -> PlayerOptions {
    let mut options = PlayerOptions::new("/bin/sh");
    options.poll = PollConfig {
      connect_delay: Duration::from_millis(10),
      poll_interval: Duration::from_millis(50),
      ..PollConfig::default()
    };
    options
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_exit_waits_for_room_on_bounded_channel() {
    let (tx, rx) = async_channel::bounded(1);
    tx.send(PlayerEvent::PositionChanged(7)).await.unwrap();

    let mut handle = launch_player(
      "mpv://host/video?pos=",
      &AuthCredential::default(),
      &quick_options(),
      tx,
    )
    .unwrap();
    let waiter = tokio::spawn(async move { handle.wait().await });

    let wait = Duration::from_secs(5);
    assert_eq!(
      tokio::time::timeout(wait, rx.recv()).await.unwrap().unwrap(),
      PlayerEvent::PositionChanged(7)
    );
    let code = tokio::time::timeout(wait, waiter).await.unwrap().unwrap();
    assert_eq!(
      tokio::time::timeout(wait, rx.recv()).await.unwrap().unwrap(),
      PlayerEvent::Exited(code)
    );
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_dropping_handle_removes_socket_file() {
    let (tx, _rx) = async_channel::unbounded();
    let handle = launch_player(
      "mpv://host/video?pos=",
      &AuthCredential::default(),
      &quick_options(),
      tx,
    )
    .unwrap();

    let socket = PathBuf::from(handle.endpoint());
    std::fs::write(&socket, b"").unwrap();
    drop(handle);
    assert!(!socket.exists());
  }
}
