//! Polling IPC connection to MPV.
//!
//! Handles platform-specific socket/pipe connections and periodically asks the
//! player for `playback-time`, forwarding positive positions as
//! [`PlayerEvent::PositionChanged`].

use std::sync::Arc;
use std::time::Duration;

use async_channel::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::client::PlayerEvent;
use super::protocol::{LineBuffer, MpvCommand, MpvMessage, PLAYBACK_TIME};

#[derive(Error, Debug)]
pub enum IpcError {
  #[error("Connection failed: {0}")]
  ConnectionFailed(String),
  #[error("IPC I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Failed to encode command: {0}")]
  Encode(#[from] serde_json::Error),
  #[error("Connection closed by MPV")]
  Closed,
}

/// Lifecycle of one polling client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcConnectionState {
  Disconnected,
  Connecting,
  Connected,
  Polling,
  Closed,
}

/// What to do when the channel cannot be opened or drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ReconnectPolicy {
  /// Give up silently.
  #[default]
  None,
  /// Retry after a constant delay.
  #[serde(rename_all = "camelCase")]
  Fixed { delay_ms: u64, max_attempts: u32 },
  /// Retry with a doubling delay capped at `max_delay_ms`.
  #[serde(rename_all = "camelCase")]
  Backoff {
    initial_ms: u64,
    max_delay_ms: u64,
    max_attempts: u32,
  },
}

impl ReconnectPolicy {
  /// Delay before retry number `attempt` (1-based), or `None` to give up.
  pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
    match *self {
      ReconnectPolicy::None => None,
      ReconnectPolicy::Fixed {
        delay_ms,
        max_attempts,
      } => (attempt <= max_attempts).then(|| Duration::from_millis(delay_ms)),
      ReconnectPolicy::Backoff {
        initial_ms,
        max_delay_ms,
        max_attempts,
      } => {
        if attempt > max_attempts {
          return None;
        }
        let factor = 1u64 << attempt.saturating_sub(1).min(32);
        let delay = initial_ms.saturating_mul(factor).min(max_delay_ms);
        Some(Duration::from_millis(delay))
      }
    }
  }
}

/// Timing of the polling client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
  /// Grace period between spawn and the first connection attempt.
  pub connect_delay: Duration,
  /// Period of the `playback-time` query.
  pub poll_interval: Duration,
  pub reconnect: ReconnectPolicy,
}

impl Default for PollConfig {
  fn default() -> Self {
    Self {
      connect_delay: Duration::from_millis(500),
      poll_interval: Duration::from_millis(3000),
      reconnect: ReconnectPolicy::None,
    }
  }
}

#[cfg(unix)]
type IpcStream = tokio::net::UnixStream;
#[cfg(windows)]
type IpcStream = tokio::net::windows::named_pipe::NamedPipeClient;

#[cfg(windows)]
async fn try_connect(path: &str) -> Result<IpcStream, IpcError> {
  use tokio::net::windows::named_pipe::ClientOptions;

  ClientOptions::new()
    .open(path)
    .map_err(|e| IpcError::ConnectionFailed(format!("Failed to open pipe: {}", e)))
}

#[cfg(unix)]
async fn try_connect(path: &str) -> Result<IpcStream, IpcError> {
  tokio::net::UnixStream::connect(path)
    .await
    .map_err(|e| IpcError::ConnectionFailed(e.to_string()))
}

/// Best-effort view of the player's position, refreshed by polling.
///
/// The background task is the only writer of the connection state; other
/// code observes it through [`IpcPollingClient::subscribe_state`].
pub struct IpcPollingClient {
  endpoint: String,
  config: PollConfig,
  events: Sender<PlayerEvent>,
  state_tx: Arc<watch::Sender<IpcConnectionState>>,
  state_rx: watch::Receiver<IpcConnectionState>,
  cancel_token: CancellationToken,
  task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl IpcPollingClient {
  pub fn new(endpoint: impl Into<String>, config: PollConfig, events: Sender<PlayerEvent>) -> Self {
    let (state_tx, state_rx) = watch::channel(IpcConnectionState::Disconnected);
    Self {
      endpoint: endpoint.into(),
      config,
      events,
      state_tx: Arc::new(state_tx),
      state_rx,
      cancel_token: CancellationToken::new(),
      task_handle: Mutex::new(None),
    }
  }

  /// Start polling in the background.
  ///
  /// Has no effect once started or stopped.
  pub fn start(&self) {
    if self.cancel_token.is_cancelled() {
      log::warn!("IPC client for {} already stopped", self.endpoint);
      return;
    }
    let mut handle = self.task_handle.lock();
    if handle.is_some() {
      return;
    }

    let poller = Poller {
      endpoint: self.endpoint.clone(),
      config: self.config,
      events: self.events.clone(),
      state: self.state_tx.clone(),
      cancel_token: self.cancel_token.clone(),
      request_id: 0,
      last_sent: None,
      lines: LineBuffer::new(),
    };
    *handle = Some(tokio::spawn(poller.run()));
  }

  /// Stop polling and release the channel.
  ///
  /// Safe in any state and idempotent.
  pub async fn stop(&self) {
    self.cancel_token.cancel();

    // Take the handle without holding the lock across await
    let handle = self.task_handle.lock().take();
    match handle {
      Some(mut handle) => {
        if tokio::time::timeout(Duration::from_secs(2), &mut handle)
          .await
          .is_err()
        {
          log::warn!("IPC poller did not stop in time, aborting");
          handle.abort();
          self.state_tx.send_replace(IpcConnectionState::Closed);
        }
      }
      None => {
        self.state_tx.send_replace(IpcConnectionState::Closed);
      }
    }
  }

  /// Current connection state.
  pub fn state(&self) -> IpcConnectionState {
    *self.state_rx.borrow()
  }

  /// Receiver notified on every state transition.
  pub fn subscribe_state(&self) -> watch::Receiver<IpcConnectionState> {
    self.state_rx.clone()
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }
}

impl Drop for IpcPollingClient {
  fn drop(&mut self) {
    self.cancel_token.cancel();
  }
}

/// State owned by the background task.
struct Poller {
  endpoint: String,
  config: PollConfig,
  events: Sender<PlayerEvent>,
  state: Arc<watch::Sender<IpcConnectionState>>,
  cancel_token: CancellationToken,
  request_id: i64,
  last_sent: Option<i64>,
  lines: LineBuffer,
}

impl Poller {
  fn set_state(&self, next: IpcConnectionState) {
    self.state.send_if_modified(|current| {
      if *current == next {
        return false;
      }
      log::debug!("IPC {}: {:?} -> {:?}", self.endpoint, current, next);
      *current = next;
      true
    });
  }

  async fn run(mut self) {
    // Wait a bit for MPV to create the socket
    tokio::select! {
      _ = self.cancel_token.cancelled() => {
        self.set_state(IpcConnectionState::Closed);
        return;
      }
      _ = tokio::time::sleep(self.config.connect_delay) => {}
    }

    let mut failures: u32 = 0;
    loop {
      self.set_state(IpcConnectionState::Connecting);

      let connected = tokio::select! {
        _ = self.cancel_token.cancelled() => break,
        result = try_connect(&self.endpoint) => result,
      };

      let result = match connected {
        Ok(stream) => {
          log::info!("Connected to MPV IPC at {}", self.endpoint);
          failures = 0;
          self.set_state(IpcConnectionState::Connected);
          self.poll_stream(stream).await
        }
        Err(e) => Err(e),
      };

      match result {
        Ok(()) => break,
        Err(e) => {
          log::info!("MPV IPC at {} unavailable: {}", self.endpoint, e);
          failures += 1;
          let Some(delay) = self.config.reconnect.delay_for(failures) else {
            break;
          };
          log::info!("Reconnecting to MPV IPC in {:?} (attempt {})", delay, failures);
          tokio::select! {
            _ = self.cancel_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
          }
        }
      }
    }

    self.set_state(IpcConnectionState::Closed);
    log::info!("MPV IPC poller for {} closed", self.endpoint);
  }

  /// Poll over an open channel until it fails or the client is stopped.
  ///
  /// Returns `Ok(())` only when stopped.
  async fn poll_stream<S>(&mut self, stream: S) -> Result<(), IpcError>
  where
    S: AsyncRead + AsyncWrite,
  {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut ticker = tokio::time::interval(self.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buf = [0u8; 4096];
    self.lines.clear();

    loop {
      tokio::select! {
        _ = self.cancel_token.cancelled() => return Ok(()),
        _ = ticker.tick() => {
          self.request_id += 1;
          let line = MpvCommand::get_property_string(PLAYBACK_TIME, self.request_id).to_line()?;
          let write = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
          };
          tokio::select! {
            _ = self.cancel_token.cancelled() => return Ok(()),
            written = write => written?,
          }
          self.last_sent = Some(self.request_id);
          self.set_state(IpcConnectionState::Polling);
        }
        read = reader.read(&mut buf) => {
          let n = read?;
          if n == 0 {
            return Err(IpcError::Closed);
          }
          for line in self.lines.push(&buf[..n]) {
            self.handle_line(&line);
          }
        }
      }
    }
  }

  fn handle_line(&self, line: &str) {
    match MpvMessage::parse(line) {
      Ok(MpvMessage::Response(response)) => {
        if Some(response.request_id) != self.last_sent {
          log::debug!(
            "Discarding stale MPV response request_id={} (expected {:?})",
            response.request_id,
            self.last_sent
          );
          return;
        }
        match response.position_seconds() {
          Some(position) => {
            if self.events.try_send(PlayerEvent::PositionChanged(position)).is_err() {
              log::debug!("No listener for position {}", position);
            }
          }
          None => log::debug!("No usable position in MPV response: {}", line),
        }
      }
      Ok(MpvMessage::Event(event)) => {
        log::debug!("Ignoring MPV event {}", event.event);
      }
      Err(e) => {
        log::warn!("Failed to parse MPV message: {} - {}", e, line);
      }
    }
  }
}
