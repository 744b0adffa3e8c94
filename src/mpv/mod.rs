//! MPV IPC module - launches the external MPV player for playback links and
//! polls its position over JSON IPC.
//!
//! Architecture:
//! - `uri.rs` - `mpv://` / `mpvs://` link parsing
//! - `command.rs` - MPV command-line construction
//! - `process.rs` - MPV binary detection and process spawning
//! - `protocol.rs` - JSON command/response types and line framing
//! - `ipc.rs` - Polling IPC client (Named Pipes on Windows, Unix Sockets on Linux/macOS)
//! - `client.rs` - Dispatch of a link to a supervised player session

mod client;
mod command;
mod ipc;
mod process;
mod protocol;
mod uri;

pub use client::{handle_uri, launch_player, MpvError, PlayerEvent, PlayerOptions, PlayerProcessHandle};
pub use command::{build_args, redact_args, AuthCredential};
pub use ipc::{IpcConnectionState, IpcError, IpcPollingClient, PollConfig, ReconnectPolicy};
pub use process::{find_mpv, ipc_endpoint, launch, resolve_mpv, PlayerProcess, ProcessError};
pub use protocol::{LineBuffer, MpvCommand, MpvResponse};
pub use uri::{ParseError, PlaybackRequest};
