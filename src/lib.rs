//! Launches mpv for `mpv://` / `mpvs://` links and reports playback position
//! back to the host application over mpv's JSON IPC.

mod config;
pub mod mpv;
pub mod probe;

pub use config::{AppConfig, ConfigError};
pub use mpv::{handle_uri, launch_player, AuthCredential, PlayerEvent, PlayerOptions};
pub use probe::{probe, select_base_url};
