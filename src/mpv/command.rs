//! MPV command-line construction.

use std::fmt;

use base64::prelude::*;

use super::uri::PlaybackRequest;

const AUTH_HEADER_PREFIX: &str = "--http-header-fields=Authorization: Basic ";

/// HTTP Basic-Auth credential forwarded to mpv.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthCredential {
  pub login: String,
  pub password: String,
}

impl AuthCredential {
  pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
    Self {
      login: login.into(),
      password: password.into(),
    }
  }

  /// Base64 payload of the `Authorization: Basic` header.
  pub fn basic_token(&self) -> String {
    BASE64_STANDARD.encode(format!("{}:{}", self.login, self.password))
  }
}

impl fmt::Debug for AuthCredential {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AuthCredential")
      .field("login", &self.login)
      .field("password", &"***")
      .finish()
  }
}

/// Build the mpv argument vector for a playback request.
///
/// Order is fixed: target URL, auth header, optional `--start`, optional
/// `--sub-file`, then the IPC server binding. Optional arguments are left out
/// entirely when absent.
pub fn build_args(
  request: &PlaybackRequest,
  credential: &AuthCredential,
  ipc_endpoint: &str,
) -> Vec<String> {
  let mut args = Vec::with_capacity(5);

  args.push(request.target_url.clone());
  args.push(format!("{}{}", AUTH_HEADER_PREFIX, credential.basic_token()));

  if request.start_position_seconds > -1 {
    args.push(format!("--start={}", request.start_position_seconds));
  }

  if let Some(subtitle_url) = &request.subtitle_url {
    args.push(format!("--sub-file={}", subtitle_url));
  }

  args.push(format!("--input-ipc-server={}", ipc_endpoint));

  args.retain(|arg| !arg.is_empty());
  args
}

/// Copy of `args` with the Authorization payload masked, for logging.
pub fn redact_args(args: &[String]) -> Vec<String> {
  args
    .iter()
    .map(|arg| {
      if arg.starts_with(AUTH_HEADER_PREFIX) {
        format!("{}***", AUTH_HEADER_PREFIX)
      } else {
        arg.clone()
      }
    })
    .collect()
}
