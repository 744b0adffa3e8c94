//! Parsing of `mpv://` / `mpvs://` playback links.
//!
//! Grammar: `mpv[s]://<payload>?pos=<digits>[&hasSrt]`

use reqwest::Url;
use thiserror::Error;

const POSITION_MARKER: &str = "?pos=";
const SUBTITLE_MARKER: &str = "&hasSrt";
const SUBTITLE_SUFFIX: &str = ".srt";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
  #[error("Malformed playback URI: {0}")]
  Malformed(&'static str),
}

/// A playback request decoded from a custom-scheme link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
  /// Stream URL with the custom scheme replaced by http/https.
  pub target_url: String,
  /// True for the `mpvs` variant.
  pub secure: bool,
  /// Start offset in seconds, -1 when the link carries no position.
  pub start_position_seconds: i64,
  /// Sidecar subtitle URL, present only for `&hasSrt` links.
  pub subtitle_url: Option<String>,
}

impl PlaybackRequest {
  /// Parse a playback link.
  pub fn parse(uri: &str) -> Result<Self, ParseError> {
    let (secure, rest) = split_scheme(uri)?;

    let marker = rest
      .rfind(POSITION_MARKER)
      .ok_or(ParseError::Malformed("missing ?pos= parameter"))?;
    let payload = &rest[..marker];
    if payload.is_empty() {
      return Err(ParseError::Malformed("empty target"));
    }

    let after = &rest[marker + POSITION_MARKER.len()..];
    let digits_len = after
      .find(|c: char| !c.is_ascii_digit())
      .unwrap_or(after.len());
    let (digits, tail) = after.split_at(digits_len);

    let start_position_seconds = if digits.is_empty() {
      -1
    } else {
      digits
        .parse::<i64>()
        .map_err(|_| ParseError::Malformed("position out of range"))?
    };

    let target_url = format!("{}://{}", if secure { "https" } else { "http" }, payload);
    if Url::parse(&target_url).is_err() {
      return Err(ParseError::Malformed("target is not a valid URL"));
    }

    let subtitle_url = tail
      .starts_with(SUBTITLE_MARKER)
      .then(|| format!("{}{}", target_url, SUBTITLE_SUFFIX));

    Ok(Self {
      target_url,
      secure,
      start_position_seconds,
      subtitle_url,
    })
  }

  /// Start offset, if the link specified one.
  pub fn start_position(&self) -> Option<u64> {
    u64::try_from(self.start_position_seconds).ok()
  }
}

/// Returns whether the link is the secure variant and the text after `://`.
fn split_scheme(uri: &str) -> Result<(bool, &str), ParseError> {
  let (scheme, rest) = uri
    .split_once("://")
    .ok_or(ParseError::Malformed("missing scheme separator"))?;

  if scheme.eq_ignore_ascii_case("mpv") {
    Ok((false, rest))
  } else if scheme.eq_ignore_ascii_case("mpvs") {
    Ok((true, rest))
  } else {
    Err(ParseError::Malformed("unknown scheme"))
  }
}
