//! MPV JSON IPC protocol types.
//!
//! Reference: https://mpv.io/manual/master/#json-ipc

use serde::{Deserialize, Serialize};

/// Property polled for the playback position.
pub const PLAYBACK_TIME: &str = "playback-time";

/// Command sent to MPV via IPC.
#[derive(Debug, Clone, Serialize)]
pub struct MpvCommand {
  pub command: Vec<serde_json::Value>,
  pub request_id: i64,
}

impl MpvCommand {
  /// Get a property formatted as a string.
  pub fn get_property_string(name: &str, request_id: i64) -> Self {
    Self {
      command: vec!["get_property_string".into(), name.into()],
      request_id,
    }
  }

  /// Serialize as one newline-terminated wire message.
  pub fn to_line(&self) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(self)?;
    line.push('\n');
    Ok(line)
  }
}

/// Response from MPV for a command.
#[derive(Debug, Clone, Deserialize)]
pub struct MpvResponse {
  /// "success" or error message.
  pub error: String,
  /// Response data (command-specific).
  #[serde(default)]
  pub data: Option<serde_json::Value>,
  /// Matching request ID.
  pub request_id: i64,
}

impl MpvResponse {
  /// Check if the command succeeded.
  pub fn is_success(&self) -> bool {
    self.error == "success"
  }

  /// Whole seconds carried by a `get_property_string` reply.
  ///
  /// Floors the value and yields nothing unless it is strictly positive.
  pub fn position_seconds(&self) -> Option<i64> {
    if !self.is_success() {
      return None;
    }
    let text = self.data.as_ref()?.as_str()?;
    let seconds = text.trim().parse::<f64>().ok()?.floor();
    if !seconds.is_finite() || seconds < 1.0 || seconds > i64::MAX as f64 {
      return None;
    }
    Some(seconds as i64)
  }
}

/// Event broadcast by MPV (`start-file`, `playback-restart`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct MpvEvent {
  pub event: String,
}

/// Message received from MPV IPC (either response or event).
#[derive(Debug, Clone)]
pub enum MpvMessage {
  Response(MpvResponse),
  Event(MpvEvent),
}

impl MpvMessage {
  /// Parse a JSON line from MPV.
  pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.get("request_id").is_some() {
      Ok(MpvMessage::Response(serde_json::from_value(value)?))
    } else {
      Ok(MpvMessage::Event(serde_json::from_value(value)?))
    }
  }
}

/// Largest incomplete line kept between reads.
pub const MAX_PENDING_LINE: usize = 64 * 1024;

/// Splits an inbound byte stream into newline-delimited messages.
#[derive(Debug, Default)]
pub struct LineBuffer {
  pending: Vec<u8>,
}

impl LineBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append `bytes` and drain every complete line, without terminators.
  ///
  /// An incomplete trailing fragment stays buffered for the next call, up to
  /// [`MAX_PENDING_LINE`] bytes; a longer fragment is discarded.
  pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
    self.pending.extend_from_slice(bytes);

    let mut lines = Vec::new();
    while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
      let raw: Vec<u8> = self.pending.drain(..=pos).collect();
      let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
      let line = line.trim();
      if !line.is_empty() {
        lines.push(line.to_string());
      }
    }

    if self.pending.len() > MAX_PENDING_LINE {
      log::warn!(
        "Discarding {} bytes of unterminated MPV output",
        self.pending.len()
      );
      self.pending.clear();
    }
    lines
  }

  /// Bytes of the incomplete fragment currently held.
  pub fn pending_len(&self) -> usize {
    self.pending.len()
  }

  pub fn clear(&mut self) {
    self.pending.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(line: &str) -> MpvResponse {
    match MpvMessage::parse(line).unwrap() {
      MpvMessage::Response(r) => r,
      _ => panic!("Expected response"),
    }
  }

  #[test]
  fn test_command_serialization() {
    let line = MpvCommand::get_property_string(PLAYBACK_TIME, 7)
      .to_line()
      .unwrap();
    assert_eq!(
      line,
      "{\"command\":[\"get_property_string\",\"playback-time\"],\"request_id\":7}\n"
    );
  }

  #[test]
  fn test_response_parsing() {
    let r = response(r#"{"request_id":3,"error":"success","data":"125.912"}"#);
    assert!(r.is_success());
    assert_eq!(r.request_id, 3);
    assert_eq!(r.position_seconds(), Some(125));
  }

  #[test]
  fn test_position_is_floored() {
    let r = response(r#"{"request_id":1,"error":"success","data":"9.999"}"#);
    assert_eq!(r.position_seconds(), Some(9));
  }

  #[test]
  fn test_non_positive_positions_are_suppressed() {
    for data in ["0", "0.75", "-3.2", "nan", "inf", "abc", ""] {
      let line = format!(r#"{{"request_id":1,"error":"success","data":"{}"}}"#, data);
      assert_eq!(response(&line).position_seconds(), None, "data={data}");
    }
  }

  #[test]
  fn test_error_or_missing_data_yields_nothing() {
    let r = response(r#"{"request_id":1,"error":"property unavailable"}"#);
    assert!(!r.is_success());
    assert_eq!(r.position_seconds(), None);

    let r = response(r#"{"request_id":1,"error":"success","data":null}"#);
    assert_eq!(r.position_seconds(), None);

    // Numeric data is not the get_property_string shape.
    let r = response(r#"{"request_id":1,"error":"success","data":12.5}"#);
    assert_eq!(r.position_seconds(), None);
  }

  #[test]
  fn test_event_parsing() {
    match MpvMessage::parse(r#"{"event":"playback-restart"}"#).unwrap() {
      MpvMessage::Event(e) => assert_eq!(e.event, "playback-restart"),
      _ => panic!("Expected event"),
    }
    assert!(MpvMessage::parse("{not json").is_err());
  }

  #[test]
  fn test_line_buffer_keeps_fragments() {
    let mut buf = LineBuffer::new();
    assert!(buf.push(b"{\"request_id\":1,").is_empty());
    assert_eq!(buf.pending_len(), 16);

    let lines = buf.push(b"\"error\":\"success\"}\n{\"event\":\"idle\"}\n{\"req");
    assert_eq!(
      lines,
      vec![
        "{\"request_id\":1,\"error\":\"success\"}".to_string(),
        "{\"event\":\"idle\"}".to_string(),
      ]
    );
    assert_eq!(buf.pending_len(), 5);

    buf.clear();
    assert_eq!(buf.pending_len(), 0);
  }

  #[test]
  fn test_line_buffer_drops_oversized_fragment() {
    let mut buf = LineBuffer::new();
    let chunk = vec![b'x'; MAX_PENDING_LINE / 2];
    assert!(buf.push(&chunk).is_empty());
    assert!(buf.push(&chunk).is_empty());
    assert_eq!(buf.pending_len(), MAX_PENDING_LINE);

    assert!(buf.push(b"x").is_empty());
    assert_eq!(buf.pending_len(), 0);

    // Framing resumes with the next complete line.
    assert_eq!(buf.push(b"{}\n"), vec!["{}".to_string()]);
  }

  #[test]
  fn test_line_buffer_skips_blank_lines() {
    let mut buf = LineBuffer::new();
    assert_eq!(buf.push(b"\n\r\n{}\r\n"), vec!["{}".to_string()]);
  }
}
