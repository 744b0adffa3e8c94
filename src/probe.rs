//! Server reachability probe used to pick between a LAN and a public address.

use std::time::Duration;

use reqwest::{redirect, Client};

/// Check whether `url` answers a `HEAD` request within `timeout`.
///
/// Any HTTP response counts, whatever its status.
pub async fn probe(url: &str, timeout: Duration) -> bool {
  let client = match Client::builder()
    .timeout(timeout)
    .connect_timeout(timeout)
    .redirect(redirect::Policy::none())
    .no_proxy()
    .build()
  {
    Ok(client) => client,
    Err(e) => {
      log::error!("Failed to create HTTP client: {}", e);
      return false;
    }
  };

  match client.head(url).send().await {
    Ok(response) => {
      log::debug!("{} answered with {}", url, response.status());
      true
    }
    Err(e) if e.is_timeout() => {
      log::info!("Connection timed out for {}", url);
      false
    }
    Err(e) => {
      log::info!("Connection test failed for {}: {}", url, e);
      false
    }
  }
}

/// Prefer `local` when it is reachable, otherwise fall back to `public`.
pub async fn select_base_url<'a>(local: &'a str, public: &'a str, timeout: Duration) -> &'a str {
  if probe(local, timeout).await {
    log::info!("Using local server {}", local);
    local
  } else {
    log::info!("Local server unreachable, using {}", public);
    public
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  const TIMEOUT: Duration = Duration::from_millis(300);

  /// Serve a single canned HTTP response on a random port.
  async fn http_server(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      while let Ok((mut stream, _)) = listener.accept().await {
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf).await;
        let response = format!("{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status_line);
        let _ = stream.write_all(response.as_bytes()).await;
      }
    });
    format!("http://{}/frontend/", addr)
  }

  async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
  }

  #[tokio::test]
  async fn test_any_status_counts_as_reachable() {
    assert!(probe(&http_server("HTTP/1.1 200 OK").await, TIMEOUT).await);
    assert!(probe(&http_server("HTTP/1.1 401 Unauthorized").await, TIMEOUT).await);
    assert!(probe(&http_server("HTTP/1.1 302 Found").await, TIMEOUT).await);
  }

  #[tokio::test]
  async fn test_refused_connection_is_unreachable() {
    assert!(!probe(&refused_url().await, TIMEOUT).await);
  }

  #[tokio::test]
  async fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    let hold = tokio::spawn(async move {
      let (_stream, _) = listener.accept().await.unwrap();
      tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let started = std::time::Instant::now();
    assert!(!probe(&url, TIMEOUT).await);
    assert!(started.elapsed() < Duration::from_secs(3));
    hold.abort();
  }

  #[tokio::test]
  async fn test_invalid_url_is_unreachable() {
    assert!(!probe("not a url", TIMEOUT).await);
  }

  #[tokio::test]
  async fn test_selection_prefers_local() {
    let local = http_server("HTTP/1.1 200 OK").await;
    let public = "https://public.example/frontend/";
    assert_eq!(select_base_url(&local, public, TIMEOUT).await, local);

    let down = refused_url().await;
    assert_eq!(select_base_url(&down, public, TIMEOUT).await, public);
  }
}
