//! Minimal JSON fetcher used to populate the cache from the UI.

use color_eyre::{eyre::eyre, Result};
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::time::Duration;
use url::Url;

#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("rehydrate/", env!("CARGO_PKG_VERSION")))
      .timeout(Duration::from_secs(15))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }

  /// GET `url`. JSON bodies are parsed; anything else is kept as a string.
  pub async fn fetch_json(&self, url: &Url) -> Result<Value> {
    let response = self
      .client
      .get(url.clone())
      .header(ACCEPT, "application/json")
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?
      .error_for_status()
      .map_err(|e| eyre!("{} returned an error: {}", url, e))?;

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body from {}: {}", url, e))?;

    Ok(
      serde_json::from_slice(&body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned())),
    )
  }
}

/// Parse user input into an http(s) URL, defaulting to https.
pub fn parse_url(input: &str) -> Result<Url> {
  let input = input.trim();
  if input.is_empty() {
    return Err(eyre!("No URL given"));
  }

  let candidate = if input.contains("://") {
    input.to_string()
  } else {
    format!("https://{}", input)
  };

  let url = Url::parse(&candidate).map_err(|e| eyre!("Invalid URL '{}': {}", input, e))?;
  match url.scheme() {
    "http" | "https" => Ok(url),
    other => Err(eyre!("Unsupported scheme '{}'", other)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_url_defaults_to_https() {
    let url = parse_url("example.com/api/posts").unwrap();
    assert_eq!(url.as_str(), "https://example.com/api/posts");
  }

  #[test]
  fn test_parse_url_keeps_http() {
    let url = parse_url("  http://localhost:8080/x ").unwrap();
    assert_eq!(url.scheme(), "http");
    assert_eq!(url.port(), Some(8080));
  }

  #[test]
  fn test_parse_url_rejects_other_schemes() {
    assert!(parse_url("file:///etc/passwd").is_err());
    assert!(parse_url("").is_err());
  }
}
