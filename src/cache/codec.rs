//! Snapshot codec.
//!
//! A snapshot is a one-line text header followed by a JSON payload:
//!
//! ```text
//! rehydrate/<version> <payload-len> <sha256-hex>\n<payload>
//! ```
//!
//! The format tag comes first so a reader can reject an unknown version before
//! looking at anything else. The length and checksum let truncated or
//! corrupted blobs fail outright instead of yielding a partial mapping.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::entry::CacheEntry;

/// Magic prefix of every snapshot header.
pub const FORMAT_MAGIC: &str = "rehydrate";

/// Version written by [`encode`] and the only one [`decode`] accepts.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum EncodeError {
  #[error("failed to serialize cache entries: {0}")]
  Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("snapshot is empty")]
  Empty,
  #[error("snapshot header is not terminated")]
  MissingHeader,
  #[error("snapshot does not start with the rehydrate format tag")]
  BadMagic,
  #[error("invalid snapshot header: {0}")]
  InvalidHeader(String),
  #[error("unsupported snapshot format version {found} (supported: {supported})")]
  UnsupportedVersion { found: u32, supported: u32 },
  #[error("snapshot payload is {actual} bytes, header says {expected}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("snapshot checksum mismatch")]
  ChecksumMismatch,
  #[error("failed to parse snapshot payload: {0}")]
  Payload(#[from] serde_json::Error),
}

/// Encode entries into a snapshot blob.
///
/// Output is deterministic: the payload lists keys in sorted order regardless
/// of the input order. Keys are expected to be unique.
pub fn encode(entries: &[(String, CacheEntry)]) -> Result<Vec<u8>, EncodeError> {
  let map: BTreeMap<&str, &CacheEntry> = entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
  let payload = serde_json::to_vec(&map)?;

  let header = format!(
    "{FORMAT_MAGIC}/{FORMAT_VERSION} {} {}\n",
    payload.len(),
    checksum(&payload)
  );

  let mut out = Vec::with_capacity(header.len() + payload.len());
  out.extend_from_slice(header.as_bytes());
  out.extend_from_slice(&payload);
  Ok(out)
}

/// Decode a snapshot blob into entries sorted by key.
///
/// Either the whole mapping is returned or an error is; nothing in between.
pub fn decode(bytes: &[u8]) -> Result<Vec<(String, CacheEntry)>, DecodeError> {
  if bytes.is_empty() {
    return Err(DecodeError::Empty);
  }

  let newline = bytes
    .iter()
    .position(|&b| b == b'\n')
    .ok_or(DecodeError::MissingHeader)?;
  let header = std::str::from_utf8(&bytes[..newline])
    .map_err(|_| DecodeError::InvalidHeader("header is not UTF-8".to_string()))?;
  let payload = &bytes[newline + 1..];

  let mut fields = header.split(' ');

  let tag = fields.next().unwrap_or_default();
  let (magic, version) = tag.split_once('/').ok_or(DecodeError::BadMagic)?;
  if magic != FORMAT_MAGIC {
    return Err(DecodeError::BadMagic);
  }
  let version: u32 = version
    .parse()
    .map_err(|_| DecodeError::InvalidHeader(format!("bad version '{}'", version)))?;
  if version != FORMAT_VERSION {
    return Err(DecodeError::UnsupportedVersion {
      found: version,
      supported: FORMAT_VERSION,
    });
  }

  let expected_len: usize = fields
    .next()
    .and_then(|s| s.parse().ok())
    .ok_or_else(|| DecodeError::InvalidHeader("missing payload length".to_string()))?;
  let expected_sum = fields
    .next()
    .ok_or_else(|| DecodeError::InvalidHeader("missing checksum".to_string()))?;
  if fields.next().is_some() {
    return Err(DecodeError::InvalidHeader("trailing header fields".to_string()));
  }

  if payload.len() != expected_len {
    return Err(DecodeError::LengthMismatch {
      expected: expected_len,
      actual: payload.len(),
    });
  }
  if checksum(payload) != expected_sum {
    return Err(DecodeError::ChecksumMismatch);
  }

  let map: BTreeMap<String, CacheEntry> = serde_json::from_slice(payload)?;
  Ok(map.into_iter().collect())
}

fn checksum(payload: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(payload);
  hex::encode(hasher.finalize())
}
