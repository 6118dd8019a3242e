//! Cached response entries

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// A response stored in a named cache.
///
/// The body is fully buffered, so cloning an entry is cheap and hands out
/// the same underlying bytes.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// When the entry was written to the cache
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Create a new entry stamped with the current time
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            stored_at: Utc::now(),
        }
    }

    /// Create a `200 OK` entry with no headers
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, HeaderMap::new(), body.into())
    }

    /// Whether the status is in the 2xx range
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }
}

impl From<http::Response<Bytes>> for CachedResponse {
    fn from(response: http::Response<Bytes>) -> Self {
        let (parts, body) = response.into_parts();
        Self::new(parts.status, parts.headers, body)
    }
}

impl From<CachedResponse> for http::Response<Bytes> {
    fn from(entry: CachedResponse) -> Self {
        let mut response = http::Response::new(entry.body);
        *response.status_mut() = entry.status;
        *response.headers_mut() = entry.headers;
        response
    }
}

/// Serialized form of an entry's head
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EntryMetadata {
    pub key: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub stored_at: DateTime<Utc>,
}

impl EntryMetadata {
    pub fn from_response(key: &str, response: &CachedResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Self {
            key: key.to_string(),
            status: response.status.as_u16(),
            headers,
            stored_at: response.stored_at,
        }
    }

    pub fn into_response(self, body: Bytes) -> Result<CachedResponse, StorageError> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|_| StorageError::InvalidHeader(format!("status {}", self.status)))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| StorageError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|_| StorageError::InvalidHeader(format!("{}: {}", name, value)))?;
            headers.append(name, value);
        }

        Ok(CachedResponse {
            status,
            headers,
            body,
            stored_at: self.stored_at,
        })
    }
}
