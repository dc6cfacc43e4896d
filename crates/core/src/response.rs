//! Response types exchanged between the fetch executor, the store and callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An HTTP-shaped response: status, headers and the full body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    /// Header name/value pairs in arrival order. Repeated names are kept.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self { status, headers, body }
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response as persisted in a cache generation.
///
/// Written wholesale and never patched; a refresh replaces the entire row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
    pub fn from_response(response: HttpResponse, stored_at: DateTime<Utc>) -> Self {
        Self { status: response.status, headers: response.headers, body: response.body, stored_at }
    }

    /// Stamp a response with the current time.
    pub fn now(response: HttpResponse) -> Self {
        Self::from_response(response, Utc::now())
    }

    pub fn to_response(&self) -> HttpResponse {
        HttpResponse { status: self.status, headers: self.headers.clone(), body: self.body.clone() }
    }

    pub fn into_response(self) -> HttpResponse {
        HttpResponse { status: self.status, headers: self.headers, body: self.body }
    }
}
