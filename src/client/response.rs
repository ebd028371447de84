//! What a round trip hands back to the caller.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ErrorCode;

/// How the response body is surfaced.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Text,
    Binary,
    /// Read and discard.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Text(String),
    Binary(Bytes),
}

impl ResponseBody {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}

/// Result of one round trip.
///
/// A failed round trip that did not throw has `status == 0` and carries
/// the classified `error` and `error_code`.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    /// `ip:port` of the peer.
    pub remote_ip: Option<String>,
    pub headers: HeaderMap,
    pub body: Option<ResponseBody>,
    pub error: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub timings_ms: f64,
}

impl Response {
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            Some(ResponseBody::Text(text)) => Some(text),
            _ => None,
        }
    }
}

/// Statuses that never carry a body.
pub(crate) fn has_no_content(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Consume the whole body so the connection can go back to the pool.
pub(crate) async fn read_response_body(
    mut response: reqwest::Response,
    response_type: ResponseType,
) -> std::result::Result<Option<ResponseBody>, reqwest::Error> {
    if has_no_content(response.status()) {
        return Ok(None);
    }
    match response_type {
        ResponseType::Text => Ok(Some(ResponseBody::Text(response.text().await?))),
        ResponseType::Binary => Ok(Some(ResponseBody::Binary(response.bytes().await?))),
        ResponseType::None => {
            while response.chunk().await?.is_some() {}
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_content_statuses() {
        for status in [100, 101, 204, 304] {
            assert!(has_no_content(StatusCode::from_u16(status).unwrap()), "{status}");
        }
        for status in [200, 201, 302, 404] {
            assert!(!has_no_content(StatusCode::from_u16(status).unwrap()), "{status}");
        }
    }

    #[test]
    fn response_type_names() {
        assert_eq!(ResponseType::default(), ResponseType::Text);
        assert_eq!("binary".parse::<ResponseType>().unwrap(), ResponseType::Binary);
        assert_eq!(ResponseType::None.to_string(), "none");
    }
}
