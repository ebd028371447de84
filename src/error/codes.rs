//! The partitioned numeric error-code space.
//!
//! | Range       | Meaning                               |
//! |-------------|---------------------------------------|
//! | 1000–1099   | non-specific                          |
//! | 1100–1199   | DNS and name policy                   |
//! | 1200–1299   | TCP                                   |
//! | 1300–1399   | TLS / certificates                    |
//! | 1610–1623   | HTTP/2 GoAway                         |
//! | 1630–1643   | HTTP/2 stream                         |
//! | 1650–1663   | HTTP/2 connection                     |
//! | 1700–1799   | content                               |
//! | 1000+status | HTTP responses with status >= 400     |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Machine-readable error code attached to failed requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    // non specific
    pub const DEFAULT: Self = Self(1000);
    pub const NET_NON_TCP: Self = Self(1010);
    pub const INVALID_URL: Self = Self(1020);
    pub const REQUEST_TIMEOUT: Self = Self(1050);

    // DNS
    pub const DNS: Self = Self(1100);
    pub const DNS_NO_SUCH_HOST: Self = Self(1101);
    pub const BLACKLISTED_IP: Self = Self(1110);
    pub const BLOCKED_HOSTNAME: Self = Self(1111);

    // TCP
    pub const TCP: Self = Self(1200);
    pub const TCP_BROKEN_PIPE: Self = Self(1201);
    pub const NET_UNKNOWN_ERRNO: Self = Self(1202);
    pub const TCP_DIAL: Self = Self(1210);
    pub const TCP_DIAL_TIMEOUT: Self = Self(1211);
    pub const TCP_DIAL_REFUSED: Self = Self(1212);
    pub const TCP_DIAL_UNKNOWN_ERRNO: Self = Self(1213);
    pub const TCP_RESET_BY_PEER: Self = Self(1220);

    // TLS
    pub const TLS: Self = Self(1300);
    pub const TLS_HEADER: Self = Self(1301);
    pub const X509_UNKNOWN_AUTHORITY: Self = Self(1310);
    pub const X509_HOSTNAME: Self = Self(1311);

    // HTTP/2, each partition's base is its "unknown subcode" code
    pub const HTTP2_GO_AWAY: Self = Self(1610);
    pub const HTTP2_STREAM: Self = Self(1630);
    pub const HTTP2_CONNECTION: Self = Self(1650);

    // content
    pub const RESPONSE_DECOMPRESSION: Self = Self(1701);

    /// Synthetic code for a completed response with status >= 400.
    ///
    /// Statuses of 700 and above are not clamped and land past the
    /// content partition.
    pub fn from_status(status: u16) -> Option<Self> {
        (status >= 400).then(|| Self(1000 + u32::from(status)))
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Offset `self` by an in-partition amount.
    pub(crate) const fn offset(self, by: u32) -> Self {
        Self(self.0 + by)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_below_400_have_no_code() {
        assert_eq!(ErrorCode::from_status(200), None);
        assert_eq!(ErrorCode::from_status(399), None);
    }

    #[test]
    fn status_codes_map_into_thousands() {
        assert_eq!(ErrorCode::from_status(404), Some(ErrorCode(1404)));
        assert_eq!(ErrorCode::from_status(500), Some(ErrorCode(1500)));
    }

    #[test]
    fn displays_as_plain_number() {
        assert_eq!(ErrorCode::TCP_DIAL_REFUSED.to_string(), "1212");
    }
}
