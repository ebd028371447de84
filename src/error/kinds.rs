//! Recognized transport failure kinds.
//!
//! The transport translation layer builds these out of whatever the HTTP
//! stack reports, and [`classify`](super::classify()) recognizes them by
//! type while walking an error's source chain.

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};

use strum::Display;
use thiserror::Error;

use super::codes::ErrorCode;
use super::SharedError;

/// An error that already knows its code and message.
///
/// Classification returns the pair verbatim without looking at `source`.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub code: ErrorCode,
    pub message: String,
    pub source: Option<SharedError>,
}

impl ClassifiedError {
    pub fn new(code: ErrorCode, message: impl Into<String>, source: Option<SharedError>) -> Self {
        Self {
            code,
            message: message.into(),
            source,
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// `Arc<dyn Error>` as a source would hide the concrete type from
// downcasting, so the shared cause is exposed by hand.
impl std::error::Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|err| err.as_ref() as _)
    }
}

/// Name resolution failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("lookup {host}: {kind}")]
pub struct DnsError {
    pub host: String,
    pub kind: DnsErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsErrorKind {
    NoSuchHost,
    Other(String),
}

impl fmt::Display for DnsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchHost => f.write_str("no such host"),
            Self::Other(msg) => f.write_str(msg),
        }
    }
}

/// A resolved address fell inside a blacklisted network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("IP ({ip}) is in a blacklisted range ({network})")]
pub struct BlockedIpError {
    pub ip: IpAddr,
    pub network: String,
}

/// A hostname matched a blocked pattern.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("hostname ({hostname}) is in a blocked pattern ({pattern})")]
pub struct BlockedHostnameError {
    pub hostname: String,
    pub pattern: String,
}

/// Which HTTP/2 layer reported the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Http2ErrorKind {
    GoAway,
    Stream,
    Connection,
}

/// HTTP/2 protocol failure carrying the peer's (or our) error subcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http2Error {
    pub kind: Http2ErrorKind,
    pub code: u32,
}

/// Highest subcode defined by RFC 9113 (`HTTP_1_1_REQUIRED`).
pub const HTTP2_MAX_KNOWN_CODE: u32 = 0xd;

impl Http2Error {
    pub fn new(kind: Http2ErrorKind, code: u32) -> Self {
        Self { kind, code }
    }

    /// Protocol name of the subcode, e.g. `REFUSED_STREAM`.
    pub fn code_name(&self) -> Cow<'static, str> {
        let name = match self.code {
            0x0 => "NO_ERROR",
            0x1 => "PROTOCOL_ERROR",
            0x2 => "INTERNAL_ERROR",
            0x3 => "FLOW_CONTROL_ERROR",
            0x4 => "SETTINGS_TIMEOUT",
            0x5 => "STREAM_CLOSED",
            0x6 => "FRAME_SIZE_ERROR",
            0x7 => "REFUSED_STREAM",
            0x8 => "CANCEL",
            0x9 => "COMPRESSION_ERROR",
            0xa => "CONNECT_ERROR",
            0xb => "ENHANCE_YOUR_CALM",
            0xc => "INADEQUATE_SECURITY",
            0xd => "HTTP_1_1_REQUIRED",
            other => return Cow::Owned(format!("unknown error code 0x{other:x}")),
        };
        Cow::Borrowed(name)
    }
}

impl fmt::Display for Http2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            Http2ErrorKind::GoAway => "received GoAway",
            Http2ErrorKind::Stream => "stream error",
            Http2ErrorKind::Connection => "connection error",
        };
        write!(f, "http2: {what} with http2 ErrCode {}", self.code_name())
    }
}

impl std::error::Error for Http2Error {}

/// Socket operation during which a network error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum NetOp {
    Dial,
    Read,
    Write,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Network {
    Tcp,
    Tcp6,
    Udp,
    Unix,
}

impl Network {
    pub fn is_tcp(self) -> bool {
        matches!(self, Self::Tcp | Self::Tcp6)
    }

    pub fn for_addr(addr: &SocketAddr) -> Self {
        if addr.is_ipv6() {
            Self::Tcp6
        } else {
            Self::Tcp
        }
    }
}

/// A system call failed with an OS error number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallError {
    pub syscall: String,
    pub errno: i32,
}

impl SyscallError {
    pub fn new(syscall: impl Into<String>, errno: i32) -> Self {
        Self {
            syscall: syscall.into(),
            errno,
        }
    }

    /// Portable meaning of the errno on this platform.
    pub fn kind(&self) -> io::ErrorKind {
        io::Error::from_raw_os_error(self.errno).kind()
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.syscall, errno_message(self.errno))
    }
}

impl std::error::Error for SyscallError {}

/// What a [`NetOpError`] wraps.
#[derive(Debug, Clone)]
pub enum OpCause {
    Syscall(SyscallError),
    Errno(i32),
    TimedOut,
    Other(SharedError),
}

impl fmt::Display for OpCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syscall(err) => err.fmt(f),
            Self::Errno(errno) => f.write_str(&errno_message(*errno)),
            Self::TimedOut => f.write_str("i/o timeout"),
            Self::Other(err) => err.fmt(f),
        }
    }
}

/// A socket operation failed.
#[derive(Debug, Clone)]
pub struct NetOpError {
    pub op: NetOp,
    pub net: Network,
    pub addr: Option<SocketAddr>,
    pub cause: OpCause,
}

impl NetOpError {
    pub fn new(op: NetOp, net: Network, cause: OpCause) -> Self {
        Self {
            op,
            net,
            addr: None,
            cause,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }
}

impl fmt::Display for NetOpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.net)?;
        if let Some(addr) = self.addr {
            write!(f, " {addr}")?;
        }
        write!(f, ": {}", self.cause)
    }
}

impl std::error::Error for NetOpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            OpCause::Syscall(err) => Some(err),
            OpCause::Other(err) => Some(err.as_ref()),
            OpCause::Errno(_) | OpCause::TimedOut => None,
        }
    }
}

/// Certificate verification failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    #[error("x509: certificate signed by unknown authority ({0})")]
    UnknownAuthority(String),

    #[error("x509: certificate is not valid for the requested name ({0})")]
    HostnameMismatch(String),
}

/// The peer did not answer with a TLS record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("tls: {message}")]
pub struct TlsRecordHeaderError {
    pub message: String,
}

/// A request-level wrapper naming the method and URL that failed.
///
/// Classification is transparent: only `source` is looked at.
#[derive(Debug, Clone)]
pub struct UrlError {
    pub op: String,
    pub url: String,
    pub source: SharedError,
}

impl fmt::Display for UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\": {}", self.op, self.url, self.source)
    }
}

impl std::error::Error for UrlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// OS error text without the `(os error N)` suffix std appends.
pub(crate) fn errno_message(errno: i32) -> String {
    let rendered = io::Error::from_raw_os_error(errno).to_string();
    let suffix = format!(" (os error {errno})");
    match rendered.strip_suffix(&suffix) {
        Some(msg) => msg.to_string(),
        None => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http2_names_known_and_unknown_codes() {
        assert_eq!(Http2Error::new(Http2ErrorKind::Stream, 7).code_name(), "REFUSED_STREAM");
        assert_eq!(
            Http2Error::new(Http2ErrorKind::Stream, 0x42).code_name(),
            "unknown error code 0x42"
        );
    }

    #[test]
    fn net_op_error_renders_op_net_and_addr() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let err = NetOpError::new(NetOp::Dial, Network::Tcp, OpCause::TimedOut).with_addr(addr);
        assert_eq!(err.to_string(), "dial tcp 127.0.0.1:8080: i/o timeout");
    }

    #[test]
    fn errno_message_drops_os_error_suffix() {
        let msg = errno_message(2);
        assert!(!msg.contains("os error"), "{msg}");
    }
}
