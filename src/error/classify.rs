//! Map any failure onto an [`ErrorCode`] and a human-readable message.
//!
//! Matchers run in priority order against one link of the error chain.
//! When none of them recognizes the link, classification moves on to its
//! cause, so a low-level failure wrapped by higher-level errors keeps its
//! specific code. Links with no cause fall back to [`ErrorCode::DEFAULT`].

use std::error::Error;
use std::io;

use super::codes::ErrorCode;
use super::kinds::{
    BlockedHostnameError, BlockedIpError, CertificateError, ClassifiedError, DnsError,
    DnsErrorKind, Http2Error, Http2ErrorKind, NetOp, NetOpError, OpCause, TlsRecordHeaderError,
    UrlError, HTTP2_MAX_KNOWN_CODE,
};

type Classification = (ErrorCode, String);
type Matcher = fn(&(dyn Error + 'static)) -> Option<Classification>;

const MATCHERS: &[Matcher] = &[
    classified,
    dns,
    blocked_ip,
    blocked_hostname,
    http2,
    net_op,
    certificate,
    tls_record_header,
    url,
];

/// Classify `err`. Never fails and never panics.
pub fn classify(err: &(dyn Error + 'static)) -> Classification {
    for matcher in MATCHERS {
        if let Some(found) = matcher(err) {
            return found;
        }
    }
    match cause_of(err) {
        Some(inner) => classify(inner),
        None => (ErrorCode::DEFAULT, err.to_string()),
    }
}

/// Next link in the chain.
///
/// `io::Error::source()` skips the error it wraps, so that one is
/// unwrapped explicitly.
fn cause_of<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a (dyn Error + 'static)> {
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        if let Some(inner) = io_err.get_ref() {
            return Some(inner);
        }
    }
    err.source()
}

fn classified(err: &(dyn Error + 'static)) -> Option<Classification> {
    let e = err.downcast_ref::<ClassifiedError>()?;
    Some((e.code, e.message.clone()))
}

fn dns(err: &(dyn Error + 'static)) -> Option<Classification> {
    let e = err.downcast_ref::<DnsError>()?;
    Some(match e.kind {
        DnsErrorKind::NoSuchHost => (ErrorCode::DNS_NO_SUCH_HOST, "lookup: no such host".into()),
        DnsErrorKind::Other(_) => (ErrorCode::DNS, e.to_string()),
    })
}

fn blocked_ip(err: &(dyn Error + 'static)) -> Option<Classification> {
    err.downcast_ref::<BlockedIpError>()?;
    Some((ErrorCode::BLACKLISTED_IP, "ip is blacklisted".into()))
}

fn blocked_hostname(err: &(dyn Error + 'static)) -> Option<Classification> {
    err.downcast_ref::<BlockedHostnameError>()?;
    Some((ErrorCode::BLOCKED_HOSTNAME, "hostname is blocked".into()))
}

fn http2(err: &(dyn Error + 'static)) -> Option<Classification> {
    let e = err.downcast_ref::<Http2Error>()?;
    let base = match e.kind {
        Http2ErrorKind::GoAway => ErrorCode::HTTP2_GO_AWAY,
        Http2ErrorKind::Stream => ErrorCode::HTTP2_STREAM,
        Http2ErrorKind::Connection => ErrorCode::HTTP2_CONNECTION,
    };
    Some((base.offset(http2_code_offset(e.code)), e.to_string()))
}

/// Subcodes past the known range collapse onto the partition base.
fn http2_code_offset(code: u32) -> u32 {
    if code > HTTP2_MAX_KNOWN_CODE {
        0
    } else {
        code + 1
    }
}

fn net_op(err: &(dyn Error + 'static)) -> Option<Classification> {
    err.downcast_ref::<NetOpError>().map(classify_net_op)
}

fn classify_net_op(e: &NetOpError) -> Classification {
    if !e.net.is_tcp() {
        return (ErrorCode::NET_NON_TCP, e.to_string());
    }

    if let OpCause::Syscall(sys) = &e.cause {
        match sys.kind() {
            io::ErrorKind::ConnectionReset => {
                return (
                    ErrorCode::TCP_RESET_BY_PEER,
                    format!("{}: connection reset by peer", e.op),
                )
            }
            io::ErrorKind::BrokenPipe => {
                return (ErrorCode::TCP_BROKEN_PIPE, format!("{}: broken pipe", e.op))
            }
            _ => {}
        }
    }

    if e.op != NetOp::Dial {
        return match &e.cause {
            OpCause::Errno(errno) => (
                ErrorCode::NET_UNKNOWN_ERRNO,
                format!(
                    "{}: unknown errno `{}` on {} with message `{}`",
                    e.op,
                    errno,
                    std::env::consts::OS,
                    super::kinds::errno_message(*errno)
                ),
            ),
            _ => (ErrorCode::TCP, e.to_string()),
        };
    }

    match &e.cause {
        OpCause::Syscall(sys) if sys.kind() == io::ErrorKind::ConnectionRefused => {
            return (ErrorCode::TCP_DIAL_REFUSED, "dial: connection refused".into());
        }
        OpCause::Syscall(sys) => {
            return (
                ErrorCode::TCP_DIAL_UNKNOWN_ERRNO,
                format!(
                    "dial: unknown errno {} error with msg `{}`",
                    sys.errno,
                    super::kinds::errno_message(sys.errno)
                ),
            );
        }
        OpCause::TimedOut => {
            return (ErrorCode::TCP_DIAL_TIMEOUT, "dial: i/o timeout".into());
        }
        OpCause::Errno(_) | OpCause::Other(_) => {}
    }

    // Something recognizable may sit underneath, e.g. a DNS failure.
    if let Some(inner) = cause_of(e) {
        let (code, message) = classify(inner);
        if code != ErrorCode::DEFAULT {
            return (code, message);
        }
    }

    (ErrorCode::TCP_DIAL, e.to_string())
}

fn certificate(err: &(dyn Error + 'static)) -> Option<Classification> {
    Some(match err.downcast_ref::<CertificateError>()? {
        CertificateError::UnknownAuthority(_) => (
            ErrorCode::X509_UNKNOWN_AUTHORITY,
            "x509: unknown authority".into(),
        ),
        CertificateError::HostnameMismatch(_) => (
            ErrorCode::X509_HOSTNAME,
            "x509: certificate doesn't match hostname".into(),
        ),
    })
}

fn tls_record_header(err: &(dyn Error + 'static)) -> Option<Classification> {
    let e = err.downcast_ref::<TlsRecordHeaderError>()?;
    Some((ErrorCode::TLS_HEADER, e.to_string()))
}

fn url(err: &(dyn Error + 'static)) -> Option<Classification> {
    let e = err.downcast_ref::<UrlError>()?;
    Some(classify(e.source.as_ref()))
}
