//! Translate reqwest failures into recognized failure kinds.
//!
//! reqwest, hyper and the TLS stack report failures as opaque source
//! chains. [`from_reqwest`] walks the chain once, picks out what the
//! classifier knows about, and wraps the result in a [`UrlError`] naming
//! the request.

use std::error::Error;
use std::io;
use std::sync::Arc;

use super::codes::ErrorCode;
use super::kinds::{
    BlockedHostnameError, BlockedIpError, CertificateError, ClassifiedError, DnsError,
    DnsErrorKind, Http2Error, Http2ErrorKind, NetOp, NetOpError, Network, OpCause, SyscallError,
    TlsRecordHeaderError, UrlError,
};
use super::SharedError;

/// Resolver messages meaning the name does not exist, per platform.
const NO_SUCH_HOST_MARKERS: &[&str] = &[
    "name or service not known",
    "no address associated with hostname",
    "nodename nor servname provided",
    "no such host is known",
    "no such host",
];

/// Decoder messages meaning a compressed body could not be inflated.
const DECOMPRESSION_MARKERS: &[&str] = &["gzip", "deflate", "brotli", "zstd", "decompress"];

/// Wrap a failed round trip for `method`/`url`.
pub fn from_reqwest(err: reqwest::Error, method: &str, url: &str) -> SharedError {
    let host = err
        .url()
        .and_then(|u| u.host_str())
        .map(str::to_string)
        .unwrap_or_default();
    let cause = translate(err, &host);
    Arc::new(UrlError {
        op: title_case(method),
        url: url.to_string(),
        source: cause,
    })
}

/// A URL that could not be turned into a request.
pub fn invalid_url(url: &str, err: impl Error + Send + Sync + 'static) -> SharedError {
    Arc::new(ClassifiedError::new(
        ErrorCode::INVALID_URL,
        "invalid URL",
        Some(Arc::new(UrlError {
            op: "parse".into(),
            url: url.to_string(),
            source: Arc::new(err),
        })),
    ))
}

fn translate(err: reqwest::Error, host: &str) -> SharedError {
    if err.is_builder() {
        return Arc::new(ClassifiedError::new(
            ErrorCode::INVALID_URL,
            "invalid URL",
            Some(Arc::new(err)),
        ));
    }

    let found = Findings::collect(&err);

    if let Some(blocked) = found.blocked_ip {
        return Arc::new(blocked);
    }
    if let Some(blocked) = found.blocked_hostname {
        return Arc::new(blocked);
    }
    if let Some(message) = found.dns {
        let lowered = message.to_ascii_lowercase();
        let kind = if NO_SUCH_HOST_MARKERS.iter().any(|m| lowered.contains(m)) {
            DnsErrorKind::NoSuchHost
        } else {
            DnsErrorKind::Other(message)
        };
        return Arc::new(DnsError {
            host: host.to_string(),
            kind,
        });
    }
    if let Some(tls) = found.tls {
        return tls;
    }
    if let Some(h2) = found.http2 {
        return Arc::new(h2);
    }

    if err.is_connect() {
        let cause = match &found.io {
            Some(IoFinding::TimedOut) => OpCause::TimedOut,
            Some(IoFinding::Errno(errno)) => OpCause::Syscall(SyscallError::new("connect", *errno)),
            _ => OpCause::Other(Arc::new(err)),
        };
        return Arc::new(NetOpError::new(NetOp::Dial, Network::Tcp, cause));
    }

    if err.is_timeout() {
        return Arc::new(ClassifiedError::new(
            ErrorCode::REQUEST_TIMEOUT,
            "request timeout",
            Some(Arc::new(err)),
        ));
    }

    if let Some(IoFinding::Errno(errno)) = found.io {
        return Arc::new(NetOpError::new(
            NetOp::Read,
            Network::Tcp,
            OpCause::Syscall(SyscallError::new("read", errno)),
        ));
    }

    // Plain body reads also report as decode errors; only a failing
    // decompressor earns the decompression code.
    if err.is_decode() && found.decompression {
        return Arc::new(ClassifiedError::new(
            ErrorCode::RESPONSE_DECOMPRESSION,
            err.to_string(),
            Some(Arc::new(err)),
        ));
    }

    Arc::new(err)
}

enum IoFinding {
    TimedOut,
    Errno(i32),
}

/// Everything of interest seen along one error chain.
#[derive(Default)]
struct Findings {
    blocked_ip: Option<BlockedIpError>,
    blocked_hostname: Option<BlockedHostnameError>,
    dns: Option<String>,
    tls: Option<SharedError>,
    http2: Option<Http2Error>,
    io: Option<IoFinding>,
    decompression: bool,
}

impl Findings {
    fn collect(err: &(dyn Error + 'static)) -> Self {
        let mut found = Self::default();
        let mut in_dns = false;
        let mut link = Some(err);

        while let Some(current) = link {
            if let Some(e) = current.downcast_ref::<BlockedIpError>() {
                found.blocked_ip.get_or_insert_with(|| e.clone());
            }
            if let Some(e) = current.downcast_ref::<BlockedHostnameError>() {
                found.blocked_hostname.get_or_insert_with(|| e.clone());
            }
            if let Some(e) = current.downcast_ref::<rustls::Error>() {
                found.tls.get_or_insert_with(|| tls_failure(e));
            }
            if let Some(e) = current.downcast_ref::<h2::Error>() {
                if let Some(h2) = http2_failure(e) {
                    found.http2.get_or_insert(h2);
                }
            }
            if let Some(e) = current.downcast_ref::<io::Error>() {
                if found.io.is_none() {
                    if e.kind() == io::ErrorKind::TimedOut {
                        found.io = Some(IoFinding::TimedOut);
                    } else if let Some(errno) = e.raw_os_error() {
                        found.io = Some(IoFinding::Errno(errno));
                    }
                }
            }

            // hyper's connector reports resolver failures as "dns error",
            // with the resolver's own error as the cause.
            let rendered = current.to_string();
            let lowered = rendered.to_ascii_lowercase();
            if DECOMPRESSION_MARKERS.iter().any(|m| lowered.contains(m)) {
                found.decompression = true;
            }
            if in_dns && found.dns.is_none() {
                found.dns = Some(rendered.clone());
            }
            if rendered.starts_with("dns error") {
                in_dns = true;
            }

            link = next_link(current);
        }

        if in_dns && found.dns.is_none() {
            found.dns = Some("dns error".to_string());
        }
        if found.blocked_ip.is_some() || found.blocked_hostname.is_some() {
            found.dns = None;
        }
        found
    }
}

fn next_link<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a (dyn Error + 'static)> {
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        if let Some(inner) = io_err.get_ref() {
            return Some(inner);
        }
    }
    err.source()
}

fn tls_failure(err: &rustls::Error) -> SharedError {
    match err {
        rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer) => {
            Arc::new(CertificateError::UnknownAuthority(err.to_string()))
        }
        rustls::Error::InvalidCertificate(
            rustls::CertificateError::NotValidForName
            | rustls::CertificateError::NotValidForNameContext { .. },
        ) => {
            Arc::new(CertificateError::HostnameMismatch(err.to_string()))
        }
        rustls::Error::InvalidMessage(_) | rustls::Error::InappropriateMessage { .. } => {
            Arc::new(TlsRecordHeaderError {
                message: err.to_string(),
            })
        }
        other => Arc::new(ClassifiedError::new(
            ErrorCode::TLS,
            format!("tls: {other}"),
            None,
        )),
    }
}

fn http2_failure(err: &h2::Error) -> Option<Http2Error> {
    let code = u32::from(err.reason()?);
    let kind = if err.is_go_away() {
        Http2ErrorKind::GoAway
    } else if err.is_reset() {
        Http2ErrorKind::Stream
    } else {
        Http2ErrorKind::Connection
    };
    Some(Http2Error::new(kind, code))
}

/// `GET` -> `Get`, matching how request wrappers name their operation.
pub(crate) fn title_case(method: &str) -> String {
    let mut chars = method.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
