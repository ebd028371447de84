//! Deferred emission of request metrics.
//!
//! A finished round trip is *staged* rather than emitted right away. It is
//! measured and pushed when the next request is staged, or when the caller
//! drains explicitly (end of an iteration, client teardown). At most one
//! request is staged per dispatcher.

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use reqwest::Method;
use tracing::warn;

use super::push_if_not_done;
use super::tags::{SystemTag, TagsAndMeta};
use crate::error::{classify, ErrorCode, SharedError};
use crate::state::RunState;
use crate::tracer::Trail;

/// What was sent.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub url: String,
}

/// What came back before the body was read.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub remote_addr: Option<SocketAddr>,
}

/// A completed round trip whose metrics have not been emitted yet.
#[derive(Debug)]
pub struct UnfinishedRequest {
    pub request: RequestHead,
    pub response: Option<ResponseHead>,
    pub trail: Trail,
    pub error: Option<SharedError>,
}

/// A staged request after measurement. Produced once, never mutated.
#[derive(Debug)]
pub struct FinishedRequest {
    pub request: UnfinishedRequest,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
}

impl FinishedRequest {
    pub fn trail(&self) -> &Trail {
        &self.request.trail
    }
}

/// Holds the single staged request of one client.
pub struct MetricDispatcher {
    state: RunState,
    tags_and_meta: TagsAndMeta,
    last_request: Mutex<Option<UnfinishedRequest>>,
}

impl MetricDispatcher {
    pub fn new(tags_and_meta: TagsAndMeta, state: RunState) -> Self {
        Self {
            state,
            tags_and_meta,
            last_request: Mutex::new(None),
        }
    }

    /// Take the staged request, if any, and emit it.
    ///
    /// `last_err` is attached only when the staged request carries no
    /// error of its own.
    pub fn drain_and_emit(&self, last_err: Option<SharedError>) -> Option<FinishedRequest> {
        let mut slot = self.lock_slot();
        let mut unprocessed = slot.take()?;
        if unprocessed.error.is_none() {
            unprocessed.error = last_err;
        }
        Some(self.measure_and_emit(unprocessed))
    }

    /// Stage `current`, emitting whatever was staged before it first.
    pub fn stage(&self, current: UnfinishedRequest) {
        let mut slot = self.lock_slot();
        if let Some(unprocessed) = slot.take() {
            // Callers drain before each round trip, so this means two
            // requests overlapped on one client.
            warn!(
                url = %unprocessed.request.url,
                "unexpected unprocessed request while staging a new one"
            );
            self.measure_and_emit(unprocessed);
        }
        *slot = Some(current);
    }

    pub fn has_staged(&self) -> bool {
        self.lock_slot().is_some()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<UnfinishedRequest>> {
        self.last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Resolve tags, materialize the trail's samples and push them.
    fn measure_and_emit(&self, mut unfinished: UnfinishedRequest) -> FinishedRequest {
        let enabled = self.state.system_tags;
        let mut tags_and_meta = self.tags_and_meta.clone();
        let mut error_code = None;
        let mut error_message = None;

        // `name` and `url` carry the same value. A user-set name wins for
        // both so raw URLs don't blow up tag cardinality.
        match tags_and_meta.get(&SystemTag::Name.to_string()).map(str::to_string) {
            Some(name) => {
                tags_and_meta.set_system_tag_or_meta_if_enabled(enabled, SystemTag::Url, name);
            }
            None => {
                let url = unfinished.request.url.clone();
                tags_and_meta.set_system_tag_or_meta_if_enabled(
                    enabled,
                    SystemTag::Name,
                    url.clone(),
                );
                tags_and_meta.set_system_tag_or_meta_if_enabled(enabled, SystemTag::Url, url);
            }
        }

        tags_and_meta.set_system_tag_or_meta_if_enabled(
            enabled,
            SystemTag::Method,
            unfinished.request.method.as_str(),
        );

        let status = match (&unfinished.error, &unfinished.response) {
            (Some(err), _) => {
                let (code, message) = classify(err.as_ref());
                tags_and_meta.set_system_tag_or_meta_if_enabled(
                    enabled,
                    SystemTag::Error,
                    message.clone(),
                );
                tags_and_meta.set_system_tag_or_meta_if_enabled(
                    enabled,
                    SystemTag::ErrorCode,
                    code.to_string(),
                );
                tags_and_meta.set_system_tag_or_meta_if_enabled(enabled, SystemTag::Status, "0");
                error_code = Some(code);
                error_message = Some(message);
                0
            }
            (None, response) => {
                let status = response.as_ref().map_or(0, |r| r.status);
                tags_and_meta.set_system_tag_or_meta_if_enabled(
                    enabled,
                    SystemTag::Status,
                    status.to_string(),
                );
                if let Some(code) = ErrorCode::from_status(status) {
                    tags_and_meta.set_system_tag_or_meta_if_enabled(
                        enabled,
                        SystemTag::ErrorCode,
                        code.to_string(),
                    );
                    error_code = Some(code);
                }
                status
            }
        };

        if enabled.has(SystemTag::Ip) {
            if let Some(addr) = unfinished.trail.conn_remote_addr {
                tags_and_meta.set_system_tag_or_meta(SystemTag::Ip, addr.ip().to_string());
            }
        }

        let expected = self.state.response_callback.as_ref().map(|callback| {
            let expected = callback(status);
            tags_and_meta.set_system_tag_or_meta_if_enabled(
                enabled,
                SystemTag::ExpectedResponse,
                expected.to_string(),
            );
            expected
        });

        let builtin = &self.state.builtin_metrics;
        let trail = &mut unfinished.trail;
        trail.save_samples(builtin, &tags_and_meta);
        if let Some(expected) = expected {
            trail.failed = Some(!expected);
            trail.push_sample(builtin.http_req_failed.clone(), if expected { 0.0 } else { 1.0 });
        }

        push_if_not_done(self.state.samples.as_ref(), &*trail);

        FinishedRequest {
            request: unfinished,
            error_code,
            error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::error::{NetOp, NetOpError, Network, OpCause, SyscallError};
    use crate::metrics::{CollectingSink, Sample, SystemTagSet};
    use crate::state::expected_statuses;

    fn setup(state: impl FnOnce(RunState) -> RunState) -> (MetricDispatcher, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let state = state(RunState::new(sink.clone()));
        (MetricDispatcher::new(state.tags.clone(), state), sink)
    }

    fn unfinished(url: &str, status: Option<u16>, error: Option<SharedError>) -> UnfinishedRequest {
        let addr: SocketAddr = "192.0.2.10:443".parse().unwrap();
        UnfinishedRequest {
            request: RequestHead {
                method: Method::GET,
                url: url.to_string(),
            },
            response: status.map(|status| ResponseHead {
                status,
                remote_addr: Some(addr),
            }),
            trail: Trail::new(Duration::from_millis(12), Some(addr)),
            error,
        }
    }

    fn refused() -> SharedError {
        let errno = (1..20_000)
            .find(|n| io::Error::from_raw_os_error(*n).kind() == io::ErrorKind::ConnectionRefused)
            .unwrap();
        Arc::new(NetOpError::new(
            NetOp::Dial,
            Network::Tcp,
            OpCause::Syscall(SyscallError::new("connect", errno)),
        ))
    }

    fn tag<'a>(sample: &'a Sample, key: &str) -> Option<&'a str> {
        sample.tags.get(key)
    }

    #[test]
    fn drain_on_empty_slot_emits_nothing() {
        let (dispatcher, sink) = setup(|s| s);
        assert!(dispatcher.drain_and_emit(None).is_none());
        assert!(sink.batches().is_empty());
    }

    #[test]
    fn staged_request_is_emitted_once_on_drain() {
        let (dispatcher, sink) = setup(|s| s);
        dispatcher.stage(unfinished("http://a.test/", Some(200), None));
        assert!(sink.batches().is_empty());

        let finished = dispatcher.drain_and_emit(None).unwrap();
        assert_eq!(finished.error_code, None);
        assert!(dispatcher.drain_and_emit(None).is_none());

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        let names: Vec<&str> = batches[0].iter().map(|s| s.metric.name.as_str()).collect();
        assert_eq!(names, vec!["http_reqs", "http_req_duration"]);
        assert_eq!(tag(&batches[0][0], "status"), Some("200"));
        assert_eq!(tag(&batches[0][0], "method"), Some("GET"));
        assert_eq!(tag(&batches[0][0], "url"), Some("http://a.test/"));
        assert_eq!(tag(&batches[0][0], "name"), Some("http://a.test/"));
    }

    #[test]
    fn staging_twice_emits_previous_first() {
        let (dispatcher, sink) = setup(|s| s);
        dispatcher.stage(unfinished("http://a.test/1", Some(200), None));
        dispatcher.stage(unfinished("http://a.test/2", Some(201), None));
        dispatcher.drain_and_emit(None);

        let urls: Vec<String> = sink
            .batches()
            .iter()
            .map(|b| tag(&b[0], "url").unwrap_or_default().to_string())
            .collect();
        assert_eq!(urls, vec!["http://a.test/1", "http://a.test/2"]);
    }

    #[test]
    fn error_status_gets_synthetic_code() {
        let (dispatcher, sink) = setup(|s| s);
        dispatcher.stage(unfinished("http://a.test/missing", Some(404), None));
        let finished = dispatcher.drain_and_emit(None).unwrap();

        assert_eq!(finished.error_code, Some(ErrorCode(1404)));
        let sample = &sink.samples()[0];
        assert_eq!(tag(sample, "status"), Some("404"));
        assert_eq!(tag(sample, "error_code"), Some("1404"));
        assert_eq!(tag(sample, "error"), None);
    }

    #[test]
    fn transport_error_tags_status_zero_and_classification() {
        let (dispatcher, sink) = setup(|s| s);
        dispatcher.stage(unfinished("http://a.test/", None, Some(refused())));
        let finished = dispatcher.drain_and_emit(None).unwrap();

        assert_eq!(finished.error_code, Some(ErrorCode::TCP_DIAL_REFUSED));
        let sample = &sink.samples()[0];
        assert_eq!(tag(sample, "status"), Some("0"));
        assert_eq!(tag(sample, "error_code"), Some("1212"));
        assert_eq!(tag(sample, "error"), Some("dial: connection refused"));
    }

    #[test]
    fn late_error_fills_in_only_when_unset() {
        let (dispatcher, _sink) = setup(|s| s);
        dispatcher.stage(unfinished("http://a.test/", Some(200), None));
        let finished = dispatcher.drain_and_emit(Some(refused())).unwrap();
        assert_eq!(finished.error_code, Some(ErrorCode::TCP_DIAL_REFUSED));

        let original: SharedError = Arc::new(crate::error::ClassifiedError::new(
            ErrorCode::REQUEST_TIMEOUT,
            "request timeout",
            None,
        ));
        dispatcher.stage(unfinished("http://a.test/", None, Some(original)));
        let finished = dispatcher.drain_and_emit(Some(refused())).unwrap();
        assert_eq!(finished.error_code, Some(ErrorCode::REQUEST_TIMEOUT));
    }

    #[test]
    fn user_name_tag_is_echoed_as_url() {
        let (dispatcher, sink) = setup(|s| {
            let mut tags = TagsAndMeta::default();
            tags.set_tag("name", "products");
            s.with_tags(tags)
        });
        dispatcher.stage(unfinished("http://a.test/products/17", Some(200), None));
        dispatcher.drain_and_emit(None);

        let sample = &sink.samples()[0];
        assert_eq!(tag(sample, "name"), Some("products"));
        assert_eq!(tag(sample, "url"), Some("products"));
    }

    #[test]
    fn ip_tag_only_when_enabled() {
        let (dispatcher, sink) = setup(|s| s);
        dispatcher.stage(unfinished("http://a.test/", Some(200), None));
        dispatcher.drain_and_emit(None);
        assert_eq!(tag(&sink.samples()[0], "ip"), None);

        let (dispatcher, sink) =
            setup(|s| s.with_system_tags(SystemTagSet::default().with(SystemTag::Ip)));
        dispatcher.stage(unfinished("http://a.test/", Some(200), None));
        dispatcher.drain_and_emit(None);
        assert_eq!(tag(&sink.samples()[0], "ip"), Some("192.0.2.10"));
    }

    #[test]
    fn response_callback_adds_failed_sample() {
        let (dispatcher, sink) =
            setup(|s| s.with_response_callback(expected_statuses(&[], &[200..=399])));

        dispatcher.stage(unfinished("http://a.test/", Some(503), None));
        let finished = dispatcher.drain_and_emit(None).unwrap();
        assert_eq!(finished.trail().failed, Some(true));

        dispatcher.stage(unfinished("http://a.test/", None, Some(refused())));
        dispatcher.drain_and_emit(None);

        dispatcher.stage(unfinished("http://a.test/", Some(204), None));
        dispatcher.drain_and_emit(None);

        let batches = sink.batches();
        let verdicts: Vec<(Option<&str>, f64)> = batches
            .iter()
            .map(|b| {
                let failed = b.last().unwrap();
                assert_eq!(failed.metric.name, "http_req_failed");
                (tag(failed, "expected_response"), failed.value)
            })
            .collect();
        assert_eq!(
            verdicts,
            vec![(Some("false"), 1.0), (Some("false"), 1.0), (Some("true"), 0.0)]
        );
    }

    #[test]
    fn disabled_tags_are_left_out() {
        let (dispatcher, sink) = setup(|s| s.with_system_tags(SystemTagSet::empty()));
        dispatcher.stage(unfinished("http://a.test/", Some(500), None));
        let finished = dispatcher.drain_and_emit(None).unwrap();

        assert_eq!(finished.error_code, Some(ErrorCode(1500)));
        assert!(sink.samples()[0].tags.is_empty());
    }
}
