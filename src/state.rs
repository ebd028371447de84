//! The harness context a client reports into.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::checks::CheckGroup;
use crate::metrics::{BuiltinMetrics, SampleSink, SystemTagSet, TagsAndMeta};

/// Decides whether a response status counts as expected.
///
/// Called with `0` when the request failed before a response arrived.
pub type ResponseCallback = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// Build a callback accepting the given statuses and inclusive ranges.
///
/// ```
/// let ok = httptrail::state::expected_statuses(&[304], &[200..=299]);
/// assert!(ok(204));
/// assert!(ok(304));
/// assert!(!ok(404));
/// ```
pub fn expected_statuses(codes: &[u16], ranges: &[RangeInclusive<u16>]) -> ResponseCallback {
    let codes = codes.to_vec();
    let ranges = ranges.to_vec();
    Arc::new(move |status| codes.contains(&status) || ranges.iter().any(|r| r.contains(&status)))
}

/// Everything a client needs from the surrounding test run.
#[derive(Clone)]
pub struct RunState {
    pub tags: TagsAndMeta,
    pub system_tags: SystemTagSet,
    pub builtin_metrics: Arc<BuiltinMetrics>,
    pub samples: Arc<dyn SampleSink>,
    pub group: Arc<CheckGroup>,
    pub response_callback: Option<ResponseCallback>,
}

impl RunState {
    pub fn new(samples: Arc<dyn SampleSink>) -> Self {
        Self {
            tags: TagsAndMeta::default(),
            system_tags: SystemTagSet::default(),
            builtin_metrics: Arc::new(BuiltinMetrics::new()),
            samples,
            group: Arc::new(CheckGroup::root()),
            response_callback: None,
        }
    }

    pub fn with_tags(mut self, tags: TagsAndMeta) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_system_tags(mut self, system_tags: SystemTagSet) -> Self {
        self.system_tags = system_tags;
        self
    }

    pub fn with_response_callback(mut self, callback: ResponseCallback) -> Self {
        self.response_callback = Some(callback);
        self
    }

    pub fn with_group(mut self, group: Arc<CheckGroup>) -> Self {
        self.group = group;
        self
    }
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunState")
            .field("tags", &self.tags)
            .field("system_tags", &self.system_tags)
            .field("group", &self.group.path())
            .field("response_callback", &self.response_callback.as_ref().map(|_| ".."))
            .finish()
    }
}
