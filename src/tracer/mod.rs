//! Per-request timing record and its samples.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::metrics::{
    duration_ms, BuiltinMetrics, Metric, Sample, SampleContainer, TagSet, TagsAndMeta,
};

/// Timing and connection facts about one round trip.
#[derive(Debug, Clone)]
pub struct Trail {
    pub end_time: DateTime<Utc>,

    /// Send through full body consumption.
    pub duration: Duration,

    pub conn_remote_addr: Option<SocketAddr>,

    /// Unset until a response-expectation verdict exists.
    pub failed: Option<bool>,

    tags: Arc<TagSet>,
    metadata: BTreeMap<String, String>,
    samples: Vec<Sample>,
    sealed: bool,
}

impl Trail {
    /// A trail ending now.
    pub fn new(duration: Duration, conn_remote_addr: Option<SocketAddr>) -> Self {
        Self {
            end_time: Utc::now(),
            duration,
            conn_remote_addr,
            failed: None,
            tags: Arc::new(TagSet::new()),
            metadata: BTreeMap::new(),
            samples: Vec::new(),
            sealed: false,
        }
    }

    /// Materialize the request-count and duration samples.
    ///
    /// One-shot: returns `false` and appends nothing if samples were
    /// already saved for this trail.
    pub fn save_samples(&mut self, builtin: &BuiltinMetrics, ctm: &TagsAndMeta) -> bool {
        if self.sealed {
            warn!("trail samples already saved, ignoring repeat call");
            return false;
        }
        self.sealed = true;
        self.tags = Arc::new(ctm.tags.clone());
        self.metadata = ctm.metadata.clone();
        let reqs = self.sample(builtin.http_reqs.clone(), 1.0);
        let duration = self.sample(builtin.http_req_duration.clone(), duration_ms(self.duration));
        // one extra slot for a possible http_req_failed sample
        self.samples = Vec::with_capacity(3);
        self.samples.push(reqs);
        self.samples.push(duration);
        true
    }

    /// Append a sample carrying this trail's tags and end time.
    pub fn push_sample(&mut self, metric: Arc<Metric>, value: f64) {
        let sample = self.sample(metric, value);
        self.samples.push(sample);
    }

    fn sample(&self, metric: Arc<Metric>, value: f64) -> Sample {
        Sample {
            metric,
            tags: self.tags.clone(),
            metadata: self.metadata.clone(),
            time: self.end_time,
            value,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn sample_slice(&self) -> &[Sample] {
        &self.samples
    }
}

impl SampleContainer for Trail {
    fn samples(&self) -> Vec<Sample> {
        self.samples.clone()
    }
}
