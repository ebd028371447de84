//! Metric definitions, samples, and the deferred request-metric pipeline.

pub mod dispatcher;
pub mod sink;
pub mod tags;

pub use dispatcher::{
    FinishedRequest, MetricDispatcher, RequestHead, ResponseHead, UnfinishedRequest,
};
pub use sink::{push_if_not_done, ChannelSink, CollectingSink, SampleSink};
pub use tags::{SystemTag, SystemTagSet, TagSet, TagsAndMeta};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

/// How a metric aggregates its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Trend,
    Rate,
}

/// What unit a metric's values are in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    Default,
    Time,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub name: String,
    pub kind: MetricType,
    pub contains: ValueType,
}

impl Metric {
    pub fn new(name: impl Into<String>, kind: MetricType, contains: ValueType) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
            contains,
        })
    }
}

/// The metrics every request and check reports into.
#[derive(Debug, Clone)]
pub struct BuiltinMetrics {
    pub http_reqs: Arc<Metric>,
    pub http_req_duration: Arc<Metric>,
    pub http_req_failed: Arc<Metric>,
    pub checks: Arc<Metric>,
}

impl Default for BuiltinMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinMetrics {
    pub fn new() -> Self {
        Self {
            http_reqs: Metric::new("http_reqs", MetricType::Counter, ValueType::Default),
            http_req_duration: Metric::new("http_req_duration", MetricType::Trend, ValueType::Time),
            http_req_failed: Metric::new("http_req_failed", MetricType::Rate, ValueType::Default),
            checks: Metric::new("checks", MetricType::Rate, ValueType::Default),
        }
    }
}

/// One timestamped, tagged data point.
#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub metric: Arc<Metric>,
    pub tags: Arc<TagSet>,
    pub metadata: BTreeMap<String, String>,
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// Anything that can hand over a batch of samples.
pub trait SampleContainer {
    fn samples(&self) -> Vec<Sample>;
}

impl SampleContainer for Sample {
    fn samples(&self) -> Vec<Sample> {
        vec![self.clone()]
    }
}

impl SampleContainer for Vec<Sample> {
    fn samples(&self) -> Vec<Sample> {
        self.clone()
    }
}

/// Duration as fractional milliseconds, the canonical time unit of samples.
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_serialize_with_flat_tags() {
        let sample = Sample {
            metric: BuiltinMetrics::new().http_req_duration,
            tags: Arc::new(TagSet::from_iter([("status", "200")])),
            metadata: BTreeMap::new(),
            time: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            value: 12.5,
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["metric"]["name"], "http_req_duration");
        assert_eq!(json["metric"]["kind"], "trend");
        assert_eq!(json["metric"]["contains"], "time");
        assert_eq!(json["tags"]["status"], "200");
        assert_eq!(json["value"], 12.5);
    }

    #[test]
    fn durations_are_fractional_milliseconds() {
        assert_eq!(duration_ms(Duration::from_micros(1500)), 1.5);
    }
}
