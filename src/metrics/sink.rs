//! Destinations for finished samples.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Sample, SampleContainer};

/// Receives batches of samples. Pushing never blocks.
pub trait SampleSink: Send + Sync {
    /// Whether the surrounding run is over.
    fn is_done(&self) -> bool {
        false
    }

    fn push(&self, batch: Vec<Sample>);
}

/// Push a container's samples unless the run has finished.
pub fn push_if_not_done(sink: &dyn SampleSink, container: &dyn SampleContainer) -> bool {
    if sink.is_done() {
        debug!("run finished, dropping sample batch");
        return false;
    }
    sink.push(container.samples());
    true
}

/// Forwards batches over an unbounded channel until its token is cancelled.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Vec<Sample>>,
    done: CancellationToken,
}

impl ChannelSink {
    pub fn new(done: CancellationToken) -> (Self, mpsc::UnboundedReceiver<Vec<Sample>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, done }, rx)
    }
}

impl SampleSink for ChannelSink {
    fn is_done(&self) -> bool {
        self.done.is_cancelled() || self.tx.is_closed()
    }

    fn push(&self, batch: Vec<Sample>) {
        if self.done.is_cancelled() {
            return;
        }
        if self.tx.send(batch).is_err() {
            debug!("sample receiver dropped");
        }
    }
}

/// Keeps every batch in memory; useful for embedding and tests.
#[derive(Default)]
pub struct CollectingSink {
    batches: Mutex<Vec<Vec<Sample>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every batch pushed so far, in push order.
    pub fn batches(&self) -> Vec<Vec<Sample>> {
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// All samples flattened, in push order.
    pub fn samples(&self) -> Vec<Sample> {
        self.batches().into_iter().flatten().collect()
    }
}

impl SampleSink for CollectingSink {
    fn push(&self, batch: Vec<Sample>) {
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(batch);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::metrics::{BuiltinMetrics, TagSet};

    fn sample() -> Sample {
        Sample {
            metric: BuiltinMetrics::new().http_reqs,
            tags: Arc::new(TagSet::new()),
            metadata: BTreeMap::new(),
            time: chrono::Utc::now(),
            value: 1.0,
        }
    }

    #[tokio::test]
    async fn channel_sink_forwards_until_cancelled() {
        let done = CancellationToken::new();
        let (sink, mut rx) = ChannelSink::new(done.clone());

        assert!(push_if_not_done(&sink, &sample()));
        assert_eq!(rx.recv().await.map(|b| b.len()), Some(1));

        done.cancel();
        assert!(!push_if_not_done(&sink, &sample()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        sink.push(vec![sample()]);
        sink.push(vec![sample(), sample()]);
        let sizes: Vec<usize> = sink.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1, 2]);
    }
}
