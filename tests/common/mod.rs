//! Shared test helpers.

#![allow(dead_code)]

use std::sync::Arc;

use httptrail::metrics::{CollectingSink, Sample};
use httptrail::state::RunState;

/// A run state whose samples land in the returned sink.
pub fn recording_state() -> (RunState, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    (RunState::new(sink.clone()), sink)
}

/// A local URL nothing listens on.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}/")
}

/// Tag `key` of the first sample in `batch`.
pub fn tag<'a>(batch: &'a [Sample], key: &str) -> Option<&'a str> {
    batch.first().and_then(|sample| sample.tags.get(key))
}
