//! Convenience re-exports for common use.

pub use crate::checks::{check_status, CheckGroup};
pub use crate::client::{Body, Client, FileStream, RequestDefinition, Response, ResponseType};
pub use crate::config::{ClientConfig, TlsConfig};
pub use crate::error::{classify, ErrorCode, HttpTrailError, Result, SharedError};
pub use crate::metrics::{
    ChannelSink, CollectingSink, FinishedRequest, Sample, SampleSink, SystemTag, SystemTagSet,
    TagsAndMeta,
};
pub use crate::state::{expected_statuses, RunState};
