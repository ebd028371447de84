//! httptrail: an instrumented HTTP client engine.
//!
//! Every round trip is timed, classified and turned into metric samples.
//! Emission is deferred by one request: a finished round trip is staged and
//! pushed to the sink when the next one starts, or on [`Client::flush`].
//! Transport failures map onto stable numeric codes (see [`error::codes`]).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use httptrail::prelude::*;
//!
//! # async fn example() -> httptrail::error::Result<()> {
//! let sink = Arc::new(CollectingSink::new());
//! let client = Client::new(&ClientConfig::default(), RunState::new(sink.clone()))?;
//!
//! let def = RequestDefinition::new("https://example.com/");
//! let response = client.get(&def).await?;
//! println!("{} in {:.1}ms", response.status, response.timings_ms);
//!
//! client.flush(None);
//! assert_eq!(sink.batches().len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! [`Client::flush`]: client::Client::flush

pub mod checks;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod net;
pub mod prelude;
pub mod state;
pub mod tracer;
