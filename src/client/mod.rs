//! The request engine.
//!
//! Every call drains the previously staged request, sends through a pooled
//! request instance, reads the body, and stages the outcome for deferred
//! metric emission.

pub mod body;
pub mod request;
pub mod response;

pub use body::{Body, FileStream};
pub use request::{PoolLease, PooledRequest, RequestDefinition, RequestPool};
pub use response::{Response, ResponseBody, ResponseType};

use std::net::IpAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use reqwest::header::HeaderMap;
use reqwest::Method;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::transport::{from_reqwest, title_case};
use crate::error::{classify, HttpTrailError, Result, SharedError, UrlError};
use crate::metrics::{
    duration_ms, FinishedRequest, MetricDispatcher, RequestHead, ResponseHead, UnfinishedRequest,
};
use crate::net::NetworkPolicy;
use crate::state::RunState;
use crate::tracer::Trail;

/// Sends requests and reports each round trip to the run's sample sink.
pub struct Client {
    transport: reqwest::Client,
    policy: Arc<NetworkPolicy>,
    state: RunState,
    dispatcher: OnceLock<MetricDispatcher>,
}

/// What one round trip produced, successful or not.
#[derive(Default)]
struct Exchange {
    head: Option<ResponseHead>,
    url: String,
    headers: HeaderMap,
    body: Option<ResponseBody>,
    error: Option<SharedError>,
}

impl Exchange {
    fn failed(error: SharedError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

impl Client {
    pub fn new(config: &ClientConfig, state: RunState) -> Result<Self> {
        Ok(Self {
            transport: config.build_transport()?,
            policy: Arc::new(config.network_policy()?),
            state,
            dispatcher: OnceLock::new(),
        })
    }

    /// Wrap an already built transport. No network policy is enforced.
    pub fn with_transport(transport: reqwest::Client, state: RunState) -> Self {
        Self {
            transport,
            policy: Arc::new(NetworkPolicy::default()),
            state,
            dispatcher: OnceLock::new(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Created on first use with the run's tags as they are then.
    fn dispatcher(&self) -> &MetricDispatcher {
        self.dispatcher
            .get_or_init(|| MetricDispatcher::new(self.state.tags.clone(), self.state.clone()))
    }

    pub async fn get(&self, def: &RequestDefinition) -> Result<Response> {
        self.request(def, Method::GET).await
    }

    pub async fn head(&self, def: &RequestDefinition) -> Result<Response> {
        self.request(def, Method::HEAD).await
    }

    pub async fn post(&self, def: &RequestDefinition) -> Result<Response> {
        self.request(def, Method::POST).await
    }

    pub async fn put(&self, def: &RequestDefinition) -> Result<Response> {
        self.request(def, Method::PUT).await
    }

    pub async fn patch(&self, def: &RequestDefinition) -> Result<Response> {
        self.request(def, Method::PATCH).await
    }

    pub async fn delete(&self, def: &RequestDefinition) -> Result<Response> {
        self.request(def, Method::DELETE).await
    }

    pub async fn options(&self, def: &RequestDefinition) -> Result<Response> {
        self.request(def, Method::OPTIONS).await
    }

    /// Issue `def` with `method`.
    ///
    /// A failed round trip is returned as [`HttpTrailError::Request`] when
    /// `def.throw` is set, and as a `status == 0` response carrying the
    /// classified error otherwise. Either way it is staged for metrics.
    pub async fn request(&self, def: &RequestDefinition, method: Method) -> Result<Response> {
        let dispatcher = self.dispatcher();
        dispatcher.drain_and_emit(None);

        let started = Instant::now();
        let exchange = self.round_trip(def, &method).await;
        let trail = Trail::new(
            started.elapsed(),
            exchange.head.as_ref().and_then(|h| h.remote_addr),
        );
        let timings_ms = duration_ms(trail.duration);

        dispatcher.stage(UnfinishedRequest {
            request: RequestHead {
                method,
                url: def.url.clone(),
            },
            response: exchange.head.clone(),
            trail,
            error: exchange.error.clone(),
        });

        match exchange.error {
            Some(cause) if def.throw => Err(HttpTrailError::request(cause)),
            Some(cause) => {
                let (code, message) = classify(cause.as_ref());
                warn!(url = %def.url, error = %message, code = %code, "request failed");
                Ok(Response {
                    url: def.url.clone(),
                    error: Some(message),
                    error_code: Some(code),
                    timings_ms,
                    ..Response::default()
                })
            }
            None => {
                let head = exchange.head.unwrap_or(ResponseHead {
                    status: 0,
                    remote_addr: None,
                });
                Ok(Response {
                    status: head.status,
                    url: exchange.url,
                    remote_ip: head.remote_addr.map(|addr| addr.to_string()),
                    headers: exchange.headers,
                    body: exchange.body,
                    error: None,
                    error_code: None,
                    timings_ms,
                })
            }
        }
    }

    async fn round_trip(&self, def: &RequestDefinition, method: &Method) -> Exchange {
        // Returned to the pool when this function exits, on every path.
        let mut lease = def.pool().acquire();
        let prepared = match lease.prepare(def, method) {
            Ok(prepared) => prepared,
            Err(err) => return Exchange::failed(err),
        };
        if let Err(err) = self.check_ip_literal(prepared.url(), method) {
            return Exchange::failed(err);
        }
        let request = match prepared.to_reqwest() {
            Ok(request) => request,
            Err(err) => return Exchange::failed(err),
        };

        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(err) => return Exchange::failed(from_reqwest(err, method.as_str(), &def.url)),
        };

        let head = ResponseHead {
            status: response.status().as_u16(),
            remote_addr: response.remote_addr(),
        };
        let url = response.url().to_string();
        let headers = response.headers().clone();

        match response::read_response_body(response, def.response_type).await {
            Ok(body) => Exchange {
                head: Some(head),
                url,
                headers,
                body,
                error: None,
            },
            Err(err) => {
                debug!(url = %def.url, error = %err, "failed to read response body");
                Exchange {
                    head: Some(head),
                    url,
                    headers,
                    body: None,
                    error: Some(from_reqwest(err, method.as_str(), &def.url)),
                }
            }
        }
    }

    /// IP-literal hosts skip name resolution, so the blacklist is applied here.
    fn check_ip_literal(
        &self,
        url: &reqwest::Url,
        method: &Method,
    ) -> std::result::Result<(), SharedError> {
        let Some(host) = url.host_str() else {
            return Ok(());
        };
        let Ok(ip) = host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() else {
            return Ok(());
        };
        self.policy.check_ip(ip).map_err(|blocked| {
            debug!(ip = %ip, network = %blocked.network, "refusing blacklisted address");
            Arc::new(UrlError {
                op: title_case(method.as_str()),
                url: url.to_string(),
                source: Arc::new(blocked),
            }) as SharedError
        })
    }

    /// Emit the staged request, attaching `err` if it has no error of its own.
    pub fn flush(&self, err: Option<SharedError>) -> Option<FinishedRequest> {
        self.dispatcher.get()?.drain_and_emit(err)
    }

    /// Whether a round trip is waiting to be emitted.
    pub fn has_staged(&self) -> bool {
        self.dispatcher.get().is_some_and(MetricDispatcher::has_staged)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.get() {
            dispatcher.drain_and_emit(None);
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("policy", &self.policy)
            .field("dispatcher", &self.dispatcher.get().map(|_| ".."))
            .finish()
    }
}
