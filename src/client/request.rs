//! Request definitions and their pool of reusable request instances.
//!
//! A [`RequestDefinition`] owns a small pool. Each call leases an instance,
//! builds it on first use, resets it on reuse, and hands it back when the
//! lease drops, whether or not the round trip succeeded.

use std::sync::{Arc, Mutex, MutexGuard};

use bon::Builder;
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST};
use reqwest::{Method, Url};
use tracing::error;

use super::body::Body;
use super::response::ResponseType;
use crate::error::transport::invalid_url;
use crate::error::SharedError;

/// Everything needed to issue one kind of request, plus its pool.
///
/// `url`, `host` and `headers` are applied once, when a pooled instance is
/// first built. Method, body and keep-alive are re-applied on every call.
#[derive(Debug, Builder)]
pub struct RequestDefinition {
    #[builder(into)]
    pub url: String,
    /// Overrides the `Host` header.
    #[builder(into)]
    pub host: Option<String>,
    #[builder(default)]
    pub headers: HeaderMap,
    #[builder(into)]
    pub body: Option<Body>,
    /// Return failed round trips as errors instead of error-carrying responses.
    #[builder(default)]
    pub throw: bool,
    /// Send `Connection: close`.
    #[builder(default)]
    pub disable_keep_alive: bool,
    #[builder(default)]
    pub response_type: ResponseType,
    #[builder(skip)]
    pool: RequestPool,
}

impl RequestDefinition {
    pub fn new(url: impl Into<String>) -> Self {
        Self::builder().url(url).build()
    }

    pub fn pool(&self) -> &RequestPool {
        &self.pool
    }
}

/// GET and HEAD never carry a body.
pub(crate) fn carries_body(method: &Method) -> bool {
    *method != Method::GET && *method != Method::HEAD
}

/// A request instance kept between calls.
#[derive(Debug, Clone)]
pub struct PooledRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Body>,
}

impl PooledRequest {
    fn build(def: &RequestDefinition, method: &Method) -> Result<Self, SharedError> {
        let url = Url::parse(&def.url).map_err(|e| invalid_url(&def.url, e))?;
        let mut headers = def.headers.clone();
        if let Some(host) = &def.host {
            let value = HeaderValue::from_str(host).map_err(|e| invalid_url(host, e))?;
            headers.insert(HOST, value);
        }
        let mut request = Self {
            method: method.clone(),
            url,
            headers,
            body: None,
        };
        request.reset(def, method);
        Ok(request)
    }

    /// Re-apply everything that may differ between calls.
    ///
    /// The previous call's method and body never carry over: a body-less
    /// method always leaves with the body cleared.
    fn reset(&mut self, def: &RequestDefinition, method: &Method) {
        self.method = method.clone();

        if def.disable_keep_alive {
            self.headers
                .insert(CONNECTION, HeaderValue::from_static("close"));
        } else {
            match def.headers.get(CONNECTION) {
                Some(value) => {
                    self.headers.insert(CONNECTION, value.clone());
                }
                None => {
                    self.headers.remove(CONNECTION);
                }
            }
        }

        self.body = match &def.body {
            Some(body) if carries_body(method) => Some(body.clone()),
            _ => None,
        };
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// A sendable copy. Streaming bodies are rewound first.
    pub(crate) fn to_reqwest(&self) -> Result<reqwest::Request, SharedError> {
        let mut request = reqwest::Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        match &self.body {
            None => {}
            Some(Body::Bytes(bytes)) => {
                *request.body_mut() = Some(bytes.clone().into());
            }
            Some(Body::Stream(stream)) => {
                let (body, len) = stream.reqwest_body().map_err(|err| {
                    error!(
                        path = %stream.path().display(),
                        error = %err,
                        "failed to rewind request body"
                    );
                    Arc::new(err) as SharedError
                })?;
                request
                    .headers_mut()
                    .insert(CONTENT_LENGTH, HeaderValue::from(len));
                *request.body_mut() = Some(body);
            }
        }
        Ok(request)
    }
}

/// Idle request instances of one definition.
#[derive(Debug, Default)]
pub struct RequestPool {
    idle: Mutex<Vec<PooledRequest>>,
}

impl RequestPool {
    pub fn acquire(&self) -> PoolLease<'_> {
        let request = self.lock().pop();
        PoolLease {
            pool: self,
            reused: request.is_some(),
            request,
        }
    }

    /// Instances waiting for reuse.
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    fn put(&self, request: PooledRequest) {
        self.lock().push(request);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PooledRequest>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A pooled instance on loan. Returned to its pool on drop.
#[derive(Debug)]
pub struct PoolLease<'a> {
    pool: &'a RequestPool,
    reused: bool,
    request: Option<PooledRequest>,
}

impl PoolLease<'_> {
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Build or reset the leased instance for `method`.
    pub fn prepare(
        &mut self,
        def: &RequestDefinition,
        method: &Method,
    ) -> Result<&PooledRequest, SharedError> {
        let request = match self.request.take() {
            Some(mut request) => {
                request.reset(def, method);
                request
            }
            None => PooledRequest::build(def, method)?,
        };
        Ok(self.request.insert(request))
    }
}

impl Drop for PoolLease<'_> {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            self.pool.put(request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorCode};

    #[test]
    fn reused_post_instance_sends_bodyless_get() {
        let def = RequestDefinition::builder()
            .url("http://example.test/items")
            .body("payload")
            .build();

        {
            let mut lease = def.pool().acquire();
            assert!(!lease.is_reused());
            let request = lease.prepare(&def, &Method::POST).unwrap();
            assert!(request.body().is_some());
        }
        assert_eq!(def.pool().idle(), 1);

        let mut lease = def.pool().acquire();
        assert!(lease.is_reused());
        let request = lease.prepare(&def, &Method::GET).unwrap();
        assert_eq!(request.method(), &Method::GET);
        assert!(request.body().is_none());
        assert!(request.to_reqwest().unwrap().body().is_none());
    }

    #[test]
    fn head_never_carries_a_body() {
        let def = RequestDefinition::builder()
            .url("http://example.test/")
            .body("payload")
            .build();
        let mut lease = def.pool().acquire();
        assert!(lease.prepare(&def, &Method::HEAD).unwrap().body().is_none());
    }

    #[test]
    fn keep_alive_and_host_override() {
        let def = RequestDefinition::builder()
            .url("http://127.0.0.1:1/")
            .host("api.example.test")
            .disable_keep_alive(true)
            .build();
        let mut lease = def.pool().acquire();
        let request = lease.prepare(&def, &Method::GET).unwrap();
        assert_eq!(request.headers()[HOST], "api.example.test");
        assert_eq!(request.headers()[CONNECTION], "close");
    }

    #[test]
    fn invalid_urls_classify_as_invalid_url() {
        let def = RequestDefinition::new("not a url");
        let mut lease = def.pool().acquire();
        let err = lease.prepare(&def, &Method::GET).unwrap_err();
        assert_eq!(
            classify(err.as_ref()),
            (ErrorCode::INVALID_URL, "invalid URL".to_string())
        );
        drop(lease);
        assert_eq!(def.pool().idle(), 0);
    }

    #[test]
    fn instances_return_to_pool_after_each_lease() {
        let def = RequestDefinition::new("http://example.test/");
        for _ in 0..3 {
            let mut lease = def.pool().acquire();
            lease.prepare(&def, &Method::GET).unwrap();
        }
        assert_eq!(def.pool().idle(), 1);
    }
}
