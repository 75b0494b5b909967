use std::sync::Arc;

use async_trait::async_trait;
use http::Method;

use crate::intercept::Transport;
use crate::payload::Body;
use crate::pipeline::Pipeline;

#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Body>,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A request-call transport, resolving to whatever response type the host uses.
#[async_trait]
pub trait Fetch: Send + Sync {
    type Response: Send;

    async fn fetch(&self, request: FetchRequest) -> Self::Response;
}

pub struct InterceptedFetch<F> {
    inner: F,
    pipeline: Arc<Pipeline>,
}

impl<F: Fetch> InterceptedFetch<F> {
    pub(crate) fn new(inner: F, pipeline: Arc<Pipeline>) -> Self {
        Self { inner, pipeline }
    }

    pub fn uninstall(self) -> F {
        self.inner
    }
}

#[async_trait]
impl<F: Fetch> Fetch for InterceptedFetch<F> {
    type Response = F::Response;

    async fn fetch(&self, request: FetchRequest) -> Self::Response {
        // Detached, the response never waits on decoding
        self.pipeline
            .observe(Transport::Fetch, &request.url, request.body.as_ref());
        self.inner.fetch(request).await
    }
}
