use std::sync::Arc;

use http::Method;

use crate::intercept::Transport;
use crate::payload::Body;
use crate::pipeline::Pipeline;

/// A stream-based request transport where the destination and the body arrive in two
/// separate calls.
pub trait XmlHttpRequest {
    fn open(&mut self, method: Method, url: &str);

    fn send(&mut self, body: Option<Body>);
}

pub struct InterceptedXhr<X> {
    inner: X,
    pipeline: Arc<Pipeline>,
    destination: Option<String>,
}

impl<X: XmlHttpRequest> InterceptedXhr<X> {
    pub(crate) fn new(inner: X, pipeline: Arc<Pipeline>) -> Self {
        Self {
            inner,
            pipeline,
            destination: None,
        }
    }

    /// URL recorded by the last `open`, if any.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn uninstall(self) -> X {
        self.inner
    }
}

impl<X: XmlHttpRequest> XmlHttpRequest for InterceptedXhr<X> {
    fn open(&mut self, method: Method, url: &str) {
        self.destination = Some(url.to_string());
        self.inner.open(method, url);
    }

    fn send(&mut self, body: Option<Body>) {
        if let Some(url) = self.destination.as_deref() {
            self.pipeline.observe(Transport::Xhr, url, body.as_ref());
        }
        self.inner.send(body);
    }
}
