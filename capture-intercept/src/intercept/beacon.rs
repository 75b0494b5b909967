use std::sync::Arc;

use crate::intercept::Transport;
use crate::payload::Body;
use crate::pipeline::Pipeline;

/// Best-effort send, returning whether the host queued the data.
pub trait Beacon {
    fn send_beacon(&self, url: &str, data: Option<Body>) -> bool;
}

pub struct InterceptedBeacon<B> {
    inner: B,
    pipeline: Arc<Pipeline>,
}

impl<B: Beacon> InterceptedBeacon<B> {
    pub(crate) fn new(inner: B, pipeline: Arc<Pipeline>) -> Self {
        Self { inner, pipeline }
    }

    pub fn uninstall(self) -> B {
        self.inner
    }
}

impl<B: Beacon> Beacon for InterceptedBeacon<B> {
    fn send_beacon(&self, url: &str, data: Option<Body>) -> bool {
        self.pipeline.observe(Transport::Beacon, url, data.as_ref());
        self.inner.send_beacon(url, data)
    }
}
