//! Wrappers around the three transports posthog-js sends with.
//!
//! Each wrapper keeps the wrapped primitive's signature and return value. Matching calls
//! are handed to the [`Pipeline`] as detached tasks before the call is forwarded, so
//! decoding never delays the original call. Uninstalling a wrapper gives back the
//! primitive it was installed over.

use std::sync::Arc;

use tracing::{debug, info};

use crate::pipeline::Pipeline;

pub mod beacon;
pub mod fetch;
pub mod xhr;

pub use beacon::{Beacon, InterceptedBeacon};
pub use fetch::{Fetch, FetchRequest, InterceptedFetch};
pub use xhr::{InterceptedXhr, XmlHttpRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Fetch,
    Xhr,
    Beacon,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Fetch => "fetch",
            Transport::Xhr => "xhr",
            Transport::Beacon => "beacon",
        }
    }
}

/// Installs interceptors that all feed the same pipeline.
#[derive(Clone)]
pub struct InterceptionLayer {
    pipeline: Arc<Pipeline>,
}

impl InterceptionLayer {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn install_fetch<F: Fetch>(&self, inner: F) -> InterceptedFetch<F> {
        debug!(transport = Transport::Fetch.as_str(), "installing interceptor");
        InterceptedFetch::new(inner, Arc::clone(&self.pipeline))
    }

    pub fn install_xhr<X: XmlHttpRequest>(&self, inner: X) -> InterceptedXhr<X> {
        debug!(transport = Transport::Xhr.as_str(), "installing interceptor");
        InterceptedXhr::new(inner, Arc::clone(&self.pipeline))
    }

    /// The beacon primitive is optional in some hosts, nothing is installed without one.
    pub fn install_beacon<B: Beacon>(&self, inner: Option<B>) -> Option<InterceptedBeacon<B>> {
        let Some(inner) = inner else {
            info!("beacon transport unavailable, skipping interceptor");
            return None;
        };
        debug!(transport = Transport::Beacon.as_str(), "installing interceptor");
        Some(InterceptedBeacon::new(inner, Arc::clone(&self.pipeline)))
    }
}
