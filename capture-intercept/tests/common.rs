#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use flate2::write::GzEncoder;
use http::Method;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;
use tokio::time::timeout;

use capture_intercept::api::SinkError;
use capture_intercept::endpoints::EndpointSet;
use capture_intercept::event::Extractor;
use capture_intercept::intercept::{Beacon, Fetch, FetchRequest, InterceptionLayer, XmlHttpRequest};
use capture_intercept::payload::{Body, PayloadDecoder};
use capture_intercept::pipeline::Pipeline;
use capture_intercept::sinks::channel::ChannelSink;
use capture_intercept::sinks::{EventSink, SinkMessage};
use capture_intercept::time::TimeSource;

pub const NOW: i64 = 1_704_067_200_000;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// Long enough for a detached task to have run if one had been spawned
pub const QUIET_PERIOD: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct FixedTime {
    pub millis: i64,
}

impl TimeSource for FixedTime {
    fn current_millis(&self) -> i64 {
        self.millis
    }
}

pub fn pipeline_with(sink: Arc<dyn EventSink + Send + Sync>) -> Pipeline {
    Pipeline::new(
        EndpointSet::default(),
        PayloadDecoder::default(),
        Extractor::new(None, Arc::new(FixedTime { millis: NOW })),
        sink,
    )
}

pub fn channel_layer() -> (InterceptionLayer, UnboundedReceiver<SinkMessage>) {
    let (sink, rx) = ChannelSink::new();
    (InterceptionLayer::new(pipeline_with(Arc::new(sink))), rx)
}

pub async fn next_message(rx: &mut UnboundedReceiver<SinkMessage>) -> SinkMessage {
    timeout(DEFAULT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("sink channel closed")
}

pub async fn assert_quiet(rx: &mut UnboundedReceiver<SinkMessage>) {
    if let Ok(message) = timeout(QUIET_PERIOD, rx.recv()).await {
        panic!("unexpected message: {:?}", message);
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn lz64(data: &str) -> String {
    let utf16_bytes: Vec<u16> = data.encode_utf16().collect();
    lz_str::compress_to_base64(utf16_bytes)
}

pub fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
}

/// Records every request and answers with a fixed status.
#[derive(Clone, Default)]
pub struct MockFetch {
    pub id: u32,
    pub requests: Arc<Mutex<Vec<FetchRequest>>>,
}

impl MockFetch {
    pub fn with_id(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetch for MockFetch {
    type Response = MockResponse;

    async fn fetch(&self, request: FetchRequest) -> MockResponse {
        self.requests.lock().unwrap().push(request);
        MockResponse { status: 200 }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum XhrCall {
    Open(Method, String),
    Send(Option<Body>),
}

#[derive(Clone, Default)]
pub struct MockXhr {
    pub calls: Arc<Mutex<Vec<XhrCall>>>,
}

impl XmlHttpRequest for MockXhr {
    fn open(&mut self, method: Method, url: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(XhrCall::Open(method, url.to_string()));
    }

    fn send(&mut self, body: Option<Body>) {
        self.calls.lock().unwrap().push(XhrCall::Send(body));
    }
}

#[derive(Clone, Default)]
pub struct MockBeacon {
    pub accept: bool,
    pub calls: Arc<AtomicUsize>,
}

impl Beacon for MockBeacon {
    fn send_beacon(&self, _url: &str, _data: Option<Body>) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.accept
    }
}

/// Holds every publish until the gate is opened.
pub struct GatedSink {
    pub gate: Arc<Notify>,
    pub inner: ChannelSink,
}

#[async_trait]
impl EventSink for GatedSink {
    async fn publish(&self, message: SinkMessage) -> Result<(), SinkError> {
        self.gate.notified().await;
        self.inner.publish(message).await
    }
}
