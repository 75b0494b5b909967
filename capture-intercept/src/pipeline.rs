use std::sync::Arc;

use metrics::counter;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn, Span};

use crate::api::DecodeFailure;
use crate::config::Config;
use crate::endpoints::EndpointSet;
use crate::event::Extractor;
use crate::intercept::Transport;
use crate::payload::{Body, Decoded, PayloadDecoder};
use crate::sinks::EventSink;
use crate::time::{SystemTime, TimeSource};

/// Decode, extract and publish, shared by every installed interceptor.
pub struct Pipeline {
    endpoints: EndpointSet,
    decoder: PayloadDecoder,
    extractor: Extractor,
    sink: Arc<dyn EventSink + Send + Sync>,
}

impl Pipeline {
    pub fn new(
        endpoints: EndpointSet,
        decoder: PayloadDecoder,
        extractor: Extractor,
        sink: Arc<dyn EventSink + Send + Sync>,
    ) -> Self {
        Self {
            endpoints,
            decoder,
            extractor,
            sink,
        }
    }

    pub fn from_config(config: &Config, sink: Arc<dyn EventSink + Send + Sync>) -> Self {
        let timesource: Arc<dyn TimeSource + Send + Sync> = Arc::new(SystemTime {});
        Self::new(
            config.capture_endpoints.clone(),
            PayloadDecoder::new(config.max_decompressed_size),
            Extractor::new(config.page_url.clone(), timesource),
            sink,
        )
    }

    pub fn matches(&self, url: &str) -> bool {
        self.endpoints.matches(url)
    }

    /// Hands a matching call over to a detached task and returns immediately. Nothing is
    /// spawned for unmatched URLs, absent bodies or when called outside a tokio runtime.
    pub fn observe(
        self: &Arc<Self>,
        transport: Transport,
        url: &str,
        body: Option<&Body>,
    ) -> Option<JoinHandle<()>> {
        if !self.matches(url) {
            return None;
        }
        let body = body.filter(|body| body.is_present())?.clone();

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(transport = transport.as_str(), "no runtime to process payload: {}", e);
                return None;
            }
        };

        counter!("capture_intercept_payloads_total", "transport" => transport.as_str())
            .increment(1);

        let pipeline = Arc::clone(self);
        let url = url.to_string();
        Some(handle.spawn(async move {
            match pipeline.process(&url, &body).await {
                Ok(published) => debug!(transport = transport.as_str(), published, "payload processed"),
                Err(failure) => debug!(
                    transport = transport.as_str(),
                    reason = failure.reason(),
                    "payload not decoded: {}",
                    failure
                ),
            }
        }))
    }

    /// Runs a single payload through the pipeline and returns how many messages reached
    /// the sink. Publish errors are logged and skipped so one bad message does not drop
    /// the rest of the batch.
    #[instrument(skip_all, fields(url = url, published))]
    pub async fn process(&self, url: &str, body: &Body) -> Result<usize, DecodeFailure> {
        let decoded = self.decoder.normalize(url, body).await;
        if let Decoded::Failure(failure) = decoded {
            return Err(failure);
        }

        let messages = self.extractor.extract(&decoded, url).into_messages();
        let mut published = 0;
        for message in messages {
            let kind = message.kind();
            match self.sink.publish(message).await {
                Ok(()) => published += 1,
                Err(e) => {
                    counter!("capture_intercept_publish_errors_total", "kind" => kind)
                        .increment(1);
                    warn!(kind, "failed to publish message: {}", e);
                }
            }
        }

        Span::current().record("published", published);
        Ok(published)
    }
}
