use async_trait::async_trait;
use metrics::counter;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::api::SinkError;
use crate::sinks::{EventSink, SinkMessage};

/// Hands messages over to another context through an unbounded channel, so publishing
/// never waits on the consumer.
#[derive(Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<SinkMessage>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiver<SinkMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn publish(&self, message: SinkMessage) -> Result<(), SinkError> {
        let kind = message.kind();
        self.tx.send(message).map_err(|_| SinkError::Closed)?;
        counter!("capture_intercept_published_total", "kind" => kind).increment(1);
        Ok(())
    }
}
