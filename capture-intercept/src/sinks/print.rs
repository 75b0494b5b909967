use async_trait::async_trait;

use metrics::counter;
use tracing::info;

use crate::api::SinkError;
use crate::sinks::{EventSink, SinkMessage};

pub struct PrintSink {}

#[async_trait]
impl EventSink for PrintSink {
    async fn publish(&self, message: SinkMessage) -> Result<(), SinkError> {
        let kind = message.kind();
        let payload = serde_json::to_string(&message)?;
        info!(kind, "message: {payload}");
        counter!("capture_intercept_published_total", "kind" => kind).increment(1);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::PrintSink;
    use crate::event::CanonicalEvent;
    use crate::sinks::{EventSink, SinkMessage};

    #[tokio::test]
    async fn publishing_always_succeeds() {
        let sink = PrintSink {};
        let message = SinkMessage::Capture(CanonicalEvent {
            event_name: "$pageview".to_string(),
            properties: Map::new(),
            distinct_id: None,
            timestamp: 0,
            url: "https://example.com/".to_string(),
            id: "1".to_string(),
        });

        assert!(sink.publish(message).await.is_ok());
    }
}
