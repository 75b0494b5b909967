use async_trait::async_trait;
use serde::Serialize;

use crate::api::SinkError;
use crate::event::{CanonicalEvent, IdentityUpdate};

pub mod channel;
pub mod print;
pub mod relay;

/// What gets handed to the consumer, serialized as `{"type": ..., "data": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum SinkMessage {
    Capture(CanonicalEvent),
    Identify(IdentityUpdate),
    SetPersonProperties(IdentityUpdate),
}

impl SinkMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkMessage::Capture(_) => "capture",
            SinkMessage::Identify(_) => "identify",
            SinkMessage::SetPersonProperties(_) => "setPersonProperties",
        }
    }
}

/// Fire-and-forget publish capability. Callers log and drop errors.
#[async_trait]
pub trait EventSink {
    async fn publish(&self, message: SinkMessage) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use serde_json::{json, Map};

    use super::SinkMessage;
    use crate::event::{CanonicalEvent, IdentityKind, IdentityUpdate};

    #[test]
    fn messages_serialize_with_type_and_data() {
        let capture = SinkMessage::Capture(CanonicalEvent {
            event_name: "$pageview".to_string(),
            properties: Map::new(),
            distinct_id: Some("user-1".to_string()),
            timestamp: 1_704_067_200_000,
            url: "https://example.com/".to_string(),
            id: "0190a1b2".to_string(),
        });
        assert_json_eq!(
            serde_json::to_value(&capture).unwrap(),
            json!({
                "type": "capture",
                "data": {
                    "eventName": "$pageview",
                    "properties": {},
                    "distinctId": "user-1",
                    "timestamp": 1_704_067_200_000_i64,
                    "url": "https://example.com/",
                    "id": "0190a1b2"
                }
            })
        );

        let identity = SinkMessage::SetPersonProperties(IdentityUpdate {
            kind: IdentityKind::SetPersonProperties,
            distinct_id: None,
            properties: Map::new(),
            properties_set_once: Map::new(),
            timestamp: 1,
        });
        assert_json_eq!(
            serde_json::to_value(&identity).unwrap(),
            json!({
                "type": "setPersonProperties",
                "data": {
                    "distinctId": null,
                    "properties": {},
                    "propertiesSetOnce": {},
                    "timestamp": 1
                }
            })
        );
    }
}
