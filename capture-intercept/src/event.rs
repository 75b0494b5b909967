use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::payload::Decoded;
use crate::sinks::SinkMessage;
use crate::time::TimeSource;

/// One recognized event occurrence, in the shape consumers render.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    pub event_name: String,
    pub properties: Map<String, Value>,
    pub distinct_id: Option<String>,
    pub timestamp: i64,
    pub url: String,
    pub id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityKind {
    /// Sent to an identify or engage endpoint
    Identify,
    /// `$set` / `$set_once` riding along with an event
    SetPersonProperties,
}

/// Snapshot of the person properties seen in a payload. Merging with earlier
/// snapshots is left to the consumer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityUpdate {
    #[serde(skip)]
    pub kind: IdentityKind,
    pub distinct_id: Option<String>,
    pub properties: Map<String, Value>,
    pub properties_set_once: Map<String, Value>,
    pub timestamp: i64,
}

#[derive(Debug, Default, PartialEq)]
pub struct Extraction {
    pub events: Vec<CanonicalEvent>,
    pub identity_updates: Vec<IdentityUpdate>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.identity_updates.is_empty()
    }

    /// Flattens into sink messages. Identity updates go first, as the page hands
    /// person properties over while walking the payload, before its events.
    pub fn into_messages(self) -> Vec<SinkMessage> {
        let identities = self
            .identity_updates
            .into_iter()
            .map(|update| match update.kind {
                IdentityKind::Identify => SinkMessage::Identify(update),
                IdentityKind::SetPersonProperties => SinkMessage::SetPersonProperties(update),
            });
        let events = self.events.into_iter().map(SinkMessage::Capture);
        identities.chain(events).collect()
    }
}

/// Loose view of an event object. Every field is optional and untyped as SDKs send
/// whatever they like.
#[derive(Default, Debug, Deserialize)]
struct RawEvent {
    event: Option<Value>,
    properties: Option<Value>,
    distinct_id: Option<Value>,
    #[serde(rename = "$distinct_id")]
    dollar_distinct_id: Option<Value>,
    timestamp: Option<Value>,
    #[serde(rename = "$set")]
    set: Option<Value>,
    #[serde(rename = "$set_once")]
    set_once: Option<Value>,
    batch: Option<Value>,
}

impl RawEvent {
    fn from_value(value: &Value) -> Self {
        if !value.is_object() {
            return RawEvent::default();
        }
        RawEvent::deserialize(value).unwrap_or_else(|e| {
            debug!("failed to read event fields: {}", e);
            RawEvent::default()
        })
    }

    fn property(&self, key: &str) -> Option<&Value> {
        self.properties.as_ref().and_then(|properties| properties.get(key))
    }

    fn properties(&self) -> Map<String, Value> {
        as_map(self.properties.as_ref())
    }

    // Payload time when it carries one, the interception moment otherwise
    fn timestamp_or(&self, now: i64) -> i64 {
        timestamp_millis(self.timestamp.as_ref()).unwrap_or(now)
    }

    fn has_person_properties(&self) -> bool {
        truthy(self.set.as_ref()) || truthy(self.set_once.as_ref())
    }
}

#[derive(Clone)]
pub struct Extractor {
    page_url: Option<String>,
    timesource: Arc<dyn TimeSource + Send + Sync>,
}

impl Extractor {
    pub fn new(page_url: Option<String>, timesource: Arc<dyn TimeSource + Send + Sync>) -> Self {
        Self {
            page_url,
            timesource,
        }
    }

    /// Classifies a decoded payload sent to `url`. Recognized shapes, in order:
    /// an array of events, a single event, an identify payload (or anything sent to an
    /// identify/engage endpoint), and a `{"batch": [...]}` wrapper.
    #[instrument(skip_all)]
    pub fn extract(&self, decoded: &Decoded, url: &str) -> Extraction {
        let Decoded::Value(data) = decoded else {
            return Extraction::default();
        };
        if is_failure_marker(data) {
            return Extraction::default();
        }

        let now = self.timesource.current_millis();
        let page_url = self.page_url.as_deref().unwrap_or(url);
        let mut extraction = Extraction::default();

        if let Value::Array(items) = data {
            self.extract_items(items, page_url, now, &mut extraction);
        } else {
            let raw = RawEvent::from_value(data);

            if truthy(raw.event.as_ref()) {
                self.extract_item(&raw, page_url, now, &mut extraction);
            } else if truthy(raw.set.as_ref())
                || url.contains("/identify")
                || url.contains("/engage")
            {
                extraction.identity_updates.push(IdentityUpdate {
                    kind: IdentityKind::Identify,
                    distinct_id: first_id([raw.dollar_distinct_id.as_ref(), raw.distinct_id.as_ref()]),
                    properties: as_map(raw.set.as_ref()),
                    properties_set_once: as_map(raw.set_once.as_ref()),
                    timestamp: raw.timestamp_or(now),
                });
            } else if let Some(Value::Array(items)) = &raw.batch {
                self.extract_items(items, page_url, now, &mut extraction);
            }
        }

        counter!("capture_intercept_extracted_total", "kind" => "event")
            .increment(extraction.events.len() as u64);
        counter!("capture_intercept_extracted_total", "kind" => "identity")
            .increment(extraction.identity_updates.len() as u64);
        extraction
    }

    fn extract_items(&self, items: &[Value], page_url: &str, now: i64, out: &mut Extraction) {
        for item in items {
            self.extract_item(&RawEvent::from_value(item), page_url, now, out);
        }
    }

    // An item can carry both an event and person properties
    fn extract_item(&self, raw: &RawEvent, page_url: &str, now: i64, out: &mut Extraction) {
        if let Some(name) = raw.event.as_ref().filter(|v| truthy(Some(*v))) {
            out.events.push(CanonicalEvent {
                event_name: stringify(name),
                properties: raw.properties(),
                distinct_id: first_id([raw.property("$distinct_id"), raw.distinct_id.as_ref()]),
                timestamp: raw.timestamp_or(now),
                url: page_url.to_string(),
                id: Uuid::now_v7().to_string(),
            });
        }

        if raw.has_person_properties() {
            out.identity_updates.push(IdentityUpdate {
                kind: IdentityKind::SetPersonProperties,
                distinct_id: first_id([
                    raw.dollar_distinct_id.as_ref(),
                    raw.distinct_id.as_ref(),
                    raw.property("$distinct_id"),
                ]),
                properties: as_map(raw.set.as_ref()),
                properties_set_once: as_map(raw.set_once.as_ref()),
                timestamp: raw.timestamp_or(now),
            });
        }
    }
}

// Decoded JSON can itself look like one of our failure markers, the page treats those
// the same way
fn is_failure_marker(data: &Value) -> bool {
    if !truthy(Some(data)) {
        return true;
    }
    ["raw", "parseError", "blob", "blobError"]
        .iter()
        .any(|key| truthy(data.get(key)))
}

/// JavaScript truthiness, the SDKs lean on it for optional fields.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn as_map(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

// Numbers and containers are accepted as ids too, stringify them
fn stringify(value: &Value) -> String {
    value
        .as_str()
        .map(|s| s.to_owned())
        .unwrap_or_else(|| value.to_string())
}

fn first_id<const N: usize>(candidates: [Option<&Value>; N]) -> Option<String> {
    candidates
        .into_iter()
        .find(|candidate| truthy(*candidate))
        .flatten()
        .map(stringify)
}

/// Numeric timestamps are epoch milliseconds, strings are ISO 8601.
fn timestamp_millis(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64))
            .filter(|millis| *millis != 0),
        Value::String(s) => OffsetDateTime::parse(s, &Rfc3339)
            .or_else(|_| OffsetDateTime::parse(s, &Iso8601::DEFAULT))
            .ok()
            .and_then(|parsed| i64::try_from(parsed.unix_timestamp_nanos() / 1_000_000).ok()),
        _ => None,
    }
}
