//! Types describing an intercepted request body and the hints its URL carries

use bytes::Bytes;
use serde::{Deserialize, Deserializer};
use tracing::debug;

#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Compression {
    #[default]
    Unsupported,
    Gzip,
    LZString,
    Base64,
}

impl Compression {
    /// Maps a hint value the SDKs send. Unknown values degrade to Unsupported.
    pub fn from_hint(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "gzip" | "gzip-js" => Compression::Gzip,
            "lz64" | "lz-string" => Compression::LZString,
            "base64" | "b64" => Compression::Base64,
            _ => {
                debug!("unsupported compression value: {}", value);
                Compression::Unsupported
            }
        }
    }
}

// implement Deserialize directly on the enum so an unknown value
// degrades to Unsupported instead of failing the whole form
impl<'de> Deserialize<'de> for Compression {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match String::deserialize(deserializer) {
            Ok(value) => Ok(Compression::from_hint(&value)),
            Err(_) => {
                debug!("compression value did not deserialize");
                Ok(Compression::Unsupported)
            }
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::Gzip => write!(f, "gzip"),
            Compression::LZString => write!(f, "lz64"),
            Compression::Base64 => write!(f, "base64"),
            Compression::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Query parameters posthog-js appends to its capture URLs.
#[derive(Default, Debug, PartialEq, Eq)]
pub struct EventQuery {
    pub compression: Option<Compression>,
    pub lib_version: Option<String>,
}

impl EventQuery {
    /// Parses the query string of a possibly relative URL. When a parameter repeats, or
    /// both `ver` and `lib_version` are present, the first value wins and the rest of the
    /// query is still read.
    pub fn from_url(url: &str) -> Self {
        let query = url.split_once('?').map(|(_, query)| query).unwrap_or_default();
        let query = query.split_once('#').map_or(query, |(query, _)| query);

        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_else(|e| {
            debug!("ignoring malformed query string: {}", e);
            Vec::new()
        });

        let mut parsed = EventQuery::default();
        for (key, value) in pairs {
            match key.as_str() {
                "compression" if parsed.compression.is_none() => {
                    parsed.compression = Some(Compression::from_hint(&value));
                }
                "lib_version" | "ver" if parsed.lib_version.is_none() => {
                    parsed.lib_version = Some(value);
                }
                _ => {}
            }
        }
        parsed
    }

    pub fn declares_gzip(&self) -> bool {
        matches!(self.compression, Some(Compression::Gzip))
    }
}

// Some SDKs like posthog-js-lite send the payload as a urlencoded form
#[derive(Deserialize, Default)]
pub struct EventFormData {
    pub data: Option<String>,
    pub compression: Option<Compression>,
}

/// The payload attached to an intercepted call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Binary(Bytes),
}

impl Body {
    /// Mirrors the truthiness check done on bodies by the page: an empty string is no
    /// body at all, while a binary blob always counts.
    pub fn is_present(&self) -> bool {
        match self {
            Body::Text(text) => !text.is_empty(),
            Body::Binary(_) => true,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Body::Text(text) => text.len(),
            Body::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Binary(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Binary(bytes.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_deserialization() {
        for (raw, expected) in [
            (r#""gzip""#, Compression::Gzip),
            (r#""gzip-js""#, Compression::Gzip),
            (r#""lz64""#, Compression::LZString),
            (r#""lz-string""#, Compression::LZString),
            (r#""base64""#, Compression::Base64),
            (r#""b64""#, Compression::Base64),
            (r#""zstd""#, Compression::Unsupported),
        ] {
            let compression: Compression = serde_json::from_str(raw).unwrap();
            assert_eq!(compression, expected, "parsing {raw}");
        }
    }

    #[test]
    fn test_compression_display() {
        assert_eq!(Compression::Gzip.to_string(), "gzip");
        assert_eq!(Compression::LZString.to_string(), "lz64");
        assert_eq!(Compression::Base64.to_string(), "base64");
        assert_eq!(Compression::Unsupported.to_string(), "unsupported");
    }

    #[test]
    fn test_event_query_from_url() {
        let query =
            EventQuery::from_url("https://us.posthog.com/e/?ip=1&_=1704067200000&ver=1.96.1&compression=gzip-js");
        assert_eq!(query.compression, Some(Compression::Gzip));
        assert_eq!(query.lib_version.as_deref(), Some("1.96.1"));
        assert!(query.declares_gzip());

        let query = EventQuery::from_url("/batch/?compression=lz64#fragment");
        assert_eq!(query.compression, Some(Compression::LZString));
        assert!(!query.declares_gzip());

        let query = EventQuery::from_url("https://us.posthog.com/decide/");
        assert_eq!(query.compression, None);
        assert_eq!(query.lib_version, None);
    }

    #[test]
    fn test_event_query_keeps_first_of_repeated_params() {
        let query = EventQuery::from_url(
            "https://us.posthog.com/e/?compression=gzip-js&ver=1.96.1&lib_version=1.0.0&compression=lz64",
        );
        assert_eq!(query.compression, Some(Compression::Gzip));
        assert_eq!(query.lib_version.as_deref(), Some("1.96.1"));
        assert!(query.declares_gzip());

        let query = EventQuery::from_url("/batch/?ver=2.0.0&compression=lz64&compression=gzip");
        assert_eq!(query.compression, Some(Compression::LZString));
        assert_eq!(query.lib_version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_event_form_data() {
        let form: EventFormData =
            serde_urlencoded::from_str("data=eyJldmVudCI6ImEifQ%3D%3D&compression=base64").unwrap();
        assert_eq!(form.data.as_deref(), Some("eyJldmVudCI6ImEifQ=="));
        assert_eq!(form.compression, Some(Compression::Base64));
    }

    #[test]
    fn test_body_presence() {
        assert!(!Body::from("").is_present());
        assert!(Body::from("{}").is_present());
        assert!(Body::from(Vec::new()).is_present());
    }
}
