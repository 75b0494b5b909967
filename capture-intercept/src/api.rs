use serde::Serialize;
use thiserror::Error;

/// Terminal outcome for a payload that could not be decoded into JSON. The serialized
/// form is the marker object consumers already understand, e.g. `{"parseError": "..."}`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DecodeFailure {
    #[error("unrecognized payload encoding")]
    Raw { raw: String, compressed: bool },
    #[error("failed to parse decoded payload: {parse_error}")]
    Parse {
        #[serde(rename = "parseError")]
        parse_error: String,
    },
    #[error("failed to read binary payload: {blob_error}")]
    Blob {
        #[serde(rename = "blobError")]
        blob_error: String,
    },
}

impl DecodeFailure {
    /// Short label used for metrics and log fields.
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeFailure::Raw { .. } => "raw",
            DecodeFailure::Parse { .. } => "parse_error",
            DecodeFailure::Blob { .. } => "blob_error",
        }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink is closed")]
    Closed,
    #[error("failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    use super::DecodeFailure;

    #[test]
    fn failures_serialize_as_markers() {
        let raw = DecodeFailure::Raw {
            raw: "abc".to_string(),
            compressed: true,
        };
        assert_json_eq!(
            serde_json::to_value(&raw).unwrap(),
            json!({"raw": "abc", "compressed": true})
        );

        let parse = DecodeFailure::Parse {
            parse_error: "expected value".to_string(),
        };
        assert_json_eq!(
            serde_json::to_value(&parse).unwrap(),
            json!({"parseError": "expected value"})
        );

        let blob = DecodeFailure::Blob {
            blob_error: "invalid utf-8".to_string(),
        };
        assert_json_eq!(
            serde_json::to_value(&blob).unwrap(),
            json!({"blobError": "invalid utf-8"})
        );
        assert_eq!(blob.reason(), "blob_error");
    }
}
