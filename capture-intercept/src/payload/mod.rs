//! Payload normalization
//!
//! Turns an intercepted request body into JSON without trusting the page to tell us how
//! it was encoded. Bodies may be plain JSON, lz64, gzip (declared or not), base64, or a
//! urlencoded form wrapping any of these. Every failure ends in a [`DecodeFailure`]
//! marker, nothing here returns an error to the caller.

pub mod types;

use std::io::{self, Read};

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use bytes::Bytes;
use flate2::read::GzDecoder;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, field, instrument, Span};

use crate::api::DecodeFailure;
use crate::lz64;

pub use types::{Body, Compression, EventFormData, EventQuery};

static GZIP_MAGIC_NUMBERS: [u8; 3] = [0x1f, 0x8b, 8];

// Characters of the undecodable text kept in the raw marker
const RAW_PREVIEW_CHARS: usize = 500;

// atob() accepts missing padding, so do we
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Result of normalizing a body: a JSON value, or the marker explaining why not.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Decoded {
    Value(Value),
    Failure(DecodeFailure),
}

impl Decoded {
    pub fn is_failure(&self) -> bool {
        matches!(self, Decoded::Failure(_))
    }

    fn step(step: &'static str, value: Value) -> Self {
        counter!("capture_intercept_decode_total", "outcome" => step).increment(1);
        Decoded::Value(value)
    }

    fn failure(failure: DecodeFailure) -> Self {
        counter!("capture_intercept_decode_total", "outcome" => failure.reason()).increment(1);
        debug!(reason = failure.reason(), "payload could not be decoded");
        Decoded::Failure(failure)
    }
}

#[derive(Clone, Debug)]
pub struct PayloadDecoder {
    max_decompressed_size: usize,
}

impl Default for PayloadDecoder {
    fn default() -> Self {
        Self::new(25 * 1024 * 1024)
    }
}

impl PayloadDecoder {
    pub fn new(max_decompressed_size: usize) -> Self {
        Self {
            max_decompressed_size,
        }
    }

    /// Decodes `body` as sent to `url`. The decode ladder, first success wins:
    ///
    /// 1. binary bodies are gunzipped when declared or sniffed, then read as UTF-8
    /// 2. plain JSON
    /// 3. lz64, unless the URL declares gzip
    /// 4. base64, possibly wrapping gzip
    /// 5. a raw marker holding the start of the text
    #[instrument(skip_all, fields(compression, lib_version, body_len = body.len()))]
    pub async fn normalize(&self, url: &str, body: &Body) -> Decoded {
        let query = EventQuery::from_url(url);
        Span::current().record(
            "compression",
            field::display(query.compression.unwrap_or_default()),
        );
        Span::current().record("lib_version", query.lib_version.as_deref());

        match body {
            Body::Text(text) => self.decode_text(&query, text, false).await,
            Body::Binary(bytes) => match self.binary_to_text(&query, bytes).await {
                Ok((text, gunzipped)) => self.decode_text(&query, &text, gunzipped).await,
                Err(failure) => Decoded::failure(failure),
            },
        }
    }

    async fn binary_to_text(
        &self,
        query: &EventQuery,
        bytes: &Bytes,
    ) -> Result<(String, bool), DecodeFailure> {
        // posthog-js does not always set the compression param on gzipped bodies,
        // and sometimes sets it on bodies that are not, so check both
        if query.declares_gzip() || bytes.starts_with(&GZIP_MAGIC_NUMBERS) {
            match self.gunzip(bytes.clone()).await {
                Ok(decompressed) => {
                    let text = String::from_utf8(decompressed).map_err(|e| {
                        DecodeFailure::Blob {
                            blob_error: format!("invalid gzip body encoding: {e}"),
                        }
                    })?;
                    return Ok((text, true));
                }
                Err(e) => debug!("failed to decode gzip, reading body as is: {}", e),
            }
        }

        let text = String::from_utf8(bytes.to_vec()).map_err(|e| DecodeFailure::Blob {
            blob_error: format!("invalid body encoding: {e}"),
        })?;
        Ok((text, false))
    }

    async fn decode_text(&self, query: &EventQuery, original: &str, gunzipped: bool) -> Decoded {
        match serde_json::from_str::<Value>(original) {
            Ok(value) => return Decoded::step("json", value),
            // gzip is checksummed, what came out of it is the payload. Text that is not
            // JSON is a parse error here and never falls through to base64 or a raw marker.
            Err(e) if gunzipped => {
                return Decoded::failure(DecodeFailure::Parse {
                    parse_error: e.to_string(),
                })
            }
            Err(_) => {}
        }

        let mut compression = query.compression;
        let mut text = original;
        let form = form_data(original);
        if let Some(form) = &form {
            text = form.data.as_deref().unwrap_or_default();
            compression = form.compression.or(compression);
            if let Ok(value) = serde_json::from_str::<Value>(text) {
                return Decoded::step("form", value);
            }
        }

        if !matches!(compression, Some(Compression::Gzip)) {
            if let Some(value) = parse_lz64(text) {
                return Decoded::step("lz64", value);
            }
        }

        if let Some(value) = self.parse_base64(text).await {
            return Decoded::step("base64", value);
        }

        Decoded::failure(DecodeFailure::Raw {
            raw: original.chars().take(RAW_PREVIEW_CHARS).collect(),
            compressed: true,
        })
    }

    async fn parse_base64(&self, text: &str) -> Option<Value> {
        let cleaned: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let mut decoded = LENIENT_BASE64.decode(cleaned).ok()?;

        if decoded.starts_with(&GZIP_MAGIC_NUMBERS) {
            decoded = self
                .gunzip(decoded.into())
                .await
                .map_err(|e| debug!("failed to decode base64 wrapped gzip: {}", e))
                .ok()?;
        }

        serde_json::from_slice(&decoded).ok()
    }

    // Inflating is CPU bound, keep it off the event loop
    async fn gunzip(&self, bytes: Bytes) -> io::Result<Vec<u8>> {
        let limit = self.max_decompressed_size;
        tokio::task::spawn_blocking(move || gunzip_bounded(&bytes, limit))
            .await
            .map_err(io::Error::other)?
    }
}

fn gunzip_bounded(bytes: &[u8], limit: usize) -> io::Result<Vec<u8>> {
    let limit = u64::try_from(limit).unwrap_or(u64::MAX);
    let mut decompressed = Vec::with_capacity(bytes.len().saturating_mul(2));
    let read = GzDecoder::new(bytes)
        .take(limit.saturating_add(1))
        .read_to_end(&mut decompressed)?;

    if u64::try_from(read).unwrap_or(u64::MAX) > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("decompressed payload exceeds {limit} bytes"),
        ));
    }
    Ok(decompressed)
}

fn form_data(text: &str) -> Option<EventFormData> {
    if !text.contains("data=") {
        return None;
    }
    serde_urlencoded::from_str::<EventFormData>(text)
        .ok()
        .filter(|form| form.data.is_some())
}

fn parse_lz64(text: &str) -> Option<Value> {
    let decompressed = lz64::decompress_from_base64(text)?;
    if decompressed.is_empty() {
        return None;
    }
    serde_json::from_str(&decompressed).ok()
}
