//! JSON wire codec for envelopes and telemetry records.
//!
//! Field order follows the struct declarations and sets are sorted, so the
//! same envelope always encodes to the same bytes. Unknown fields are ignored
//! on decode. A payload that cannot be decoded yields a [`DecodeError`]
//! pointing at the offending bytes; no partially built value escapes.

use serde::de::DeserializeOwned;
use std::ops::Range;
use thiserror::Error;

use crate::envelope::Envelope;
use crate::model::TruckTelemetry;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8 at bytes {span:?}")]
    InvalidUtf8 { span: Range<usize> },
    #[error("payload truncated at bytes {span:?}: {message}")]
    Truncated { span: Range<usize>, message: String },
    #[error("malformed JSON at bytes {span:?}: {message}")]
    Syntax { span: Range<usize>, message: String },
    #[error("payload does not match schema at bytes {span:?}: {message}")]
    Data { span: Range<usize>, message: String },
}

impl DecodeError {
    /// Byte range of the input the decoder rejected.
    pub fn span(&self) -> Range<usize> {
        match self {
            DecodeError::InvalidUtf8 { span }
            | DecodeError::Truncated { span, .. }
            | DecodeError::Syntax { span, .. }
            | DecodeError::Data { span, .. } => span.clone(),
        }
    }
}

#[derive(Error, Debug)]
#[error("failed to encode payload: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(envelope)?)
}

pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    decode_json(bytes)
}

/// Decodes a bare telemetry record, as served by the data source.
pub fn decode_telemetry(bytes: &[u8]) -> Result<TruckTelemetry, DecodeError> {
    decode_json(bytes)
}

pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let start = e.valid_up_to();
        let end = e
            .error_len()
            .map_or(bytes.len(), |len| start + len);
        DecodeError::InvalidUtf8 { span: start..end }
    })?;

    serde_json::from_str(text).map_err(|e| {
        let span = error_span(text, &e);
        let message = e.to_string();
        match e.classify() {
            serde_json::error::Category::Eof => DecodeError::Truncated { span, message },
            serde_json::error::Category::Data => DecodeError::Data { span, message },
            _ => DecodeError::Syntax { span, message },
        }
    })
}

// serde_json reports 1-based lines and a byte column pointing at the last
// byte it consumed.
fn error_span(text: &str, err: &serde_json::Error) -> Range<usize> {
    let len = text.len();
    if err.line() == 0 {
        return 0..len;
    }
    let line_start: usize = text
        .split_inclusive('\n')
        .take(err.line() - 1)
        .map(str::len)
        .sum();
    let end = (line_start + err.column()).min(len);
    if err.is_eof() {
        end..len
    } else {
        end.saturating_sub(1)..end
    }
}

/// Timestamps on the wire: RFC 3339, UTC, fixed nanosecond precision, so the
/// text sorts in time order. Offset-less ISO-8601 input is read as UTC.
pub mod iso8601 {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Ok(ts.with_timezone(&Utc)),
            Err(err) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| Utc.from_utc_datetime(&naive))
                .map_err(|_| err),
        }
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer, de};

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_some(&super::format(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| super::parse(&raw).map_err(de::Error::custom))
                .transpose()
        }
    }
}
