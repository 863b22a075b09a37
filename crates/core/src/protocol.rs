//! Newline-delimited JSON records for the build-cache protocol.
//!
//! Requests and responses travel one record per line. A request whose
//! `BodySize` is positive is followed by exactly one more line carrying the
//! artifact body as a base64 JSON string; the newline is the framing
//! delimiter, `BodySize` is informational. Byte-valued fields (`ActionID`,
//! `OutputID`, the body) are standard base64 with padding, which is what the
//! existing callers of this wire format produce and consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{Error, Result};

/// Protocol commands, advertised in the handshake and closed thereafter.
///
/// An unrecognized command fails request decoding outright, which the
/// dispatcher treats as a fatal framing violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Get,
    Put,
    Close,
}

/// One request record from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Caller-assigned correlation token, unique per in-flight request.
    #[serde(rename = "ID")]
    pub id: i64,

    #[serde(rename = "Command")]
    pub command: Command,

    /// Opaque cache key. Required for get and put.
    #[serde(
        rename = "ActionID",
        default,
        with = "base64_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub action_id: Option<Vec<u8>>,

    /// Opaque artifact identity. Required for put.
    #[serde(
        rename = "OutputID",
        default,
        with = "base64_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub output_id: Option<Vec<u8>>,

    /// Declared body length; a positive value means a body line follows.
    #[serde(rename = "BodySize", default, skip_serializing_if = "is_zero")]
    pub body_size: i64,

    /// Body bytes from the continuation line. Never part of the record itself.
    #[serde(skip)]
    pub body: Option<Vec<u8>>,
}

/// One response record to the caller.
///
/// `err` and `miss` are mutually exclusive, and the success fields
/// (`output_id`, `size`, `disk_path`, `time`) never accompany either.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Echoes the originating request ID; 0 is reserved for the handshake.
    #[serde(rename = "ID")]
    pub id: i64,

    #[serde(rename = "Err", default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,

    /// Present only on the handshake.
    #[serde(
        rename = "KnownCommands",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub known_commands: Option<Vec<Command>>,

    /// True iff a get found nothing usable.
    #[serde(rename = "Miss", default, skip_serializing_if = "std::ops::Not::not")]
    pub miss: bool,

    #[serde(
        rename = "OutputID",
        default,
        with = "base64_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub output_id: Option<Vec<u8>>,

    #[serde(rename = "Size", default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,

    #[serde(rename = "Time", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    #[serde(rename = "DiskPath", default, skip_serializing_if = "Option::is_none")]
    pub disk_path: Option<String>,
}

impl Response {
    /// The unsolicited first record: ID 0 plus the supported command set.
    #[must_use]
    pub fn handshake() -> Self {
        Response {
            known_commands: Some(vec![Command::Get, Command::Put, Command::Close]),
            ..Response::default()
        }
    }

    /// Bare acknowledgement carrying only the correlation ID.
    #[must_use]
    pub fn ack(id: i64) -> Self {
        Response {
            id,
            ..Response::default()
        }
    }

    /// A get that found nothing usable.
    #[must_use]
    pub fn miss(id: i64) -> Self {
        Response {
            id,
            miss: true,
            ..Response::default()
        }
    }

    /// A failed get or put.
    #[must_use]
    pub fn error(id: i64, error: impl std::fmt::Display) -> Self {
        Response {
            id,
            err: Some(error.to_string()),
            ..Response::default()
        }
    }
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Reads one request record, plus its body continuation line when `BodySize`
/// is positive. Returns `Ok(None)` on clean end-of-stream at a record
/// boundary.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>>
where
    R: AsyncBufRead + Unpin,
{
    let Some(line) = read_line(reader).await? else {
        return Ok(None);
    };
    let mut request: Request = serde_json::from_str(&line)
        .map_err(|error| Error::protocol(format!("malformed request record: {error}")))?;

    if request.body_size > 0 {
        let Some(body_line) = read_line(reader).await? else {
            return Err(Error::protocol("end of stream while awaiting request body"));
        };
        request.body = Some(decode_body_line(&body_line)?);
    }

    Ok(Some(request))
}

/// Encodes one response as a single line and flushes it.
///
/// Callers that share the output stream across tasks must serialize calls;
/// see the response writer in the store crate.
pub async fn write_response<W>(writer: &mut W, response: &Response) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = serde_json::to_vec(response)?;
    encoded.push(b'\n');
    writer
        .write_all(&encoded)
        .await
        .map_err(|error| Error::protocol(format!("write response stream: {error}")))?;
    writer
        .flush()
        .await
        .map_err(|error| Error::protocol(format!("flush response stream: {error}")))?;
    Ok(())
}

async fn read_line<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let bytes = reader
        .read_line(&mut line)
        .await
        .map_err(|error| Error::protocol(format!("read request stream: {error}")))?;
    if bytes == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

fn decode_body_line(line: &str) -> Result<Vec<u8>> {
    use base64::prelude::{Engine as _, BASE64_STANDARD};

    let encoded: String = serde_json::from_str(line)
        .map_err(|error| Error::protocol(format!("malformed request body line: {error}")))?;
    BASE64_STANDARD
        .decode(encoded.as_bytes())
        .map_err(|error| Error::protocol(format!("malformed request body encoding: {error}")))
}

/// Serde adapter for optional byte fields carried as base64 JSON strings.
mod base64_bytes {
    use base64::prelude::{Engine as _, BASE64_STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_str(&BASE64_STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| BASE64_STANDARD.decode(text.as_bytes()))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
