//! Response envelope decoding and status classification.
//!
//! The backend wraps every payload as `{success, data, message?}`. Error
//! responses may instead carry `{detail}` and/or `{message}`.

use crate::error::FetchError;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Decodes a 2xx body into its payload.
///
/// `success: false` becomes [`FetchError::Application`]; a body that is not a
/// valid envelope becomes [`FetchError::InvalidResponse`].
pub fn parse_envelope(body: &[u8]) -> Result<Value, FetchError> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| FetchError::InvalidResponse(format!("malformed envelope: {}", e)))?;

    if envelope.success {
        Ok(envelope.data)
    } else {
        Err(FetchError::Application {
            message: envelope.message,
        })
    }
}

/// Classifies a non-2xx response.
///
/// 4xx maps to [`FetchError::Client`], everything else to
/// [`FetchError::Server`]. `detail` and `message` are extracted when the body
/// is JSON; a non-JSON body is ignored.
pub fn error_from_status(status: u16, body: &[u8]) -> FetchError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let detail = parsed.detail.and_then(detail_text);
    let message = parsed.message;

    if (400..500).contains(&status) {
        FetchError::Client {
            status,
            detail,
            message,
        }
    } else {
        FetchError::Server {
            status,
            detail,
            message,
        }
    }
}

fn detail_text(detail: Value) -> Option<String> {
    match detail {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
