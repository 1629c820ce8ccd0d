//! Turns a parsed response body into an [`Outcome`].
//!
//! The provider has been seen answering in three shapes once the code says
//! success: no `data` at all, `data` as base64 ciphertext, and `data` already
//! decrypted by a gateway in front of it. All three are accepted here.

use serde_json::Value;

use crate::Result;
use crate::error::Error;
use crate::upstream::cipher::CipherKey;
use crate::upstream::policy::{ClientPolicies, DecryptFailurePolicy};
use crate::upstream::types::{Outcome, Payload, PayloadSource, Rejection, ResponseEnvelope};

pub(crate) fn normalize(body: Value, key: &CipherKey, policies: &ClientPolicies) -> Result<Outcome> {
    if !body.is_object() {
        return Err(Error::protocol(format!(
            "response envelope must be a JSON object, got {}",
            kind_name(&body)
        )));
    }

    let envelope = serde_json::from_value::<ResponseEnvelope>(body.clone())
        .map_err(|e| Error::protocol(format!("malformed response envelope: {e}")))?;
    let code = envelope.code();
    let message = envelope.message();

    if !policies.success.is_success(code, message.as_deref()) {
        #[cfg(feature = "tracing")]
        tracing::warn!(?code, ?message, "upstream rejected call");

        return Ok(Outcome::Rejected(Rejection {
            code,
            message,
            envelope: body,
        }));
    }

    let payload = match envelope.data {
        None | Some(Value::Null) => Payload::new(PayloadSource::Envelope, body),
        Some(Value::String(text)) if is_blank(&text) => Payload::new(PayloadSource::Envelope, body),
        Some(Value::String(ciphertext)) => match key.decrypt(&ciphertext) {
            Ok(value) => Payload::new(PayloadSource::Decrypted, value),
            Err(err) => match policies.decrypt_failure {
                DecryptFailurePolicy::Fail => return Err(err),
                DecryptFailurePolicy::ReturnEnvelope => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %err, "returning undecrypted envelope");

                    Payload::new(PayloadSource::UndecryptedEnvelope, body)
                }
            },
        },
        Some(data @ (Value::Array(_) | Value::Object(_))) => {
            Payload::new(PayloadSource::PassThrough, data)
        }
        Some(other) => {
            return Err(Error::protocol(format!(
                "response data must be a string, object or array, got {}",
                kind_name(&other)
            )));
        }
    };

    Ok(Outcome::Success(payload))
}

// Some deployments send the literal string "null" instead of JSON null.
fn is_blank(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text == "null"
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
