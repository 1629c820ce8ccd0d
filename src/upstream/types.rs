use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DisplayFromStr, serde_as};

use crate::error::Error;
use crate::{Result, Timestamp};

/// Signed body sent with every call.
#[non_exhaustive]
#[serde_as]
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub version: String,
    pub encrypt: String,
    pub app_key: String,
    pub req_id: String,
    #[serde_as(as = "DisplayFromStr")]
    pub timestamp: Timestamp,
    /// Base64 AES ciphertext of the canonical JSON params.
    pub params: String,
    pub app_username: String,
    pub sign: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_order_no: Option<String>,
}

/// Raw response envelope as returned by the provider.
///
/// Every field is kept as loose JSON. Deployments disagree on the message key
/// and on its type, and a success envelope must not be refused over either.
#[non_exhaustive]
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub msg: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    /// Numeric code, accepting both `0` and `"0"` on the wire.
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        match self.code.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Message text from `msg`, falling back to `message`.
    ///
    /// Strings win over other JSON types; numbers and booleans are rendered.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        let candidates = [self.msg.as_ref(), self.message.as_ref()];

        candidates
            .iter()
            .flatten()
            .find_map(|v| v.as_str().map(str::to_owned))
            .or_else(|| {
                candidates.iter().flatten().find_map(|v| match v {
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
            })
    }
}

/// Where a [`Payload`] value came from.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PayloadSource {
    /// `data` was absent, so the whole envelope is the result.
    Envelope,
    /// `data` was ciphertext and decrypted cleanly.
    Decrypted,
    /// `data` was already structured and passed through untouched.
    PassThrough,
    /// `data` was ciphertext that failed to decrypt; the envelope is returned
    /// under [`DecryptFailurePolicy::ReturnEnvelope`](crate::upstream::DecryptFailurePolicy::ReturnEnvelope).
    UndecryptedEnvelope,
}

/// Normalised result of a successful call. Always a JSON object or array.
#[derive(Clone, Debug, PartialEq)]
pub struct Payload {
    source: PayloadSource,
    value: Value,
}

impl Payload {
    pub(crate) fn new(source: PayloadSource, value: Value) -> Self {
        Self { source, value }
    }

    #[must_use]
    pub fn source(&self) -> PayloadSource {
        self.source
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Maps the payload into a caller type.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        #[cfg(feature = "tracing")]
        let parsed = deserialize_traced(self.value);
        #[cfg(not(feature = "tracing"))]
        let parsed = serde_json::from_value(self.value)
            .map_err(|e| Error::protocol(format!("payload mismatch: {e}")));

        parsed
    }
}

#[cfg(feature = "tracing")]
fn deserialize_traced<T: DeserializeOwned>(value: Value) -> Result<T> {
    let mut unknown = Vec::new();
    let mut on_ignored = |path: serde_ignored::Path<'_>| unknown.push(path.to_string());
    let de = serde_ignored::Deserializer::new(value, &mut on_ignored);
    let parsed = serde_path_to_error::deserialize::<_, T>(de).map_err(|e| {
        let path = e.path().to_string();
        tracing::warn!(%path, error = %e.inner(), "payload does not match target type");
        Error::protocol(format!("payload mismatch at `{path}`: {}", e.inner()))
    })?;

    if !unknown.is_empty() {
        tracing::debug!(fields = ?unknown, "payload carried fields the target type ignores");
    }

    Ok(parsed)
}

/// Application-level failure reported inside a well-formed envelope.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub struct Rejection {
    pub code: Option<i64>,
    pub message: Option<String>,
    /// Full envelope as received, for callers that inspect extra fields.
    pub envelope: Value,
}

/// Result of a call that reached the provider and got a well-formed answer.
#[expect(
    clippy::exhaustive_enums,
    reason = "a well-formed answer is either accepted or rejected"
)]
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Success(Payload),
    Rejected(Rejection),
}

impl Outcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    #[must_use]
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Outcome::Success(p) => Some(p),
            Outcome::Rejected(_) => None,
        }
    }

    /// Folds a rejection into [`Kind::Rejected`](crate::error::Kind::Rejected).
    pub fn into_payload(self) -> Result<Payload> {
        match self {
            Outcome::Success(p) => Ok(p),
            Outcome::Rejected(r) => Err(Error::rejected(r.code, r.message)),
        }
    }
}
