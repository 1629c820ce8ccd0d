use std::str::FromStr;

use bon::Builder;
use strum_macros::Display;

use crate::Result;
use crate::error::Error;

/// Wire shape of the outbound request.
///
/// Both shapes carry the signed JSON body. Deployments differ in whether the
/// timestamp and signature are repeated as headers.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, Display, Eq, PartialEq)]
pub enum EnvelopeVariant {
    /// Adds `X-Timestamp`, `X-Sign` and, with an order number, `X-App-Order-No`.
    #[default]
    HeaderSigned,
    /// Signature travels in the body only.
    BodySigned,
}

impl FromStr for EnvelopeVariant {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "header" | "headers" | "header_signed" | "headersigned" => {
                Ok(EnvelopeVariant::HeaderSigned)
            }
            "body" | "body_signed" | "bodysigned" => Ok(EnvelopeVariant::BodySigned),
            other => Err(Error::config(format!(
                "invalid envelope variant `{other}`; expected one of: header|body"
            ))),
        }
    }
}

/// What to do when `data` is a string that fails to decrypt after a success code.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, Display, Eq, PartialEq)]
pub enum DecryptFailurePolicy {
    /// Surface a decryption error carrying the failed stage.
    #[default]
    Fail,
    /// Hand back the undecrypted envelope as the payload.
    ReturnEnvelope,
}

/// Rules for recognising a successful response envelope.
///
/// A numeric `code` always decides on its own. The message fallback only
/// applies to envelopes whose `code` is absent or not a number.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SuccessPolicy {
    pub codes: Vec<i64>,
    /// Accept a code-less envelope whose message is `OK` or `success`, ignoring case.
    pub accept_message: bool,
}

impl Default for SuccessPolicy {
    fn default() -> Self {
        Self {
            codes: vec![0, 200],
            accept_message: true,
        }
    }
}

impl SuccessPolicy {
    const SUCCESS_MESSAGES: [&'static str; 2] = ["ok", "success"];

    /// Numeric codes only, no message fallback.
    #[must_use]
    pub fn codes_only<I: IntoIterator<Item = i64>>(codes: I) -> Self {
        Self::new(codes, false)
    }

    #[must_use]
    pub fn new<I: IntoIterator<Item = i64>>(codes: I, accept_message: bool) -> Self {
        Self {
            codes: codes.into_iter().collect(),
            accept_message,
        }
    }

    #[must_use]
    pub fn is_success(&self, code: Option<i64>, message: Option<&str>) -> bool {
        if let Some(code) = code {
            return self.codes.contains(&code);
        }

        self.accept_message
            && message.is_some_and(|m| {
                let m = m.trim();
                Self::SUCCESS_MESSAGES
                    .iter()
                    .any(|ok| m.eq_ignore_ascii_case(ok))
            })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.codes.is_empty() && !self.accept_message {
            return Err(Error::config(
                "success policy accepts nothing: add a code or enable message matching",
            ));
        }
        Ok(())
    }
}

/// Per-deployment behaviour switches.
#[non_exhaustive]
#[derive(Clone, Debug, Default, Builder)]
pub struct ClientPolicies {
    #[builder(default)]
    pub envelope: EnvelopeVariant,
    #[builder(default)]
    pub success: SuccessPolicy,
    #[builder(default)]
    pub decrypt_failure: DecryptFailurePolicy,
}

impl ClientPolicies {
    pub(crate) fn validate(&self) -> Result<()> {
        self.success.validate()
    }
}
