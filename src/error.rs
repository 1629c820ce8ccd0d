use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use reqwest::{Method, StatusCode};

use crate::upstream::DecryptStage;

/// Broad classification of every failure this crate can return.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Kind {
    /// Missing or unusable configuration, including short key material.
    Config,
    /// Call parameters could not be turned into a JSON object.
    Encoding,
    /// The HTTP exchange failed: non-2xx status, connection error or timeout.
    Transport,
    /// The upstream body was not the JSON shape we expect.
    Protocol,
    /// A stage of the response decrypt pipeline failed.
    Decryption,
    /// The upstream answered with a non-success application code.
    Rejected,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    #[must_use]
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    #[must_use]
    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    #[must_use]
    pub fn config<S: Into<String>>(reason: S) -> Self {
        Error::with_source(
            Kind::Config,
            Validation {
                reason: reason.into(),
            },
        )
    }

    #[must_use]
    pub fn encoding<S: Into<String>>(reason: S) -> Self {
        Error::with_source(
            Kind::Encoding,
            Validation {
                reason: reason.into(),
            },
        )
    }

    #[must_use]
    pub fn protocol<S: Into<String>>(reason: S) -> Self {
        Error::with_source(
            Kind::Protocol,
            Validation {
                reason: reason.into(),
            },
        )
    }

    #[must_use]
    pub fn decryption<S: Into<String>>(stage: DecryptStage, reason: S) -> Self {
        Decryption {
            stage,
            reason: reason.into(),
        }
        .into()
    }

    #[must_use]
    pub fn status<S: Into<String>>(
        status_code: StatusCode,
        method: Method,
        path: String,
        body: S,
    ) -> Self {
        Status {
            status_code,
            method,
            path,
            body: body.into(),
        }
        .into()
    }

    #[must_use]
    pub fn rejected(code: Option<i64>, message: Option<String>) -> Self {
        Rejected { code, message }.into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Free-form reason attached to config, encoding and protocol errors.
#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl StdError for Validation {}

/// Non-2xx HTTP response. The raw body is kept verbatim.
#[non_exhaustive]
#[derive(Debug)]
pub struct Status {
    pub status_code: StatusCode,
    pub method: Method,
    pub path: String,
    pub body: String,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error({}) making {} call to {} with {}",
            self.status_code, self.method, self.path, self.body
        )
    }
}

impl StdError for Status {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Decryption {
    pub stage: DecryptStage,
    pub reason: String,
}

impl fmt::Display for Decryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decryption failed at {} stage: {}", self.stage, self.reason)
    }
}

impl StdError for Decryption {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Rejected {
    pub code: Option<i64>,
    pub message: Option<String>,
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self
            .code
            .map_or_else(|| "none".to_owned(), |c| c.to_string());
        let message = self.message.as_deref().unwrap_or("<no message>");
        write!(f, "upstream rejected call with code {code}: {message}")
    }
}

impl StdError for Rejected {}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Config, err)
    }
}

impl From<Status> for Error {
    fn from(err: Status) -> Self {
        Error::with_source(Kind::Transport, err)
    }
}

impl From<Decryption> for Error {
    fn from(err: Decryption) -> Self {
        Error::with_source(Kind::Decryption, err)
    }
}

impl From<Rejected> for Error {
    fn from(err: Rejected) -> Self {
        Error::with_source(Kind::Rejected, err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::with_source(Kind::Transport, err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::with_source(Kind::Config, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(Kind::Protocol, err)
    }
}
