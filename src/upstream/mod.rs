//! Signed-encrypted RPC client for the proxy provider.
//!
//! A call goes through three steps:
//! - sign and encrypt the params into a [`RequestEnvelope`]
//! - POST it with the headers of the configured [`EnvelopeVariant`]
//! - normalise the response envelope into an [`Outcome`]

mod cipher;
mod client;
mod config;
pub mod endpoints;
mod normalize;
mod policy;
mod types;

pub use cipher::DecryptStage;
pub use client::UpstreamClient;
pub use config::{
    ACCEPT_INVALID_CERTS_ENV, API_ENCRYPT_ENV, API_URL_ENV, API_VERSION_ENV, APP_KEY_ENV,
    APP_SECRET_ENV, APP_USERNAME_ENV, ClientConfig, DEFAULT_API_VERSION, DEFAULT_ENCRYPTION_MODE,
    DEFAULT_TIMEOUT, ENVELOPE_VARIANT_ENV, RawClientConfig, TIMEOUT_SECS_ENV,
};
pub use policy::{ClientPolicies, DecryptFailurePolicy, EnvelopeVariant, SuccessPolicy};
pub use types::{Outcome, Payload, PayloadSource, Rejection, RequestEnvelope, ResponseEnvelope};
