use std::time::Duration;

use chrono::Utc;
use reqwest::Client as ReqwestClient;
use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

use crate::error::Error;
use crate::upstream::cipher::{self, CipherKey};
use crate::upstream::normalize::normalize;
use crate::upstream::{ClientConfig, EnvelopeVariant, Outcome, RequestEnvelope};
use crate::{Result, Timestamp};

const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

const X_APP_KEY: HeaderName = HeaderName::from_static("x-app-key");
const X_APP_USERNAME: HeaderName = HeaderName::from_static("x-app-username");
const X_API_VERSION: HeaderName = HeaderName::from_static("x-api-version");
const X_TIMESTAMP: HeaderName = HeaderName::from_static("x-timestamp");
const X_SIGN: HeaderName = HeaderName::from_static("x-sign");
const X_APP_ORDER_NO: HeaderName = HeaderName::from_static("x-app-order-no");

const APP_ORDER_NO: &str = "appOrderNo";

/// Signed, encrypted client for the provider's open API.
///
/// Holds only immutable configuration, so one instance can be cloned or
/// shared across tasks freely.
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    config: ClientConfig,
    key: CipherKey,
    client: ReqwestClient,
}

/// Everything needed to send one call, built synchronously before any I/O.
#[derive(Debug)]
pub(crate) struct PreparedCall {
    pub(crate) url: Url,
    pub(crate) envelope: RequestEnvelope,
    pub(crate) headers: HeaderMap,
}

impl UpstreamClient {
    /// Creates a client with an HTTP stack built from `config`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        #[cfg(feature = "tracing")]
        if config.accept_invalid_certs {
            tracing::warn!(
                base_url = %config.base_url,
                "TLS certificate verification is disabled for upstream calls"
            );
        }

        Self::with_client(config, client)
    }

    /// Creates a client on top of a caller-provided HTTP client.
    ///
    /// TLS and timeout settings of `config` are not applied to `client`.
    pub fn with_client(config: ClientConfig, client: ReqwestClient) -> Result<Self> {
        let key = config.cipher_key()?;
        config.policies.validate()?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            base_url = %config.base_url,
            app_key = %config.app_key,
            api_version = %config.api_version,
            envelope = %config.policies.envelope,
            "upstream client configured"
        );

        Ok(Self {
            config,
            key,
            client,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Signs, encrypts and posts `params` to `endpoint`, then normalises the answer.
    ///
    /// `params` must serialize to a JSON object; `()` and `None` count as empty.
    /// An `appOrderNo` entry, when non-empty, is also lifted into the envelope.
    pub async fn call<P: Serialize + ?Sized>(&self, endpoint: &str, params: &P) -> Result<Outcome> {
        self.execute(endpoint, params, None).await
    }

    /// Same as [`call`](Self::call) with a per-call timeout on the transport step.
    pub async fn call_with_timeout<P: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &P,
        timeout: Duration,
    ) -> Result<Outcome> {
        self.execute(endpoint, params, Some(timeout)).await
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip(self, params, timeout),
            fields(req_id, app_order_no)
        )
    )]
    async fn execute<P: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &P,
        timeout: Option<Duration>,
    ) -> Result<Outcome> {
        let prepared = self.prepare(endpoint, params, Utc::now().timestamp())?;

        #[cfg(feature = "tracing")]
        {
            let span = tracing::Span::current();
            span.record("req_id", prepared.envelope.req_id.as_str());
            if let Some(order_no) = &prepared.envelope.app_order_no {
                span.record("app_order_no", order_no.as_str());
            }
        }

        let mut builder = self
            .client
            .request(Method::POST, prepared.url)
            .json(&prepared.envelope);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let request = builder.build()?;

        let body = crate::request(&self.client, request, Some(prepared.headers)).await?;

        normalize(body, &self.key, &self.config.policies)
    }

    /// Builds the signed envelope, target URL and headers for one call.
    pub(crate) fn prepare<P: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &P,
        timestamp: Timestamp,
    ) -> Result<PreparedCall> {
        let params = params_object(params)?;
        let app_order_no = app_order_no(&params);

        let plaintext = cipher::canonical_json(&Value::Object(params));
        let encrypted = self.key.encrypt(plaintext.as_bytes())?;
        let sign = cipher::sign(
            &self.config.app_key,
            &encrypted,
            timestamp,
            &self.config.app_secret,
        );

        let envelope = RequestEnvelope {
            version: self.config.api_version.clone(),
            encrypt: self.config.encryption_mode.clone(),
            app_key: self.config.app_key.clone(),
            req_id: Uuid::new_v4().simple().to_string(),
            timestamp,
            params: encrypted,
            app_username: self.config.app_username.clone(),
            sign,
            app_order_no,
        };

        let url = self.endpoint(endpoint)?;
        let headers = self.headers(&envelope)?;

        Ok(PreparedCall {
            url,
            envelope,
            headers,
        })
    }

    fn headers(&self, envelope: &RequestEnvelope) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, APPLICATION_JSON);
        headers.insert(ACCEPT, APPLICATION_JSON);
        headers.insert(X_APP_KEY, header_value(&envelope.app_key)?);
        headers.insert(X_APP_USERNAME, header_value(&envelope.app_username)?);
        headers.insert(X_API_VERSION, header_value(&envelope.version)?);

        if self.config.policies.envelope == EnvelopeVariant::HeaderSigned {
            headers.insert(X_TIMESTAMP, HeaderValue::from(envelope.timestamp));
            headers.insert(X_SIGN, header_value(&envelope.sign)?);
            if let Some(order_no) = &envelope.app_order_no {
                headers.insert(X_APP_ORDER_NO, header_value(order_no)?);
            }
        }

        Ok(headers)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.config.base_url.join(path.trim_start_matches('/'))?)
    }
}

fn params_object<P: Serialize + ?Sized>(params: &P) -> Result<Map<String, Value>> {
    let value = serde_json::to_value(params)
        .map_err(|e| Error::encoding(format!("params are not JSON-serializable: {e}")))?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(Error::encoding(format!(
            "params must serialize to a JSON object, got `{other}`"
        ))),
    }
}

fn app_order_no(params: &Map<String, Value>) -> Option<String> {
    let order_no = match params.get(APP_ORDER_NO)? {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    (!order_no.is_empty()).then_some(order_no)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::config(format!("`{value}` cannot be sent as a header: {e}")))
}
