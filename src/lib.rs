//! Client for the IPIPV proxy-provider open API.
//!
//! Every call is wrapped in a signed envelope whose business parameters are
//! AES-256-CBC encrypted with a key derived from the shared app secret. The
//! responses come back in several historical shapes; [`upstream::UpstreamClient`]
//! normalises them into an [`upstream::Outcome`].
//!
//! ```no_run
//! use ipipv_client::upstream::{ClientConfig, UpstreamClient};
//! use serde_json::json;
//!
//! # async fn run() -> ipipv_client::Result<()> {
//! let client = UpstreamClient::new(ClientConfig::from_env()?)?;
//! let outcome = client
//!     .call("api/open/app/proxy/info/v2", &json!({ "proxyType": 104 }))
//!     .await?;
//! let payload = outcome.into_payload()?;
//! println!("{}", payload.value());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod upstream;

use std::result::Result as StdResult;

use reqwest::Request;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::error::Error;

pub type Result<T> = StdResult<T, Error>;

/// Unix timestamp in seconds.
pub type Timestamp = i64;

/// Executes one prepared request and parses the body as JSON.
///
/// Non-2xx responses become [`error::Status`] with the raw body and are never
/// parsed further. A 2xx body that is not JSON is a protocol error.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(
        level = "debug",
        skip(client, request, headers),
        fields(method, path, status_code)
    )
)]
pub(crate) async fn request(
    client: &reqwest::Client,
    mut request: Request,
    headers: Option<HeaderMap>,
) -> Result<Value> {
    let method = request.method().clone();
    let path = request.url().path().to_owned();

    #[cfg(feature = "tracing")]
    {
        let span = tracing::Span::current();
        span.record("method", method.as_str());
        span.record("path", path.as_str());
    }

    if let Some(h) = headers {
        *request.headers_mut() = h;
    }

    let response = client.execute(request).await?;
    let status_code = response.status();

    #[cfg(feature = "tracing")]
    tracing::Span::current().record("status_code", status_code.as_u16());

    let body = response.text().await?;

    if !status_code.is_success() {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            status = %status_code,
            method = %method,
            path = %path,
            body = %body,
            "upstream request failed"
        );

        return Err(Error::status(status_code, method, path, body));
    }

    serde_json::from_str::<Value>(&body).map_err(|e| {
        #[cfg(feature = "tracing")]
        tracing::warn!(path = %path, error = %e, "upstream body is not JSON");

        Error::protocol(format!("response body from {path} is not valid JSON: {e}"))
    })
}
