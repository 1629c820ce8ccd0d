use std::env;
use std::time::Duration;

use bon::Builder;
use secrecy::{ExposeSecret as _, SecretString};
use url::Url;

use crate::Result;
use crate::error::Error;
use crate::upstream::cipher::{CipherKey, KEY_LEN};
use crate::upstream::policy::{ClientPolicies, EnvelopeVariant};

pub const API_URL_ENV: &str = "IPPROXY_API_URL";
pub const APP_KEY_ENV: &str = "IPPROXY_APP_KEY";
pub const APP_SECRET_ENV: &str = "IPPROXY_APP_SECRET";
pub const API_VERSION_ENV: &str = "IPPROXY_API_VERSION";
pub const API_ENCRYPT_ENV: &str = "IPPROXY_API_ENCRYPT";
pub const APP_USERNAME_ENV: &str = "IPPROXY_APP_USERNAME";
pub const ACCEPT_INVALID_CERTS_ENV: &str = "IPPROXY_ACCEPT_INVALID_CERTS";
pub const TIMEOUT_SECS_ENV: &str = "IPPROXY_TIMEOUT_SECS";
pub const ENVELOPE_VARIANT_ENV: &str = "IPPROXY_ENVELOPE_VARIANT";

pub const DEFAULT_API_VERSION: &str = "v2";
pub const DEFAULT_ENCRYPTION_MODE: &str = "AES";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Unvalidated string values, typically straight from the environment.
#[non_exhaustive]
#[derive(Clone, Debug, Builder)]
pub struct RawClientConfig {
    #[builder(into)]
    pub base_url: String,
    #[builder(into)]
    pub app_key: String,
    #[builder(into)]
    pub app_secret: SecretString,
    #[builder(into)]
    pub api_version: Option<String>,
    #[builder(into)]
    pub encryption_mode: Option<String>,
    #[builder(into)]
    pub app_username: String,
    #[builder(into)]
    pub accept_invalid_certs: Option<String>,
    #[builder(into)]
    pub timeout_secs: Option<String>,
    #[builder(into)]
    pub envelope_variant: Option<String>,
}

impl RawClientConfig {
    /// Reads the `IPPROXY_*` variables. Missing required ones are left empty
    /// and rejected later by [`ClientConfig::from_raw`].
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            base_url: env::var(API_URL_ENV).unwrap_or_default(),
            app_key: env::var(APP_KEY_ENV).unwrap_or_default(),
            app_secret: SecretString::from(env::var(APP_SECRET_ENV).unwrap_or_default()),
            api_version: env::var(API_VERSION_ENV).ok(),
            encryption_mode: env::var(API_ENCRYPT_ENV).ok(),
            app_username: env::var(APP_USERNAME_ENV).unwrap_or_default(),
            accept_invalid_certs: env::var(ACCEPT_INVALID_CERTS_ENV).ok(),
            timeout_secs: env::var(TIMEOUT_SECS_ENV).ok(),
            envelope_variant: env::var(ENVELOPE_VARIANT_ENV).ok(),
        }
    }
}

/// Validated client configuration. Immutable once built.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: Url,
    pub app_key: String,
    pub app_secret: SecretString,
    pub api_version: String,
    pub encryption_mode: String,
    pub app_username: String,
    /// Skip TLS certificate verification. The provider sandbox needs this.
    pub accept_invalid_certs: bool,
    pub timeout: Duration,
    pub policies: ClientPolicies,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_raw(RawClientConfig::from_env(), ClientPolicies::default())
    }

    pub fn from_raw(raw: RawClientConfig, mut policies: ClientPolicies) -> Result<Self> {
        let base_url = parse_base_url(&raw.base_url)?;
        let accept_invalid_certs = raw
            .accept_invalid_certs
            .as_deref()
            .map(parse_bool)
            .transpose()?
            .unwrap_or(false);
        let timeout = raw
            .timeout_secs
            .as_deref()
            .map(|s| {
                s.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| Error::config(format!("invalid timeout `{s}`: {e}")))
            })
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT);
        if let Some(variant) = raw.envelope_variant.as_deref() {
            policies.envelope = variant.parse::<EnvelopeVariant>()?;
        }

        let mut config = Self::new(
            base_url,
            raw.app_key,
            raw.app_secret,
            raw.app_username,
            policies,
        )?;
        if let Some(version) = raw.api_version.filter(|v| !v.trim().is_empty()) {
            config.api_version = version.trim().to_owned();
        }
        if let Some(mode) = raw.encryption_mode.filter(|m| !m.trim().is_empty()) {
            config.encryption_mode = mode.trim().to_owned();
        }
        config.accept_invalid_certs = accept_invalid_certs;
        config.timeout = timeout;

        Ok(config)
    }

    pub fn new(
        base_url: Url,
        app_key: String,
        app_secret: SecretString,
        app_username: String,
        policies: ClientPolicies,
    ) -> Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!(
                "base url `{base_url}` cannot be used as a base"
            )));
        }
        if app_key.trim().is_empty() {
            return Err(Error::config("app key is required"));
        }
        if app_secret.expose_secret().len() < KEY_LEN {
            return Err(Error::config(format!(
                "app secret must be at least {KEY_LEN} bytes, got {}",
                app_secret.expose_secret().len()
            )));
        }

        policies.validate()?;

        Ok(Self {
            base_url,
            app_key: app_key.trim().to_owned(),
            app_secret,
            api_version: DEFAULT_API_VERSION.to_owned(),
            encryption_mode: DEFAULT_ENCRYPTION_MODE.to_owned(),
            app_username,
            accept_invalid_certs: false,
            timeout: DEFAULT_TIMEOUT,
            policies,
        })
    }

    #[must_use]
    pub fn with_api_version<S: Into<String>>(mut self, version: S) -> Self {
        self.api_version = version.into();
        self
    }

    #[must_use]
    pub fn with_encryption_mode<S: Into<String>>(mut self, mode: S) -> Self {
        self.encryption_mode = mode.into();
        self
    }

    #[must_use]
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn cipher_key(&self) -> Result<CipherKey> {
        CipherKey::derive(&self.app_secret)
    }
}

/// Parses the base URL and guarantees a trailing slash so `join` appends.
fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::config(format!("{API_URL_ENV} is required")));
    }

    let mut url = Url::parse(trimmed)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::config(format!("invalid boolean `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Kind;

    const SECRET: &str = "bf3ffghlt0hpc4omnvc2583jt0fag6a4";

    fn raw() -> RawClientConfig {
        RawClientConfig {
            base_url: "https://sandbox.ipipv.com".to_owned(),
            app_key: "AK20241120145620".to_owned(),
            app_secret: SecretString::from(SECRET),
            api_version: None,
            encryption_mode: None,
            app_username: "reseller".to_owned(),
            accept_invalid_certs: None,
            timeout_secs: None,
            envelope_variant: None,
        }
    }

    #[test]
    fn from_raw_applies_defaults() {
        let config = ClientConfig::from_raw(raw(), ClientPolicies::default()).unwrap();

        assert_eq!(config.base_url.as_str(), "https://sandbox.ipipv.com/");
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.encryption_mode, DEFAULT_ENCRYPTION_MODE);
        assert!(!config.accept_invalid_certs);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.policies.envelope, EnvelopeVariant::HeaderSigned);
    }

    #[test]
    fn from_raw_reads_overrides() {
        let raw = RawClientConfig {
            base_url: "https://api.ipipv.net/gateway".to_owned(),
            api_version: Some("v3".to_owned()),
            encryption_mode: Some("AES".to_owned()),
            accept_invalid_certs: Some("true".to_owned()),
            timeout_secs: Some("30".to_owned()),
            envelope_variant: Some("body".to_owned()),
            ..raw()
        };
        let config = ClientConfig::from_raw(raw, ClientPolicies::default()).unwrap();

        assert_eq!(config.base_url.as_str(), "https://api.ipipv.net/gateway/");
        assert_eq!(config.api_version, "v3");
        assert!(config.accept_invalid_certs);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.policies.envelope, EnvelopeVariant::BodySigned);
    }

    #[test]
    fn short_secret_fails_fast() {
        let raw = RawClientConfig {
            app_secret: SecretString::from("sixteen-bytes-ok"),
            ..raw()
        };
        let err = ClientConfig::from_raw(raw, ClientPolicies::default()).unwrap_err();

        assert_eq!(err.kind(), Kind::Config);
    }

    #[test]
    fn missing_url_and_key_are_config_errors() {
        let no_url = RawClientConfig {
            base_url: String::new(),
            ..raw()
        };
        let no_key = RawClientConfig {
            app_key: "  ".to_owned(),
            ..raw()
        };

        assert_eq!(
            ClientConfig::from_raw(no_url, ClientPolicies::default())
                .unwrap_err()
                .kind(),
            Kind::Config
        );
        assert_eq!(
            ClientConfig::from_raw(no_key, ClientPolicies::default())
                .unwrap_err()
                .kind(),
            Kind::Config
        );
    }

    #[test]
    fn invalid_bool_and_timeout_are_rejected() {
        let bad_bool = RawClientConfig {
            accept_invalid_certs: Some("maybe".to_owned()),
            ..raw()
        };
        let bad_timeout = RawClientConfig {
            timeout_secs: Some("soon".to_owned()),
            ..raw()
        };

        assert!(ClientConfig::from_raw(bad_bool, ClientPolicies::default()).is_err());
        assert!(ClientConfig::from_raw(bad_timeout, ClientPolicies::default()).is_err());
    }

    #[test]
    fn builder_matches_literal() {
        let built = RawClientConfig::builder()
            .base_url("https://sandbox.ipipv.com")
            .app_key("AK20241120145620")
            .app_secret(SECRET)
            .app_username("reseller")
            .timeout_secs("30")
            .build();
        let config = ClientConfig::from_raw(built, ClientPolicies::default()).unwrap();

        assert_eq!(config.app_key, "AK20241120145620");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
    }

    #[test]
    fn debug_output_hides_secret() {
        let config = ClientConfig::from_raw(raw(), ClientPolicies::default()).unwrap();
        assert!(!format!("{config:?}").contains(SECRET));
    }
}
