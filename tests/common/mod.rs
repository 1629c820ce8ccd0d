#![allow(dead_code, reason = "each test binary uses a different subset")]

use aes::Aes256;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut as _, BlockEncryptMut as _, KeyIvInit as _};
use httpmock::MockServer;
use ipipv_client::upstream::{ClientConfig, ClientPolicies, RawClientConfig, UpstreamClient};
use md5::{Digest as _, Md5};

pub const APP_KEY: &str = "AK20241120145620";
pub const APP_SECRET: &str = "bf3ffghlt0hpc4omnvc2583jt0fag6a4";
pub const APP_USERNAME: &str = "reseller01";

/// Encrypts like the provider does: key = secret[..32], iv = secret[..16].
pub fn provider_encrypt(plaintext: &str) -> String {
    let secret = APP_SECRET.as_bytes();
    let ciphertext = cbc::Encryptor::<Aes256>::new_from_slices(&secret[..32], &secret[..16])
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    STANDARD.encode(ciphertext)
}

/// Reverses [`provider_encrypt`]. `None` when any step fails.
pub fn provider_decrypt(encoded: &str) -> Option<String> {
    let secret = APP_SECRET.as_bytes();
    let ciphertext = STANDARD.decode(encoded).ok()?;
    let plaintext = cbc::Decryptor::<Aes256>::new_from_slices(&secret[..32], &secret[..16])
        .ok()?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .ok()?;

    String::from_utf8(plaintext).ok()
}

/// Signature the provider expects for an envelope.
pub fn provider_sign(params: &str, timestamp: &str) -> String {
    let digest = Md5::digest(format!(
        "appKey={APP_KEY}&params={params}&timestamp={timestamp}&key={APP_SECRET}"
    ));
    hex::encode_upper(digest)
}

pub fn raw_config(server: &MockServer) -> RawClientConfig {
    RawClientConfig::builder()
        .base_url(server.base_url())
        .app_key(APP_KEY)
        .app_secret(APP_SECRET)
        .app_username(APP_USERNAME)
        .build()
}

pub fn client_with(server: &MockServer, policies: ClientPolicies) -> UpstreamClient {
    let config = ClientConfig::from_raw(raw_config(server), policies).unwrap();
    UpstreamClient::new(config).unwrap()
}

pub fn client(server: &MockServer) -> UpstreamClient {
    client_with(server, ClientPolicies::default())
}
