//! Key derivation, AES-256-CBC envelope encryption and the MD5 request signature.
//!
//! The key is the first 32 bytes of the app secret and the IV is the first 16
//! bytes of the same secret. The IV is therefore fixed per secret and equal
//! plaintexts encrypt to equal ciphertexts. The upstream requires this, so it
//! is kept as-is.

use aes::Aes256;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut as _, BlockEncryptMut as _, KeyIvInit as _};
use md5::{Digest as _, Md5};
use secrecy::{ExposeSecret as _, SecretString};
use serde_json::{Map, Value};
use strum_macros::Display;

use crate::Result;
use crate::Timestamp;
use crate::error::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub(crate) const KEY_LEN: usize = 32;
pub(crate) const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Stage of the response decrypt pipeline, reported on failure.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum DecryptStage {
    Base64,
    BlockDecrypt,
    Unpad,
    TextDecode,
    Json,
    /// The plaintext parsed as JSON but is a scalar rather than an object or
    /// array. Reported as a decryption failure, not a protocol one: a scalar
    /// here means the ciphertext was not a provider payload, and it falls under
    /// the decrypt-failure policy like every other stage.
    Shape,
}

/// Text encodings tried, in order, on decrypted bytes.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub(crate) enum TextEncoding {
    Utf8,
    Latin1,
    Ascii,
}

impl TextEncoding {
    const ORDER: [TextEncoding; 3] = [TextEncoding::Utf8, TextEncoding::Latin1, TextEncoding::Ascii];

    fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// Symmetric key material derived from the app secret.
///
/// Built once per client. Cipher contexts are created per call from it.
#[derive(Clone)]
pub(crate) struct CipherKey {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherKey").finish_non_exhaustive()
    }
}

impl CipherKey {
    pub(crate) fn derive(secret: &SecretString) -> Result<Self> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.len() < KEY_LEN {
            return Err(Error::config(format!(
                "app secret must be at least {KEY_LEN} bytes to derive the AES-256 key, got {}",
                bytes.len()
            )));
        }

        let mut key = [0_u8; KEY_LEN];
        let mut iv = [0_u8; IV_LEN];
        key.copy_from_slice(&bytes[..KEY_LEN]);
        iv.copy_from_slice(&bytes[..IV_LEN]);

        Ok(Self { key, iv })
    }

    /// Encrypts `plaintext` and returns standard padded base64.
    pub(crate) fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let cipher = Aes256CbcEnc::new_from_slices(&self.key, &self.iv)
            .map_err(|e| Error::config(format!("AES init failed: {e}")))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        Ok(STANDARD.encode(ciphertext))
    }

    /// Runs the full response pipeline: sanitise, base64, AES, unpad, text, JSON.
    pub(crate) fn decrypt(&self, encoded: &str) -> Result<Value> {
        let cleaned = sanitize_base64(encoded);
        let ciphertext = STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| Error::decryption(DecryptStage::Base64, e.to_string()))?;

        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(Error::decryption(
                DecryptStage::BlockDecrypt,
                format!(
                    "ciphertext length {} is not a positive multiple of {BLOCK_LEN}",
                    ciphertext.len()
                ),
            ));
        }

        let cipher = Aes256CbcDec::new_from_slices(&self.key, &self.iv)
            .map_err(|e| Error::decryption(DecryptStage::BlockDecrypt, e.to_string()))?;
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|e| {
                Error::decryption(
                    DecryptStage::Unpad,
                    format!("invalid PKCS#7 padding, wrong secret? ({e})"),
                )
            })?;

        let text = decode_text(&plaintext).ok_or_else(|| {
            Error::decryption(
                DecryptStage::TextDecode,
                "plaintext is not valid UTF-8, Latin-1 or ASCII",
            )
        })?;

        let value = serde_json::from_str::<Value>(&text)
            .map_err(|e| Error::decryption(DecryptStage::Json, e.to_string()))?;

        match value {
            Value::Object(_) | Value::Array(_) => Ok(value),
            other => Err(Error::decryption(
                DecryptStage::Shape,
                format!("decrypted JSON is a scalar: {other}"),
            )),
        }
    }
}

fn decode_text(bytes: &[u8]) -> Option<String> {
    TextEncoding::ORDER.into_iter().find_map(|encoding| {
        let text = encoding.decode(bytes);

        #[cfg(feature = "tracing")]
        if text.is_some() {
            tracing::trace!(%encoding, "decoded decrypted payload");
        }

        text
    })
}

/// Keeps only characters of the standard base64 alphabet.
pub(crate) fn sanitize_base64(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .collect()
}

/// Compact JSON with object keys sorted at every depth.
pub(crate) fn canonical_json(value: &Value) -> String {
    canonicalize(value.clone()).to_string()
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            let mut sorted = Map::with_capacity(entries.len());
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// `MD5("appKey={}&params={}&timestamp={}&key={}")` as uppercase hex.
pub(crate) fn sign(
    app_key: &str,
    encrypted_params: &str,
    timestamp: Timestamp,
    secret: &SecretString,
) -> String {
    let payload = format!(
        "appKey={app_key}&params={encrypted_params}&timestamp={timestamp}&key={}",
        secret.expose_secret()
    );

    hex::encode_upper(Md5::digest(payload.as_bytes()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::{Decryption, Kind};

    const SECRET: &str = "bf3ffghlt0hpc4omnvc2583jt0fag6a4";

    fn key() -> CipherKey {
        CipherKey::derive(&SecretString::from(SECRET)).expect("valid secret")
    }

    fn stage_of(err: &Error) -> DecryptStage {
        err.downcast_ref::<Decryption>()
            .expect("decryption source")
            .stage
    }

    #[test]
    fn derive_rejects_short_secret() {
        let err = CipherKey::derive(&SecretString::from("too-short")).unwrap_err();
        assert_eq!(err.kind(), Kind::Config);
    }

    #[test]
    fn derive_truncates_long_secret() {
        let long = format!("{SECRET}-and-some-more");
        let a = CipherKey::derive(&SecretString::from(long)).unwrap();
        let b = key();

        assert_eq!(a.encrypt(b"{}").unwrap(), b.encrypt(b"{}").unwrap());
    }

    #[test]
    fn decrypt_reverses_encrypt() {
        let params = json!({"proxyType": 104, "page": 1, "pageSize": 10, "name": "东京"});
        let k = key();

        let encrypted = k.encrypt(canonical_json(&params).as_bytes()).unwrap();
        let decrypted = k.decrypt(&encrypted).unwrap();

        assert_eq!(decrypted, params);
    }

    // Fixed IV: identical plaintexts must produce identical ciphertexts.
    #[test]
    fn encryption_is_deterministic_under_fixed_iv() {
        let k = key();
        let plaintext = canonical_json(&json!({"balance": 100}));

        let first = k.encrypt(plaintext.as_bytes()).unwrap();
        let second = k.encrypt(plaintext.as_bytes()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn empty_params_encrypt_to_single_block() {
        let encrypted = key().encrypt(b"{}").unwrap();
        let raw = STANDARD.decode(encrypted).unwrap();

        assert_eq!(raw.len(), BLOCK_LEN);
    }

    #[test]
    fn decrypt_tolerates_whitespace_and_newlines() {
        let k = key();
        let clean = k
            .encrypt(canonical_json(&json!({"ip": "1.2.3.4", "port": 8080})).as_bytes())
            .unwrap();
        let (head, tail) = clean.split_at(clean.len() / 2);
        let noisy = format!(" {head}\r\n\t{tail}\n");

        assert_eq!(k.decrypt(&noisy).unwrap(), k.decrypt(&clean).unwrap());
    }

    #[test]
    fn decrypt_reports_base64_stage() {
        let err = key().decrypt("QUJD=X").unwrap_err();
        assert_eq!(stage_of(&err), DecryptStage::Base64);
    }

    #[test]
    fn decrypt_reports_block_stage_for_partial_block() {
        let err = key().decrypt(&STANDARD.encode([1_u8; 10])).unwrap_err();
        assert_eq!(stage_of(&err), DecryptStage::BlockDecrypt);
    }

    #[test]
    fn decrypt_reports_unpad_stage_for_wrong_secret() {
        let other =
            CipherKey::derive(&SecretString::from("00000000000000000000000000000000")).unwrap();
        let encrypted = other.encrypt(b"{\"a\":1}").unwrap();

        let err = key().decrypt(&encrypted).unwrap_err();
        // A wrong key yields garbage whose last byte is almost never valid padding.
        assert!(matches!(
            stage_of(&err),
            DecryptStage::Unpad | DecryptStage::Json | DecryptStage::TextDecode
        ));
    }

    #[test]
    fn decrypt_reports_json_stage() {
        let encrypted = key().encrypt(b"not json").unwrap();
        let err = key().decrypt(&encrypted).unwrap_err();
        assert_eq!(stage_of(&err), DecryptStage::Json);
    }

    #[test]
    fn decrypt_rejects_scalar_plaintext() {
        let encrypted = key().encrypt(b"42").unwrap();
        let err = key().decrypt(&encrypted).unwrap_err();
        assert_eq!(stage_of(&err), DecryptStage::Shape);
    }

    #[test]
    fn latin1_fallback_decodes_non_utf8_bytes() {
        let encrypted = key().encrypt(b"{\"name\":\"caf\xe9\"}").unwrap();
        let value = key().decrypt(&encrypted).unwrap();
        assert_eq!(value, json!({"name": "café"}));
    }

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"z": true, "m": [{"y": 1, "x": 2}]}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"m":[{"x":2,"y":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn sanitize_drops_non_alphabet_characters() {
        assert_eq!(sanitize_base64("ab c\n+/=\t-_*"), "abc+/=");
    }

    #[test]
    fn signature_is_stable_uppercase_md5() {
        let secret = SecretString::from(SECRET);
        let a = sign("AK20241120145620", "cGFyYW1z", 1_700_000_000, &secret);
        let b = sign("AK20241120145620", "cGFyYW1z", 1_700_000_000, &secret);

        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn signature_known_answers() {
        let secret = SecretString::from(SECRET);

        assert_eq!(
            sign("AK1", "xyz", 42, &secret),
            "8C8F95598D53103C4C016ACAC0D7C496"
        );
        assert_eq!(
            sign("AK20241120145620", "cGFyYW1z", 1_700_000_000, &secret),
            "5DEAA95B83B2F30084519E5DA5B74366"
        );
    }

    #[test]
    fn encryption_known_answer() {
        assert_eq!(
            key().encrypt(br#"{"proxyType":104}"#).unwrap(),
            "Nd4QY1GD8IPcRaTWhSR2F7EHIIZ888LC9hjRnA3Fv3g="
        );
    }

    #[test]
    fn signature_changes_with_timestamp() {
        let secret = SecretString::from(SECRET);
        assert_ne!(sign("AK1", "xyz", 1, &secret), sign("AK1", "xyz", 2, &secret));
    }
}
