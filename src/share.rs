//! Signed, URL-safe share tokens for prediction results.
//!
//! A token is `base64url(json) "." base64url(hmac_sha256(key, base64url(json)))`.
//! The content is readable by anyone holding the token; the signature only
//! makes tampering detectable. Nothing is stored server side.

use crate::config::ShareConfig;
use crate::types::Prediction;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Path prefix of the shared result page
pub const SHARE_PATH_PREFIX: &str = "/results/share/";

/// Why a token could not be turned back into a payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature does not match")]
    BadSignature,

    #[error("token expired {age_secs}s after it was issued")]
    Expired { age_secs: i64 },

    #[error("token payload is not a result: {0}")]
    Payload(String),

    #[error("result could not be serialized: {0}")]
    Encode(String),
}

/// HMAC-SHA256 signer with a key derived from a secret and a salt.
#[derive(Clone)]
pub struct Signer {
    key: [u8; 32],
}

impl Signer {
    pub fn new(secret: &str, salt: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(b"signer");
        hasher.update(secret.as_bytes());
        Self {
            key: hasher.finalize().into(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length")
    }

    pub fn sign(&self, value: &[u8]) -> String {
        let encoded = URL_SAFE_NO_PAD.encode(value);
        let mut mac = self.mac();
        mac.update(encoded.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{}.{}", encoded, signature)
    }

    /// Verify the signature and return the signed bytes.
    pub fn unsign(&self, token: &str) -> Result<Vec<u8>, ShareError> {
        let (encoded, signature) = token.rsplit_once('.').ok_or(ShareError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| ShareError::Malformed)?;

        let mut mac = self.mac();
        mac.update(encoded.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| ShareError::BadSignature)?;

        URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| ShareError::Malformed)
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    #[serde(flatten)]
    payload: &'a Prediction,
    issued_at: i64,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(flatten)]
    payload: Prediction,
    #[serde(default)]
    issued_at: i64,
}

/// Encodes predictions into share tokens and back.
#[derive(Clone)]
pub struct ShareCodec {
    signer: Signer,
    max_age: Option<Duration>,
}

impl ShareCodec {
    pub fn new(secret: &str, salt: &str, max_age: Option<Duration>) -> Self {
        Self {
            signer: Signer::new(secret, salt),
            max_age,
        }
    }

    pub fn from_config(config: &ShareConfig) -> Self {
        Self::new(&config.secret_key, &config.salt, config.max_age())
    }

    pub fn encode(&self, payload: &Prediction) -> Result<String, ShareError> {
        self.encode_at(payload, Utc::now().timestamp())
    }

    pub(crate) fn encode_at(&self, payload: &Prediction, issued_at: i64) -> Result<String, ShareError> {
        let json = serde_json::to_vec(&EnvelopeRef { payload, issued_at })
            .map_err(|e| ShareError::Encode(e.to_string()))?;
        Ok(self.signer.sign(&json))
    }

    pub fn decode(&self, token: &str) -> Result<Prediction, ShareError> {
        let json = self.signer.unsign(token)?;
        let envelope: Envelope =
            serde_json::from_slice(&json).map_err(|e| ShareError::Payload(e.to_string()))?;

        if let Some(max_age) = self.max_age {
            let age_secs = Utc::now().timestamp() - envelope.issued_at;
            if age_secs > max_age.as_secs() as i64 {
                return Err(ShareError::Expired { age_secs });
            }
        }

        Ok(envelope.payload)
    }

    /// Relative URL of the shared result page for `payload`
    pub fn share_url(&self, payload: &Prediction) -> Result<String, ShareError> {
        Ok(format!("{}{}", SHARE_PATH_PREFIX, self.encode(payload)?))
    }
}
