//! Venue authentication signatures
//!
//! Both the market-data channel subscription and the session logon are
//! authenticated with `base64(HMAC-SHA256(base64_decode(secret), message))`;
//! only the message differs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;

use crate::error::{IngestError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Field separator in session messages
const SOH: char = '\x01';

/// Sign `message` with a base64-encoded secret.
///
/// Secrets with stripped padding are accepted.
pub fn sign(secret_b64: &str, message: &str) -> Result<String> {
    let key = STANDARD
        .decode(pad_base64(secret_b64.trim()))
        .map_err(|e| IngestError::Auth(format!("secret is not valid base64: {}", e)))?;

    let mut mac = HmacSha256::new_from_slice(&key).map_err(|e| IngestError::Auth(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn pad_base64(s: &str) -> String {
    let missing = (4 - s.len() % 4) % 4;
    format!("{}{}", s, "=".repeat(missing))
}

/// Message signed for a channel subscription: `{timestamp}GET{path}`
pub fn channel_message(timestamp: i64, signature_path: &str) -> String {
    format!("{}GET{}", timestamp, signature_path)
}

/// Header and body fields signed at session logon
#[derive(Debug, Clone)]
pub struct LogonFields<'a> {
    pub sending_time: &'a str,
    pub msg_type: &'a str,
    pub msg_seq_num: u64,
    pub sender_comp_id: &'a str,
    pub target_comp_id: &'a str,
    pub password: &'a str,
}

/// SOH-joined logon message
pub fn logon_message(fields: &LogonFields<'_>) -> String {
    [
        fields.sending_time.to_string(),
        fields.msg_type.to_string(),
        fields.msg_seq_num.to_string(),
        fields.sender_comp_id.to_string(),
        fields.target_comp_id.to_string(),
        fields.password.to_string(),
    ]
    .join(&SOH.to_string())
}

/// Venue API credentials
///
/// The secret is held in a `SecretString` and never printed.
pub struct Credentials {
    key: String,
    passphrase: SecretString,
    secret: SecretString,
}

impl Credentials {
    pub fn new(key: String, passphrase: String, secret: String) -> Self {
        Self {
            key,
            passphrase: SecretString::from(passphrase),
            secret: SecretString::from(secret),
        }
    }

    /// API key (public, safe to log)
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Sign a message with the account secret
    pub fn sign(&self, message: &str) -> Result<String> {
        sign(self.secret.expose_secret(), message)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("passphrase", &"[REDACTED]")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Authenticated level-2 subscription request
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub product_ids: Vec<String>,
    pub channels: Vec<String>,
    pub signature: String,
    pub key: String,
    pub passphrase: String,
    pub timestamp: String,
}

impl SubscribeRequest {
    pub fn signed(
        credentials: &Credentials,
        product_ids: &[String],
        channels: &[String],
        timestamp: i64,
        signature_path: &str,
    ) -> Result<Self> {
        let signature = credentials.sign(&channel_message(timestamp, signature_path))?;

        Ok(Self {
            kind: "subscribe",
            product_ids: product_ids.to_vec(),
            channels: channels.to_vec(),
            signature,
            key: credentials.key.clone(),
            passphrase: credentials.passphrase.expose_secret().to_string(),
            timestamp: timestamp.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| IngestError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // base64("test-secret-key")
    const SECRET: &str = "dGVzdC1zZWNyZXQta2V5";

    #[test]
    fn test_sign_channel_message() {
        let message = channel_message(1_700_000_000, "/users/self/verify");
        assert_eq!(message, "1700000000GET/users/self/verify");
        assert_eq!(
            sign(SECRET, &message).unwrap(),
            "JWosIt/aV+m+74V2WIIe6fxUF9C3eZFWTICg+L0QKQE="
        );
    }

    #[test]
    fn test_sign_logon_message() {
        let message = logon_message(&LogonFields {
            sending_time: "20240101-00:00:00.000",
            msg_type: "A",
            msg_seq_num: 1,
            sender_comp_id: "key",
            target_comp_id: "Coinbase",
            password: "pass",
        });
        assert_eq!(message, "20240101-00:00:00.000\x01A\x011\x01key\x01Coinbase\x01pass");
        assert_eq!(
            sign(SECRET, &message).unwrap(),
            "l35NKxNMxjwcRKk+vVZwpnnJPehpQdoawddoP6m4clQ="
        );
    }

    #[test]
    fn test_unpadded_secret() {
        // base64("key1") is "a2V5MQ=="
        assert_eq!(sign("a2V5MQ", "m").unwrap(), sign("a2V5MQ==", "m").unwrap());
    }

    #[test]
    fn test_invalid_secret() {
        assert!(matches!(sign("not base64!", "m"), Err(IngestError::Auth(_))));
    }

    #[test]
    fn test_subscribe_request() {
        let credentials = Credentials::new("api-key".into(), "phrase".into(), SECRET.into());
        let request = SubscribeRequest::signed(
            &credentials,
            &["BTC-USD".to_string()],
            &["level2".to_string()],
            1_700_000_000,
            "/users/self/verify",
        )
        .unwrap();

        let json: serde_json::Value = serde_json::from_str(&request.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "subscribe");
        assert_eq!(json["signature"], "JWosIt/aV+m+74V2WIIe6fxUF9C3eZFWTICg+L0QKQE=");
        assert_eq!(json["timestamp"], "1700000000");
        assert_eq!(json["product_ids"][0], "BTC-USD");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credentials = Credentials::new("api-key".into(), "hunter2".into(), SECRET.into());
        let printed = format!("{:?}", credentials);
        assert!(printed.contains("api-key"));
        assert!(!printed.contains(SECRET));
        assert!(!printed.contains("hunter2"));
    }
}
