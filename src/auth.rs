//! Admin session tokens.
//!
//! A token is `<expiry unix secs>.<hex hmac-sha256(expiry)>`, carried in an
//! `HttpOnly` cookie. Nothing is kept server-side.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const SESSION_COOKIE: &str = "admin_session";
pub const SESSION_TTL_SECS: i64 = 60 * 60 * 24 * 7;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct SessionSigner {
    key: Vec<u8>,
}

impl SessionSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self { Self { key: key.into() } }

    /// Signer with a process-local random key; sessions end on restart.
    pub fn random() -> Self { Self::new(rand::random::<[u8; 32]>().to_vec()) }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length
        HmacSha256::new_from_slice(&self.key).expect("hmac key")
    }

    pub fn issue(&self, now: DateTime<Utc>) -> String {
        let expiry = (now + Duration::seconds(SESSION_TTL_SECS)).timestamp().to_string();
        let mut mac = self.mac();
        mac.update(expiry.as_bytes());
        format!("{expiry}.{}", hex::encode(mac.finalize().into_bytes()))
    }

    /// Compares two secrets by their MACs so the check takes the same time
    /// wherever they first differ.
    pub fn secrets_match(&self, given: &str, expected: &str) -> bool {
        let mut expected_mac = self.mac();
        expected_mac.update(expected.as_bytes());
        let expected_tag = expected_mac.finalize().into_bytes();
        let mut mac = self.mac();
        mac.update(given.as_bytes());
        mac.verify_slice(&expected_tag).is_ok()
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> bool {
        let Some((expiry, sig)) = token.split_once('.') else { return false };
        let Ok(expires_at) = expiry.parse::<i64>() else { return false };
        let Ok(sig) = hex::decode(sig) else { return false };
        let mut mac = self.mac();
        mac.update(expiry.as_bytes());
        mac.verify_slice(&sig).is_ok() && now.timestamp() < expires_at
    }
}

/// Pulls one cookie value out of a `Cookie` request header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').filter_map(|pair| pair.trim().split_once('=')).find(|(k, _)| *k == name).map(|(_, v)| v)
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!("{SESSION_COOKIE}={token}; HttpOnly; Path=/; Max-Age={SESSION_TTL_SECS}; SameSite=Lax");
    if secure { cookie.push_str("; Secure"); }
    cookie
}

pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; Path=/; Max-Age=0; SameSite=Lax")
}
