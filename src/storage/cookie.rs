//! Inline signed-token session backend.
//!
//! The whole session travels inside the token:
//!
//! ```text
//! base64url(json(session)) "--" hex(hmac_sha256(secret, base64url(...)))
//! ```
//!
//! The signature makes the token tamper-evident, not confidential: anyone
//! holding a token can read its payload. Nothing is stored server-side, so
//! `destroy` is a no-op and a reset can only be enforced by the transport
//! replacing the client's token.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Duration;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::core::Session;
use crate::error::{Result, SatchelError};
use crate::storage::SessionBackend;
use crate::util::ensure_within_limit;

type HmacSha256 = Hmac<Sha256>;

const NAME: &str = "cookie";

/// Separator between payload and digest.
const SEPARATOR: &str = "--";

/// Browsers reject cookies over 4 KB.
pub const DEFAULT_MAX_COOKIE_SIZE: usize = 4096;

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Signed-token session backend.
#[derive(Clone)]
pub struct CookieBackend {
    /// Keyed MAC for the current secret; cloned per signature.
    mac: HmacSha256,
    /// Keyed MACs for retired secrets still accepted on load.
    previous: Vec<HmacSha256>,
    /// Maximum token length.
    max_size_bytes: usize,
    /// Inactivity TTL stamped into each token.
    ttl: Option<Duration>,
}

impl fmt::Debug for CookieBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieBackend")
            .field("secret", &"<redacted>")
            .field("previous_secrets", &self.previous.len())
            .field("max_size_bytes", &self.max_size_bytes)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CookieBackend {
    /// Create a cookie backend signing with `secret`.
    ///
    /// Fails with a config error if the secret is shorter than
    /// [`MIN_SECRET_LEN`] bytes.
    pub fn new(secret: &str) -> Result<Self> {
        Ok(Self {
            mac: keyed_mac(secret)?,
            previous: Vec::new(),
            max_size_bytes: DEFAULT_MAX_COOKIE_SIZE,
            ttl: None,
        })
    }

    /// Also accept tokens signed with retired secrets.
    ///
    /// Tokens are always re-signed with the current secret on save.
    pub fn with_previous_secrets<I, S>(mut self, secrets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.previous = secrets
            .into_iter()
            .map(|s| keyed_mac(s.as_ref()))
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// Override the maximum token length.
    pub fn with_max_size(mut self, max_size_bytes: usize) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// Maximum token length in bytes.
    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    /// Expire tokens after `ttl` of inactivity.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    fn digest(mac: &HmacSha256, payload: &str) -> String {
        let mut mac = mac.clone();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Encode and sign a session without applying the size limit.
    pub fn encode(&self, session: &Session) -> Result<String> {
        let json = serde_json::to_vec(session)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let digest = Self::digest(&self.mac, &payload);
        Ok(format!("{}{}{}", payload, SEPARATOR, digest))
    }

    /// Verify and decode a token.
    ///
    /// Returns `TamperDetected` if the token is malformed or its signature
    /// matches none of the accepted secrets. Expiry is not checked here.
    pub fn decode(&self, token: &str) -> Result<Session> {
        let (payload, digest) = token
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| SatchelError::tampered("missing signature"))?;

        let verified = std::iter::once(&self.mac)
            .chain(self.previous.iter())
            .any(|mac| {
                let expected = Self::digest(mac, payload);
                // Constant-time comparison to prevent timing attacks.
                expected.as_bytes().ct_eq(digest.as_bytes()).unwrap_u8() == 1
            });
        if !verified {
            return Err(SatchelError::tampered("signature mismatch"));
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| SatchelError::tampered(format!("payload is not base64: {}", e)))?;
        serde_json::from_slice(&json)
            .map_err(|e| SatchelError::tampered(format!("payload is not a session: {}", e)))
    }
}

fn keyed_mac(secret: &str) -> Result<HmacSha256> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(SatchelError::config(format!(
            "cookie secret must be at least {} bytes (got {})",
            MIN_SECRET_LEN,
            secret.len()
        )));
    }
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SatchelError::config(format!("invalid cookie secret: {}", e)))
}

impl SessionBackend for CookieBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn load(&self, token: &str) -> Result<Option<Session>> {
        if token.is_empty() {
            return Ok(None);
        }

        let session = self.decode(token)?;
        if session.is_expired() {
            tracing::debug!(session_id = %session.id, "cookie session expired");
            return Ok(None);
        }

        Ok(Some(session))
    }

    fn save(&self, session: &Session) -> Result<String> {
        let token = self.encode(session)?;
        ensure_within_limit(token.len(), Some(self.max_size_bytes))?;
        Ok(token)
    }

    fn destroy(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}
