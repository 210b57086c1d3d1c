//! Offline license tokens.
//!
//! A token is `base64url(YYYY-MM-DD || HMAC-SHA256(secret, YYYY-MM-DD))`.
//! The secret ships inside the binary, so a token deters casual tampering but
//! is not a security boundary: anyone holding the binary can recover the key
//! and mint tokens.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::NaiveDate;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Length of the trailing MAC in a decoded token.
pub const MAC_LEN: usize = 32;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Twelve-byte blob carried in the binary; the key is its last four bytes.
const EMBEDDED_BLOB: &[u8; 12] = b"\x89PNG\r\n\x1a\n9844";

/// Issuers pad, hand-copied tokens often lose the `=`; accept both.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The key every shipped build verifies against.
pub fn embedded_secret() -> &'static [u8] {
    &EMBEDDED_BLOB[EMBEDDED_BLOB.len() - 4..]
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("license token is malformed")]
    Malformed,
    #[error("license token failed its integrity check")]
    Tampered,
    #[error("license token expired on {0}")]
    Expired(NaiveDate),
}

/// Encodes and verifies expiration tokens for one secret.
#[derive(Clone)]
pub struct TokenCodec {
    keyed: HmacSha256,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let keyed = <HmacSha256 as Mac>::new_from_slice(secret)
            .expect("HMAC accepts keys of any length");
        Self { keyed }
    }

    /// Codec keyed with [`embedded_secret`].
    pub fn embedded() -> Self {
        Self::new(embedded_secret())
    }

    fn mac(&self, payload: &[u8]) -> [u8; MAC_LEN] {
        let mut mac = self.keyed.clone();
        mac.update(payload);
        let mut out = [0u8; MAC_LEN];
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }

    /// Mint a token for `expiration`. The CLI never calls this; tokens are
    /// issued out of band.
    pub fn encode(&self, expiration: NaiveDate) -> String {
        let date = expiration.format(DATE_FORMAT).to_string();
        let mut raw = Vec::with_capacity(date.len() + MAC_LEN);
        raw.extend_from_slice(date.as_bytes());
        raw.extend_from_slice(&self.mac(date.as_bytes()));
        TOKEN_ENGINE.encode(raw)
    }

    /// Recover the expiration date, rejecting anything whose MAC does not
    /// match. Does not look at the calendar.
    pub fn decode(&self, token: &str) -> Result<NaiveDate, TokenError> {
        let raw = TOKEN_ENGINE
            .decode(token.trim())
            .map_err(|_| TokenError::Malformed)?;
        if raw.len() < MAC_LEN {
            return Err(TokenError::Malformed);
        }

        let (payload, received) = raw.split_at(raw.len() - MAC_LEN);
        let expected = self.mac(payload);
        if !bool::from(received.ct_eq(&expected)) {
            return Err(TokenError::Tampered);
        }

        let text = std::str::from_utf8(payload).map_err(|_| TokenError::Malformed)?;
        NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|_| TokenError::Malformed)
    }

    /// [`decode`](Self::decode) plus the `expiration >= today` rule.
    pub fn verify(&self, token: &str, today: NaiveDate) -> Result<NaiveDate, TokenError> {
        let expiration = self.decode(token)?;
        if expiration < today {
            return Err(TokenError::Expired(expiration));
        }
        Ok(expiration)
    }
}
