//! Stateless CSRF tokens.
//!
//! A token is `<RFC 3339 timestamp>.<base64url(HMAC-SHA256(secret, timestamp))>`.
//! The first configured secret signs new tokens; every configured secret is
//! accepted on validation so secrets can be rotated without invalidating
//! forms that are already on screen.

use std::time::Duration;

use axum::http::{HeaderMap, Uri};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use url::form_urlencoded;

use super::FormValues;

type HmacSha256 = Hmac<Sha256>;

/// Name of the hidden form field and query parameter carrying the token.
pub const CSRF_FIELD: &str = "_csrf";

/// Headers checked for a token, in order, after the form value and query.
pub const CSRF_HEADERS: [&str; 2] = ["x-csrf-token", "x-xsrf-token"];

/// Default token lifetime (30 minutes).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Why a token was rejected (or why a signer could not be built).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CsrfError {
    #[error("invalid token format")]
    InvalidFormat,

    #[error("invalid token signature")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("no CSRF secrets configured")]
    NoSecrets,

    #[error("CSRF max age out of range")]
    InvalidMaxAge,
}

/// Signs and validates CSRF tokens against an ordered secret list.
#[derive(Clone)]
pub struct CsrfSigner {
    /// Keyed MACs, one per secret. Index 0 signs.
    keys: Vec<HmacSha256>,
    max_age: TimeDelta,
}

impl std::fmt::Debug for CsrfSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfSigner")
            .field("secrets", &self.keys.len())
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl CsrfSigner {
    /// Build a signer. A zero `max_age` means [`DEFAULT_MAX_AGE`].
    pub fn new<I, S>(secrets: I, max_age: Duration) -> Result<Self, CsrfError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let keys = secrets
            .into_iter()
            .map(|secret| {
                HmacSha256::new_from_slice(secret.as_ref()).map_err(|_| CsrfError::NoSecrets)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if keys.is_empty() {
            return Err(CsrfError::NoSecrets);
        }

        let max_age = if max_age.is_zero() {
            DEFAULT_MAX_AGE
        } else {
            max_age
        };
        let max_age = TimeDelta::from_std(max_age).map_err(|_| CsrfError::InvalidMaxAge)?;

        Ok(Self { keys, max_age })
    }

    /// Number of secrets accepted on validation.
    pub fn secret_count(&self) -> usize {
        self.keys.len()
    }

    /// Maximum token age.
    pub fn max_age(&self) -> TimeDelta {
        self.max_age
    }

    /// Mint a token stamped with the current time.
    pub fn generate(&self) -> String {
        self.generate_at(Utc::now())
    }

    /// Mint a token stamped with `now`.
    pub fn generate_at(&self, now: DateTime<Utc>) -> String {
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        // keys is never empty, see `new`
        let signature = match self.keys.first() {
            Some(primary) => primary.clone().chain_update(timestamp.as_bytes()).finalize(),
            None => return timestamp,
        };
        format!("{timestamp}.{}", URL_SAFE.encode(signature.into_bytes()))
    }

    /// Validate a token against the wall clock.
    pub fn validate(&self, token: &str) -> Result<(), CsrfError> {
        self.validate_at(token, Utc::now())
    }

    /// Validate a token as of `now`.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<(), CsrfError> {
        let result = self.check(token, now);
        if let Err(e) = &result {
            tracing::debug!(
                error = %e,
                token_prefix = %token.chars().take(20).collect::<String>(),
                "CSRF token rejected"
            );
        }
        result
    }

    fn check(&self, token: &str, now: DateTime<Utc>) -> Result<(), CsrfError> {
        let (timestamp, signature) = token.split_once('.').ok_or(CsrfError::InvalidFormat)?;

        let issued = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| CsrfError::InvalidFormat)?
            .with_timezone(&Utc);

        let signature = URL_SAFE
            .decode(signature)
            .map_err(|_| CsrfError::InvalidFormat)?;

        // Every secret is tried; no early exit on the first match.
        let matched = self.keys.iter().fold(false, |matched, key| {
            let ok = key
                .clone()
                .chain_update(timestamp.as_bytes())
                .verify_slice(&signature)
                .is_ok();
            matched | ok
        });
        if !matched {
            return Err(CsrfError::BadSignature);
        }

        if now.signed_duration_since(issued) > self.max_age {
            return Err(CsrfError::Expired);
        }

        Ok(())
    }
}

/// Find a submitted token for non-form callers.
///
/// Precedence: form value, query parameter, `X-CSRF-TOKEN`, `X-XSRF-TOKEN`.
/// The first non-empty candidate wins.
pub fn token_from_request(
    form: Option<&FormValues>,
    uri: &Uri,
    headers: &HeaderMap,
) -> Option<String> {
    if let Some(token) = form.and_then(|f| f.get(CSRF_FIELD))
        && !token.is_empty()
    {
        return Some(token.to_string());
    }

    if let Some(query) = uri.query()
        && let Some((_, token)) = form_urlencoded::parse(query.as_bytes())
            .find(|(key, value)| key == CSRF_FIELD && !value.is_empty())
    {
        return Some(token.into_owned());
    }

    CSRF_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}
