//! One-shot flash messages carried across a redirect in a cookie.
//!
//! The cookie value is a comma-separated list of `<level>:<base64url(message)>`
//! entries. Decoding is best-effort: malformed entries are dropped, never the
//! whole cookie.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use cookie::{Cookie, SameSite};
use serde::Serialize;

/// Name of the flash cookie.
pub const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl FlashLevel {
    fn code(self) -> char {
        match self {
            FlashLevel::Info => 'i',
            FlashLevel::Success => 's',
            FlashLevel::Warning => 'w',
            FlashLevel::Error => 'e',
        }
    }

    /// Unknown codes fall back to `Info`.
    fn from_code(code: u8) -> Self {
        match code {
            b's' => FlashLevel::Success,
            b'w' => FlashLevel::Warning,
            b'e' => FlashLevel::Error,
            _ => FlashLevel::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub message: String,
}

impl FlashMessage {
    pub fn new(level: FlashLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Encode messages into a cookie value.
pub fn encode(messages: &[FlashMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}:{}", m.level.code(), URL_SAFE.encode(&m.message)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a cookie value. Never fails.
pub fn decode(value: &str) -> Vec<FlashMessage> {
    value
        .trim_matches('"')
        .split(',')
        .filter_map(|entry| {
            let bytes = entry.as_bytes();
            if bytes.len() <= 2 {
                return None;
            }
            let payload = URL_SAFE.decode(&bytes[2..]).ok()?;
            Some(FlashMessage {
                level: FlashLevel::from_code(bytes[0]),
                message: String::from_utf8_lossy(&payload).into_owned(),
            })
        })
        .collect()
}

/// Flash messages for the current request.
///
/// Extracting `Flashes` reads the incoming cookie. Handlers add messages with
/// the level helpers; the renderer decides whether the cookie is deleted,
/// rewritten or left alone (see [`Flashes::apply_cookie`]).
#[derive(Debug, Clone, Default)]
pub struct Flashes {
    messages: Vec<FlashMessage>,
    observed: bool,
}

impl Flashes {
    /// Read the flash cookie from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let value = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|c| c.name() == FLASH_COOKIE)
            .map(|c| c.value().to_string());

        match value {
            Some(value) => Self {
                messages: decode(&value),
                observed: true,
            },
            None => Self::default(),
        }
    }

    /// Whether the request carried a flash cookie.
    pub fn observed(&self) -> bool {
        self.observed
    }

    /// Incoming plus newly added messages.
    pub fn messages(&self) -> &[FlashMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn add(&mut self, level: FlashLevel, message: impl Into<String>) {
        self.messages.push(FlashMessage::new(level, message));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.add(FlashLevel::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.add(FlashLevel::Success, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.add(FlashLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.add(FlashLevel::Error, message);
    }

    /// Set the flash cookie on a response.
    ///
    /// An observed cookie is always deleted. A new cookie is written only on
    /// redirects, and only when messages are pending and none came in.
    pub fn apply_cookie(&self, headers: &mut HeaderMap, redirect: bool) {
        let cookie = if self.observed {
            let mut removal = Cookie::build((FLASH_COOKIE, "")).path("/").build();
            removal.make_removal();
            removal
        } else if redirect && !self.messages.is_empty() {
            Cookie::build((FLASH_COOKIE, encode(&self.messages)))
                .path("/")
                .same_site(SameSite::Strict)
                .secure(true)
                .build()
        } else {
            return;
        };

        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(error = %e, "flash cookie is not a valid header value"),
        }
    }
}

impl<S> FromRequestParts<S> for Flashes
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

// Tests are allowed to use unwrap/expect freely.
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample() -> Vec<FlashMessage> {
        vec![
            FlashMessage::new(FlashLevel::Success, "Saved."),
            FlashMessage::new(FlashLevel::Error, "Ünïcode, commas: and colons"),
            FlashMessage::new(FlashLevel::Warning, "w"),
            FlashMessage::new(FlashLevel::Info, "i"),
        ]
    }

    #[test]
    fn encode_shape() {
        let encoded = encode(&[FlashMessage::new(FlashLevel::Success, "hi")]);
        assert_eq!(encoded, "s:aGk=");
    }

    #[test]
    fn decode_inverts_encode() {
        let messages = sample();
        assert_eq!(decode(&encode(&messages)), messages);
        assert!(decode("").is_empty());
    }

    #[test]
    fn corrupted_entry_is_dropped() {
        let good = encode(&sample());
        let corrupted = format!("{good},e:%%%not-base64%%%,x,");
        assert_eq!(decode(&corrupted), sample());
    }

    #[test]
    fn unknown_level_is_info() {
        let decoded = decode("z:aGk=");
        assert_eq!(decoded, vec![FlashMessage::new(FlashLevel::Info, "hi")]);
    }

    #[test]
    fn quoted_cookie_value() {
        let decoded = decode("\"s:aGk=\"");
        assert_eq!(decoded, vec![FlashMessage::new(FlashLevel::Success, "hi")]);
    }

    #[test]
    fn invalid_utf8_is_lossy() {
        let encoded = format!("i:{}", URL_SAFE.encode([0x66, 0xff, 0x6f]));
        assert_eq!(decode(&encoded)[0].message, "f\u{fffd}o");
    }

    #[test]
    fn reads_cookie_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; flash=s:aGk=; other=1"),
        );
        let flashes = Flashes::from_headers(&headers);
        assert!(flashes.observed());
        assert_eq!(
            flashes.messages(),
            &[FlashMessage::new(FlashLevel::Success, "hi")]
        );

        let none = Flashes::from_headers(&HeaderMap::new());
        assert!(!none.observed());
        assert!(none.is_empty());
    }

    #[test]
    fn redirect_writes_pending_messages() {
        let mut flashes = Flashes::default();
        flashes.success("hi");
        let mut headers = HeaderMap::new();
        flashes.apply_cookie(&mut headers, true);

        let set = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set.starts_with("flash=s:aGk="));
        assert!(set.contains("Path=/"));
        assert!(set.contains("SameSite=Strict"));
        assert!(set.contains("Secure"));
    }

    #[test]
    fn plain_render_never_writes() {
        let mut flashes = Flashes::default();
        flashes.info("not persisted");
        let mut headers = HeaderMap::new();
        flashes.apply_cookie(&mut headers, false);
        assert!(headers.get(SET_COOKIE).is_none());
    }

    #[test]
    fn observed_cookie_is_deleted() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("flash=s:aGk="));
        let mut flashes = Flashes::from_headers(&headers);
        flashes.error("new message");

        let mut response = HeaderMap::new();
        flashes.apply_cookie(&mut response, true);
        let set = response.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set.starts_with("flash=;"));
        assert!(set.contains("Max-Age=0"));
    }

    #[test]
    fn nothing_to_do_without_messages() {
        let mut headers = HeaderMap::new();
        Flashes::default().apply_cookie(&mut headers, true);
        assert!(headers.is_empty());
    }
}
