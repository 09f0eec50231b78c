//! Submitted form values.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::Method;
use url::form_urlencoded;

use crate::error::AppError;

/// Upper bound on a buffered urlencoded body.
pub const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;

/// Ordered multimap of submitted form values.
///
/// A name may repeat (multi-selects, checkboxes); [`get`](Self::get) returns
/// the first occurrence and [`get_all`](Self::get_all) every occurrence in
/// submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues {
    pairs: Vec<(String, String)>,
}

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `application/x-www-form-urlencoded` bytes.
    pub fn from_urlencoded(bytes: &[u8]) -> Self {
        Self {
            pairs: form_urlencoded::parse(bytes).into_owned().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// First value submitted under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value submitted under `name`, in order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// `GET`/`HEAD` read the query string, everything else reads the body.
impl<S> FromRequest<S> for FormValues
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if req.method() == Method::GET || req.method() == Method::HEAD {
            let query = req.uri().query().unwrap_or_default();
            return Ok(Self::from_urlencoded(query.as_bytes()));
        }

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        Ok(Self::from_urlencoded(&body))
    }
}

// Tests are allowed to use unwrap/expect freely.
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn decodes_urlencoded() {
        let values = FormValues::from_urlencoded(b"name=J%C3%BCrgen+K&tag=a&tag=b&empty=");
        assert_eq!(values.get("name"), Some("Jürgen K"));
        assert_eq!(values.get_all("tag"), vec!["a", "b"]);
        assert_eq!(values.get("empty"), Some(""));
        assert_eq!(values.get("missing"), None);
        assert_eq!(values.len(), 4);
    }

    #[test]
    fn preserves_order() {
        let mut values = FormValues::new();
        values.append("b", "1");
        values.append("a", "2");
        values.append("b", "3");
        let names: Vec<_> = values.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["b", "a", "b"]);
    }

    #[tokio::test]
    async fn extracts_body_on_post() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/submit?ignored=1")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("title=Hello"))
            .unwrap();
        let values = FormValues::from_request(req, &()).await.unwrap();
        assert_eq!(values.get("title"), Some("Hello"));
        assert_eq!(values.get("ignored"), None);
    }

    #[tokio::test]
    async fn extracts_query_on_get() {
        let req = Request::builder()
            .uri("/search?q=rust&page=2")
            .body(Body::empty())
            .unwrap();
        let values = FormValues::from_request(req, &()).await.unwrap();
        assert_eq!(values.get("q"), Some("rust"));
        assert_eq!(values.get("page"), Some("2"));
    }
}
