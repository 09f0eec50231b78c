//! Page descriptors and redirect responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Serialize;
use tera::Context;

use crate::flash::Flashes;

/// Cache policy for a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_age: u64,
    pub public: bool,
}

impl CachePolicy {
    /// Cacheable by shared caches for `max_age` seconds.
    pub fn public(max_age: u64) -> Self {
        Self {
            max_age,
            public: true,
        }
    }

    /// Cacheable only by the browser for `max_age` seconds.
    pub fn private(max_age: u64) -> Self {
        Self {
            max_age,
            public: false,
        }
    }

    pub fn header_value(&self) -> String {
        let scope = if self.public { "public" } else { "private" };
        format!("{scope}, max-age={}", self.max_age)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::private(0)
    }
}

/// A template to render, with its status, context and cache policy.
#[derive(Debug, Clone)]
pub struct Page {
    pub(super) template: String,
    pub(super) status: StatusCode,
    pub(super) context: Context,
    pub(super) cache: CachePolicy,
}

impl Page {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            status: StatusCode::OK,
            context: Context::new(),
            cache: CachePolicy::default(),
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn insert<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Self {
        self.context.insert(key, value);
        self
    }

    pub fn cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }
}

/// 303 See Other to `location`, carrying any pending flash messages.
pub fn redirect(location: &str, flashes: &Flashes) -> Response {
    let mut response = Redirect::to(location).into_response();
    flashes.apply_cookie(response.headers_mut(), true);
    response
}
