//! Theme engine with Tera templates and asset/route helper functions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tera::{Tera, Value};
use tracing::debug;

use crate::assets::{AssetDescriptor, StaticAssets};
use crate::buffer_pool::BufferPool;
use crate::error::AppResult;
use crate::flash::Flashes;
use crate::routes::RouteNames;

use super::page::Page;

/// Theme engine for rendering pages.
pub struct ThemeEngine {
    /// Tera template engine instance. Written only when reloading.
    tera: RwLock<Tera>,
    /// Re-read templates from disk before every render (dev mode).
    reload: bool,
    /// Output buffers shared by all renders.
    pool: Arc<BufferPool>,
}

impl ThemeEngine {
    /// Load templates from the given directory and register helpers.
    pub fn new(
        template_dir: &Path,
        reload: bool,
        assets: Arc<StaticAssets>,
        routes: RouteNames,
        pool: Arc<BufferPool>,
    ) -> Result<Self> {
        let pattern = template_dir.join("**/*.html");
        let pattern_str = pattern
            .to_str()
            .context("invalid template directory path")?;

        let mut tera = Tera::new(pattern_str).context("failed to initialize Tera templates")?;
        register_functions(&mut tera, assets, Arc::new(routes));

        debug!(
            count = tera.get_template_names().count(),
            reload, "loaded templates"
        );

        Ok(Self {
            tera: RwLock::new(tera),
            reload,
            pool,
        })
    }

    /// Build from in-memory templates (for testing).
    pub fn from_templates(
        templates: &[(&str, &str)],
        assets: Arc<StaticAssets>,
        routes: RouteNames,
    ) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates.iter().copied())
            .context("failed to parse templates")?;
        register_functions(&mut tera, assets, Arc::new(routes));
        Ok(Self {
            tera: RwLock::new(tera),
            reload: false,
            pool: Arc::new(BufferPool::default()),
        })
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Render a page into a response.
    ///
    /// Adds `flashes` to the template context and deletes the flash cookie if
    /// the request carried one. Successful pages get an ETag; a request whose
    /// `If-None-Match` already names it gets 304 with no body.
    pub fn render(&self, page: Page, flashes: &Flashes, request: &HeaderMap) -> AppResult<Response> {
        if self.reload {
            self.tera.write().full_reload()?;
        }

        let Page {
            template,
            status,
            mut context,
            cache,
        } = page;
        context.insert("flashes", flashes.messages());

        let mut buf = self.pool.acquire();
        self.tera.read().render_to(&template, &context, &mut *buf)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        flashes.apply_cookie(&mut headers, false);

        if status != StatusCode::OK {
            return Ok((status, headers, Body::from(buf.to_vec())).into_response());
        }

        let etag = format!("\"{}\"", URL_SAFE.encode(Sha256::digest(&buf[..])));
        if let Ok(value) = HeaderValue::from_str(&cache.header_value()) {
            headers.insert(CACHE_CONTROL, value);
        }
        if let Ok(value) = HeaderValue::from_str(&etag) {
            headers.insert(ETAG, value);
        }

        if etag_matches(request, &etag) {
            return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
        }
        Ok((status, headers, Body::from(buf.to_vec())).into_response())
    }

    /// Render a template to a string (for partials and tests).
    pub fn render_to_string(&self, template: &str, context: &tera::Context) -> AppResult<String> {
        if self.reload {
            self.tera.write().full_reload()?;
        }
        Ok(self.tera.read().render(template, context)?)
    }
}

fn etag_matches(request: &HeaderMap, etag: &str) -> bool {
    request
        .get_all(IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|candidate| candidate.trim().trim_start_matches("W/"))
        .any(|candidate| candidate == etag || candidate == "*")
}

/// Escape a value for a double-quoted HTML attribute.
fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn path_arg(function: &str, args: &HashMap<String, Value>) -> tera::Result<String> {
    args.get("path")
        .and_then(Value::as_str)
        .map(|p| p.trim_start_matches('/').to_string())
        .ok_or_else(|| tera::Error::msg(format!("{function}: missing string argument `path`")))
}

fn resolve(assets: &StaticAssets, function: &str, path: &str) -> tera::Result<AssetDescriptor> {
    assets
        .resolve_blocking(path)
        .map_err(|e| tera::Error::msg(format!("{function}({path}): {e}")))
}

/// Which markup an asset helper emits.
#[derive(Clone, Copy)]
enum AssetMarkup {
    Url,
    Stylesheet,
    Javascript,
}

impl AssetMarkup {
    fn name(self) -> &'static str {
        match self {
            AssetMarkup::Url => "static_url",
            AssetMarkup::Stylesheet => "stylesheet",
            AssetMarkup::Javascript => "javascript",
        }
    }
}

/// `static_url`, `stylesheet` and `javascript`: hashed asset references.
struct AssetHelper {
    assets: Arc<StaticAssets>,
    markup: AssetMarkup,
}

impl tera::Function for AssetHelper {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let function = self.markup.name();
        let path = path_arg(function, args)?;
        let asset = resolve(&self.assets, function, &path)?;
        let href = escape_attr(&asset.hashed_path);
        Ok(Value::String(match self.markup {
            AssetMarkup::Url => format!("/static/{href}"),
            AssetMarkup::Stylesheet => format!(
                r#"<link rel="stylesheet" href="/static/{href}" integrity="{}">"#,
                asset.integrity
            ),
            AssetMarkup::Javascript => format!(
                r#"<script src="/static/{href}" integrity="{}" async></script>"#,
                asset.integrity
            ),
        }))
    }

    // output is built from resolved paths and already attribute-escaped
    fn is_safe(&self) -> bool {
        true
    }
}

/// `url_for(name=..)`: path of a named route.
struct UrlFor {
    routes: Arc<RouteNames>,
}

impl tera::Function for UrlFor {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("url_for: missing string argument `name`"))?;
        self.routes
            .url_for(name)
            .map(|path| Value::String(escape_attr(path)))
            .map_err(|e| tera::Error::msg(e.to_string()))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

fn register_functions(tera: &mut Tera, assets: Arc<StaticAssets>, routes: Arc<RouteNames>) {
    for markup in [
        AssetMarkup::Url,
        AssetMarkup::Stylesheet,
        AssetMarkup::Javascript,
    ] {
        tera.register_function(
            markup.name(),
            AssetHelper {
                assets: Arc::clone(&assets),
                markup,
            },
        );
    }
    tera.register_function("url_for", UrlFor { routes });
}
