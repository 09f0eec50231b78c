//! Router assembly: application routes, the static asset route, the 404
//! handler and the middleware pipeline.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::MethodRouter;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::Config;
use crate::middleware::request_context::{log_response, request_span};
use crate::middleware::{
    BaseUrl, NotFoundService, SecurityHeaders, apply_security_headers, canonicalize_host,
    inject_request_context, only_exact_root,
};
use crate::models::{Event, MemoryStore, Store};
use crate::routes::{self, RouteError, Routes, not_found, static_files};
use crate::state::AppState;

/// Build the demo site's router from configuration.
pub fn build(config: &Config) -> anyhow::Result<Router> {
    let csrf = Arc::new(config.csrf_signer()?);
    let routes = routes::site(config.basic_auth(), Arc::clone(&csrf));
    let events: Arc<dyn Store<Event>> = Arc::new(MemoryStore::new());
    let state = AppState::with_parts(config, routes.names(), csrf, events)?;
    App::new(routes)
        .not_found(not_found::handler())
        .security_headers(config.security.clone())
        .base_url(config.base_url()?)
        .into_router(state)
        .context("invalid route table")
}

/// Everything needed to build the HTTP router.
pub struct App {
    routes: Routes,
    not_found: Option<MethodRouter<AppState>>,
    security: SecurityHeaders,
    base_url: Option<BaseUrl>,
}

impl App {
    pub fn new(routes: Routes) -> Self {
        Self {
            routes,
            not_found: None,
            security: SecurityHeaders::default(),
            base_url: None,
        }
    }

    /// Handler for every request no route matches.
    pub fn not_found(mut self, handler: MethodRouter<AppState>) -> Self {
        self.not_found = Some(handler);
        self
    }

    pub fn security_headers(mut self, security: SecurityHeaders) -> Self {
        self.security = security;
        self
    }

    /// Redirect requests for other hosts to this base URL.
    pub fn base_url(mut self, base_url: Option<BaseUrl>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Validate the route table and build the router.
    pub fn into_router(self, state: AppState) -> Result<Router, RouteError> {
        self.routes.validate()?;

        let not_found: Option<NotFoundService> =
            self.not_found.map(|handler| handler.with_state(state.clone()));

        let mut router: Router<AppState> = static_files::router();
        let mut root_claimed = false;
        let count = self.routes.len();

        for route in self.routes.into_inner() {
            debug!(name = %route.name, path = %route.path, "mounting route");
            let handler = match &not_found {
                Some(not_found) if route.path == "/" => {
                    root_claimed = true;
                    route
                        .handler
                        .layer(from_fn_with_state(not_found.clone(), only_exact_root))
                }
                _ => route.handler,
            };
            router = router.route(&route.path, handler);
        }

        if let Some(not_found) = not_found {
            if !root_claimed {
                router = router.route_service("/", not_found.clone());
            }
            router = router.fallback_service(not_found);
        }

        // Layers run outermost-last: the request id is assigned first, then
        // the trace span opens, and the base URL check runs closest to routing.
        if let Some(base_url) = self.base_url {
            info!(base_url = %base_url.url(), "canonical host redirect enabled");
            router = router.layer(from_fn_with_state(Arc::new(base_url), canonicalize_host));
        }
        let router = router
            .layer(from_fn_with_state(
                Arc::new(self.security),
                apply_security_headers,
            ))
            .layer(from_fn(inject_request_context))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(request_span)
                    .on_response(log_response),
            )
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        info!(routes = count, "router ready");
        Ok(router.with_state(state))
    }
}
