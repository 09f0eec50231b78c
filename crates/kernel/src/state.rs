//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use tracing::info;

use crate::assets::StaticAssets;
use crate::buffer_pool::BufferPool;
use crate::config::Config;
use crate::form::{CsrfSigner, FormSchema};
use crate::models::{Event, MemoryStore, Store};
use crate::routes::{RouteNames, events};
use crate::theme::ThemeEngine;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Token signer for form and header CSRF checks.
    csrf: Arc<CsrfSigner>,

    /// Static asset resolver.
    assets: Arc<StaticAssets>,

    /// Theme engine for template rendering.
    theme: Arc<ThemeEngine>,

    /// Route name lookup, frozen at startup.
    route_names: Arc<RouteNames>,

    /// Event storage.
    events: Arc<dyn Store<Event>>,

    /// Schema for creating events.
    event_form: FormSchema,

    /// Schema for editing events, with the version under edit.
    event_edit_form: FormSchema,

    /// Zone for rendering stored times.
    time_zone: Tz,
}

impl AppState {
    /// Create application state with its own CSRF signer and an in-memory
    /// event store.
    pub fn new(config: &Config, route_names: RouteNames) -> Result<Self> {
        let csrf = Arc::new(config.csrf_signer()?);
        Self::with_parts(config, route_names, csrf, Arc::new(MemoryStore::new()))
    }

    /// Create application state around a signer shared with route layers
    /// and the given event store.
    pub fn with_parts(
        config: &Config,
        route_names: RouteNames,
        csrf: Arc<CsrfSigner>,
        events: Arc<dyn Store<Event>>,
    ) -> Result<Self> {
        let assets = Arc::new(StaticAssets::new(&config.static_dir));

        let theme = ThemeEngine::new(
            &config.templates_dir,
            config.dev,
            Arc::clone(&assets),
            route_names.clone(),
            Arc::new(BufferPool::default()),
        )
        .context("failed to load templates")?;

        let event_form = events::event_form(Arc::clone(&csrf), config.time_zone)
            .context("invalid event form")?;
        let event_edit_form = events::event_edit_form(Arc::clone(&csrf), config.time_zone)
            .context("invalid event edit form")?;

        info!(
            static_dir = %config.static_dir.display(),
            templates_dir = %config.templates_dir.display(),
            secrets = csrf.secret_count(),
            "application state ready"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                csrf,
                assets,
                theme: Arc::new(theme),
                route_names: Arc::new(route_names),
                events,
                event_form,
                event_edit_form,
                time_zone: config.time_zone,
            }),
        })
    }

    pub fn csrf(&self) -> &Arc<CsrfSigner> {
        &self.inner.csrf
    }

    pub fn assets(&self) -> &Arc<StaticAssets> {
        &self.inner.assets
    }

    pub fn theme(&self) -> &Arc<ThemeEngine> {
        &self.inner.theme
    }

    pub fn route_names(&self) -> &RouteNames {
        &self.inner.route_names
    }

    pub fn events(&self) -> &Arc<dyn Store<Event>> {
        &self.inner.events
    }

    pub fn event_form(&self) -> &FormSchema {
        &self.inner.event_form
    }

    pub fn event_edit_form(&self) -> &FormSchema {
        &self.inner.event_edit_form
    }

    pub fn time_zone(&self) -> Tz {
        self.inner.time_zone
    }
}
