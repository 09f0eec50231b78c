//! Named routes and the demo site's handlers.

pub mod events;
pub mod health;
pub mod home;
pub mod not_found;
pub mod static_files;

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::MethodRouter;
use thiserror::Error;
use tracing::warn;

use crate::form::CsrfSigner;
use crate::middleware::BasicAuth;
use crate::state::AppState;

/// Path prefix owned by the static asset route.
pub const STATIC_PREFIX: &str = "/static";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route `{name}` claims reserved path {path}")]
    ReservedPath { name: String, path: String },

    #[error("path {path} is registered by both `{first}` and `{second}`")]
    DuplicatePath {
        path: String,
        first: String,
        second: String,
    },

    #[error("route path `{0}` must start with '/'")]
    InvalidPath(String),

    #[error("no route named `{0}`")]
    UnknownRoute(String),
}

/// One application route.
pub struct Route {
    pub name: String,
    pub path: String,
    pub handler: MethodRouter<AppState>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of application routes.
#[derive(Debug, Default)]
pub struct Routes {
    routes: Vec<Route>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. Paths are matched exactly.
    pub fn route(
        mut self,
        name: impl Into<String>,
        path: impl Into<String>,
        handler: MethodRouter<AppState>,
    ) -> Self {
        self.routes.push(Route {
            name: name.into(),
            path: path.into(),
            handler,
        });
        self
    }

    /// Append all routes of `other`.
    pub fn merge(mut self, other: Routes) -> Self {
        self.routes.extend(other.routes);
        self
    }

    /// Prefix every path, e.g. to mount a module below `/admin`.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        for route in &mut self.routes {
            route.path = if route.path == "/" {
                prefix.to_string()
            } else {
                format!("{prefix}{}", route.path)
            };
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Name lookup table. A repeated name is logged; the last one wins.
    pub fn names(&self) -> RouteNames {
        let mut names = HashMap::with_capacity(self.routes.len());
        for route in &self.routes {
            if let Some(previous) = names.insert(route.name.clone(), route.path.clone()) {
                warn!(
                    name = %route.name,
                    previous = %previous,
                    path = %route.path,
                    "route name registered twice, last registration wins"
                );
            }
        }
        RouteNames { names }
    }

    /// Check the table for paths that cannot be mounted.
    pub fn validate(&self) -> Result<(), RouteError> {
        let mut seen: HashMap<&str, &str> = HashMap::with_capacity(self.routes.len());
        for route in &self.routes {
            if !route.path.starts_with('/') {
                return Err(RouteError::InvalidPath(route.path.clone()));
            }
            if is_reserved(&route.path) {
                return Err(RouteError::ReservedPath {
                    name: route.name.clone(),
                    path: route.path.clone(),
                });
            }
            if let Some(first) = seen.insert(&route.path, &route.name) {
                return Err(RouteError::DuplicatePath {
                    path: route.path.clone(),
                    first: first.to_string(),
                    second: route.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn into_inner(self) -> Vec<Route> {
        self.routes
    }
}

/// Whether `path` falls under the static asset route.
pub fn is_reserved(path: &str) -> bool {
    path == STATIC_PREFIX
        || path
            .strip_prefix(STATIC_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Route name to path mapping, for building links.
#[derive(Debug, Clone, Default)]
pub struct RouteNames {
    names: HashMap<String, String>,
}

impl RouteNames {
    pub fn url_for(&self, name: &str) -> Result<&str, RouteError> {
        self.names
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| RouteError::UnknownRoute(name.to_string()))
    }

    /// Path for a route with `{param}` segments filled in.
    pub fn path_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String, RouteError> {
        let mut path = self.url_for(name)?.to_string();
        for (key, value) in params {
            path = path.replace(&format!("{{{key}}}"), value);
        }
        Ok(path)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Routes of the bundled demo site. `auth` guards the event editor and
/// `csrf` signs tokens for endpoints that take no form.
pub fn site(auth: Option<BasicAuth>, csrf: Arc<CsrfSigner>) -> Routes {
    Routes::new()
        .route("home", "/", axum::routing::get(home::index))
        .route("health", "/health", axum::routing::get(health::check))
        .merge(events::routes(auth, csrf))
}
