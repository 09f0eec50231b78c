//! Trellis kernel library.
//!
//! Request pipeline, signed CSRF tokens, flash messages, content-hashed static
//! assets and declarative forms. The `trellis` binary serves the bundled demo
//! site on top of it.

pub mod app;
pub mod assets;
pub mod buffer_pool;
pub mod config;
pub mod error;
pub mod flash;
pub mod form;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod theme;

pub use app::{App, build};
pub use config::{Cli, Config};
pub use state::AppState;
