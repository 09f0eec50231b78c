//! HTTP middleware components.
//!
//! Provides request context and access logging, security headers, canonical
//! host redirects, root 404 handling, basic auth and CSRF enforcement.

pub mod base_url;
pub mod basic_auth;
pub mod csrf;
pub mod not_found;
pub mod request_context;
pub mod security_headers;

pub use base_url::{BaseUrl, canonicalize_host};
pub use basic_auth::{BasicAuth, basic_auth, basic_auth_with, require_basic_auth};
pub use csrf::require_csrf;
pub use not_found::{NotFoundService, only_exact_root};
pub use request_context::{RequestContext, inject_request_context};
pub use security_headers::{FrameOptions, SecurityHeaders, apply_security_headers};
