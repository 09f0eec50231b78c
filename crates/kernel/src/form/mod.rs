//! Declarative forms with typed fields and CSRF protection.
//!
//! The form system supports:
//! - Schema definition with a builder that must be finalized before use
//! - Typed field kinds (text, password, hidden, datetime-local, select, multi-select)
//! - Stateless signed CSRF tokens with secret rotation
//! - Parsing into render-ready instances plus a typed value map

mod builder;
pub mod csrf;
pub mod parsers;
mod service;
mod types;
mod values;

pub use builder::{FormBuilder, FormSchema, SchemaError};
pub use csrf::{CSRF_FIELD, CsrfError, CsrfSigner, token_from_request};
pub use service::{
    DATETIME_LOCAL_FORMAT, Field, FieldOption, Form, FormData, MSG_CSRF_EXPIRED,
    MSG_CSRF_INVALID, MSG_INVALID_DATETIME, MSG_REQUIRED, MSG_SELECT_PROMPT,
    format_datetime_local,
};
pub use types::{
    DateTimeLocalConfig, FieldDef, FieldKind, HiddenConfig, ParseFn, SelectConfig,
    SelectMultiConfig, SelectOption, TextConfig, Widget,
};
pub use values::{FormValues, MAX_FORM_BYTES};
