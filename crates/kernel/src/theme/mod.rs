//! Theme engine and page rendering.
//!
//! Provides Tera-based template rendering with static asset helpers, flash
//! message delivery, ETag revalidation and redirect responses.

mod engine;
mod page;

pub use engine::ThemeEngine;
pub use page::{CachePolicy, Page, redirect};
