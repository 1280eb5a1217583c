//! Email template system.
//!
//! This module provides:
//! - A concurrent store of compiled Handlebars templates
//! - A renderer binding the `image`, `imageWithSize` and `property` directives
//!   to a fresh per-render session
//! - Content-addressed inline images referenced through `cid:` URLs
//! - CSS inlining of the rendered HTML
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(TemplateStore::new());
//! store.load("welcome", r#"Hello {{name}} {{image "logo.png"}}"#)?;
//!
//! let renderer = TemplateRenderer::new(store, ImageResolver::new(images));
//! let rendered = renderer.render("welcome", &RenderContext::new("Hong", "a@b.com", 2026))?;
//! let html = inline_css(&rendered.html)?;
//! ```

mod images;
mod inliner;
mod renderer;
mod store;
mod types;

pub use images::{
    content_id, content_type, hash_reference, ImageResolver, ImageSize, ImageSource, Resolved,
};
pub use inliner::inline_css;
pub use renderer::TemplateRenderer;
pub use store::{CompiledTemplate, TemplateStore};
pub use types::{
    InlineAttachment, Recipient, RenderContext, Rendered, TemplateError, TemplateResult,
};

#[cfg(test)]
pub(crate) use images::testing;
