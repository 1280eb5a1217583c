//! CSS inlining for mail clients that ignore `<style>` blocks.

use css_inline::CSSInliner;

use super::types::{TemplateError, TemplateResult};

/// Move `<style>` rules into `style` attributes and drop the style blocks.
/// Remote stylesheets are never fetched.
pub fn inline_css(html: &str) -> TemplateResult<String> {
    let inliner = CSSInliner::options()
        .load_remote_stylesheets(false)
        .build();

    inliner
        .inline(html)
        .map_err(|e| TemplateError::Transform(e.to_string()))
}
