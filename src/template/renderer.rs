//! Template rendering with the `image`, `imageWithSize` and `property`
//! directives.

use std::sync::{Arc, Mutex};

use handlebars::{
    html_escape, Context, Handlebars, Helper, HelperDef, HelperResult, JsonRender, Output,
    RenderContext as HbRenderContext, RenderErrorReason,
};

use super::images::{ImageResolver, ImageSize, Resolved};
use super::store::{CompiledTemplate, TemplateStore};
use super::types::{InlineAttachment, RenderContext, Rendered, TemplateError, TemplateResult};

/// Per-render state shared by the directive helpers.
///
/// A new session is created for every render and dropped afterwards, so
/// attachments never leak between recipients.
struct RenderSession {
    resolver: ImageResolver,
    attachments: Mutex<Vec<InlineAttachment>>,
}

impl RenderSession {
    fn new(resolver: ImageResolver) -> Self {
        Self {
            resolver,
            attachments: Mutex::new(Vec::new()),
        }
    }

    fn emit(&self, resolved: Resolved, out: &mut dyn Output) -> HelperResult {
        match resolved {
            Resolved::Inline { markup, attachment } => {
                out.write(&markup)?;
                self.attachments
                    .lock()
                    .map_err(|_| RenderErrorReason::Other("attachment list poisoned".into()))?
                    .push(attachment);
            }
            Resolved::Missing { placeholder } => out.write(&placeholder)?,
        }
        Ok(())
    }

    fn into_attachments(self) -> Vec<InlineAttachment> {
        self.attachments
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn string_param(
    h: &Helper<'_>,
    helper: &'static str,
    index: usize,
) -> Result<String, RenderErrorReason> {
    h.param(index)
        .map(|p| p.value().render())
        .ok_or(RenderErrorReason::ParamNotFoundForIndex(helper, index))
}

/// `{{image "logo.png"}}`
struct ImageDirective<'a> {
    session: &'a RenderSession,
}

impl HelperDef for ImageDirective<'_> {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut HbRenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let reference = string_param(h, "image", 0)?;
        let resolved = self.session.resolver.resolve(&reference, None);
        self.session.emit(resolved, out)
    }
}

/// `{{imageWithSize "logo.png" "120" "40"}}`
struct SizedImageDirective<'a> {
    session: &'a RenderSession,
}

impl HelperDef for SizedImageDirective<'_> {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut HbRenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let reference = string_param(h, "imageWithSize", 0)?;
        let size = ImageSize {
            width: string_param(h, "imageWithSize", 1)?,
            height: string_param(h, "imageWithSize", 2)?,
        };
        let resolved = self.session.resolver.resolve(&reference, Some(&size));
        self.session.emit(resolved, out)
    }
}

/// `{{property "team"}}` reads `custom.team`, or nothing when absent.
struct PropertyDirective;

impl HelperDef for PropertyDirective {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        _: &mut HbRenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let key = match h.param(0) {
            Some(p) => p.value().render(),
            None => return Ok(()),
        };

        let value = ctx
            .data()
            .get("custom")
            .and_then(|custom| custom.get(&key))
            .and_then(|v| v.as_str());

        if let Some(value) = value {
            out.write(&html_escape(value))?;
        }
        Ok(())
    }
}

/// Renders stored templates for one recipient at a time.
#[derive(Clone)]
pub struct TemplateRenderer {
    store: Arc<TemplateStore>,
    resolver: ImageResolver,
}

impl TemplateRenderer {
    pub fn new(store: Arc<TemplateStore>, resolver: ImageResolver) -> Self {
        Self { store, resolver }
    }

    pub fn store(&self) -> &Arc<TemplateStore> {
        &self.store
    }

    /// Render the stored template `name` against `context`.
    pub fn render(&self, name: &str, context: &RenderContext) -> TemplateResult<Rendered> {
        let compiled = self.store.get(name)?;
        self.execute(&compiled, context)
    }

    /// Compile and render a source that is not (yet) stored.
    pub fn render_source(
        &self,
        name: &str,
        source: &str,
        context: &RenderContext,
    ) -> TemplateResult<Rendered> {
        let compiled = CompiledTemplate::compile(name, source)?;
        self.execute(&compiled, context)
    }

    fn execute(
        &self,
        compiled: &CompiledTemplate,
        context: &RenderContext,
    ) -> TemplateResult<Rendered> {
        let session = RenderSession::new(self.resolver.clone());

        let html = {
            let mut registry = Handlebars::new();
            registry.set_strict_mode(true);
            registry.register_helper("image", Box::new(ImageDirective { session: &session }));
            registry.register_helper(
                "imageWithSize",
                Box::new(SizedImageDirective { session: &session }),
            );
            registry.register_helper("property", Box::new(PropertyDirective));
            registry.register_template(&compiled.name, compiled.template.clone());

            registry
                .render(&compiled.name, context)
                .map_err(|e| TemplateError::Render {
                    name: compiled.name.clone(),
                    reason: e.to_string(),
                })?
        };

        Ok(Rendered {
            html,
            attachments: session.into_attachments(),
        })
    }
}
