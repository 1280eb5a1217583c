//! Compiled template storage

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use handlebars::Template;

use super::types::{TemplateError, TemplateResult};
use crate::storage::FileStorage;

/// A parsed template together with the source it was compiled from.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    pub name: String,
    pub source: String,
    pub(crate) template: Template,
}

impl CompiledTemplate {
    /// Parse `source` without touching any store.
    pub fn compile(name: &str, source: &str) -> TemplateResult<Self> {
        let template = Template::compile(source).map_err(|e| TemplateError::Parse {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            name: name.to_string(),
            source: source.to_string(),
            template,
        })
    }
}

/// In-memory template storage.
///
/// Readers receive an `Arc` snapshot, so a template replaced while a render
/// is running does not affect that render.
pub struct TemplateStore {
    templates: DashMap<String, Arc<CompiledTemplate>>,
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateStore {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }

    /// Compile `source` and store it under `name`, replacing any previous
    /// version. On a parse failure the previous version stays in place.
    pub fn load(&self, name: &str, source: &str) -> TemplateResult<()> {
        let compiled = CompiledTemplate::compile(name, source)?;
        self.insert(compiled);
        Ok(())
    }

    /// Store an already compiled template.
    pub fn insert(&self, compiled: CompiledTemplate) {
        self.templates.insert(compiled.name.clone(), Arc::new(compiled));
        crate::metrics::TEMPLATES_LOADED.set(self.templates.len() as i64);
    }

    pub fn get(&self, name: &str) -> TemplateResult<Arc<CompiledTemplate>> {
        self.templates
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    pub fn delete(&self, name: &str) -> TemplateResult<()> {
        let removed = self.templates.remove(name);
        crate::metrics::TEMPLATES_LOADED.set(self.templates.len() as i64);
        removed
            .map(|_| ())
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Names of all loaded templates, in no particular order.
    pub fn list(&self) -> Vec<String> {
        self.templates.iter().map(|e| e.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.templates.len()
    }

    /// Load every `*.html` file of `dir`, named after the file stem.
    ///
    /// Files that cannot be read or parsed are logged and skipped. Returns the
    /// number of templates loaded.
    pub async fn load_dir(&self, dir: &Path) -> usize {
        let storage = FileStorage::with_extension(dir, "html");
        let names = match storage.list().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to list templates");
                return 0;
            }
        };

        let mut loaded = 0;
        for name in names {
            let source = match storage.read_to_string(&name).await {
                Ok(source) => source,
                Err(e) => {
                    tracing::warn!(template = %name, error = %e, "Failed to read template");
                    continue;
                }
            };

            match self.load(&name, &source) {
                Ok(()) => {
                    tracing::debug!(template = %name, "Template loaded");
                    loaded += 1;
                }
                Err(e) => tracing::warn!(template = %name, error = %e, "Skipping template"),
            }
        }

        tracing::info!(dir = %dir.display(), count = loaded, "Templates loaded");
        loaded
    }
}
