use std::sync::Arc;
use std::time::Instant;

use config::ConfigError;

use crate::auth::{IdentityProvider, OidcProvider, SessionCodec};
use crate::config::Settings;
use crate::directory::{AuthentikClient, DirectoryService};
use crate::dispatch::{EmailDispatcher, RetryPolicy};
use crate::error::{AppError, Result};
use crate::storage::FileStorage;
use crate::template::{ImageResolver, TemplateRenderer, TemplateStore};
use crate::transport::{MailTransport, SmtpTransport};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub sessions: Arc<SessionCodec>,
    pub identity: Arc<dyn IdentityProvider>,
    pub directory: Arc<dyn DirectoryService>,
    pub templates: Arc<TemplateStore>,
    pub renderer: TemplateRenderer,
    pub template_files: FileStorage,
    pub image_files: FileStorage,
    pub dispatcher: Arc<EmailDispatcher>,
    pub start_time: Instant,
}

impl AppState {
    /// Build the production state: OIDC discovery, Authentik client and
    /// SMTP pool from settings.
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let identity = OidcProvider::discover(&settings.oidc).await?;
        let directory = AuthentikClient::new(&settings.directory)?;
        let transport = SmtpTransport::new(&settings.smtp)
            .map_err(|e| ConfigError::Message(format!("Invalid SMTP settings: {}", e)))?;

        Self::with_collaborators(
            settings,
            Arc::new(identity),
            Arc::new(directory),
            Arc::new(transport),
        )
        .await
    }

    /// Build the state around the given external collaborators. Storage
    /// directories are created if missing and templates are loaded from disk.
    pub async fn with_collaborators(
        settings: Settings,
        identity: Arc<dyn IdentityProvider>,
        directory: Arc<dyn DirectoryService>,
        transport: Arc<dyn MailTransport>,
    ) -> Result<Self> {
        let template_files = FileStorage::with_extension(&settings.storage.templates_dir, "html");
        let image_files = FileStorage::new(&settings.storage.images_dir);

        for storage in [&template_files, &image_files] {
            storage.ensure_root().await.map_err(|e| {
                AppError::Config(ConfigError::Message(format!(
                    "Storage directory unusable: {}",
                    e
                )))
            })?;
        }

        let templates = Arc::new(TemplateStore::new());
        templates.load_dir(template_files.root()).await;

        let resolver = ImageResolver::new(Arc::new(image_files.clone()));
        let renderer = TemplateRenderer::new(Arc::clone(&templates), resolver);

        let dispatcher = Arc::new(EmailDispatcher::with_policy(
            renderer.clone(),
            transport,
            RetryPolicy::from(&settings.dispatch),
            settings.dispatch.max_concurrency,
        ));

        Ok(Self {
            sessions: Arc::new(SessionCodec::new(&settings.session)),
            settings: Arc::new(settings),
            identity,
            directory,
            templates,
            renderer,
            template_files,
            image_files,
            dispatcher,
            start_time: Instant::now(),
        })
    }
}
