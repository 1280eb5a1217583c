mod settings;

pub use settings::{
    DirectoryConfig, DispatchConfig, OidcConfig, OtelConfig, ServerConfig, SessionConfig,
    Settings, SmtpConfig, StorageConfig,
};
