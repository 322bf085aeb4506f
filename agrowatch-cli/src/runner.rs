//! Shared setup for commands that talk to the API.

use std::future::Future;

use agrowatch::config::ConfigFile;
use agrowatch::{Session, SessionConfig};
use tokio::runtime::Runtime;
use tracing::info;

use crate::error::CliError;

/// Loads configuration, builds the session and owns the async runtime.
pub struct CliRunner {
    config: ConfigFile,
    session: Session,
    runtime: Runtime,
}

impl CliRunner {
    /// Build from the config file, with an optional API URL override.
    pub fn new(api_url: Option<String>) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;
        let mut session_config = SessionConfig::from_config_file(&config);
        if let Some(url) = api_url {
            session_config.base_url = url;
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let session = Session::new(session_config)?;

        Ok(Self {
            config,
            session,
            runtime,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run a future to completion on the runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = env!("CARGO_PKG_VERSION"),
            api = self.session.client().base_url(),
            "agrowatch starting"
        );
    }
}
