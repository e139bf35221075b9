//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::transport::{HttpTransport, PlatformTransport, TransportError};
use crate::upload::UploadCoordinator;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to initialize transport: {0}")]
    TransportInit(#[from] TransportError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    coordinator: UploadCoordinator,
    platform: Arc<dyn PlatformTransport>,
}

impl AppState {
    /// Create the state with an HTTP transport built from `config`
    pub fn new(config: Config) -> Result<Self, StateError> {
        let transport = Arc::new(HttpTransport::new(&config.dingtalk)?);
        let coordinator = UploadCoordinator::new(transport.clone(), config.upload.policy());
        Ok(Self::with_parts(config, coordinator, transport))
    }

    /// Create the state around an existing coordinator and platform client
    pub fn with_parts(
        config: Config,
        coordinator: UploadCoordinator,
        platform: Arc<dyn PlatformTransport>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                coordinator,
                platform,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the upload coordinator
    pub fn coordinator(&self) -> &UploadCoordinator {
        &self.inner.coordinator
    }

    /// Get the corporation-level API client
    pub fn platform(&self) -> &dyn PlatformTransport {
        self.inner.platform.as_ref()
    }

    /// Agent used when a request does not name one
    pub fn default_agent_id(&self) -> &str {
        &self.inner.config.dingtalk.agent_id
    }
}
