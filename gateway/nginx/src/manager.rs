use crate::{DryRunManager, Error, NginxManager, Settings};
use ingress_gateway_core::ReverseProxyConfig;
use std::sync::Arc;

/// The observed state of the proxy process.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Stopped,
    Running,

    /// The process state could not be determined, e.g. because the pid file is unreadable.
    Unknown,
}

/// The effect of applying a configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigChange {
    /// The rendered configuration matched what was already in place; nothing was touched.
    Unchanged,

    /// The configuration file was rewritten but no running process was signalled.
    Written,

    /// The configuration file was rewritten and the running process reloaded it.
    Reloaded,
}

/// Owns the proxy process's lifecycle.
#[derive(Debug)]
pub enum Manager {
    Nginx(NginxManager),
    DryRun(DryRunManager),
}

// === impl Manager ===

impl Manager {
    pub fn new(settings: Arc<Settings>, dry_run: bool) -> Result<Self, Error> {
        if dry_run {
            return Ok(Self::DryRun(DryRunManager::new(settings)?));
        }
        Ok(Self::Nginx(NginxManager::new(settings)?))
    }

    pub async fn status(&self) -> Status {
        match self {
            Self::Nginx(m) => m.status().await,
            Self::DryRun(m) => m.status(),
        }
    }

    /// Renders and applies `config`, reloading the process if it is running and the rendered
    /// configuration differs from what is already in place.
    pub async fn set_config(
        &mut self,
        config: &ReverseProxyConfig,
    ) -> Result<ConfigChange, Error> {
        match self {
            Self::Nginx(m) => m.set_config(config).await,
            Self::DryRun(m) => m.set_config(config),
        }
    }

    /// Starts the process with the current configuration, which is validated first.
    pub async fn start(&mut self) -> Result<(), Error> {
        match self {
            Self::Nginx(m) => m.start().await,
            Self::DryRun(m) => {
                m.start();
                Ok(())
            }
        }
    }
}
