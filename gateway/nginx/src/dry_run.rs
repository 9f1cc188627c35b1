use crate::{ConfigChange, Error, Renderer, Settings, Status};
use ingress_gateway_core::ReverseProxyConfig;
use std::sync::Arc;
use tracing::{debug, info};

/// Renders configurations and logs them without touching the file system or any process.
#[derive(Debug)]
pub struct DryRunManager {
    settings: Arc<Settings>,
    renderer: Renderer,
    current: Option<Vec<u8>>,
    started: bool,
}

// === impl DryRunManager ===

impl DryRunManager {
    pub fn new(settings: Arc<Settings>) -> Result<Self, Error> {
        Ok(Self {
            renderer: Renderer::new()?,
            settings,
            current: None,
            started: false,
        })
    }

    pub fn status(&self) -> Status {
        if self.started {
            Status::Running
        } else {
            Status::Stopped
        }
    }

    pub fn set_config(&mut self, config: &ReverseProxyConfig) -> Result<ConfigChange, Error> {
        config.validate()?;
        let rendered = self.renderer.render(config, &self.settings)?;
        if self.current.as_deref() == Some(&*rendered) {
            debug!("Configuration unchanged");
            return Ok(ConfigChange::Unchanged);
        }

        info!(
            path = %self.settings.config_file.display(),
            servers = config.http_servers.len(),
            upstreams = config.http_upstreams.len(),
            "Would write configuration"
        );
        debug!(config = %String::from_utf8_lossy(&rendered));
        self.current = Some(rendered);

        if self.started {
            info!("Would reload nginx");
            return Ok(ConfigChange::Reloaded);
        }
        Ok(ConfigChange::Written)
    }

    pub fn start(&mut self) {
        info!(binary = %self.settings.binary.display(), "Would start nginx");
        self.started = true;
    }
}
