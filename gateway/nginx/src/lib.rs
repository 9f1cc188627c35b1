//! Drives an nginx process from a [`ReverseProxyConfig`].
//!
//! The [`Renderer`] turns a configuration into nginx's configuration-file syntax and the
//! [`Manager`] owns the process: it writes the rendered file only when its contents change,
//! validates it with `nginx -t`, and reloads or starts the process.
//!
//! [`ReverseProxyConfig`]: ingress_gateway_core::ReverseProxyConfig

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod dry_run;
mod manager;
mod process;
mod render;

pub use self::{
    dry_run::DryRunManager,
    manager::{ConfigChange, Manager, Status},
    process::NginxManager,
    render::Renderer,
};
use ingress_gateway_core::InvalidConfig;
use std::{path::PathBuf, process::ExitStatus, time::Duration};

/// Process and file-system settings shared by the renderer and the process manager.
#[derive(Clone, Debug)]
pub struct Settings {
    /// The nginx executable.
    pub binary: PathBuf,

    /// Where the rendered configuration is written.
    pub config_file: PathBuf,

    /// Written by nginx while it runs; only ever read here.
    pub pid_file: PathBuf,

    pub error_log: String,
    pub access_log: String,
    pub worker_connections: u32,

    /// Bounds each invocation of the nginx binary.
    pub command_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] InvalidConfig),

    #[error("failed to render configuration: {0}")]
    Render(#[from] minijinja::Error),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to execute nginx {args}: {source}")]
    Exec {
        args: String,
        #[source]
        source: std::io::Error,
    },

    #[error("nginx {args} failed with {status}: {output}")]
    Failed {
        args: String,
        status: ExitStatus,
        output: String,
    },

    #[error("nginx {args} did not complete within {timeout:?}")]
    Timeout { args: String, timeout: Duration },
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            binary: "nginx".into(),
            config_file: "/etc/nginx/nginx.conf".into(),
            pid_file: "/var/run/nginx.pid".into(),
            error_log: "/dev/stderr".to_string(),
            access_log: "/dev/stdout".to_string(),
            worker_connections: 512,
            command_timeout: Duration::from_secs(30),
        }
    }
}
