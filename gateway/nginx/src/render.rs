use crate::{Error, Settings};
use ingress_gateway_core::ReverseProxyConfig;
use minijinja::{context, Environment, UndefinedBehavior};
use serde::Serialize;
use std::path::Path;

const TEMPLATE_NAME: &str = "nginx.conf";
const TEMPLATE: &str = include_str!("nginx.conf.j2");

/// Renders configurations into nginx's configuration-file syntax.
///
/// Rendering is deterministic: the same configuration and settings always produce the same bytes,
/// and servers and upstreams appear in the order given.
#[derive(Clone, Debug)]
pub struct Renderer {
    env: Environment<'static>,
}

/// Process-level values referenced by the template.
#[derive(Serialize)]
struct Globals<'a> {
    pid_file: &'a Path,
    error_log: &'a str,
    access_log: &'a str,
    worker_connections: u32,
}

// === impl Renderer ===

impl Renderer {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_filter("quote", quote);
        env.add_filter("authority", authority);
        env.add_template(TEMPLATE_NAME, TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn render(
        &self,
        config: &ReverseProxyConfig,
        settings: &Settings,
    ) -> Result<Vec<u8>, Error> {
        let globals = Globals {
            pid_file: &settings.pid_file,
            error_log: &settings.error_log,
            access_log: &settings.access_log,
            worker_connections: settings.worker_connections,
        };
        let rendered = self
            .env
            .get_template(TEMPLATE_NAME)?
            .render(context! { config => config, settings => globals })?;
        Ok(rendered.into_bytes())
    }
}

/// Single-quotes a string for use as an nginx argument.
fn quote(value: String) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// Formats a `host:port` pair, bracketing IPv6 hosts.
fn authority(host: String, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
