//! Reverse-proxy configuration model.
//!
//! A [`ReverseProxyConfig`] describes the desired state of the proxy independently of any
//! particular proxy's configuration syntax: a list of HTTP virtual hosts and the upstream pools
//! they forward to, plus raw TCP listeners. A new value is built from cluster state on every
//! reconciliation cycle and is never mutated after it has been handed off for rendering.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod defaults;
pub mod http;
pub mod tcp;
mod upstream;
mod validate;

pub use self::{
    defaults::{default_http_servers, ListenPorts, HEALTH_PATH, STATUS_PATH},
    http::{HttpServer, Location, LocationAction, ServerBody, StaticResponse},
    tcp::TcpServer,
    upstream::{Upstream, UpstreamServer},
    validate::InvalidConfig,
};
use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReverseProxyConfig {
    /// Virtual hosts, rendered in order.
    pub http_servers: Vec<HttpServer>,

    /// Pools referenced by [`LocationAction::Proxy`].
    pub http_upstreams: Vec<Upstream>,

    pub tcp_servers: Vec<TcpServer>,
    pub tcp_upstreams: Vec<Upstream>,
}

// === impl ReverseProxyConfig ===

impl ReverseProxyConfig {
    /// Returns a configuration holding only the servers that must always be present.
    ///
    /// This is the configuration a proxy is started with before any cluster state is known.
    pub fn baseline(ports: &ListenPorts) -> Self {
        Self::default().with_defaults(ports)
    }

    /// Appends the unconditional health and catch-all servers.
    pub fn with_defaults(mut self, ports: &ListenPorts) -> Self {
        self.http_servers.extend(default_http_servers(ports));
        self
    }

    pub fn http_upstream(&self, name: &str) -> Option<&Upstream> {
        self.http_upstreams.iter().find(|up| up.name == name)
    }

    pub fn tcp_upstream(&self, name: &str) -> Option<&Upstream> {
        self.tcp_upstreams.iter().find(|up| up.name == name)
    }

    /// Iterates over every location of every HTTP server.
    pub fn locations(&self) -> impl Iterator<Item = (&HttpServer, &Location)> {
        self.http_servers
            .iter()
            .flat_map(|srv| srv.locations().iter().map(move |loc| (srv, loc)))
    }
}
