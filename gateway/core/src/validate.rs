use crate::ReverseProxyConfig;
use std::collections::HashMap;

/// A configuration that violates the model's invariants.
///
/// Translation never produces one of these; seeing it means the configuration was assembled
/// incorrectly.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("location {path} references unknown upstream {upstream}")]
    UnknownUpstream { path: String, upstream: String },

    #[error("location {path} proxies to upstream {upstream} which has no servers")]
    EmptyUpstream { path: String, upstream: String },

    #[error("tcp listener on port {port} references unknown upstream {upstream}")]
    UnknownTcpUpstream { port: u16, upstream: String },

    #[error("tcp listener on port {port} proxies to upstream {upstream} which has no servers")]
    EmptyTcpUpstream { port: u16, upstream: String },

    #[error("port {port} has {count} default servers")]
    MultipleDefaults { port: u16, count: usize },
}

impl ReverseProxyConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        for (_, loc) in self.locations() {
            let Some(upstream) = loc.upstream() else {
                continue;
            };
            match self.http_upstream(upstream) {
                None => {
                    return Err(InvalidConfig::UnknownUpstream {
                        path: loc.path.clone(),
                        upstream: upstream.to_string(),
                    })
                }
                Some(up) if up.is_empty() => {
                    return Err(InvalidConfig::EmptyUpstream {
                        path: loc.path.clone(),
                        upstream: upstream.to_string(),
                    })
                }
                Some(_) => {}
            }
        }

        for srv in &self.tcp_servers {
            match self.tcp_upstream(&srv.upstream) {
                None => {
                    return Err(InvalidConfig::UnknownTcpUpstream {
                        port: srv.listen_port,
                        upstream: srv.upstream.clone(),
                    })
                }
                Some(up) if up.is_empty() => {
                    return Err(InvalidConfig::EmptyTcpUpstream {
                        port: srv.listen_port,
                        upstream: srv.upstream.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        let mut defaults = HashMap::<u16, usize>::new();
        for srv in self.http_servers.iter().filter(|s| s.default_server) {
            *defaults.entry(srv.listen_port).or_default() += 1;
        }
        if let Some((&port, &count)) = defaults.iter().filter(|(_, n)| **n > 1).min() {
            return Err(InvalidConfig::MultipleDefaults { port, count });
        }

        Ok(())
    }
}
