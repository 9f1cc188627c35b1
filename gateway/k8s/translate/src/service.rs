use crate::rule::ServicePortRef;
use ingress_gateway_core::UpstreamServer;
use ingress_gateway_k8s_api::{EndpointPort, Endpoints, IntOrString, Service, ServicePort};
use std::fmt;
use tracing::{debug, warn};

const TCP: &str = "TCP";

/// The port on a service's pods that a service port forwards to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TargetPort {
    Number(u16),
    Named(String),
}

/// A service port matched against a backend reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPort {
    /// The service port's name. Endpoint ports carry the same name.
    pub name: Option<String>,
    pub target: TargetPort,
}

/// Finds the TCP service port referenced by `port` and the target port it forwards to.
///
/// Ports with another protocol are skipped.
pub fn resolve_target_port(svc: &Service, port: &ServicePortRef) -> Option<ResolvedPort> {
    let ports = svc.spec.as_ref().and_then(|s| s.ports.as_ref())?;
    ports
        .iter()
        .filter(|sp| {
            let tcp = is_tcp(sp.protocol.as_deref());
            if !tcp {
                debug!(port = sp.port, protocol = ?sp.protocol, "Skipping non-TCP service port");
            }
            tcp
        })
        .find(|sp| match port {
            ServicePortRef::Number(n) => sp.port == *n,
            ServicePortRef::Name(n) => sp.name.as_deref() == Some(n.as_str()),
        })
        .and_then(|sp| {
            let target = target_port(sp)?;
            Some(ResolvedPort {
                name: sp.name.clone(),
                target,
            })
        })
}

fn target_port(sp: &ServicePort) -> Option<TargetPort> {
    let number = |n: i32| match u16::try_from(n) {
        Ok(n) if n > 0 => Some(TargetPort::Number(n)),
        _ => {
            warn!(port = n, "Ignoring invalid target port");
            None
        }
    };
    match &sp.target_port {
        None => number(sp.port),
        Some(IntOrString::Int(n)) => number(*n),
        Some(IntOrString::String(s)) => match s.parse::<i32>() {
            Ok(n) => number(n),
            Err(_) => Some(TargetPort::Named(s.clone())),
        },
    }
}

/// Collects the ready addresses of every endpoint subset exposing `port`.
///
/// The API does not order addresses consistently across reads, so servers are sorted to keep the
/// rendered configuration stable.
pub fn endpoint_servers(endpoints: &Endpoints, port: &ResolvedPort) -> Vec<UpstreamServer> {
    let mut servers = Vec::new();
    for subset in endpoints.subsets.iter().flatten() {
        let Some(ep_port) = subset
            .ports
            .iter()
            .flatten()
            .find(|ep| port.matches(ep))
        else {
            debug!(
                ports = ?subset.ports,
                target = %port.target,
                "Ignoring endpoint subset"
            );
            continue;
        };
        let Ok(ep_port_num) = u16::try_from(ep_port.port) else {
            warn!(port = ep_port.port, "Ignoring endpoint subset with invalid port");
            continue;
        };

        for addr in subset.addresses.iter().flatten() {
            let name = addr
                .target_ref
                .as_ref()
                .and_then(|r| r.name.clone())
                .or_else(|| addr.hostname.clone())
                .unwrap_or_else(|| addr.ip.clone());
            debug!(%name, host = %addr.ip, port = ep_port_num, "Adding upstream server");
            servers.push(UpstreamServer {
                name,
                host: addr.ip.clone(),
                port: ep_port_num,
            });
        }
    }
    servers.sort_by(|a, b| (&a.host, a.port, &a.name).cmp(&(&b.host, b.port, &b.name)));
    servers.dedup();
    servers
}

fn is_tcp(protocol: Option<&str>) -> bool {
    protocol.unwrap_or(TCP) == TCP
}

// === impl ResolvedPort ===

impl ResolvedPort {
    fn matches(&self, ep: &EndpointPort) -> bool {
        if !is_tcp(ep.protocol.as_deref()) {
            return false;
        }
        match &self.target {
            TargetPort::Number(n) => ep.port == i32::from(*n),
            // Named target ports resolve per pod, so endpoints are matched by the service port's
            // name instead.
            TargetPort::Named(_) => ep.name.is_some() && ep.name == self.name,
        }
    }
}

impl fmt::Display for TargetPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => n.fmt(f),
            Self::Named(n) => n.fmt(f),
        }
    }
}
