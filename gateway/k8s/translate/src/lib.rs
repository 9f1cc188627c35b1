//! Translates the cluster's ingress state into a [`ReverseProxyConfig`].
//!
//! Each `Ingress` becomes one HTTP virtual host named `<name>.<namespace>.<zone>`. Every path on
//! the ingress is resolved through its backend `Service` to the ready endpoints behind the
//! service's target port:
//!
//! ```text
//! [ Ingress ] -> [ path ] -> [ Service port ] -> [ target port ] -> [ Endpoints ]
//! ```
//!
//! A path whose service has no ready endpoints answers 503 rather than forwarding to an empty
//! pool. A failure to resolve one ingress is reported and that ingress is left out; the remaining
//! ingresses are still translated.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod rule;
pub mod service;

pub use self::rule::{PathRule, RoutingRule, ServicePortRef, ServiceRef};
use self::service::{ResolvedPort, TargetPort};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use anyhow::{Context, Result};
use ingress_gateway_core::{
    HttpServer, Location, ReverseProxyConfig, StaticResponse, Upstream, UpstreamServer,
};
use ingress_gateway_k8s_api::{Ingress, ResourceExt, RoutingSource};
use tracing::{debug, info, warn};

/// Joins the parts of an upstream name.
const UPSTREAM_DELIMITER: &str = "__";

#[derive(Clone, Debug)]
pub struct TranslatorConfig {
    /// DNS zone under which canonical hostnames are created, e.g. `example.com`.
    pub cluster_zone: String,

    /// Port on which routed virtual hosts listen.
    pub listen_port: u16,

    pub annotation_prefix: String,
}

#[derive(Clone, Debug)]
pub struct Translator {
    config: TranslatorConfig,
}

/// The result of translating one snapshot of cluster state.
#[derive(Debug, Default)]
pub struct Translation {
    pub config: ReverseProxyConfig,

    /// Ingresses that could not be translated and are absent from `config`.
    pub errors: Vec<RuleError>,
}

#[derive(Debug, thiserror::Error)]
#[error("ingress {namespace}/{name}: {source}")]
pub struct RuleError {
    pub namespace: String,
    pub name: String,
    #[source]
    pub source: ResolveError,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("missing {0}")]
    MissingMetadata(&'static str),

    #[error("hostname alias {0:?} is not a valid DNS name")]
    InvalidAlias(String),

    #[error("path {0:?} contains characters that cannot be served")]
    InvalidPath(String),

    #[error("path {path} does not reference a service")]
    UnsupportedBackend { path: String },

    #[error("backend service {service} does not specify a port")]
    MissingPort { service: String },

    #[error("service {service} not found")]
    ServiceNotFound { service: String },

    #[error("service {service} has no TCP port matching {port}")]
    NoMatchingPort {
        service: String,
        port: ServicePortRef,
    },

    #[error("failed to look up {kind} {service}: {source}")]
    Lookup {
        kind: &'static str,
        service: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

/// A route's backend after service and endpoint resolution.
struct Backend {
    port: ResolvedPort,
    servers: Vec<UpstreamServer>,
}

/// The translated form of a single ingress.
struct RuleOutput {
    server: HttpServer,
    upstreams: Vec<Upstream>,
}

// === impl Translator ===

impl Translator {
    pub fn new(config: TranslatorConfig) -> Self {
        Self { config }
    }

    pub fn canonical_hostname(&self, name: &str, namespace: &str) -> String {
        let zone = self.config.cluster_zone.trim_matches('.');
        format!("{name}.{namespace}.{zone}")
    }

    pub async fn translate<S>(&self, source: &S) -> Result<Translation>
    where
        S: RoutingSource + Sync + ?Sized,
    {
        let mut ingresses = source
            .ingresses()
            .await
            .context("failed to list ingresses")?;
        ingresses.sort_by_cached_key(|ing| (ing.namespace(), ing.metadata.name.clone()));

        let mut translation = Translation::default();
        for ingress in &ingresses {
            match self.translate_ingress(source, ingress).await {
                Ok(RuleOutput { server, upstreams }) => {
                    translation.config.http_servers.push(server);
                    translation.config.http_upstreams.extend(upstreams);
                }
                Err(source) => {
                    let error = RuleError {
                        namespace: ingress.namespace().unwrap_or_default(),
                        name: ingress.metadata.name.clone().unwrap_or_default(),
                        source,
                    };
                    warn!(%error, "Skipping ingress");
                    translation.errors.push(error);
                }
            }
        }

        debug!(
            servers = translation.config.http_servers.len(),
            upstreams = translation.config.http_upstreams.len(),
            skipped = translation.errors.len(),
            "Translated ingresses"
        );
        Ok(translation)
    }

    async fn translate_ingress<S>(
        &self,
        source: &S,
        ingress: &Ingress,
    ) -> Result<RuleOutput, ResolveError>
    where
        S: RoutingSource + Sync + ?Sized,
    {
        let rule = RoutingRule::from_ingress(ingress, &self.config.annotation_prefix)?;
        let hostname = self.canonical_hostname(&rule.name, &rule.namespace);

        let mut alt_names = Vec::with_capacity(rule.aliases.len());
        for alias in &rule.aliases {
            if *alias != hostname && !alt_names.contains(alias) {
                alt_names.push(alias.clone());
            }
        }
        info!(%hostname, ?alt_names, listen_port = self.config.listen_port, "Generating server");

        let mut backends = HashMap::<&ServiceRef, Backend>::new();
        let mut upstream_names = HashMap::<(String, TargetPort), String>::new();
        let mut upstreams = Vec::<Upstream>::new();
        let mut seen_paths = HashSet::<&str>::new();
        let mut locations = Vec::with_capacity(rule.paths.len());

        for PathRule { path, backend } in &rule.paths {
            let path = path.as_deref().unwrap_or("/");
            if !seen_paths.insert(path) {
                warn!(%hostname, %path, "Ignoring duplicate path");
                continue;
            }

            if !backends.contains_key(backend) {
                let resolved = self.resolve(source, &rule.namespace, backend).await?;
                backends.insert(backend, resolved);
            }
            let Backend { port, servers } = &backends[backend];

            if servers.is_empty() {
                info!(
                    namespace = %rule.namespace,
                    service = %backend.name,
                    target_port = %port.target,
                    %path,
                    "No endpoints found; serving 503"
                );
                locations.push(Location::respond(Some(path), StaticResponse::unavailable()));
                continue;
            }

            let key = (backend.name.clone(), port.target.clone());
            let name = match upstream_names.get(&key) {
                Some(name) => name.clone(),
                None => {
                    let mut name = [&*rule.namespace, &*rule.name, &*backend.name]
                        .join(UPSTREAM_DELIMITER);
                    if upstreams.iter().any(|up| up.name == name) {
                        name = format!("{name}{UPSTREAM_DELIMITER}{}", port.target);
                    }
                    upstreams.push(Upstream::new(name.clone(), servers.clone()));
                    upstream_names.insert(key, name.clone());
                    name
                }
            };
            locations.push(Location::proxy(Some(path), name));
        }

        let server = HttpServer::new(Some(hostname), self.config.listen_port)
            .with_alt_names(alt_names)
            .with_locations(locations);
        Ok(RuleOutput { server, upstreams })
    }

    async fn resolve<S>(
        &self,
        source: &S,
        namespace: &str,
        backend: &ServiceRef,
    ) -> Result<Backend, ResolveError>
    where
        S: RoutingSource + Sync + ?Sized,
    {
        let lookup = |kind: &'static str| {
            let service = backend.name.clone();
            move |error: anyhow::Error| ResolveError::Lookup {
                kind,
                service,
                source: error.into(),
            }
        };

        let svc = source
            .service(namespace, &backend.name)
            .await
            .map_err(lookup("service"))?
            .ok_or_else(|| ResolveError::ServiceNotFound {
                service: backend.name.clone(),
            })?;

        let port = service::resolve_target_port(&svc, &backend.port).ok_or_else(|| {
            ResolveError::NoMatchingPort {
                service: backend.name.clone(),
                port: backend.port.clone(),
            }
        })?;

        let servers = match source
            .endpoints(namespace, &backend.name)
            .await
            .map_err(lookup("endpoints"))?
        {
            Some(eps) => service::endpoint_servers(&eps, &port),
            None => {
                debug!(%namespace, service = %backend.name, "No endpoints object");
                Vec::new()
            }
        };

        Ok(Backend { port, servers })
    }
}
