use crate::ResolveError;
use ingress_gateway_k8s_api::{
    annotations, Ingress, IngressBackend, ResourceExt, ServiceBackendPort,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// A DNS-1123 subdomain, optionally with a leading `*.` wildcard label.
const HOSTNAME_REGEX: &str =
    r"^(\*\.)?[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$";

const MAX_HOSTNAME_LEN: usize = 253;

/// Characters that end or open an nginx token or block.
const PATH_RESERVED: &[char] = &[';', '{', '}', '\'', '"', '#'];

static HOSTNAME: Lazy<Regex> = Lazy::new(|| Regex::new(HOSTNAME_REGEX).expect("should compile"));

/// An ingress reduced to the parts that drive routing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingRule {
    pub namespace: String,
    pub name: String,

    /// Hostnames to serve in addition to the canonical hostname.
    pub aliases: Vec<String>,

    pub paths: Vec<PathRule>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathRule {
    pub path: Option<String>,
    pub backend: ServiceRef,
}

/// A reference to a port on a service in the rule's namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceRef {
    pub name: String,
    pub port: ServicePortRef,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ServicePortRef {
    Number(i32),
    Name(String),
}

// === impl RoutingRule ===

impl RoutingRule {
    pub fn from_ingress(ingress: &Ingress, annotation_prefix: &str) -> Result<Self, ResolveError> {
        let namespace = ingress
            .namespace()
            .ok_or(ResolveError::MissingMetadata("namespace"))?;
        let name = ingress
            .metadata
            .name
            .clone()
            .ok_or(ResolveError::MissingMetadata("name"))?;
        let aliases = annotations::list(
            &ingress.metadata,
            annotation_prefix,
            annotations::HOSTNAME_ALIASES,
        );
        if let Some(alias) = aliases.iter().find(|a| !is_valid_hostname(a)) {
            return Err(ResolveError::InvalidAlias(alias.clone()));
        }

        let spec = ingress.spec.as_ref();
        let mut paths = Vec::new();
        for http in spec
            .and_then(|s| s.rules.as_ref())
            .into_iter()
            .flatten()
            .filter_map(|rule| rule.http.as_ref())
        {
            for p in &http.paths {
                if let Some(path) = p.path.as_deref().filter(|p| !is_valid_path(p)) {
                    return Err(ResolveError::InvalidPath(path.to_string()));
                }
                paths.push(PathRule {
                    path: p.path.clone().filter(|p| !p.is_empty()),
                    backend: ServiceRef::from_backend(&p.backend, p.path.as_deref())?,
                });
            }
        }

        // The default backend handles whatever the explicit paths leave unmatched, so it is
        // only mounted at the root if no explicit path already claims it.
        if let Some(backend) = spec.and_then(|s| s.default_backend.as_ref()) {
            let root_claimed = paths
                .iter()
                .any(|p| p.path.as_deref().unwrap_or("/") == "/");
            if !root_claimed {
                paths.push(PathRule {
                    path: Some("/".to_string()),
                    backend: ServiceRef::from_backend(backend, None)?,
                });
            }
        }

        Ok(Self {
            namespace,
            name,
            aliases,
            paths,
        })
    }
}

fn is_valid_hostname(name: &str) -> bool {
    name.len() <= MAX_HOSTNAME_LEN && HOSTNAME.is_match(name)
}

/// Paths are written into `location` blocks unquoted.
fn is_valid_path(path: &str) -> bool {
    !path
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || PATH_RESERVED.contains(&c))
}

// === impl ServiceRef ===

impl ServiceRef {
    fn from_backend(backend: &IngressBackend, path: Option<&str>) -> Result<Self, ResolveError> {
        let path = path.unwrap_or("/").to_string();
        let svc = backend
            .service
            .as_ref()
            .ok_or_else(|| ResolveError::UnsupportedBackend { path })?;
        let port = svc
            .port
            .as_ref()
            .and_then(ServicePortRef::from_backend_port)
            .ok_or_else(|| ResolveError::MissingPort {
                service: svc.name.clone(),
            })?;
        Ok(Self {
            name: svc.name.clone(),
            port,
        })
    }
}

// === impl ServicePortRef ===

impl ServicePortRef {
    fn from_backend_port(port: &ServiceBackendPort) -> Option<Self> {
        if let Some(n) = port.number {
            return Some(Self::Number(n));
        }
        port.name
            .clone()
            .filter(|n| !n.is_empty())
            .map(Self::Name)
    }
}

impl fmt::Display for ServicePortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => n.fmt(f),
            Self::Name(n) => n.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_gateway_k8s_api::{
        HTTPIngressPath, HTTPIngressRuleValue, IngressRule, IngressServiceBackend, IngressSpec,
        ObjectMeta,
    };
    use maplit::btreemap;

    fn backend(svc: &str, port: i32) -> IngressBackend {
        IngressBackend {
            service: Some(IngressServiceBackend {
                name: svc.to_string(),
                port: Some(ServiceBackendPort {
                    number: Some(port),
                    name: None,
                }),
            }),
            resource: None,
        }
    }

    fn ingress(spec: IngressSpec) -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                namespace: Some("ns1".to_string()),
                name: Some("web".to_string()),
                annotations: Some(btreemap! {
                    "ingress-gateway/hostname-aliases".to_string() => "www.example.com".to_string(),
                }),
                ..Default::default()
            },
            spec: Some(spec),
            status: None,
        }
    }

    fn http_rule(paths: Vec<(Option<&str>, IngressBackend)>) -> IngressRule {
        IngressRule {
            host: None,
            http: Some(HTTPIngressRuleValue {
                paths: paths
                    .into_iter()
                    .map(|(path, backend)| HTTPIngressPath {
                        path: path.map(ToString::to_string),
                        path_type: "Prefix".to_string(),
                        backend,
                    })
                    .collect(),
            }),
        }
    }

    #[test]
    fn default_backend_becomes_root_path() {
        let ing = ingress(IngressSpec {
            default_backend: Some(backend("svc1", 8080)),
            ..Default::default()
        });
        let rule = RoutingRule::from_ingress(&ing, annotations::DEFAULT_PREFIX).unwrap();
        assert_eq!(rule.namespace, "ns1");
        assert_eq!(rule.name, "web");
        assert_eq!(rule.aliases, vec!["www.example.com"]);
        assert_eq!(
            rule.paths,
            vec![PathRule {
                path: Some("/".to_string()),
                backend: ServiceRef {
                    name: "svc1".to_string(),
                    port: ServicePortRef::Number(8080),
                },
            }]
        );
    }

    #[test]
    fn paths_across_rules_are_collected() {
        let ing = ingress(IngressSpec {
            rules: Some(vec![
                http_rule(vec![(Some("/a"), backend("a", 80))]),
                http_rule(vec![(Some("/b"), backend("b", 80)), (None, backend("c", 80))]),
                IngressRule {
                    host: Some("ignored".to_string()),
                    http: None,
                },
            ]),
            ..Default::default()
        });
        let rule = RoutingRule::from_ingress(&ing, annotations::DEFAULT_PREFIX).unwrap();
        let paths = rule.paths.iter().map(|p| p.path.as_deref()).collect::<Vec<_>>();
        assert_eq!(paths, vec![Some("/a"), Some("/b"), None]);
    }

    #[test]
    fn default_backend_does_not_shadow_explicit_root() {
        let ing = ingress(IngressSpec {
            default_backend: Some(backend("fallback", 80)),
            rules: Some(vec![http_rule(vec![(Some("/"), backend("root", 80))])]),
            ..Default::default()
        });
        let rule = RoutingRule::from_ingress(&ing, annotations::DEFAULT_PREFIX).unwrap();
        assert_eq!(rule.paths.len(), 1);
        assert_eq!(rule.paths[0].backend.name, "root");

        let ing = ingress(IngressSpec {
            default_backend: Some(backend("fallback", 80)),
            rules: Some(vec![http_rule(vec![(Some("/api"), backend("api", 80))])]),
            ..Default::default()
        });
        let rule = RoutingRule::from_ingress(&ing, annotations::DEFAULT_PREFIX).unwrap();
        assert_eq!(rule.paths.len(), 2);
        assert_eq!(rule.paths[1].backend.name, "fallback");
    }

    #[test]
    fn resource_backends_are_unsupported() {
        let ing = ingress(IngressSpec {
            rules: Some(vec![http_rule(vec![(
                Some("/static"),
                IngressBackend::default(),
            )])]),
            ..Default::default()
        });
        assert!(matches!(
            RoutingRule::from_ingress(&ing, annotations::DEFAULT_PREFIX),
            Err(ResolveError::UnsupportedBackend { path }) if path == "/static"
        ));
    }

    #[test]
    fn aliases_must_be_hostnames() {
        for alias in ["*.example.com", "a-1.example.com", "localhost"] {
            let mut ing = ingress(IngressSpec {
                default_backend: Some(backend("svc1", 80)),
                ..Default::default()
            });
            ing.metadata.annotations = Some(btreemap! {
                "ingress-gateway/hostname-aliases".to_string() => alias.to_string(),
            });
            let rule = RoutingRule::from_ingress(&ing, annotations::DEFAULT_PREFIX)
                .unwrap_or_else(|e| panic!("{alias}: {e}"));
            assert_eq!(rule.aliases, vec![alias]);
        }

        for alias in [
            "x.example.com; } server { listen 7331 default_server; return 200 'hijacked'",
            "x.example.com default_server",
            "Upper.example.com",
            "-bad.example.com",
            "a..example.com",
            "foo.*.example.com",
        ] {
            let mut ing = ingress(IngressSpec {
                default_backend: Some(backend("svc1", 80)),
                ..Default::default()
            });
            ing.metadata.annotations = Some(btreemap! {
                "ingress-gateway/hostname-aliases".to_string() => format!("ok.example.com,{alias}"),
            });
            assert!(
                matches!(
                    RoutingRule::from_ingress(&ing, annotations::DEFAULT_PREFIX),
                    Err(ResolveError::InvalidAlias(a)) if a == alias.trim()
                ),
                "{alias}"
            );
        }

        assert!(!is_valid_hostname(&format!("{}.com", "a".repeat(250))));
    }

    #[test]
    fn paths_must_not_break_out_of_location() {
        for path in [
            "/a b",
            "/a;",
            "/a { return 200; }",
            "/}",
            "/'a",
            "/\"a",
            "/#a",
            "/a\tb",
            "/a\nb",
        ] {
            let ing = ingress(IngressSpec {
                rules: Some(vec![http_rule(vec![(Some(path), backend("a", 80))])]),
                ..Default::default()
            });
            assert!(
                matches!(
                    RoutingRule::from_ingress(&ing, annotations::DEFAULT_PREFIX),
                    Err(ResolveError::InvalidPath(p)) if p == path
                ),
                "{path:?}"
            );
        }

        let ing = ingress(IngressSpec {
            rules: Some(vec![http_rule(vec![(
                Some("/api/v1/items-list_%20~x"),
                backend("a", 80),
            )])]),
            ..Default::default()
        });
        assert!(RoutingRule::from_ingress(&ing, annotations::DEFAULT_PREFIX).is_ok());
    }

    #[test]
    fn named_backend_port() {
        let mut b = backend("svc1", 0);
        b.service.as_mut().unwrap().port = Some(ServiceBackendPort {
            number: None,
            name: Some("http".to_string()),
        });
        let ing = ingress(IngressSpec {
            default_backend: Some(b),
            ..Default::default()
        });
        let rule = RoutingRule::from_ingress(&ing, annotations::DEFAULT_PREFIX).unwrap();
        assert_eq!(
            rule.paths[0].backend.port,
            ServicePortRef::Name("http".to_string())
        );
    }
}
