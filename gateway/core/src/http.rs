use serde::Serialize;

/// The path used by a [`Location`] when none is declared.
pub const DEFAULT_PATH: &str = "/";

/// An HTTP virtual host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HttpServer {
    /// The canonical hostname. Servers without a name only match by port (i.e. as a default).
    pub name: Option<String>,

    /// Additional hostnames served by the same virtual host.
    pub alt_names: Vec<String>,

    pub listen_port: u16,

    /// Whether this server handles requests that match no other server on the same port.
    pub default_server: bool,

    pub body: ServerBody,
}

/// A server either routes by path or answers every request with a fixed response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerBody {
    Locations { locations: Vec<Location> },
    Static(StaticResponse),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Location {
    pub path: String,
    pub action: LocationAction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationAction {
    Static(StaticResponse),

    /// Forward to the named HTTP upstream.
    Proxy { upstream: String },

    /// The proxy's own status page, only reachable from loopback.
    Status,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StaticResponse {
    pub code: u16,
    pub message: Option<String>,
}

// === impl HttpServer ===

impl HttpServer {
    pub fn new(name: Option<String>, listen_port: u16) -> Self {
        Self {
            name,
            alt_names: Vec::new(),
            listen_port,
            default_server: false,
            body: ServerBody::Locations {
                locations: Vec::new(),
            },
        }
    }

    /// Returns a nameless default server answering everything on `listen_port` with `response`.
    pub fn catch_all(listen_port: u16, response: StaticResponse) -> Self {
        Self {
            name: None,
            alt_names: Vec::new(),
            listen_port,
            default_server: true,
            body: ServerBody::Static(response),
        }
    }

    pub fn with_alt_names(mut self, alt_names: impl IntoIterator<Item = String>) -> Self {
        self.alt_names = alt_names.into_iter().collect();
        self
    }

    pub fn with_locations(mut self, locations: impl IntoIterator<Item = Location>) -> Self {
        self.body = ServerBody::Locations {
            locations: locations.into_iter().collect(),
        };
        self
    }

    /// Returns the server's locations; empty for static servers.
    pub fn locations(&self) -> &[Location] {
        match &self.body {
            ServerBody::Locations { locations } => locations,
            ServerBody::Static(_) => &[],
        }
    }

    /// Every hostname this server answers to, canonical name first.
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.name
            .iter()
            .chain(self.alt_names.iter())
            .map(String::as_str)
    }
}

// === impl Location ===

impl Location {
    /// Builds a location, substituting `/` for a missing or empty path.
    pub fn new(path: Option<&str>, action: LocationAction) -> Self {
        let path = match path {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => DEFAULT_PATH.to_string(),
        };
        Self { path, action }
    }

    pub fn proxy(path: Option<&str>, upstream: impl Into<String>) -> Self {
        Self::new(
            path,
            LocationAction::Proxy {
                upstream: upstream.into(),
            },
        )
    }

    pub fn respond(path: Option<&str>, response: StaticResponse) -> Self {
        Self::new(path, LocationAction::Static(response))
    }

    pub fn upstream(&self) -> Option<&str> {
        match &self.action {
            LocationAction::Proxy { upstream } => Some(upstream),
            _ => None,
        }
    }
}

// === impl StaticResponse ===

impl StaticResponse {
    pub const SERVICE_UNAVAILABLE: u16 = 503;

    pub fn new(code: u16) -> Self {
        Self {
            code,
            message: None,
        }
    }

    pub fn with_message(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// The response served for a route whose backends have no live endpoints.
    pub fn unavailable() -> Self {
        Self::new(Self::SERVICE_UNAVAILABLE)
    }
}
