use serde::Serialize;

/// A named pool of backends.
///
/// A pool may be empty. Empty pools are kept in the model so that the absence of backends is
/// explicit, but they are never rendered and must not be the target of a proxying location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Upstream {
    pub name: String,
    pub servers: Vec<UpstreamServer>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UpstreamServer {
    /// Identifies the backend (e.g. a pod name) in generated comments.
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl Upstream {
    pub fn new(name: impl Into<String>, servers: Vec<UpstreamServer>) -> Self {
        Self {
            name: name.into(),
            servers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
