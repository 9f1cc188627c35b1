use serde::Serialize;

/// A raw TCP listener passing connections through to a single upstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TcpServer {
    pub listen_port: u16,
    pub upstream: String,
}
