use crate::{HttpServer, Location, LocationAction, StaticResponse};

pub const HEALTH_PATH: &str = "/health";
pub const STATUS_PATH: &str = "/status";

/// Closes the connection without a response (nginx-specific).
const NO_RESPONSE: u16 = 444;

/// Ports served by the unconditional servers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ListenPorts {
    /// Port on which routed HTTP traffic is accepted.
    pub http: u16,

    /// Port on which the proxy answers its own health checks.
    pub health: u16,
}

/// Servers that are present regardless of cluster state, so that the proxy can always answer
/// health checks and reject requests for unknown hosts.
pub fn default_http_servers(ports: &ListenPorts) -> Vec<HttpServer> {
    let health = HttpServer::new(None, ports.health).with_locations([
        Location::respond(
            Some(HEALTH_PATH),
            StaticResponse::with_message(200, "Healthy!"),
        ),
        Location::new(Some(STATUS_PATH), LocationAction::Status),
    ]);
    let catch_all = HttpServer::catch_all(ports.http, StaticResponse::new(NO_RESPONSE));
    vec![health, catch_all]
}
