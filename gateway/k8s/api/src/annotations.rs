use crate::ObjectMeta;

/// The default prefix of annotations read by the gateway.
pub const DEFAULT_PREFIX: &str = "ingress-gateway";

/// Comma-separated hostnames served in addition to an ingress's canonical hostname.
pub const HOSTNAME_ALIASES: &str = "hostname-aliases";

pub fn key(prefix: &str, name: &str) -> String {
    format!("{prefix}/{name}")
}

/// Reads a comma-separated annotation as a list, trimming whitespace and dropping empty entries.
pub fn list(meta: &ObjectMeta, prefix: &str, name: &str) -> Vec<String> {
    let key = key(prefix, name);
    meta.annotations
        .as_ref()
        .and_then(|anns| anns.get(&key))
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}
