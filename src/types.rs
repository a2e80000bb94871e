//! Data structures shared by the discovery and resolution layers.
//!
//! A [`Container`] is the projection of the runtime's container summary
//! that routing cares about: its identity, its labels and the addresses
//! it was given on each attached network.  Everything else the runtime
//! reports is dropped at the boundary.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

/// Master opt-in flag; must equal [`ENABLE_VALUE`] for a container to be routable.
pub const LABEL_ENABLE: &str = "com.caddyserver.http.enable";
/// Host pattern(s) the request's host must match.
pub const LABEL_MATCH_HOST: &str = "com.caddyserver.http.matchers.host";
/// Path pattern(s) the request's path must match.
pub const LABEL_MATCH_PATH: &str = "com.caddyserver.http.matchers.path";
/// Port the container listens on.
pub const LABEL_UPSTREAM_PORT: &str = "com.caddyserver.http.upstream.port";

pub const ENABLE_VALUE: &str = "true";

/// A running container as seen by the discovery layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Runtime-assigned id, unique for the lifetime of this container.
    pub id: String,
    pub labels: HashMap<String, String>,
    /// Network attachments, sorted by network name.
    pub networks: Vec<NetworkAttachment>,
}

impl Container {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// The 12-character id used in log lines, as `docker ps` prints it.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// One network a container is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub name: String,
    /// IPv4 address on this network; empty when the runtime has not assigned one.
    pub ip_address: String,
    pub global_ipv6_address: String,
}

/// A container lifecycle notification.
///
/// The watcher treats every event as a trigger for a full re-list, so
/// only enough is kept to make the log line useful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    pub id: String,
    pub action: String,
}

/// A resolved dial target for the reverse proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Upstream {
    pub dial: SocketAddr,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.dial.fmt(f)
    }
}

pub(crate) fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
