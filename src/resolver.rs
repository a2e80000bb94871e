//! Container → dial address resolution.
//!
//! Resolved upstreams are memoised by container id.  The cache is pruned
//! to the ids of the current snapshot every time the snapshot is
//! replaced, so it never outgrows the set of live containers.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use thiserror::Error;

use crate::types::{Container, NetworkAttachment, Upstream, LABEL_UPSTREAM_PORT};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no configured port: upstream port label is missing")]
    MissingPort,
    #[error("invalid upstream port {0:?}")]
    InvalidPort(String),
    #[error("no usable network address")]
    NoAddress,
}

#[derive(Debug, Default)]
pub struct AddressCache {
    entries: RwLock<HashMap<String, Arc<Upstream>>>,
}

impl AddressCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `container` to its upstream, reusing a previous resolution.
    ///
    /// Failures are not cached; the next call for the same container tries again.
    pub fn resolve(&self, container: &Container) -> Result<Arc<Upstream>, ResolveError> {
        if let Some(cached) = self.entries.read().get(&container.id) {
            return Ok(Arc::clone(cached));
        }

        let upstream = Arc::new(resolve(container)?);

        let mut entries = self.entries.write();
        // Another request may have resolved it while we were unlocked.
        let entry = entries
            .entry(container.id.clone())
            .or_insert_with(|| {
                debug!("Resolved container {} to {}", container.short_id(), upstream);
                upstream
            });
        Ok(Arc::clone(entry))
    }

    /// Drop every entry whose container id is not in `live`.
    pub fn retain(&self, live: &HashSet<&str>) {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|id, _| live.contains(id.as_str()));
        let pruned = before - entries.len();
        if pruned > 0 {
            debug!("Pruned {} cached upstream(s)", pruned);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }
}

/// Combine the container's upstream port with its first usable network address.
pub fn resolve(container: &Container) -> Result<Upstream, ResolveError> {
    let port = container
        .label(LABEL_UPSTREAM_PORT)
        .ok_or(ResolveError::MissingPort)?;
    let port = match port.trim().parse::<u16>() {
        Ok(0) | Err(_) => return Err(ResolveError::InvalidPort(port.to_string())),
        Ok(port) => port,
    };

    container
        .networks
        .iter()
        .find_map(network_ip)
        .map(|ip| Upstream {
            dial: SocketAddr::new(ip, port),
        })
        .ok_or(ResolveError::NoAddress)
}

fn network_ip(network: &NetworkAttachment) -> Option<IpAddr> {
    [&network.ip_address, &network.global_ipv6_address]
        .into_iter()
        .filter(|ip| !ip.is_empty())
        .find_map(|ip| ip.parse().ok())
}
