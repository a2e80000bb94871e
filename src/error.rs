use thiserror::Error;

use crate::runtime::RuntimeError;

/// Failures that abort provisioning.
///
/// Everything that can go wrong once the watcher is running is logged and
/// absorbed instead; requests only ever see fewer upstreams.
#[derive(Debug, Error)]
pub enum Error {
    #[error("container runtime handshake failed: {0}")]
    Handshake(#[source] RuntimeError),
    #[error("initial container listing failed: {0}")]
    InitialList(#[source] RuntimeError),
}
