//! Upstream source backed by the container runtime.
//!
//! [`Upstreams::provision`] connects to the runtime, takes the first
//! snapshot synchronously and starts the watcher.  From then on
//! [`Upstreams::get_upstreams`] answers each request from memory: it
//! filters the snapshot through the label matchers and resolves the
//! survivors to dial addresses.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::matchers::{self, RequestHead};
use crate::resolver::AddressCache;
use crate::runtime::ContainerRuntime;
use crate::snapshot::SnapshotStore;
use crate::types::{Container, Upstream, LABEL_ENABLE};
use crate::watcher::Watcher;

/// Delay before re-subscribing to a failed event stream.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Options {
    pub retry_backoff: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Source of upstream candidates for a reverse proxy.
pub trait UpstreamSource: Send + Sync {
    /// Candidates for `req`, possibly none.
    fn get_upstreams(&self, req: &RequestHead<'_>) -> Result<Vec<Arc<Upstream>>, Error>;
}

/// State shared between request handling and the watcher.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) snapshot: SnapshotStore,
    pub(crate) addresses: AddressCache,
}

impl Shared {
    /// Replace the snapshot and forget addresses of containers that left it.
    pub(crate) fn update(&self, containers: Vec<Container>) {
        let live: HashSet<&str> = containers.iter().map(|c| c.id.as_str()).collect();
        self.addresses.retain(&live);
        let count = containers.len();
        let generation = self.snapshot.replace(containers);
        debug!("Snapshot {} holds {} container(s)", generation, count);
    }
}

pub struct Upstreams {
    shared: Arc<Shared>,
    token: CancellationToken,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Upstreams {
    /// Connect, load the first snapshot and start watching for changes.
    ///
    /// The watcher runs on a child of `token`: cancelling `token`,
    /// calling [`Upstreams::shutdown`] or dropping the `Upstreams` stops it.
    pub async fn provision<R: ContainerRuntime>(
        runtime: R,
        options: Options,
        token: &CancellationToken,
    ) -> Result<Self, Error> {
        let api_version = runtime.ping().await.map_err(Error::Handshake)?;
        info!("Container runtime is connected, API version {}", api_version);

        let containers = runtime
            .list_containers(LABEL_ENABLE)
            .await
            .map_err(Error::InitialList)?;
        info!("Initial listing found {} enabled container(s)", containers.len());

        let shared = Arc::new(Shared::default());
        shared.update(containers);

        let token = token.child_token();
        let watcher = Watcher::new(
            Arc::new(runtime),
            Arc::clone(&shared),
            options.retry_backoff,
            token.clone(),
        );
        let watcher = tokio::spawn(watcher.run());

        Ok(Self {
            shared,
            token,
            watcher: Mutex::new(Some(watcher)),
        })
    }

    /// Resolve the upstream candidates for `req`.
    ///
    /// Containers that cannot be resolved are logged and skipped, so this
    /// never fails; an empty list means no container serves the request.
    pub fn get_upstreams(&self, req: &RequestHead<'_>) -> Result<Vec<Arc<Upstream>>, Error> {
        let containers = self.shared.snapshot.load();
        let mut upstreams = Vec::with_capacity(1);

        for container in containers.iter() {
            if !matchers::matches(req, container) {
                continue;
            }
            match self.shared.addresses.resolve(container) {
                Ok(upstream) => upstreams.push(upstream),
                Err(e) => warn!(
                    "Unable to get upstream from container {}: {}",
                    container.short_id(),
                    e
                ),
            }
        }

        Ok(upstreams)
    }

    /// The containers currently considered for routing.
    pub fn containers(&self) -> Arc<Vec<Container>> {
        self.shared.snapshot.load()
    }

    /// Receiver bumped after every snapshot replacement.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.snapshot.subscribe()
    }

    pub fn cached_addresses(&self) -> usize {
        self.shared.addresses.len()
    }

    /// Stop the watcher and wait for it to finish.
    ///
    /// Later calls return immediately.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let watcher = self.watcher.lock().take();
        if let Some(watcher) = watcher {
            if let Err(e) = watcher.await {
                warn!("Container watcher ended abnormally: {}", e);
            }
        }
    }
}

impl UpstreamSource for Upstreams {
    fn get_upstreams(&self, req: &RequestHead<'_>) -> Result<Vec<Arc<Upstream>>, Error> {
        Upstreams::get_upstreams(self, req)
    }
}

impl Drop for Upstreams {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
