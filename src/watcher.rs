//! Background task keeping the snapshot in step with the runtime.
//!
//! The watcher subscribes to container lifecycle events and answers
//! every event with a full re-listing of enabled containers.  A broken
//! subscription is re-opened after a fixed backoff, forever; only the
//! cancellation token stops it.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::StreamExt;
use log::{debug, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::runtime::ContainerRuntime;
use crate::types::{short_id, LABEL_ENABLE};
use crate::upstreams::Shared;

pub(crate) struct Watcher<R> {
    runtime: Arc<R>,
    shared: Arc<Shared>,
    retry_backoff: Duration,
    token: CancellationToken,
}

impl<R: ContainerRuntime> Watcher<R> {
    pub(crate) fn new(
        runtime: Arc<R>,
        shared: Arc<Shared>,
        retry_backoff: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            runtime,
            shared,
            retry_backoff,
            token,
        }
    }

    /// Runs until the token is cancelled.
    pub(crate) async fn run(self) {
        info!("Watching container events");
        loop {
            let mut events = self.runtime.events();

            loop {
                let event = tokio::select! {
                    biased;
                    _ = self.token.cancelled() => return self.stopped(),
                    event = events.next() => event,
                };

                let event = match event {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        warn!("Unable to monitor container events: {}; will retry", e);
                        break;
                    }
                    None => {
                        warn!("Container event stream ended; will retry");
                        break;
                    }
                };
                debug!("Container {} {}", short_id(&event.id), event.action);

                let listing = tokio::select! {
                    biased;
                    _ = self.token.cancelled() => return self.stopped(),
                    listing = self.runtime.list_containers(LABEL_ENABLE) => listing,
                };
                match listing {
                    Ok(containers) => self.shared.update(containers),
                    Err(e) => warn!("Unable to get the list of containers: {}", e),
                }
            }

            tokio::select! {
                biased;
                _ = self.token.cancelled() => return self.stopped(),
                _ = sleep(self.retry_backoff) => {}
            }
        }
    }

    fn stopped(&self) {
        info!("Container watcher stopped");
    }
}
