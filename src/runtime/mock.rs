//! Scripted in-memory runtime for watcher and provider tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{ContainerRuntime, EventStream, RuntimeError};
use crate::types::{Container, ContainerEvent};

pub(crate) type EventSender = mpsc::UnboundedSender<Result<ContainerEvent, RuntimeError>>;

#[derive(Default)]
pub(crate) struct MockRuntime {
    ping_fails: bool,
    listing: Mutex<Option<Vec<Container>>>,
    subscriptions: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<ContainerEvent, RuntimeError>>>>,
    list_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
}

impl MockRuntime {
    pub(crate) fn new(containers: Vec<Container>) -> Self {
        Self {
            listing: Mutex::new(Some(containers)),
            ..Default::default()
        }
    }

    pub(crate) fn unreachable() -> Self {
        Self {
            ping_fails: true,
            ..Default::default()
        }
    }

    /// Next listings return `containers`.
    pub(crate) fn set_listing(&self, containers: Vec<Container>) {
        *self.listing.lock() = Some(containers);
    }

    /// Next listings fail until [`MockRuntime::set_listing`] is called again.
    pub(crate) fn fail_listing(&self) {
        *self.listing.lock() = None;
    }

    /// Queue a subscription for the next `events()` call and return its feed.
    ///
    /// Once the queue is empty, further subscriptions stay pending forever.
    pub(crate) fn push_subscription(&self) -> EventSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.lock().push_back(rx);
        tx
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self) -> Result<String, RuntimeError> {
        if self.ping_fails {
            return Err(RuntimeError::Connect("mock runtime is unreachable".to_string()));
        }
        Ok("1.45".to_string())
    }

    async fn list_containers(&self, _label: &str) -> Result<Vec<Container>, RuntimeError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.listing
            .lock()
            .clone()
            .ok_or_else(|| RuntimeError::Connect("listing failed".to_string()))
    }

    fn events(&self) -> EventStream {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        match self.subscriptions.lock().pop_front() {
            Some(mut rx) => stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed(),
            None => stream::pending().boxed(),
        }
    }
}

/// Build a container attached to a single `bridge` network at `ip`.
pub(crate) fn container(id: &str, labels: &[(&str, &str)], ip: &str) -> Container {
    Container {
        id: id.to_string(),
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        networks: vec![crate::types::NetworkAttachment {
            name: "bridge".to_string(),
            ip_address: ip.to_string(),
            global_ipv6_address: String::new(),
        }],
    }
}
