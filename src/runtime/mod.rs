use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::types::{Container, ContainerEvent};

pub mod docker;
#[cfg(test)]
pub(crate) mod mock;

pub use docker::DockerRuntime;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("unable to connect to the container runtime: {0}")]
    Connect(String),
}

/// Stream of container lifecycle events, or the error that broke the subscription.
pub type EventStream = BoxStream<'static, Result<ContainerEvent, RuntimeError>>;

#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Check connectivity and return the negotiated API version.
    async fn ping(&self) -> Result<String, RuntimeError>;

    /// List running containers carrying `label`, whatever its value.
    async fn list_containers(&self, label: &str) -> Result<Vec<Container>, RuntimeError>;

    /// Open a fresh subscription to container lifecycle events.
    fn events(&self) -> EventStream;
}

#[async_trait]
impl<T: ContainerRuntime> ContainerRuntime for Arc<T> {
    async fn ping(&self) -> Result<String, RuntimeError> {
        (**self).ping().await
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<Container>, RuntimeError> {
        (**self).list_containers(label).await
    }

    fn events(&self) -> EventStream {
        (**self).events()
    }
}
