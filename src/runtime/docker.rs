use super::{ContainerRuntime, EventStream, RuntimeError};
use crate::types::{Container, ContainerEvent, NetworkAttachment};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, EventMessage};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use log::{debug, info};
use std::collections::HashMap;

/// Lifecycle actions that can change the set of routable containers.
const LIFECYCLE_EVENTS: &[&str] = &["create", "start", "restart", "stop", "die", "destroy"];

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the Docker daemon and negotiate the API version.
    ///
    /// `docker_host` accepts `unix:///path/to/socket`, `tcp://host:port` or
    /// `http://host:port`; when absent the local defaults are used (the unix
    /// socket on Linux, `DOCKER_HOST` if set).
    pub async fn connect(
        docker_host: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, RuntimeError> {
        let docker = match docker_host {
            Some(host) if host.starts_with("unix://") => Docker::connect_with_socket(
                host.trim_start_matches("unix://"),
                timeout_secs,
                bollard::API_DEFAULT_VERSION,
            )?,
            Some(host) if host.starts_with("tcp://") || host.starts_with("http://") => {
                Docker::connect_with_http(host, timeout_secs, bollard::API_DEFAULT_VERSION)?
            }
            Some(host) => {
                return Err(RuntimeError::Connect(format!(
                    "invalid docker host '{}', expected unix:// or tcp://",
                    host
                )))
            }
            None => Docker::connect_with_local_defaults()?,
        };
        let docker = docker.negotiate_version().await?;
        debug!("Docker client created");
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<String, RuntimeError> {
        self.docker.ping().await?;
        let version = self.docker.version().await?;
        let api_version = version.api_version.unwrap_or_default();
        info!("Docker engine is connected, API version {}", api_version);
        Ok(api_version)
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<Container>, RuntimeError> {
        let opts = ListContainersOptions::<String> {
            all: false,
            filters: HashMap::from([("label".to_string(), vec![label.to_string()])]),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;
        Ok(containers.into_iter().filter_map(to_container).collect())
    }

    fn events(&self) -> EventStream {
        let opts = EventsOptions::<String> {
            filters: [
                ("type", ["container"].as_slice()),
                ("event", LIFECYCLE_EVENTS),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect(),
            ..Default::default()
        };

        self.docker
            .events(Some(opts))
            .map(|msg| msg.map(to_event).map_err(RuntimeError::from))
            .boxed()
    }
}

fn to_container(summary: ContainerSummary) -> Option<Container> {
    let id = summary.id?;
    let mut networks: Vec<NetworkAttachment> = summary
        .network_settings
        .and_then(|s| s.networks)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, endpoint)| NetworkAttachment {
            name,
            ip_address: endpoint.ip_address.unwrap_or_default(),
            global_ipv6_address: endpoint.global_ipv6_address.unwrap_or_default(),
        })
        .collect();
    networks.sort_by(|a, b| a.name.cmp(&b.name));

    Some(Container {
        id,
        labels: summary.labels.unwrap_or_default(),
        networks,
    })
}

fn to_event(msg: EventMessage) -> ContainerEvent {
    ContainerEvent {
        id: msg.actor.and_then(|a| a.id).unwrap_or_default(),
        action: msg.action.unwrap_or_default(),
    }
}
