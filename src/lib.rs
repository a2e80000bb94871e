//! Reverse-proxy upstreams discovered from labelled Docker containers.
//!
//! Containers opt in with the `com.caddyserver.http.enable=true` label,
//! name their port with `com.caddyserver.http.upstream.port` and may
//! restrict the requests they serve with host and path matcher labels.
//! [`Upstreams`] keeps a live snapshot of those containers and turns it
//! into dial addresses for each request.

pub mod error;
pub mod matchers;
pub mod resolver;
pub mod runtime;
pub mod snapshot;
pub mod types;
pub mod upstreams;
mod watcher;

pub use error::Error;
pub use matchers::{RequestHead, RequestMatcher};
pub use resolver::{AddressCache, ResolveError};
pub use runtime::{ContainerRuntime, DockerRuntime, RuntimeError};
pub use types::{Container, Upstream};
pub use upstreams::{Options, UpstreamSource, Upstreams};
