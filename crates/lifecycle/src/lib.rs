//! Abstract interface for guest-managed datastore services.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod cluster;
mod error;
mod registry;

pub use cluster::{ClusterUnsupported, Clustering};
pub use error::{Error, Result};
pub use registry::ServiceRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Externally observable status of a managed service process.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ServiceStatus {
    /// The service answers its liveness check.
    Running,

    /// The service was stopped deliberately.
    Shutdown,

    /// The service does not answer its liveness check.
    Crashed,

    /// A state transition is in progress.
    Building,

    /// The service has never been observed.
    Unknown,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Crashed => write!(f, "crashed"),
            Self::Building => write!(f, "building"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Trait for guest services with a managed process lifecycle.
#[async_trait]
pub trait Lifecycle
where
    Self: Send + Sync + 'static,
{
    /// Get the service type name of the managed service.
    fn name(&self) -> &str;

    /// Start the managed service.
    async fn start(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Stop the managed service.
    async fn stop(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Restart the managed service.
    async fn restart(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Get the current status of the managed service.
    async fn status(&self) -> ServiceStatus;
}
