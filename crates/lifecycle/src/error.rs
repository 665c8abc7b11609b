use thiserror::Error;

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the lifecycle registry and capability interfaces.
#[derive(Debug, Error)]
pub enum Error {
    /// Clustering was requested on a service type that does not support it.
    #[error("clustering is not supported for service type '{0}'")]
    ClusterNotSupported(&'static str),

    /// No factory is registered for the requested service type.
    #[error("unknown service type '{0}'")]
    UnknownServiceType(String),
}
