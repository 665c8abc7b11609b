use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;
use warden_lifecycle::ServiceStatus;

/// Result type for rabbitmq guest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the rabbitmq lifecycle and configuration core.
#[derive(Debug, Error)]
pub enum Error {
    /// A management API call failed.
    #[error(transparent)]
    Admin(#[from] warden_rabbitmq_admin::Error),

    /// An OS command exited with a non-zero status.
    #[error("{0} exited with non-zero status: {1}")]
    CommandFailed(&'static str, ExitStatus),

    /// The base configuration file is missing or corrupt after provisioning.
    #[error("base configuration is missing or unreadable")]
    ConfigUnreadable,

    /// A lifecycle operation was attempted from an incompatible state.
    #[error("operation not allowed while service status is {0}")]
    InvalidState(ServiceStatus),

    /// A file system operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, std::io::Error),

    /// None of the candidate services exist on this host.
    #[error("no candidate service found on this host")]
    NoCandidateFound,

    /// The configuration could not be written with the required ownership.
    #[error("cannot write configuration with required ownership")]
    PermissionDenied,

    /// The service did not reach the running state within the deadline.
    #[error("service did not reach running state within {0:?}")]
    ServiceStartTimeout(Duration),

    /// The service did not shut down within the deadline.
    #[error("service did not shut down within {0:?}")]
    ServiceStopTimeout(Duration),
}
