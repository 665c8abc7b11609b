//! OS-level control of the broker process via service candidate names.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use warden_lifecycle::ServiceStatus;

use crate::{Error, Result};

/// Interval between liveness probes while waiting for a state transition.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Liveness probe consulted while waiting for a state transition.
#[async_trait]
pub trait StatusProbe
where
    Self: Send + Sync,
{
    /// Determines the actual status of the broker process.
    async fn probe(&self) -> ServiceStatus;
}

/// OS-level service control primitive.
///
/// Implemented by [`SystemdCommands`] in production; tests substitute their
/// own recording implementations.
#[async_trait]
pub trait ServiceCommands
where
    Self: Send + Sync + 'static,
{
    /// Whether a service with this name exists on the host.
    async fn exists(&self, service: &str) -> bool;

    /// Issues the start command for the service.
    async fn start(&self, service: &str) -> Result<()>;

    /// Issues the stop command for the service.
    async fn stop(&self, service: &str) -> Result<()>;

    /// Enables the service at boot.
    async fn enable(&self, service: &str) -> Result<()>;

    /// Disables the service at boot.
    async fn disable(&self, service: &str) -> Result<()>;

    /// Sends SIGKILL to all processes matching the given name.
    async fn force_kill(&self, process_name: &str) -> Result<()>;
}

/// Service control through `systemctl`, with `pkill` for forced termination.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemdCommands;

impl SystemdCommands {
    async fn systemctl(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("systemctl")
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Io("failed to run systemctl", e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed("systemctl", output.status))
        }
    }
}

#[async_trait]
impl ServiceCommands for SystemdCommands {
    async fn exists(&self, service: &str) -> bool {
        Command::new("systemctl")
            .args(["cat", service])
            .output()
            .await
            .is_ok_and(|output| output.status.success())
    }

    async fn start(&self, service: &str) -> Result<()> {
        self.systemctl(&["start", service]).await
    }

    async fn stop(&self, service: &str) -> Result<()> {
        self.systemctl(&["stop", service]).await
    }

    async fn enable(&self, service: &str) -> Result<()> {
        self.systemctl(&["enable", service]).await
    }

    async fn disable(&self, service: &str) -> Result<()> {
        self.systemctl(&["disable", service]).await
    }

    async fn force_kill(&self, process_name: &str) -> Result<()> {
        let output = Command::new("pkill")
            .args(["-9", process_name])
            .output()
            .await
            .map_err(|e| Error::Io("failed to run pkill", e))?;

        // pkill exits 1 when no process matched, which is fine here.
        match output.status.code() {
            Some(0 | 1) => Ok(()),
            _ => Err(Error::CommandFailed("pkill", output.status)),
        }
    }
}

/// Starts, stops, and restarts the broker process, waiting for the observed
/// status to transition within a deadline.
pub struct ProcessController<C> {
    commands: C,
    poll_interval: Duration,
}

impl<C: ServiceCommands> ProcessController<C> {
    /// Creates a controller over the given OS command primitive.
    pub const fn new(commands: C) -> Self {
        Self {
            commands,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Starts the first matching candidate service and waits until the probe
    /// reports [`ServiceStatus::Running`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCandidateFound`] if no candidate exists on the
    /// host (the probe is never consulted in that case), or
    /// [`Error::ServiceStartTimeout`] if the service does not come up within
    /// `timeout`.
    pub async fn start_service<P: StatusProbe + ?Sized>(
        &self,
        probe: &P,
        candidates: &[String],
        timeout: Duration,
        enable_on_boot: bool,
    ) -> Result<()> {
        let service = self.find_candidate(candidates).await?;
        info!("starting service '{}'", service);

        self.commands.start(service).await?;

        if enable_on_boot {
            self.commands.enable(service).await?;
        }

        self.wait_for_running(probe, timeout).await
    }

    /// Stops the first matching candidate service and waits until the probe
    /// no longer reports [`ServiceStatus::Running`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCandidateFound`] if no candidate exists on the
    /// host, or [`Error::ServiceStopTimeout`] on deadline.
    pub async fn stop_service<P: StatusProbe + ?Sized>(
        &self,
        probe: &P,
        candidates: &[String],
        timeout: Duration,
        disable_on_boot: bool,
    ) -> Result<()> {
        let service = self.find_candidate(candidates).await?;
        info!("stopping service '{}'", service);

        self.commands.stop(service).await?;

        if disable_on_boot {
            self.commands.disable(service).await?;
        }

        self.wait_for_shutdown(probe, timeout).await
    }

    /// Restarts the service: stop, then start, with `timeout` applying to
    /// each phase separately.
    ///
    /// # Errors
    ///
    /// Returns any error of the stop or start phase.
    pub async fn restart_service<P: StatusProbe + ?Sized>(
        &self,
        probe: &P,
        candidates: &[String],
        timeout: Duration,
    ) -> Result<()> {
        self.stop_service(probe, candidates, timeout, false).await?;
        self.start_service(probe, candidates, timeout, false).await
    }

    /// Sends SIGKILL to any process matching the broker's process name.
    ///
    /// Cleanup for wedged processes only; never part of a normal stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill command cannot be issued.
    pub async fn kill_stalled(&self, process_name: &str) -> Result<()> {
        warn!("force-killing stalled '{}' processes", process_name);
        self.commands.force_kill(process_name).await
    }

    async fn find_candidate<'a>(&self, candidates: &'a [String]) -> Result<&'a str> {
        for candidate in candidates {
            if self.commands.exists(candidate).await {
                return Ok(candidate);
            }

            debug!("service candidate '{}' not found on host", candidate);
        }

        Err(Error::NoCandidateFound)
    }

    async fn wait_for_running<P: StatusProbe + ?Sized>(
        &self,
        probe: &P,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            if probe.probe().await == ServiceStatus::Running {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(Error::ServiceStartTimeout(timeout));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn wait_for_shutdown<P: StatusProbe + ?Sized>(
        &self,
        probe: &P,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            // The probe cannot tell a stopped broker from a crashed one;
            // after a stop command any non-running observation counts as
            // shut down.
            if probe.probe().await != ServiceStatus::Running {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(Error::ServiceStopTimeout(timeout));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    #[cfg(test)]
    fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}
