//! Liveness probing and the in-process status cache.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::error;
use warden_lifecycle::ServiceStatus;
use warden_rabbitmq_admin::{DEFAULT_VHOST, ManagementClient};

use crate::process::StatusProbe;

/// A liveness check against the broker.
///
/// [`ManagementClient`] is the production implementation; anything able to
/// answer "is the broker responsive" can stand in.
#[async_trait]
pub trait Pinger
where
    Self: Send + Sync + 'static,
{
    /// Pings the broker, returning whether it answered successfully.
    async fn ping(&self) -> warden_rabbitmq_admin::Result<bool>;
}

#[async_trait]
impl Pinger for ManagementClient {
    async fn ping(&self) -> warden_rabbitmq_admin::Result<bool> {
        Ok(self.aliveness_test(DEFAULT_VHOST).await?.is_ok())
    }
}

/// Determines broker liveness and caches the last known status.
///
/// The probe deliberately does not distinguish *why* the broker is
/// unreachable: connection refusal, authentication failure, and timeouts all
/// fold into [`ServiceStatus::Crashed`]. Callers treat `Crashed` as the
/// single "not usable" signal.
pub struct RabbitmqStatus {
    pinger: RwLock<Arc<dyn Pinger>>,
    status: Mutex<ServiceStatus>,
}

impl RabbitmqStatus {
    /// Creates a status tracker over the given pinger.
    #[must_use]
    pub fn new(pinger: Arc<dyn Pinger>) -> Self {
        Self {
            pinger: RwLock::new(pinger),
            status: Mutex::new(ServiceStatus::Unknown),
        }
    }

    /// Replaces the pinger, e.g. after the admin client is rebuilt with new
    /// credentials.
    pub async fn set_pinger(&self, pinger: Arc<dyn Pinger>) {
        *self.pinger.write().await = pinger;
    }

    /// Returns the last cached status without probing.
    pub async fn current(&self) -> ServiceStatus {
        *self.status.lock().await
    }

    /// Overwrites the cached status.
    pub async fn set(&self, status: ServiceStatus) {
        *self.status.lock().await = status;
    }

    /// Probes the broker and updates the cache.
    ///
    /// A cached `Shutdown` is retained when the probe reports `Crashed`: a
    /// deliberately stopped broker does not answer pings and must not be
    /// reported as crashed.
    pub async fn update(&self) -> ServiceStatus {
        let actual = self.probe().await;
        let mut cached = self.status.lock().await;

        if !(*cached == ServiceStatus::Shutdown && actual == ServiceStatus::Crashed) {
            *cached = actual;
        }

        *cached
    }

    /// Whether the broker currently answers its liveness check.
    pub async fn is_running(&self) -> bool {
        self.update().await == ServiceStatus::Running
    }
}

#[async_trait]
impl StatusProbe for RabbitmqStatus {
    async fn probe(&self) -> ServiceStatus {
        let pinger = self.pinger.read().await.clone();

        match pinger.ping().await {
            Ok(true) => ServiceStatus::Running,
            Ok(false) => ServiceStatus::Crashed,
            Err(e) => {
                error!("error getting rabbitmq status: {}", e);
                ServiceStatus::Crashed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPinger(warden_rabbitmq_admin::Result<bool>);

    #[async_trait]
    impl Pinger for FixedPinger {
        async fn ping(&self) -> warden_rabbitmq_admin::Result<bool> {
            match &self.0 {
                Ok(v) => Ok(*v),
                Err(_) => Err(warden_rabbitmq_admin::Error::CommandRejected),
            }
        }
    }

    #[tokio::test]
    async fn successful_ping_is_running() {
        let status = RabbitmqStatus::new(Arc::new(FixedPinger(Ok(true))));
        assert_eq!(status.update().await, ServiceStatus::Running);
        assert!(status.is_running().await);
    }

    #[tokio::test]
    async fn api_error_folds_to_crashed_without_raising() {
        let status = RabbitmqStatus::new(Arc::new(FixedPinger(Err(
            warden_rabbitmq_admin::Error::CommandRejected,
        ))));
        assert_eq!(status.update().await, ServiceStatus::Crashed);
    }

    #[tokio::test]
    async fn connection_refusal_folds_to_crashed() {
        // A management client pointed at a port nothing listens on: the
        // probe must fold the failure into Crashed, not raise.
        let client = ManagementClient::new(warden_rabbitmq_admin::ManagementClientOptions {
            api_url: "http://127.0.0.1:1".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
        })
        .unwrap();

        let status = RabbitmqStatus::new(Arc::new(client));
        assert_eq!(status.update().await, ServiceStatus::Crashed);
    }

    #[tokio::test]
    async fn deliberate_shutdown_is_retained_over_crashed_probes() {
        let status = RabbitmqStatus::new(Arc::new(FixedPinger(Ok(false))));
        status.set(ServiceStatus::Shutdown).await;

        assert_eq!(status.update().await, ServiceStatus::Shutdown);
    }

    #[tokio::test]
    async fn pinger_can_be_replaced() {
        let status = RabbitmqStatus::new(Arc::new(FixedPinger(Ok(false))));
        assert_eq!(status.update().await, ServiceStatus::Crashed);

        status.set_pinger(Arc::new(FixedPinger(Ok(true)))).await;
        assert_eq!(status.update().await, ServiceStatus::Running);
    }
}
