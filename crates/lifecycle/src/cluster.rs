use async_trait::async_trait;

use crate::{Error, Result};

/// Capability interface for datastore types that can form clusters.
///
/// Service types without clustering support expose [`ClusterUnsupported`] so
/// callers get an explicit error instead of a silent no-op.
#[async_trait]
pub trait Clustering
where
    Self: Send + Sync,
{
    /// Whether clustering is enabled on this instance.
    fn is_cluster_enabled(&self) -> Result<bool>;

    /// Enable clustering on this instance.
    async fn enable_cluster(&self) -> Result<()>;

    /// Assign data slots to this instance.
    async fn add_slots(&self, slots: &[u32]) -> Result<()>;

    /// Remove the given nodes from the cluster.
    async fn remove_node(&self, node_ids: &[String]) -> Result<()>;
}

/// The "not supported" clustering variant for single-node service types.
pub struct ClusterUnsupported {
    service_type: &'static str,
}

impl ClusterUnsupported {
    /// Creates the unsupported variant for the named service type.
    #[must_use]
    pub const fn new(service_type: &'static str) -> Self {
        Self { service_type }
    }
}

#[async_trait]
impl Clustering for ClusterUnsupported {
    fn is_cluster_enabled(&self) -> Result<bool> {
        Ok(false)
    }

    async fn enable_cluster(&self) -> Result<()> {
        Err(Error::ClusterNotSupported(self.service_type))
    }

    async fn add_slots(&self, _slots: &[u32]) -> Result<()> {
        Err(Error::ClusterNotSupported(self.service_type))
    }

    async fn remove_node(&self, _node_ids: &[String]) -> Result<()> {
        Err(Error::ClusterNotSupported(self.service_type))
    }
}
