use std::collections::HashMap;
use std::sync::Arc;

use crate::{Error, Lifecycle, Result};

type Factory = Box<dyn Fn() -> Arc<dyn Lifecycle> + Send + Sync>;

/// Registry mapping a service type identifier to a factory producing the
/// matching [`Lifecycle`] implementation.
///
/// All factories are registered once at agent startup; selection afterwards
/// is by explicit lookup, never by runtime reflection.
#[derive(Default)]
pub struct ServiceRegistry {
    factories: HashMap<String, Factory>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for the given service type, replacing any
    /// previous registration for the same type.
    pub fn register<F>(&mut self, service_type: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Lifecycle> + Send + Sync + 'static,
    {
        self.factories
            .insert(service_type.into(), Box::new(factory));
    }

    /// Produces the service manager for the given service type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownServiceType`] if no factory is registered for
    /// the type.
    pub fn create(&self, service_type: &str) -> Result<Arc<dyn Lifecycle>> {
        self.factories.get(service_type).map_or_else(
            || Err(Error::UnknownServiceType(service_type.to_string())),
            |factory| Ok(factory()),
        )
    }

    /// Returns the registered service type identifiers.
    #[must_use]
    pub fn service_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceStatus;

    use async_trait::async_trait;

    struct FakeService;

    #[async_trait]
    impl Lifecycle for FakeService {
        fn name(&self) -> &str {
            "fake"
        }

        async fn start(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }

        async fn stop(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }

        async fn restart(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }

        async fn status(&self) -> ServiceStatus {
            ServiceStatus::Unknown
        }
    }

    #[test]
    fn creates_registered_service() {
        let mut registry = ServiceRegistry::new();
        registry.register("fake", || Arc::new(FakeService));

        let service = registry.create("fake").unwrap();
        assert_eq!(service.name(), "fake");
    }

    #[test]
    fn unknown_service_type_is_an_error() {
        let registry = ServiceRegistry::new();

        assert!(matches!(
            registry.create("rabbitmq"),
            Err(Error::UnknownServiceType(t)) if t == "rabbitmq"
        ));
    }
}
