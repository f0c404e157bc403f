//! Driver registry for creating backend instances.
//!
//! The registry maps each `BackendType` to a zero-argument constructor. It
//! caches nothing: every `create` call yields a fresh, unconnected driver owned
//! by the caller.

use std::collections::HashMap;
use std::sync::Arc;

use super::mysql::MySqlDriver;
use crate::config::DriverSettings;
use crate::error::{DriverError, Result};
use crate::traits::{BackendType, BoxedDriver};

/// Constructor producing a fresh, unconnected driver.
pub type DriverConstructor = Arc<dyn Fn() -> BoxedDriver + Send + Sync>;

/// Mapping from backend type to driver constructor.
///
/// # Example
///
/// ```ignore
/// use querydesk::{DriverRegistry, DriverSettings};
/// use querydesk::traits::BackendType;
///
/// let registry = DriverRegistry::with_defaults(DriverSettings::default());
/// let driver = registry.create(BackendType::MySql)?;
/// assert!(!driver.is_connected());
/// ```
#[derive(Clone, Default)]
pub struct DriverRegistry {
    constructors: HashMap<BackendType, DriverConstructor>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in backend registered.
    pub fn with_defaults(settings: DriverSettings) -> Self {
        let mut registry = Self::new();
        registry.register(BackendType::MySql, move || {
            Box::new(MySqlDriver::new(settings.clone())) as BoxedDriver
        });
        registry
    }

    /// Register a constructor for `backend`. A later registration for the same
    /// type replaces the earlier one.
    pub fn register<F>(&mut self, backend: BackendType, constructor: F)
    where
        F: Fn() -> BoxedDriver + Send + Sync + 'static,
    {
        if self
            .constructors
            .insert(backend, Arc::new(constructor))
            .is_some()
        {
            tracing::debug!(backend = %backend, "Replaced driver constructor");
        } else {
            tracing::debug!(backend = %backend, "Registered driver constructor");
        }
    }

    /// Create a new, unconnected driver for `backend`.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::UnsupportedBackend` if nothing is registered for
    /// the type; no instance is created in that case.
    pub fn create(&self, backend: BackendType) -> Result<BoxedDriver> {
        let constructor = self
            .constructors
            .get(&backend)
            .ok_or(DriverError::UnsupportedBackend(backend))?;
        Ok(constructor())
    }

    /// Check if a backend type has a registered constructor.
    pub fn is_supported(&self, backend: BackendType) -> bool {
        self.constructors.contains_key(&backend)
    }

    /// Registered backend types, in declaration order.
    pub fn supported_types(&self) -> Vec<BackendType> {
        let mut types: Vec<_> = self.constructors.keys().copied().collect();
        types.sort();
        types
    }

    /// All backend types paired with whether they are registered.
    pub fn all_types(&self) -> Vec<(BackendType, bool)> {
        BackendType::all()
            .into_iter()
            .map(|t| (t, self.is_supported(t)))
            .collect()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("supported", &self.supported_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::{MockDriver, MockScript};

    #[test]
    fn test_defaults_register_mysql() {
        let registry = DriverRegistry::with_defaults(DriverSettings::default());
        assert!(registry.is_supported(BackendType::MySql));
        assert!(!registry.is_supported(BackendType::PostgreSql));
        assert_eq!(registry.supported_types(), vec![BackendType::MySql]);
    }

    #[test]
    fn test_create_returns_unconnected_instances() {
        let registry = DriverRegistry::with_defaults(DriverSettings::default());
        for backend in registry.supported_types() {
            let driver = registry.create(backend).unwrap();
            assert!(!driver.is_connected());
            assert_eq!(driver.backend_type(), backend);
        }
    }

    #[test]
    fn test_create_unregistered_fails() {
        let registry = DriverRegistry::with_defaults(DriverSettings::default());
        match registry.create(BackendType::Sqlite) {
            Err(DriverError::UnsupportedBackend(backend)) => {
                assert_eq!(backend, BackendType::Sqlite)
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected UnsupportedBackend"),
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = DriverRegistry::new();
        assert!(registry.supported_types().is_empty());
        assert!(registry.create(BackendType::MySql).is_err());
    }

    #[test]
    fn test_last_registration_wins() {
        let first = MockScript::default();
        let second = MockScript::default();

        let mut registry = DriverRegistry::with_defaults(DriverSettings::default());
        let script = first.clone();
        registry.register(BackendType::MySql, move || {
            Box::new(MockDriver::new(script.clone())) as BoxedDriver
        });
        let script = second.clone();
        registry.register(BackendType::MySql, move || {
            Box::new(MockDriver::new(script.clone())) as BoxedDriver
        });

        smol::block_on(async {
            let mut driver = registry.create(BackendType::MySql).unwrap();
            driver.connect(&MockScript::profile()).await.unwrap();
        });

        assert_eq!(first.connects(), 0);
        assert_eq!(second.connects(), 1);
        assert_eq!(registry.supported_types().len(), 1);
    }

    #[test]
    fn test_every_create_is_fresh() {
        let script = MockScript::default();
        let mut registry = DriverRegistry::new();
        let shared = script.clone();
        registry.register(BackendType::MySql, move || {
            Box::new(MockDriver::new(shared.clone())) as BoxedDriver
        });

        smol::block_on(async {
            let mut a = registry.create(BackendType::MySql).unwrap();
            a.connect(&MockScript::profile()).await.unwrap();
            let b = registry.create(BackendType::MySql).unwrap();
            assert!(a.is_connected());
            assert!(!b.is_connected());
        });
    }

    #[test]
    fn test_all_types_marks_support() {
        let registry = DriverRegistry::with_defaults(DriverSettings::default());
        let all = registry.all_types();
        assert_eq!(all.len(), BackendType::all().len());
        assert!(all.contains(&(BackendType::MySql, true)));
        assert!(all.contains(&(BackendType::SqlServer, false)));
    }
}
