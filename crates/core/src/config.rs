//! Server configuration.
//!
//! Constructed once per server instance and passed in explicitly; there is
//! no ambient or static state. The clock is injected as a function so tests
//! stay deterministic.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::registry::SearchParamRegistry;

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Process-wide configuration for a server instance: the search parameter
/// registry, the clock used for `lastUpdated` stamps, and write policies.
pub struct ServerConfig {
    registry: SearchParamRegistry,
    clock: Clock,
    create_on_update: bool,
}

impl ServerConfig {
    /// Creates a configuration with the given registry, a wall clock, and
    /// update-as-create disabled.
    pub fn new(registry: SearchParamRegistry) -> Self {
        Self {
            registry,
            clock: Box::new(Utc::now),
            create_on_update: false,
        }
    }

    /// Replaces the clock. Tests use this to control `lastUpdated`.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Allows PUT to create a resource when no live version exists.
    /// When disabled (the default), such a PUT fails with NotFound.
    pub fn with_create_on_update(mut self, allow: bool) -> Self {
        self.create_on_update = allow;
        self
    }

    /// The configured search parameter registry.
    pub fn registry(&self) -> &SearchParamRegistry {
        &self.registry
    }

    /// The current instant per the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Whether PUT may create a missing resource.
    pub fn create_on_update(&self) -> bool {
        self.create_on_update
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SearchParamRegistry::default_clinical())
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("registry", &self.registry)
            .field("create_on_update", &self.create_on_update)
            .finish_non_exhaustive()
    }
}
