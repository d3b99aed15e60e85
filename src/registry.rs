//! Backend registry and resource resolution.
//!
//! Backends register under a resource prefix such as `/cpu/self/ref`. A
//! resource is resolved to the entry whose prefix shares the longest leading
//! substring with it; a later entry only wins on a strictly longer match, so
//! ties keep the earliest registration. Specificity is the priority: a backend
//! registered at `/gpu/accel` beats one at `/gpu` for `/gpu/accel/x`.
//!
//! Registering is pure bookkeeping. Nothing is initialized until a
//! [`Context`](crate::context::Context) is created for a resource.
//!
//! # Process-scoped registry
//!
//! [`Context::init`](crate::context::Context::init) consults a process-wide
//! registry pre-populated with the built-in backends. It can be extended with
//! [`register_backend`] and restored with [`reset_registry`]. Code that wants no
//! shared state builds its own [`Registry`] and passes it to
//! [`Context::init_with`](crate::context::Context::init_with).

use std::fmt;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::error::{FemError, Result};
use crate::ops::{BUILTIN_BACKENDS, Builtin};

/// Maximum number of registered backends.
pub const MAX_BACKENDS: usize = 32;

/// Backend initializer: receives the full resource and builds the backend,
/// or refuses the resource.
pub type BackendInit = fn(&str) -> Result<Box<dyn Backend>>;

/// One registered backend.
#[derive(Clone)]
pub struct RegistryEntry {
    prefix: String,
    init: BackendInit,
}

impl RegistryEntry {
    /// Registered prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Runs the initializer for `resource`.
    pub fn init(&self, resource: &str) -> Result<Box<dyn Backend>> {
        (self.init)(resource)
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry").field("prefix", &self.prefix).finish_non_exhaustive()
    }
}

/// Length of the common leading substring of `prefix` and `resource`.
fn common_prefix_len(prefix: &str, resource: &str) -> usize {
    prefix.bytes().zip(resource.bytes()).take_while(|(a, b)| a == b).count()
}

/// A bounded list of backends addressed by resource prefix.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in backend compiled into this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        if let Err(err) = registry.register_builtin() {
            warn!(%err, "failed to register built-in backends");
        }
        registry
    }

    /// Registers the built-in table. Backends whose cargo feature is disabled
    /// are weak stand-ins: they are logged and skipped, and still count as success.
    pub fn register_builtin(&mut self) -> Result<()> {
        for builtin in BUILTIN_BACKENDS {
            match builtin.kind {
                Builtin::Available(init) => self.register(builtin.prefix, init)?,
                Builtin::Unavailable { feature } => {
                    debug!(
                        prefix = builtin.prefix,
                        feature, "optional backend not compiled in, skipping registration"
                    );
                }
            }
        }
        Ok(())
    }

    /// Appends a backend.
    pub fn register(&mut self, prefix: impl Into<String>, init: BackendInit) -> Result<()> {
        if self.entries.len() >= MAX_BACKENDS {
            return Err(FemError::RegistryFull { capacity: MAX_BACKENDS });
        }
        let prefix = prefix.into();
        debug!(%prefix, "registered backend");
        self.entries.push(RegistryEntry { prefix, init });
        Ok(())
    }

    /// Finds the most specific entry for `resource`.
    pub fn resolve(&self, resource: &str) -> Result<&RegistryEntry> {
        if resource.is_empty() {
            return Err(FemError::NoResource);
        }
        let mut best: Option<(&RegistryEntry, usize)> = None;
        for entry in &self.entries {
            let n = common_prefix_len(&entry.prefix, resource);
            if n > best.map_or(0, |(_, len)| len) {
                best = Some((entry, n));
            }
        }
        best.map(|(entry, _)| entry)
            .ok_or_else(|| FemError::NoBackendFound(resource.to_owned()))
    }

    /// Registered entries in registration order.
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

lazy_static! {
    static ref GLOBAL_REGISTRY: Mutex<Registry> = Mutex::new(Registry::with_builtin());
}

/// Adds a backend to the process-scoped registry.
pub fn register_backend(prefix: impl Into<String>, init: BackendInit) -> Result<()> {
    GLOBAL_REGISTRY.lock().register(prefix, init)
}

/// Restores the process-scoped registry to the built-in backends.
pub fn reset_registry() {
    *GLOBAL_REGISTRY.lock() = Registry::with_builtin();
}

/// Resolves `resource` against the process-scoped registry.
pub fn resolve_backend(resource: &str) -> Result<RegistryEntry> {
    GLOBAL_REGISTRY.lock().resolve(resource).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::cpu::RefBackend;

    fn init_ref(_: &str) -> Result<Box<dyn Backend>> {
        Ok(Box::new(RefBackend::new()))
    }

    #[test]
    fn longest_prefix_wins() {
        let mut registry = Registry::new();
        registry.register("/gpu", init_ref).unwrap();
        registry.register("/gpu/accel", init_ref).unwrap();
        assert_eq!(registry.resolve("/gpu/accel/x").unwrap().prefix(), "/gpu/accel");
        // "/gpu/" is shared with the longer prefix only
        assert_eq!(registry.resolve("/gpu/other").unwrap().prefix(), "/gpu/accel");
        assert_eq!(registry.resolve("/gp").unwrap().prefix(), "/gpu");
    }

    #[test]
    fn ties_keep_the_earliest_entry() {
        let mut registry = Registry::new();
        registry.register("/cpu/self/ref", init_ref).unwrap();
        registry.register("/cpu/self/opt", init_ref).unwrap();
        assert_eq!(registry.resolve("/cpu/self").unwrap().prefix(), "/cpu/self/ref");
    }

    #[test]
    fn capacity_is_enforced() {
        let mut registry = Registry::new();
        for i in 0..MAX_BACKENDS {
            registry.register(format!("/x/{i}"), init_ref).unwrap();
        }
        assert!(matches!(
            registry.register("/one/more", init_ref),
            Err(FemError::RegistryFull { capacity: MAX_BACKENDS })
        ));
    }

    #[test]
    fn unmatched_and_missing_resources_fail() {
        let mut registry = Registry::new();
        registry.register("/cpu/self/ref", init_ref).unwrap();
        assert!(matches!(registry.resolve("gpu"), Err(FemError::NoBackendFound(_))));
        assert!(matches!(registry.resolve(""), Err(FemError::NoResource)));
        assert!(matches!(Registry::new().resolve("/cpu"), Err(FemError::NoBackendFound(_))));
    }

    #[test]
    fn builtin_registry_contains_reference_backend() {
        let registry = Registry::with_builtin();
        assert!(registry.entries().iter().any(|e| e.prefix() == "/cpu/self/ref"));
        #[cfg(not(feature = "wgpu"))]
        assert!(registry.entries().iter().all(|e| e.prefix() != "/gpu/wgpu"));
    }

    #[test]
    fn common_prefix_counts_leading_bytes() {
        assert_eq!(common_prefix_len("/cpu/self/ref", "/cpu/self"), 9);
        assert_eq!(common_prefix_len("/gpu", "/cpu"), 1);
        assert_eq!(common_prefix_len("abc", "xyz"), 0);
    }
}
