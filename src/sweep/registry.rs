//! Static ordering of sweepers.
//!
//! Sweepers declare the sweepers that must run before them. The table is
//! resolved once at startup into a deterministic execution order.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::SweepError;

/// Name of the load balancer sweeper.
pub const SLB_SWEEPER: &str = "slb";

/// Name of the container cluster sweeper, which runs outside this crate.
pub const CLUSTER_SWEEPER: &str = "cs_cluster";

/// One entry of the sweeper table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweeperDef {
    /// Sweeper name.
    pub name: String,
    /// Sweepers that must complete first.
    pub dependencies: Vec<String>,
    /// Whether the sweeper is run by another tool.
    pub external: bool,
}

/// Dependency table of sweepers.
#[derive(Debug, Clone, Default)]
pub struct SweeperRegistry {
    sweepers: BTreeMap<String, SweeperDef>,
}

impl SweeperRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in sweepers.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register_external(CLUSTER_SWEEPER);
        registry.register(SLB_SWEEPER, &[CLUSTER_SWEEPER]);
        registry
    }

    /// Registers a sweeper run by this crate.
    pub fn register(&mut self, name: &str, dependencies: &[&str]) {
        self.insert(name, dependencies, false);
    }

    /// Registers a sweeper run by another tool, so others may depend on it.
    pub fn register_external(&mut self, name: &str) {
        self.insert(name, &[], true);
    }

    fn insert(&mut self, name: &str, dependencies: &[&str], external: bool) {
        self.sweepers.insert(
            name.to_string(),
            SweeperDef {
                name: name.to_string(),
                dependencies: dependencies.iter().map(ToString::to_string).collect(),
                external,
            },
        );
    }

    /// Looks up a sweeper.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SweeperDef> {
        self.sweepers.get(name)
    }

    /// Resolves the table into an execution order, dependencies first.
    ///
    /// Ties are broken by name so the order is stable.
    ///
    /// # Errors
    ///
    /// - `SweepError::UnknownDependency` if a dependency was never registered
    /// - `SweepError::DependencyCycle` if the table is not acyclic
    pub fn resolve(&self) -> Result<Vec<SweeperDef>, SweepError> {
        let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for def in self.sweepers.values() {
            for dependency in &def.dependencies {
                if !self.sweepers.contains_key(dependency) {
                    return Err(SweepError::UnknownDependency {
                        sweeper: def.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
                dependents.entry(dependency.as_str()).or_default().push(def.name.as_str());
            }
            pending.insert(def.name.as_str(), def.dependencies.len());
        }

        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.sweepers.len());

        while let Some(name) = ready.pop_first() {
            pending.remove(name);
            if let Some(def) = self.sweepers.get(name) {
                order.push(def.clone());
            }

            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if !pending.is_empty() {
            let cycle = pending.keys().copied().collect::<Vec<_>>().join(" -> ");
            return Err(SweepError::DependencyCycle { cycle });
        }

        Ok(order)
    }
}
