// SPDX-License-Identifier: Apache-2.0

//! Engine registries
//!
//! Two independent registries keyed by engine tag: fetchers and simplifiers.
//! Both are seeded at construction and read-mostly afterwards; new engines
//! plug in without touching core code.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::traits::{SchemaFetcher, TypeSimplifier};

/// Registry that holds all available schema fetchers
pub struct FetcherRegistry {
    fetchers: RwLock<HashMap<String, Arc<dyn SchemaFetcher>>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self {
            fetchers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a fetcher under an explicit tag. The same instance may be
    /// registered under several tags (yugabytedb reuses the postgresql one).
    pub fn register(&self, engine: impl Into<String>, fetcher: Arc<dyn SchemaFetcher>) {
        self.fetchers.write().insert(engine.into(), fetcher);
    }

    pub fn get(&self, engine: &str) -> Option<Arc<dyn SchemaFetcher>> {
        self.fetchers.read().get(engine).cloned()
    }

    /// Registered engine tags, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.fetchers.read().keys().cloned().collect();
        tags.sort_unstable();
        tags
    }
}

impl Default for FetcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry that holds all available type simplifiers
pub struct SimplifierRegistry {
    simplifiers: RwLock<HashMap<String, Arc<dyn TypeSimplifier>>>,
}

impl SimplifierRegistry {
    pub fn new() -> Self {
        Self {
            simplifiers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, engine: impl Into<String>, simplifier: Arc<dyn TypeSimplifier>) {
        self.simplifiers.write().insert(engine.into(), simplifier);
    }

    pub fn get(&self, engine: &str) -> Option<Arc<dyn TypeSimplifier>> {
        self.simplifiers.read().get(engine).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.simplifiers.read().keys().cloned().collect();
        tags.sort_unstable();
        tags
    }
}

impl Default for SimplifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}
