//! Keyed store of shared pipelines.
//!
//! Pipelines carrying circuit breakers or concurrency limiters hold state
//! that must be shared by every caller of the same downstream dependency.
//! The registry builds each keyed pipeline once and hands out clones.

use super::{ResiliencePipeline, ResiliencePipelineBuilder};
use crate::errors::PipelineValidationError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Produces the builder of a registered pipeline.
pub type BuilderFactory<K, T> = Arc<dyn Fn(&K) -> ResiliencePipelineBuilder<T> + Send + Sync>;

/// Registry of pipelines keyed by `K`.
pub struct ResiliencePipelineRegistry<K, T: Send + 'static> {
    pipelines: DashMap<K, ResiliencePipeline<T>>,
    builders: DashMap<K, BuilderFactory<K, T>>,
}

impl<K, T> fmt::Debug for ResiliencePipelineRegistry<K, T>
where
    K: Eq + Hash + fmt::Debug,
    T: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResiliencePipelineRegistry")
            .field("pipelines", &self.pipelines.len())
            .field("builders", &self.builders.len())
            .finish()
    }
}

impl<K, T> Default for ResiliencePipelineRegistry<K, T>
where
    K: Eq + Hash + Clone,
    T: Send + 'static,
{
    fn default() -> Self {
        Self {
            pipelines: DashMap::new(),
            builders: DashMap::new(),
        }
    }
}

impl<K, T> ResiliencePipelineRegistry<K, T>
where
    K: Eq + Hash + Clone,
    T: Send + 'static,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers how to build the pipeline of `key`.
    ///
    /// Returns false if a builder is already registered for `key`.
    pub fn register_builder<F>(&self, key: K, factory: F) -> bool
    where
        F: Fn(&K) -> ResiliencePipelineBuilder<T> + Send + Sync + 'static,
    {
        match self.builders.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(factory));
                true
            }
        }
    }

    /// Returns the pipeline of `key`, building it from the registered
    /// builder on first use.
    ///
    /// # Errors
    ///
    /// Returns the validation error of the registered builder; nothing is
    /// cached in that case.
    pub fn get(&self, key: &K) -> Result<Option<ResiliencePipeline<T>>, PipelineValidationError> {
        if let Some(pipeline) = self.pipelines.get(key) {
            return Ok(Some(pipeline.clone()));
        }
        let Some(factory) = self.builders.get(key).map(|f| Arc::clone(f.value())) else {
            return Ok(None);
        };
        self.get_or_add(key.clone(), |key| factory(key)).map(Some)
    }

    /// Returns the pipeline of `key`, building it with `factory` if absent.
    ///
    /// Concurrent callers for the same key observe a single build.
    ///
    /// # Errors
    ///
    /// Returns the validation error of the builder; nothing is cached in
    /// that case.
    pub fn get_or_add<F>(&self, key: K, factory: F) -> Result<ResiliencePipeline<T>, PipelineValidationError>
    where
        F: FnOnce(&K) -> ResiliencePipelineBuilder<T>,
    {
        match self.pipelines.entry(key) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(slot) => {
                let pipeline = factory(slot.key()).build()?;
                slot.insert(pipeline.clone());
                Ok(pipeline)
            }
        }
    }

    /// Returns true if `key` has a built pipeline or a registered builder.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.pipelines.contains_key(key) || self.builders.contains_key(key)
    }

    /// Returns the number of built pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns true if no pipeline was built yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
