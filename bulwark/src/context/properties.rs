//! Typed ambient properties carried by a resilience context.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A named property key whose value type is fixed at declaration.
///
/// ```
/// use bulwark::context::{ResiliencePropertyKey, ResilienceProperties};
///
/// const TENANT: ResiliencePropertyKey<String> = ResiliencePropertyKey::new("tenant");
///
/// let mut props = ResilienceProperties::new();
/// props.set(&TENANT, "acme".to_string());
/// assert_eq!(props.get(&TENANT).map(String::as_str), Some("acme"));
/// ```
pub struct ResiliencePropertyKey<V> {
    name: &'static str,
    _value: PhantomData<fn() -> V>,
}

impl<V> ResiliencePropertyKey<V> {
    /// Declares a key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    /// Returns the key name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<V> Clone for ResiliencePropertyKey<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for ResiliencePropertyKey<V> {}

impl<V> fmt::Debug for ResiliencePropertyKey<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResiliencePropertyKey")
            .field(&self.name)
            .finish()
    }
}

/// Set by the retry strategy before every attempt (0 for the first one).
pub const RETRY_ATTEMPT: ResiliencePropertyKey<u32> = ResiliencePropertyKey::new("bulwark.retry_attempt");

/// Set on the context of every hedged attempt (0 for the primary call).
pub const HEDGING_ATTEMPT: ResiliencePropertyKey<u32> =
    ResiliencePropertyKey::new("bulwark.hedging_attempt");

/// A typed key/value store.
///
/// Values are shared behind `Arc`, so cloning the store (as hedging does for
/// every attempt) does not clone the values themselves. Storing a value
/// under a name that already holds a different type replaces it.
#[derive(Clone, Default)]
pub struct ResilienceProperties {
    entries: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl ResilienceProperties {
    /// Creates an empty property set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a value.
    #[must_use]
    pub fn get<V>(&self, key: &ResiliencePropertyKey<V>) -> Option<&V>
    where
        V: Send + Sync + 'static,
    {
        self.entries
            .get(key.name)
            .and_then(|value| value.downcast_ref::<V>())
    }

    /// Gets a value or returns `default`.
    #[must_use]
    pub fn get_or<V>(&self, key: &ResiliencePropertyKey<V>, default: V) -> V
    where
        V: Clone + Send + Sync + 'static,
    {
        self.get(key).cloned().unwrap_or(default)
    }

    /// Sets a value, replacing any previous one.
    pub fn set<V>(&mut self, key: &ResiliencePropertyKey<V>, value: V)
    where
        V: Send + Sync + 'static,
    {
        self.entries.insert(key.name, Arc::new(value));
    }

    /// Removes a value.
    pub fn remove<V>(&mut self, key: &ResiliencePropertyKey<V>) -> bool
    where
        V: Send + Sync + 'static,
    {
        self.entries.remove(key.name).is_some()
    }

    /// Checks if a value of the key's type is present.
    #[must_use]
    pub fn contains<V>(&self, key: &ResiliencePropertyKey<V>) -> bool
    where
        V: Send + Sync + 'static,
    {
        self.get(key).is_some()
    }

    /// Copies every entry of `other` into this set, overwriting on conflict.
    pub fn merge_from(&mut self, other: &Self) {
        for (name, value) in &other.entries {
            self.entries.insert(name, Arc::clone(value));
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns all key names.
    #[must_use]
    pub fn keys(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for ResilienceProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceProperties")
            .field("keys", &self.keys())
            .finish()
    }
}
