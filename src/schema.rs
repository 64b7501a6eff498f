use std::fmt::{self, Debug, Formatter};

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::id::KeyStrategy;
use crate::store::Store;
use crate::value::{Checkout, Value};

/// A computation over one entity's properties.
///
/// Receives the store as well, so it can follow references to other
/// entities. Every read it performs becomes a dependency of its result.
pub type DerivedFn = Box<dyn Fn(&Checkout, &Store) -> Result<Value> + Send + Sync>;

/// A computation over the whole store.
pub type QueryFn = Box<dyn Fn(&Store, &[Value]) -> Result<Value> + Send + Sync>;

/// Describes one entity type: how its keys are allocated and which derived
/// values can be computed for its entities.
///
/// ```
/// # use tagstore::{Schema, Value};
/// let schema = Schema::new("person").derived("length", |person, _| {
///     let name = person.field::<String>("name").unwrap_or_default();
///     Ok(Value::from(name.chars().count()))
/// });
/// ```
pub struct Schema {
    pub(crate) name: String,
    pub(crate) key: KeyStrategy,
    pub(crate) derived: FxHashMap<String, DerivedFn>,
    /// The first derived name that was given twice, reported on registration.
    pub(crate) duplicate: Option<String>,
}

impl Schema {
    /// Describe a type with generated keys and no derived values.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: KeyStrategy::Generated,
            derived: FxHashMap::default(),
            duplicate: None,
        }
    }

    /// Set the key strategy.
    pub fn key(mut self, key: KeyStrategy) -> Self {
        self.key = key;
        self
    }

    /// Use a single instance under a fixed key.
    pub fn singleton(self) -> Self {
        self.key(KeyStrategy::Singleton)
    }

    /// Add a named derived value.
    ///
    /// Names must be unique within the schema. A repeated name makes
    /// [`Store::register`] fail.
    pub fn derived<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Checkout, &Store) -> Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.derived.contains_key(&name) {
            self.duplicate.get_or_insert_with(|| format!("{}.{name}", self.name));
        } else {
            self.derived.insert(name, Box::new(f));
        }
        self
    }

    /// The type's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How keys of this type are allocated.
    pub fn key_strategy(&self) -> KeyStrategy {
        self.key
    }

    /// Whether a derived value of the given name exists.
    pub fn has_derived(&self, name: &str) -> bool {
        self.derived.contains_key(name)
    }
}

impl Debug for Schema {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut derived: Vec<_> = self.derived.keys().collect();
        derived.sort();
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("derived", &derived)
            .finish()
    }
}
