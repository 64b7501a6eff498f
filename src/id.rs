use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;
use std::sync::Arc;

use siphasher::sip128::{Hasher128, SipHasher13};

/// How identifiers of an entity type are allocated.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyStrategy {
    /// Exactly one instance per type, under an identifier derived from the
    /// type name.
    Singleton,
    /// A fresh, opaque identifier per insert.
    #[default]
    Generated,
}

/// Identifies an entity within its type's collection.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Identifier {
    kind: KeyStrategy,
    value: Arc<str>,
}

impl Identifier {
    /// The identifier of the single instance of `entity_type`.
    ///
    /// Always the same for the same type name.
    pub fn singleton(entity_type: &str) -> Self {
        let value = format!("{:032x}", siphash(&entity_type));
        Self { kind: KeyStrategy::Singleton, value: value.into() }
    }

    /// A fresh identifier that is unique with overwhelming probability.
    pub fn generate() -> Self {
        Self::generated(uuid::Uuid::new_v4().to_string())
    }

    /// A caller-chosen identifier for a generated-key type.
    pub fn generated(value: impl Into<Arc<str>>) -> Self {
        Self { kind: KeyStrategy::Generated, value: value.into() }
    }

    /// How the identifier was allocated.
    pub fn kind(&self) -> KeyStrategy {
        self.kind
    }

    /// The opaque identifier string.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Debug for Identifier {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.value)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.pad(&self.value)
    }
}

/// A stable handle to one entity: its type plus its identifier.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityRef {
    entity_type: Arc<str>,
    id: Identifier,
}

impl EntityRef {
    /// Create a reference from its parts.
    pub fn new(entity_type: impl Into<Arc<str>>, id: Identifier) -> Self {
        Self { entity_type: entity_type.into(), id }
    }

    /// The reference to the single instance of `entity_type`.
    pub fn singleton(entity_type: &str) -> Self {
        Self::new(entity_type, Identifier::singleton(entity_type))
    }

    /// The name of the entity's type.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// The entity's identifier.
    pub fn id(&self) -> &Identifier {
        &self.id
    }
}

impl Debug for EntityRef {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "EntityRef({self})")
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

/// Produce a 128-bit hash of a value.
fn siphash<T: Hash>(value: &T) -> u128 {
    let mut state = SipHasher13::new();
    value.hash(&mut state);
    state.finish128().as_u128()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton_is_deterministic() {
        let a = Identifier::singleton("settings");
        let b = Identifier::singleton("settings");
        let c = Identifier::singleton("session");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.kind(), KeyStrategy::Singleton);
        assert_eq!(a.value().len(), 32);
    }

    #[test]
    fn test_generated_are_unique() {
        let a = Identifier::generate();
        let b = Identifier::generate();
        assert_ne!(a, b);
        assert_eq!(a.kind(), KeyStrategy::Generated);
    }

    #[test]
    fn test_display() {
        let reference = EntityRef::new("person", Identifier::generated("tom"));
        assert_eq!(reference.to_string(), "person:tom");
        assert_eq!(format!("{reference:?}"), "EntityRef(person:tom)");
    }
}
