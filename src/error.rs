use crate::id::{EntityRef, KeyStrategy};

/// A specialized result type for store operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong when talking to a [`Store`](crate::Store).
///
/// All errors are raised synchronously at the point of violation.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// A patch, delete or derived lookup addressed an absent entity.
    #[error("entity {0} not found")]
    NotFound(EntityRef),
    /// A checkout addressed an absent entity.
    #[error("entity {0} is missing")]
    MissingEntity(EntityRef),
    /// An insert collided with a present entity.
    #[error("entity {0} already exists")]
    DuplicateKey(EntityRef),
    /// A patch touched a property that was not present at insert time.
    #[error("entity {entity} has no property `{key}`")]
    UnknownProperty { entity: EntityRef, key: String },
    /// An operation named an entity type that was never registered.
    #[error("entity type `{0}` is not registered")]
    UnregisteredType(String),
    /// A derived computation name is not part of the type's schema.
    #[error("entity type `{entity_type}` has no derived value `{name}`")]
    UnknownDerived { entity_type: String, name: String },
    /// A query name was never registered.
    #[error("query `{0}` is not registered")]
    UnknownQuery(String),
    /// An entity type, derived value or query was registered twice.
    #[error("`{0}` is already registered")]
    DuplicateRegistration(String),
    /// An explicit identifier does not fit the type's key strategy.
    #[error("entity type `{entity_type}` only accepts {expected:?} identifiers")]
    KeyMismatch { entity_type: String, expected: KeyStrategy },
    /// A property did not hold a value of the expected kind.
    #[error("property `{key}` of `{entity_type}` is not {expected}")]
    PropertyType { entity_type: String, key: String, expected: &'static str },
}
