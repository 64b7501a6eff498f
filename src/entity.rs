use crate::error::{Error, Result};
use crate::id::{EntityRef, KeyStrategy};
use crate::schema::Schema;
use crate::store::Store;
use crate::value::{Checkout, FromValue, Properties, Value};

/// A Rust type that maps onto an entity type of a [`Store`].
///
/// Usually derived:
///
/// ```
/// use tagstore::{Entity, EntityRef, Store, properties};
///
/// #[derive(Debug, PartialEq, Entity)]
/// #[entity(name = "article")]
/// struct Article {
///     title: String,
///     author: Option<EntityRef>,
/// }
///
/// let mut store = Store::new();
/// store.register_entity::<Article>().unwrap();
/// let article = store
///     .insert_entity(Article { title: "Tags".into(), author: None })
///     .unwrap();
/// store.patch(&article, properties! { "title" => "Revisions" }).unwrap();
/// let loaded: Article = store.checkout_entity(&article).unwrap();
/// assert_eq!(loaded.title, "Revisions");
/// ```
pub trait Entity: Sized {
    /// The entity type's name in the store.
    const NAME: &'static str;

    /// How identifiers of the type are allocated.
    const KEY: KeyStrategy;

    /// Convert into the dynamically typed properties.
    fn into_properties(self) -> Properties;

    /// Convert back from dynamically typed properties.
    fn from_properties(properties: &Properties) -> Result<Self>;

    /// A schema for the type without derived values.
    fn schema() -> Schema {
        Schema::new(Self::NAME).key(Self::KEY)
    }
}

impl Store {
    /// Register `E`'s entity type without derived values.
    pub fn register_entity<E: Entity>(&mut self) -> Result<()> {
        self.register(E::schema())
    }

    /// Insert a typed entity.
    pub fn insert_entity<E: Entity>(&mut self, entity: E) -> Result<EntityRef> {
        self.insert(E::NAME, entity.into_properties())
    }

    /// Overwrite every field of a present typed entity.
    pub fn patch_entity<E: Entity>(&mut self, reference: &EntityRef, entity: E) -> Result<()> {
        self.patch(reference, entity.into_properties())
    }

    /// The reference of the instance of a singleton `E`.
    pub fn singleton_entity<E: Entity>(&self) -> Result<EntityRef> {
        self.singleton(E::NAME)
    }

    /// Read a present entity as `E`.
    pub fn checkout_entity<E: Entity>(&self, reference: &EntityRef) -> Result<E> {
        self.checkout(reference)?.decode()
    }
}

impl Checkout {
    /// Convert the snapshot into a typed entity.
    pub fn decode<E: Entity>(&self) -> Result<E> {
        E::from_properties(self)
    }
}

/// Read one field of a typed entity. Missing properties read as `Null`.
#[doc(hidden)]
pub fn field<T: FromValue>(properties: &Properties, entity_type: &str, key: &str) -> Result<T> {
    T::from_value(properties.get(key).unwrap_or(&Value::Null)).ok_or_else(|| {
        Error::PropertyType {
            entity_type: entity_type.into(),
            key: key.into(),
            expected: T::EXPECTED,
        }
    })
}

#[cfg(all(test, feature = "macros"))]
mod tests {
    use super::*;
    use crate::{Entity, properties};

    #[derive(Debug, Clone, PartialEq, Entity)]
    struct Person {
        name: String,
        #[entity(rename = "org")]
        association: Option<String>,
    }

    #[derive(Debug, PartialEq, Entity)]
    #[entity(name = "prefs", singleton)]
    struct UserPreferences {
        dark: bool,
    }

    #[test]
    fn test_derived_metadata() {
        assert_eq!(Person::NAME, "person");
        assert_eq!(Person::KEY, KeyStrategy::Generated);
        assert_eq!(UserPreferences::NAME, "prefs");
        assert_eq!(UserPreferences::KEY, KeyStrategy::Singleton);
    }

    #[test]
    fn test_into_and_from_properties() {
        let person = Person { name: "Yehuda Katz".into(), association: Some("Tilde".into()) };
        let properties = person.clone().into_properties();
        assert_eq!(properties, properties! { "name" => "Yehuda Katz", "org" => "Tilde" });
        assert_eq!(Person::from_properties(&properties), Ok(person));
    }

    #[test]
    fn test_wrong_kind_is_error() {
        let properties = properties! { "name" => 5 };
        assert_eq!(
            Person::from_properties(&properties),
            Err(Error::PropertyType {
                entity_type: "person".into(),
                key: "name".into(),
                expected: "a string",
            }),
        );
    }

    #[test]
    fn test_typed_store_helpers() {
        let mut store = Store::new();
        store.register_entity::<Person>().unwrap();
        store.register_entity::<UserPreferences>().unwrap();

        let tom = store
            .insert_entity(Person { name: "Tom Dale".into(), association: None })
            .unwrap();
        store
            .patch_entity(&tom, Person { name: "Thomas Dale".into(), association: None })
            .unwrap();
        let loaded: Person = store.checkout_entity(&tom).unwrap();
        assert_eq!(loaded.name, "Thomas Dale");

        let prefs = store.insert_entity(UserPreferences { dark: true }).unwrap();
        assert_eq!(prefs, store.singleton_entity::<UserPreferences>().unwrap());
        assert!(store.singleton_entity::<Person>().is_err());
        assert_eq!(
            store.checkout_entity::<UserPreferences>(&prefs),
            Ok(UserPreferences { dark: true }),
        );
    }
}
