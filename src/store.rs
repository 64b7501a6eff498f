use std::fmt::{self, Debug, Formatter};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::collection::CollectionIndex;
use crate::config::{Config, SingletonReinsert};
use crate::derived::{Computation, DerivedValue, QueryValue};
use crate::error::{Error, Result};
use crate::id::{EntityRef, Identifier, KeyStrategy};
use crate::schema::{QueryFn, Schema};
use crate::tag::{ComputedTag, Tag, WeakComputedTag};
use crate::value::{Checkout, Properties, Value};

/// An in-memory entity store with revision tracking.
///
/// Every entity, every property, every derived value and every collection
/// enumeration carries a [`Tag`]. Writes dirty the affected tags; derived
/// values and queries collect the tags they read while running, so their
/// staleness can be checked without running them again.
///
/// Writes take `&mut self` and reads take `&self`, which linearizes them.
/// Wrap the store in a [`SharedStore`](crate::SharedStore) to use it from
/// several threads.
#[derive(Default)]
pub struct Store {
    config: Config,
    /// Registered entity types by name.
    types: FxHashMap<String, Registered>,
    /// Registered queries by name.
    queries: FxHashMap<String, QueryFn>,
    /// Computed tags of queries by name and arguments. Held weakly: an entry
    /// lives as long as some query handle does.
    query_tags: Mutex<FxHashMap<(String, Vec<Value>), WeakComputedTag>>,
}

/// A registered entity type.
struct Registered {
    schema: Schema,
    collection: CollectionIndex,
}

impl Store {
    /// Create an empty store with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given configuration.
    pub fn with_config(config: Config) -> Self {
        Self { config, ..Self::default() }
    }

    /// The store's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register an entity type.
    ///
    /// Fails if the type was registered before or if the schema names a
    /// derived value twice.
    pub fn register(&mut self, mut schema: Schema) -> Result<()> {
        if let Some(duplicate) = schema.duplicate.take() {
            return Err(Error::DuplicateRegistration(duplicate));
        }

        if self.types.contains_key(&schema.name) {
            return Err(Error::DuplicateRegistration(schema.name));
        }

        tracing::debug!(?schema, "registering entity type");
        let collection = CollectionIndex::new(&schema.name);
        self.types.insert(schema.name.clone(), Registered { schema, collection });
        Ok(())
    }

    /// Register a query over the whole store.
    pub fn register_query<F>(&mut self, name: impl Into<String>, f: F) -> Result<()>
    where
        F: Fn(&Store, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.queries.contains_key(&name) {
            return Err(Error::DuplicateRegistration(name));
        }

        tracing::debug!(query = %name, "registering query");
        self.queries.insert(name, Box::new(f));
        Ok(())
    }

    /// The schema of a registered type.
    pub fn schema(&self, entity_type: &str) -> Result<&Schema> {
        Ok(&self.registered(entity_type)?.schema)
    }

    /// Insert an entity and return its reference.
    ///
    /// The identifier is allocated per the type's key strategy. Inserting a
    /// singleton that is already present follows
    /// [`Config::singleton_reinsert`].
    pub fn insert(&mut self, entity_type: &str, properties: Properties) -> Result<EntityRef> {
        let policy = self.config.singleton_reinsert;
        let registered = self.registered_mut(entity_type)?;
        let collection = &mut registered.collection;
        match registered.schema.key {
            KeyStrategy::Generated => collection.insert(Identifier::generate(), properties),
            KeyStrategy::Singleton => {
                let id = Identifier::singleton(entity_type);
                if !collection.contains(&id) {
                    return collection.insert(id, properties);
                }

                match policy {
                    SingletonReinsert::Overwrite => {
                        collection.overwrite(&id, properties)?;
                        Ok(EntityRef::new(entity_type, id))
                    }
                    SingletonReinsert::Reject => {
                        Err(Error::DuplicateKey(EntityRef::new(entity_type, id)))
                    }
                }
            }
        }
    }

    /// Insert an entity under a caller-chosen identifier.
    ///
    /// The identifier must match the type's key strategy. Unlike
    /// [`insert`](Self::insert), this never overwrites: a present identifier
    /// is a [`DuplicateKey`](Error::DuplicateKey).
    pub fn insert_with_id(
        &mut self,
        entity_type: &str,
        id: Identifier,
        properties: Properties,
    ) -> Result<EntityRef> {
        let registered = self.registered_mut(entity_type)?;
        let expected = registered.schema.key;
        let fits = match expected {
            KeyStrategy::Generated => id.kind() == KeyStrategy::Generated,
            KeyStrategy::Singleton => id == Identifier::singleton(entity_type),
        };

        if !fits {
            return Err(Error::KeyMismatch { entity_type: entity_type.into(), expected });
        }

        registered.collection.insert(id, properties)
    }

    /// Merge `updates` into a present entity's properties.
    ///
    /// Every key must have been present when the entity was inserted.
    pub fn patch(&mut self, reference: &EntityRef, updates: Properties) -> Result<()> {
        self.collection_mut(reference)?.patch(reference.id(), updates)
    }

    /// Delete a present entity.
    pub fn delete(&mut self, reference: &EntityRef) -> Result<()> {
        self.collection_mut(reference)?.delete(reference.id())
    }

    /// Read an entity's properties, or `None` if it is absent.
    pub fn get(&self, reference: &EntityRef) -> Result<Option<Checkout>> {
        Ok(self.collection(reference)?.get(reference.id()))
    }

    /// Read a present entity's properties.
    pub fn checkout(&self, reference: &EntityRef) -> Result<Checkout> {
        self.get(reference)?.ok_or_else(|| Error::MissingEntity(reference.clone()))
    }

    /// Read a single property of a present entity.
    ///
    /// Depends on the entity tag and, unless disabled in the configuration,
    /// on the property's own tag.
    pub fn property(&self, reference: &EntityRef, key: &str) -> Result<Option<Value>> {
        let collection = self.collection(reference)?;
        match collection.record(reference.id()) {
            Some(record) => Ok(record.read_property(key, self.config.track_property_reads)),
            None => {
                collection.all_tag().consume();
                Err(Error::MissingEntity(reference.clone()))
            }
        }
    }

    /// The references of all present entities of a type.
    pub fn all(&self, entity_type: &str) -> Result<Vec<EntityRef>> {
        Ok(self.registered(entity_type)?.collection.all())
    }

    /// The number of present entities of a type. Untracked.
    pub fn len(&self, entity_type: &str) -> Result<usize> {
        Ok(self.registered(entity_type)?.collection.len())
    }

    /// Whether an entity is present. Untracked.
    pub fn contains(&self, reference: &EntityRef) -> bool {
        self.collection(reference).is_ok_and(|c| c.contains(reference.id()))
    }

    /// The reference of a singleton type's instance.
    ///
    /// The instance need not be present.
    pub fn singleton(&self, entity_type: &str) -> Result<EntityRef> {
        let registered = self.registered(entity_type)?;
        if registered.schema.key != KeyStrategy::Singleton {
            return Err(Error::KeyMismatch {
                entity_type: entity_type.into(),
                expected: registered.schema.key,
            });
        }
        Ok(EntityRef::singleton(entity_type))
    }

    /// The tag dirtied by every write to an entity.
    pub fn entity_tag(&self, reference: &EntityRef) -> Result<Tag> {
        let record = self.collection(reference)?.find(reference.id())?;
        Ok(record.entity_tag().clone())
    }

    /// The tag of one property of an entity.
    pub fn property_tag(&self, reference: &EntityRef, key: &str) -> Result<Tag> {
        let record = self.collection(reference)?.find(reference.id())?;
        record.property_tag(key).cloned().ok_or_else(|| Error::UnknownProperty {
            entity: reference.clone(),
            key: key.into(),
        })
    }

    /// The tag dirtied whenever a type's membership changes.
    pub fn all_tag(&self, entity_type: &str) -> Result<Tag> {
        Ok(self.registered(entity_type)?.collection.all_tag().clone())
    }

    /// The computed tag of an entity's derived value.
    pub fn derived_tag(&self, reference: &EntityRef, name: &str) -> Result<ComputedTag> {
        Ok(self.derived(reference, name)?.tag().clone())
    }

    /// A named derived value of a present entity.
    ///
    /// Nothing is computed yet; call [`DerivedValue::value`] for that.
    pub fn derived(&self, reference: &EntityRef, name: &str) -> Result<DerivedValue> {
        let registered = self.registered(reference.entity_type())?;
        if !registered.schema.has_derived(name) {
            return Err(Error::UnknownDerived {
                entity_type: reference.entity_type().into(),
                name: name.into(),
            });
        }

        let tag = registered.collection.find(reference.id())?.derived_tag(name);
        let computation = Computation::Entity { reference: reference.clone(), name: name.into() };
        Ok(DerivedValue::new(computation, tag))
    }

    /// A named query with arguments.
    ///
    /// Handles for the same name and arguments share one computed tag for as
    /// long as any of them is alive. Nothing is computed yet; call
    /// [`DerivedValue::value`] for that.
    pub fn query(&self, name: &str, args: &[Value]) -> Result<QueryValue> {
        if !self.queries.contains_key(name) {
            return Err(Error::UnknownQuery(name.into()));
        }

        let args = args.to_vec();
        let mut tags = self.query_tags.lock();
        tags.retain(|_, tag| tag.is_alive());

        let key = (name.to_string(), args);
        let tag = match tags.get(&key).and_then(WeakComputedTag::upgrade) {
            Some(tag) => tag,
            None => {
                let tag = ComputedTag::new();
                tags.insert(key.clone(), tag.downgrade());
                tag
            }
        };

        let (name, args) = key;
        Ok(DerivedValue::new(Computation::Query { name, args }, tag))
    }

    /// Run a computation once. Called within a tracking frame.
    pub(crate) fn evaluate(&self, computation: &Computation) -> Result<Value> {
        tracing::debug!(?computation, "evaluating");
        match computation {
            Computation::Entity { reference, name } => {
                let registered = self.registered(reference.entity_type())?;
                let f = registered.schema.derived.get(name).ok_or_else(|| {
                    Error::UnknownDerived {
                        entity_type: reference.entity_type().into(),
                        name: name.clone(),
                    }
                })?;
                let properties = registered
                    .collection
                    .get(reference.id())
                    .ok_or_else(|| Error::NotFound(reference.clone()))?;
                f(&properties, self)
            }
            Computation::Query { name, args } => {
                let f = self
                    .queries
                    .get(name)
                    .ok_or_else(|| Error::UnknownQuery(name.clone()))?;
                f(self, args)
            }
        }
    }

    fn registered(&self, entity_type: &str) -> Result<&Registered> {
        self.types
            .get(entity_type)
            .ok_or_else(|| Error::UnregisteredType(entity_type.into()))
    }

    fn registered_mut(&mut self, entity_type: &str) -> Result<&mut Registered> {
        self.types
            .get_mut(entity_type)
            .ok_or_else(|| Error::UnregisteredType(entity_type.into()))
    }

    fn collection(&self, reference: &EntityRef) -> Result<&CollectionIndex> {
        Ok(&self.registered(reference.entity_type())?.collection)
    }

    fn collection_mut(&mut self, reference: &EntityRef) -> Result<&mut CollectionIndex> {
        Ok(&mut self.registered_mut(reference.entity_type())?.collection)
    }
}

impl Debug for Store {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut types: Vec<_> = self
            .types
            .iter()
            .map(|(name, registered)| (name, registered.collection.len()))
            .collect();
        types.sort();
        let mut queries: Vec<_> = self.queries.keys().collect();
        queries.sort();
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("types", &types)
            .field("queries", &queries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::Arbitrary;

    use super::*;
    use crate::properties;

    fn store() -> Store {
        let mut store = Store::new();
        store
            .register(Schema::new("person").derived("length", |person, _| {
                Ok(Value::from(person.field::<String>("name").unwrap_or_default().len()))
            }))
            .unwrap();
        store.register(Schema::new("settings").singleton()).unwrap();
        store
    }

    #[test]
    fn test_register_twice() {
        let mut store = store();
        assert_eq!(
            store.register(Schema::new("person")),
            Err(Error::DuplicateRegistration("person".into())),
        );
    }

    #[test]
    fn test_register_duplicate_derived_name() {
        let mut store = Store::new();
        let schema = Schema::new("person")
            .derived("x", |_, _| Ok(Value::Null))
            .derived("x", |_, _| Ok(Value::Null));
        assert_eq!(
            store.register(schema),
            Err(Error::DuplicateRegistration("person.x".into())),
        );
        assert!(store.schema("person").is_err());
    }

    #[test]
    fn test_register_query_twice() {
        let mut store = store();
        store.register_query("count", |_, _| Ok(Value::Null)).unwrap();
        assert!(matches!(
            store.register_query("count", |_, _| Ok(Value::Null)),
            Err(Error::DuplicateRegistration(_)),
        ));
    }

    #[test]
    fn test_unregistered_type() {
        let mut store = store();
        let ghost = EntityRef::new("ghost", Identifier::generate());
        let unregistered = Error::UnregisteredType("ghost".into());
        assert_eq!(store.insert("ghost", properties! {}).unwrap_err(), unregistered);
        assert_eq!(store.get(&ghost).unwrap_err(), unregistered);
        assert_eq!(store.all("ghost").unwrap_err(), unregistered);
        assert_eq!(store.delete(&ghost).unwrap_err(), unregistered);
        assert!(!store.contains(&ghost));
    }

    #[test]
    fn test_get_and_checkout() {
        let mut store = store();
        let tom = store.insert("person", properties! { "name" => "Tom Dale" }).unwrap();
        assert_eq!(store.get(&tom).unwrap().unwrap()["name"], Value::from("Tom Dale"));
        assert_eq!(store.property(&tom, "name"), Ok(Some(Value::from("Tom Dale"))));
        assert_eq!(store.property(&tom, "age"), Ok(None));

        store.delete(&tom).unwrap();
        assert_eq!(store.get(&tom), Ok(None));
        assert_eq!(store.checkout(&tom), Err(Error::MissingEntity(tom.clone())));
        assert_eq!(store.property(&tom, "name"), Err(Error::MissingEntity(tom.clone())));
        assert_eq!(store.patch(&tom, properties! {}), Err(Error::NotFound(tom.clone())));
        assert_eq!(store.delete(&tom), Err(Error::NotFound(tom.clone())));
    }

    #[test]
    fn test_unknown_derived_and_query() {
        let mut store = store();
        let tom = store.insert("person", properties! { "name" => "Tom" }).unwrap();
        assert!(matches!(store.derived(&tom, "width"), Err(Error::UnknownDerived { .. })));
        assert!(matches!(store.query("nope", &[]), Err(Error::UnknownQuery(_))));
    }

    #[test]
    fn test_derived_tags_are_shared() {
        let mut store = store();
        let tom = store.insert("person", properties! { "name" => "Tom" }).unwrap();
        let a = store.derived(&tom, "length").unwrap();
        let b = store.derived(&tom, "length").unwrap();
        assert!(a.tag().ptr_eq(b.tag()));
        assert!(a.tag().ptr_eq(&store.derived_tag(&tom, "length").unwrap()));
        assert_eq!(a.value(&store), Ok(Value::Int(3)));
        assert_eq!(b.revision(), a.revision());
    }

    #[test]
    fn test_singleton_lifecycle() {
        let mut store = store();
        let settings = store.singleton("settings").unwrap();
        assert!(!store.contains(&settings));

        let inserted = store.insert("settings", properties! { "theme" => "dark" }).unwrap();
        assert_eq!(inserted, settings);

        let entity = store.entity_tag(&settings).unwrap();
        let members = store.all_tag("settings").unwrap().value();
        let prior = entity.value();
        let again = store.insert("settings", properties! { "theme" => "light" }).unwrap();
        assert_eq!(again, settings);
        assert!(!entity.validate(prior));
        assert!(store.all_tag("settings").unwrap().validate(members));
        assert_eq!(store.len("settings"), Ok(1));

        store.delete(&settings).unwrap();
        store.insert("settings", properties! { "theme" => "blue" }).unwrap();
        assert_eq!(store.checkout(&settings).unwrap()["theme"], Value::from("blue"));
    }

    #[test]
    fn test_singleton_reject_policy() {
        let config = Config::default().singleton_reinsert(SingletonReinsert::Reject);
        let mut store = Store::with_config(config);
        store.register(Schema::new("settings").singleton()).unwrap();
        let settings = store.insert("settings", properties! {}).unwrap();
        assert_eq!(
            store.insert("settings", properties! {}),
            Err(Error::DuplicateKey(settings)),
        );
    }

    #[test]
    fn test_query_tags_are_released() {
        let mut store = store();
        store
            .register_query("people", |store, _| {
                Ok(Value::from(store.all("person")?.len()))
            })
            .unwrap();
        let tom = store.insert("person", properties! { "name" => "Tom" }).unwrap();

        let held = store.query("people", &[]).unwrap();
        let shared = store.query("people", &[]).unwrap();
        assert!(held.tag().ptr_eq(shared.tag()));

        let by_tom = store.query("people", &[Value::from(&tom)]).unwrap();
        by_tom.value(&store).unwrap();
        assert_eq!(store.query_tags.lock().len(), 2);

        drop(by_tom);
        store.delete(&tom).unwrap();
        let again = store.query("people", &[]).unwrap();
        assert!(again.tag().ptr_eq(held.tag()));
        assert_eq!(store.query_tags.lock().len(), 1);

        drop((held, shared, again));
        let fresh = store.query("people", &[Value::Int(1)]).unwrap();
        assert_eq!(store.query_tags.lock().len(), 1);
        assert_eq!(fresh.revision(), crate::Revision::EPOCH);
    }

    #[test]
    fn test_untracked_property_reads() {
        let mut store = Store::with_config(Config::default().track_property_reads(false));
        store.register(Schema::new("person")).unwrap();
        let tom = store.insert("person", properties! { "name" => "Tom" }).unwrap();
        let (_, consumed) = crate::track(|| store.property(&tom, "name"));
        assert_eq!(consumed.len(), 1);
        assert!(consumed.contains(&store.entity_tag(&tom).unwrap()));
    }

    #[test]
    fn test_insert_with_id() {
        let mut store = store();
        let id = Identifier::generated("tom");
        let tom = store.insert_with_id("person", id.clone(), properties! {}).unwrap();
        assert_eq!(tom.id(), &id);
        assert_eq!(
            store.insert_with_id("person", id, properties! {}),
            Err(Error::DuplicateKey(tom)),
        );
        assert!(matches!(
            store.insert_with_id("person", Identifier::singleton("person"), properties! {}),
            Err(Error::KeyMismatch { expected: KeyStrategy::Generated, .. }),
        ));
        assert!(matches!(
            store.insert_with_id("settings", Identifier::generate(), properties! {}),
            Err(Error::KeyMismatch { expected: KeyStrategy::Singleton, .. }),
        ));
        assert!(matches!(store.singleton("person"), Err(Error::KeyMismatch { .. })));
    }

    #[test]
    fn test_tag_lookups() {
        let mut store = store();
        let tom = store.insert("person", properties! { "name" => "Tom" }).unwrap();
        assert!(store.property_tag(&tom, "name").is_ok());
        assert!(matches!(
            store.property_tag(&tom, "age"),
            Err(Error::UnknownProperty { .. }),
        ));
        store.delete(&tom).unwrap();
        assert_eq!(store.entity_tag(&tom).unwrap_err(), Error::NotFound(tom.clone()));
        assert!(matches!(store.derived(&tom, "length"), Err(Error::NotFound(_))));
    }

    #[quickcheck_macros::quickcheck]
    fn test_arbitrary_quickcheck(ops: Vec<ArbitraryOp>) {
        let mut store = store();
        let mut live: Vec<EntityRef> = vec![];
        for op in ops {
            let all = store.all_tag("person").unwrap();
            let members = all.value();
            let before: Vec<_> = live
                .iter()
                .map(|person| {
                    let name = store.property_tag(person, "name").unwrap().value();
                    let city = store.property_tag(person, "city").unwrap().value();
                    (name, city)
                })
                .collect();

            match op {
                ArbitraryOp::Insert(name) => {
                    let properties =
                        properties! { "name" => name.to_string(), "city" => "Portland" };
                    live.push(store.insert("person", properties).unwrap());
                    assert!(!all.validate(members));
                }
                ArbitraryOp::Patch(i, name) if !live.is_empty() => {
                    let target = i as usize % live.len();
                    let key = if name { "name" } else { "city" };
                    store.patch(&live[target], properties! { key => "Seattle" }).unwrap();
                    assert!(all.validate(members));
                    for (j, person) in live.iter().enumerate() {
                        let (name_prior, city_prior) = before[j];
                        let name_tag = store.property_tag(person, "name").unwrap();
                        let city_tag = store.property_tag(person, "city").unwrap();
                        assert_eq!(name_tag.validate(name_prior), j != target || !name);
                        assert_eq!(city_tag.validate(city_prior), j != target || name);
                    }
                }
                ArbitraryOp::Delete(i) if !live.is_empty() => {
                    let target = live.remove(i as usize % live.len());
                    store.delete(&target).unwrap();
                    assert!(!all.validate(members));
                    assert_eq!(store.get(&target), Ok(None));
                }
                _ => {}
            }

            assert_eq!(store.len("person"), Ok(live.len()));
            assert_eq!(store.all("person").unwrap().len(), live.len());
        }
    }

    #[derive(Debug, Clone)]
    enum ArbitraryOp {
        Insert(u8),
        Patch(u8, bool),
        Delete(u8),
    }

    impl Arbitrary for ArbitraryOp {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            match g.choose(&[0, 1, 2]) {
                Some(0) => Self::Insert(Arbitrary::arbitrary(g)),
                Some(1) => Self::Patch(Arbitrary::arbitrary(g), Arbitrary::arbitrary(g)),
                _ => Self::Delete(Arbitrary::arbitrary(g)),
            }
        }
    }
}
