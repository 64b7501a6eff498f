use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::id::EntityRef;
use crate::revision::Revision;
use crate::tag::{ComputedTag, Tag, TagSet};
use crate::value::{Checkout, Properties, Value};

/// The state of one entity.
///
/// Holds the current property snapshot, one tag per property, one tag for the
/// entity as a whole and the computed tags handed out for its derived values.
pub(crate) struct EntityRecord {
    /// The entity's handle, for errors and tag labels.
    reference: EntityRef,
    /// The current properties. Replaced wholesale on every write.
    snapshot: Checkout,
    /// One tag per property present at insert time.
    tags: FxHashMap<String, Tag>,
    /// Dirtied on every patch and on delete.
    entity: Tag,
    /// Computed tags of derived values by name.
    derived: Mutex<FxHashMap<String, ComputedTag>>,
}

impl EntityRecord {
    /// Create a record with a tag for every given property, all stamped
    /// with the revision of the insert.
    pub fn new(reference: EntityRef, properties: Properties, revision: Revision) -> Self {
        let tags = properties
            .keys()
            .map(|key| (key.clone(), Tag::labeled_at(format!("{reference}.{key}"), revision)))
            .collect();
        let entity = Tag::labeled_at(reference.to_string(), revision);
        Self {
            reference,
            snapshot: Checkout::new(properties),
            tags,
            entity,
            derived: Mutex::new(FxHashMap::default()),
        }
    }

    /// The entity's handle.
    pub fn reference(&self) -> &EntityRef {
        &self.reference
    }

    /// Read all properties, depending on the entity as a whole.
    pub fn read_properties(&self) -> Checkout {
        self.entity.consume();
        self.snapshot.clone()
    }

    /// Read one property.
    ///
    /// Always depends on the entity tag and, if `granular` is set, on the
    /// property's own tag as well.
    pub fn read_property(&self, key: &str, granular: bool) -> Option<Value> {
        self.entity.consume();
        if granular {
            if let Some(tag) = self.tags.get(key) {
                tag.consume();
            }
        }
        self.snapshot.get(key).cloned()
    }

    /// Merge `updates` into the properties.
    ///
    /// Fails without touching anything if one of the keys was not present at
    /// insert time.
    pub fn patch(&mut self, updates: Properties) -> Result<()> {
        if let Some(key) = updates.keys().find(|key| !self.tags.contains_key(*key)) {
            return Err(Error::UnknownProperty {
                entity: self.reference.clone(),
                key: key.clone(),
            });
        }

        if updates.is_empty() {
            return Ok(());
        }

        let revision = Revision::bump();
        let mut properties = self.snapshot.to_properties();
        for (key, value) in updates {
            self.tags[&key].stamp(revision);
            properties.insert(key, value);
        }

        self.entity.stamp(revision);
        self.snapshot = Checkout::new(properties);
        Ok(())
    }

    /// Replace all properties in place.
    ///
    /// Tags of keys that survive are dirtied, tags of dropped keys are dirtied
    /// and retired, and new keys get fresh tags.
    pub fn overwrite(&mut self, properties: Properties) {
        let revision = Revision::bump();

        self.tags.retain(|key, tag| {
            tag.stamp(revision);
            let keep = properties.contains_key(key);
            if !keep {
                tag.retire();
            }
            keep
        });

        for key in properties.keys() {
            if !self.tags.contains_key(key) {
                let tag = Tag::labeled_at(format!("{}.{key}", self.reference), revision);
                self.tags.insert(key.clone(), tag);
            }
        }

        self.entity.stamp(revision);
        self.snapshot = Checkout::new(properties);
    }

    /// Signal the deletion to everything that depends on this entity.
    ///
    /// Dirties the entity and property tags one final time, retires them and
    /// moves every handed-out derived tag to the final revision.
    pub fn mark_deleted(&self) {
        let revision = Revision::bump();
        for tag in self.tags.values() {
            tag.stamp(revision);
            tag.retire();
        }

        self.entity.stamp(revision);
        self.entity.retire();

        let last: TagSet = std::iter::once(self.entity.clone()).collect();
        for computed in self.derived.lock().values() {
            computed.update(last.clone());
        }
    }

    /// The tag dirtied by every write to this entity.
    pub fn entity_tag(&self) -> &Tag {
        &self.entity
    }

    /// The tag of one property.
    pub fn property_tag(&self, key: &str) -> Option<&Tag> {
        self.tags.get(key)
    }

    /// The shared computed tag of a derived value, created on first use.
    pub fn derived_tag(&self, name: &str) -> ComputedTag {
        self.derived.lock().entry(name.into()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Identifier;
    use crate::properties;
    use crate::track::track;

    fn record() -> EntityRecord {
        let reference = EntityRef::new("person", Identifier::generated("tom"));
        let properties = properties! { "name" => "Tom Dale", "city" => "Portland" };
        EntityRecord::new(reference, properties, Revision::bump())
    }

    #[test]
    fn test_patch_isolates_properties() {
        let mut record = record();
        let name = record.property_tag("name").unwrap().value();
        let city = record.property_tag("city").unwrap().value();
        let entity = record.entity_tag().value();

        record.patch(properties! { "name" => "Thomas Dale" }).unwrap();
        assert!(!record.property_tag("name").unwrap().validate(name));
        assert!(record.property_tag("city").unwrap().validate(city));
        assert!(!record.entity_tag().validate(entity));
    }

    #[test]
    fn test_patch_unknown_key_changes_nothing() {
        let mut record = record();
        let before = record.read_properties();
        let entity = record.entity_tag().value();

        let err = record.patch(properties! { "name" => "Tom", "age" => 40 }).unwrap_err();
        assert!(matches!(err, Error::UnknownProperty { ref key, .. } if key == "age"));
        assert!(record.entity_tag().validate(entity));
        assert_eq!(record.read_properties(), before);
    }

    #[test]
    fn test_checkout_is_snapshot() {
        let mut record = record();
        let before = record.read_properties();
        record.patch(properties! { "city" => "Seattle" }).unwrap();
        assert_eq!(before["city"], Value::from("Portland"));
        assert_eq!(record.read_properties()["city"], Value::from("Seattle"));
    }

    #[test]
    fn test_reads_consume() {
        let record = record();
        let (_, consumed) = track(|| record.read_properties());
        assert!(consumed.contains(record.entity_tag()));
        assert_eq!(consumed.len(), 1);

        let (value, consumed) = track(|| record.read_property("name", true));
        assert_eq!(value, Some(Value::from("Tom Dale")));
        assert!(consumed.contains(record.property_tag("name").unwrap()));
        assert!(consumed.contains(record.entity_tag()));

        let (_, consumed) = track(|| record.read_property("name", false));
        assert_eq!(consumed.len(), 1);
    }

    #[test]
    fn test_mark_deleted_moves_derived_tags() {
        let record = record();
        let computed = record.derived_tag("length");
        assert!(computed.ptr_eq(&record.derived_tag("length")));
        let prior = computed.value();

        record.mark_deleted();
        assert!(!computed.validate(prior));
        assert_eq!(computed.value(), record.entity_tag().value());
        assert!(record.entity_tag().is_retired());
        assert!(record.property_tag("name").unwrap().is_retired());
    }

    #[test]
    fn test_overwrite_replaces_tag_set() {
        let mut record = record();
        let city = record.property_tag("city").unwrap().clone();
        let name = record.property_tag("name").unwrap().value();

        record.overwrite(properties! { "name" => "Tom", "email" => "tom@example.com" });
        assert!(city.is_retired());
        assert!(record.property_tag("city").is_none());
        assert!(!record.property_tag("name").unwrap().validate(name));
        assert_eq!(
            record.property_tag("email").unwrap().value(),
            record.entity_tag().value(),
        );
        assert!(record.patch(properties! { "email" => "t@example.com" }).is_ok());
    }
}
