use rustc_hash::FxHashMap;
use slab::Slab;

use crate::error::{Error, Result};
use crate::id::{EntityRef, Identifier};
use crate::record::EntityRecord;
use crate::revision::Revision;
use crate::tag::Tag;
use crate::value::{Checkout, Properties};

/// All entities of one type.
///
/// Records live in a slab, so enumeration order is the slot order: stable for
/// a given set of members but shuffled by deletes and inserts.
pub(crate) struct CollectionIndex {
    /// The entity type's name.
    entity_type: String,
    /// The records, addressed by slot.
    records: Slab<EntityRecord>,
    /// Maps identifiers to slots in `records`.
    index: FxHashMap<Identifier, usize>,
    /// Dirtied whenever membership changes.
    all: Tag,
}

impl CollectionIndex {
    /// Create an empty collection.
    ///
    /// Coming into existence counts as a membership change, so the membership
    /// tag starts out at a fresh revision.
    pub fn new(entity_type: &str) -> Self {
        Self {
            entity_type: entity_type.into(),
            records: Slab::new(),
            index: FxHashMap::default(),
            all: Tag::labeled_at(format!("{entity_type}.*"), Revision::bump()),
        }
    }

    /// Add a new entity.
    pub fn insert(&mut self, id: Identifier, properties: Properties) -> Result<EntityRef> {
        let reference = EntityRef::new(self.entity_type.as_str(), id);
        if self.index.contains_key(reference.id()) {
            return Err(Error::DuplicateKey(reference));
        }

        tracing::debug!(entity = %reference, "inserting");
        let revision = Revision::bump();
        let record = EntityRecord::new(reference.clone(), properties, revision);
        let slot = self.records.insert(record);
        self.index.insert(reference.id().clone(), slot);
        self.all.stamp(revision);
        Ok(reference)
    }

    /// Merge `updates` into a present entity's properties.
    pub fn patch(&mut self, id: &Identifier, updates: Properties) -> Result<()> {
        let record = self.record_mut(id)?;
        tracing::debug!(entity = %record.reference(), keys = updates.len(), "patching");
        record.patch(updates)
    }

    /// Replace a present entity's properties wholesale.
    pub fn overwrite(&mut self, id: &Identifier, properties: Properties) -> Result<()> {
        let record = self.record_mut(id)?;
        tracing::debug!(entity = %record.reference(), "overwriting");
        record.overwrite(properties);
        Ok(())
    }

    /// Remove an entity.
    pub fn delete(&mut self, id: &Identifier) -> Result<()> {
        let Some(slot) = self.index.remove(id) else {
            return Err(Error::NotFound(self.reference(id)));
        };

        let record = self.records.remove(slot);
        tracing::debug!(entity = %record.reference(), "deleting");
        record.mark_deleted();
        self.all.dirty();
        Ok(())
    }

    /// Read an entity's properties, if it is present.
    ///
    /// A miss depends on the membership tag, so a reader that found nothing
    /// is invalidated when the entity shows up.
    pub fn get(&self, id: &Identifier) -> Option<Checkout> {
        match self.record(id) {
            Some(record) => Some(record.read_properties()),
            None => {
                self.all.consume();
                None
            }
        }
    }

    /// The references of all present entities.
    pub fn all(&self) -> Vec<EntityRef> {
        self.all.consume();
        self.records.iter().map(|(_, record)| record.reference().clone()).collect()
    }

    /// The tag dirtied by inserts and deletes.
    pub fn all_tag(&self) -> &Tag {
        &self.all
    }

    /// Look up a present entity's record.
    pub fn record(&self, id: &Identifier) -> Option<&EntityRecord> {
        self.index.get(id).map(|&slot| &self.records[slot])
    }

    /// Look up a present entity's record or fail with `NotFound`.
    pub fn find(&self, id: &Identifier) -> Result<&EntityRecord> {
        self.record(id).ok_or_else(|| Error::NotFound(self.reference(id)))
    }

    fn record_mut(&mut self, id: &Identifier) -> Result<&mut EntityRecord> {
        match self.index.get(id) {
            Some(&slot) => Ok(&mut self.records[slot]),
            None => Err(Error::NotFound(self.reference(id))),
        }
    }

    /// Whether an entity is present. Does not consume anything.
    pub fn contains(&self, id: &Identifier) -> bool {
        self.index.contains_key(id)
    }

    /// The number of present entities. Does not consume anything.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    fn reference(&self, id: &Identifier) -> EntityRef {
        EntityRef::new(self.entity_type.as_str(), id.clone())
    }
}
