//! An in-memory entity store with implicit, fine-grained revision tracking.
//!
//! Register entity types, insert, patch and delete entities, and compute derived
//! values and queries over them. Every entity, every property, every derived
//! value and every collection enumeration carries a [`Tag`] whose revision only
//! grows. Computations never declare their dependencies: whatever they read
//! while running becomes a dependency of their [`ComputedTag`], including reads
//! of other entities reached through references.
//!
//! ```
//! use tagstore::{Schema, Store, Value, properties};
//!
//! let mut store = Store::new();
//! store.register(Schema::new("person").derived("length", |person, _| {
//!     let name = person.field::<String>("name").unwrap_or_default();
//!     Ok(Value::from(name.len()))
//! }))?;
//!
//! let tom = store.insert("person", properties! { "name" => "Tom Dale" })?;
//! let length = store.derived(&tom, "length")?;
//! assert_eq!(length.value(&store)?, Value::Int(8));
//! let seen = length.revision();
//!
//! store.patch(&tom, properties! { "name" => "Thomas Dale" })?;
//! assert_eq!(length.value(&store)?, Value::Int(11));
//! assert!(!length.validate(seen));
//! # Ok::<(), tagstore::Error>(())
//! ```
//!
//! Derived values are not cached. A [`ComputedTag`] only moves when its
//! computation runs again; holding on to a [`Revision`] and validating it later is
//! how a consumer decides whether its own copy of a result is still current.

extern crate self as tagstore;

mod collection;
mod config;
mod derived;
mod entity;
mod error;
mod id;
mod record;
mod revision;
mod schema;
mod shared;
mod store;
mod tag;
#[cfg(feature = "testing")]
mod testing;
mod track;
mod value;

pub use crate::config::{Config, SingletonReinsert};
pub use crate::derived::{DerivedValue, QueryValue};
pub use crate::entity::Entity;
pub use crate::error::{Error, Result};
pub use crate::id::{EntityRef, Identifier, KeyStrategy};
pub use crate::revision::Revision;
pub use crate::schema::{DerivedFn, QueryFn, Schema};
pub use crate::shared::SharedStore;
pub use crate::store::Store;
pub use crate::tag::{ComputedTag, Tag, TagSet};
pub use crate::track::{is_tracking, track, untracked};
pub use crate::value::{Checkout, FromValue, Properties, Value};

#[cfg(feature = "macros")]
pub use tagstore_macros::Entity;

/// These are implementation details. Do not rely on them!
#[doc(hidden)]
pub mod internal {
    pub use crate::entity::field;

    #[cfg(feature = "testing")]
    pub use crate::testing::evaluations;
}
