use std::fmt::{self, Debug, Formatter};

use crate::error::Result;
use crate::id::EntityRef;
use crate::revision::Revision;
use crate::store::Store;
use crate::tag::ComputedTag;
use crate::track::track;
use crate::value::Value;

/// A derived value or query result paired with its computed tag.
///
/// Nothing is cached: [`value`](Self::value) re-runs the computation each
/// time and refreshes the tag with whatever the run consumed. The tag itself
/// can be checked at any time without running anything.
///
/// Handles for the same entity and name (or the same query and arguments)
/// share one tag.
#[derive(Clone)]
pub struct DerivedValue {
    computation: Computation,
    tag: ComputedTag,
}

/// A query result paired with its computed tag.
pub type QueryValue = DerivedValue;

/// What a derived value computes.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub(crate) enum Computation {
    /// A named derived value of one entity.
    Entity { reference: EntityRef, name: String },
    /// A named query with arguments.
    Query { name: String, args: Vec<Value> },
}

impl DerivedValue {
    pub(crate) fn new(computation: Computation, tag: ComputedTag) -> Self {
        Self { computation, tag }
    }

    /// Run the computation and refresh the tag.
    ///
    /// When called inside another tracked computation, everything this one
    /// consumed becomes a dependency of the outer one as well. A failed run
    /// leaves the tag untouched.
    pub fn value(&self, store: &Store) -> Result<Value> {
        let (output, consumed) = track(|| store.evaluate(&self.computation));

        #[cfg(feature = "testing")]
        crate::testing::register_evaluation();

        if output.is_ok() {
            tracing::trace!(
                computation = ?self.computation,
                consumed = consumed.len(),
                "evaluated",
            );
            self.tag.update(consumed);
        }

        output
    }

    /// The computed tag.
    pub fn tag(&self) -> &ComputedTag {
        &self.tag
    }

    /// The tag's revision as of the last evaluation.
    pub fn revision(&self) -> Revision {
        self.tag.value()
    }

    /// Whether the last evaluation left the tag at `prior`.
    pub fn validate(&self, prior: Revision) -> bool {
        self.tag.validate(prior)
    }
}

impl Debug for DerivedValue {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.computation {
            Computation::Entity { reference, name } => {
                write!(f, "DerivedValue({reference}.{name} @ {:?})", self.revision())
            }
            Computation::Query { name, args } => {
                write!(f, "QueryValue({name}{args:?} @ {:?})", self.revision())
            }
        }
    }
}
