use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::revision::Revision;
use crate::track;

/// A mutable version marker.
///
/// A tag holds the revision of its most recent [dirty](Self::dirty) event.
/// Writers dirty it, readers [consume](Self::consume) it while a tracked
/// computation is running, and anybody holding an earlier stamp can
/// [validate](Self::validate) it in constant time.
///
/// Tags are cheap handles: cloning one yields another handle to the same
/// marker.
#[derive(Clone)]
pub struct Tag(Arc<TagInner>);

struct TagInner {
    /// The raw value of the most recent revision.
    stamp: AtomicU64,
    /// Set once the entity the tag belongs to was deleted.
    retired: AtomicBool,
    /// Names the tracked thing in diagnostics.
    label: Option<Box<str>>,
}

impl Tag {
    /// Create a tag stamped with the current revision.
    pub fn new() -> Self {
        Self::with_label(None)
    }

    /// Create a tag that carries a label in its debug output.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self::with_label(Some(label.into().into_boxed_str()))
    }

    /// Create a labeled tag stamped with an already drawn revision.
    pub(crate) fn labeled_at(label: impl Into<String>, revision: Revision) -> Self {
        let tag = Self::labeled(label);
        tag.0.stamp.store(revision.get(), Ordering::SeqCst);
        tag
    }

    fn with_label(label: Option<Box<str>>) -> Self {
        Self(Arc::new(TagInner {
            stamp: AtomicU64::new(Revision::current().get()),
            retired: AtomicBool::new(false),
            label,
        }))
    }

    /// The revision of the most recent dirty event.
    ///
    /// Reading the value does not count as a dependency.
    #[inline]
    pub fn value(&self) -> Revision {
        Revision(self.0.stamp.load(Ordering::SeqCst))
    }

    /// Whether nothing happened to the tag since `prior` was captured.
    #[inline]
    pub fn validate(&self, prior: Revision) -> bool {
        self.value() == prior
    }

    /// Draw a fresh revision and stamp it onto the tag.
    pub fn dirty(&self) -> Revision {
        let revision = Revision::bump();
        self.stamp(revision);
        revision
    }

    /// Stamp an already drawn revision onto the tag.
    ///
    /// Used to give all tags touched by one write the same revision. The
    /// stamp never moves backwards, even when threads dirty the same tag
    /// concurrently and their stores land out of order.
    pub(crate) fn stamp(&self, revision: Revision) {
        if self.is_retired() {
            tracing::warn!(tag = ?self, "dirtying a tag of a deleted entity");
        }
        self.0.stamp.fetch_max(revision.get(), Ordering::SeqCst);
        tracing::trace!(tag = ?self, %revision, "dirtied");
    }

    /// Register the tag as a dependency of the running tracked computation.
    ///
    /// Does nothing when no computation is being tracked.
    pub fn consume(&self) {
        if self.is_retired() {
            tracing::warn!(tag = ?self, "consuming a tag of a deleted entity");
        }
        track::consume(self);
    }

    /// Mark the tag as belonging to a deleted entity.
    pub(crate) fn retire(&self) {
        self.0.retired.store(true, Ordering::SeqCst);
    }

    /// Whether the entity the tag belongs to was deleted.
    pub fn is_retired(&self) -> bool {
        self.0.retired.load(Ordering::SeqCst)
    }

    /// Whether two handles point to the same tag.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity used for deduplication.
    #[inline]
    fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Tag {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.0.label {
            Some(label) => write!(f, "Tag({label} @ {:?})", self.value()),
            None => write!(f, "Tag({:?})", self.value()),
        }
    }
}

/// A version marker derived from the tags a computation consumed.
///
/// The value of a computed tag is the maximum over its children at the time
/// of the last [update](Self::update). It never polls its children on its
/// own: the set of children may differ from one evaluation to the next, so
/// the computation has to be re-run to refresh the tag.
#[derive(Clone, Default)]
pub struct ComputedTag(Arc<Mutex<Computed>>);

#[derive(Default)]
struct Computed {
    stamp: Revision,
    children: TagSet,
}

impl ComputedTag {
    /// Create a computed tag without children at the epoch revision.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the children and recompute the maximum.
    pub fn update(&self, children: TagSet) {
        let mut inner = self.0.lock();
        inner.stamp = children.max();
        inner.children = children;
    }

    /// The maximum child revision as of the last update.
    #[inline]
    pub fn value(&self) -> Revision {
        self.0.lock().stamp
    }

    /// Whether the last update produced the same revision as `prior`.
    #[inline]
    pub fn validate(&self, prior: Revision) -> bool {
        self.value() == prior
    }

    /// Consume every child captured during the last update.
    ///
    /// This lets an outer computation depend on whatever this one depended
    /// on without re-running it.
    pub fn consume(&self) {
        let children = self.children();
        for tag in children.iter() {
            tag.consume();
        }
    }

    /// The children captured during the last update.
    pub fn children(&self) -> TagSet {
        self.0.lock().children.clone()
    }

    /// Whether two handles point to the same computed tag.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A handle that does not keep the tag alive.
    pub(crate) fn downgrade(&self) -> WeakComputedTag {
        WeakComputedTag(Arc::downgrade(&self.0))
    }
}

/// A non-owning handle to a [`ComputedTag`].
pub(crate) struct WeakComputedTag(Weak<Mutex<Computed>>);

impl WeakComputedTag {
    /// The tag, if any strong handle is still around.
    pub fn upgrade(&self) -> Option<ComputedTag> {
        self.0.upgrade().map(ComputedTag)
    }

    /// Whether any strong handle is still around.
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl Debug for ComputedTag {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let inner = self.0.lock();
        write!(f, "ComputedTag({:?}, {} children)", inner.stamp, inner.children.len())
    }
}

/// A deduplicated, insertion-ordered set of tags.
#[derive(Clone, Default)]
pub struct TagSet {
    /// The tags in order of first insertion.
    vec: Vec<Tag>,
    /// Identities of the tags in `vec`.
    seen: FxHashSet<usize>,
}

impl TagSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag.
    ///
    /// Returns false if the tag was already part of the set.
    pub fn insert(&mut self, tag: Tag) -> bool {
        if self.seen.insert(tag.key()) {
            self.vec.push(tag);
            true
        } else {
            false
        }
    }

    /// Insert all tags of another set.
    pub fn join(&mut self, other: TagSet) {
        for tag in other.vec {
            self.insert(tag);
        }
    }

    /// Whether the set contains the given tag.
    pub fn contains(&self, tag: &Tag) -> bool {
        self.seen.contains(&tag.key())
    }

    /// The maximum revision over all tags, or the epoch for an empty set.
    pub fn max(&self) -> Revision {
        self.vec.iter().map(Tag::value).max().unwrap_or_default()
    }

    /// Iterate over the tags in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.vec.iter()
    }

    /// The number of distinct tags.
    pub fn len(&self) -> usize {
        self.vec.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }
}

impl Debug for TagSet {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_set().entries(&self.vec).finish()
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let mut set = Self::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.vec.iter()
    }
}
