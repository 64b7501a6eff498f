use std::fmt::{self, Debug, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

/// The process-wide version counter.
///
/// Every dirty event draws a fresh value from here, so stamps are comparable
/// across all tags of all stores in the process.
static COUNTER: AtomicU64 = AtomicU64::new(0);

/// A stamp drawn from the global version counter.
///
/// Revisions only ever grow. The zero revision is the epoch that every tag
/// created before the first dirty event starts out with.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Revision(pub(crate) u64);

impl Revision {
    /// The revision before any dirty event.
    pub const EPOCH: Self = Self(0);

    /// The most recently drawn revision.
    #[inline]
    pub fn current() -> Self {
        Self(COUNTER.load(Ordering::SeqCst))
    }

    /// Draw a fresh revision that is strictly greater than every revision
    /// handed out before.
    #[inline]
    pub(crate) fn bump() -> Self {
        Self(COUNTER.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// The raw counter value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<Revision> for u64 {
    fn from(revision: Revision) -> Self {
        revision.0
    }
}

impl Debug for Revision {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
