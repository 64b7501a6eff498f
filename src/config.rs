/// Policies of a [`Store`](crate::Store).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Whether reading a single property also consumes that property's tag.
    ///
    /// The entity tag is consumed either way.
    pub track_property_reads: bool,
    /// What inserting a singleton that is already present does.
    pub singleton_reinsert: SingletonReinsert,
}

impl Config {
    /// Set whether single-property reads consume the property's tag.
    pub fn track_property_reads(mut self, enabled: bool) -> Self {
        self.track_property_reads = enabled;
        self
    }

    /// Set the singleton re-insert policy.
    pub fn singleton_reinsert(mut self, policy: SingletonReinsert) -> Self {
        self.singleton_reinsert = policy;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            track_property_reads: true,
            singleton_reinsert: SingletonReinsert::Overwrite,
        }
    }
}

/// What happens when a present singleton is inserted again.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SingletonReinsert {
    /// Replace the properties in place, dirtying every tag involved.
    #[default]
    Overwrite,
    /// Fail with [`Error::DuplicateKey`](crate::Error::DuplicateKey).
    Reject,
}
