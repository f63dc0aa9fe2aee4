//! Per-session apply options.

/// Options passed into every apply call.
///
/// `treat_update_as_upsert` is set during bulk catch-up replication, where
/// the target document of an update may legitimately not exist yet. It
/// turns update misses into upserts and makes delete misses worth an info
/// log; it never changes how inserts are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplierContext {
    treat_update_as_upsert: bool,
}

impl ApplierContext {
    /// Creates a context.
    pub const fn new(treat_update_as_upsert: bool) -> Self {
        Self {
            treat_update_as_upsert,
        }
    }

    /// Returns true if non-matching updates become upserts.
    pub const fn treat_update_as_upsert(&self) -> bool {
        self.treat_update_as_upsert
    }
}
