//! Fetched batches of operations.

use crate::operation::Operation;

/// An ordered group of operations returned by one fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OplogBatch {
    operations: Vec<Operation>,
    is_last_one: bool,
    is_ready_for_more: bool,
}

impl OplogBatch {
    /// Creates a batch of operations.
    ///
    /// `ready_for_more` tells whether the source can immediately serve
    /// another batch.
    pub fn new(operations: Vec<Operation>, ready_for_more: bool) -> Self {
        Self {
            operations,
            is_last_one: false,
            is_ready_for_more: ready_for_more,
        }
    }

    /// The terminal batch: the log is exhausted.
    pub fn last() -> Self {
        Self {
            operations: Vec::new(),
            is_last_one: true,
            is_ready_for_more: false,
        }
    }

    /// An empty batch from a source with nothing to serve yet.
    pub fn not_ready() -> Self {
        Self::new(Vec::new(), false)
    }

    /// Returns the operations in log order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Consumes the batch, returning its operations.
    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    /// Returns true if this is the terminal batch.
    pub fn is_last_one(&self) -> bool {
        self.is_last_one
    }

    /// Returns true if the source can serve more right away.
    pub fn is_ready_for_more(&self) -> bool {
        self.is_ready_for_more
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the batch carries no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OpTime;

    #[test]
    fn constructors() {
        let last = OplogBatch::last();
        assert!(last.is_last_one());
        assert!(last.is_empty());

        let idle = OplogBatch::not_ready();
        assert!(!idle.is_last_one());
        assert!(!idle.is_ready_for_more());

        let batch = OplogBatch::new(vec![Operation::noop(OpTime::new(1, 1))], true);
        assert_eq!(batch.len(), 1);
        assert!(batch.is_ready_for_more());
        assert_eq!(batch.into_operations().len(), 1);
    }
}
