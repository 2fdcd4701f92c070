use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::PhenolinkError;

/// Number of records written per index transaction. Batch boundaries bound
/// memory and transaction size only; callers see no other semantics.
pub const BATCH_SIZE: usize = 10_000;

/// Transactional key→record index keyed by URN. Writes are buffered inside an
/// open batch and become visible atomically on commit; batches never overlap.
pub trait DataIndex {
    fn begin(&mut self) -> Result<(), PhenolinkError>;

    fn commit(&mut self) -> Result<(), PhenolinkError>;

    /// Discard the buffered writes of the open batch and close it. A no-op
    /// when no batch is open, so error paths can call it unconditionally.
    fn rollback(&mut self) -> Result<(), PhenolinkError>;

    fn set(&mut self, key: &str, record: Value) -> Result<(), PhenolinkError>;

    fn get(&self, key: &str) -> Option<&Value>;

    /// Committed keys, in this store's iteration order.
    fn keys(&self) -> Vec<String>;

    /// Committed records, lazily, in the same order as [`DataIndex::keys`].
    fn values(&self) -> Box<dyn Iterator<Item = &Value> + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory index with a stable (sorted) iteration order. The on-disk
/// backends of a portal deployment implement the same trait.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    committed: BTreeMap<String, Value>,
    pending: Vec<(String, Value)>,
    batch_open: bool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataIndex for MemoryIndex {
    fn begin(&mut self) -> Result<(), PhenolinkError> {
        if self.batch_open {
            return Err(PhenolinkError::BatchAlreadyOpen);
        }
        self.batch_open = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), PhenolinkError> {
        if !self.batch_open {
            return Err(PhenolinkError::NoOpenBatch);
        }
        for (key, record) in self.pending.drain(..) {
            self.committed.insert(key, record);
        }
        self.batch_open = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), PhenolinkError> {
        self.pending.clear();
        self.batch_open = false;
        Ok(())
    }

    fn set(&mut self, key: &str, record: Value) -> Result<(), PhenolinkError> {
        if !self.batch_open {
            return Err(PhenolinkError::WriteOutsideBatch);
        }
        self.pending.push((key.to_string(), record));
        Ok(())
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.committed.get(key)
    }

    fn keys(&self) -> Vec<String> {
        self.committed.keys().cloned().collect()
    }

    fn values(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        Box::new(self.committed.values())
    }

    fn len(&self) -> usize {
        self.committed.len()
    }
}
