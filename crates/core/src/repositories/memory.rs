use super::{Store, Tables, Transaction};
use crate::{WorkflowError, WorkflowResult};
use std::sync::{Mutex, MutexGuard};

/// In-memory store.
///
/// A transaction works on a clone of the tables and swaps it in on success, so a failing
/// closure leaves no partial writes behind.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a store with existing tables.
    pub fn with_tables(tables: Tables) -> Self {
        Self {
            tables: Mutex::new(tables),
        }
    }

    fn lock(&self) -> WorkflowResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| WorkflowError::StorePoisoned)
    }
}

impl Store for MemoryStore {
    fn transaction<R>(
        &self,
        f: impl FnOnce(&mut dyn Transaction) -> WorkflowResult<R>,
    ) -> WorkflowResult<R> {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        let out = f(&mut working)?;
        *guard = working;
        Ok(out)
    }

    fn snapshot<R>(
        &self,
        f: impl FnOnce(&mut dyn Transaction) -> WorkflowResult<R>,
    ) -> WorkflowResult<R> {
        let mut copy = self.lock()?.clone();
        f(&mut copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::Record;
    use crate::sample::{Sample, SampleType};
    use chrono::Utc;
    use lab_types::{ExternalRef, NonEmptyText};

    fn sample() -> Sample {
        Sample::new(
            ExternalRef::new("ORD-7").unwrap(),
            NonEmptyText::new("7").unwrap(),
            SampleType::Urine,
            None,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn commit_on_ok() {
        let store = MemoryStore::new();
        let s = sample();
        let id = s.id();

        store.transaction(|tx| tx.samples().insert(s)).unwrap();

        let found = store.snapshot(|tx| Ok(tx.samples().get(id))).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn rollback_on_err() {
        let store = MemoryStore::new();

        let result: WorkflowResult<()> = store.transaction(|tx| {
            tx.samples().insert(sample())?;
            Err(WorkflowError::InvalidInput("abort".into()))
        });
        assert!(result.is_err());

        let count = store
            .snapshot(|tx| Ok(tx.samples().search(&|_| true).len()))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn snapshot_writes_are_discarded() {
        let store = MemoryStore::new();
        store.snapshot(|tx| tx.samples().insert(sample())).unwrap();

        let count = store
            .snapshot(|tx| Ok(tx.samples().search(&|_| true).len()))
            .unwrap();
        assert_eq!(count, 0);
    }
}
