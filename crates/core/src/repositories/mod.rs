//! Record storage.
//!
//! Records live in per-kind [`Repository`] collections. All reads and writes go through a
//! [`Store`], which hands the caller a [`Transaction`] over every collection at once and
//! commits the caller's changes only if the closure returns `Ok`. Transactions on one store
//! are serialized, which is what makes the check-then-insert sequences in the workflow
//! service safe against concurrent callers.
//!
//! Two backends are provided:
//!
//! - [`MemoryStore`]: process-local, lost on exit. Used by tests and ephemeral deployments.
//! - [`JsonFileStore`]: one JSON document on disk, replaced atomically on each commit.

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use crate::config::{CoreConfig, StoreBackend};
use crate::process::{HistopathologyProcess, ImmunoassayProcess, MolecularProcess};
use crate::sample::Sample;
use crate::{WorkflowError, WorkflowResult};
use lab_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kinds of record the workflow deals with. Used in error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Sample,
    LabTestOrder,
    MolecularProcess,
    HistopathologyProcess,
    ImmunoassayProcess,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::Sample => "sample",
            RecordKind::LabTestOrder => "lab test order",
            RecordKind::MolecularProcess => "molecular process",
            RecordKind::HistopathologyProcess => "histopathology process",
            RecordKind::ImmunoassayProcess => "immunoassay process",
        })
    }
}

/// A stored record, addressed by its [`RecordId`].
pub trait Record: Clone + Send + 'static {
    const RECORD_KIND: RecordKind;

    fn id(&self) -> RecordId;
}

/// One collection of records of the same kind.
///
/// Reads return owned copies so a caller can hold them while mutating other collections in
/// the same transaction.
pub trait Repository<T: Record> {
    /// Adds a new record.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` if a record with the same id already exists.
    fn insert(&mut self, record: T) -> WorkflowResult<()>;

    fn get(&self, id: RecordId) -> Option<T>;

    /// Replaces an existing record.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::NotFound` if no record with that id exists.
    fn update(&mut self, record: T) -> WorkflowResult<()>;

    fn search(&self, predicate: &dyn Fn(&T) -> bool) -> Vec<T>;

    /// Removes every matching record and returns how many went.
    fn delete_where(&mut self, predicate: &dyn Fn(&T) -> bool) -> usize;

    /// Fetches a record or fails with `NotFound`.
    fn require(&self, id: RecordId) -> WorkflowResult<T> {
        self.get(id)
            .ok_or_else(|| WorkflowError::not_found(T::RECORD_KIND, id))
    }
}

impl<T: Record> Repository<T> for BTreeMap<RecordId, T> {
    fn insert(&mut self, record: T) -> WorkflowResult<()> {
        let id = record.id();
        if self.contains_key(&id) {
            return Err(WorkflowError::InvalidInput(format!(
                "{} {id} already exists",
                T::RECORD_KIND
            )));
        }
        BTreeMap::insert(self, id, record);
        Ok(())
    }

    fn get(&self, id: RecordId) -> Option<T> {
        BTreeMap::get(self, &id).cloned()
    }

    fn update(&mut self, record: T) -> WorkflowResult<()> {
        match BTreeMap::get_mut(self, &record.id()) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(WorkflowError::not_found(T::RECORD_KIND, record.id())),
        }
    }

    fn search(&self, predicate: &dyn Fn(&T) -> bool) -> Vec<T> {
        self.values().filter(|r| predicate(r)).cloned().collect()
    }

    fn delete_where(&mut self, predicate: &dyn Fn(&T) -> bool) -> usize {
        let before = self.len();
        self.retain(|_, r| !predicate(r));
        before - self.len()
    }
}

/// Access to every collection inside one store transaction.
pub trait Transaction {
    fn samples(&mut self) -> &mut dyn Repository<Sample>;
    fn molecular(&mut self) -> &mut dyn Repository<MolecularProcess>;
    fn histopathology(&mut self) -> &mut dyn Repository<HistopathologyProcess>;
    fn immunoassay(&mut self) -> &mut dyn Repository<ImmunoassayProcess>;
}

/// The full contents of a store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    pub samples: BTreeMap<RecordId, Sample>,
    pub molecular: BTreeMap<RecordId, MolecularProcess>,
    pub histopathology: BTreeMap<RecordId, HistopathologyProcess>,
    pub immunoassay: BTreeMap<RecordId, ImmunoassayProcess>,
}

impl Transaction for Tables {
    fn samples(&mut self) -> &mut dyn Repository<Sample> {
        &mut self.samples
    }

    fn molecular(&mut self) -> &mut dyn Repository<MolecularProcess> {
        &mut self.molecular
    }

    fn histopathology(&mut self) -> &mut dyn Repository<HistopathologyProcess> {
        &mut self.histopathology
    }

    fn immunoassay(&mut self) -> &mut dyn Repository<ImmunoassayProcess> {
        &mut self.immunoassay
    }
}

/// Transactional record store.
pub trait Store: Send + Sync {
    /// Runs `f` against the store. Changes are committed only if `f` returns `Ok`; on `Err`
    /// the store is left exactly as it was.
    ///
    /// Transactions on the same store never interleave.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or a storage error if the commit fails.
    fn transaction<R>(
        &self,
        f: impl FnOnce(&mut dyn Transaction) -> WorkflowResult<R>,
    ) -> WorkflowResult<R>;

    /// Runs `f` against a copy of the store. Nothing `f` does is kept.
    fn snapshot<R>(
        &self,
        f: impl FnOnce(&mut dyn Transaction) -> WorkflowResult<R>,
    ) -> WorkflowResult<R>;
}

/// Store selected at runtime from [`CoreConfig::store_backend`].
#[derive(Debug)]
pub enum AnyStore {
    Memory(MemoryStore),
    JsonFile(JsonFileStore),
}

impl AnyStore {
    pub fn from_config(cfg: &CoreConfig) -> Self {
        match cfg.store_backend() {
            StoreBackend::Memory => AnyStore::Memory(MemoryStore::new()),
            StoreBackend::JsonFile => AnyStore::JsonFile(JsonFileStore::new(cfg.store_path())),
        }
    }
}

impl Store for AnyStore {
    fn transaction<R>(
        &self,
        f: impl FnOnce(&mut dyn Transaction) -> WorkflowResult<R>,
    ) -> WorkflowResult<R> {
        match self {
            AnyStore::Memory(store) => store.transaction(f),
            AnyStore::JsonFile(store) => store.transaction(f),
        }
    }

    fn snapshot<R>(
        &self,
        f: impl FnOnce(&mut dyn Transaction) -> WorkflowResult<R>,
    ) -> WorkflowResult<R> {
        match self {
            AnyStore::Memory(store) => store.snapshot(f),
            AnyStore::JsonFile(store) => store.snapshot(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleType;
    use chrono::Utc;
    use lab_types::{ExternalRef, NonEmptyText};

    fn sample(order: &str) -> Sample {
        Sample::new(
            ExternalRef::new(order).unwrap(),
            NonEmptyText::new("42").unwrap(),
            SampleType::Blood,
            None,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn insert_get_update() {
        let mut repo: BTreeMap<RecordId, Sample> = BTreeMap::new();
        let mut s = sample("ORD-1");
        Repository::insert(&mut repo, s.clone()).unwrap();

        assert_eq!(Repository::get(&repo, s.id()), Some(s.clone()));
        assert!(Repository::insert(&mut repo, s.clone()).is_err());

        s.notes = Some("haemolysed".into());
        Repository::update(&mut repo, s.clone()).unwrap();
        assert_eq!(
            Repository::get(&repo, s.id()).unwrap().notes.as_deref(),
            Some("haemolysed")
        );
    }

    #[test]
    fn update_missing_is_not_found() {
        let mut repo: BTreeMap<RecordId, Sample> = BTreeMap::new();
        let err = Repository::update(&mut repo, sample("ORD-1")).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::NotFound {
                kind: RecordKind::Sample,
                ..
            }
        ));
        assert!(Repository::require(&repo, RecordId::new()).is_err());
    }

    #[test]
    fn search_and_delete_where() {
        let mut repo: BTreeMap<RecordId, Sample> = BTreeMap::new();
        for order in ["ORD-1", "ORD-2", "ORD-1"] {
            Repository::insert(&mut repo, sample(order)).unwrap();
        }

        let hits = repo.search(&|s: &Sample| s.lab_test().as_str() == "ORD-1");
        assert_eq!(hits.len(), 2);

        let removed = repo.delete_where(&|s: &Sample| s.lab_test().as_str() == "ORD-1");
        assert_eq!(removed, 2);
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn any_store_follows_config() {
        let store = AnyStore::from_config(&CoreConfig::ephemeral());
        assert!(matches!(store, AnyStore::Memory(_)));
    }
}
