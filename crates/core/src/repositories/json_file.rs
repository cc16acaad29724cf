use super::{Store, Tables, Transaction};
use crate::constants::{STORE_LOCK_SUFFIX, STORE_TMP_SUFFIX};
use crate::{WorkflowError, WorkflowResult};
use fd_lock::RwLock;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Store backed by a single JSON document.
///
/// Each transaction reloads the document, runs the closure and, on success, writes the new
/// contents to a sibling temporary file before renaming it over the original. A crash
/// mid-write leaves the previous document intact.
///
/// Transactions hold an exclusive lock on a sibling `.lock` file from load to save, and
/// snapshots a shared one, so every handle on the same document is serialised, whether it
/// lives in this process or another (the CLI next to a running server).
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".");
        lock_path.push(STORE_LOCK_SUFFIX);
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn open_lock(&self) -> std::io::Result<RwLock<File>> {
        self.ensure_parent()?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_path)?;
        Ok(RwLock::new(file))
    }

    fn ensure_parent(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn load(&self) -> WorkflowResult<Tables> {
        if !self.path.exists() {
            return Ok(Tables::default());
        }
        let raw = fs::read_to_string(&self.path).map_err(WorkflowError::FileRead)?;
        if raw.trim().is_empty() {
            return Ok(Tables::default());
        }
        serde_json::from_str(&raw).map_err(WorkflowError::Deserialization)
    }

    fn save(&self, tables: &Tables) -> WorkflowResult<()> {
        let body = serde_json::to_string_pretty(tables).map_err(WorkflowError::Serialization)?;
        let tmp = self.path.with_extension(STORE_TMP_SUFFIX);
        fs::write(&tmp, body).map_err(WorkflowError::FileWrite)?;
        fs::rename(&tmp, &self.path).map_err(WorkflowError::FileWrite)?;

        tracing::debug!("workflow store written to {}", self.path.display());
        Ok(())
    }
}

impl Store for JsonFileStore {
    fn transaction<R>(
        &self,
        f: impl FnOnce(&mut dyn Transaction) -> WorkflowResult<R>,
    ) -> WorkflowResult<R> {
        let mut lock = self.open_lock().map_err(WorkflowError::FileWrite)?;
        let _guard = lock.write().map_err(WorkflowError::FileWrite)?;

        let mut tables = self.load()?;
        let out = f(&mut tables)?;
        self.save(&tables)?;
        Ok(out)
    }

    fn snapshot<R>(
        &self,
        f: impl FnOnce(&mut dyn Transaction) -> WorkflowResult<R>,
    ) -> WorkflowResult<R> {
        let mut tables = {
            let lock = self.open_lock().map_err(WorkflowError::FileRead)?;
            let _guard = lock.read().map_err(WorkflowError::FileRead)?;
            self.load()?
        };
        f(&mut tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::Record;
    use crate::sample::{Sample, SampleType};
    use chrono::Utc;
    use lab_types::{ExternalRef, NonEmptyText};
    use tempfile::TempDir;

    fn sample() -> Sample {
        Sample::new(
            ExternalRef::new("ORD-9").unwrap(),
            NonEmptyText::new("9").unwrap(),
            SampleType::Saliva,
            None,
            Some("fasting".into()),
            Utc::now(),
        )
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("workflow.json"));

        let count = store
            .snapshot(|tx| Ok(tx.samples().search(&|_| true).len()))
            .unwrap();
        assert_eq!(count, 0);
        assert!(!store.path().exists());
    }

    #[test]
    fn committed_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("workflow.json");
        let s = sample();
        let id = s.id();

        JsonFileStore::new(path.clone())
            .transaction(|tx| tx.samples().insert(s.clone()))
            .unwrap();
        assert!(path.exists());
        assert!(!path.with_extension(STORE_TMP_SUFFIX).exists());

        let reopened = JsonFileStore::new(path);
        let loaded = reopened.snapshot(|tx| tx.samples().require(id)).unwrap();
        assert_eq!(loaded, s);
    }

    #[test]
    fn failed_transaction_does_not_touch_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("workflow.json");
        let store = JsonFileStore::new(path.clone());

        let result: WorkflowResult<()> = store.transaction(|tx| {
            tx.samples().insert(sample())?;
            Err(WorkflowError::MissingRequiredField { field: "anything" })
        });

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn handles_on_one_document_do_not_lose_writes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("workflow.json");
        let stores = [JsonFileStore::new(path.clone()), JsonFileStore::new(path.clone())];
        let per_store = 20;

        std::thread::scope(|scope| {
            for store in &stores {
                scope.spawn(move || {
                    for _ in 0..per_store {
                        store.transaction(|tx| tx.samples().insert(sample())).unwrap();
                    }
                });
            }
        });

        let count = JsonFileStore::new(path)
            .snapshot(|tx| Ok(tx.samples().search(&|_| true).len()))
            .unwrap();
        assert_eq!(count, 2 * per_store);
        assert!(stores[0].lock_path().ends_with("workflow.json.lock"));
    }

    #[test]
    fn corrupt_document_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("workflow.json");
        fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::new(path)
            .snapshot(|tx| Ok(tx.samples().search(&|_| true).len()))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Deserialization(_)));
    }
}
