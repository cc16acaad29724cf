//! Constants used throughout the lab workflow core.
//!
//! Path, filename and default values live here so the binaries and the stores agree on
//! them.

/// Default directory for workflow data when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "lab_data";

/// Filename of the JSON document holding every workflow table.
pub const STORE_FILENAME: &str = "workflow.json";

/// Suffix of the temporary file written before the store document is atomically replaced.
pub const STORE_TMP_SUFFIX: &str = "tmp";

/// Suffix of the lock file guarding the JSON store across processes.
pub const STORE_LOCK_SUFFIX: &str = "lock";

/// Separator for list-valued environment settings (for example enabled process kinds).
pub const LIST_SEPARATOR: char = ',';
