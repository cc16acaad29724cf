//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the workflow
//! service. Nothing in the core reads environment variables while handling a request; the
//! binaries read raw values and hand them to the parsing helpers below.
//!
//! This is also where the registry of enabled analysis process kinds lives. A deployment
//! that does not run, say, immunoassays disables that kind here; the completion aggregator
//! and the process creation gate consult the registry instead of probing for the kind on
//! every call.

use crate::constants::{DEFAULT_DATA_DIR, LIST_SEPARATOR, STORE_FILENAME};
use crate::process::ProcessKind;
use crate::{WorkflowError, WorkflowResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where workflow records are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local tables, lost on exit.
    Memory,
    /// One JSON document under the data directory.
    JsonFile,
}

impl FromStr for StoreBackend {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(StoreBackend::Memory),
            "json" | "json_file" => Ok(StoreBackend::JsonFile),
            other => Err(WorkflowError::InvalidInput(format!(
                "unknown store backend '{other}' (expected 'memory' or 'json')"
            ))),
        }
    }
}

/// The set of analysis process kinds this deployment runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnabledProcesses(BTreeSet<ProcessKind>);

impl EnabledProcesses {
    /// Every process kind enabled.
    pub fn all() -> Self {
        Self(ProcessKind::ALL.iter().copied().collect())
    }

    /// Builds a registry from an explicit list.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidInput`] if `kinds` is empty: a workflow with no
    /// analysis kinds could never auto-complete a sample.
    pub fn from_kinds(kinds: impl IntoIterator<Item = ProcessKind>) -> WorkflowResult<Self> {
        let set: BTreeSet<ProcessKind> = kinds.into_iter().collect();
        if set.is_empty() {
            return Err(WorkflowError::InvalidInput(
                "at least one process kind must be enabled".into(),
            ));
        }
        Ok(Self(set))
    }

    pub fn contains(&self, kind: ProcessKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = ProcessKind> + '_ {
        self.0.iter().copied()
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    orders_file: Option<PathBuf>,
    store_backend: StoreBackend,
    enabled_processes: EnabledProcesses,
    auto_complete_samples: bool,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(
        data_dir: PathBuf,
        orders_file: Option<PathBuf>,
        store_backend: StoreBackend,
        enabled_processes: EnabledProcesses,
        auto_complete_samples: bool,
    ) -> WorkflowResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(WorkflowError::InvalidInput(
                "data_dir cannot be empty".into(),
            ));
        }

        Ok(Self {
            data_dir,
            orders_file,
            store_backend,
            enabled_processes,
            auto_complete_samples,
        })
    }

    /// In-memory configuration with every process kind enabled and manual sample
    /// completion.
    pub fn ephemeral() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            orders_file: None,
            store_backend: StoreBackend::Memory,
            enabled_processes: EnabledProcesses::all(),
            auto_complete_samples: false,
        }
    }

    /// Returns a copy with automatic sample completion switched on or off.
    pub fn with_auto_complete(mut self, enabled: bool) -> Self {
        self.auto_complete_samples = enabled;
        self
    }

    /// Returns a copy with a different process registry.
    pub fn with_enabled_processes(mut self, enabled: EnabledProcesses) -> Self {
        self.enabled_processes = enabled;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the JSON store document.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILENAME)
    }

    pub fn orders_file(&self) -> Option<&Path> {
        self.orders_file.as_deref()
    }

    pub fn store_backend(&self) -> StoreBackend {
        self.store_backend
    }

    pub fn enabled_processes(&self) -> &EnabledProcesses {
        &self.enabled_processes
    }

    pub fn auto_complete_samples(&self) -> bool {
        self.auto_complete_samples
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the enabled process kinds from an optional comma separated value.
///
/// If `value` is `None` or empty/whitespace, every kind is enabled.
pub fn enabled_processes_from_env_value(value: Option<String>) -> WorkflowResult<EnabledProcesses> {
    match non_blank(value) {
        None => Ok(EnabledProcesses::all()),
        Some(list) => {
            let kinds = list
                .split(LIST_SEPARATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ProcessKind::from_str)
                .collect::<WorkflowResult<Vec<_>>>()?;
            EnabledProcesses::from_kinds(kinds)
        }
    }
}

/// Parse a boolean switch. Accepts `1/0`, `true/false`, `yes/no`, `on/off`.
///
/// If `value` is `None` or empty/whitespace, returns `default`.
pub fn bool_from_env_value(name: &str, value: Option<String>, default: bool) -> WorkflowResult<bool> {
    match non_blank(value).map(|v| v.to_ascii_lowercase()).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(WorkflowError::InvalidInput(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}

/// Parse the store backend. Defaults to the JSON file store.
pub fn store_backend_from_env_value(value: Option<String>) -> WorkflowResult<StoreBackend> {
    non_blank(value)
        .map(|v| v.parse::<StoreBackend>())
        .transpose()
        .map(|backend| backend.unwrap_or(StoreBackend::JsonFile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_processes_default_to_all() {
        let enabled = enabled_processes_from_env_value(None).unwrap();
        assert_eq!(enabled, EnabledProcesses::all());

        let blank = enabled_processes_from_env_value(Some("  ".into())).unwrap();
        assert_eq!(blank, EnabledProcesses::all());
    }

    #[test]
    fn enabled_processes_parse_list() {
        let enabled =
            enabled_processes_from_env_value(Some("histopathology, immunoassay".into())).unwrap();

        assert!(enabled.contains(ProcessKind::Histopathology));
        assert!(enabled.contains(ProcessKind::Immunoassay));
        assert!(!enabled.contains(ProcessKind::Molecular));
    }

    #[test]
    fn enabled_processes_reject_unknown_kind() {
        let err = enabled_processes_from_env_value(Some("molecular,serology".into())).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
    }

    #[test]
    fn enabled_processes_reject_empty_registry() {
        assert!(EnabledProcesses::from_kinds([]).is_err());
        assert!(enabled_processes_from_env_value(Some(",,".into())).is_err());
    }

    #[test]
    fn bool_values() {
        assert!(bool_from_env_value("X", Some("Yes".into()), false).unwrap());
        assert!(!bool_from_env_value("X", Some("off".into()), true).unwrap());
        assert!(bool_from_env_value("X", None, true).unwrap());
        assert!(bool_from_env_value("X", Some("maybe".into()), false).is_err());
    }

    #[test]
    fn store_backend_values() {
        assert_eq!(
            store_backend_from_env_value(None).unwrap(),
            StoreBackend::JsonFile
        );
        assert_eq!(
            store_backend_from_env_value(Some("memory".into())).unwrap(),
            StoreBackend::Memory
        );
        assert!(store_backend_from_env_value(Some("postgres".into())).is_err());
    }

    #[test]
    fn config_rejects_empty_data_dir() {
        let result = CoreConfig::new(
            PathBuf::new(),
            None,
            StoreBackend::Memory,
            EnabledProcesses::all(),
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn store_path_is_under_data_dir() {
        let cfg = CoreConfig::new(
            PathBuf::from("/srv/lab"),
            None,
            StoreBackend::JsonFile,
            EnabledProcesses::all(),
            false,
        )
        .unwrap();
        assert_eq!(cfg.store_path(), PathBuf::from("/srv/lab/workflow.json"));
    }
}
