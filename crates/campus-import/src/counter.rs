//! Disambiguation counter store.
//!
//! Maps a counter key (attribute name plus evaluated scheme prefix) to the
//! next integer to allocate. Allocation is append-only: once a suffix is
//! handed out for a prefix it is never reused, even if the owning record is
//! later deleted, so recreated entities never collide with identifiers a
//! downstream system may still hold.
//!
//! The store is run-scoped by default; with a backing file it becomes a
//! durable key-to-integer table surviving process restarts, for attributes
//! that must stay globally unique across runs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ImportError, ImportResult};
use crate::scheme::CounterMode;

/// Prefix -> allocation-count table with optional file persistence.
#[derive(Debug, Clone, Default)]
pub struct CounterStore {
    counters: HashMap<String, u32>,
    path: Option<PathBuf>,
}

impl CounterStore {
    /// Create a run-scoped store, reset each run.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load a durable store from a JSON file.
    ///
    /// A missing file yields an empty store; the file is created on
    /// [`persist`](Self::persist).
    pub fn load(path: impl AsRef<Path>) -> ImportResult<Self> {
        let path = path.as_ref();
        let counters = if path.exists() {
            let data = fs::read_to_string(path)?;
            serde_json::from_str(&data).map_err(|e| {
                ImportError::configuration(format!(
                    "counter file {} is not a valid key/integer table: {e}",
                    path.display()
                ))
            })?
        } else {
            HashMap::new()
        };
        Ok(Self {
            counters,
            path: Some(path.to_path_buf()),
        })
    }

    /// Allocate the next suffix for a prefix.
    ///
    /// `Always` suffixes every allocation starting at 1; `FromSecond(n)`
    /// leaves the first claimant unsuffixed and numbers later claimants
    /// from `n` upward.
    pub fn allocate(&mut self, prefix: &str, mode: CounterMode) -> String {
        let count = self.counters.entry(prefix.to_string()).or_insert(0);
        *count += 1;
        let n = *count;
        debug!(prefix = %prefix, allocation = n, "counter allocated");
        match mode {
            CounterMode::Always => n.to_string(),
            CounterMode::FromSecond(start) => {
                if n == 1 {
                    String::new()
                } else {
                    (start + n - 2).to_string()
                }
            }
        }
    }

    /// How many allocations a prefix has seen.
    pub fn allocations(&self, prefix: &str) -> u32 {
        self.counters.get(prefix).copied().unwrap_or(0)
    }

    /// A detached copy for dry-run allocation.
    ///
    /// The copy carries no backing file, so dry-run allocations report the
    /// same values a real run would produce without touching durable state.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        Self {
            counters: self.counters.clone(),
            path: None,
        }
    }

    /// Write the table to the backing file, if the store is durable.
    pub fn persist(&self) -> ImportResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_string_pretty(&self.counters)?;
        // Write-then-rename so a crashed run never truncates the table
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
