//! Interactive session state: the current catalog, the operator's
//! selection, and a guard that keeps catalog swaps out of in-flight
//! executions.

use crate::error::SessionBusy;
use crate::model::{ResourceCatalog, ResourceKey, Service};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Holds the latest published catalog and the keys marked for deletion.
///
/// Selection only ever contains keys present in the current catalog;
/// publishing a new catalog prunes anything that did not survive.
pub struct CleanupSession {
    catalog: Option<Arc<ResourceCatalog>>,
    selection: BTreeSet<ResourceKey>,
    executing: Arc<AtomicBool>,
}

impl CleanupSession {
    pub fn new() -> Self {
        Self {
            catalog: None,
            selection: BTreeSet::new(),
            executing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn catalog(&self) -> Option<&Arc<ResourceCatalog>> {
        self.catalog.as_ref()
    }

    pub fn selection(&self) -> &BTreeSet<ResourceKey> {
        &self.selection
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    /// Replace the session catalog with a fresh discovery result.
    ///
    /// Fails fast while an execution permit is held so the engine never
    /// sees the catalog change under it.
    pub fn publish_catalog(&mut self, catalog: ResourceCatalog) -> Result<(), SessionBusy> {
        if self.is_executing() {
            return Err(SessionBusy {
                operation: "publish catalog",
            });
        }

        let catalog = Arc::new(catalog);
        let before = self.selection.len();
        self.selection.retain(|key| catalog.contains(key));
        let pruned = before - self.selection.len();
        if pruned > 0 {
            debug!(pruned, "Dropped selected keys missing from the new catalog");
        }
        self.catalog = Some(catalog);
        Ok(())
    }

    /// Toggle one key in or out of the selection. Unknown keys are ignored.
    pub fn toggle(&mut self, key: &ResourceKey) -> bool {
        let Some(catalog) = &self.catalog else {
            return false;
        };
        if !catalog.contains(key) {
            return false;
        }
        if !self.selection.remove(key) {
            self.selection.insert(key.clone());
            true
        } else {
            false
        }
    }

    /// Select every catalog key matching the predicate. Returns how many
    /// keys were newly added.
    pub fn select_matching<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&ResourceKey) -> bool,
    {
        let Some(catalog) = &self.catalog else {
            return 0;
        };
        let mut added = 0;
        for key in catalog.keys() {
            if predicate(key) && self.selection.insert(key.clone()) {
                added += 1;
            }
        }
        added
    }

    pub fn select_service(&mut self, service: &Service) -> usize {
        let service = service.clone();
        self.select_matching(|key| key.service == service)
    }

    pub fn select_all(&mut self) -> usize {
        self.select_matching(|_| true)
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Acquire the exclusive right to execute against the current
    /// catalog. Dropping the permit releases it.
    pub fn begin_execution(&self) -> Result<ExecutionPermit, SessionBusy> {
        if self
            .executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionBusy {
                operation: "begin execution",
            });
        }
        Ok(ExecutionPermit {
            flag: Arc::clone(&self.executing),
        })
    }
}

impl Default for CleanupSession {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard marking the session busy until execution finishes.
pub struct ExecutionPermit {
    flag: Arc<AtomicBool>,
}

impl Drop for ExecutionPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
