//! Registry of active forwards
//!
//! Indexes running forwards by id for listing and stopping. Each session
//! owns one registry; there is no process-wide state.

use super::{ForwardHandle, ForwardMode};
use crate::error::{BurrowError, Result};
use std::sync::{Arc, Mutex};

/// One row of `list()` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardInfo {
    /// Registry id, e.g. `lf-1`
    pub id: String,
    /// Forward mode
    pub mode: ForwardMode,
    /// Listening address
    pub from: String,
    /// Target address; empty for dynamic forwards
    pub to: String,
}

struct ForwardEntry {
    info: ForwardInfo,
    handle: Arc<ForwardHandle>,
}

/// Insertion-ordered id → forward mapping
#[derive(Default)]
pub struct ForwardRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    seq: u64,
    entries: Vec<ForwardEntry>,
}

impl ForwardRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a started forward, assigning it an id
    pub fn insert(&self, mode: ForwardMode, from: String, to: String, handle: ForwardHandle) -> String {
        let mut state = self.state.lock().unwrap();
        state.seq += 1;
        let id = format!("{}-{}", mode.id_prefix(), state.seq);
        state.entries.push(ForwardEntry {
            info: ForwardInfo {
                id: id.clone(),
                mode,
                from,
                to,
            },
            handle: Arc::new(handle),
        });
        id
    }

    /// Snapshot of active forwards in insertion order
    pub fn list(&self) -> Vec<ForwardInfo> {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .map(|entry| entry.info.clone())
            .collect()
    }

    /// Stop a forward by id and remove it from the registry
    pub async fn stop(&self, id: &str) -> Result<()> {
        let handle = {
            let mut state = self.state.lock().unwrap();
            let index = state
                .entries
                .iter()
                .position(|entry| entry.info.id == id)
                .ok_or_else(|| BurrowError::NotFound(id.to_string()))?;
            state.entries.remove(index).handle
        };
        handle.stop().await
    }

    /// Stop every forward; keeps going on error and returns the first one
    pub async fn stop_all(&self) -> Result<()> {
        let entries: Vec<ForwardEntry> =
            std::mem::take(&mut self.state.lock().unwrap().entries);

        let mut first_err = Ok(());
        for entry in entries {
            if let Err(e) = entry.handle.stop().await {
                if first_err.is_ok() {
                    first_err = Err(e);
                }
            }
        }
        first_err
    }

    /// Number of active forwards
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    /// Whether no forwards are active
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
