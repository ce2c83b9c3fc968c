use super::{check_identifier, CellValue, PersistenceGateway, Record};
use crate::error::PersistenceError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Record>>,
    unavailable: bool,
    /// Countdown of appends; the append that brings it to zero fails.
    fail_countdown: Option<usize>,
}

/// In-memory gateway with failure injection, used as the store fake.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, MemoryState>, PersistenceError> {
        self.state
            .lock()
            .map_err(|e| PersistenceError::Poisoned(format!("memory store mutex poisoned: {}", e)))
    }

    /// While set, every operation fails as if the store were locked.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut state) = self.lock_state() {
            state.unavailable = unavailable;
        }
    }

    /// Make the `n`-th upcoming append fail once (1 = the next append).
    pub fn fail_nth_append(&self, n: usize) {
        if let Ok(mut state) = self.lock_state() {
            state.fail_countdown = if n == 0 { None } else { Some(n) };
        }
    }

    /// Snapshot of a table's rows in insertion order
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock_state()
            .map(|state| state.tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn check_available(state: &MemoryState) -> Result<(), PersistenceError> {
        if state.unavailable {
            return Err(PersistenceError::Unavailable(
                "store is locked by another process".to_string(),
            ));
        }
        Ok(())
    }
}

impl PersistenceGateway for MemoryGateway {
    fn append(&self, table: &str, record: &Record) -> Result<(), PersistenceError> {
        check_identifier("table", table)?;
        let mut state = self.lock_state()?;
        Self::check_available(&state)?;

        if let Some(remaining) = state.fail_countdown {
            if remaining <= 1 {
                state.fail_countdown = None;
                return Err(PersistenceError::Unavailable(format!(
                    "injected append failure on {}",
                    table
                )));
            }
            state.fail_countdown = Some(remaining - 1);
        }

        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn select_all(&self, table: &str) -> Result<Vec<Record>, PersistenceError> {
        let state = self.lock_state()?;
        Self::check_available(&state)?;
        Ok(state.tables.get(table).cloned().unwrap_or_default())
    }

    fn select_where(
        &self,
        table: &str,
        column: &str,
        value: &CellValue,
    ) -> Result<Vec<Record>, PersistenceError> {
        let state = self.lock_state()?;
        Self::check_available(&state)?;
        Ok(state
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.get(column) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn update_where(
        &self,
        table: &str,
        key_column: &str,
        key: &CellValue,
        column: &str,
        value: &CellValue,
    ) -> Result<usize, PersistenceError> {
        let mut state = self.lock_state()?;
        Self::check_available(&state)?;
        let mut updated = 0;
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|r| r.get(key_column) == Some(key)) {
                row.set(column, value.clone());
                updated += 1;
            }
        }
        Ok(updated)
    }
}
