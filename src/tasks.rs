use crate::clock::Clock;
use crate::error::EngineError;
use crate::persistence::{CellValue, PersistenceGateway, Record};
use std::sync::Arc;
use tracing::info;

pub const TASKS_TABLE: &str = "Tasks";

const ACTIVE_STATUS: &str = "Active";
const ADDED_ON_FORMAT: &str = "%d-%b-%Y T%I:%M %p";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEntry {
    pub name: String,
    pub active: bool,
    pub added_on: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(String),
    /// A task with the same name (ignoring case) is already registered
    Exists(String),
}

/// Task registry kept in the `Tasks` table (`Task, Status, Added_On`).
pub struct TaskRegistry {
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
}

fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_active(status: Option<&CellValue>) -> bool {
    status
        .and_then(CellValue::as_text)
        .map(|s| s.trim().eq_ignore_ascii_case(ACTIVE_STATUS))
        .unwrap_or(false)
}

impl TaskRegistry {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, clock: Arc<dyn Clock>) -> Self {
        Self { gateway, clock }
    }

    pub fn all_tasks(&self) -> Result<Vec<TaskEntry>, EngineError> {
        let rows = self.gateway.select_all(TASKS_TABLE)?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get("Task")?.to_string();
                if name.trim().is_empty() {
                    return None;
                }
                Some(TaskEntry {
                    name,
                    active: is_active(row.get("Status")),
                    added_on: row.get("Added_On").map(|v| v.to_string()).unwrap_or_default(),
                })
            })
            .collect())
    }

    /// Names of active tasks, sorted and de-duplicated
    pub fn active_tasks(&self) -> Result<Vec<String>, EngineError> {
        let mut names: Vec<String> = self
            .all_tasks()?
            .into_iter()
            .filter(|t| t.active)
            .map(|t| t.name)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    pub fn add_task(&self, name: &str) -> Result<AddOutcome, EngineError> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(EngineError::Validation("task name is empty".to_string()));
        }

        let lowered = name.to_lowercase();
        if let Some(existing) = self
            .all_tasks()?
            .into_iter()
            .find(|t| t.name.to_lowercase() == lowered)
        {
            info!("[TASKS] '{}' already exists as '{}'", name, existing.name);
            return Ok(AddOutcome::Exists(existing.name));
        }

        let record = Record::new()
            .with("Task", name.as_str())
            .with("Status", ACTIVE_STATUS)
            .with("Added_On", self.clock.now().format(ADDED_ON_FORMAT).to_string());
        self.gateway.append(TASKS_TABLE, &record)?;
        info!("[TASKS] Added '{}'", name);
        Ok(AddOutcome::Added(name))
    }

    /// Rewrite a task's status. Returns false when no such task exists.
    pub fn set_active(&self, name: &str, active: bool) -> Result<bool, EngineError> {
        let status = if active { ACTIVE_STATUS } else { "" };
        let updated = self.gateway.update_where(
            TASKS_TABLE,
            "Task",
            &CellValue::from(name.trim()),
            "Status",
            &CellValue::from(status),
        )?;
        if updated > 0 {
            info!("[TASKS] '{}' marked {}", name.trim(), if active { "active" } else { "inactive" });
        }
        Ok(updated > 0)
    }
}
