use std::sync::Arc;

use parking_lot::Mutex;

use super::{Workflow, WorkflowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Skipped,
}

/// Shared list of known workflows, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct WorkflowCollection {
    entries: Arc<Mutex<Vec<Workflow>>>,
}

impl WorkflowCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the workflow, or replaces the stored entry with the same id.
    /// Workflows without an id have not been persisted and are skipped.
    pub fn upsert(&self, workflow: Workflow) -> UpsertOutcome {
        let Some(id) = workflow.id else {
            tracing::warn!(name = %workflow.name, "refusing to add unsaved workflow to collection");
            return UpsertOutcome::Skipped;
        };
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|entry| entry.id == Some(id)) {
            Some(existing) => {
                *existing = workflow;
                UpsertOutcome::Updated
            }
            None => {
                entries.push(workflow);
                UpsertOutcome::Inserted
            }
        }
    }

    pub fn get(&self, id: WorkflowId) -> Option<Workflow> {
        self.entries
            .lock()
            .iter()
            .find(|entry| entry.id == Some(id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Workflow> {
        self.entries.lock().clone()
    }
}
