use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::service::{CaptureReceipt, CommandError, SaveError, WorkflowService};
use super::{FieldPath, ImageRef, ValidationErrors, Workflow, WorkflowId};
use crate::schema::TemplateRegistry;

const DUPLICATE_NAME_MESSAGE: &str = "A workflow with this name already exists";
const INVALID_OPTION_MESSAGE: &str = "Value does not match the option's type";

/// Simulated scanner backend that keeps every workflow in memory.
///
/// Behaves like a rig with `device_count` cameras: each capture stores one image
/// per device, and a retake replaces the last `device_count` images.
#[derive(Debug)]
pub struct InMemoryWorkflowService {
    device_count: usize,
    latency: Duration,
    templates: Option<Arc<TemplateRegistry>>,
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    workflows: BTreeMap<WorkflowId, StoredWorkflow>,
}

#[derive(Debug)]
struct StoredWorkflow {
    workflow: Workflow,
    active: bool,
}

impl InMemoryWorkflowService {
    pub fn new(device_count: usize) -> Self {
        Self {
            device_count: device_count.max(1),
            latency: Duration::ZERO,
            templates: None,
            state: Mutex::new(MemoryState {
                next_id: 1,
                ..MemoryState::default()
            }),
        }
    }

    /// Delay applied before every device command completes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Enables type checks of option values against the plugin templates on save.
    pub fn with_templates(mut self, templates: Arc<TemplateRegistry>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn device_count(&self) -> usize {
        self.device_count
    }

    pub fn workflow(&self, id: WorkflowId) -> Option<Workflow> {
        self.state
            .lock()
            .workflows
            .get(&id)
            .map(|stored| stored.workflow.clone())
    }

    pub fn is_active(&self, id: WorkflowId) -> bool {
        self.state
            .lock()
            .workflows
            .get(&id)
            .is_some_and(|stored| stored.active)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn validate_for_save(&self, state: &MemoryState, workflow: &Workflow) -> ValidationErrors {
        let mut errors = workflow.validate().err().unwrap_or_default();

        let duplicate = state.workflows.values().any(|stored| {
            stored.workflow.id != workflow.id && stored.workflow.name == workflow.name
        });
        if duplicate {
            errors.insert(FieldPath::Name, DUPLICATE_NAME_MESSAGE);
        }

        if let Some(templates) = &self.templates {
            for (plugin, options) in &workflow.config {
                for (key, value) in options {
                    let accepted = templates
                        .option(plugin, key)
                        .map_or(true, |schema| schema.kind.accepts(value));
                    if !accepted {
                        errors.insert(FieldPath::option(plugin, key), INVALID_OPTION_MESSAGE);
                    }
                }
            }
        }
        errors
    }

    fn activate(state: &mut MemoryState, id: WorkflowId) -> Result<(), CommandError> {
        if !state.workflows.contains_key(&id) {
            return Err(CommandError::NotFound(id));
        }
        for (other_id, stored) in state.workflows.iter_mut() {
            if *other_id != id && stored.active {
                tracing::info!(workflow = %other_id, "finishing previously active workflow");
                stored.active = false;
            }
        }
        if let Some(stored) = state.workflows.get_mut(&id) {
            stored.active = true;
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowService for InMemoryWorkflowService {
    async fn prepare_capture(&self, workflow: WorkflowId) -> Result<(), CommandError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        Self::activate(&mut state, workflow)?;
        tracing::debug!(%workflow, devices = self.device_count, "prepared capture");
        Ok(())
    }

    async fn trigger_capture(
        &self,
        workflow: WorkflowId,
        retake: bool,
    ) -> Result<CaptureReceipt, CommandError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        let needs_prepare = !state
            .workflows
            .get(&workflow)
            .ok_or(CommandError::NotFound(workflow))?
            .active;
        if needs_prepare {
            tracing::debug!(%workflow, "capture triggered before prepare; preparing implicitly");
            Self::activate(&mut state, workflow)?;
        }

        let stored = state
            .workflows
            .get_mut(&workflow)
            .ok_or(CommandError::NotFound(workflow))?;
        let images = &mut stored.workflow.images;
        if retake {
            let keep = images.len().saturating_sub(self.device_count);
            images.truncate(keep);
        }
        for _ in 0..self.device_count {
            let number = images.len();
            images.push(ImageRef::new(format!("/workflow/{workflow}/image/{number}")));
        }
        tracing::debug!(%workflow, retake, pages = images.len(), "capture complete");

        Ok(CaptureReceipt {
            images: images.clone(),
        })
    }

    async fn finish_capture(&self, workflow: WorkflowId) -> Result<(), CommandError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        let stored = state
            .workflows
            .get_mut(&workflow)
            .ok_or(CommandError::NotFound(workflow))?;
        stored.active = false;
        Ok(())
    }

    async fn save(&self, workflow: &Workflow) -> Result<Workflow, SaveError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();

        let errors = self.validate_for_save(&state, workflow);
        if !errors.is_empty() {
            return Err(SaveError::Invalid(errors));
        }

        let id = match workflow.id {
            Some(id) if state.workflows.contains_key(&id) => id,
            Some(id) => return Err(CommandError::NotFound(id).into()),
            None => {
                let id = WorkflowId(state.next_id);
                state.next_id += 1;
                id
            }
        };

        // Images are owned by the capture devices, not by the client.
        let images = state
            .workflows
            .get(&id)
            .map(|stored| stored.workflow.images.clone())
            .unwrap_or_default();
        let saved = Workflow {
            id: Some(id),
            images,
            ..workflow.clone()
        };
        let active = state.workflows.get(&id).is_some_and(|stored| stored.active);
        state.workflows.insert(
            id,
            StoredWorkflow {
                workflow: saved.clone(),
                active,
            },
        );
        Ok(saved)
    }
}
