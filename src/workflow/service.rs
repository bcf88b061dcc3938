use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::{ImageRef, ValidationErrors, Workflow, WorkflowId};
use crate::command::CommandKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{command} timed out after {after:?}")]
    Timeout {
        command: CommandKind,
        after: Duration,
    },
    #[error("{command} was cancelled")]
    Cancelled { command: CommandKind },
    #[error("workflow {0} not found")]
    NotFound(WorkflowId),
    #[error("device error: {message}")]
    Device { message: String },
    #[error("transport error: {message}")]
    Transport { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveError {
    #[error("workflow failed validation ({} field(s))", .0.len())]
    Invalid(ValidationErrors),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Result of one capture or retake: the workflow's full image list afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureReceipt {
    pub images: Vec<ImageRef>,
}

impl CaptureReceipt {
    pub fn pages_shot(&self) -> usize {
        self.images.len()
    }
}

/// Remote side of a workflow: device control and persistence.
#[async_trait]
pub trait WorkflowService: Send + Sync {
    async fn prepare_capture(&self, workflow: WorkflowId) -> Result<(), CommandError>;

    /// Shoots one page per device. A retake first deletes the most recent
    /// device-count images.
    async fn trigger_capture(
        &self,
        workflow: WorkflowId,
        retake: bool,
    ) -> Result<CaptureReceipt, CommandError>;

    async fn finish_capture(&self, workflow: WorkflowId) -> Result<(), CommandError>;

    /// Persists the workflow and returns the stored form, id included.
    async fn save(&self, workflow: &Workflow) -> Result<Workflow, SaveError>;
}
