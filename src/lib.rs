pub mod capture;
pub mod command;
pub mod config;
pub mod error;
pub mod form;
pub mod logging;
pub mod navigation;
pub mod preview;
pub mod schema;
pub mod state;
pub mod workflow;
pub use error::{AppError, AppResult};

use std::cell::Cell;
use std::sync::Arc;

use capture::CaptureDriver;
use command::CommandRunner;
use form::{Binding, FieldInput, WorkflowFormController};
use navigation::Route;
use schema::TemplateRegistry;
use workflow::{FieldPath, InMemoryWorkflowService, Workflow, WorkflowCollection, WorkflowHandle};

const DEMO_DEVICE_COUNT: usize = 2;
const DEMO_WORKFLOW_NAME: &str = "demo book";

/// Demo entrypoint: creates a workflow through the form and runs a short
/// capture session against the in-memory scanner backend.
pub async fn run() -> AppResult<()> {
    let config = config::load_app_config();
    logging::init(config.log_filter.as_deref());
    tracing::info!("starting scanflow");

    let templates = Arc::new(match &config.templates {
        Some(path) => TemplateRegistry::load(path)?,
        None => TemplateRegistry::from_json(schema::SAMPLE_TEMPLATES)?,
    });
    let service = Arc::new(
        InMemoryWorkflowService::new(DEMO_DEVICE_COUNT).with_templates(Arc::clone(&templates)),
    );
    let runner = CommandRunner::new(config.commands);
    let collection = WorkflowCollection::new();
    let handle = WorkflowHandle::new(Workflow::default());

    let mut form =
        WorkflowFormController::mount(handle.clone(), Arc::clone(&templates), collection.clone());
    form.update(
        &Binding::Field(FieldPath::Name),
        FieldInput::Text(DEMO_WORKFLOW_NAME.to_string()),
    )?;
    let destination = Cell::new(None);
    let saved = form
        .submit(service.as_ref(), &runner, &|route: Route| {
            destination.set(Some(route))
        })
        .await;
    tracing::debug!(view = ?form.view(), "workflow form");
    form.unmount();

    let Some(route) = destination.get().filter(|_| saved) else {
        tracing::warn!(errors = ?form.errors(), banner = ?form.banner(), "workflow was not saved");
        return Ok(());
    };
    tracing::info!(%route, "navigating");

    let mut driver = CaptureDriver::mount(handle, Arc::clone(&service), &runner).await?;
    for retake in [false, false, true] {
        driver.trigger_capture(retake).await;
        let view = driver.view();
        tracing::info!(
            phase = ?view.phase,
            pages = %view.page_count_label(),
            speed = ?view.speed_label(),
            error = ?view.error,
            "capture view"
        );
    }
    driver.finish(&|route: Route| tracing::info!(%route, "navigating"));
    if let Some(finish) = driver.unmount() {
        if let Err(err) = finish.await {
            tracing::warn!(%err, "finish task did not complete");
        }
    }

    tracing::info!(workflows = collection.len(), "demo complete");
    Ok(())
}
