use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use super::{CaptureCommand, CaptureResult, CaptureSession, CaptureView};
use crate::command::{CommandKind, CommandRunner};
use crate::navigation::{Navigator, Route};
use crate::workflow::{ImageRef, WorkflowEvent, WorkflowHandle, WorkflowIntent, WorkflowService};

/// Executes the commands of a [`CaptureSession`] against a [`WorkflowService`].
pub struct CaptureDriver<S> {
    session: CaptureSession,
    service: Arc<S>,
    handle: WorkflowHandle,
    runner: CommandRunner,
    events: broadcast::Receiver<WorkflowEvent>,
}

impl<S: WorkflowService + 'static> CaptureDriver<S> {
    /// Mounts the capture screen and waits for device preparation to finish.
    pub async fn mount(
        handle: WorkflowHandle,
        service: Arc<S>,
        runner: &CommandRunner,
    ) -> CaptureResult<Self> {
        let events = handle.subscribe();
        let (session, command) = CaptureSession::mount(handle.snapshot())?;
        let mut driver = Self {
            session,
            service,
            handle,
            runner: runner.child(),
            events,
        };
        driver.execute(command).await;
        Ok(driver)
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn view(&mut self) -> CaptureView {
        self.sync_events();
        self.session.view(Instant::now())
    }

    /// Returns `false` when the request was ignored because the session was busy.
    pub async fn trigger_capture(&mut self, retake: bool) -> bool {
        let Some(command) = self.session.trigger_capture(retake) else {
            return false;
        };
        self.execute(command).await;
        true
    }

    pub fn open_lightbox(&mut self, image: &ImageRef) {
        self.session.open_lightbox(image);
    }

    pub fn close_lightbox(&mut self) {
        self.session.close_lightbox();
    }

    pub fn dismiss_error(&mut self) {
        self.session.dismiss_error();
    }

    pub fn finish(&self, navigator: &dyn Navigator) {
        let route: Route = self.session.request_finish();
        navigator.navigate(route);
    }

    /// Issues the finish command in the background and drops the session.
    ///
    /// The command runs under its own timeout but ignores cancellation of the
    /// parent runner, so devices are always released.
    pub fn unmount(mut self) -> Option<JoinHandle<()>> {
        let CaptureCommand::Finish { workflow } = self.session.unmount()? else {
            return None;
        };
        let service = Arc::clone(&self.service);
        let runner = CommandRunner::new(self.runner.timeouts());
        Some(tokio::spawn(async move {
            let outcome = runner
                .run(CommandKind::Finish, service.finish_capture(workflow))
                .await;
            if let Err(err) = outcome {
                tracing::warn!(%workflow, %err, "finishing capture failed");
            }
        }))
    }

    async fn execute(&mut self, command: CaptureCommand) {
        match command {
            CaptureCommand::Prepare { workflow } => {
                let outcome = self
                    .runner
                    .run(command.kind(), self.service.prepare_capture(workflow))
                    .await;
                self.session.prepare_finished(outcome);
            }
            CaptureCommand::Capture { workflow, retake } => {
                let outcome = self
                    .runner
                    .run(command.kind(), self.service.trigger_capture(workflow, retake))
                    .await
                    .map(|receipt| {
                        self.handle
                            .dispatch(WorkflowIntent::ReplaceImages(receipt.images));
                    });
                self.sync_events();
                self.session.capture_finished(outcome);
            }
            CaptureCommand::Finish { .. } => {
                tracing::warn!("finish is only issued through unmount");
            }
        }
    }

    fn sync_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(WorkflowEvent::Changed(workflow)) => self.session.observe(workflow),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "capture session lagged behind workflow events");
                    self.session.observe(self.handle.snapshot());
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::command::CommandTimeouts;
    use crate::state::CapturePhase;
    use crate::workflow::{
        CaptureReceipt, CommandError, InMemoryWorkflowService, SaveError, Workflow, WorkflowId,
    };

    async fn saved_handle(service: &InMemoryWorkflowService) -> WorkflowHandle {
        let saved = service
            .save(&Workflow::new("book"))
            .await
            .expect("save succeeds");
        WorkflowHandle::new(saved)
    }

    #[tokio::test]
    async fn mount_prepares_devices_and_ends_idle() {
        let service = Arc::new(InMemoryWorkflowService::new(2));
        let handle = saved_handle(&service).await;

        let mut driver = CaptureDriver::mount(handle, Arc::clone(&service), &CommandRunner::default())
            .await
            .expect("mount");

        assert_eq!(driver.session().phase(), CapturePhase::Idle);
        assert!(service.is_active(WorkflowId(1)));
        let view = driver.view();
        assert_eq!(view.overlay, None);
        assert!(view.controls_enabled);
    }

    #[tokio::test]
    async fn captures_flow_back_into_workflow_snapshot() {
        let service = Arc::new(InMemoryWorkflowService::new(2));
        let handle = saved_handle(&service).await;
        let mut driver =
            CaptureDriver::mount(handle.clone(), Arc::clone(&service), &CommandRunner::default())
                .await
                .expect("mount");

        assert!(driver.trigger_capture(false).await);
        assert!(driver.trigger_capture(false).await);
        assert_eq!(handle.snapshot().page_count(), 4);
        assert_eq!(driver.view().page_count, 4);

        assert!(driver.trigger_capture(true).await);
        let view = driver.view();
        assert_eq!(view.page_count, 4);
        assert!(driver.session().refresh_review());
        assert!(view
            .preview
            .expect("preview after captures")
            .odd
            .thumb_url
            .contains("/thumb?"));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_commands_return_to_idle_with_error() {
        let slow = Arc::new(InMemoryWorkflowService::new(1).with_latency(Duration::from_secs(60)));
        let handle = saved_handle(&slow).await;
        let runner = CommandRunner::new(CommandTimeouts {
            prepare_timeout_ms: 100,
            capture_timeout_ms: 100,
            ..CommandTimeouts::default()
        });
        let mut driver = CaptureDriver::mount(handle, Arc::clone(&slow), &runner)
            .await
            .expect("mount");

        assert_eq!(driver.session().phase(), CapturePhase::Idle);
        assert!(driver
            .session()
            .last_error()
            .is_some_and(|msg| msg.contains("timed out")));

        assert!(driver.trigger_capture(false).await);
        let view = driver.view();
        assert_eq!(view.phase, CapturePhase::Idle);
        assert_eq!(view.overlay, None);
        assert_eq!(view.page_count, 0);
        assert!(view.controls_enabled);
        assert!(view.error.is_some_and(|msg| msg.contains("timed out")));

        driver.dismiss_error();
        assert_eq!(driver.view().error, None);
    }

    #[tokio::test]
    async fn unmount_issues_finish_once() {
        let service = Arc::new(InMemoryWorkflowService::new(2));
        let handle = saved_handle(&service).await;
        let driver = CaptureDriver::mount(handle, Arc::clone(&service), &CommandRunner::default())
            .await
            .expect("mount");
        assert!(service.is_active(WorkflowId(1)));

        let finish = driver.unmount().expect("finish task");
        finish.await.expect("finish task completes");
        assert!(!service.is_active(WorkflowId(1)));
    }

    #[tokio::test]
    async fn unmount_finishes_even_when_parent_runner_is_cancelled() {
        let service = Arc::new(CountingService::default());
        let handle = WorkflowHandle::new(Workflow {
            id: Some(WorkflowId(5)),
            ..Workflow::new("book")
        });
        let runner = CommandRunner::default();
        let driver = CaptureDriver::mount(handle, Arc::clone(&service), &runner)
            .await
            .expect("mount");

        runner.cancel();
        driver
            .unmount()
            .expect("finish task")
            .await
            .expect("finish task completes");

        assert_eq!(*service.finishes.lock().expect("lock"), 1);
    }

    #[tokio::test]
    async fn finish_navigates_to_workflow_list() {
        let service = Arc::new(InMemoryWorkflowService::new(2));
        let handle = saved_handle(&service).await;
        let driver = CaptureDriver::mount(handle, Arc::clone(&service), &CommandRunner::default())
            .await
            .expect("mount");

        let visited = std::cell::RefCell::new(Vec::new());
        driver.finish(&|route: Route| visited.borrow_mut().push(route));
        assert_eq!(visited.into_inner(), vec![Route::WorkflowList]);
    }

    #[derive(Default)]
    struct CountingService {
        finishes: Mutex<usize>,
    }

    #[async_trait]
    impl WorkflowService for CountingService {
        async fn prepare_capture(&self, _workflow: WorkflowId) -> Result<(), CommandError> {
            Ok(())
        }

        async fn trigger_capture(
            &self,
            _workflow: WorkflowId,
            _retake: bool,
        ) -> Result<CaptureReceipt, CommandError> {
            Ok(CaptureReceipt::default())
        }

        async fn finish_capture(&self, _workflow: WorkflowId) -> Result<(), CommandError> {
            *self.finishes.lock().expect("lock") += 1;
            Ok(())
        }

        async fn save(&self, workflow: &Workflow) -> Result<Workflow, SaveError> {
            Ok(workflow.clone())
        }
    }
}
