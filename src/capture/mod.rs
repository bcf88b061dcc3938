use std::time::{Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::command::CommandKind;
use crate::navigation::Route;
use crate::preview::{PreviewPair, ReviewState};
use crate::state::{CaptureEvent, CapturePhase, StateError, StateMachine};
use crate::workflow::{CommandError, ImageRef, Workflow, WorkflowId};

mod driver;
mod throughput;

pub use driver::CaptureDriver;
pub use throughput::pages_per_hour;

pub const PREPARE_MESSAGE: &str =
    "Please wait while the devices are being prepared for capture";
pub const CAPTURE_MESSAGE: &str = "Please wait for the capture to finish...";

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture requires a saved workflow")]
    UnsavedWorkflow,
    #[error(transparent)]
    State(#[from] StateError),
}

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

/// Remote command requested by the session; the caller executes it and reports
/// the outcome back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    Prepare { workflow: WorkflowId },
    Capture { workflow: WorkflowId, retake: bool },
    Finish { workflow: WorkflowId },
}

impl CaptureCommand {
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Prepare { .. } => CommandKind::Prepare,
            Self::Capture { retake, .. } => CommandKind::capture(*retake),
            Self::Finish { .. } => CommandKind::Finish,
        }
    }
}

/// Everything the capture screen shows, derived from one session snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureView {
    pub phase: CapturePhase,
    /// Busy overlay message while a command is in flight.
    pub overlay: Option<String>,
    pub page_count: usize,
    pub pages_per_hour: Option<u64>,
    pub preview: Option<PreviewPair>,
    pub lightbox: Option<String>,
    pub controls_enabled: bool,
    pub error: Option<String>,
}

impl CaptureView {
    pub fn page_count_label(&self) -> String {
        format!("{} pages", self.page_count)
    }

    pub fn speed_label(&self) -> Option<String> {
        self.pages_per_hour.map(|rate| format!("{rate} pages/hour"))
    }
}

/// Controller for one capture screen.
///
/// Only one prepare/capture/retake command may be in flight at a time; intents
/// arriving while busy are ignored.
#[derive(Debug)]
pub struct CaptureSession {
    workflow_id: WorkflowId,
    workflow: Workflow,
    machine: StateMachine,
    waiting: bool,
    wait_message: Option<String>,
    initial_page_count: usize,
    capture_start: Option<Instant>,
    review: ReviewState,
    lightbox_image: Option<String>,
    in_flight: Option<CommandKind>,
    last_error: Option<String>,
    finish_issued: bool,
}

impl CaptureSession {
    /// Enters `Preparing` and returns the prepare command to execute.
    pub fn mount(workflow: Workflow) -> CaptureResult<(Self, CaptureCommand)> {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_secs())
            .unwrap_or_default();
        Self::mount_with_seed(workflow, seed)
    }

    fn mount_with_seed(workflow: Workflow, seed: u64) -> CaptureResult<(Self, CaptureCommand)> {
        let workflow_id = workflow.id.ok_or(CaptureError::UnsavedWorkflow)?;
        let mut session = Self {
            workflow_id,
            initial_page_count: workflow.page_count(),
            workflow,
            machine: StateMachine::new(),
            waiting: false,
            wait_message: None,
            capture_start: None,
            review: ReviewState::new(seed),
            lightbox_image: None,
            in_flight: Some(CommandKind::Prepare),
            last_error: None,
            finish_issued: false,
        };
        tracing::info!(workflow = %workflow_id, pages = session.initial_page_count, "mounting capture session");
        session.show_overlay(PREPARE_MESSAGE);
        Ok((
            session,
            CaptureCommand::Prepare {
                workflow: workflow_id,
            },
        ))
    }

    pub fn phase(&self) -> CapturePhase {
        self.machine.state()
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn wait_message(&self) -> Option<&str> {
        self.wait_message.as_deref()
    }

    pub fn initial_page_count(&self) -> usize {
        self.initial_page_count
    }

    pub fn capture_start(&self) -> Option<Instant> {
        self.capture_start
    }

    pub fn refresh_review(&self) -> bool {
        self.review.needs_refresh()
    }

    pub fn lightbox_image(&self) -> Option<&str> {
        self.lightbox_image.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Progress callback of the prepare command: hides the overlay when shown
    /// and shows it with `message` when hidden. Hiding it while preparing ends
    /// the preparation. Ignored while a capture is in flight or after unmount.
    pub fn prepare_callback(&mut self, message: Option<&str>) {
        if !matches!(self.phase(), CapturePhase::Preparing | CapturePhase::Idle) {
            tracing::debug!(phase = ?self.phase(), "ignoring prepare progress outside preparation");
            return;
        }
        if !self.waiting {
            self.show_overlay(message.unwrap_or_default());
            return;
        }
        self.waiting = false;
        if self.phase() == CapturePhase::Preparing {
            self.in_flight = None;
            self.advance(CaptureEvent::Prepared);
        }
    }

    pub fn prepare_finished(&mut self, outcome: Result<(), CommandError>) {
        if self.phase() != CapturePhase::Preparing {
            tracing::debug!(phase = ?self.phase(), "ignoring prepare completion outside preparation");
            return;
        }
        if let Err(err) = outcome {
            tracing::warn!(workflow = %self.workflow_id, %err, "preparing devices failed");
            self.last_error = Some(format!("Preparing devices failed: {err}"));
        }
        self.prepare_callback(None);
    }

    /// Starts a capture (or retake) if the session is idle.
    pub fn trigger_capture(&mut self, retake: bool) -> Option<CaptureCommand> {
        if self.phase() != CapturePhase::Idle || self.waiting || self.in_flight.is_some() {
            tracing::debug!(phase = ?self.phase(), retake, "ignoring capture request while busy");
            return None;
        }
        self.advance(CaptureEvent::Trigger);
        self.last_error = None;
        self.in_flight = Some(CommandKind::capture(retake));
        self.show_overlay(CAPTURE_MESSAGE);
        tracing::info!(workflow = %self.workflow_id, retake, "triggering capture");
        Some(CaptureCommand::Capture {
            workflow: self.workflow_id,
            retake,
        })
    }

    pub fn capture_finished(&mut self, outcome: Result<(), CommandError>) {
        let kind = match self.in_flight {
            Some(kind @ (CommandKind::Capture | CommandKind::Retake))
                if self.phase() == CapturePhase::Capturing =>
            {
                kind
            }
            _ => {
                tracing::debug!(phase = ?self.phase(), "ignoring capture completion without a pending capture");
                return;
            }
        };
        self.in_flight = None;
        self.waiting = false;
        self.advance(CaptureEvent::Captured);

        match outcome {
            Ok(()) if kind == CommandKind::Retake => {
                self.review.mark_stale();
            }
            Ok(()) => {
                self.review.mark_fresh();
            }
            Err(err) => {
                tracing::warn!(workflow = %self.workflow_id, command = %kind, %err, "capture failed");
                self.last_error = Some(format!("Capture failed: {err}"));
            }
        }
    }

    /// Adopts a newer snapshot of the workflow.
    pub fn observe(&mut self, workflow: Workflow) {
        if workflow.id != Some(self.workflow_id) {
            tracing::debug!(expected = %self.workflow_id, got = ?workflow.id, "ignoring snapshot of another workflow");
            return;
        }
        self.workflow = workflow;
    }

    /// Derives the screen contents at `now`. The first call fixes the start of
    /// the speed measurement.
    pub fn view(&mut self, now: Instant) -> CaptureView {
        let start = *self.capture_start.get_or_insert(now);
        let page_count = self.workflow.page_count();
        let shots = page_count as i64 - self.initial_page_count as i64;
        let rate = pages_per_hour(shots, now.saturating_duration_since(start));
        let phase = self.phase();

        CaptureView {
            phase,
            overlay: self
                .waiting
                .then(|| self.wait_message.clone().unwrap_or_default()),
            page_count,
            pages_per_hour: (rate > 0).then_some(rate),
            preview: PreviewPair::from_images(&self.workflow.images, self.review.cache_bust()),
            lightbox: self.lightbox_image.clone(),
            controls_enabled: phase == CapturePhase::Idle && !self.waiting,
            error: self.last_error.clone(),
        }
    }

    pub fn open_lightbox(&mut self, image: &ImageRef) {
        self.lightbox_image = Some(image.full_url(self.review.cache_bust()));
    }

    pub fn close_lightbox(&mut self) {
        self.lightbox_image = None;
        self.review.mark_fresh();
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    /// Route to leave the capture screen for; teardown happens on unmount.
    pub const fn request_finish(&self) -> Route {
        Route::WorkflowList
    }

    /// Tears the session down. Returns the finish command exactly once.
    pub fn unmount(&mut self) -> Option<CaptureCommand> {
        if self.finish_issued {
            return None;
        }
        self.finish_issued = true;
        if let Some(pending) = self.in_flight.take() {
            tracing::debug!(command = %pending, "abandoning in-flight command on unmount");
        }
        self.waiting = false;
        self.advance(CaptureEvent::Unmount);
        tracing::info!(workflow = %self.workflow_id, "wrapping up capture process");
        Some(CaptureCommand::Finish {
            workflow: self.workflow_id,
        })
    }

    #[cfg(test)]
    fn history(&self) -> &[crate::state::StateTransition] {
        self.machine.history()
    }

    fn show_overlay(&mut self, message: &str) {
        self.waiting = true;
        self.wait_message = Some(message.to_string());
    }

    fn advance(&mut self, event: CaptureEvent) {
        // Guards above only request valid transitions; the machine logs anything else.
        let _ = self.machine.transition(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn workflow_with_pages(pages: usize) -> Workflow {
        Workflow {
            id: Some(WorkflowId(1)),
            images: (0..pages)
                .map(|n| ImageRef::new(format!("/workflow/1/image/{n}")))
                .collect(),
            ..Workflow::new("book")
        }
    }

    fn idle_session(pages: usize) -> CaptureSession {
        let (mut session, _) =
            CaptureSession::mount_with_seed(workflow_with_pages(pages), 0).expect("mount");
        session.prepare_finished(Ok(()));
        session
    }

    #[test]
    fn mount_prepares_with_overlay_then_goes_idle() {
        let (mut session, command) =
            CaptureSession::mount_with_seed(workflow_with_pages(5), 0).expect("mount");

        assert_eq!(command, CaptureCommand::Prepare { workflow: WorkflowId(1) });
        assert_eq!(session.phase(), CapturePhase::Preparing);
        assert!(session.is_waiting());
        assert_eq!(session.wait_message(), Some(PREPARE_MESSAGE));
        assert_eq!(session.initial_page_count(), 5);

        session.prepare_callback(None);

        assert_eq!(session.phase(), CapturePhase::Idle);
        assert!(!session.is_waiting());
    }

    #[test]
    fn mount_requires_saved_workflow() {
        let err = CaptureSession::mount(Workflow::new("draft")).expect_err("unsaved");
        assert!(matches!(err, CaptureError::UnsavedWorkflow));
    }

    #[test]
    fn prepare_callback_while_idle_shows_overlay_and_blocks_capture() {
        let mut session = idle_session(0);

        session.prepare_callback(Some("Focusing"));
        assert!(session.is_waiting());
        assert_eq!(session.wait_message(), Some("Focusing"));
        assert_eq!(session.phase(), CapturePhase::Idle);
        assert!(session.trigger_capture(false).is_none());

        session.prepare_callback(None);
        assert!(!session.is_waiting());
        assert!(session.trigger_capture(false).is_some());
    }

    #[test]
    fn capture_cycles_idle_capturing_idle_once_per_call() {
        let mut session = idle_session(0);

        for _ in 0..3 {
            let command = session.trigger_capture(false).expect("idle session captures");
            assert_eq!(
                command,
                CaptureCommand::Capture {
                    workflow: WorkflowId(1),
                    retake: false
                }
            );
            assert_eq!(session.phase(), CapturePhase::Capturing);
            assert_eq!(session.wait_message(), Some(CAPTURE_MESSAGE));

            session.capture_finished(Ok(()));
            assert_eq!(session.phase(), CapturePhase::Idle);
            assert!(!session.is_waiting());
        }

        let captures = session
            .history()
            .iter()
            .filter(|t| t.event == CaptureEvent::Trigger)
            .count();
        assert_eq!(captures, 3);
    }

    #[test]
    fn reentrant_trigger_is_ignored_while_capturing() {
        let mut session = idle_session(0);
        assert!(session.trigger_capture(false).is_some());
        assert!(session.trigger_capture(false).is_none());
        assert!(session.trigger_capture(true).is_none());

        session.capture_finished(Ok(()));
        let triggers = session
            .history()
            .iter()
            .filter(|t| t.event == CaptureEvent::Trigger)
            .count();
        assert_eq!(triggers, 1);
    }

    #[test]
    fn trigger_is_ignored_while_preparing() {
        let (mut session, _) =
            CaptureSession::mount_with_seed(workflow_with_pages(0), 0).expect("mount");
        assert!(session.trigger_capture(false).is_none());
        assert_eq!(session.phase(), CapturePhase::Preparing);
    }

    #[test]
    fn retake_sets_refresh_and_normal_capture_clears_it() {
        let mut session = idle_session(2);

        session.trigger_capture(true).expect("retake");
        assert!(!session.refresh_review());
        session.capture_finished(Ok(()));
        assert!(session.refresh_review());

        session.trigger_capture(false).expect("capture");
        session.capture_finished(Ok(()));
        assert!(!session.refresh_review());
    }

    #[test]
    fn refresh_adds_cache_bust_to_preview_and_lightbox() {
        let mut session = idle_session(2);
        session.trigger_capture(true).expect("retake");
        session.capture_finished(Ok(()));

        let view = session.view(Instant::now());
        let preview = view.preview.expect("two images give a preview");
        assert_eq!(preview.even.thumb_url, "/workflow/1/image/1/thumb?1");

        session.open_lightbox(&preview.odd.image);
        assert_eq!(session.lightbox_image(), Some("/workflow/1/image/0?1"));

        session.close_lightbox();
        assert_eq!(session.lightbox_image(), None);
        assert!(!session.refresh_review());
        let view = session.view(Instant::now());
        assert_eq!(
            view.preview.map(|p| p.even.thumb_url),
            Some("/workflow/1/image/1/thumb".to_string())
        );
    }

    #[test]
    fn consecutive_retakes_use_fresh_cache_bust_tokens() {
        let mut session = idle_session(2);

        session.trigger_capture(true).expect("first retake");
        session.capture_finished(Ok(()));
        let first = session.view(Instant::now()).preview.expect("preview");

        session.trigger_capture(true).expect("second retake");
        session.capture_finished(Ok(()));
        let second = session.view(Instant::now()).preview.expect("preview");

        assert_eq!(first.even.thumb_url, "/workflow/1/image/1/thumb?1");
        assert_eq!(second.even.thumb_url, "/workflow/1/image/1/thumb?2");
        assert_ne!(first.odd.full_url, second.odd.full_url);
        assert!(session.refresh_review());
    }

    #[test]
    fn prepare_progress_cannot_hide_capture_overlay() {
        let mut session = idle_session(0);
        session.trigger_capture(false).expect("capture");

        session.prepare_callback(None);
        assert!(session.is_waiting());
        assert_eq!(session.wait_message(), Some(CAPTURE_MESSAGE));
        let view = session.view(Instant::now());
        assert_eq!(view.overlay.as_deref(), Some(CAPTURE_MESSAGE));
        assert!(!view.controls_enabled);

        session.capture_finished(Ok(()));
        assert!(!session.is_waiting());

        session.unmount();
        session.prepare_callback(Some("late"));
        assert!(!session.is_waiting());
    }

    #[test]
    fn failed_capture_returns_to_idle_with_error() {
        let mut session = idle_session(0);
        session.trigger_capture(false).expect("capture");

        session.capture_finished(Err(CommandError::Device {
            message: "camera offline".to_string(),
        }));

        assert_eq!(session.phase(), CapturePhase::Idle);
        assert!(!session.is_waiting());
        assert_eq!(
            session.last_error(),
            Some("Capture failed: device error: camera offline")
        );
        let view = session.view(Instant::now());
        assert!(view.controls_enabled);
        assert!(view.error.is_some());

        session.trigger_capture(false).expect("retry allowed");
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn failed_prepare_still_leaves_preparation() {
        let (mut session, _) =
            CaptureSession::mount_with_seed(workflow_with_pages(0), 0).expect("mount");
        session.prepare_finished(Err(CommandError::Transport {
            message: "connection reset".to_string(),
        }));

        assert_eq!(session.phase(), CapturePhase::Idle);
        assert!(!session.is_waiting());
        assert!(session.last_error().is_some());

        session.dismiss_error();
        assert_eq!(session.view(Instant::now()).error, None);
    }

    #[test]
    fn stray_capture_completion_is_ignored() {
        let mut session = idle_session(0);
        session.capture_finished(Ok(()));
        assert_eq!(session.phase(), CapturePhase::Idle);
        assert!(session.history().iter().all(|t| t.event != CaptureEvent::Captured));
    }

    #[test]
    fn throughput_over_one_hour_equals_new_pages() {
        let mut session = idle_session(0);
        let start = Instant::now();

        let first = session.view(start);
        assert_eq!(first.pages_per_hour, None);
        assert_eq!(session.capture_start(), Some(start));

        session.observe(workflow_with_pages(24));
        let later = session.view(start + Duration::from_secs(3600));
        assert_eq!(later.pages_per_hour, Some(24));
        assert_eq!(later.speed_label().as_deref(), Some("24 pages/hour"));
        assert_eq!(later.page_count_label(), "24 pages");
    }

    #[test]
    fn capture_start_is_set_only_once() {
        let mut session = idle_session(4);
        let start = Instant::now();
        session.view(start);
        session.view(start + Duration::from_secs(10));
        assert_eq!(session.capture_start(), Some(start));
    }

    #[test]
    fn throughput_counts_only_pages_since_mount() {
        let mut session = idle_session(10);
        let start = Instant::now();
        session.view(start);
        session.observe(workflow_with_pages(12));
        let view = session.view(start + Duration::from_secs(1800));
        assert_eq!(view.pages_per_hour, Some(4));
    }

    #[test]
    fn preview_needs_two_images() {
        let mut session = idle_session(1);
        assert!(session.view(Instant::now()).preview.is_none());
        session.observe(workflow_with_pages(2));
        assert!(session.view(Instant::now()).preview.is_some());
    }

    #[test]
    fn observe_ignores_other_workflows() {
        let mut session = idle_session(1);
        let other = Workflow {
            id: Some(WorkflowId(2)),
            ..workflow_with_pages(8)
        };
        session.observe(other);
        assert_eq!(session.workflow().page_count(), 1);
    }

    #[test]
    fn unmount_issues_finish_exactly_once_from_any_phase() {
        let (mut preparing, _) =
            CaptureSession::mount_with_seed(workflow_with_pages(0), 0).expect("mount");
        assert_eq!(
            preparing.unmount(),
            Some(CaptureCommand::Finish { workflow: WorkflowId(1) })
        );
        assert_eq!(preparing.unmount(), None);
        assert_eq!(preparing.phase(), CapturePhase::Finishing);

        let mut capturing = idle_session(0);
        capturing.trigger_capture(false).expect("capture");
        assert!(capturing.unmount().is_some());
        assert!(capturing.unmount().is_none());
        assert!(!capturing.is_waiting());

        capturing.capture_finished(Ok(()));
        assert_eq!(capturing.phase(), CapturePhase::Finishing);
    }

    #[test]
    fn finish_navigates_to_workflow_list() {
        let session = idle_session(0);
        assert_eq!(session.request_finish(), Route::WorkflowList);
    }
}
