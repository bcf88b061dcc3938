use super::model::CapturePhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Preparation finished, successfully or not.
    Prepared,
    Trigger,
    /// The in-flight capture or retake finished, successfully or not.
    Captured,
    Unmount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: CapturePhase,
    pub event: CaptureEvent,
    pub to: CapturePhase,
}

impl StateTransition {
    pub const fn new(from: CapturePhase, event: CaptureEvent, to: CapturePhase) -> Self {
        Self { from, event, to }
    }
}
