use super::error::{StateError, StateResult};
#[cfg(test)]
use super::event::StateTransition;
use super::{CaptureEvent, CapturePhase};

#[derive(Debug)]
pub struct StateMachine {
    state: CapturePhase,
    #[cfg(test)]
    transition_history: Vec<StateTransition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: CapturePhase::default(),
            #[cfg(test)]
            transition_history: Vec::new(),
        }
    }

    pub fn state(&self) -> CapturePhase {
        self.state
    }

    pub fn next_state(&self, event: CaptureEvent) -> Option<CapturePhase> {
        use CaptureEvent::*;
        match (self.state, event) {
            (CapturePhase::Preparing, Prepared) => Some(CapturePhase::Idle),
            (CapturePhase::Idle, Trigger) => Some(CapturePhase::Capturing),
            (CapturePhase::Capturing, Captured) => Some(CapturePhase::Idle),
            (CapturePhase::Finishing, Unmount) => None,
            (_, Unmount) => Some(CapturePhase::Finishing),
            _ => None,
        }
    }

    pub fn transition(&mut self, event: CaptureEvent) -> StateResult<CapturePhase> {
        tracing::debug!(from = ?self.state, event = ?event, "request state transition");
        let next = self.next_state(event).ok_or_else(|| {
            let from = self.state;
            tracing::warn!(from = ?from, event = ?event, "invalid state transition requested");
            StateError::InvalidStateTransition { from, event }
        })?;

        #[cfg(test)]
        self.transition_history
            .push(StateTransition::new(self.state, event, next));
        self.state = next;

        Ok(self.state)
    }
}

#[cfg(test)]
impl StateMachine {
    pub(crate) fn history(&self) -> &[StateTransition] {
        &self.transition_history
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
