/// Lifecycle of one capture screen.
///
/// `Preparing -> Idle <-> Capturing`, and any phase ends in `Finishing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapturePhase {
    #[default]
    Preparing,
    Idle,
    Capturing,
    Finishing,
}
