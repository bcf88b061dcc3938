use crate::capture::CaptureError;
use crate::form::FormError;
use crate::schema::SchemaError;
use crate::state::StateError;
use crate::workflow::{CommandError, SaveError};
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Save(#[from] SaveError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Form(#[from] FormError),
}
