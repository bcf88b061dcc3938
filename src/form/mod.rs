use thiserror::Error;

use crate::workflow::FieldPath;

mod controller;
mod option;
mod plugin;
mod selector;
mod widget;

pub use controller::{FormPhase, WorkflowFormController};
pub use option::{capitalize, label_text, render_option};
pub use plugin::render_plugin_form;
pub use selector::PluginSelector;
pub use widget::{Binding, Choice, FieldInput, FormAction, InputKind, Widget};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("unknown plugin {0:?}")]
    UnknownPlugin(String),
    #[error("no option template for {0}")]
    UnknownOption(FieldPath),
    #[error("{target} expects {expected} input")]
    InputMismatch {
        target: String,
        expected: &'static str,
    },
    #[error("{input:?} is not a number ({path})")]
    InvalidNumber { path: FieldPath, input: String },
    #[error("{choice:?} is not one of the choices for {path}")]
    UnknownChoice { path: FieldPath, choice: String },
    #[error("{0} holds multiple values and cannot be edited")]
    UnsupportedOption(FieldPath),
    #[error("form is not mounted")]
    NotMounted,
}

pub type FormResult<T> = std::result::Result<T, FormError>;
