use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};

use super::selector::PluginSelector;
use super::widget::{Binding, FieldInput, FormAction, InputKind, Widget};
use super::{FormError, FormResult};
use crate::command::{CommandKind, CommandRunner};
use crate::navigation::{Navigator, Route};
use crate::schema::{OptionKind, TemplateRegistry};
use crate::workflow::{
    FieldPath, OptionValue, SaveError, ValidationErrors, Workflow, WorkflowCollection,
    WorkflowEvent, WorkflowHandle, WorkflowIntent, WorkflowService,
};

const NOT_A_NUMBER_MESSAGE: &str = "Please enter a number";
const NAME_LABEL: &str = "Workflow name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormPhase {
    #[default]
    Editing,
    Submitting,
}

/// Create/edit form for a single workflow.
///
/// Edits are dispatched to the [`WorkflowHandle`]; the controller's own copy of
/// the workflow and its error map only change through the handle's events.
pub struct WorkflowFormController {
    handle: WorkflowHandle,
    templates: Arc<TemplateRegistry>,
    collection: WorkflowCollection,
    workflow: Workflow,
    selector: PluginSelector,
    errors: ValidationErrors,
    banner: Option<String>,
    phase: FormPhase,
    events: Option<broadcast::Receiver<WorkflowEvent>>,
}

impl WorkflowFormController {
    pub fn mount(
        handle: WorkflowHandle,
        templates: Arc<TemplateRegistry>,
        collection: WorkflowCollection,
    ) -> Self {
        let events = handle.subscribe();
        let workflow = handle.snapshot();
        tracing::debug!(workflow = ?workflow.id, "workflow form mounted");
        Self {
            handle,
            templates,
            collection,
            workflow,
            selector: PluginSelector::new(),
            errors: ValidationErrors::new(),
            banner: None,
            phase: FormPhase::Editing,
            events: Some(events),
        }
    }

    /// Drops the event subscription. Outstanding saves still complete, but no
    /// longer touch the form state.
    pub fn unmount(&mut self) {
        if self.events.take().is_some() {
            tracing::debug!(workflow = ?self.workflow.id, "workflow form unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.events.is_some()
    }

    pub fn phase(&self) -> FormPhase {
        self.phase
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn selector(&self) -> &PluginSelector {
        &self.selector
    }

    /// Applies every workflow event received since the last call.
    pub fn pump_events(&mut self) {
        let Some(events) = self.events.as_mut() else {
            return;
        };
        loop {
            match events.try_recv() {
                Ok(WorkflowEvent::Changed(workflow)) => self.workflow = workflow,
                Ok(WorkflowEvent::ValidationFailed { workflow, errors }) => {
                    self.workflow = workflow;
                    self.errors.replace(errors);
                }
                Ok(WorkflowEvent::Synced(saved)) => {
                    let outcome = self.collection.upsert(saved);
                    tracing::debug!(?outcome, "persisted workflow added to collection");
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "workflow form lagged behind workflow events");
                    self.workflow = self.handle.snapshot();
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    /// Routes raw widget input to the workflow, converting it to the option's
    /// type first.
    ///
    /// Unparsable numbers are also recorded as a field error at the option's
    /// path.
    pub fn update(&mut self, binding: &Binding, input: FieldInput) -> FormResult<()> {
        if !self.is_mounted() {
            return Err(FormError::NotMounted);
        }
        let intent = match (binding, input) {
            (Binding::PluginSelection, FieldInput::Selected(plugin)) => {
                return self.selector.select(&self.templates, &plugin);
            }
            (Binding::PluginSelection, _) => {
                return Err(FormError::InputMismatch {
                    target: "plugin".to_string(),
                    expected: "selection",
                });
            }
            (Binding::Field(FieldPath::Name), FieldInput::Text(name)) => {
                WorkflowIntent::SetName(name)
            }
            (Binding::Field(path @ FieldPath::Name), _) => {
                return Err(FormError::InputMismatch {
                    target: path.to_string(),
                    expected: "text",
                });
            }
            (Binding::Field(path @ FieldPath::Option { plugin, key }), input) => {
                let kind = self
                    .templates
                    .option(plugin, key)
                    .map(|schema| schema.kind.clone())
                    .ok_or_else(|| FormError::UnknownOption(path.clone()))?;
                let value = match convert_input(path, &kind, input) {
                    Ok(value) => value,
                    Err(err @ FormError::InvalidNumber { .. }) => {
                        self.errors.insert(path, NOT_A_NUMBER_MESSAGE);
                        return Err(err);
                    }
                    Err(err) => return Err(err),
                };
                let path_key = path.to_string();
                if self.errors.get(&path_key) == Some(NOT_A_NUMBER_MESSAGE) {
                    self.errors.remove(&path_key);
                }
                WorkflowIntent::SetOption {
                    plugin: plugin.clone(),
                    key: key.clone(),
                    value,
                }
            }
        };
        self.handle.dispatch(intent);
        self.pump_events();
        Ok(())
    }

    /// Enters `Submitting` and returns the workflow to persist.
    ///
    /// Returns `None` while a save is already pending, or when local
    /// validation fails; in the latter case the form is back in `Editing`
    /// with the validation errors shown.
    pub fn begin_submit(&mut self) -> Option<Workflow> {
        if self.phase == FormPhase::Submitting {
            tracing::debug!("submit ignored; save already pending");
            return None;
        }
        self.phase = FormPhase::Submitting;
        self.banner = None;
        if !self.handle.validate() {
            self.pump_events();
            self.phase = FormPhase::Editing;
            return None;
        }
        Some(self.handle.snapshot())
    }

    pub fn finish_submit(&mut self, outcome: Result<Workflow, SaveError>, navigator: &dyn Navigator) {
        match outcome {
            Ok(saved) => {
                let id = saved.id;
                self.handle.mark_synced(saved);
                self.pump_events();
                match id {
                    Some(id) => navigator.navigate(Route::Capture(id)),
                    None => tracing::warn!("saved workflow came back without an id"),
                }
            }
            Err(SaveError::Invalid(errors)) => {
                tracing::debug!(fields = errors.len(), "save rejected by validation");
                self.errors.merge(errors);
            }
            Err(SaveError::Command(err)) => {
                tracing::warn!(%err, "saving workflow failed");
                self.banner = Some(format!("Saving failed: {err}"));
            }
        }
        if self.is_mounted() {
            self.phase = FormPhase::Editing;
        }
    }

    /// Validates, persists and, on success, navigates to the capture screen.
    /// Returns whether the workflow was saved.
    pub async fn submit<S>(
        &mut self,
        service: &S,
        runner: &CommandRunner,
        navigator: &dyn Navigator,
    ) -> bool
    where
        S: WorkflowService + ?Sized,
    {
        let Some(workflow) = self.begin_submit() else {
            return false;
        };
        let outcome = runner.run(CommandKind::Save, service.save(&workflow)).await;
        let saved = outcome.is_ok();
        self.finish_submit(outcome, navigator);
        saved
    }

    pub fn view(&self) -> Widget {
        let header = match self.workflow.id {
            Some(_) => format!("Edit workflow {}", self.workflow.name),
            None => "Create workflow".to_string(),
        };
        let mut name_row = vec![
            Widget::Label {
                target: Some("name".to_string()),
                text: NAME_LABEL.to_string(),
            },
            Widget::Input {
                id: "name".to_string(),
                kind: InputKind::Text,
                value: self.workflow.name.clone(),
                placeholder: Some("Workflow name".to_string()),
                binding: Binding::Field(FieldPath::Name),
            },
        ];
        if let Some(message) = self.errors.for_field(&FieldPath::Name) {
            name_row.push(Widget::Error(message.to_string()));
        }

        let mut children = vec![Widget::Heading {
            level: 2,
            text: header,
        }];
        if let Some(banner) = &self.banner {
            children.push(Widget::Banner(banner.clone()));
        }
        children.push(Widget::Row(name_row));
        children.push(
            self.selector
                .render(&self.templates, &self.workflow, &self.errors),
        );
        children.push(Widget::Button {
            label: "Submit".to_string(),
            enabled: self.phase == FormPhase::Editing,
            action: FormAction::Submit,
        });
        Widget::Section(children)
    }
}

fn convert_input(path: &FieldPath, kind: &OptionKind, input: FieldInput) -> FormResult<OptionValue> {
    match (kind, input) {
        (OptionKind::Toggle(_), FieldInput::Checked(checked)) => Ok(OptionValue::Bool(checked)),
        (OptionKind::Number(_), FieldInput::Text(text)) => parse_number(&text)
            .map(OptionValue::Number)
            .ok_or_else(|| FormError::InvalidNumber {
                path: path.clone(),
                input: text,
            }),
        (OptionKind::Text(_), FieldInput::Text(text)) => Ok(OptionValue::Text(text)),
        (OptionKind::Choice(choices), FieldInput::Selected(choice)) => {
            if choices.contains(&choice) {
                Ok(OptionValue::Text(choice))
            } else {
                Err(FormError::UnknownChoice {
                    path: path.clone(),
                    choice,
                })
            }
        }
        (OptionKind::Unsupported, _) => Err(FormError::UnsupportedOption(path.clone())),
        (kind, _) => Err(FormError::InputMismatch {
            target: path.to_string(),
            expected: match kind {
                OptionKind::Toggle(_) => "checkbox",
                OptionKind::Choice(_) => "selection",
                _ => "text",
            },
        }),
    }
}

fn parse_number(text: &str) -> Option<serde_json::Number> {
    let text = text.trim();
    if let Ok(integer) = text.parse::<i64>() {
        return Some(integer.into());
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
}
