use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

mod collection;
mod errors;
mod memory;
mod service;

pub use collection::{UpsertOutcome, WorkflowCollection};
pub use errors::ValidationErrors;
pub use memory::InMemoryWorkflowService;
pub use service::{CaptureReceipt, CommandError, SaveError, WorkflowService};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const THUMB_SUFFIX: &str = "/thumb";

/// Per-plugin option values keyed by plugin name, then option key.
pub type PluginConfig = BTreeMap<String, BTreeMap<String, OptionValue>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub u64);

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-side location of one captured image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full-size image URL. `cache_bust` forces clients past any cached copy.
    pub fn full_url(&self, cache_bust: Option<u64>) -> String {
        with_cache_bust(self.0.clone(), cache_bust)
    }

    pub fn thumb_url(&self, cache_bust: Option<u64>) -> String {
        with_cache_bust(format!("{}{THUMB_SUFFIX}", self.0), cache_bust)
    }
}

fn with_cache_bust(url: String, cache_bust: Option<u64>) -> String {
    match cache_bust {
        Some(token) => format!("{url}?{token}"),
        None => url,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<String>),
}

impl OptionValue {
    /// Text shown inside an input bound to this value.
    pub fn display_text(&self) -> String {
        match self {
            Self::Bool(value) => value.to_string(),
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value.clone(),
            Self::List(values) => values.join(", "),
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Dotted address of a bindable workflow field, as used by validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldPath {
    Name,
    Option { plugin: String, key: String },
}

impl FieldPath {
    pub fn option(plugin: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Option {
            plugin: plugin.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => f.write_str("name"),
            Self::Option { plugin, key } => write!(f, "config.{plugin}.{key}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid field path: {0:?}")]
pub struct InvalidFieldPath(pub String);

impl FromStr for FieldPath {
    type Err = InvalidFieldPath;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw == "name" {
            return Ok(Self::Name);
        }
        let mut parts = raw.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("config"), Some(plugin), Some(key)) if !plugin.is_empty() && !key.is_empty() => {
                Ok(Self::option(plugin, key))
            }
            _ => Err(InvalidFieldPath(raw.to_string())),
        }
    }
}

/// One scanning job: metadata, captured pages and per-plugin configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<WorkflowId>,
    pub name: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub config: PluginConfig,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn page_count(&self) -> usize {
        self.images.len()
    }

    pub fn option(&self, plugin: &str, key: &str) -> Option<&OptionValue> {
        self.config.get(plugin).and_then(|options| options.get(key))
    }

    /// Returns the snapshot that results from applying `intent`.
    pub fn apply(&self, intent: &WorkflowIntent) -> Self {
        let mut next = self.clone();
        match intent {
            WorkflowIntent::SetName(name) => next.name = name.clone(),
            WorkflowIntent::SetOption { plugin, key, value } => {
                next.config
                    .entry(plugin.clone())
                    .or_default()
                    .insert(key.clone(), value.clone());
            }
            WorkflowIntent::ReplaceImages(images) => next.images = images.clone(),
        }
        next
    }

    /// Client-side checks that must pass before a save is attempted.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let name = self.name.trim();
        if name.is_empty() {
            errors.insert(FieldPath::Name, "Workflow name must not be empty");
        } else if name.contains('/') {
            errors.insert(FieldPath::Name, "Workflow name must not contain '/'");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowIntent {
    SetName(String),
    SetOption {
        plugin: String,
        key: String,
        value: OptionValue,
    },
    ReplaceImages(Vec<ImageRef>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    Changed(Workflow),
    ValidationFailed {
        workflow: Workflow,
        errors: ValidationErrors,
    },
    Synced(Workflow),
}

/// Owner of the current workflow snapshot.
///
/// Controllers never mutate a workflow directly: they dispatch intents here and
/// observe the resulting [`WorkflowEvent`]s through [`WorkflowHandle::subscribe`].
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    current: Mutex<Workflow>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowHandle {
    pub fn new(workflow: Workflow) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(HandleInner {
                current: Mutex::new(workflow),
                events,
            }),
        }
    }

    pub fn snapshot(&self) -> Workflow {
        self.inner.current.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.inner.events.subscribe()
    }

    pub fn dispatch(&self, intent: WorkflowIntent) -> Workflow {
        let next = {
            let mut current = self.inner.current.lock();
            *current = current.apply(&intent);
            current.clone()
        };
        tracing::trace!(?intent, "applied workflow intent");
        self.emit(WorkflowEvent::Changed(next.clone()));
        next
    }

    /// Runs client-side validation, announcing failures to subscribers.
    pub fn validate(&self) -> bool {
        let workflow = self.snapshot();
        match workflow.validate() {
            Ok(()) => true,
            Err(errors) => {
                tracing::debug!(fields = errors.len(), "workflow failed local validation");
                self.emit(WorkflowEvent::ValidationFailed { workflow, errors });
                false
            }
        }
    }

    /// Adopts the persisted form of the workflow (e.g. its new id).
    pub fn mark_synced(&self, saved: Workflow) {
        *self.inner.current.lock() = saved.clone();
        self.emit(WorkflowEvent::Changed(saved.clone()));
        self.emit(WorkflowEvent::Synced(saved));
    }

    fn emit(&self, event: WorkflowEvent) {
        if self.inner.events.send(event).is_err() {
            tracing::trace!("workflow event dropped; no subscribers");
        }
    }
}
