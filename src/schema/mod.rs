use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::workflow::OptionValue;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("template document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read template file: {0}")]
    Io(#[from] std::io::Error),
    #[error("template for plugin {plugin:?} must be an object")]
    InvalidPlugin { plugin: String },
    #[error("option {plugin}.{key} has an object value, which cannot be rendered")]
    InvalidValue { plugin: String, key: String },
}

pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

/// Templates used when no template document is configured.
pub const SAMPLE_TEMPLATES: &str = r#"{
    "scantailor": {
        "rotate": {"value": 0, "docstring": "Rotation in degrees"},
        "autopilot": {"value": true, "docstring": "Process pages without review"},
        "content": {"value": ["normal", "aggressive", "off"], "selectable": true}
    },
    "tesseract": {
        "language": {"value": ["eng", "deu", "fra"], "selectable": true, "docstring": "OCR language"}
    },
    "pdfbeads": {
        "title": {"value": null}
    }
}"#;

/// Input kind of an option, decided once when the template is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionKind {
    Toggle(bool),
    Number(serde_json::Number),
    Text(String),
    /// Pick one of the listed strings.
    Choice(Vec<String>),
    /// Multi-valued options have no input widget.
    Unsupported,
}

impl OptionKind {
    fn classify(value: Value, selectable: bool) -> Option<Self> {
        match value {
            Value::Array(items) if selectable => items
                .into_iter()
                .map(|item| match item {
                    Value::String(choice) => Some(choice),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Self::Choice)
                .or(Some(Self::Unsupported)),
            Value::Array(_) => Some(Self::Unsupported),
            Value::Bool(value) => Some(Self::Toggle(value)),
            Value::Number(value) => Some(Self::Number(value)),
            Value::String(value) => Some(Self::Text(value)),
            Value::Null => Some(Self::Text(String::new())),
            Value::Object(_) => None,
        }
    }

    /// Value an unconfigured workflow starts out with.
    pub fn default_value(&self) -> Option<OptionValue> {
        match self {
            Self::Toggle(value) => Some(OptionValue::Bool(*value)),
            Self::Number(value) => Some(OptionValue::Number(value.clone())),
            Self::Text(value) => Some(OptionValue::Text(value.clone())),
            Self::Choice(choices) => choices.first().cloned().map(OptionValue::Text),
            Self::Unsupported => None,
        }
    }

    pub fn accepts(&self, value: &OptionValue) -> bool {
        match (self, value) {
            (Self::Toggle(_), OptionValue::Bool(_)) => true,
            (Self::Number(_), OptionValue::Number(_)) => true,
            (Self::Text(_), OptionValue::Text(_)) => true,
            (Self::Choice(choices), OptionValue::Text(choice)) => choices.contains(choice),
            (Self::Unsupported, _) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSchema {
    pub kind: OptionKind,
    pub docstring: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    #[serde(default)]
    value: Value,
    #[serde(default)]
    selectable: bool,
    #[serde(default)]
    docstring: Option<String>,
}

/// Option schemas of one plugin, in template order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginTemplate {
    pub name: String,
    pub options: Vec<(String, OptionSchema)>,
}

impl PluginTemplate {
    pub fn option(&self, key: &str) -> Option<&OptionSchema> {
        self.options
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, schema)| schema)
    }
}

/// All plugin templates known to the application, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateRegistry {
    plugins: Vec<PluginTemplate>,
}

impl TemplateRegistry {
    pub fn new(plugins: Vec<PluginTemplate>) -> Self {
        Self { plugins }
    }

    /// Parses the `{plugin: {option: {value, docstring, selectable}}}` document
    /// served by the scanner backend.
    pub fn from_json(document: &str) -> SchemaResult<Self> {
        let root: Map<String, Value> = serde_json::from_str(document)?;
        let mut plugins = Vec::with_capacity(root.len());
        for (plugin, options) in root {
            let Value::Object(options) = options else {
                return Err(SchemaError::InvalidPlugin { plugin });
            };
            let mut parsed = Vec::with_capacity(options.len());
            for (key, raw) in options {
                let raw: RawOption = serde_json::from_value(raw)?;
                let kind = OptionKind::classify(raw.value, raw.selectable).ok_or_else(|| {
                    SchemaError::InvalidValue {
                        plugin: plugin.clone(),
                        key: key.clone(),
                    }
                })?;
                parsed.push((
                    key,
                    OptionSchema {
                        kind,
                        docstring: raw.docstring.filter(|doc| !doc.is_empty()),
                    },
                ));
            }
            plugins.push(PluginTemplate {
                name: plugin,
                options: parsed,
            });
        }
        tracing::debug!(plugins = plugins.len(), "loaded plugin templates");
        Ok(Self { plugins })
    }

    pub fn load(path: &Path) -> SchemaResult<Self> {
        let document = std::fs::read_to_string(path)?;
        Self::from_json(&document)
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn plugins(&self) -> &[PluginTemplate] {
        &self.plugins
    }

    pub fn first(&self) -> Option<&PluginTemplate> {
        self.plugins.first()
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginTemplate> {
        self.plugins.iter().find(|plugin| plugin.name == name)
    }

    pub fn option(&self, plugin: &str, key: &str) -> Option<&OptionSchema> {
        self.plugin(plugin).and_then(|template| template.option(key))
    }
}
