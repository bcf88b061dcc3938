use super::widget::{Binding, Choice, InputKind, Widget};
use crate::schema::{OptionKind, OptionSchema};
use crate::workflow::OptionValue;

/// Uppercases the first character and lowercases the rest.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect(),
        None => String::new(),
    }
}

/// The option's docstring, or its capitalized name when it has none.
pub fn label_text(name: &str, schema: &OptionSchema) -> String {
    schema
        .docstring
        .clone()
        .unwrap_or_else(|| capitalize(name))
}

/// Renders a single plugin option as a row of label, input and error.
///
/// Checkboxes put the input before the label; every other kind leads with the
/// label. A present error is rendered after the input.
pub fn render_option(
    name: &str,
    schema: &OptionSchema,
    current: Option<&OptionValue>,
    error: Option<&str>,
    binding: Binding,
) -> Widget {
    let id = name.to_string();
    let label = Widget::Label {
        target: Some(id.clone()),
        text: label_text(name, schema),
    };
    let text_of = |fallback: String| current.map_or(fallback, OptionValue::display_text);

    let mut row = match &schema.kind {
        OptionKind::Toggle(default) => {
            let checked = current.and_then(OptionValue::as_bool).unwrap_or(*default);
            vec![Widget::Toggle { id, checked, binding }, label]
        }
        OptionKind::Number(default) => vec![
            label,
            Widget::Input {
                id,
                kind: InputKind::Number,
                value: text_of(default.to_string()),
                placeholder: None,
                binding,
            },
        ],
        OptionKind::Text(default) => vec![
            label,
            Widget::Input {
                id,
                kind: InputKind::Text,
                value: text_of(default.clone()),
                placeholder: None,
                binding,
            },
        ],
        OptionKind::Choice(choices) => {
            let selected = current
                .and_then(OptionValue::as_text)
                .filter(|value| choices.iter().any(|choice| choice.as_str() == *value))
                .or_else(|| choices.first().map(String::as_str))
                .map(str::to_string);
            let choices = choices
                .iter()
                .map(|choice| Choice {
                    value: choice.clone(),
                    label: choice.clone(),
                })
                .collect();
            vec![
                label,
                Widget::Select {
                    id,
                    choices,
                    selected,
                    binding,
                },
            ]
        }
        OptionKind::Unsupported => vec![label, Widget::Unsupported { id }],
    };

    if let Some(message) = error {
        row.push(Widget::Error(message.to_string()));
    }
    Widget::Row(row)
}
