use super::option::render_option;
use super::widget::{Binding, Widget};
use crate::schema::PluginTemplate;
use crate::workflow::{FieldPath, ValidationErrors, Workflow};

/// Heading plus one option row per template entry, in template order.
///
/// Errors are looked up under `config.<plugin>.<key>`.
pub fn render_plugin_form(
    template: &PluginTemplate,
    workflow: &Workflow,
    errors: &ValidationErrors,
) -> Widget {
    let mut rows = Vec::with_capacity(template.options.len() + 1);
    rows.push(Widget::Heading {
        level: 3,
        text: template.name.clone(),
    });
    rows.extend(template.options.iter().map(|(key, schema)| {
        let path = FieldPath::option(&template.name, key);
        render_option(
            key,
            schema,
            workflow.option(&template.name, key),
            errors.for_field(&path),
            Binding::Field(path),
        )
    }));
    Widget::Row(rows)
}
