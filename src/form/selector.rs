use super::option::capitalize;
use super::plugin::render_plugin_form;
use super::widget::{Binding, Choice, Widget};
use super::{FormError, FormResult};
use crate::schema::{PluginTemplate, TemplateRegistry};
use crate::workflow::{ValidationErrors, Workflow};

const SELECTOR_LABEL: &str = "Configure plugin";

/// Tracks which plugin's options are shown in the workflow form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginSelector {
    selected: Option<String>,
}

impl PluginSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chosen plugin, falling back to the first one in the registry.
    pub fn active<'a>(&self, registry: &'a TemplateRegistry) -> Option<&'a PluginTemplate> {
        self.selected
            .as_deref()
            .and_then(|name| registry.plugin(name))
            .or_else(|| registry.first())
    }

    pub fn select(&mut self, registry: &TemplateRegistry, plugin: &str) -> FormResult<()> {
        if registry.plugin(plugin).is_none() {
            return Err(FormError::UnknownPlugin(plugin.to_string()));
        }
        tracing::debug!(plugin, "plugin selected");
        self.selected = Some(plugin.to_string());
        Ok(())
    }

    /// Selector label, plugin dropdown and the active plugin's options.
    /// An empty registry renders an empty row.
    pub fn render(
        &self,
        registry: &TemplateRegistry,
        workflow: &Workflow,
        errors: &ValidationErrors,
    ) -> Widget {
        let Some(active) = self.active(registry) else {
            return Widget::Row(Vec::new());
        };
        let choices = registry
            .plugins()
            .iter()
            .map(|plugin| Choice {
                value: plugin.name.clone(),
                label: capitalize(&plugin.name),
            })
            .collect();

        Widget::Row(vec![
            Widget::Label {
                target: Some("plugin".to_string()),
                text: SELECTOR_LABEL.to_string(),
            },
            Widget::Select {
                id: "plugin".to_string(),
                choices,
                selected: Some(active.name.clone()),
                binding: Binding::PluginSelection,
            },
            render_plugin_form(active, workflow, errors),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TemplateRegistry {
        TemplateRegistry::from_json(
            r#"{
                "tesseract": {"language": {"value": ["eng", "deu"], "selectable": true}},
                "scantailor": {"rotate": {"value": 0}},
                "pdfBeads": {"title": {"value": ""}}
            }"#,
        )
        .expect("templates parse")
    }

    fn heading(widget: &Widget) -> Option<&str> {
        widget.descendants().into_iter().find_map(|child| match child {
            Widget::Heading { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    #[test]
    fn defaults_to_first_plugin() {
        let registry = registry();
        let selector = PluginSelector::new();
        let view = selector.render(&registry, &Workflow::new("book"), &ValidationErrors::new());

        assert_eq!(heading(&view), Some("tesseract"));
        assert!(matches!(
            &view.children()[1],
            Widget::Select { selected: Some(name), choices, .. }
                if name == "tesseract"
                    && choices[1].label == "Scantailor"
                    && choices[2].label == "Pdfbeads"
                    && choices[2].value == "pdfBeads"
        ));
    }

    #[test]
    fn select_switches_rendered_plugin() {
        let registry = registry();
        let mut selector = PluginSelector::new();
        selector.select(&registry, "scantailor").expect("known plugin");

        let view = selector.render(&registry, &Workflow::new("book"), &ValidationErrors::new());
        assert_eq!(heading(&view), Some("scantailor"));
    }

    #[test]
    fn select_rejects_unknown_plugin() {
        let registry = registry();
        let mut selector = PluginSelector::new();
        assert_eq!(
            selector.select(&registry, "djvubind"),
            Err(FormError::UnknownPlugin("djvubind".to_string()))
        );
        assert_eq!(selector.active(&registry).map(|p| p.name.as_str()), Some("tesseract"));
    }

    #[test]
    fn empty_registry_renders_empty_row() {
        let view = PluginSelector::new().render(
            &TemplateRegistry::default(),
            &Workflow::new("book"),
            &ValidationErrors::new(),
        );
        assert_eq!(view, Widget::Row(Vec::new()));
        assert!(view.is_empty_container());
    }
}
