use crate::workflow::FieldPath;

/// Where edits made through a widget are routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Field(FieldPath),
    PluginSelection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAction {
    Submit,
}

/// Raw user input coming back from a rendered widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldInput {
    Text(String),
    Checked(bool),
    Selected(String),
}

/// Presentation-agnostic widget tree produced by the form renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Widget {
    Section(Vec<Widget>),
    Row(Vec<Widget>),
    Heading {
        level: u8,
        text: String,
    },
    Label {
        target: Option<String>,
        text: String,
    },
    Select {
        id: String,
        choices: Vec<Choice>,
        selected: Option<String>,
        binding: Binding,
    },
    Toggle {
        id: String,
        checked: bool,
        binding: Binding,
    },
    Input {
        id: String,
        kind: InputKind,
        value: String,
        placeholder: Option<String>,
        binding: Binding,
    },
    /// Stand-in for options that have no editor.
    Unsupported {
        id: String,
    },
    Error(String),
    Banner(String),
    Button {
        label: String,
        enabled: bool,
        action: FormAction,
    },
}

impl Widget {
    pub fn children(&self) -> &[Widget] {
        match self {
            Self::Section(children) | Self::Row(children) => children.as_slice(),
            _ => &[],
        }
    }

    pub fn is_empty_container(&self) -> bool {
        match self {
            Self::Section(children) | Self::Row(children) => children.is_empty(),
            _ => false,
        }
    }

    /// Depth-first list of this widget and all of its descendants.
    pub fn descendants(&self) -> Vec<&Widget> {
        let mut out = vec![self];
        for child in self.children() {
            out.extend(child.descendants());
        }
        out
    }

    pub fn binding(&self) -> Option<&Binding> {
        match self {
            Self::Select { binding, .. }
            | Self::Toggle { binding, .. }
            | Self::Input { binding, .. } => Some(binding),
            _ => None,
        }
    }

    /// First descendant bound to `binding`.
    pub fn find_bound(&self, binding: &Binding) -> Option<&Widget> {
        self.descendants()
            .into_iter()
            .find(|widget| widget.binding() == Some(binding))
    }

    pub fn errors(&self) -> Vec<&str> {
        self.descendants()
            .into_iter()
            .filter_map(|widget| match widget {
                Self::Error(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }
}
