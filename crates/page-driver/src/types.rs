//! Core data types exchanged with page drivers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to an element in the current document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an element must afford for a given action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affordance {
    /// Buttons, links, menu items and other click targets
    Clickable,

    /// Inputs, textareas, selects and contenteditable regions
    Editable,
}

/// Interaction dispatched against a located element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Interaction {
    Click,
    Type,
    TypeAndSubmit,
    Select,
}

impl Interaction {
    pub fn name(&self) -> &'static str {
        match self {
            Interaction::Click => "click",
            Interaction::Type => "type",
            Interaction::TypeAndSubmit => "type-and-submit",
            Interaction::Select => "select",
        }
    }
}

/// Filter passed to [`crate::PageDriver::locate_candidates`]
///
/// An empty criteria object returns every element in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocateCriteria {
    /// CSS-like selector; when set only elements answering to it are returned
    pub selector: Option<String>,

    /// Restrict to elements with this affordance
    pub affordance: Option<Affordance>,
}

impl LocateCriteria {
    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            affordance: None,
        }
    }

    pub fn affordance(affordance: Affordance) -> Self {
        Self {
            selector: None,
            affordance: Some(affordance),
        }
    }

    pub fn all() -> Self {
        Self::default()
    }
}

/// Identifying attributes of an element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementAttributes {
    pub id: Option<String>,
    pub name: Option<String>,
    pub placeholder: Option<String>,
    pub aria_label: Option<String>,
    pub class: Option<String>,
    pub input_type: Option<String>,
}

/// Candidate element summary
///
/// Produced fresh by every locate call; never cached across page mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub element_ref: ElementRef,
    pub tag: String,
    pub role: Option<String>,
    pub text: String,
    pub attributes: ElementAttributes,
    pub visible: bool,
    pub width: f64,
    pub height: f64,
    /// Position in document order
    pub dom_index: usize,
    pub clickable: bool,
    pub editable: bool,
    /// Ranking score assigned by the locator (drivers leave it at 0)
    #[serde(default)]
    pub score: f64,
}

impl ElementDescriptor {
    /// Visible with a non-zero on-screen box
    pub fn is_interactable(&self) -> bool {
        self.visible && self.width > 0.0 && self.height > 0.0
    }

    pub fn affords(&self, affordance: Affordance) -> bool {
        match affordance {
            Affordance::Clickable => self.clickable,
            Affordance::Editable => self.editable,
        }
    }

    /// Short human readable label used in logs and thinking entries
    pub fn label(&self) -> String {
        let text = self.text.trim();
        if !text.is_empty() {
            return format!("{} \"{}\"", self.tag, truncate(text, 40));
        }
        if let Some(label) = self
            .attributes
            .aria_label
            .as_deref()
            .or(self.attributes.placeholder.as_deref())
            .or(self.attributes.name.as_deref())
            .or(self.attributes.id.as_deref())
        {
            return format!("{} [{}]", self.tag, truncate(label, 40));
        }
        format!("{} {}", self.tag, self.element_ref)
    }
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        format!("{}…", value.chars().take(max).collect::<String>())
    }
}

/// Result of a single interaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractOutcome {
    /// Whether the interaction caused a navigation
    pub navigated: bool,

    /// URL after the interaction
    pub url_after: Option<String>,
}

/// Serialized view of the page handed to the analysis collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub elements: Vec<ElementDescriptor>,
}

impl PageSnapshot {
    /// Interactive, visible elements only
    pub fn interactive(&self) -> impl Iterator<Item = &ElementDescriptor> {
        self.elements
            .iter()
            .filter(|el| el.is_interactable() && (el.clickable || el.editable))
    }
}
