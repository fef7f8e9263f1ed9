use crate::errors::FillError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;
use tracing::{debug, instrument};

/// Synthetic events the operator dispatches on page elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomEvent {
    /// Bubbling `input` event, the signal reactive frameworks watch for value changes
    Input,
    /// Lower-level pointer event some widgets open on instead of `click`
    MouseDown,
}

impl fmt::Display for DomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DomEvent::Input => "input",
            DomEvent::MouseDown => "mousedown",
        };
        write!(f, "{name}")
    }
}

/// Represents an element in the target page
#[derive(Debug)]
pub struct PageElement {
    inner: Box<dyn PageElementImpl>,
}

/// Serializable view of a page element, used for diagnostics
///
/// This struct cannot perform any actions. It captures what the element looked
/// like at the time it was taken so it can be logged or compared later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub tag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl From<&PageElement> for ElementSnapshot {
    fn from(element: &PageElement) -> Self {
        Self {
            tag: element.tag(),
            text: element.text(),
            value: element.value(),
            attributes: element.attributes(),
        }
    }
}

/// Interface for page-specific element implementations
pub trait PageElementImpl: Send + Sync + Debug {
    fn object_id(&self) -> usize;
    /// Lowercase tag name
    fn tag(&self) -> String;
    fn attributes(&self) -> BTreeMap<String, String>;
    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes().get(name).cloned()
    }
    /// Concatenated text of the element and its descendants
    fn text_content(&self) -> String;
    /// Current value for form controls, `None` for everything else
    fn value(&self) -> Option<String>;
    fn set_value(&self, value: &str) -> Result<(), FillError>;
    fn click(&self) -> Result<(), FillError>;
    fn dispatch_event(&self, event: DomEvent) -> Result<(), FillError>;

    // Add a method to clone the box
    fn clone_box(&self) -> Box<dyn PageElementImpl>;
}

impl PageElement {
    pub fn new(inner: Box<dyn PageElementImpl>) -> Self {
        Self { inner }
    }

    pub fn object_id(&self) -> usize {
        self.inner.object_id()
    }

    pub fn tag(&self) -> String {
        self.inner.tag()
    }

    pub fn attributes(&self) -> BTreeMap<String, String> {
        self.inner.attributes()
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.attribute(name)
    }

    /// The `type` attribute of an `<input>`, if any
    pub fn input_type(&self) -> Option<String> {
        self.attribute("type").map(|t| t.to_lowercase())
    }

    /// Text content with surrounding whitespace trimmed, as a user would read it
    pub fn text(&self) -> String {
        self.inner.text_content().trim().to_string()
    }

    pub fn value(&self) -> Option<String> {
        self.inner.value()
    }

    /// Assign a value without notifying anyone; see [`PageElement::fill`]
    pub fn set_value(&self, value: &str) -> Result<(), FillError> {
        self.inner.set_value(value)
    }

    pub fn click(&self) -> Result<(), FillError> {
        self.inner.click()
    }

    pub fn dispatch_event(&self, event: DomEvent) -> Result<(), FillError> {
        self.inner.dispatch_event(event)
    }

    /// Assign a value and announce the mutation with a bubbling `input` event.
    ///
    /// The event is not optional: frameworks that keep form state outside the
    /// DOM only pick up the new value when they observe it.
    #[instrument(level = "debug", skip(self, value), fields(tag = %self.tag()))]
    pub fn fill(&self, value: &str) -> Result<(), FillError> {
        self.set_value(value)?;
        self.notify_mutation()
    }

    pub fn notify_mutation(&self) -> Result<(), FillError> {
        debug!("Dispatching input event");
        self.inner.dispatch_event(DomEvent::Input)
    }

    pub fn snapshot(&self) -> ElementSnapshot {
        ElementSnapshot::from(self)
    }
}

impl Clone for PageElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl PartialEq for PageElement {
    fn eq(&self, other: &Self) -> bool {
        self.inner.object_id() == other.inner.object_id()
    }
}

impl Eq for PageElement {}
