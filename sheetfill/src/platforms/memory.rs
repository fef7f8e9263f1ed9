//! In-memory page for dry runs and tests
//!
//! Models just enough of a Material UI form to exercise the operator: plain
//! inputs with values and event logs, and `Select` widgets whose popup list is
//! mounted only after the trigger receives the right pointer event and then
//! renders after a delay. Time is read from `tokio::time`, so tests running on
//! a paused clock see popups appear as virtual time advances.

use crate::element::{DomEvent, PageElement, PageElementImpl};
use crate::errors::FillError;
use crate::platforms::PageEngine;
use crate::selector::{Compound, Selector};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const BODY: usize = 0;
const FORM: usize = 1;

/// Handle to a node created through the [`MemoryPage`] builder methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Something the operator did to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Click,
    Event(DomEvent),
    SetValue(String),
}

/// Which pointer event opens a combobox popup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenOn {
    Click,
    #[default]
    MouseDown,
}

/// How popup options are marked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionMarkup {
    /// `li[role="option"].MuiMenuItem-root`
    #[default]
    MenuItem,
    /// Bare `li` children of the listbox, no role or class
    PlainList,
}

/// Builder for a Material UI style `Select`
#[derive(Debug, Clone)]
pub struct ComboBox {
    options: Vec<String>,
    open_on: OpenOn,
    open_delay: Duration,
    opens: bool,
    markup: OptionMarkup,
    revealed_by: Option<NodeId>,
    reveal_delay: Duration,
}

impl ComboBox {
    pub fn new<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: options.into_iter().map(Into::into).collect(),
            open_on: OpenOn::default(),
            open_delay: Duration::from_millis(200),
            opens: true,
            markup: OptionMarkup::default(),
            revealed_by: None,
            reveal_delay: Duration::ZERO,
        }
    }

    pub fn open_on(mut self, open_on: OpenOn) -> Self {
        self.open_on = open_on;
        self
    }

    /// How long after opening the popup takes to render
    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// The popup never mounts, whatever the trigger receives
    pub fn never_opens(mut self) -> Self {
        self.opens = false;
        self
    }

    pub fn markup(mut self, markup: OptionMarkup) -> Self {
        self.markup = markup;
        self
    }

    /// Keep the widget unmounted until `trigger` has a selection
    pub fn revealed_by(mut self, trigger: NodeId) -> Self {
        self.revealed_by = Some(trigger);
        self
    }

    /// How long after the revealing selection the widget takes to mount
    pub fn reveal_delay(mut self, delay: Duration) -> Self {
        self.reveal_delay = delay;
        self
    }
}

#[derive(Debug)]
enum Behavior {
    Plain,
    Trigger {
        combo: ComboBox,
        native_input: usize,
        popup: Option<usize>,
        /// Hidden wrappers mounted by a selection, with their mount delay
        dependents: Vec<(usize, Duration)>,
    },
    Option {
        trigger: usize,
        popup: usize,
    },
}

#[derive(Debug)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    value: Option<String>,
    children: Vec<usize>,
    parent: Option<usize>,
    detached: bool,
    rendered_at: Option<Instant>,
    behavior: Behavior,
}

#[derive(Debug, Default)]
struct Dom {
    nodes: Vec<Node>,
    interactions: Vec<(usize, Interaction)>,
}

impl Dom {
    fn new() -> Self {
        let mut dom = Dom::default();
        dom.create(None, "body", &[], "");
        dom.create(Some(BODY), "form", &[], "");
        dom
    }

    fn create(&mut self, parent: Option<usize>, tag: &str, attrs: &[(&str, &str)], text: &str) -> usize {
        let tag = tag.to_lowercase();
        let value = matches!(tag.as_str(), "input" | "textarea" | "select").then(String::new);
        let id = self.nodes.len();
        self.nodes.push(Node {
            tag,
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            text: text.to_string(),
            value,
            children: Vec::new(),
            parent,
            detached: false,
            rendered_at: None,
            behavior: Behavior::Plain,
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(id);
        }
        id
    }

    fn is_rendered(&self, id: usize, now: Instant) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id];
            if node.detached || node.rendered_at.is_some_and(|at| at > now) {
                return false;
            }
            current = node.parent;
        }
        true
    }

    fn document_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![BODY];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    fn text_content(&self, id: usize) -> String {
        let node = &self.nodes[id];
        let mut text = node.text.clone();
        for &child in &node.children {
            if !self.nodes[child].detached {
                text.push_str(&self.text_content(child));
            }
        }
        text
    }

    fn position_in_parent(&self, id: usize) -> Option<usize> {
        let parent = self.nodes[id].parent?;
        self.nodes[parent]
            .children
            .iter()
            .filter(|&&c| !self.nodes[c].detached)
            .position(|&c| c == id)
            .map(|p| p + 1)
    }

    fn matches_compound(&self, id: usize, compound: &Compound) -> bool {
        let node = &self.nodes[id];
        if compound.tag.as_ref().is_some_and(|t| *t != node.tag) {
            return false;
        }
        if !compound.classes.is_empty() {
            let classes: Vec<&str> = node
                .attributes
                .get("class")
                .map(|c| c.split_whitespace().collect())
                .unwrap_or_default();
            if !compound.classes.iter().all(|c| classes.contains(&c.as_str())) {
                return false;
            }
        }
        for (name, expected) in &compound.attributes {
            match (node.attributes.get(name), expected) {
                (None, _) => return false,
                (Some(actual), Some(expected)) if actual != expected => return false,
                _ => {}
            }
        }
        match compound.nth_child {
            Some(n) => self.position_in_parent(id) == Some(n),
            None => true,
        }
    }

    fn matches(&self, id: usize, selector: &Selector) -> Result<bool, FillError> {
        match selector {
            Selector::Compound(c) => Ok(self.matches_compound(id, c)),
            Selector::Child { parent, child } => {
                if !self.matches_compound(id, child) {
                    return Ok(false);
                }
                match self.nodes[id].parent {
                    Some(p) => self.matches(p, parent),
                    None => Ok(false),
                }
            }
            Selector::Any(parts) => {
                for part in parts {
                    if self.matches(id, part)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Selector::Invalid(reason) => Err(FillError::InvalidSelector(reason.clone())),
        }
    }

    fn record(&mut self, id: usize, interaction: Interaction) {
        self.interactions.push((id, interaction));
    }

    fn click(&mut self, id: usize) {
        self.record(id, Interaction::Click);
        let (opens, commits) = match &self.nodes[id].behavior {
            Behavior::Trigger { combo, .. } => (combo.open_on == OpenOn::Click, false),
            Behavior::Option { .. } => (false, true),
            Behavior::Plain => (false, false),
        };
        if opens {
            self.open_popup(id);
        } else if commits {
            self.commit_option(id);
        }
    }

    fn dispatch(&mut self, id: usize, event: DomEvent) {
        self.record(id, Interaction::Event(event));
        let opens = matches!(
            &self.nodes[id].behavior,
            Behavior::Trigger { combo, .. } if combo.open_on == OpenOn::MouseDown
        );
        if opens && event == DomEvent::MouseDown {
            self.open_popup(id);
        }
    }

    fn open_popup(&mut self, trigger: usize) {
        let (combo, already_open) = match &self.nodes[trigger].behavior {
            Behavior::Trigger { combo, popup, .. } => (
                combo.clone(),
                popup.is_some_and(|p| !self.nodes[p].detached),
            ),
            _ => return,
        };
        if already_open {
            return;
        }
        if !combo.opens {
            debug!(trigger, "Combobox ignores open request");
            return;
        }

        let popup = self.create(Some(BODY), "div", &[("class", "MuiPopover-root MuiMenu-root")], "");
        self.nodes[popup].rendered_at = Some(Instant::now() + combo.open_delay);
        let list = self.create(
            Some(popup),
            "ul",
            &[("role", "listbox"), ("class", "MuiList-root MuiMenu-list")],
            "",
        );
        for option in &combo.options {
            let attrs: &[(&str, &str)] = match combo.markup {
                OptionMarkup::MenuItem => &[("role", "option"), ("class", "MuiMenuItem-root")],
                OptionMarkup::PlainList => &[],
            };
            // Menu items carry padding whitespace around their label
            let li = self.create(Some(list), "li", attrs, &format!("\n  {option}\n"));
            self.nodes[li].behavior = Behavior::Option { trigger, popup };
        }

        if let Behavior::Trigger { popup: slot, .. } = &mut self.nodes[trigger].behavior {
            *slot = Some(popup);
        }
        self.nodes[trigger]
            .attributes
            .insert("aria-expanded".to_string(), "true".to_string());
    }

    fn commit_option(&mut self, option: usize) {
        let Behavior::Option { trigger, popup } = self.nodes[option].behavior else {
            return;
        };
        if self.nodes[popup].detached {
            return;
        }
        let label = self.text_content(option).trim().to_string();

        // Selecting closes the popup as the widget's own side effect
        self.discard(popup);
        self.nodes[trigger].text = label.clone();
        self.nodes[trigger]
            .attributes
            .insert("aria-expanded".to_string(), "false".to_string());

        let (native_input, dependents) = match &mut self.nodes[trigger].behavior {
            Behavior::Trigger {
                native_input,
                popup: slot,
                dependents,
                ..
            } => {
                *slot = None;
                (*native_input, dependents.clone())
            }
            _ => return,
        };
        self.nodes[native_input].value = Some(label);
        let now = Instant::now();
        for (wrapper, delay) in dependents {
            let node = &mut self.nodes[wrapper];
            if node.detached {
                node.detached = false;
                node.rendered_at = Some(now + delay);
            }
        }
    }

    /// Unlink a closed popup. Its slots stay behind as empty tombstones so
    /// handles still pointing into it remain valid.
    fn discard(&mut self, root: usize) {
        if let Some(parent) = self.nodes[root].parent {
            self.nodes[parent].children.retain(|&c| c != root);
        }
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &mut self.nodes[id];
            node.detached = true;
            node.text.clear();
            node.attributes.clear();
            stack.append(&mut node.children);
        }
    }
}

/// A page held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryPage {
    dom: Arc<Mutex<Dom>>,
    url: Option<String>,
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPage {
    pub fn new() -> Self {
        Self {
            dom: Arc::new(Mutex::new(Dom::new())),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    fn dom(&self) -> MutexGuard<'_, Dom> {
        self.dom.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an element. `parent` defaults to the page's form.
    pub fn add_element(
        &self,
        parent: Option<NodeId>,
        tag: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> NodeId {
        let parent = parent.map(|p| p.0).unwrap_or(FORM);
        NodeId(self.dom().create(Some(parent), tag, attrs, text))
    }

    /// `<input type="text" placeholder="...">`
    pub fn add_text_input(&self, placeholder: &str) -> NodeId {
        self.add_element(
            None,
            "input",
            &[("type", "text"), ("placeholder", placeholder)],
            "",
        )
    }

    /// Mount a `Select` widget and return its trigger
    pub fn add_combobox(&self, combo: ComboBox) -> NodeId {
        let mut dom = self.dom();
        let wrapper = dom.create(Some(FORM), "div", &[("class", "MuiFormControl-root")], "");
        let trigger = dom.create(
            Some(wrapper),
            "div",
            &[
                ("role", "combobox"),
                ("tabindex", "0"),
                ("aria-haspopup", "listbox"),
                ("aria-expanded", "false"),
                ("class", "MuiSelect-select MuiInputBase-input"),
            ],
            "",
        );
        let native_input = dom.create(
            Some(wrapper),
            "input",
            &[
                ("aria-hidden", "true"),
                ("tabindex", "-1"),
                ("class", "MuiSelect-nativeInput"),
            ],
            "",
        );
        if let Some(NodeId(owner)) = combo.revealed_by {
            dom.nodes[wrapper].detached = true;
            if let Behavior::Trigger { dependents, .. } = &mut dom.nodes[owner].behavior {
                dependents.push((wrapper, combo.reveal_delay));
            }
        }
        dom.nodes[trigger].behavior = Behavior::Trigger {
            combo,
            native_input,
            popup: None,
            dependents: Vec::new(),
        };
        NodeId(trigger)
    }

    /// Seed a value without recording an interaction, e.g. stale data from a
    /// previous fill
    pub fn preset_value(&self, node: NodeId, value: &str) {
        self.dom().nodes[node.0].value = Some(value.to_string());
    }

    pub fn value_of(&self, node: NodeId) -> Option<String> {
        self.dom().nodes[node.0].value.clone()
    }

    pub fn text_of(&self, node: NodeId) -> String {
        self.dom().text_content(node.0).trim().to_string()
    }

    pub fn is_mounted(&self, node: NodeId) -> bool {
        self.dom().is_rendered(node.0, Instant::now())
    }

    /// Interactions recorded against one node, oldest first
    pub fn interactions(&self, node: NodeId) -> Vec<Interaction> {
        self.dom()
            .interactions
            .iter()
            .filter(|(id, _)| *id == node.0)
            .map(|(_, i)| i.clone())
            .collect()
    }

    /// Total interactions recorded against the whole page
    pub fn interaction_count(&self) -> usize {
        self.dom().interactions.len()
    }
}

impl PageEngine for MemoryPage {
    fn query_all(&self, selector: &Selector) -> Result<Vec<PageElement>, FillError> {
        let dom = self.dom();
        let now = Instant::now();
        let mut found = Vec::new();
        for id in dom.document_order() {
            if dom.is_rendered(id, now) && dom.matches(id, selector)? {
                found.push(PageElement::new(Box::new(MemoryElement {
                    dom: self.dom.clone(),
                    id,
                })));
            }
        }
        Ok(found)
    }

    fn url(&self) -> Option<String> {
        self.url.clone()
    }
}

#[derive(Debug, Clone)]
struct MemoryElement {
    dom: Arc<Mutex<Dom>>,
    id: usize,
}

impl MemoryElement {
    fn dom(&self) -> MutexGuard<'_, Dom> {
        self.dom.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PageElementImpl for MemoryElement {
    fn object_id(&self) -> usize {
        self.id
    }

    fn tag(&self) -> String {
        self.dom().nodes[self.id].tag.clone()
    }

    fn attributes(&self) -> BTreeMap<String, String> {
        self.dom().nodes[self.id].attributes.clone()
    }

    fn text_content(&self) -> String {
        self.dom().text_content(self.id)
    }

    fn value(&self) -> Option<String> {
        self.dom().nodes[self.id].value.clone()
    }

    fn set_value(&self, value: &str) -> Result<(), FillError> {
        let mut dom = self.dom();
        let node = &mut dom.nodes[self.id];
        if node.value.is_none() {
            return Err(FillError::Page(format!(
                "<{}> is not a form control",
                node.tag
            )));
        }
        node.value = Some(value.to_string());
        dom.record(self.id, Interaction::SetValue(value.to_string()));
        Ok(())
    }

    fn click(&self) -> Result<(), FillError> {
        self.dom().click(self.id);
        Ok(())
    }

    fn dispatch_event(&self, event: DomEvent) -> Result<(), FillError> {
        self.dom().dispatch(self.id, event);
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn PageElementImpl> {
        Box::new(self.clone())
    }
}
