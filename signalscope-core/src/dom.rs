//! Element Tree
//!
//! A minimal element model standing in for the host UI surface that
//! commit operations touch. The visual feedback controller styles these
//! nodes (classes, attributes, inline styles) the way it would style real
//! elements; tests observe the applied styling directly.
//!
//! Ownership follows the browser model: parents own their children,
//! children hold weak parent pointers. The tracker itself only ever holds
//! weak references into this tree, so tracking state never keeps an
//! element alive.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, Weak};

use crate::reactive::NodeId;

/// The kind of a UI node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomNodeKind {
    /// An element node, the target of styling.
    Element,

    /// A text node. Resolves to its parent element for styling purposes.
    Text,
}

/// A node in the element tree.
pub struct DomNode {
    id: NodeId,
    kind: DomNodeKind,

    /// The element's `id` attribute, if set.
    element_id: RwLock<Option<String>>,

    parent: RwLock<Weak<DomNode>>,
    children: RwLock<Vec<Arc<DomNode>>>,

    classes: RwLock<BTreeSet<String>>,
    attributes: RwLock<BTreeMap<String, String>>,
    styles: RwLock<BTreeMap<String, String>>,
    text: RwLock<String>,
}

impl DomNode {
    fn empty(kind: DomNodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            element_id: RwLock::new(None),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            classes: RwLock::new(BTreeSet::new()),
            attributes: RwLock::new(BTreeMap::new()),
            styles: RwLock::new(BTreeMap::new()),
            text: RwLock::new(String::new()),
        }
    }

    /// Create a new element node.
    pub fn element() -> Arc<Self> {
        Arc::new(Self::empty(DomNodeKind::Element))
    }

    /// Create a new element node with an `id` attribute.
    pub fn element_with_id(element_id: &str) -> Arc<Self> {
        let node = Self::empty(DomNodeKind::Element);
        *node.element_id.write().expect("element_id lock poisoned") = Some(element_id.to_owned());
        Arc::new(node)
    }

    /// Create a new text node.
    pub fn text(content: &str) -> Arc<Self> {
        let node = Self::empty(DomNodeKind::Text);
        *node.text.write().expect("text lock poisoned") = content.to_owned();
        Arc::new(node)
    }

    /// Get the node's stable identity.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> DomNodeKind {
        self.kind
    }

    /// Get the element's `id` attribute, if set.
    pub fn element_id(&self) -> Option<String> {
        self.element_id
            .read()
            .expect("element_id lock poisoned")
            .clone()
    }

    /// Append a child node, taking ownership of it.
    pub fn append_child(self: &Arc<Self>, child: &Arc<DomNode>) {
        *child.parent.write().expect("parent lock poisoned") = Arc::downgrade(self);
        self.children
            .write()
            .expect("children lock poisoned")
            .push(Arc::clone(child));
    }

    /// Get the parent node, if still alive.
    pub fn parent(&self) -> Option<Arc<DomNode>> {
        self.parent.read().expect("parent lock poisoned").upgrade()
    }

    /// Resolve this node to the element styling should apply to: the node
    /// itself for elements, the parent element for text nodes.
    pub fn nearest_element(self: &Arc<Self>) -> Option<Arc<DomNode>> {
        match self.kind {
            DomNodeKind::Element => Some(Arc::clone(self)),
            DomNodeKind::Text => self.parent().filter(|p| p.kind() == DomNodeKind::Element),
        }
    }

    /// Whether `other` is this node or a descendant of it.
    pub fn contains(&self, other: &Arc<DomNode>) -> bool {
        if self.id == other.id() {
            return true;
        }
        let mut current = other.parent();
        while let Some(node) = current {
            if node.id() == self.id {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Whether this node or any ancestor carries the given attribute.
    pub fn has_marked_ancestor(self: &Arc<Self>, attribute: &str) -> bool {
        let mut current = Some(Arc::clone(self));
        while let Some(node) = current {
            if node.attribute(attribute).is_some() {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Add a class to the node.
    pub fn add_class(&self, class: &str) {
        self.classes
            .write()
            .expect("classes lock poisoned")
            .insert(class.to_owned());
    }

    /// Remove a class from the node.
    pub fn remove_class(&self, class: &str) {
        self.classes
            .write()
            .expect("classes lock poisoned")
            .remove(class);
    }

    /// Whether the node has the given class.
    pub fn has_class(&self, class: &str) -> bool {
        self.classes
            .read()
            .expect("classes lock poisoned")
            .contains(class)
    }

    /// Set an attribute.
    pub fn set_attribute(&self, name: &str, value: &str) {
        self.attributes
            .write()
            .expect("attributes lock poisoned")
            .insert(name.to_owned(), value.to_owned());
    }

    /// Remove an attribute.
    pub fn remove_attribute(&self, name: &str) {
        self.attributes
            .write()
            .expect("attributes lock poisoned")
            .remove(name);
    }

    /// Get an attribute's value.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes
            .read()
            .expect("attributes lock poisoned")
            .get(name)
            .cloned()
    }

    /// Set an inline style property.
    pub fn set_style(&self, name: &str, value: &str) {
        self.styles
            .write()
            .expect("styles lock poisoned")
            .insert(name.to_owned(), value.to_owned());
    }

    /// Remove an inline style property.
    pub fn remove_style(&self, name: &str) {
        self.styles
            .write()
            .expect("styles lock poisoned")
            .remove(name);
    }

    /// Get an inline style property.
    pub fn style(&self, name: &str) -> Option<String> {
        self.styles
            .read()
            .expect("styles lock poisoned")
            .get(name)
            .cloned()
    }

    /// Set the node's text content.
    pub fn set_text(&self, content: &str) {
        *self.text.write().expect("text lock poisoned") = content.to_owned();
    }

    /// Get the node's text content.
    pub fn text_content(&self) -> String {
        self.text.read().expect("text lock poisoned").clone()
    }
}

impl std::fmt::Debug for DomNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("element_id", &self.element_id())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_resolves_to_parent_element() {
        let parent = DomNode::element();
        let text = DomNode::text("hello");
        parent.append_child(&text);

        let resolved = text.nearest_element().unwrap();
        assert_eq!(resolved.id(), parent.id());
    }

    #[test]
    fn detached_text_resolves_to_none() {
        let text = DomNode::text("orphan");
        assert!(text.nearest_element().is_none());
    }

    #[test]
    fn contains_walks_ancestors() {
        let root = DomNode::element();
        let middle = DomNode::element();
        let leaf = DomNode::element();
        root.append_child(&middle);
        middle.append_child(&leaf);

        assert!(root.contains(&leaf));
        assert!(root.contains(&middle));
        assert!(!middle.contains(&root));

        let stranger = DomNode::element();
        assert!(!root.contains(&stranger));
    }

    #[test]
    fn marked_ancestor_is_found() {
        let root = DomNode::element();
        root.set_attribute("data-signalscope-monitor", "true");
        let child = DomNode::element();
        root.append_child(&child);

        assert!(child.has_marked_ancestor("data-signalscope-monitor"));
        assert!(!child.has_marked_ancestor("data-other"));
    }

    #[test]
    fn classes_and_styles_round_trip() {
        let el = DomNode::element();
        el.add_class("hot");
        assert!(el.has_class("hot"));
        el.remove_class("hot");
        assert!(!el.has_class("hot"));

        el.set_style("outline-width", "3px");
        assert_eq!(el.style("outline-width").as_deref(), Some("3px"));
        el.remove_style("outline-width");
        assert!(el.style("outline-width").is_none());
    }
}
