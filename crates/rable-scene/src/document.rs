use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::markup::{self, MarkupNode};
use crate::selector::{Compound, Selector, SelectorError};

/// Handle to a node in a [`Document`]. Handles stay valid for the lifetime of
/// the document, also after the node has been detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub target: NodeId,
    pub current_target: NodeId,
}

pub type EventListener = Rc<dyn Fn(&Event)>;

#[derive(Clone)]
enum NodeKind {
    Element { tag: String },
    Text(String),
}

#[derive(Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: IndexMap<String, String>,
    value: Option<String>,
    checked: Option<bool>,
    listeners: Vec<(String, EventListener)>,
}

impl NodeData {
    fn element(tag: &str) -> Self {
        Self {
            kind: NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
            },
            parent: None,
            children: Vec::new(),
            attributes: IndexMap::new(),
            value: None,
            checked: None,
            listeners: Vec::new(),
        }
    }

    fn text(text: &str) -> Self {
        Self {
            kind: NodeKind::Text(text.to_string()),
            parent: None,
            children: Vec::new(),
            attributes: IndexMap::new(),
            value: None,
            checked: None,
            listeners: Vec::new(),
        }
    }

    fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }
}

struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
}

impl Tree {
    fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(data);
        id
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node_mut(id).parent.take() {
            self.node_mut(parent).children.retain(|child| *child != id);
        }
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.node(node).parent {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn insert_at(&mut self, parent: NodeId, index: usize, child: NodeId) -> bool {
        if self.is_inclusive_ancestor(child, parent) {
            log::error!("[scene] refusing to insert {child} into its own subtree");
            return false;
        }
        self.detach(child);
        let children = &mut self.node_mut(parent).children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.node_mut(child).parent = Some(parent);
        true
    }

    fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let mut data = self.node(id).clone();
        data.parent = None;
        data.listeners.clear();
        let children = std::mem::take(&mut data.children);
        let copy = self.push(data);
        for child in children {
            let child_copy = self.deep_clone(child);
            self.node_mut(copy).children.push(child_copy);
            self.node_mut(child_copy).parent = Some(copy);
        }
        copy
    }

    fn build(&mut self, node: &MarkupNode) -> NodeId {
        match node {
            MarkupNode::Text(text) => self.push(NodeData::text(text)),
            MarkupNode::Element {
                tag,
                attributes,
                children,
            } => {
                let mut data = NodeData::element(tag);
                data.attributes = attributes.iter().cloned().collect();
                let id = self.push(data);
                for child in children {
                    let child = self.build(child);
                    self.node_mut(id).children.push(child);
                    self.node_mut(child).parent = Some(id);
                }
                id
            }
        }
    }

    fn descendants(&self, scope: NodeId, output: &mut Vec<NodeId>) {
        for child in &self.node(scope).children {
            output.push(*child);
            self.descendants(*child, output);
        }
    }

    fn text_content(&self, id: NodeId, output: &mut String) {
        match &self.node(id).kind {
            NodeKind::Text(text) => output.push_str(text),
            NodeKind::Element { .. } => {
                for child in &self.node(id).children {
                    self.text_content(*child, output);
                }
            }
        }
    }

    fn matches_compound(&self, id: NodeId, compound: &Compound) -> bool {
        let node = self.node(id);
        let Some(tag) = node.tag() else {
            return false;
        };
        if compound.tag.as_deref().is_some_and(|expected| expected != tag) {
            return false;
        }
        if let Some(expected) = &compound.id {
            if node.attributes.get("id") != Some(expected) {
                return false;
            }
        }
        let classes = node.attributes.get("class").map(String::as_str).unwrap_or("");
        if !compound
            .classes
            .iter()
            .all(|class| classes.split_whitespace().any(|present| present == class))
        {
            return false;
        }
        compound.attributes.iter().all(|matcher| {
            match (node.attributes.get(&matcher.name), &matcher.value) {
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => actual == expected,
                (None, _) => false,
            }
        })
    }

    fn matches_chain(&self, id: NodeId, chain: &[Compound], scope: NodeId) -> bool {
        let Some((last, rest)) = chain.split_last() else {
            return false;
        };
        if !self.matches_compound(id, last) {
            return false;
        }
        let mut remaining = rest;
        let mut current = self.node(id).parent;
        while let Some((compound, outer)) = remaining.split_last() {
            loop {
                let Some(ancestor) = current else {
                    return false;
                };
                current = self.node(ancestor).parent;
                if self.matches_compound(ancestor, compound) {
                    break;
                }
                if ancestor == scope {
                    return false;
                }
            }
            remaining = outer;
        }
        true
    }
}

/// Mutable in-memory document tree shared through cheap handle clones.
#[derive(Clone)]
pub struct Document {
    tree: Rc<RefCell<Tree>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.tree.borrow().nodes.len())
            .finish()
    }
}

impl Document {
    /// Empty `<html><head></head><body></body></html>` document.
    pub fn new() -> Self {
        let mut nodes = Vec::new();
        let mut root = NodeData::element("html");
        let mut head = NodeData::element("head");
        let mut body = NodeData::element("body");
        head.parent = Some(NodeId(0));
        body.parent = Some(NodeId(0));
        root.children = vec![NodeId(1), NodeId(2)];
        nodes.push(root);
        nodes.push(head);
        nodes.push(body);
        Self {
            tree: Rc::new(RefCell::new(Tree {
                nodes,
                root: NodeId(0),
                head: NodeId(1),
                body: NodeId(2),
            })),
        }
    }

    /// Parse a whole page. `<html>` and `<body>` wrappers are optional, content
    /// of an explicit `<head>` lands in the document head.
    pub fn parse(source: &str) -> Self {
        let document = Self::new();
        let parsed = markup::parse_markup(source);
        document.adopt_page_nodes(&parsed, None);
        document
    }

    fn adopt_page_nodes(&self, nodes: &[MarkupNode], forced_parent: Option<NodeId>) {
        let (head, body) = {
            let tree = self.tree.borrow();
            (tree.head, tree.body)
        };
        for node in nodes {
            match node {
                MarkupNode::Element {
                    tag,
                    attributes,
                    children,
                } if forced_parent.is_none() && (tag == "html" || tag == "body" || tag == "head") => {
                    let target = match tag.as_str() {
                        "head" => Some(head),
                        "body" => Some(body),
                        _ => None,
                    };
                    if let Some(target) = target {
                        let mut tree = self.tree.borrow_mut();
                        for (name, value) in attributes {
                            tree.node_mut(target)
                                .attributes
                                .insert(name.clone(), value.clone());
                        }
                    }
                    self.adopt_page_nodes(children, target);
                }
                MarkupNode::Text(text) if forced_parent.is_none() && text.trim().is_empty() => {}
                _ => {
                    let parent = forced_parent.unwrap_or(body);
                    let mut tree = self.tree.borrow_mut();
                    let id = tree.build(node);
                    let len = tree.node(parent).children.len();
                    tree.insert_at(parent, len, id);
                }
            }
        }
    }

    /// Parse markup into a detached `<parsed>` container element.
    pub fn parse_fragment(&self, source: &str) -> NodeId {
        let parsed = markup::parse_markup(source);
        let mut tree = self.tree.borrow_mut();
        let container = tree.push(NodeData::element("parsed"));
        for node in &parsed {
            let child = tree.build(node);
            tree.node_mut(container).children.push(child);
            tree.node_mut(child).parent = Some(container);
        }
        container
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree)
    }

    pub fn root(&self) -> NodeId {
        self.tree.borrow().root
    }

    pub fn head(&self) -> NodeId {
        self.tree.borrow().head
    }

    pub fn body(&self) -> NodeId {
        self.tree.borrow().body
    }

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.tree.borrow_mut().push(NodeData::element(tag))
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.tree.borrow_mut().push(NodeData::text(text))
    }

    // ------ structure ------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.borrow().node(id).parent
    }

    /// All child nodes, text included.
    pub fn child_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.tree.borrow().node(id).children.clone()
    }

    /// Element children only.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let tree = self.tree.borrow();
        tree.node(id)
            .children
            .iter()
            .copied()
            .filter(|child| tree.node(*child).tag().is_some())
            .collect()
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let tree = self.tree.borrow();
        let parent = tree.node(id).parent?;
        let siblings = &tree.node(parent).children;
        let position = siblings.iter().position(|sibling| *sibling == id)?;
        siblings.get(position + 1).copied()
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.tree.borrow().node(id).tag().is_some()
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        !self.is_element(id)
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        let tree = self.tree.borrow();
        tree.is_inclusive_ancestor(tree.root, id)
    }

    pub fn tag_name(&self, id: NodeId) -> Option<String> {
        self.tree.borrow().node(id).tag().map(str::to_string)
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> bool {
        let mut tree = self.tree.borrow_mut();
        let len = tree.node(parent).children.len();
        let len = if tree.node(child).parent == Some(parent) {
            len - 1
        } else {
            len
        };
        tree.insert_at(parent, len, child)
    }

    /// Insert `child` into `parent` before `reference`, or at the end when
    /// `reference` is `None` or not a child of `parent`.
    pub fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> bool {
        if reference == Some(child) {
            return true;
        }
        let mut tree = self.tree.borrow_mut();
        tree.detach(child);
        let children = &tree.node(parent).children;
        let index = reference
            .and_then(|reference| children.iter().position(|sibling| *sibling == reference))
            .unwrap_or(children.len());
        tree.insert_at(parent, index, child)
    }

    /// Insert `child` right after `reference` in the same parent.
    pub fn insert_after(&self, reference: NodeId, child: NodeId) -> bool {
        let Some(parent) = self.parent(reference) else {
            return false;
        };
        let next = self.next_sibling(reference);
        self.insert_before(parent, child, next)
    }

    /// Put `replacement` where `old` is in `parent`; `old` ends up detached.
    pub fn replace_child(&self, parent: NodeId, replacement: NodeId, old: NodeId) -> bool {
        if replacement == old {
            return true;
        }
        let mut tree = self.tree.borrow_mut();
        if tree.node(old).parent != Some(parent) {
            log::error!("[scene] {old} is not a child of {parent}");
            return false;
        }
        if tree.is_inclusive_ancestor(replacement, parent) {
            log::error!("[scene] refusing to insert {replacement} into its own subtree");
            return false;
        }
        tree.detach(replacement);
        let Some(index) = tree
            .node(parent)
            .children
            .iter()
            .position(|child| *child == old)
        else {
            return false;
        };
        tree.node_mut(parent).children[index] = replacement;
        tree.node_mut(replacement).parent = Some(parent);
        tree.node_mut(old).parent = None;
        true
    }

    pub fn remove(&self, id: NodeId) {
        self.tree.borrow_mut().detach(id);
    }

    /// Copy of `id` (and its subtree when `deep`), detached. Listeners are not copied.
    pub fn clone_node(&self, id: NodeId, deep: bool) -> NodeId {
        let mut tree = self.tree.borrow_mut();
        if deep {
            tree.deep_clone(id)
        } else {
            let mut data = tree.node(id).clone();
            data.parent = None;
            data.children.clear();
            data.listeners.clear();
            tree.push(data)
        }
    }

    // ------ text ------

    /// Data of a text node.
    pub fn text(&self, id: NodeId) -> Option<String> {
        match &self.tree.borrow().node(id).kind {
            NodeKind::Text(text) => Some(text.clone()),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn set_text(&self, id: NodeId, text: &str) {
        if let NodeKind::Text(data) = &mut self.tree.borrow_mut().node_mut(id).kind {
            *data = text.to_string();
        }
    }

    /// Concatenated text of every descendant text node.
    pub fn inner_text(&self, id: NodeId) -> String {
        let mut output = String::new();
        self.tree.borrow().text_content(id, &mut output);
        output
    }

    /// Replace all children of `id` with a single text node.
    pub fn set_inner_text(&self, id: NodeId, text: &str) {
        let mut tree = self.tree.borrow_mut();
        if tree.node(id).tag().is_none() {
            if let NodeKind::Text(data) = &mut tree.node_mut(id).kind {
                *data = text.to_string();
            }
            return;
        }
        for child in std::mem::take(&mut tree.node_mut(id).children) {
            tree.node_mut(child).parent = None;
        }
        if !text.is_empty() {
            let child = tree.push(NodeData::text(text));
            tree.node_mut(id).children.push(child);
            tree.node_mut(child).parent = Some(id);
        }
    }

    // ------ attributes ------

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.tree.borrow().node(id).attributes.get(name).cloned()
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.tree.borrow().node(id).attributes.contains_key(name)
    }

    /// Attributes in source order.
    pub fn attributes(&self, id: NodeId) -> Vec<(String, String)> {
        self.tree
            .borrow()
            .node(id)
            .attributes
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn set_attribute(&self, id: NodeId, name: &str, value: &str) {
        let mut tree = self.tree.borrow_mut();
        let node = tree.node_mut(id);
        if node.tag().is_none() {
            return;
        }
        node.attributes
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn remove_attribute(&self, id: NodeId, name: &str) {
        self.tree
            .borrow_mut()
            .node_mut(id)
            .attributes
            .shift_remove(name);
    }

    // ------ class list ------

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attribute(id, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|present| present == class))
    }

    pub fn add_class(&self, id: NodeId, class: &str) {
        if self.has_class(id, class) {
            return;
        }
        let classes = self.attribute(id, "class").unwrap_or_default();
        let updated = if classes.trim().is_empty() {
            class.to_string()
        } else {
            format!("{} {class}", classes.trim())
        };
        self.set_attribute(id, "class", &updated);
    }

    pub fn remove_class(&self, id: NodeId, class: &str) {
        let Some(classes) = self.attribute(id, "class") else {
            return;
        };
        let remaining = classes
            .split_whitespace()
            .filter(|present| *present != class)
            .collect::<Vec<_>>()
            .join(" ");
        if remaining.is_empty() {
            self.remove_attribute(id, "class");
        } else {
            self.set_attribute(id, "class", &remaining);
        }
    }

    // ------ inline style ------

    fn style_declarations(&self, id: NodeId) -> IndexMap<String, String> {
        self.attribute(id, "style")
            .map(|style| {
                style
                    .split(';')
                    .filter_map(|declaration| {
                        let (name, value) = declaration.split_once(':')?;
                        let name = name.trim();
                        (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Inline style property; `property` may be camelCase or kebab-case.
    pub fn style(&self, id: NodeId, property: &str) -> Option<String> {
        self.style_declarations(id)
            .get(&kebab_case(property))
            .cloned()
    }

    /// Set an inline style property; `None` or an empty value removes it.
    pub fn set_style(&self, id: NodeId, property: &str, value: Option<&str>) {
        let mut declarations = self.style_declarations(id);
        let property = kebab_case(property);
        match value {
            Some(value) if !value.is_empty() => {
                declarations.insert(property, value.to_string());
            }
            _ => {
                declarations.shift_remove(&property);
            }
        }
        if declarations.is_empty() {
            self.remove_attribute(id, "style");
        } else {
            let style = declarations
                .iter()
                .map(|(name, value)| format!("{name}: {value};"))
                .collect::<Vec<_>>()
                .join(" ");
            self.set_attribute(id, "style", &style);
        }
    }

    pub fn is_hidden(&self, id: NodeId) -> bool {
        self.style(id, "display").as_deref() == Some("none")
    }

    pub fn set_hidden(&self, id: NodeId, hidden: bool) {
        self.set_style(id, "display", hidden.then_some("none"));
    }

    // ------ form controls ------

    /// Elements carrying a string `value` property.
    pub fn is_value_control(&self, id: NodeId) -> bool {
        matches!(
            self.tag_name(id).as_deref(),
            Some("input" | "textarea" | "select" | "option" | "button")
        )
    }

    /// Elements carrying a boolean `checked` property.
    pub fn is_checkable(&self, id: NodeId) -> bool {
        self.tag_name(id).as_deref() == Some("input")
    }

    pub fn is_content_editable(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            match self.attribute(node, "contenteditable").as_deref() {
                Some("false") => return false,
                Some(_) => return true,
                None => current = self.parent(node),
            }
        }
        false
    }

    pub fn value(&self, id: NodeId) -> Option<String> {
        if !self.is_value_control(id) {
            return None;
        }
        if let Some(value) = self.tree.borrow().node(id).value.clone() {
            return Some(value);
        }
        Some(match self.tag_name(id).as_deref() {
            Some("textarea") => self.inner_text(id),
            _ => self.attribute(id, "value").unwrap_or_default(),
        })
    }

    pub fn set_value(&self, id: NodeId, value: &str) {
        if !self.is_value_control(id) {
            return;
        }
        self.tree.borrow_mut().node_mut(id).value = Some(value.to_string());
    }

    pub fn checked(&self, id: NodeId) -> Option<bool> {
        if !self.is_checkable(id) {
            return None;
        }
        let explicit = self.tree.borrow().node(id).checked;
        Some(explicit.unwrap_or_else(|| self.has_attribute(id, "checked")))
    }

    pub fn set_checked(&self, id: NodeId, checked: bool) {
        if !self.is_checkable(id) {
            return;
        }
        self.tree.borrow_mut().node_mut(id).checked = Some(checked);
    }

    // ------ events ------

    pub fn add_event_listener(&self, id: NodeId, name: &str, listener: impl Fn(&Event) + 'static) {
        self.tree
            .borrow_mut()
            .node_mut(id)
            .listeners
            .push((name.to_string(), Rc::new(listener)));
    }

    /// Dispatch a bubbling event from `target` up to the root of its tree.
    pub fn dispatch(&self, target: NodeId, name: &str) {
        let mut path = vec![target];
        while let Some(parent) = self.parent(*path.last().unwrap_or(&target)) {
            path.push(parent);
        }
        for current_target in path {
            let listeners: Vec<EventListener> = self
                .tree
                .borrow()
                .node(current_target)
                .listeners
                .iter()
                .filter(|(listener_name, _)| listener_name == name)
                .map(|(_, listener)| Rc::clone(listener))
                .collect();
            let event = Event {
                name: name.to_string(),
                target,
                current_target,
            };
            for listener in listeners {
                listener(&event);
            }
        }
    }

    /// Simulate the user typing `value` into a control or editable element.
    pub fn input(&self, id: NodeId, value: &str) {
        if self.is_value_control(id) {
            self.set_value(id, value);
        } else if self.is_content_editable(id) {
            self.set_inner_text(id, value);
        }
        self.dispatch(id, "input");
    }

    /// Simulate the user toggling a checkbox.
    pub fn toggle(&self, id: NodeId) {
        let checked = self.checked(id).unwrap_or(false);
        self.set_checked(id, !checked);
        self.dispatch(id, "input");
        self.dispatch(id, "change");
    }

    pub fn click(&self, id: NodeId) {
        self.dispatch(id, "click");
    }

    // ------ queries ------

    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, SelectorError> {
        let root = self.root();
        Ok(self.query_selector_all_in(root, selector)?.into_iter().next())
    }

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
        self.query_selector_all_in(self.root(), selector)
    }

    pub fn query_selector_in(
        &self,
        scope: NodeId,
        selector: &str,
    ) -> Result<Option<NodeId>, SelectorError> {
        Ok(self.query_selector_all_in(scope, selector)?.into_iter().next())
    }

    /// Descendants of `scope` matching `selector`, in document order.
    pub fn query_selector_all_in(
        &self,
        scope: NodeId,
        selector: &str,
    ) -> Result<Vec<NodeId>, SelectorError> {
        let selector = Selector::parse(selector)?;
        let tree = self.tree.borrow();
        let mut candidates = Vec::new();
        tree.descendants(scope, &mut candidates);
        Ok(candidates
            .into_iter()
            .filter(|candidate| {
                selector
                    .alternatives
                    .iter()
                    .any(|chain| tree.matches_chain(*candidate, chain, scope))
            })
            .collect())
    }

    // ------ serialization ------

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut output = String::new();
        self.serialize(id, &mut output);
        output
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut output = String::new();
        for child in self.child_nodes(id) {
            self.serialize(child, &mut output);
        }
        output
    }

    pub fn to_html(&self) -> String {
        format!("<!DOCTYPE html>{}", self.outer_html(self.root()))
    }

    fn serialize(&self, id: NodeId, output: &mut String) {
        let Some(tag) = self.tag_name(id) else {
            let text = self.text(id).unwrap_or_default();
            let raw = self
                .parent(id)
                .and_then(|parent| self.tag_name(parent))
                .is_some_and(|parent| markup::is_raw_text_element(&parent) && parent != "textarea");
            if raw {
                output.push_str(&text);
            } else {
                output.push_str(&markup::escape_text(&text));
            }
            return;
        };
        output.push('<');
        output.push_str(&tag);
        let mut attributes = self.attributes(id);
        if tag == "input" {
            if let Some(value) = self.tree.borrow().node(id).value.clone() {
                set_or_push(&mut attributes, "value", Some(value));
            }
            if let Some(checked) = self.tree.borrow().node(id).checked {
                set_or_push(&mut attributes, "checked", checked.then(String::new));
            }
        }
        for (name, value) in attributes {
            output.push(' ');
            output.push_str(&name);
            if !value.is_empty() {
                output.push_str("=\"");
                output.push_str(&markup::escape_attribute(&value));
                output.push('"');
            }
        }
        output.push('>');
        if markup::is_void_element(&tag) {
            return;
        }
        if tag == "textarea" {
            if let Some(value) = self.value(id) {
                output.push_str(&markup::escape_text(&value));
            }
        } else {
            for child in self.child_nodes(id) {
                self.serialize(child, output);
            }
        }
        output.push_str("</");
        output.push_str(&tag);
        output.push('>');
    }
}

fn set_or_push(attributes: &mut Vec<(String, String)>, name: &str, value: Option<String>) {
    let position = attributes.iter().position(|(existing, _)| existing == name);
    match (position, value) {
        (Some(index), Some(value)) => attributes[index].1 = value,
        (Some(index), None) => {
            attributes.remove(index);
        }
        (None, Some(value)) => attributes.push((name.to_string(), value)),
        (None, None) => {}
    }
}

/// `backgroundColor` -> `background-color`; kebab-case input passes through.
pub fn kebab_case(property: &str) -> String {
    let mut output = String::with_capacity(property.len() + 4);
    for character in property.chars() {
        if character.is_ascii_uppercase() {
            output.push('-');
            output.push(character.to_ascii_lowercase());
        } else {
            output.push(character);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn parse_places_head_and_body_content() {
        let document = Document::parse(
            "<!DOCTYPE html><html><head><title>T</title></head><body class=page><main id=app></main></body></html>",
        );
        assert_eq!(document.children(document.head()).len(), 1);
        assert_eq!(document.attribute(document.body(), "class").as_deref(), Some("page"));
        let app = document.query_selector("#app").unwrap().unwrap();
        assert_eq!(document.parent(app), Some(document.body()));
    }

    #[test]
    fn bare_markup_lands_in_body() {
        let document = Document::parse("<p>one</p><p>two</p>");
        assert_eq!(
            document.inner_html(document.body()),
            "<p>one</p><p>two</p>"
        );
    }

    #[test]
    fn style_properties_round_trip_through_attribute() {
        let document = Document::parse("<div id=x style=\"color: red\"></div>");
        let node = document.query_selector("#x").unwrap().unwrap();
        document.set_style(node, "backgroundColor", Some("blue"));
        assert_eq!(document.style(node, "background-color").as_deref(), Some("blue"));
        assert_eq!(
            document.attribute(node, "style").as_deref(),
            Some("color: red; background-color: blue;")
        );
        document.set_hidden(node, true);
        assert!(document.is_hidden(node));
        document.set_hidden(node, false);
        assert!(!document.is_hidden(node));
        document.set_style(node, "color", None);
        document.set_style(node, "backgroundColor", Some(""));
        assert!(!document.has_attribute(node, "style"));
    }

    #[test]
    fn class_list_operations() {
        let document = Document::parse("<div id=x class=\"a b\"></div>");
        let node = document.query_selector("#x").unwrap().unwrap();
        document.add_class(node, "c");
        document.add_class(node, "a");
        assert_eq!(document.attribute(node, "class").as_deref(), Some("a b c"));
        document.remove_class(node, "b");
        assert!(document.has_class(node, "c"));
        assert!(!document.has_class(node, "b"));
    }

    #[test]
    fn insertion_and_replacement_keep_tree_consistent() {
        let document = Document::parse("<ul><li id=a></li><li id=b></li></ul>");
        let list = document.query_selector("ul").unwrap().unwrap();
        let a = document.query_selector("#a").unwrap().unwrap();
        let b = document.query_selector("#b").unwrap().unwrap();
        let c = document.clone_node(a, true);
        document.set_attribute(c, "id", "c");
        document.insert_after(a, c);
        assert_eq!(document.children(list), vec![a, c, b]);
        document.insert_before(list, b, Some(a));
        assert_eq!(document.children(list), vec![b, a, c]);
        let d = document.create_element("li");
        document.replace_child(list, d, a);
        assert_eq!(document.children(list), vec![b, d, c]);
        assert_eq!(document.parent(a), None);
        document.remove(c);
        assert_eq!(document.children(list), vec![b, d]);
        assert!(!document.is_connected(c));
    }

    #[test]
    fn refuses_cyclic_insertion() {
        let document = Document::parse("<div id=outer><div id=inner></div></div>");
        let outer = document.query_selector("#outer").unwrap().unwrap();
        let inner = document.query_selector("#inner").unwrap().unwrap();
        assert!(!document.append_child(inner, outer));
        assert_eq!(document.parent(inner), Some(outer));
    }

    #[test]
    fn events_bubble_to_ancestors() {
        let document = Document::parse("<div id=outer><button id=inner></button></div>");
        let outer = document.query_selector("#outer").unwrap().unwrap();
        let inner = document.query_selector("#inner").unwrap().unwrap();
        let seen = Rc::new(Cell::new(0));
        let seen_outer = Rc::clone(&seen);
        document.add_event_listener(outer, "click", move |event| {
            assert_eq!(event.current_target, outer);
            seen_outer.set(seen_outer.get() + 10);
        });
        let seen_inner = Rc::clone(&seen);
        document.add_event_listener(inner, "click", move |event| {
            assert_eq!(event.target, inner);
            seen_inner.set(seen_inner.get() + 1);
        });
        document.click(inner);
        assert_eq!(seen.get(), 11);
    }

    #[test]
    fn controls_reflect_value_and_checked() {
        let document = Document::parse("<input id=t value=start><input id=c type=checkbox checked>");
        let text = document.query_selector("#t").unwrap().unwrap();
        let checkbox = document.query_selector("#c").unwrap().unwrap();
        assert_eq!(document.value(text).as_deref(), Some("start"));
        document.input(text, "typed");
        assert_eq!(document.value(text).as_deref(), Some("typed"));
        assert_eq!(document.checked(checkbox), Some(true));
        document.toggle(checkbox);
        assert_eq!(document.checked(checkbox), Some(false));
        assert_eq!(
            document.outer_html(checkbox),
            "<input id=\"c\" type=\"checkbox\">"
        );
        assert_eq!(
            document.outer_html(text),
            "<input id=\"t\" value=\"typed\">"
        );
    }

    #[test]
    fn content_editable_input_replaces_text() {
        let document = Document::parse("<div id=e contenteditable>old</div>");
        let editable = document.query_selector("#e").unwrap().unwrap();
        assert!(document.is_content_editable(editable));
        assert_eq!(document.value(editable), None);
        document.input(editable, "new");
        assert_eq!(document.inner_text(editable), "new");
    }

    #[test]
    fn fragments_are_detached() {
        let document = Document::new();
        let fragment = document.parse_fragment("<data>{}</data><component><b>x</b></component>");
        assert_eq!(document.tag_name(fragment).as_deref(), Some("parsed"));
        assert!(!document.is_connected(fragment));
        let wrapper = document.query_selector_in(fragment, "component").unwrap().unwrap();
        assert_eq!(document.inner_html(wrapper), "<b>x</b>");
        assert_eq!(document.query_selector("component").unwrap(), None);
    }

    #[test]
    fn raw_text_is_serialized_verbatim() {
        let document = Document::parse("<head><style>a > b { color: red }</style></head><p>a &lt; b</p>");
        assert_eq!(
            document.inner_html(document.head()),
            "<style>a > b { color: red }</style>"
        );
        assert_eq!(document.inner_html(document.body()), "<p>a &lt; b</p>");
    }

    #[test]
    fn kebab_case_conversion() {
        assert_eq!(kebab_case("backgroundColor"), "background-color");
        assert_eq!(kebab_case("font-size"), "font-size");
    }
}
