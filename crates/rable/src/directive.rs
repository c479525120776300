//! Attribute directives: the `namespace:action[:argument]` grammar and the
//! reactive wiring behind each action.
//!
//! Children of an element are walked in document order. Every directive is
//! removed from its node once wired; unknown actions stay in place.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rable_scene::{Document, Event, NodeId};
use ulid::Ulid;

use crate::component;
use crate::context::Context;
use crate::error::LoopStatementError;
use crate::evaluator::Local;
use crate::hub::Hub;
use crate::parser::Program;
use crate::path::Path;
use crate::scope::{LoopScope, Scope};
use crate::text;
use crate::value::{Map, Value};

/// Attributes that exclude a subtree from all processing.
pub const NORENDER: [&str; 6] = [
    "rable:norender",
    "rbl:norender",
    ":norender",
    "rable:no-render",
    "rbl:no-render",
    ":no-render",
];

pub(crate) fn is_norender(document: &Document, node: NodeId) -> bool {
    NORENDER.iter().any(|name| document.has_attribute(node, name))
}

/// One directive attribute, normalized from any of its written forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Attribute name as written on the node.
    pub attribute: String,
    pub action: String,
    pub arguments: Vec<String>,
    pub value: String,
}

impl Directive {
    /// `@x` → `on:x`, `$x` → `data:x`, `&x` → `bind:x`; `:`, `rbl:` and
    /// `rable:` introduce the long form. Anything else is a plain attribute.
    pub fn parse(attribute: &str, value: &str) -> Option<Self> {
        let normalized = match attribute.chars().next()? {
            '@' => format!(":on:{}", &attribute[1..]),
            '$' => format!(":data:{}", &attribute[1..]),
            '&' => format!(":bind:{}", &attribute[1..]),
            _ => attribute.to_string(),
        };
        let body = normalized
            .strip_prefix(':')
            .or_else(|| normalized.strip_prefix("rbl:"))
            .or_else(|| normalized.strip_prefix("rable:"))?;
        let mut parts = body.split(':').map(str::to_string);
        let action = parts.next().filter(|action| !action.is_empty())?;
        Some(Self {
            attribute: attribute.to_string(),
            action,
            arguments: parts.collect(),
            value: value.to_string(),
        })
    }

    pub fn argument(&self, index: usize) -> Option<&str> {
        self.arguments
            .get(index)
            .map(String::as_str)
            .filter(|argument| !argument.is_empty())
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.arguments.iter().any(|argument| argument == modifier)
    }
}

pub(crate) fn directives(document: &Document, node: NodeId) -> Vec<Directive> {
    document
        .attributes(node)
        .iter()
        .filter_map(|(name, value)| Directive::parse(name, value))
        .collect()
}

/// `"<target> as <key> => <value>"` or `"<value> in <target>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopStatement {
    pub target: Path,
    pub key: Option<String>,
    pub value: String,
}

/// Split around the last `keyword` that has whitespace on both sides.
fn split_last<'a>(text: &'a str, keyword: &str) -> Option<(&'a str, &'a str)> {
    let mut search = text.len();
    while let Some(index) = text[..search].rfind(keyword) {
        let after = index + keyword.len();
        let spaced_before = text[..index].chars().next_back().is_some_and(char::is_whitespace);
        let spaced_after = text[after..].chars().next().is_some_and(char::is_whitespace);
        if spaced_before && spaced_after {
            return Some((text[..index].trim(), text[after..].trim()));
        }
        search = index;
    }
    None
}

impl LoopStatement {
    pub fn parse(statement: &str) -> Result<Self, LoopStatementError> {
        let invalid = || LoopStatementError {
            statement: statement.to_string(),
        };
        let non_empty = |part: &str| (!part.is_empty()).then(|| part.to_string());

        if let Some((left, value)) = split_last(statement, "=>") {
            if let Some((target, key)) = split_last(left, "as") {
                return match (non_empty(target), non_empty(key), non_empty(value)) {
                    (Some(target), Some(key), Some(value)) => Ok(Self {
                        target: Path::parse(&target),
                        key: Some(key),
                        value,
                    }),
                    _ => Err(invalid()),
                };
            }
        }
        match split_last(statement, "in") {
            Some((value, target)) => match (non_empty(value), non_empty(target)) {
                (Some(value), Some(target)) => Ok(Self {
                    target: Path::parse(&target),
                    key: None,
                    value,
                }),
                _ => Err(invalid()),
            },
            None => Err(invalid()),
        }
    }
}

/// `background_color` / `background-color` → `backgroundColor`.
pub fn camel_case(property: &str) -> String {
    let mut parts = property.split(['-', '_']);
    let mut output = parts.next().unwrap_or_default().to_string();
    for part in parts {
        let mut characters = part.chars();
        if let Some(first) = characters.next() {
            output.extend(first.to_uppercase());
            output.push_str(characters.as_str());
        }
    }
    output
}

// ------ conditional chains ------

#[derive(Clone)]
enum Condition {
    Expression(Rc<Program>),
    /// Did not compile; never shown.
    Invalid,
    /// `else`
    Always,
}

#[derive(Clone)]
struct Branch {
    node: NodeId,
    condition: Condition,
}

/// `if` / `elseif` / `else` chains collected among the children of one element.
#[derive(Default)]
pub(crate) struct Chains {
    chains: RefCell<Vec<Vec<Branch>>>,
    open: Cell<bool>,
}

impl Chains {
    pub fn add(&self, context: &Context, directive: &Directive, node: NodeId) {
        let condition = || match context.compile(&directive.value, &directive.attribute) {
            Some(program) => Condition::Expression(program),
            None => Condition::Invalid,
        };
        let mut chains = self.chains.borrow_mut();
        match directive.action.as_str() {
            "if" => {
                chains.push(vec![Branch {
                    node,
                    condition: condition(),
                }]);
                self.open.set(true);
            }
            "elseif" | "else-if" => match chains.last_mut() {
                Some(chain) if self.open.get() => chain.push(Branch {
                    node,
                    condition: condition(),
                }),
                _ => log::error!("[rable] If statement should start with if block! ({})", directive.attribute),
            },
            _ => match chains.last_mut() {
                Some(chain) if self.open.get() => {
                    chain.push(Branch {
                        node,
                        condition: Condition::Always,
                    });
                    self.open.set(false);
                }
                _ => log::error!("[rable] If statement should start with if block! ({})", directive.attribute),
            },
        }
    }

    /// Show the first branch of every chain whose condition holds, hide the rest.
    fn apply(&self, context: &Context, hub: &Hub) {
        let chains = self.chains.borrow().clone();
        for chain in chains {
            let mut matched = false;
            for branch in chain {
                let visible = !matched
                    && match &branch.condition {
                        Condition::Always => true,
                        Condition::Invalid => false,
                        Condition::Expression(program) => match context.evaluate(hub, program) {
                            Ok(value) => value.is_truthy(),
                            Err(error) => {
                                log::error!("[rable] {}: {error}", program.source);
                                false
                            }
                        },
                    };
                matched |= visible;
                context.document.set_hidden(branch.node, !visible);
            }
        }
    }

    pub fn subscribe(self: &Rc<Self>, context: &Rc<Context>, hub: &Rc<Hub>) {
        if self.chains.borrow().is_empty() {
            return;
        }
        let chains = Rc::clone(self);
        let context = Rc::clone(context);
        let listener_hub = Rc::clone(hub);
        hub.subscribe(move |_| chains.apply(&context, &listener_hub));
    }
}

// ------ tree walk ------

/// Wire every element child of `parent` to `hub`.
pub(crate) fn process_children(context: &Rc<Context>, parent: NodeId, hub: &Rc<Hub>) {
    let chains = Rc::new(Chains::default());
    for child in context.document.children(parent) {
        process_node(context, child, hub, &chains);
    }
    chains.subscribe(context, hub);
}

/// Process one element and its subtree. Returns the node that ends up in
/// the tree, which differs from `node` when a component replaced it.
pub(crate) fn process_node(
    context: &Rc<Context>,
    node: NodeId,
    hub: &Rc<Hub>,
    chains: &Chains,
) -> NodeId {
    let document = &context.document;
    if is_norender(document, node) {
        return node;
    }

    let found = directives(document, node);
    if let Some(looped) = found.iter().find(|directive| directive.action == "for") {
        wire_loop(context, node, hub, looped, &found);
        return node;
    }

    let is_component = document
        .tag_name(node)
        .is_some_and(|tag| context.template(&tag).is_some());
    if is_component {
        if let Some(instance) = component::instantiate(context, node, hub, chains) {
            process_attributes(context, instance.root, &instance.hub, chains);
            process_children(context, instance.root, &instance.hub);
            component::finish(context, &instance);
            return instance.root;
        }
    }

    process_attributes(context, node, hub, chains);
    if !document.child_nodes(node).is_empty() && !context.marks.skips_children(node) {
        process_children(context, node, hub);
    }
    node
}

/// Wire the directives of `node` itself.
pub(crate) fn process_attributes(context: &Rc<Context>, node: NodeId, hub: &Rc<Hub>, chains: &Chains) {
    for directive in directives(&context.document, node) {
        match directive.action.as_str() {
            "on" | "event" => wire_event(context, node, hub, &directive),
            "value" => wire_value(context, node, hub, &directive),
            "checked" => wire_checked(context, node, hub, &directive),
            "if" | "elseif" | "else-if" | "else" => chains.add(context, &directive, node),
            "class" => wire_class(context, node, hub, &directive),
            "bind" => wire_bind(context, node, hub, &directive),
            "style" => wire_style(context, node, hub, &directive),
            action => {
                log::trace!("[rable] leaving unknown directive '{action}' on {node}");
                continue;
            }
        }
        context.document.remove_attribute(node, &directive.attribute);
    }
}

// ------ loops ------

struct LoopAnchor {
    master: NodeId,
    template: NodeId,
    identity: Ulid,
    reverse: bool,
}

fn wire_loop(context: &Rc<Context>, node: NodeId, hub: &Rc<Hub>, directive: &Directive, all: &[Directive]) {
    let document = &context.document;
    let template = document.clone_node(node, true);
    document.remove_attribute(template, &directive.attribute);
    for directive in all {
        document.remove_attribute(node, &directive.attribute);
    }
    document.set_hidden(node, true);
    context.marks.skip_text(node);
    context.marks.skip_children(node);

    let anchor = LoopAnchor {
        master: node,
        template,
        identity: Ulid::new(),
        reverse: directive.has_modifier("reverse") || directive.has_modifier("reversed"),
    };
    context.marks.tag_loop(node, anchor.identity);
    let statement = LoopStatement::parse(&directive.value);
    log::debug!("[rable] loop {} wired on {node}", anchor.identity);

    let listener_context = Rc::clone(context);
    let listener_hub = Rc::clone(hub);
    hub.subscribe(move |_| match &statement {
        Ok(statement) => render_loop(&listener_context, &listener_hub, &anchor, statement),
        Err(error) => log::error!("[rable] {error}"),
    });
}

fn render_loop(context: &Rc<Context>, hub: &Rc<Hub>, anchor: &LoopAnchor, statement: &LoopStatement) {
    let document = &context.document;
    let Some(parent) = document.parent(anchor.master) else {
        log::debug!("[rable] loop master {} is detached", anchor.master);
        return;
    };
    for child in document.children(parent) {
        if child != anchor.master && context.marks.loop_of(child) == Some(anchor.identity) {
            context.release_instances(child);
            document.remove(child);
            context.marks.forget(child);
        }
    }

    let state = hub.current_state();
    let entries: Vec<(Value, String)> = match state.get(&statement.target) {
        Value::Map(map) => map
            .keys()
            .map(|key| (Value::from(key.as_str()), key.clone()))
            .collect(),
        Value::List(items) => (0..items.len())
            .map(|index| (Value::from(index), index.to_string()))
            .collect(),
        _ => {
            log::error!(
                "[rable] Targeted data-item '{}' is not a valid object.",
                statement.target
            );
            return;
        }
    };
    let mut previous = anchor.master;
    for (key, entry) in entries {
        let clone = document.clone_node(anchor.template, true);
        if anchor.reverse && previous != anchor.master {
            document.insert_before(parent, clone, Some(previous));
        } else {
            document.insert_after(previous, clone);
        }
        let overlay = LoopScope::new(
            Rc::clone(&state),
            &statement.target,
            &entry,
            &statement.value,
            statement.key.clone().map(|name| (name, key)),
        );
        let clone_hub = Hub::transient(Rc::new(overlay), Rc::clone(&state));
        let rendered = process_clone(context, clone, &clone_hub);
        context.marks.tag_loop(rendered, anchor.identity);
        previous = rendered;
    }
}

fn process_clone(context: &Rc<Context>, clone: NodeId, hub: &Rc<Hub>) -> NodeId {
    let chains = Rc::new(Chains::default());
    let rendered = process_node(context, clone, hub, &chains);
    chains.subscribe(context, hub);
    text::process(context, rendered, hub);
    context.marks.skip_text(rendered);
    rendered
}

// ------ events ------

fn event_payload(document: &Document, event: &Event) -> Value {
    let mut payload = Map::new();
    payload.insert("type".to_string(), Value::from(event.name.as_str()));
    if let Some(value) = document.value(event.target) {
        payload.insert("value".to_string(), value.into());
    }
    if let Some(checked) = document.checked(event.target) {
        payload.insert("checked".to_string(), checked.into());
    }
    Value::Map(payload)
}

fn forward_component_event(context: &Context, node: NodeId, hub: &Rc<Hub>, dom_event: &str, component_event: &str) {
    let document = context.document.clone();
    let hub = Rc::clone(hub);
    let component_event = component_event.to_string();
    context.document.add_event_listener(node, dom_event, move |event| {
        hub.trigger_component_event(&component_event, event_payload(&document, event));
    });
}

fn wire_event(context: &Rc<Context>, node: NodeId, hub: &Rc<Hub>, directive: &Directive) {
    let Some(event_name) = directive.argument(0) else {
        log::error!("[rable] {} names no event", directive.attribute);
        return;
    };
    let alias = directive.argument(1);
    if !directive.value.is_empty() {
        if let Some(program) = context.compile(&directive.value, &directive.attribute) {
            let handler_context = Rc::clone(context);
            let handler_hub = Rc::clone(hub);
            context.document.add_event_listener(node, event_name, move |event| {
                let payload = event_payload(&handler_context.document, event);
                let result = handler_context
                    .environment(&handler_hub)
                    .with_local("event", Local::Value(payload))
                    .evaluate(&program);
                if let Err(error) = result {
                    log::error!("[rable] {}: {error}", program.source);
                }
            });
        }
    } else if alias.is_none() {
        forward_component_event(context, node, hub, event_name, event_name);
    }
    if let Some(alias) = alias {
        forward_component_event(context, node, hub, event_name, alias);
    }
}

// ------ two-way bindings ------

#[derive(Clone, Copy)]
enum Control {
    Value,
    EditableText,
}

/// One control mirrored to one state path.
struct ControlBinding {
    document: Document,
    node: NodeId,
    control: Control,
    state: Rc<dyn Scope>,
    path: Path,
}

impl ControlBinding {
    fn displayed(&self) -> String {
        match self.control {
            Control::Value => self.document.value(self.node).unwrap_or_default(),
            Control::EditableText => self.document.inner_text(self.node),
        }
    }

    fn display(&self, text: &str) {
        match self.control {
            Control::Value => self.document.set_value(self.node, text),
            Control::EditableText => self.document.set_inner_text(self.node, text),
        }
    }

    fn bound(&self) -> Option<Value> {
        let value = self.state.get(&self.path);
        if value.is_object_or_function() {
            log::error!("[rable] Cannot sync objects or functions. ('{}')", self.path);
            return None;
        }
        Some(value)
    }

    fn in_sync(&self) -> bool {
        self.displayed() == self.state.get(&self.path).to_string()
    }

    /// State → control. True when the control changed.
    fn push(&self) -> bool {
        let Some(value) = self.bound() else {
            return false;
        };
        let text = value.to_string();
        if self.displayed() == text {
            return false;
        }
        self.display(&text);
        true
    }

    /// Control → state. True when state was written.
    fn pull(&self) -> bool {
        let Some(value) = self.bound() else {
            return false;
        };
        let displayed = self.displayed();
        if value == Value::from(displayed.as_str()) {
            return false;
        }
        self.state.set(&self.path, displayed.into())
    }

    fn concerns(&self, hint: Option<&str>) -> bool {
        hint.is_none() || hint == self.path.head()
    }
}

fn wire_value(context: &Rc<Context>, node: NodeId, hub: &Rc<Hub>, directive: &Directive) {
    let document = &context.document;
    let control = if document.is_value_control(node) {
        Control::Value
    } else if document.is_content_editable(node) {
        Control::EditableText
    } else {
        log::debug!("[rable] {} on {node}, which is neither a control nor editable", directive.attribute);
        return;
    };
    let binding = Rc::new(ControlBinding {
        document: document.clone(),
        node,
        control,
        state: hub.current_state(),
        path: Path::parse(&directive.value),
    });
    binding.push();

    let validator = Rc::clone(&binding);
    hub.register_validator("dom-synced", move || validator.in_sync());

    let listener = Rc::clone(&binding);
    let listener_hub = Rc::clone(hub);
    hub.subscribe(move |hint| {
        if listener.concerns(hint) && listener.push() {
            listener_hub.trigger_scheduled_tasks();
        }
    });

    let input_hub = Rc::clone(hub);
    document.add_event_listener(node, "input", move |_| {
        if binding.pull() {
            input_hub.trigger_scheduled_tasks();
        }
    });
}

fn wire_checked(context: &Rc<Context>, node: NodeId, hub: &Rc<Hub>, directive: &Directive) {
    let document = context.document.clone();
    if !document.is_checkable(node) {
        log::debug!("[rable] {} on {node}, which cannot be checked", directive.attribute);
        return;
    }
    let state = hub.current_state();
    let path = Path::parse(&directive.value);
    document.set_checked(node, state.get(&path).is_truthy());

    let listener_document = document.clone();
    let listener_state = Rc::clone(&state);
    let listener_path = path.clone();
    hub.subscribe(move |hint| {
        if hint.is_some() && hint != listener_path.head() {
            return;
        }
        let wanted = listener_state.get(&listener_path).is_truthy();
        if listener_document.checked(node) != Some(wanted) {
            listener_document.set_checked(node, wanted);
        }
    });

    let input_document = document.clone();
    document.add_event_listener(node, "input", move |_| {
        let checked = input_document.checked(node).unwrap_or(false);
        if state.get(&path) != Value::Bool(checked) {
            state.set(&path, checked.into());
        }
    });
}

// ------ one-way bindings ------

fn wire_class(context: &Rc<Context>, node: NodeId, hub: &Rc<Hub>, directive: &Directive) {
    let Some(class) = directive.argument(0).map(str::to_string) else {
        log::error!("[rable] No class defined! ({})", directive.attribute);
        return;
    };
    let program = context.compile(&directive.value, &directive.attribute);
    let listener_context = Rc::clone(context);
    let listener_hub = Rc::clone(hub);
    hub.subscribe(move |_| {
        let document = &listener_context.document;
        let Some(program) = &program else {
            document.set_hidden(node, true);
            return;
        };
        match listener_context.evaluate(&listener_hub, program) {
            Ok(value) if value.is_truthy() => document.add_class(node, &class),
            Ok(_) => document.remove_class(node, &class),
            Err(error) => {
                log::error!("[rable] {}: {error}", program.source);
                document.set_hidden(node, true);
            }
        }
    });
}

fn wire_bind(context: &Rc<Context>, node: NodeId, hub: &Rc<Hub>, directive: &Directive) {
    let Some(attribute) = directive.argument(0).map(str::to_string) else {
        log::error!("[rable] No attribute defined! ({})", directive.attribute);
        return;
    };
    let source = if directive.value.is_empty() {
        attribute.as_str()
    } else {
        directive.value.as_str()
    };
    let Some(program) = context.compile(source, &directive.attribute) else {
        return;
    };
    let listener_context = Rc::clone(context);
    let listener_hub = Rc::clone(hub);
    hub.subscribe(move |_| {
        let document = &listener_context.document;
        match listener_context.evaluate(&listener_hub, &program) {
            Ok(value) => document.set_attribute(node, &attribute, &value.to_script_string()),
            Err(error) => log::error!("[rable] {}: {error}", program.source),
        }
    });
}

fn wire_style(context: &Rc<Context>, node: NodeId, hub: &Rc<Hub>, directive: &Directive) {
    let Some(property) = directive.argument(0).map(camel_case) else {
        log::error!("[rable] No style property defined! ({})", directive.attribute);
        return;
    };
    let Some(program) = context.compile(&directive.value, &directive.attribute) else {
        return;
    };
    let listener_context = Rc::clone(context);
    let listener_hub = Rc::clone(hub);
    hub.subscribe(move |_| {
        let document = &listener_context.document;
        match listener_context.evaluate(&listener_hub, &program) {
            Ok(value) if value.is_nullish() => document.set_style(node, &property, None),
            Ok(value) => {
                let value = value.to_string();
                document.set_style(node, &property, Some(value.as_str()).filter(|value| !value.is_empty()));
            }
            Err(error) => log::error!("[rable] {}: {error}", program.source),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_prefixes_normalize() {
        let click = Directive::parse("@click", "open()").unwrap();
        assert_eq!((click.action.as_str(), click.argument(0)), ("on", Some("click")));
        let seed = Directive::parse("$label", "Hi").unwrap();
        assert_eq!((seed.action.as_str(), seed.argument(0)), ("data", Some("label")));
        let bind = Directive::parse("&version", "").unwrap();
        assert_eq!((bind.action.as_str(), bind.argument(0)), ("bind", Some("version")));
        let long = Directive::parse("rable:on:click:select", "").unwrap();
        assert_eq!(long.arguments, vec!["click".to_string(), "select".to_string()]);
        assert_eq!(Directive::parse("rbl:for:reverse", "x in y").unwrap().action, "for");
        assert!(Directive::parse("class", "card").is_none());
        assert!(Directive::parse(":", "").is_none());
    }

    #[test]
    fn loop_statements() {
        assert_eq!(
            LoopStatement::parse("downloads as index => version").unwrap(),
            LoopStatement {
                target: Path::parse("downloads"),
                key: Some("index".to_string()),
                value: "version".to_string(),
            }
        );
        assert_eq!(
            LoopStatement::parse("version in app.downloads").unwrap(),
            LoopStatement {
                target: Path::parse("app.downloads"),
                key: None,
                value: "version".to_string(),
            }
        );
        let error = LoopStatement::parse("downloads").unwrap_err();
        assert_eq!(error.to_string(), "downloads is not a valid loop statement.");
        assert!(LoopStatement::parse("in downloads").is_err());
    }

    #[test]
    fn style_arguments_become_camel_case() {
        assert_eq!(camel_case("background_color"), "backgroundColor");
        assert_eq!(camel_case("border-top-width"), "borderTopWidth");
        assert_eq!(camel_case("color"), "color");
    }
}
