use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;
use rable_scene::{Document, NodeId};
use ulid::Ulid;

use crate::builtins::Globals;
use crate::error::EvalError;
use crate::evaluator::{Environment, Programs};
use crate::hub::Hub;
use crate::parser::Program;
use crate::state::State;
use crate::style::StyleRegistry;
use crate::value::Value;

/// Per-node processing flags. Kept beside the document so that cloned
/// nodes start out unmarked.
#[derive(Default)]
pub(crate) struct Marks {
    skip_text: RefCell<HashSet<NodeId>>,
    skip_children: RefCell<HashSet<NodeId>>,
    loops: RefCell<HashMap<NodeId, Ulid>>,
}

impl Marks {
    pub fn skip_text(&self, node: NodeId) {
        self.skip_text.borrow_mut().insert(node);
    }

    pub fn skips_text(&self, node: NodeId) -> bool {
        self.skip_text.borrow().contains(&node)
    }

    pub fn skip_children(&self, node: NodeId) {
        self.skip_children.borrow_mut().insert(node);
    }

    pub fn skips_children(&self, node: NodeId) -> bool {
        self.skip_children.borrow().contains(&node)
    }

    pub fn tag_loop(&self, node: NodeId, identity: Ulid) {
        self.loops.borrow_mut().insert(node, identity);
    }

    pub fn loop_of(&self, node: NodeId) -> Option<Ulid> {
        self.loops.borrow().get(&node).copied()
    }

    pub fn forget(&self, node: NodeId) {
        self.skip_text.borrow_mut().remove(&node);
        self.skip_children.borrow_mut().remove(&node);
        self.loops.borrow_mut().remove(&node);
    }
}

/// Live component instance, keyed by its `component-identifier`.
#[derive(Clone)]
pub(crate) struct Instance {
    pub component_type: String,
    pub root: NodeId,
    pub state: Rc<State>,
    pub hub: Rc<Hub>,
}

/// Everything directive and text wiring shares within one application.
pub(crate) struct Context {
    pub document: Document,
    pub components: RefCell<IndexMap<String, String>>,
    pub instances: RefCell<IndexMap<String, Instance>>,
    pub styles: StyleRegistry,
    pub marks: Marks,
    pub globals: Rc<Globals>,
    pub programs: Programs,
}

impl Context {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            components: RefCell::new(IndexMap::new()),
            instances: RefCell::new(IndexMap::new()),
            styles: StyleRegistry::default(),
            marks: Marks::default(),
            globals: Rc::new(Globals::default()),
            programs: Programs::default(),
        }
    }

    /// Forget the instances rendered at or below `subtree`.
    pub fn release_instances(&self, subtree: NodeId) {
        let document = &self.document;
        self.instances.borrow_mut().retain(|identifier, instance| {
            let inside = std::iter::successors(Some(instance.root), |node| document.parent(*node))
                .any(|node| node == subtree);
            if inside {
                log::debug!("[component] released {identifier}");
            }
            !inside
        });
    }

    pub fn template(&self, tag: &str) -> Option<String> {
        self.components.borrow().get(tag).cloned()
    }

    pub fn environment(&self, hub: &Hub) -> Environment {
        Environment::for_hub(hub).with_globals(Rc::clone(&self.globals))
    }

    /// Compile `source`, logging the diagnostics under `origin` on failure.
    pub fn compile(&self, source: &str, origin: &str) -> Option<Rc<Program>> {
        match self.programs.compile(source) {
            Ok(program) => Some(program),
            Err(error) => {
                log::error!("[rable] {error}\n{}", error.report(origin));
                None
            }
        }
    }

    pub fn evaluate(&self, hub: &Hub, program: &Program) -> Result<Value, EvalError> {
        self.environment(hub).evaluate(program)
    }
}
