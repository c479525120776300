use std::error::Error;
use std::rc::Rc;

use indexmap::IndexMap;
use rable_scene::{Document, NodeId};

use crate::context::Context;
use crate::directive;
use crate::error::LoadError;
use crate::hub::Hub;
use crate::path::Path;
use crate::state::State;
use crate::text;
use crate::value::{Function, Map, Value};

/// Initial root state of an application.
#[derive(Default, Clone)]
pub struct RableOptions {
    pub data: Map,
    /// Written into the root state, bound to it.
    pub functions: IndexMap<String, Function>,
}

impl RableOptions {
    pub fn with_data(mut self, data: serde_json::Map<String, serde_json::Value>) -> Self {
        self.data
            .extend(data.into_iter().map(|(key, value)| (key, Value::from(value))));
        self
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.insert(function.name().to_string(), function);
        self
    }
}

/// Source of component template text, e.g. the file system in the CLI.
pub trait TemplateLoader {
    fn load(&self, path: &str) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// One reactive application bound to a document.
pub struct Rable {
    context: Rc<Context>,
    state: Rc<State>,
    hub: Rc<Hub>,
}

impl Rable {
    pub fn new(document: Document, options: RableOptions) -> Self {
        let state = State::root();
        let hub = Hub::root(Rc::clone(&state) as _);
        state.attach_hub(&hub);
        for (key, value) in options.data {
            state.write(&Path::parse(&key), value);
        }
        for (name, function) in options.functions {
            state.write(&Path::parse(&name), Value::Function(function));
        }
        Self {
            context: Rc::new(Context::new(document)),
            state,
            hub,
        }
    }

    pub fn state(&self) -> Rc<State> {
        Rc::clone(&self.state)
    }

    pub fn hub(&self) -> Rc<Hub> {
        Rc::clone(&self.hub)
    }

    pub fn document(&self) -> &Document {
        &self.context.document
    }

    /// Registered component names, in registration order.
    pub fn components(&self) -> Vec<String> {
        self.context.components.borrow().keys().cloned().collect()
    }

    /// Register `template` under the lower-cased `name`. False if taken.
    pub fn import_component(&self, name: &str, template: &str) -> bool {
        let name = name.to_lowercase();
        let mut components = self.context.components.borrow_mut();
        if components.contains_key(&name) {
            log::error!("[rable] Component '{name}' is already registered");
            return false;
        }
        log::debug!("[rable] component '{name}' registered");
        components.insert(name, template.to_string());
        true
    }

    pub fn load_component(
        &self,
        name: &str,
        path: &str,
        loader: &dyn TemplateLoader,
    ) -> Result<bool, LoadError> {
        let template = loader.load(path).map_err(|source| LoadError {
            name: name.to_string(),
            path: path.to_string(),
            source,
        })?;
        Ok(self.import_component(name, &template))
    }

    /// Make `function` callable from every expression by name.
    pub fn register_function(&self, name: &str, function: Function) {
        self.context.globals.register(name, function);
    }

    /// Process the element matching `query` and render it. False when the
    /// query is invalid or matches nothing.
    pub fn mount(&self, query: &str) -> bool {
        let root = match self.context.document.query_selector(query) {
            Ok(Some(root)) => root,
            Ok(None) => {
                log::error!("[rable] mount target '{query}' not found");
                return false;
            }
            Err(error) => {
                log::error!("[rable] invalid mount query '{query}': {error}");
                return false;
            }
        };
        directive::process_children(&self.context, root, &self.hub);
        text::process(&self.context, root, &self.hub);
        self.hub.mark_ready();
        self.hub.publish(None);
        log::info!(
            "[rable] mounted '{query}' with {} listener(s)",
            self.hub.listener_count()
        );
        true
    }

    /// Run every root listener again.
    pub fn refresh(&self) {
        self.hub.publish(None);
    }

    /// Identity shared by a loop's master and its clones.
    pub fn loop_identity(&self, node: NodeId) -> Option<String> {
        self.context
            .marks
            .loop_of(node)
            .map(|identity| identity.to_string().to_lowercase())
    }

    /// State of the instance tagged `component-identifier="<identifier>"`.
    pub fn component_state(&self, identifier: &str) -> Option<Rc<State>> {
        self.context
            .instances
            .borrow()
            .get(identifier)
            .map(|instance| Rc::clone(&instance.state))
    }

    /// `(identifier, component type)` of every live instance.
    pub fn instances(&self) -> Vec<(String, String)> {
        self.context
            .instances
            .borrow()
            .iter()
            .map(|(identifier, instance)| (identifier.clone(), instance.component_type.clone()))
            .collect()
    }

    /// Types whose stylesheet has been injected.
    pub fn styled_components(&self) -> Vec<String> {
        self.context.styles.injected()
    }
}
