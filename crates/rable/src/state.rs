use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use ulid::Ulid;

use crate::hub::Hub;
use crate::path::{self, Path};
use crate::scope::Scope;
use crate::text;
use crate::value::{Map, Value};

/// Extra behaviour of a component instance's state.
struct ComponentBinding {
    parent: Rc<dyn Scope>,
    /// child property -> parent path
    binders: RefCell<IndexMap<String, Path>>,
    import_finished: Cell<bool>,
}

/// Reactive state container of one scope.
///
/// Every successful write publishes a change on the owning [`Hub`] with the
/// outermost written segment as hint. There is no no-op detection.
pub struct State {
    values: RefCell<Map>,
    hub: RefCell<Weak<Hub>>,
    this: Weak<State>,
    component: Option<ComponentBinding>,
}

impl State {
    /// Root application state. Functions written into it are bound to it.
    pub fn root() -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            values: RefCell::new(Map::new()),
            hub: RefCell::new(Weak::new()),
            this: this.clone(),
            component: None,
        })
    }

    /// Root state that is not attached to any hub yet.
    pub fn detached() -> Rc<Self> {
        Self::root()
    }

    /// State of a component instance whose binders resolve against `parent`.
    pub fn component(parent: Rc<dyn Scope>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            values: RefCell::new(Map::new()),
            hub: RefCell::new(Weak::new()),
            this: this.clone(),
            component: Some(ComponentBinding {
                parent,
                binders: RefCell::new(IndexMap::new()),
                import_finished: Cell::new(false),
            }),
        })
    }

    pub fn attach_hub(&self, hub: &Rc<Hub>) {
        *self.hub.borrow_mut() = Rc::downgrade(hub);
    }

    pub fn is_component(&self) -> bool {
        self.component.is_some()
    }

    fn binder(&self, name: &str) -> Option<(Rc<dyn Scope>, Path)> {
        let component = self.component.as_ref()?;
        let target = component.binders.borrow().get(name).cloned()?;
        Some((Rc::clone(&component.parent), target))
    }

    /// Redirect the child property `child` to `parent_path` of the parent scope.
    pub fn bind(&self, child: &str, parent_path: &str) {
        match &self.component {
            Some(component) => {
                component
                    .binders
                    .borrow_mut()
                    .insert(child.to_string(), Path::parse(parent_path));
            }
            None => log::error!("[rable] binders are only available on component state"),
        }
    }

    pub fn binders(&self) -> Vec<(String, Path)> {
        self.component
            .as_ref()
            .map(|component| {
                component
                    .binders
                    .borrow()
                    .iter()
                    .map(|(child, parent)| (child.clone(), parent.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Marks the `<data>` import as done; binder writes route to the parent from now on.
    pub fn finish_import(&self) {
        if let Some(component) = &self.component {
            component.import_finished.set(true);
        }
    }

    pub fn is_import_finished(&self) -> bool {
        self.component
            .as_ref()
            .is_some_and(|component| component.import_finished.get())
    }

    pub fn read(&self, path: &Path) -> Value {
        let Some(head) = path.head() else {
            return self.snapshot();
        };
        if let Some((parent, target)) = self.binder(head) {
            return parent.get(&target.join(&path.tail()));
        }
        let values = self.values.borrow();
        match values.get(head) {
            Some(value) => path::get(value, &path.tail()),
            None if path.len() == 1 => Value::Undefined,
            None => Value::Null,
        }
    }

    pub fn write(&self, path: &Path, value: Value) -> bool {
        let Some(head) = path.head().map(str::to_string) else {
            log::error!("[rable] cannot write to an empty path");
            return false;
        };
        let written = match &self.component {
            None => {
                let value = match value {
                    Value::Function(function) => {
                        let receiver: Weak<dyn Scope> = self.this.clone();
                        Value::Function(function.bind(receiver))
                    }
                    value => value,
                };
                self.store(path, value)
            }
            Some(_) if matches!(value, Value::Function(_)) => {
                log::debug!("[rable] component state ignores function value at '{path}'");
                return false;
            }
            Some(component) => match self.binder(&head) {
                Some((parent, target)) if component.import_finished.get() => {
                    parent.set(&target.join(&path.tail()), value)
                }
                _ => self.store(path, expand_placeholders(value)),
            },
        };
        if written || self.is_component() {
            self.broadcast(&head);
        }
        written
    }

    fn store(&self, path: &Path, value: Value) -> bool {
        let mut values = self.values.borrow_mut();
        let Some(head) = path.head() else {
            return false;
        };
        if path.len() == 1 {
            values.insert(head.to_string(), value);
            return true;
        }
        match values.get_mut(head) {
            Some(container) => path::set(container, &path.tail(), value),
            None => false,
        }
    }

    fn broadcast(&self, head: &str) {
        let hub = self.hub.borrow().upgrade();
        if let Some(hub) = hub {
            hub.publish(Some(head));
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.borrow().keys().cloned().collect();
        for (child, _) in self.binders() {
            if !names.contains(&child) {
                names.push(child);
            }
        }
        names
    }
}

impl Scope for State {
    fn get(&self, path: &Path) -> Value {
        self.read(path)
    }

    fn set(&self, path: &Path, value: Value) -> bool {
        self.write(path, value)
    }

    fn names(&self) -> Vec<String> {
        self.keys()
    }
}

/// Expand `{{random}}` and `{{rnd}}` to a fresh `random-<id>`; any other
/// placeholder becomes `UNKNOWN`.
pub fn expand_placeholders(value: Value) -> Value {
    let Value::String(text) = value else {
        return value;
    };
    Value::String(text::substitute(&text, |placeholder| match placeholder.trim() {
        "rnd" | "random" => format!("random-{}", Ulid::new().to_string().to_lowercase()),
        _ => "UNKNOWN".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Function;
    use std::cell::RefCell;

    fn hub_with_log(state: &Rc<State>) -> (Rc<Hub>, Rc<RefCell<Vec<Option<String>>>>) {
        let hub = Hub::root(state.clone());
        state.attach_hub(&hub);
        hub.mark_ready();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        hub.subscribe(move |hint| sink.borrow_mut().push(hint.map(str::to_string)));
        (hub, log)
    }

    #[test]
    fn write_then_read_round_trips_with_outermost_hint() {
        let state = State::root();
        let (_hub, log) = hub_with_log(&state);
        state.write(&"app".into(), Value::from(serde_json::json!({ "location": "home" })));
        log.borrow_mut().clear();

        assert!(state.write(&"app.location".into(), "about".into()));
        assert_eq!(state.read(&"app.location".into()), Value::from("about"));
        assert_eq!(*log.borrow(), vec![Some("app".to_string())]);
    }

    #[test]
    fn same_value_still_broadcasts() {
        let state = State::root();
        let (_hub, log) = hub_with_log(&state);
        state.write(&"count".into(), 1.into());
        state.write(&"count".into(), 1.into());
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn failed_nested_write_is_silent() {
        let state = State::root();
        let (_hub, log) = hub_with_log(&state);
        assert!(!state.write(&"missing.leaf".into(), 1.into()));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn functions_are_bound_to_root_state() {
        let state = State::root();
        state.write(&"count".into(), 41.into());
        state.write(
            &"increment".into(),
            Function::new("increment", |invocation| {
                let receiver = invocation.receiver.clone().ok_or_else(|| {
                    crate::EvalError::Native("unbound".to_string())
                })?;
                let count = receiver.get(&"count".into()).to_number();
                receiver.set(&"count".into(), (count + 1.0).into());
                Ok(Value::Undefined)
            })
            .into(),
        );
        let Value::Function(function) = state.read(&"increment".into()) else {
            panic!("Expected function");
        };
        assert!(function.is_bound());
        function.call(Vec::new()).unwrap();
        assert_eq!(state.read(&"count".into()), Value::from(42));
    }

    #[test]
    fn component_state_rejects_functions_and_expands_random() {
        let parent = State::root();
        let state = State::component(parent);
        let function = Function::new("f", |_| Ok(Value::Undefined));
        assert!(!state.write(&"f".into(), function.into()));
        assert!(!state.contains("f"));

        state.write(&"id".into(), "input-{{random}}".into());
        state.write(&"other".into(), "{{ what }}".into());
        let id = state.read(&"id".into());
        assert!(id.as_str().unwrap().starts_with("input-random-"));
        assert_eq!(state.read(&"other".into()), Value::from("UNKNOWN"));
    }

    #[test]
    fn binders_redirect_reads_always_and_writes_after_import() {
        let parent = State::root();
        parent.write(&"bar".into(), 1.into());
        let state = State::component(parent.clone());
        state.bind("foo", "bar");

        state.write(&"foo".into(), 3.into());
        assert_eq!(parent.read(&"bar".into()), Value::from(1));
        assert_eq!(state.read(&"foo".into()), Value::from(1));

        state.finish_import();
        state.write(&"foo".into(), 5.into());
        assert_eq!(parent.read(&"bar".into()), Value::from(5));
        assert_eq!(state.read(&"foo".into()), Value::from(5));
        assert_eq!(state.keys(), vec!["foo".to_string()]);
    }
}
