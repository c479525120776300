use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::scheduler::Scheduler;
use crate::scope::Scope;
use crate::value::Value;

pub type Listener = Rc<dyn Fn(Option<&str>)>;
pub type ComponentEventHandler = Rc<dyn Fn(&str, Value)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubKind {
    /// The application scope; ready once mounted.
    Root,
    /// One component instance, with its own scheduler and events.
    Component,
    /// Scope of a loop clone. Clones are rebuilt on every change of the
    /// enclosing scope, so listeners run once right away and never again.
    Transient,
}

/// Per-scope mediator between state changes and the listeners wired by
/// directives and text placeholders.
pub struct Hub {
    kind: HubKind,
    state: Rc<dyn Scope>,
    lexical: Rc<dyn Scope>,
    listeners: RefCell<Vec<Listener>>,
    ready: Cell<bool>,
    scheduler: Option<Rc<Scheduler>>,
    component_events: RefCell<Option<ComponentEventHandler>>,
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("kind", &self.kind)
            .field("listeners", &self.listeners.borrow().len())
            .field("ready", &self.ready.get())
            .finish()
    }
}

impl Hub {
    fn new(
        kind: HubKind,
        state: Rc<dyn Scope>,
        lexical: Rc<dyn Scope>,
        scheduler: Option<Rc<Scheduler>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            kind,
            state,
            lexical,
            listeners: RefCell::new(Vec::new()),
            ready: Cell::new(kind == HubKind::Transient),
            scheduler,
            component_events: RefCell::new(None),
        })
    }

    pub fn root(state: Rc<dyn Scope>) -> Rc<Self> {
        Self::new(HubKind::Root, Rc::clone(&state), state, None)
    }

    /// Expressions inside a component read the component's own state, so the
    /// lexical scope is the state itself.
    pub fn component(state: Rc<dyn Scope>, scheduler: Rc<Scheduler>) -> Rc<Self> {
        Self::new(HubKind::Component, Rc::clone(&state), state, Some(scheduler))
    }

    pub fn transient(state: Rc<dyn Scope>, lexical: Rc<dyn Scope>) -> Rc<Self> {
        Self::new(HubKind::Transient, state, lexical, None)
    }

    pub fn kind(&self) -> HubKind {
        self.kind
    }

    pub fn subscribe(&self, listener: impl Fn(Option<&str>) + 'static) {
        if self.kind == HubKind::Transient {
            listener(None);
            return;
        }
        self.listeners.borrow_mut().push(Rc::new(listener));
    }

    /// Run every listener in registration order. Dropped until the hub is ready.
    pub fn publish(&self, hint: Option<&str>) {
        if self.kind == HubKind::Transient {
            return;
        }
        if !self.ready.get() {
            log::trace!("[hub] dropping change {hint:?} before ready");
            return;
        }
        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            listener(hint);
        }
    }

    pub fn current_state(&self) -> Rc<dyn Scope> {
        Rc::clone(&self.state)
    }

    pub fn current_lexical_scope(&self) -> Rc<dyn Scope> {
        Rc::clone(&self.lexical)
    }

    pub fn mark_ready(&self) {
        self.ready.set(true);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn scheduler(&self) -> Option<Rc<Scheduler>> {
        self.scheduler.clone()
    }

    /// Ignored on hubs without a scheduler.
    pub fn register_validator(&self, stage: &str, validator: impl Fn() -> bool + 'static) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.register_validator(stage, validator);
        }
    }

    pub fn trigger_scheduled_tasks(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.trigger_tasks();
        }
    }

    pub fn set_component_event_handler(&self, handler: impl Fn(&str, Value) + 'static) {
        *self.component_events.borrow_mut() = Some(Rc::new(handler));
    }

    /// Ignored on hubs that do not belong to a component.
    pub fn trigger_component_event(&self, name: &str, payload: Value) {
        let handler = self.component_events.borrow().clone();
        match handler {
            Some(handler) => handler(name, payload),
            None => log::trace!("[hub] no component listens for '{name}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::State;
    use std::cell::RefCell;

    fn recorder(hub: &Hub) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        for index in 0..2 {
            let seen = Rc::clone(&seen);
            hub.subscribe(move |hint| {
                seen.borrow_mut()
                    .push(format!("{index}:{}", hint.unwrap_or("*")));
            });
        }
        seen
    }

    #[test]
    fn publish_is_dropped_until_ready_then_runs_in_order() {
        let hub = Hub::root(State::root());
        let seen = recorder(&hub);
        hub.publish(Some("early"));
        assert!(seen.borrow().is_empty());

        hub.mark_ready();
        hub.publish(Some("count"));
        hub.publish(None);
        assert_eq!(*seen.borrow(), vec!["0:count", "1:count", "0:*", "1:*"]);
    }

    #[test]
    fn transient_hub_runs_listeners_once_immediately() {
        let state = State::root();
        let hub = Hub::transient(state.clone(), state);
        let seen = recorder(&hub);
        assert_eq!(*seen.borrow(), vec!["0:*", "1:*"]);
        hub.publish(Some("count"));
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn scheduler_messages_are_ignored_on_root_hub() {
        let hub = Hub::root(State::root());
        hub.register_validator("dom-synced", || false);
        hub.trigger_scheduled_tasks();
        hub.trigger_component_event("select", Value::Undefined);
        assert!(hub.scheduler().is_none());
    }

    #[test]
    fn component_hub_forwards_events_to_handler() {
        let hub = Hub::component(State::root(), Rc::new(Scheduler::for_component()));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        hub.set_component_event_handler(move |name, payload| {
            sink.borrow_mut().push(format!("{name}={payload}"));
        });
        hub.trigger_component_event("select", "3.1".into());
        assert_eq!(*seen.borrow(), vec!["select=3.1"]);
    }
}
