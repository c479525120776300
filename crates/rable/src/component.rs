//! Component instances: template parsing, isolated state, host attributes,
//! `<data>` import and scoped styles.
//!
//! A component template looks like
//!
//! ```html
//! <component><a class="link" @click="open(url)">{{ label }}</a></component>
//! <data>{ "label": "Download" }</data>
//! <style>.link { color: red; }</style>
//! ```
//!
//! The first element inside `<component>` replaces the host element.

use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use rable_scene::NodeId;
use ulid::Ulid;

use crate::context::{Context, Instance};
use crate::directive::{self, Chains};
use crate::error::ComponentError;
use crate::evaluator::Local;
use crate::hub::Hub;
use crate::parser::Program;
use crate::path::Path;
use crate::scheduler::Scheduler;
use crate::scope::Scope;
use crate::state::State;
use crate::value::Value;

/// Replace `host` with a fresh instance of its component. `None` leaves the
/// host in place to be processed as a plain element.
pub(crate) fn instantiate(
    context: &Rc<Context>,
    host: NodeId,
    parent_hub: &Rc<Hub>,
    chains: &Chains,
) -> Option<Instance> {
    let document = &context.document;
    let component_type = document.tag_name(host)?;
    let template = context.template(&component_type)?;
    let Some(parent) = document.parent(host) else {
        log::debug!("[component] host {host} of '{component_type}' is detached");
        return None;
    };

    let fragment = document.parse_fragment(&template);
    let wrapper = document
        .children(fragment)
        .into_iter()
        .find(|node| document.tag_name(*node).as_deref() == Some("component"));
    let Some(root) = wrapper.and_then(|wrapper| document.children(wrapper).into_iter().next()) else {
        log::error!(
            "[rable] {}",
            ComponentError::MissingRoot {
                component: component_type
            }
        );
        return None;
    };
    let identifier = format!("component-{}", Ulid::new().to_string().to_lowercase());

    let state = State::component(parent_hub.current_state());
    let scheduler = Rc::new(Scheduler::for_component());
    let hub = Hub::component(Rc::clone(&state) as Rc<dyn Scope>, Rc::clone(&scheduler));
    state.attach_hub(&hub);

    let mut events: IndexMap<String, Vec<Rc<Program>>> = IndexMap::new();
    let mut seeded = HashSet::new();
    for found in directive::directives(document, host) {
        match found.action.as_str() {
            "on" | "event" => match found.argument(0) {
                Some(name) if !found.value.is_empty() => {
                    if let Some(program) = context.compile(&found.value, &found.attribute) {
                        events.entry(name.to_string()).or_default().push(program);
                    }
                }
                _ => log::debug!("[component] ignoring {} on '{component_type}'", found.attribute),
            },
            "bind" => match found.argument(0) {
                Some(origin) => {
                    let child = if found.value.is_empty() {
                        origin
                    } else {
                        found.value.as_str()
                    };
                    state.bind(child, origin);
                }
                None => log::error!("[rable] No binder origin defined! ({})", found.attribute),
            },
            "data" => match found.argument(0) {
                Some(_) if found.value.is_empty() => {
                    log::debug!("[component] empty seed {} skipped", found.attribute);
                }
                Some(key) => {
                    let path = Path::parse(key);
                    if let Some(head) = path.head() {
                        seeded.insert(head.to_string());
                    }
                    state.write(&path, found.value.as_str().into());
                }
                None => log::error!("[rable] No data key defined! ({})", found.attribute),
            },
            "if" | "elseif" | "else-if" | "else" => chains.add(context, &found, root),
            _ => log::trace!("[component] host attribute {} dropped", found.attribute),
        }
    }

    import_data(context, fragment, &component_type, &state, &seeded);
    forward_binders(parent_hub, &state, &hub);
    handle_events(context, parent_hub, &hub, &scheduler, &state, events);

    let stylesheet = document
        .children(fragment)
        .into_iter()
        .find(|node| document.tag_name(*node).as_deref() == Some("style"));
    if let Some(stylesheet) = stylesheet {
        let css = document.inner_text(stylesheet);
        context.styles.inject(document, &component_type, &css, root);
    }

    document.set_attribute(root, "component-identifier", &identifier);
    document.set_attribute(root, "component-type", &component_type);
    document.replace_child(parent, root, host);
    log::debug!("[component] {identifier} of '{component_type}' replaced {host}");

    let instance = Instance {
        component_type,
        root,
        state,
        hub,
    };
    context
        .instances
        .borrow_mut()
        .insert(identifier, instance.clone());
    Some(instance)
}

/// Seed the instance from the template's `<data>` block. Host seeds win.
fn import_data(
    context: &Context,
    fragment: NodeId,
    component_type: &str,
    state: &State,
    seeded: &HashSet<String>,
) {
    let document = &context.document;
    let block = document
        .children(fragment)
        .into_iter()
        .find(|node| document.tag_name(*node).as_deref() == Some("data"));
    let Some(block) = block else {
        state.finish_import();
        return;
    };
    let source = document.inner_text(block);
    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&source) {
        Ok(data) => {
            for (key, value) in data {
                if !seeded.contains(&key) {
                    state.write(&Path::parse(&key), Value::from(value));
                }
            }
            state.finish_import();
        }
        Err(error) => log::error!(
            "[rable] {}",
            ComponentError::InvalidData {
                component: component_type.to_string(),
                error,
            }
        ),
    }
}

/// Parent changes under a bound path reach the component's listeners under
/// the child's name.
fn forward_binders(parent_hub: &Hub, state: &Rc<State>, hub: &Rc<Hub>) {
    let state = Rc::downgrade(state);
    let hub = Rc::downgrade(hub);
    parent_hub.subscribe(move |hint| {
        let (Some(state), Some(hub)) = (state.upgrade(), hub.upgrade()) else {
            return;
        };
        let Some(hint) = hint else {
            hub.publish(None);
            return;
        };
        for (child, parent_path) in state.binders() {
            if parent_path.head() == Some(hint) {
                hub.publish(Some(child.as_str()));
            }
        }
    });
}

/// Component events run the host's `on:<name>` bodies in the parent scope
/// once the instance reaches its `event` stage.
fn handle_events(
    context: &Rc<Context>,
    parent_hub: &Rc<Hub>,
    hub: &Hub,
    scheduler: &Rc<Scheduler>,
    state: &Rc<State>,
    events: IndexMap<String, Vec<Rc<Program>>>,
) {
    let context = Rc::clone(context);
    let parent_hub = Rc::clone(parent_hub);
    let scheduler = Rc::downgrade(scheduler);
    let state = Rc::downgrade(state);
    hub.set_component_event_handler(move |name, payload| {
        let Some(programs) = events.get(name).cloned() else {
            log::trace!("[component] no host handler for '{name}'");
            return;
        };
        let (Some(scheduler), Some(state)) = (scheduler.upgrade(), state.upgrade()) else {
            return;
        };
        let context = Rc::clone(&context);
        let parent_hub = Rc::clone(&parent_hub);
        scheduler.schedule("event", move || {
            for program in programs {
                let result = context
                    .environment(&parent_hub)
                    .with_local("event", Local::Value(payload.clone()))
                    .with_local("componentData", Local::Scope(Rc::clone(&state) as Rc<dyn Scope>))
                    .evaluate(&program);
                if let Err(error) = result {
                    log::error!("[rable] {}: {error}", program.source);
                }
            }
        });
    });
}

/// Render the instance's text and open its hub for changes.
pub(crate) fn finish(context: &Rc<Context>, instance: &Instance) {
    crate::text::process(context, instance.root, &instance.hub);
    context.marks.skip_text(instance.root);
    instance.hub.mark_ready();
    instance.hub.publish(None);
}
