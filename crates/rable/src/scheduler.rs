use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

pub type Validator = Rc<dyn Fn() -> bool>;
pub type Task = Box<dyn FnOnce()>;

/// Stages of a component scheduler, in order.
pub const COMPONENT_STAGES: [&str; 3] = ["dom-synced", "bind", "event"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    Ran,
    Queued,
    /// The stage is not part of the order.
    Rejected,
}

/// Gates deferred tasks behind the validators of every earlier stage.
pub struct Scheduler {
    order: Vec<String>,
    validators: RefCell<IndexMap<String, Vec<Validator>>>,
    scheduled: RefCell<IndexMap<String, Vec<Task>>>,
}

impl Scheduler {
    pub fn new<S: Into<String>>(order: impl IntoIterator<Item = S>) -> Self {
        Self {
            order: order.into_iter().map(Into::into).collect(),
            validators: RefCell::new(IndexMap::new()),
            scheduled: RefCell::new(IndexMap::new()),
        }
    }

    pub fn for_component() -> Self {
        Self::new(COMPONENT_STAGES)
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    fn knows(&self, stage: &str) -> bool {
        self.order.iter().any(|known| known == stage)
    }

    /// Unknown stages are ignored.
    pub fn register_validator(&self, stage: &str, validator: impl Fn() -> bool + 'static) {
        if !self.knows(stage) {
            log::debug!("[scheduler] ignoring validator for unknown stage '{stage}'");
            return;
        }
        self.validators
            .borrow_mut()
            .entry(stage.to_string())
            .or_default()
            .push(Rc::new(validator));
    }

    /// True when every validator of every stage before `stage` holds right now.
    pub fn ready_for(&self, stage: &str) -> bool {
        for current in &self.order {
            if current == stage {
                return true;
            }
            let validators = self
                .validators
                .borrow()
                .get(current)
                .cloned()
                .unwrap_or_default();
            if !validators.iter().all(|validator| validator()) {
                return false;
            }
        }
        false
    }

    pub fn schedule(&self, stage: &str, task: impl FnOnce() + 'static) -> Scheduled {
        if !self.knows(stage) {
            log::debug!("[scheduler] rejecting task for unknown stage '{stage}'");
            return Scheduled::Rejected;
        }
        if self.ready_for(stage) {
            task();
            Scheduled::Ran
        } else {
            self.scheduled
                .borrow_mut()
                .entry(stage.to_string())
                .or_default()
                .push(Box::new(task));
            Scheduled::Queued
        }
    }

    pub fn pending(&self, stage: &str) -> usize {
        self.scheduled.borrow().get(stage).map_or(0, Vec::len)
    }

    /// Drain the queue of every stage that is ready now. Only tasks queued
    /// before the sweep started are run by it.
    pub fn trigger_tasks(&self) {
        let queued: Vec<(String, usize)> = self
            .scheduled
            .borrow()
            .iter()
            .filter(|(_, tasks)| !tasks.is_empty())
            .map(|(stage, tasks)| (stage.clone(), tasks.len()))
            .collect();
        for (stage, count) in queued {
            if !self.ready_for(&stage) {
                continue;
            }
            let tasks: Vec<Task> = {
                let mut scheduled = self.scheduled.borrow_mut();
                let Some(tasks) = scheduled.get_mut(&stage) else {
                    continue;
                };
                let count = count.min(tasks.len());
                tasks.drain(..count).collect()
            };
            log::trace!("[scheduler] running {} task(s) of stage '{stage}'", tasks.len());
            for task in tasks {
                task();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn flag() -> Rc<Cell<bool>> {
        Rc::new(Cell::new(false))
    }

    #[test]
    fn ready_for_checks_only_earlier_stages() {
        let scheduler = Scheduler::for_component();
        let synced = flag();
        let gate = Rc::clone(&synced);
        scheduler.register_validator("dom-synced", move || gate.get());

        assert!(scheduler.ready_for("dom-synced"));
        assert!(!scheduler.ready_for("bind"));
        assert!(!scheduler.ready_for("event"));
        assert!(!scheduler.ready_for("unknown"));
        synced.set(true);
        assert!(scheduler.ready_for("event"));
    }

    #[test]
    fn schedule_runs_synchronously_when_ready() {
        let scheduler = Scheduler::for_component();
        let ran = flag();
        let marker = Rc::clone(&ran);
        assert_eq!(scheduler.schedule("event", move || marker.set(true)), Scheduled::Ran);
        assert!(ran.get());
    }

    #[test]
    fn queued_task_waits_for_trigger_after_validators_hold() {
        let scheduler = Scheduler::for_component();
        let synced = flag();
        let gate = Rc::clone(&synced);
        scheduler.register_validator("dom-synced", move || gate.get());

        let ran = flag();
        let marker = Rc::clone(&ran);
        assert_eq!(scheduler.schedule("event", move || marker.set(true)), Scheduled::Queued);
        scheduler.trigger_tasks();
        assert!(!ran.get());

        synced.set(true);
        assert!(!ran.get());
        scheduler.trigger_tasks();
        assert!(ran.get());
        assert_eq!(scheduler.pending("event"), 0);
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let scheduler = Scheduler::new(["a", "b"]);
        assert_eq!(scheduler.schedule("c", || panic!("must not run")), Scheduled::Rejected);
        scheduler.register_validator("c", || false);
        assert!(scheduler.ready_for("b"));
    }

    #[test]
    fn tasks_queued_during_sweep_wait_for_next_sweep() {
        let scheduler = Rc::new(Scheduler::new(["a", "b"]));
        let open = flag();
        let gate = Rc::clone(&open);
        scheduler.register_validator("a", move || gate.get());

        let second = flag();
        let inner_scheduler = Rc::clone(&scheduler);
        let inner_gate = Rc::clone(&open);
        let marker = Rc::clone(&second);
        scheduler.schedule("b", move || {
            inner_gate.set(false);
            let marker = Rc::clone(&marker);
            inner_scheduler.schedule("b", move || marker.set(true));
            inner_gate.set(true);
        });

        open.set(true);
        scheduler.trigger_tasks();
        assert!(!second.get());
        assert_eq!(scheduler.pending("b"), 1);

        scheduler.trigger_tasks();
        assert!(second.get());
        assert_eq!(scheduler.pending("b"), 0);
    }
}
