use std::rc::Rc;

use crate::path::{self, Path};
use crate::value::{Map, Value};

/// Readable and writable view of a scope's data.
///
/// Implemented by [`crate::State`] and by [`LoopScope`], the per-entry overlay
/// loop clones evaluate against.
pub trait Scope {
    fn get(&self, path: &Path) -> Value;

    /// Returns false when nothing was written.
    fn set(&self, path: &Path, value: Value) -> bool;

    /// Top-level names visible in this scope, in insertion order.
    fn names(&self) -> Vec<String>;

    fn contains(&self, name: &str) -> bool {
        self.names().iter().any(|existing| existing == name)
    }

    /// Every top-level name with its current value.
    fn snapshot(&self) -> Value {
        Value::Map(
            self.names()
                .into_iter()
                .map(|name| {
                    let value = self.get(&Path::from_segments([name.as_str()]));
                    (name, value)
                })
                .collect::<Map>(),
        )
    }
}

/// Scope of one loop clone: the value name reads and writes through to the
/// iterated entry, the key name is read-only, everything else falls through
/// to the enclosing scope.
pub struct LoopScope {
    base: Rc<dyn Scope>,
    entry: Path,
    value_name: String,
    key: Option<(String, Value)>,
}

impl LoopScope {
    pub fn new(
        base: Rc<dyn Scope>,
        target: &Path,
        entry_key: &str,
        value_name: &str,
        key: Option<(String, Value)>,
    ) -> Self {
        Self {
            base,
            entry: target.child(entry_key),
            value_name: value_name.to_string(),
            key,
        }
    }

    fn key_name(&self) -> Option<&str> {
        self.key.as_ref().map(|(name, _)| name.as_str())
    }
}

impl Scope for LoopScope {
    fn get(&self, path: &Path) -> Value {
        match path.head() {
            Some(head) if head == self.value_name => self.base.get(&self.entry.join(&path.tail())),
            Some(head) if Some(head) == self.key_name() => {
                let key = self.key.as_ref().map(|(_, key)| key.clone()).unwrap_or_default();
                path::get(&key, &path.tail())
            }
            _ => self.base.get(path),
        }
    }

    fn set(&self, path: &Path, value: Value) -> bool {
        match path.head() {
            Some(head) if head == self.value_name => {
                self.base.set(&self.entry.join(&path.tail()), value)
            }
            Some(head) if Some(head) == self.key_name() => {
                log::error!("[rable] loop key '{head}' is read-only");
                false
            }
            _ => self.base.set(path, value),
        }
    }

    fn names(&self) -> Vec<String> {
        let mut names = self.base.names();
        for name in [Some(self.value_name.as_str()), self.key_name()].into_iter().flatten() {
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::State;

    #[test]
    fn loop_scope_redirects_value_name_to_entry() {
        let state = State::detached();
        state.write(
            &"items".into(),
            Value::from(serde_json::json!({ "a": { "done": false }, "b": { "done": true } })),
        );
        let overlay = LoopScope::new(
            state.clone(),
            &"items".into(),
            "a",
            "item",
            Some(("key".to_string(), "a".into())),
        );
        assert_eq!(overlay.get(&"item.done".into()), Value::from(false));
        assert_eq!(overlay.get(&"key".into()), Value::from("a"));
        assert!(overlay.set(&"item.done".into(), true.into()));
        assert_eq!(state.read(&"items.a.done".into()), Value::from(true));
        assert!(!overlay.set(&"key".into(), "z".into()));
        assert!(overlay.contains("item"));
        assert!(overlay.contains("items"));
        let snapshot = overlay.snapshot();
        assert_eq!(path::get(&snapshot, &"item.done".into()), Value::from(true));
    }
}
