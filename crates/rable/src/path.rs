use std::fmt;

use smallvec::SmallVec;

use crate::value::Value;

/// Dotted property path such as `app.location` or `items.0.title`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    segments: SmallVec<[String; 4]>,
}

impl Path {
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn from_segments<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Outermost segment, used as the change hint of a write.
    pub fn head(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Everything below the outermost segment.
    pub fn tail(&self) -> Self {
        Self {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn join(&self, other: &Self) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

/// Property of a single value: map keys, list indices and `length`.
pub fn property(value: &Value, key: &str) -> Value {
    match value {
        Value::Map(map) => map.get(key).cloned().unwrap_or_default(),
        Value::List(items) if key == "length" => items.len().into(),
        Value::List(items) => key
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index).cloned())
            .unwrap_or_default(),
        Value::String(string) if key == "length" => string.chars().count().into(),
        Value::String(string) => key
            .parse::<usize>()
            .ok()
            .and_then(|index| string.chars().nth(index))
            .map_or(Value::Undefined, |character| character.to_string().into()),
        _ => Value::Undefined,
    }
}

/// Walk `path` inside `value`. Walking through something that is not a
/// container yields `Null`; a missing key yields `Undefined`.
pub fn get(value: &Value, path: &Path) -> Value {
    let mut current = value.clone();
    for segment in path.segments() {
        current = match &current {
            Value::Map(_) | Value::List(_) | Value::String(_) => property(&current, segment),
            _ => Value::Null,
        };
    }
    current
}

fn child_mut<'a>(value: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    match value {
        Value::Map(map) => map.get_mut(key),
        Value::List(items) => key.parse::<usize>().ok().and_then(|index| items.get_mut(index)),
        _ => None,
    }
}

/// Assign `new` at `path` inside `value`. Returns false without writing when
/// the parent of the leaf is not a container.
pub fn set(value: &mut Value, path: &Path, new: Value) -> bool {
    let Some((leaf, parents)) = path.segments().split_last() else {
        *value = new;
        return true;
    };
    let mut current = value;
    for segment in parents {
        match child_mut(current, segment) {
            Some(child) => current = child,
            None => return false,
        }
    }
    match current {
        Value::Map(map) => {
            map.insert(leaf.clone(), new);
            true
        }
        Value::List(items) => match leaf.parse::<usize>() {
            Ok(index) => {
                if index >= items.len() {
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = new;
                true
            }
            Err(_) => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Map;

    fn sample() -> Value {
        let json = serde_json::json!({
            "app": { "location": "home", "tags": ["a", "b"] },
            "count": 1
        });
        Value::from(json)
    }

    #[test]
    fn parses_and_joins_segments() {
        let path = Path::parse("app.location");
        assert_eq!(path.head(), Some("app"));
        assert_eq!(path.tail(), Path::parse("location"));
        assert_eq!(Path::parse("a").join(&path).to_string(), "a.app.location");
        assert!(Path::parse("").is_empty());
    }

    #[test]
    fn get_walks_maps_and_lists() {
        let value = sample();
        assert_eq!(get(&value, &"app.location".into()), Value::from("home"));
        assert_eq!(get(&value, &"app.tags.1".into()), Value::from("b"));
        assert_eq!(get(&value, &"app.tags.length".into()), Value::from(2));
        assert_eq!(get(&value, &"app.missing".into()), Value::Undefined);
        assert_eq!(get(&value, &"count.deeper".into()), Value::Null);
        assert_eq!(get(&value, &"app.missing.deeper".into()), Value::Null);
    }

    #[test]
    fn set_assigns_leaf_inside_containers() {
        let mut value = sample();
        assert!(set(&mut value, &"app.location".into(), "about".into()));
        assert!(set(&mut value, &"app.tags.2".into(), "c".into()));
        assert!(set(&mut value, &"fresh".into(), true.into()));
        assert_eq!(get(&value, &"app.location".into()), Value::from("about"));
        assert_eq!(get(&value, &"app.tags.length".into()), Value::from(3));
        assert_eq!(get(&value, &"fresh".into()), Value::from(true));
    }

    #[test]
    fn set_refuses_non_container_parent() {
        let mut value = sample();
        let before = value.clone();
        assert!(!set(&mut value, &"count.deeper".into(), 2.into()));
        assert!(!set(&mut value, &"nothing.here".into(), 2.into()));
        assert_eq!(value, before);
        let mut scalar = Value::from(3);
        assert!(!set(&mut scalar, &"x".into(), 1.into()));
        assert_eq!(Value::Map(Map::new()).to_string(), "[object Object]");
    }
}
