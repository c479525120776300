//! Globals and methods expressions are allowed to call.
//!
//! Nothing outside this module, the functions stored in state and the
//! functions registered on the application is reachable from an expression.

use std::cell::RefCell;

use indexmap::IndexMap;

use crate::error::EvalError;
use crate::value::{Function, Invocation, Map, Value, format_number};

/// Functions registered by the embedding application.
#[derive(Default)]
pub struct Globals {
    functions: RefCell<IndexMap<String, Function>>,
}

impl Globals {
    pub fn register(&self, name: &str, function: Function) {
        self.functions.borrow_mut().insert(name.to_string(), function);
    }

    pub fn get(&self, name: &str) -> Option<Function> {
        self.functions.borrow().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.functions.borrow().keys().cloned().collect()
    }
}

fn native(
    name: &str,
    body: impl Fn(&Invocation) -> Result<Value, EvalError> + 'static,
) -> Value {
    Value::Function(Function::new(name, body))
}

fn namespace(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect::<Map>(),
    )
}

fn numbers(invocation: &Invocation) -> impl Iterator<Item = f64> + '_ {
    invocation.arguments.iter().map(Value::to_number)
}

/// Builtin global bound to `name`, if any.
pub fn global(name: &str) -> Option<Value> {
    let value = match name {
        "NaN" => Value::Number(f64::NAN),
        "Infinity" => Value::Number(f64::INFINITY),
        "String" => native("String", |invocation| {
            Ok(invocation
                .arguments
                .first()
                .map_or(String::new(), Value::to_script_string)
                .into())
        }),
        "Number" => native("Number", |invocation| {
            Ok(invocation.arguments.first().map_or(0.0, Value::to_number).into())
        }),
        "Boolean" => native("Boolean", |invocation| {
            Ok(invocation.argument(0).is_truthy().into())
        }),
        "parseInt" => native("parseInt", |invocation| {
            let radix = match invocation.argument(1) {
                Value::Undefined => 10,
                radix => radix.to_number() as u32,
            };
            Ok(parse_int(&invocation.argument(0).to_script_string(), radix).into())
        }),
        "parseFloat" => native("parseFloat", |invocation| {
            Ok(parse_float(&invocation.argument(0).to_script_string()).into())
        }),
        "isNaN" => native("isNaN", |invocation| {
            Ok(invocation.argument(0).to_number().is_nan().into())
        }),
        "Math" => namespace(vec![
            ("PI", std::f64::consts::PI.into()),
            ("floor", native("floor", |invocation| Ok(invocation.argument(0).to_number().floor().into()))),
            ("ceil", native("ceil", |invocation| Ok(invocation.argument(0).to_number().ceil().into()))),
            ("round", native("round", |invocation| {
                Ok((invocation.argument(0).to_number() + 0.5).floor().into())
            })),
            ("abs", native("abs", |invocation| Ok(invocation.argument(0).to_number().abs().into()))),
            ("sqrt", native("sqrt", |invocation| Ok(invocation.argument(0).to_number().sqrt().into()))),
            ("pow", native("pow", |invocation| {
                let base = invocation.argument(0).to_number();
                Ok(base.powf(invocation.argument(1).to_number()).into())
            })),
            ("min", native("min", |invocation| {
                Ok(numbers(invocation)
                    .fold(f64::INFINITY, |min, number| if number.is_nan() || min.is_nan() { f64::NAN } else { min.min(number) })
                    .into())
            })),
            ("max", native("max", |invocation| {
                Ok(numbers(invocation)
                    .fold(f64::NEG_INFINITY, |max, number| if number.is_nan() || max.is_nan() { f64::NAN } else { max.max(number) })
                    .into())
            })),
        ]),
        "Object" => namespace(vec![
            ("keys", native("keys", |invocation| Ok(keys(&invocation.argument(0))?.into()))),
            ("values", native("values", |invocation| {
                let value = invocation.argument(0);
                Ok(match value {
                    Value::Map(map) => map.into_values().collect::<Vec<_>>().into(),
                    Value::List(items) => items.into(),
                    Value::String(string) => string.chars().map(|c| Value::from(c.to_string())).collect::<Vec<_>>().into(),
                    Value::Undefined | Value::Null => {
                        return Err(EvalError::Type("Cannot convert undefined or null to object".to_string()));
                    }
                    _ => Vec::new().into(),
                })
            })),
        ]),
        "JSON" => namespace(vec![
            ("stringify", native("stringify", |invocation| {
                let value = invocation.argument(0);
                if matches!(value, Value::Undefined | Value::Function(_)) {
                    return Ok(Value::Undefined);
                }
                serde_json::to_string(&value)
                    .map(Value::from)
                    .map_err(|error| EvalError::Native(error.to_string()))
            })),
            ("parse", native("parse", |invocation| {
                let text = invocation.argument(0).to_script_string();
                serde_json::from_str::<serde_json::Value>(&text)
                    .map(Value::from)
                    .map_err(|error| EvalError::Native(format!("SyntaxError: {error}")))
            })),
        ]),
        "console" => namespace(vec![
            ("log", native("log", |invocation| {
                let line = invocation
                    .arguments
                    .iter()
                    .map(Value::to_script_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                log::info!("[console] {line}");
                Ok(Value::Undefined)
            })),
        ]),
        _ => return None,
    };
    Some(value)
}

fn keys(value: &Value) -> Result<Vec<Value>, EvalError> {
    Ok(match value {
        Value::Map(map) => map.keys().map(|key| Value::from(key.as_str())).collect(),
        Value::List(items) => (0..items.len()).map(|index| Value::from(index.to_string())).collect(),
        Value::String(string) => (0..string.chars().count()).map(|index| Value::from(index.to_string())).collect(),
        Value::Undefined | Value::Null => {
            return Err(EvalError::Type("Cannot convert undefined or null to object".to_string()));
        }
        _ => Vec::new(),
    })
}

/// Leading integer of `text` in `radix`, `NaN` when there is none.
pub fn parse_int(text: &str, radix: u32) -> f64 {
    let trimmed = text.trim_start();
    let (sign, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (radix, digits) = match radix {
        0 | 16 if unsigned.starts_with("0x") || unsigned.starts_with("0X") => (16, &unsigned[2..]),
        0 => (10, unsigned),
        radix if (2..=36).contains(&radix) => (radix, unsigned),
        _ => return f64::NAN,
    };
    let mut result: Option<f64> = None;
    for character in digits.chars() {
        match character.to_digit(radix) {
            Some(digit) => result = Some(result.unwrap_or(0.0) * f64::from(radix) + f64::from(digit)),
            None => break,
        }
    }
    result.map_or(f64::NAN, |number| sign * number)
}

/// Leading decimal number of `text`, `NaN` when there is none.
pub fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    if trimmed.starts_with("Infinity") || trimmed.starts_with("+Infinity") {
        return f64::INFINITY;
    }
    if trimmed.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exponent = false;
    let bytes = trimmed.as_bytes();
    while end < bytes.len() {
        let byte = bytes[end];
        let accepted = match byte {
            b'0'..=b'9' => {
                seen_digit = true;
                true
            }
            b'+' | b'-' => end == 0 || matches!(bytes[end - 1], b'e' | b'E'),
            b'.' if !seen_dot && !seen_exponent => {
                seen_dot = true;
                true
            }
            b'e' | b'E' if seen_digit && !seen_exponent => {
                seen_exponent = true;
                true
            }
            _ => false,
        };
        if !accepted {
            break;
        }
        end += 1;
    }
    let mut candidate = &trimmed[..end];
    while !candidate.is_empty() {
        if let Ok(number) = candidate.parse::<f64>() {
            return number;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    f64::NAN
}

fn char_index(length: usize, index: f64) -> usize {
    if index.is_nan() {
        return 0;
    }
    let index = index.trunc();
    if index < 0.0 {
        (length as f64 + index).max(0.0) as usize
    } else {
        (index as usize).min(length)
    }
}

fn slice_bounds(length: usize, start: &Value, end: &Value) -> (usize, usize) {
    let start = char_index(length, start.to_number());
    let end = match end {
        Value::Undefined => length,
        end => char_index(length, end.to_number()),
    };
    (start, end.max(start))
}

fn substring(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Methods that change the list they are called on.
pub const MUTATING_LIST_METHODS: &[&str] = &["push", "pop", "shift", "unshift", "reverse", "sort", "splice"];

/// Apply a mutating list method to `items` in place.
pub fn mutate_list(items: &mut Vec<Value>, method: &str, arguments: Vec<Value>) -> Result<Value, EvalError> {
    match method {
        "push" => {
            items.extend(arguments);
            Ok(items.len().into())
        }
        "pop" => Ok(items.pop().unwrap_or_default()),
        "shift" => Ok(if items.is_empty() { Value::Undefined } else { items.remove(0) }),
        "unshift" => {
            for (index, argument) in arguments.into_iter().enumerate() {
                items.insert(index, argument);
            }
            Ok(items.len().into())
        }
        "reverse" => {
            items.reverse();
            Ok(items.clone().into())
        }
        "sort" => {
            items.sort_by(|a, b| {
                match (a, b) {
                    (Value::Undefined, Value::Undefined) => std::cmp::Ordering::Equal,
                    (Value::Undefined, _) => std::cmp::Ordering::Greater,
                    (_, Value::Undefined) => std::cmp::Ordering::Less,
                    _ => a.to_script_string().cmp(&b.to_script_string()),
                }
            });
            Ok(items.clone().into())
        }
        "splice" => {
            let length = items.len();
            let start = char_index(length, arguments.first().map_or(0.0, Value::to_number));
            let count = match arguments.get(1) {
                None => length - start,
                Some(count) => {
                    let count = count.to_number();
                    if count.is_nan() || count < 0.0 { 0 } else { (count as usize).min(length - start) }
                }
            };
            let inserted: Vec<Value> = arguments.into_iter().skip(2).collect();
            let removed: Vec<Value> = items.splice(start..start + count, inserted).collect();
            Ok(removed.into())
        }
        _ => Err(EvalError::Type(format!("{method} is not a list method"))),
    }
}

/// Call a non-mutating method on a value.
pub fn call_method(receiver: &Value, method: &str, arguments: Vec<Value>) -> Result<Value, EvalError> {
    let argument = |index: usize| arguments.get(index).cloned().unwrap_or_default();
    let not_a_function = || {
        EvalError::Type(format!(
            "{}.{method} is not a function",
            receiver.type_name()
        ))
    };
    match receiver {
        Value::String(text) => {
            let length = text.chars().count();
            let search = argument(0).to_script_string();
            Ok(match method {
                "toUpperCase" => text.to_uppercase().into(),
                "toLowerCase" => text.to_lowercase().into(),
                "trim" => text.trim().into(),
                "trimStart" => text.trim_start().into(),
                "trimEnd" => text.trim_end().into(),
                "includes" => text.contains(search.as_str()).into(),
                "startsWith" => text.starts_with(search.as_str()).into(),
                "endsWith" => text.ends_with(search.as_str()).into(),
                "indexOf" => text
                    .find(search.as_str())
                    .map_or(-1.0, |byte| text[..byte].chars().count() as f64)
                    .into(),
                "slice" => {
                    let (start, end) = slice_bounds(length, &argument(0), &argument(1));
                    substring(text, start, end).into()
                }
                "substring" => {
                    let clamp = |value: Value| {
                        let number = value.to_number();
                        if number.is_nan() || number < 0.0 { 0 } else { (number as usize).min(length) }
                    };
                    let start = clamp(argument(0));
                    let end = match argument(1) {
                        Value::Undefined => length,
                        end => clamp(end),
                    };
                    substring(text, start.min(end), start.max(end)).into()
                }
                "charAt" => {
                    let index = argument(0).to_number();
                    let index = if index.is_nan() { 0.0 } else { index.trunc() };
                    if index < 0.0 {
                        String::new().into()
                    } else {
                        text.chars().nth(index as usize).map(String::from).unwrap_or_default().into()
                    }
                }
                "at" => {
                    let index = char_index(length, argument(0).to_number());
                    text.chars().nth(index).map_or(Value::Undefined, |c| c.to_string().into())
                }
                "split" => match argument(0) {
                    Value::Undefined => vec![Value::from(text.as_str())].into(),
                    _ if search.is_empty() => text.chars().map(|c| Value::from(c.to_string())).collect::<Vec<_>>().into(),
                    _ => text.split(search.as_str()).map(Value::from).collect::<Vec<_>>().into(),
                },
                "replace" => text.replacen(search.as_str(), &argument(1).to_script_string(), 1).into(),
                "replaceAll" => text.replace(search.as_str(), &argument(1).to_script_string()).into(),
                "padStart" | "padEnd" => {
                    let target = argument(0).to_number();
                    let fill = match argument(1) {
                        Value::Undefined => " ".to_string(),
                        fill => fill.to_script_string(),
                    };
                    let missing = if target.is_nan() { 0 } else { (target as usize).saturating_sub(length) };
                    if missing == 0 || fill.is_empty() {
                        text.clone().into()
                    } else {
                        let padding: String = fill.chars().cycle().take(missing).collect();
                        let padded = if method == "padStart" {
                            format!("{padding}{text}")
                        } else {
                            format!("{text}{padding}")
                        };
                        padded.into()
                    }
                }
                "repeat" => {
                    let count = argument(0).to_number();
                    if count < 0.0 || count.is_infinite() {
                        return Err(EvalError::Native("RangeError: Invalid count value".to_string()));
                    }
                    text.repeat(if count.is_nan() { 0 } else { count as usize }).into()
                }
                "concat" => {
                    let mut output = text.clone();
                    for argument in &arguments {
                        output.push_str(&argument.to_script_string());
                    }
                    output.into()
                }
                "toString" | "valueOf" => text.clone().into(),
                _ => return Err(not_a_function()),
            })
        }
        Value::List(items) => {
            let length = items.len();
            Ok(match method {
                "includes" => {
                    let needle = argument(0);
                    let is_nan = |value: &Value| matches!(value, Value::Number(number) if number.is_nan());
                    items
                        .iter()
                        .any(|item| item.strict_equals(&needle) || (is_nan(item) && is_nan(&needle)))
                        .into()
                }
                "indexOf" => {
                    let needle = argument(0);
                    items
                        .iter()
                        .position(|item| item.strict_equals(&needle))
                        .map_or(-1.0, |index| index as f64)
                        .into()
                }
                "join" => {
                    let separator = match argument(0) {
                        Value::Undefined => ",".to_string(),
                        separator => separator.to_script_string(),
                    };
                    items
                        .iter()
                        .map(|item| if item.is_nullish() { String::new() } else { item.to_script_string() })
                        .collect::<Vec<_>>()
                        .join(&separator)
                        .into()
                }
                "slice" => {
                    let (start, end) = slice_bounds(length, &argument(0), &argument(1));
                    items[start..end].to_vec().into()
                }
                "concat" => {
                    let mut output = items.clone();
                    for argument in arguments.iter().cloned() {
                        match argument {
                            Value::List(more) => output.extend(more),
                            other => output.push(other),
                        }
                    }
                    output.into()
                }
                "at" => {
                    let index = argument(0).to_number();
                    let index = if index < 0.0 { length as f64 + index.trunc() } else { index.trunc() };
                    if index < 0.0 || index.is_nan() { Value::Undefined } else { items.get(index as usize).cloned().unwrap_or_default() }
                }
                "toString" => receiver.to_string().into(),
                method if MUTATING_LIST_METHODS.contains(&method) => {
                    let mut copy = items.clone();
                    return mutate_list(&mut copy, method, arguments);
                }
                _ => return Err(not_a_function()),
            })
        }
        Value::Number(number) => Ok(match method {
            "toFixed" => {
                let digits = argument(0).to_number();
                let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
                let fixed = if number.is_finite() {
                    format!("{number:.digits$}")
                } else {
                    format_number(*number)
                };
                fixed.into()
            }
            "toString" | "valueOf" => format_number(*number).into(),
            _ => return Err(not_a_function()),
        }),
        Value::Bool(value) => match method {
            "toString" | "valueOf" => Ok(value.to_string().into()),
            _ => Err(not_a_function()),
        },
        Value::Map(map) => match method {
            "hasOwnProperty" => Ok(map.contains_key(&argument(0).to_script_string()).into()),
            "toString" => Ok(receiver.to_string().into()),
            _ => Err(not_a_function()),
        },
        Value::Undefined | Value::Null => Err(EvalError::Type(format!(
            "Cannot read properties of {} (reading '{method}')",
            receiver.to_script_string()
        ))),
        Value::Function(_) => Err(not_a_function()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_global(name: &str, arguments: Vec<Value>) -> Value {
        let Some(Value::Function(function)) = global(name) else {
            panic!("{name} is not a global function");
        };
        function.call(arguments).unwrap()
    }

    fn call_namespace(namespace: &str, name: &str, arguments: Vec<Value>) -> Value {
        let Some(Value::Map(map)) = global(namespace) else {
            panic!("{namespace} is not a namespace");
        };
        let Some(Value::Function(function)) = map.get(name).cloned() else {
            panic!("{namespace}.{name} is missing");
        };
        function.call(arguments).unwrap()
    }

    #[test]
    fn conversions() {
        assert_eq!(call_global("String", vec![Value::Undefined]), Value::from("undefined"));
        assert_eq!(call_global("Number", vec!["12".into()]), Value::from(12));
        assert_eq!(call_global("Boolean", vec!["".into()]), Value::from(false));
        assert_eq!(call_global("parseInt", vec!["42px".into()]), Value::from(42));
        assert_eq!(call_global("parseInt", vec!["ff".into(), 16.into()]), Value::from(255));
        assert_eq!(call_global("parseFloat", vec!["3.4.1".into()]), Value::from(3.4));
        assert_eq!(call_global("isNaN", vec!["abc".into()]), Value::from(true));
        assert!(call_global("parseInt", vec!["px".into()]).to_number().is_nan());
    }

    #[test]
    fn math_and_json() {
        assert_eq!(call_namespace("Math", "round", vec![2.5.into()]), Value::from(3));
        assert_eq!(call_namespace("Math", "round", vec![(-2.5).into()]), Value::from(-2));
        assert_eq!(call_namespace("Math", "max", vec![1.into(), 7.into(), 3.into()]), Value::from(7));
        assert_eq!(call_namespace("Math", "min", Vec::new()), Value::from(f64::INFINITY));
        let list = Value::List(vec![1.into(), "a".into()]);
        assert_eq!(call_namespace("JSON", "stringify", vec![list]), Value::from(r#"[1,"a"]"#));
        assert_eq!(
            call_namespace("Object", "keys", vec![Value::from(serde_json::json!({"x": 1, "y": 2}))]),
            Value::List(vec!["x".into(), "y".into()])
        );
    }

    #[test]
    fn string_methods() {
        let text = Value::from("Motion Control");
        assert_eq!(call_method(&text, "toLowerCase", vec![]).unwrap(), Value::from("motion control"));
        assert_eq!(call_method(&text, "slice", vec![(-7).into()]).unwrap(), Value::from("Control"));
        assert_eq!(call_method(&text, "indexOf", vec!["Control".into()]).unwrap(), Value::from(7));
        assert_eq!(
            call_method(&"a_b_c".into(), "split", vec!["_".into()]).unwrap(),
            Value::List(vec!["a".into(), "b".into(), "c".into()])
        );
        assert_eq!(
            call_method(&"V{{VERSION}}/{{VERSION}}".into(), "replaceAll", vec!["{{VERSION}}".into(), "3.1".into()]).unwrap(),
            Value::from("V3.1/3.1")
        );
        assert_eq!(call_method(&"5".into(), "padStart", vec![3.into(), "0".into()]).unwrap(), Value::from("005"));
        assert!(call_method(&text, "explode", vec![]).is_err());
    }

    #[test]
    fn list_methods_do_not_touch_the_receiver() {
        let list = Value::List(vec![1.into(), 2.into(), 3.into()]);
        assert_eq!(call_method(&list, "join", vec!["-".into()]).unwrap(), Value::from("1-2-3"));
        assert_eq!(call_method(&list, "includes", vec![2.into()]).unwrap(), Value::from(true));
        assert_eq!(call_method(&list, "push", vec![4.into()]).unwrap(), Value::from(4));
        assert_eq!(list, Value::List(vec![1.into(), 2.into(), 3.into()]));
    }

    #[test]
    fn mutating_list_methods() {
        let mut items = vec![Value::from(1), Value::from(2), Value::from(3)];
        assert_eq!(mutate_list(&mut items, "push", vec![4.into()]).unwrap(), Value::from(4));
        assert_eq!(mutate_list(&mut items, "shift", vec![]).unwrap(), Value::from(1));
        assert_eq!(
            mutate_list(&mut items, "splice", vec![1.into(), 1.into(), "x".into()]).unwrap(),
            Value::List(vec![3.into()])
        );
        assert_eq!(items, vec![Value::from(2), "x".into(), 4.into()]);
    }

    #[test]
    fn number_methods() {
        assert_eq!(call_method(&3.14159.into(), "toFixed", vec![2.into()]).unwrap(), Value::from("3.14"));
        assert!(call_method(&Value::Null, "toString", vec![]).is_err());
    }
}
