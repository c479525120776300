use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Deserializer};

use crate::error::EvalError;
use crate::scope::Scope;

pub type Map = IndexMap<String, Value>;

/// Dynamic value stored in state and produced by expressions.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(Map),
    Function(Function),
}

/// Arguments and receiver handed to a native function.
pub struct Invocation {
    pub receiver: Option<Rc<dyn Scope>>,
    pub arguments: Vec<Value>,
}

impl Invocation {
    pub fn argument(&self, index: usize) -> Value {
        self.arguments.get(index).cloned().unwrap_or_default()
    }
}

type NativeBody = dyn Fn(&Invocation) -> Result<Value, EvalError>;

/// Native closure callable from expressions, optionally bound to the state
/// container it was written into.
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    body: Rc<NativeBody>,
    receiver: Option<Weak<dyn Scope>>,
}

impl Function {
    pub fn new(
        name: &str,
        body: impl Fn(&Invocation) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Rc::new(body),
            receiver: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same function with `this` set to `receiver`.
    pub fn bind(&self, receiver: Weak<dyn Scope>) -> Self {
        Self {
            name: Rc::clone(&self.name),
            body: Rc::clone(&self.body),
            receiver: Some(receiver),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.receiver.is_some()
    }

    pub fn call(&self, arguments: Vec<Value>) -> Result<Value, EvalError> {
        let invocation = Invocation {
            receiver: self.receiver.as_ref().and_then(Weak::upgrade),
            arguments,
        };
        (self.body)(&invocation)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[function {}]", self.name)
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Null | Self::List(_) | Self::Map(_) => "object",
            Self::Function(_) => "function",
        }
    }

    /// Objects and functions cannot be mirrored into form controls.
    pub fn is_object_or_function(&self) -> bool {
        matches!(self.type_name(), "object" | "function")
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(value) => *value,
            Self::Number(number) => *number != 0.0 && !number.is_nan(),
            Self::String(string) => !string.is_empty(),
            Self::List(_) | Self::Map(_) | Self::Function(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined | Self::Function(_) | Self::Map(_) => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(value) => f64::from(u8::from(*value)),
            Self::Number(number) => *number,
            Self::String(string) => parse_number(string),
            Self::List(items) => match items.as_slice() {
                [] => 0.0,
                [item] => parse_number(&item.to_string()),
                _ => f64::NAN,
            },
        }
    }

    /// String conversion used by concatenation and `String(..)`. Unlike
    /// [`Display`](fmt::Display), `undefined` is spelled out.
    pub fn to_script_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            other => other.to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(string) => Some(string),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.strict_equals(b))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| b.get(key).is_some_and(|other| value.strict_equals(other)))
            }
            (Self::Function(a), Self::Function(b)) => a == b,
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Self::Number(_), Self::String(_)) | (Self::String(_), Self::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Self::Bool(_), _) => Self::Number(self.to_number()).loose_equals(other),
            (_, Self::Bool(_)) => self.loose_equals(&Self::Number(other.to_number())),
            (Self::List(_) | Self::Map(_), Self::Number(_) | Self::String(_)) => {
                Self::String(self.to_string()).loose_equals(other)
            }
            (Self::Number(_) | Self::String(_), Self::List(_) | Self::Map(_)) => {
                self.loose_equals(&Self::String(other.to_string()))
            }
            _ => self.strict_equals(other),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Undefined | Self::Null | Self::Function(_) => serde_json::Value::Null,
            Self::Bool(value) => serde_json::Value::Bool(*value),
            Self::Number(number) if is_safe_integer(*number) => {
                serde_json::Value::Number((*number as i64).into())
            }
            Self::Number(number) => serde_json::Number::from_f64(*number)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(string) => serde_json::Value::String(string.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => serde_json::Value::Object(
                map.iter()
                    .filter(|(_, value)| !matches!(value, Self::Undefined | Self::Function(_)))
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Numeric conversion of a string: surrounding whitespace is ignored, the
/// empty string is zero and anything unparsable is `NaN`.
pub fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_or(f64::NAN, |number| number as f64);
    }
    let valid = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !valid {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

fn is_safe_integer(number: f64) -> bool {
    number.fract() == 0.0 && number.abs() < 9_007_199_254_740_992.0
}

pub fn format_number(number: f64) -> String {
    if number.is_nan() {
        "NaN".to_string()
    } else if number.is_infinite() {
        let sign = if number > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if number == 0.0 {
        "0".to_string()
    } else if number.fract() == 0.0 && number.abs() < 1e21 {
        format!("{}", number as i128)
    } else if number.abs() >= 1e21 {
        let formatted = format!("{number:e}");
        match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => formatted,
        }
    } else {
        format!("{number}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => Ok(()),
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(number) => write!(f, "{}", format_number(*number)),
            Self::String(string) => write!(f, "{string}"),
            Self::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ",")?;
                    }
                    if !item.is_nullish() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Self::Map(_) => write!(f, "[object Object]"),
            Self::Function(function) => write!(f, "[function {}]", function.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(number) => write!(f, "{}", format_number(*number)),
            Self::String(string) => write!(f, "{string:?}"),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Map(map) => f.debug_map().entries(map).finish(),
            Self::Function(function) => write!(f, "{function:?}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            _ => self.strict_equals(other),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Self::Number(number)
    }
}

impl From<i32> for Value {
    fn from(number: i32) -> Self {
        Self::Number(f64::from(number))
    }
}

impl From<usize> for Value {
    fn from(number: usize) -> Self {
        Self::Number(number as f64)
    }
}

impl From<&str> for Value {
    fn from(string: &str) -> Self {
        Self::String(string.to_string())
    }
}

impl From<String> for Value {
    fn from(string: String) -> Self {
        Self::String(string)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::Map(map)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Self::Function(function)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(value),
            serde_json::Value::Number(number) => Self::Number(number.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(string) => Self::String(string),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Undefined | Self::Null | Self::Function(_) => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Number(number) if number.is_finite() => {
                if is_safe_integer(*number) {
                    serializer.serialize_i64(*number as i64)
                } else {
                    serializer.serialize_f64(*number)
                }
            }
            Self::Number(_) => serializer.serialize_unit(),
            Self::String(string) => serializer.serialize_str(string),
            Self::List(items) => {
                let mut sequence = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    sequence.serialize_element(item)?;
                }
                sequence.end()
            }
            Self::Map(map) => {
                let entries = map
                    .iter()
                    .filter(|(_, value)| !matches!(value, Self::Undefined | Self::Function(_)));
                let mut output = serializer.serialize_map(None)?;
                for (key, value) in entries {
                    output.serialize_entry(key, value)?;
                }
                output.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}
