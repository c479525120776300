//! Tree-walking evaluation of compiled expressions against a scope.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::builtins::{self, Globals};
use crate::error::{CompileError, EvalError};
use crate::hub::Hub;
use crate::parser::{
    self, AssignOperator, BinaryOperator, Expression, Literal, Program, Spanned, UnaryOperator,
    UpdateOperator,
};
use crate::path::{self, Path};
use crate::scope::Scope;
use crate::value::{Map, Value, format_number};

/// Name bound only for one evaluation, such as `event` in handlers.
#[derive(Clone)]
pub enum Local {
    Value(Value),
    /// Live view of another scope; member writes go through to it.
    Scope(Rc<dyn Scope>),
}

/// Memoized compilation, keyed by expression source.
#[derive(Default)]
pub struct Programs {
    compiled: RefCell<HashMap<String, Result<Rc<Program>, CompileError>>>,
}

impl Programs {
    pub fn compile(&self, source: &str) -> Result<Rc<Program>, CompileError> {
        if let Some(compiled) = self.compiled.borrow().get(source) {
            return compiled.clone();
        }
        let compiled = parser::compile(source);
        self.compiled
            .borrow_mut()
            .insert(source.to_string(), compiled.clone());
        compiled
    }

    pub fn len(&self) -> usize {
        self.compiled.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything an expression can see.
///
/// Bare names resolve to locals first, then to state, then to registered
/// functions and builtins. `this` is the lexical scope.
pub struct Environment {
    state: Rc<dyn Scope>,
    this: Rc<dyn Scope>,
    locals: Vec<(String, Local)>,
    globals: Option<Rc<Globals>>,
}

impl Environment {
    pub fn new(state: Rc<dyn Scope>, this: Rc<dyn Scope>) -> Self {
        Self {
            state,
            this,
            locals: Vec::new(),
            globals: None,
        }
    }

    /// Environment of expressions wired under `hub`.
    pub fn for_hub(hub: &Hub) -> Self {
        Self::new(hub.current_state(), hub.current_lexical_scope())
    }

    pub fn with_globals(mut self, globals: Rc<Globals>) -> Self {
        self.globals = Some(globals);
        self
    }

    pub fn with_local(mut self, name: &str, local: Local) -> Self {
        self.locals.push((name.to_string(), local));
        self
    }

    pub fn local(&self, name: &str) -> Option<&Local> {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| local == name)
            .map(|(_, local)| local)
    }

    /// Value of the last statement, `undefined` for an empty program.
    pub fn evaluate(&mut self, program: &Program) -> Result<Value, EvalError> {
        let mut run = Run {
            environment: self,
            source: &program.source,
        };
        let mut result = Value::Undefined;
        for statement in &program.statements {
            result = run.evaluate(statement)?;
        }
        Ok(result)
    }

    pub fn run(&mut self, programs: &Programs, source: &str) -> Result<Value, EvalError> {
        let program = programs.compile(source)?;
        self.evaluate(&program)
    }
}

/// Storage location an expression refers to.
enum Place {
    State(Path),
    This(Path),
    Local(usize, Path),
}

struct Run<'environment, 'source> {
    environment: &'environment mut Environment,
    source: &'source str,
}

fn parent_of(path: &Path) -> Option<(Path, &str)> {
    let (leaf, parents) = path.segments().split_last()?;
    Some((Path::from_segments(parents.iter().map(String::as_str)), leaf.as_str()))
}

fn property_key(value: &Value) -> String {
    match value {
        Value::String(string) => string.clone(),
        Value::Number(number) => format_number(*number),
        other => other.to_script_string(),
    }
}

fn reading_error(container: &Value, key: &str) -> EvalError {
    EvalError::Type(format!(
        "Cannot read properties of {} (reading '{key}')",
        container.to_script_string()
    ))
}

impl Run<'_, '_> {
    fn text(&self, expression: &Spanned<Expression>) -> String {
        self.source
            .get(expression.span.start..expression.span.end)
            .unwrap_or("expression")
            .to_string()
    }

    fn local_index(&self, name: &str) -> Option<usize> {
        self.environment
            .locals
            .iter()
            .rposition(|(local, _)| local == name)
    }

    fn place_of(&mut self, expression: &Spanned<Expression>) -> Result<Option<Place>, EvalError> {
        Ok(match &expression.node {
            Expression::Identifier(name) => match self.local_index(name) {
                Some(index) => Some(Place::Local(index, Path::default())),
                None if self.environment.state.contains(name) => {
                    Some(Place::State(Path::from_segments([name.as_str()])))
                }
                None => None,
            },
            Expression::This => Some(Place::This(Path::default())),
            Expression::Member { object, property } => self
                .place_of(object)?
                .map(|place| child_place(place, property)),
            Expression::Index { object, index } => match self.place_of(object)? {
                Some(place) => {
                    let key = property_key(&self.evaluate(index)?);
                    Some(child_place(place, &key))
                }
                None => None,
            },
            _ => None,
        })
    }

    fn assignment_place(&mut self, target: &Spanned<Expression>) -> Result<Place, EvalError> {
        if let Some(place) = self.place_of(target)? {
            return Ok(place);
        }
        match &target.node {
            // Assigning an unknown name creates it in state.
            Expression::Identifier(name) => Ok(Place::State(Path::from_segments([name.as_str()]))),
            _ => Err(EvalError::InvalidTarget(self.text(target))),
        }
    }

    fn read_at(&self, place: &Place, path: &Path) -> Value {
        match place {
            Place::State(_) => self.environment.state.get(path),
            Place::This(_) if path.is_empty() => self.environment.this.snapshot(),
            Place::This(_) => self.environment.this.get(path),
            Place::Local(index, _) => match &self.environment.locals[*index].1 {
                Local::Value(value) => path::get(value, path),
                Local::Scope(scope) if path.is_empty() => scope.snapshot(),
                Local::Scope(scope) => scope.get(path),
            },
        }
    }

    fn read_place(&self, place: &Place) -> Result<Value, EvalError> {
        let path = match place {
            Place::State(path) | Place::This(path) | Place::Local(_, path) => path,
        };
        let minimum = if matches!(place, Place::State(_)) { 2 } else { 1 };
        if path.len() >= minimum {
            if let Some((parent, leaf)) = parent_of(path) {
                let container = self.read_at(place, &parent);
                if container.is_nullish() {
                    return Err(reading_error(&container, leaf));
                }
            }
        }
        Ok(self.read_at(place, path))
    }

    fn write_place(&mut self, place: &Place, value: Value, target: &Spanned<Expression>) -> Result<(), EvalError> {
        let replaces_scope = match place {
            Place::State(_) => false,
            Place::This(path) => path.is_empty(),
            Place::Local(index, path) => {
                path.is_empty() && matches!(self.environment.locals[*index].1, Local::Scope(_))
            }
        };
        if replaces_scope {
            return Err(EvalError::InvalidTarget(self.text(target)));
        }
        let written = match place {
            Place::State(path) => self.environment.state.set(path, value),
            Place::This(path) => self.environment.this.set(path, value),
            Place::Local(index, path) => match &mut self.environment.locals[*index].1 {
                Local::Value(current) => path::set(current, path, value),
                Local::Scope(scope) => scope.set(path, value),
            },
        };
        if written {
            Ok(())
        } else {
            Err(EvalError::Type(format!(
                "Cannot assign to '{}'",
                self.text(target)
            )))
        }
    }

    fn lookup_global(&self, name: &str) -> Result<Value, EvalError> {
        if let Some(function) = self
            .environment
            .globals
            .as_ref()
            .and_then(|globals| globals.get(name))
        {
            return Ok(Value::Function(function));
        }
        builtins::global(name).ok_or_else(|| EvalError::Reference(name.to_string()))
    }

    fn evaluate(&mut self, expression: &Spanned<Expression>) -> Result<Value, EvalError> {
        match &expression.node {
            Expression::Literal(literal) => Ok(match literal {
                Literal::Number(number) => Value::Number(*number),
                Literal::Text(text) => Value::String(text.clone()),
                Literal::Bool(value) => Value::Bool(*value),
                Literal::Null => Value::Null,
                Literal::Undefined => Value::Undefined,
            }),
            Expression::Identifier(name) => match self.place_of(expression)? {
                Some(place) => self.read_place(&place),
                None => self.lookup_global(name),
            },
            Expression::This => Ok(self.environment.this.snapshot()),
            Expression::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.evaluate(item)?);
                }
                Ok(Value::List(values))
            }
            Expression::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    let value = self.evaluate(value)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::Map(map))
            }
            Expression::Member { object, property } => {
                if let Some(place) = self.place_of(expression)? {
                    return self.read_place(&place);
                }
                let object = self.evaluate(object)?;
                if object.is_nullish() {
                    return Err(reading_error(&object, property));
                }
                Ok(path::property(&object, property))
            }
            Expression::Index { object, index } => {
                if let Some(place) = self.place_of(expression)? {
                    return self.read_place(&place);
                }
                let object = self.evaluate(object)?;
                let key = property_key(&self.evaluate(index)?);
                if object.is_nullish() {
                    return Err(reading_error(&object, &key));
                }
                Ok(path::property(&object, &key))
            }
            Expression::Call { callee, arguments } => self.call(callee, arguments),
            Expression::Unary { operator, operand } => {
                let value = match (operator, &operand.node) {
                    (UnaryOperator::Typeof, Expression::Identifier(_)) => {
                        match self.evaluate(operand) {
                            Err(EvalError::Reference(_)) => Value::Undefined,
                            result => result?,
                        }
                    }
                    _ => self.evaluate(operand)?,
                };
                Ok(match operator {
                    UnaryOperator::Not => Value::Bool(!value.is_truthy()),
                    UnaryOperator::Negate => Value::Number(-value.to_number()),
                    UnaryOperator::Plus => Value::Number(value.to_number()),
                    UnaryOperator::Typeof => Value::from(value.type_name()),
                })
            }
            Expression::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.evaluate(left)?;
                match operator {
                    BinaryOperator::And if !left.is_truthy() => Ok(left),
                    BinaryOperator::Or if left.is_truthy() => Ok(left),
                    BinaryOperator::Coalesce if !left.is_nullish() => Ok(left),
                    BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Coalesce => {
                        self.evaluate(right)
                    }
                    operator => {
                        let right = self.evaluate(right)?;
                        Ok(binary(*operator, &left, &right))
                    }
                }
            }
            Expression::Conditional {
                test,
                consequent,
                alternative,
            } => {
                if self.evaluate(test)?.is_truthy() {
                    self.evaluate(consequent)
                } else {
                    self.evaluate(alternative)
                }
            }
            Expression::Assign {
                operator,
                target,
                value,
            } => {
                let place = self.assignment_place(target)?;
                let value = self.evaluate(value)?;
                let value = match operator {
                    AssignOperator::Assign => value,
                    AssignOperator::Add => binary(BinaryOperator::Add, &self.read_place(&place)?, &value),
                    AssignOperator::Subtract => {
                        binary(BinaryOperator::Subtract, &self.read_place(&place)?, &value)
                    }
                };
                self.write_place(&place, value.clone(), target)?;
                Ok(value)
            }
            Expression::Update {
                operator,
                prefix,
                target,
            } => {
                let Some(place) = self.place_of(target)? else {
                    return match &target.node {
                        Expression::Identifier(name) => Err(EvalError::Reference(name.clone())),
                        _ => Err(EvalError::InvalidTarget(self.text(target))),
                    };
                };
                let old = self.read_place(&place)?.to_number();
                let new = match operator {
                    UpdateOperator::Increment => old + 1.0,
                    UpdateOperator::Decrement => old - 1.0,
                };
                self.write_place(&place, Value::Number(new), target)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
        }
    }

    fn call(
        &mut self,
        callee: &Spanned<Expression>,
        arguments: &[Spanned<Expression>],
    ) -> Result<Value, EvalError> {
        if let Expression::Member { object, property } = &callee.node {
            let mut values = Vec::with_capacity(arguments.len());
            for argument in arguments {
                values.push(self.evaluate(argument)?);
            }
            if builtins::MUTATING_LIST_METHODS.contains(&property.as_str()) {
                if let Some(place) = self.place_of(object)? {
                    let mut target = self.read_place(&place)?;
                    if let Value::List(items) = &mut target {
                        let result = builtins::mutate_list(items, property, values)?;
                        self.write_place(&place, target, object)?;
                        return Ok(result);
                    }
                }
            }
            let receiver = self.evaluate(object)?;
            if receiver.is_nullish() {
                return Err(reading_error(&receiver, property));
            }
            return match path::property(&receiver, property) {
                Value::Function(function) => function.call(values),
                _ => builtins::call_method(&receiver, property, values),
            };
        }
        let function = self.evaluate(callee)?;
        let mut values = Vec::with_capacity(arguments.len());
        for argument in arguments {
            values.push(self.evaluate(argument)?);
        }
        match function {
            Value::Function(function) => function.call(values),
            _ => Err(EvalError::Type(format!(
                "{} is not a function",
                self.text(callee)
            ))),
        }
    }
}

fn child_place(place: Place, key: &str) -> Place {
    match place {
        Place::State(path) => Place::State(path.child(key)),
        Place::This(path) => Place::This(path.child(key)),
        Place::Local(index, path) => Place::Local(index, path.child(key)),
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

/// Binary operators on evaluated operands. [`Run`] short-circuits the
/// logical ones before getting here.
fn binary(operator: BinaryOperator, left: &Value, right: &Value) -> Value {
    use std::cmp::Ordering;
    let numbers = || (left.to_number(), right.to_number());
    match operator {
        BinaryOperator::Add => match (left, right) {
            (Value::Number(left), Value::Number(right)) => Value::Number(left + right),
            (
                Value::String(_) | Value::List(_) | Value::Map(_) | Value::Function(_),
                _,
            )
            | (
                _,
                Value::String(_) | Value::List(_) | Value::Map(_) | Value::Function(_),
            ) => Value::String(left.to_script_string() + &right.to_script_string()),
            _ => Value::Number(left.to_number() + right.to_number()),
        },
        BinaryOperator::Subtract => {
            let (left, right) = numbers();
            Value::Number(left - right)
        }
        BinaryOperator::Multiply => {
            let (left, right) = numbers();
            Value::Number(left * right)
        }
        BinaryOperator::Divide => {
            let (left, right) = numbers();
            Value::Number(left / right)
        }
        BinaryOperator::Remainder => {
            let (left, right) = numbers();
            Value::Number(left % right)
        }
        BinaryOperator::Less => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOperator::LessOrEqual => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOperator::Greater => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOperator::GreaterOrEqual => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOperator::Equal => Value::Bool(left.loose_equals(right)),
        BinaryOperator::NotEqual => Value::Bool(!left.loose_equals(right)),
        BinaryOperator::StrictEqual => Value::Bool(left.strict_equals(right)),
        BinaryOperator::StrictNotEqual => Value::Bool(!left.strict_equals(right)),
        BinaryOperator::And => if left.is_truthy() { right } else { left }.clone(),
        BinaryOperator::Or => if left.is_truthy() { left } else { right }.clone(),
        BinaryOperator::Coalesce => if left.is_nullish() { right } else { left }.clone(),
    }
}
