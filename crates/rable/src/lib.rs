//! Rable: reactive templates over a document tree.
//!
//! An application owns a root [`State`]; directives (`:if`, `:for`, `@click`,
//! `:value`, ...) and `{{ expression }}` placeholders found under the mount
//! element subscribe to its [`Hub`] and re-render whenever state changes.
//! Custom elements registered with [`Rable::import_component`] become
//! components with isolated state.

mod app;
pub mod builtins;
mod component;
mod context;
pub mod directive;
mod error;
pub mod evaluator;
mod hub;
pub mod parser;
pub mod path;
mod scheduler;
mod scope;
mod state;
pub mod style;
pub mod text;
mod value;

pub use app::{Rable, RableOptions, TemplateLoader};
pub use builtins::Globals;
pub use directive::{Directive, LoopStatement, NORENDER, camel_case};
pub use error::{CompileError, ComponentError, Diagnostic, EvalError, LoadError, LoopStatementError};
pub use evaluator::{Environment, Local, Programs};
pub use hub::{Hub, HubKind};
pub use parser::{Program, compile};
pub use path::Path;
pub use scheduler::{COMPONENT_STAGES, Scheduled, Scheduler};
pub use scope::{LoopScope, Scope};
pub use state::State;
pub use style::{StyleRegistry, scope_css};
pub use value::{Function, Invocation, Map, Value};

pub use rable_scene;
