use std::fmt;
use std::io::Cursor;
use std::ops::Range;

use ariadne::{Config, Label, Report, ReportKind, Source};

/// A single lexer or parser complaint about an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub span: Range<usize>,
    pub message: String,
    pub reason: String,
}

/// Expression source that failed to lex or parse.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub source: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    /// Plain-text ariadne report for every diagnostic, labelled with `filename`.
    pub fn report(&self, filename: &str) -> String {
        let mut report_bytes = Cursor::new(Vec::new());
        for diagnostic in &self.diagnostics {
            let written = Report::build(ReportKind::Error, (filename, diagnostic.span.clone()))
                .with_config(Config::default().with_color(false))
                .with_message(&diagnostic.message)
                .with_label(
                    Label::new((filename, diagnostic.span.clone()))
                        .with_message(&diagnostic.reason),
                )
                .finish()
                .write((filename, Source::from(self.source.as_str())), &mut report_bytes);
            if let Err(error) = written {
                log::warn!("[rable] failed to render diagnostic: {error}");
            }
        }
        String::from_utf8_lossy(report_bytes.get_ref()).into_owned()
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to compile expression `{}`", self.source)?;
        if let Some(first) = self.diagnostics.first() {
            write!(f, ": {}", first.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Name not bound in state, locals, registered functions or builtins.
    Reference(String),
    /// Operation applied to a value of the wrong shape.
    Type(String),
    /// Assignment to something that is not a place.
    InvalidTarget(String),
    Compile(CompileError),
    /// Error raised by a native function.
    Native(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference(name) => write!(f, "ReferenceError: {name} is not defined"),
            Self::Type(message) => write!(f, "TypeError: {message}"),
            Self::InvalidTarget(target) => write!(f, "Invalid assignment target: {target}"),
            Self::Compile(error) => write!(f, "{error}"),
            Self::Native(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Compile(error) => Some(error),
            _ => None,
        }
    }
}

impl From<CompileError> for EvalError {
    fn from(error: CompileError) -> Self {
        Self::Compile(error)
    }
}

/// `for` directive value matching neither loop grammar.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopStatementError {
    pub statement: String,
}

impl fmt::Display for LoopStatementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is not a valid loop statement.", self.statement)
    }
}

impl std::error::Error for LoopStatementError {}

#[derive(Debug)]
pub enum ComponentError {
    InvalidData {
        component: String,
        error: serde_json::Error,
    },
    MissingRoot {
        component: String,
    },
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidData { component, error } => {
                write!(f, "Failed to parse data from component '{component}': {error}")
            }
            Self::MissingRoot { component } => write!(
                f,
                "Component '{component}' has no <component> wrapper with a root element"
            ),
        }
    }
}

impl std::error::Error for ComponentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidData { error, .. } => Some(error),
            Self::MissingRoot { .. } => None,
        }
    }
}

/// Template text could not be retrieved.
#[derive(Debug)]
pub struct LoadError {
    pub name: String,
    pub path: String,
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to load component '{}' from '{}': {}",
            self.name, self.path, self.source
        )
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
