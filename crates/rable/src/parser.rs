use chumsky::{input::ValueInput, pratt::*, prelude::*};
use std::fmt;
use std::rc::Rc;

mod lexer;
pub use lexer::{Token, lexer, unescape};

pub use chumsky::prelude::{Input, Parser};

use crate::error::{CompileError, Diagnostic};

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

pub fn span_at(at: usize) -> Span {
    Span::from(at..at)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
    Plus,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Multiply,
    Divide,
    Remainder,
    Add,
    Subtract,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOperator {
    Assign,
    Add,
    Subtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Identifier(String),
    This,
    Array(Vec<Spanned<Self>>),
    Object(Vec<(String, Spanned<Self>)>),
    Member {
        object: Box<Spanned<Self>>,
        property: String,
    },
    Index {
        object: Box<Spanned<Self>>,
        index: Box<Spanned<Self>>,
    },
    Call {
        callee: Box<Spanned<Self>>,
        arguments: Vec<Spanned<Self>>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Spanned<Self>>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Spanned<Self>>,
        right: Box<Spanned<Self>>,
    },
    Conditional {
        test: Box<Spanned<Self>>,
        consequent: Box<Spanned<Self>>,
        alternative: Box<Spanned<Self>>,
    },
    Assign {
        operator: AssignOperator,
        target: Box<Spanned<Self>>,
        value: Box<Spanned<Self>>,
    },
    Update {
        operator: UpdateOperator,
        prefix: bool,
        target: Box<Spanned<Self>>,
    },
}

/// Compiled expression source: statements separated by `;`, the value of the
/// last one is the value of the program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub source: String,
    pub statements: Vec<Spanned<Expression>>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

enum Postfix {
    Member(String),
    Index(Spanned<Expression>),
    Call(Vec<Spanned<Expression>>),
}

fn boxed(expression: Spanned<Expression>) -> Box<Spanned<Expression>> {
    Box::new(expression)
}

fn binary(
    operator: BinaryOperator,
    left: Spanned<Expression>,
    right: Spanned<Expression>,
    span: Span,
) -> Spanned<Expression> {
    Spanned {
        span,
        node: Expression::Binary {
            operator,
            left: boxed(left),
            right: boxed(right),
        },
    }
}

pub fn parser<'code, I>()
-> impl Parser<'code, I, Vec<Spanned<Expression>>, extra::Err<ParseError<'code, Token<'code>>>>
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    let expression = recursive(|expression| {
        let comma = just(Token::Comma);
        let bracket_round_open = just(Token::BracketRoundOpen);
        let bracket_round_close = just(Token::BracketRoundClose);
        let bracket_curly_open = just(Token::BracketCurlyOpen);
        let bracket_curly_close = just(Token::BracketCurlyClose);
        let bracket_square_open = just(Token::BracketSquareOpen);
        let bracket_square_close = just(Token::BracketSquareClose);

        let identifier = select! { Token::Identifier(identifier) => identifier.to_string() };

        let literal = select! {
            Token::Number(number) => Literal::Number(number),
            Token::Text(text) => Literal::Text(unescape(text)),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Null,
            Token::Undefined => Literal::Undefined,
        }
        .map(Expression::Literal);

        let list = expression
            .clone()
            .separated_by(comma.clone())
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(bracket_square_open.clone(), bracket_square_close.clone())
            .map(Expression::Array);

        let object_key = identifier.clone().or(select! {
            Token::Text(text) => unescape(text),
            Token::Number(number) => crate::value::format_number(number),
        });

        let object_entry = object_key
            .then_ignore(just(Token::Colon))
            .then(expression.clone())
            .or(identifier.clone().map_with(|name, extra| {
                (
                    name.clone(),
                    Spanned {
                        span: extra.span(),
                        node: Expression::Identifier(name),
                    },
                )
            }));

        let object = object_entry
            .separated_by(comma.clone())
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(bracket_curly_open, bracket_curly_close)
            .map(Expression::Object);

        let nested = expression
            .clone()
            .delimited_by(bracket_round_open.clone(), bracket_round_close.clone());

        let atom = choice((
            literal,
            identifier.clone().map(Expression::Identifier),
            just(Token::This).to(Expression::This),
            list,
            object,
        ))
        .map_with(|expression, extra| Spanned {
            node: expression,
            span: extra.span(),
        })
        .or(nested);

        let arguments = expression
            .clone()
            .separated_by(comma)
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(bracket_round_open, bracket_round_close);

        let postfix = choice((
            just(Token::Dot).ignore_then(identifier).map(Postfix::Member),
            expression
                .clone()
                .delimited_by(bracket_square_open, bracket_square_close)
                .map(Postfix::Index),
            arguments.map(Postfix::Call),
        ));

        let chain = atom.foldl_with(postfix.repeated(), |object, postfix, extra| {
            let node = match postfix {
                Postfix::Member(property) => Expression::Member {
                    object: boxed(object),
                    property,
                },
                Postfix::Index(index) => Expression::Index {
                    object: boxed(object),
                    index: boxed(index),
                },
                Postfix::Call(arguments) => Expression::Call {
                    callee: boxed(object),
                    arguments,
                },
            };
            Spanned {
                span: extra.span(),
                node,
            }
        });

        let update_operator = select! {
            Token::Increment => UpdateOperator::Increment,
            Token::Decrement => UpdateOperator::Decrement,
        };

        let postfix_update = chain
            .then(update_operator.clone().or_not())
            .map_with(|(target, operator), extra| match operator {
                Some(operator) => Spanned {
                    span: extra.span(),
                    node: Expression::Update {
                        operator,
                        prefix: false,
                        target: boxed(target),
                    },
                },
                None => target,
            });

        let unary_operator = select! {
            Token::Not => UnaryOperator::Not,
            Token::Minus => UnaryOperator::Negate,
            Token::Plus => UnaryOperator::Plus,
            Token::Typeof => UnaryOperator::Typeof,
        };

        let multiplicative = select! {
            Token::Asterisk => BinaryOperator::Multiply,
            Token::Slash => BinaryOperator::Divide,
            Token::Percent => BinaryOperator::Remainder,
        };
        let additive = select! {
            Token::Plus => BinaryOperator::Add,
            Token::Minus => BinaryOperator::Subtract,
        };
        let relational = select! {
            Token::Less => BinaryOperator::Less,
            Token::LessOrEqual => BinaryOperator::LessOrEqual,
            Token::Greater => BinaryOperator::Greater,
            Token::GreaterOrEqual => BinaryOperator::GreaterOrEqual,
        };
        let equality = select! {
            Token::Equal => BinaryOperator::Equal,
            Token::NotEqual => BinaryOperator::NotEqual,
            Token::StrictEqual => BinaryOperator::StrictEqual,
            Token::StrictNotEqual => BinaryOperator::StrictNotEqual,
        };
        let logical_and = select! { Token::And => BinaryOperator::And };
        let logical_or = select! {
            Token::Or => BinaryOperator::Or,
            Token::DoubleQuestion => BinaryOperator::Coalesce,
        };

        let operation = postfix_update.pratt((
            // Precedence 9 (highest): prefix operators
            prefix(9, unary_operator, |operator, operand, extra| Spanned {
                span: extra.span(),
                node: Expression::Unary {
                    operator,
                    operand: boxed(operand),
                },
            }),
            prefix(9, update_operator, |operator, target, extra| Spanned {
                span: extra.span(),
                node: Expression::Update {
                    operator,
                    prefix: true,
                    target: boxed(target),
                },
            }),
            infix(left(8), multiplicative, |l, operator, r, extra| {
                binary(operator, l, r, extra.span())
            }),
            infix(left(7), additive, |l, operator, r, extra| {
                binary(operator, l, r, extra.span())
            }),
            infix(left(6), relational, |l, operator, r, extra| {
                binary(operator, l, r, extra.span())
            }),
            infix(left(5), equality, |l, operator, r, extra| {
                binary(operator, l, r, extra.span())
            }),
            infix(left(4), logical_and, |l, operator, r, extra| {
                binary(operator, l, r, extra.span())
            }),
            // Precedence 3 (lowest): `||` and `??`
            infix(left(3), logical_or, |l, operator, r, extra| {
                binary(operator, l, r, extra.span())
            }),
        ));

        let conditional = operation
            .then(
                just(Token::Question)
                    .ignore_then(expression.clone())
                    .then_ignore(just(Token::Colon))
                    .then(expression.clone())
                    .or_not(),
            )
            .map_with(|(test, branches), extra| match branches {
                Some((consequent, alternative)) => Spanned {
                    span: extra.span(),
                    node: Expression::Conditional {
                        test: boxed(test),
                        consequent: boxed(consequent),
                        alternative: boxed(alternative),
                    },
                },
                None => test,
            });

        let assign_operator = select! {
            Token::Assign => AssignOperator::Assign,
            Token::PlusAssign => AssignOperator::Add,
            Token::MinusAssign => AssignOperator::Subtract,
        };

        conditional
            .then(assign_operator.then(expression).or_not())
            .map_with(|(target, assignment), extra| match assignment {
                Some((operator, value)) => Spanned {
                    span: extra.span(),
                    node: Expression::Assign {
                        operator,
                        target: boxed(target),
                        value: boxed(value),
                    },
                },
                None => target,
            })
    });

    let semicolons = just(Token::Semicolon).repeated().at_least(1);

    expression
        .separated_by(semicolons)
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::Semicolon).repeated(), end())
}

fn diagnostic<T: fmt::Display>(error: &ParseError<'_, T>) -> Diagnostic {
    Diagnostic {
        span: error.span().into_range(),
        message: error.to_string(),
        reason: error.reason().to_string(),
    }
}

/// Lex and parse an expression program.
pub fn compile(source_code: &str) -> Result<Rc<Program>, CompileError> {
    let (tokens, lex_errors) = lexer().parse(source_code).into_output_errors();
    if !lex_errors.is_empty() {
        return Err(CompileError {
            source: source_code.to_string(),
            diagnostics: lex_errors.iter().map(diagnostic).collect(),
        });
    }
    let tokens = tokens.unwrap_or_default();

    let input = tokens.map(span_at(source_code.len()), |Spanned { node, span }| (node, span));
    let (statements, parse_errors) = parser().parse(input).into_output_errors();
    if !parse_errors.is_empty() {
        return Err(CompileError {
            source: source_code.to_string(),
            diagnostics: parse_errors.iter().map(diagnostic).collect(),
        });
    }

    Ok(Rc::new(Program {
        source: source_code.to_string(),
        statements: statements.unwrap_or_default(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> Expression {
        let program = compile(source).unwrap();
        assert_eq!(program.statements.len(), 1, "{source}");
        program.statements[0].node.clone()
    }

    fn identifier(expression: &Spanned<Expression>) -> &str {
        match &expression.node {
            Expression::Identifier(name) => name,
            other => panic!("Expected identifier, got {other:?}"),
        }
    }

    #[test]
    fn test_multiplication_binds_tighter_than_addition() {
        let Expression::Binary {
            operator: BinaryOperator::Add,
            left,
            right,
        } = single("a + b * c")
        else {
            panic!("Expected addition at the root");
        };
        assert_eq!(identifier(&left), "a");
        assert!(matches!(
            right.node,
            Expression::Binary {
                operator: BinaryOperator::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn test_member_call_chain() {
        let Expression::Call { callee, arguments } = single("app.location.includes('home')") else {
            panic!("Expected call");
        };
        assert_eq!(arguments.len(), 1);
        let Expression::Member { object, property } = callee.node else {
            panic!("Expected member callee");
        };
        assert_eq!(property, "includes");
        assert!(matches!(object.node, Expression::Member { .. }));
    }

    #[test]
    fn test_ternary_and_assignment_are_right_associative() {
        assert!(matches!(
            single("a ? b : c ? d : e"),
            Expression::Conditional { .. }
        ));
        let Expression::Assign { target, value, .. } = single("a = b = 1") else {
            panic!("Expected assignment");
        };
        assert_eq!(identifier(&target), "a");
        assert!(matches!(value.node, Expression::Assign { .. }));
    }

    #[test]
    fn test_prefix_and_postfix_updates() {
        assert!(matches!(
            single("count++"),
            Expression::Update { prefix: false, .. }
        ));
        assert!(matches!(
            single("--count"),
            Expression::Update { prefix: true, .. }
        ));
        assert!(matches!(
            single("!done"),
            Expression::Unary {
                operator: UnaryOperator::Not,
                ..
            }
        ));
    }

    #[test]
    fn test_object_and_array_literals() {
        let Expression::Object(entries) = single("{ a: 1, 'b c': [1, 2,], short }") else {
            panic!("Expected object");
        };
        let keys: Vec<_> = entries.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b c", "short"]);
    }

    #[test]
    fn test_statements_and_empty_program() {
        assert_eq!(compile("a = 1; b = 2;; c").unwrap().statements.len(), 3);
        assert!(compile("").unwrap().statements.is_empty());
        assert!(compile("  ; ").unwrap().statements.is_empty());
    }

    #[test]
    fn test_errors_are_reported_with_ariadne() {
        let error = compile("a +").unwrap_err();
        assert!(!error.diagnostics.is_empty());
        let report = error.report("expression");
        assert!(report.contains("expression"), "{report}");
        assert!(compile("a #").is_err());
    }
}
