use super::{ParseError, Spanned};
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'code> {
    BracketRoundOpen,
    BracketRoundClose,
    BracketCurlyOpen,
    BracketCurlyClose,
    BracketSquareOpen,
    BracketSquareClose,
    Number(f64),
    /// Raw string content between the quotes, escapes not yet resolved.
    Text(&'code str),
    Identifier(&'code str),
    True,
    False,
    Null,
    Undefined,
    This,
    Typeof,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Question,
    DoubleQuestion,
    StrictEqual,
    StrictNotEqual,
    Equal,
    NotEqual,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
    And,
    Or,
    Not,
    Increment,
    Decrement,
    PlusAssign,
    MinusAssign,
    Assign,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
}

impl<'code> Token<'code> {
    pub fn into_cow_str(self) -> Cow<'code, str> {
        match self {
            Self::BracketRoundOpen => "(".into(),
            Self::BracketRoundClose => ")".into(),
            Self::BracketCurlyOpen => "{".into(),
            Self::BracketCurlyClose => "}".into(),
            Self::BracketSquareOpen => "[".into(),
            Self::BracketSquareClose => "]".into(),
            Self::Number(number) => number.to_string().into(),
            Self::Text(text) => format!("'{text}'").into(),
            Self::Identifier(identifier) => identifier.into(),
            Self::True => "true".into(),
            Self::False => "false".into(),
            Self::Null => "null".into(),
            Self::Undefined => "undefined".into(),
            Self::This => "this".into(),
            Self::Typeof => "typeof".into(),
            Self::Comma => ",".into(),
            Self::Dot => ".".into(),
            Self::Colon => ":".into(),
            Self::Semicolon => ";".into(),
            Self::Question => "?".into(),
            Self::DoubleQuestion => "??".into(),
            Self::StrictEqual => "===".into(),
            Self::StrictNotEqual => "!==".into(),
            Self::Equal => "==".into(),
            Self::NotEqual => "!=".into(),
            Self::GreaterOrEqual => ">=".into(),
            Self::Greater => ">".into(),
            Self::LessOrEqual => "<=".into(),
            Self::Less => "<".into(),
            Self::And => "&&".into(),
            Self::Or => "||".into(),
            Self::Not => "!".into(),
            Self::Increment => "++".into(),
            Self::Decrement => "--".into(),
            Self::PlusAssign => "+=".into(),
            Self::MinusAssign => "-=".into(),
            Self::Assign => "=".into(),
            Self::Plus => "+".into(),
            Self::Minus => "-".into(),
            Self::Asterisk => "*".into(),
            Self::Slash => "/".into(),
            Self::Percent => "%".into(),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.into_cow_str())
    }
}

pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token<'code>>>, extra::Err<ParseError<'code, char>>> {
    let bracket = choice((
        just('(').to(Token::BracketRoundOpen),
        just(')').to(Token::BracketRoundClose),
        just('{').to(Token::BracketCurlyOpen),
        just('}').to(Token::BracketCurlyClose),
        just('[').to(Token::BracketSquareOpen),
        just(']').to(Token::BracketSquareClose),
    ));

    // Longest operators first.
    let comparator = choice((
        just("===").to(Token::StrictEqual),
        just("!==").to(Token::StrictNotEqual),
        just("==").to(Token::Equal),
        just("!=").to(Token::NotEqual),
        just(">=").to(Token::GreaterOrEqual),
        just('>').to(Token::Greater),
        just("<=").to(Token::LessOrEqual),
        just('<').to(Token::Less),
    ));

    let logical_operator = choice((
        just("&&").to(Token::And),
        just("||").to(Token::Or),
        just("??").to(Token::DoubleQuestion),
        just('!').to(Token::Not),
        just('?').to(Token::Question),
    ));

    let arithmetic_operator = choice((
        just("++").to(Token::Increment),
        just("--").to(Token::Decrement),
        just("+=").to(Token::PlusAssign),
        just("-=").to(Token::MinusAssign),
        just('=').to(Token::Assign),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Asterisk),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    let number = text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .from_str()
        .unwrapped()
        .map(Token::Number);

    let escaped = |quote: char| {
        just('\\')
            .then(any())
            .ignored()
            .or(none_of([quote, '\\']).ignored())
            .repeated()
            .to_slice()
            .delimited_by(just(quote), just(quote))
    };
    let text = escaped('\'').or(escaped('"')).map(Token::Text);

    let identifier_or_keyword = any()
        .filter(|character: &char| character.is_ascii_alphabetic() || matches!(character, '_' | '$'))
        .then(
            any()
                .filter(|character: &char| {
                    character.is_ascii_alphanumeric() || matches!(character, '_' | '$')
                })
                .repeated(),
        )
        .to_slice()
        .map(|identifier: &str| match identifier {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "undefined" => Token::Undefined,
            "this" => Token::This,
            "typeof" => Token::Typeof,
            _ => Token::Identifier(identifier),
        });

    let token = choice((
        bracket,
        number,
        text,
        identifier_or_keyword,
        comparator,
        logical_operator,
        arithmetic_operator,
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just(':').to(Token::Colon),
        just(';').to(Token::Semicolon),
    ));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded()
        .repeated()
        .collect()
        .padded()
        .then_ignore(end())
}

/// Resolve the escapes of a [`Token::Text`] body.
pub fn unescape(raw: &str) -> String {
    let mut output = String::with_capacity(raw.len());
    let mut characters = raw.chars();
    while let Some(character) = characters.next() {
        if character != '\\' {
            output.push(character);
            continue;
        }
        match characters.next() {
            Some('n') => output.push('\n'),
            Some('t') => output.push('\t'),
            Some('r') => output.push('\r'),
            Some('0') => output.push('\0'),
            Some(other) => output.push(other),
            None => output.push('\\'),
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chumsky::prelude::Parser;

    fn tokens(source: &str) -> Vec<Token<'_>> {
        lexer()
            .parse(source)
            .into_result()
            .unwrap()
            .into_iter()
            .map(|token| token.node)
            .collect()
    }

    #[test]
    fn test_operators_prefer_longest_match() {
        assert_eq!(
            tokens("a === b !== c ?? d++ += 1"),
            vec![
                Token::Identifier("a"),
                Token::StrictEqual,
                Token::Identifier("b"),
                Token::StrictNotEqual,
                Token::Identifier("c"),
                Token::DoubleQuestion,
                Token::Identifier("d"),
                Token::Increment,
                Token::PlusAssign,
                Token::Number(1.),
            ]
        );
    }

    #[test]
    fn test_strings_keep_raw_escapes() {
        assert_eq!(tokens(r#"'it\'s' "x""#), vec![Token::Text(r"it\'s"), Token::Text("x")]);
        assert_eq!(unescape(r"it\'s\n"), "it's\n");
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            tokens("this.$el && !undefined"),
            vec![
                Token::This,
                Token::Dot,
                Token::Identifier("$el"),
                Token::And,
                Token::Not,
                Token::Undefined,
            ]
        );
    }

    #[test]
    fn test_unknown_character_is_an_error() {
        assert!(lexer().parse("a # b").has_errors());
    }
}
