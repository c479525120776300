//! Small selector engine: compound selectors (`tag#id.class[attr][attr=value]`)
//! joined by descendant combinators, and comma separated selector lists.

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<AttributeMatcher>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMatcher {
    pub name: String,
    pub value: Option<String>,
}

/// A selector list; each entry is a chain of compounds, outermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub alternatives: Vec<Vec<Compound>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

impl std::fmt::Display for SelectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid selector '{}': {}", self.selector, self.reason)
    }
}

impl std::error::Error for SelectorError {}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let error = |reason: &str| SelectorError {
            selector: source.to_string(),
            reason: reason.to_string(),
        };
        let mut alternatives = Vec::new();
        for alternative in source.split(',') {
            let alternative = alternative.trim();
            if alternative.is_empty() {
                return Err(error("empty selector"));
            }
            let chain = split_outside_brackets(alternative)
                .into_iter()
                .map(|part| parse_compound(&part).map_err(|reason| error(&reason)))
                .collect::<Result<Vec<_>, _>>()?;
            alternatives.push(chain);
        }
        Ok(Self { alternatives })
    }
}

fn split_outside_brackets(source: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for character in source.chars() {
        match (quote, character) {
            (Some(open), c) if c == open => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, c @ ('"' | '\'')) => {
                quote = Some(c);
                current.push(c);
            }
            (None, '[') => {
                depth += 1;
                current.push('[');
            }
            (None, ']') => {
                depth = depth.saturating_sub(1);
                current.push(']');
            }
            (None, c) if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn is_name_char(character: char) -> bool {
    character.is_alphanumeric() || character == '-' || character == '_' || character == ':'
}

fn parse_compound(source: &str) -> Result<Compound, String> {
    let mut compound = Compound::default();
    let characters: Vec<char> = source.chars().collect();
    let mut index = 0;

    let read_name = |index: &mut usize| {
        let start = *index;
        while *index < characters.len() && is_name_char(characters[*index]) {
            *index += 1;
        }
        characters[start..*index].iter().collect::<String>()
    };

    if characters.first() == Some(&'*') {
        index += 1;
    } else if characters.first().is_some_and(|c| is_name_char(*c)) {
        compound.tag = Some(read_name(&mut index).to_ascii_lowercase());
    }

    while index < characters.len() {
        match characters[index] {
            '#' => {
                index += 1;
                let name = read_name(&mut index);
                if name.is_empty() {
                    return Err("expected id after '#'".to_string());
                }
                compound.id = Some(name);
            }
            '.' => {
                index += 1;
                let name = read_name(&mut index);
                if name.is_empty() {
                    return Err("expected class after '.'".to_string());
                }
                compound.classes.push(name);
            }
            '[' => {
                let Some(close) = characters[index..].iter().position(|c| *c == ']') else {
                    return Err("unclosed '['".to_string());
                };
                let inner: String = characters[index + 1..index + close].iter().collect();
                index += close + 1;
                let matcher = match inner.split_once('=') {
                    Some((name, value)) => AttributeMatcher {
                        name: name.trim().to_ascii_lowercase(),
                        value: Some(value.trim().trim_matches(['"', '\'']).to_string()),
                    },
                    None => AttributeMatcher {
                        name: inner.trim().to_ascii_lowercase(),
                        value: None,
                    },
                };
                if matcher.name.is_empty() {
                    return Err("empty attribute selector".to_string());
                }
                compound.attributes.push(matcher);
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(compound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_with_attribute() {
        let selector = Selector::parse("style[component-type=download-link]").unwrap();
        assert_eq!(selector.alternatives.len(), 1);
        let compound = &selector.alternatives[0][0];
        assert_eq!(compound.tag.as_deref(), Some("style"));
        assert_eq!(
            compound.attributes,
            vec![AttributeMatcher {
                name: "component-type".to_string(),
                value: Some("download-link".to_string()),
            }]
        );
    }

    #[test]
    fn parses_descendant_chain_and_list() {
        let selector = Selector::parse("#app li.active, [hidden]").unwrap();
        assert_eq!(selector.alternatives.len(), 2);
        let chain = &selector.alternatives[0];
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].id.as_deref(), Some("app"));
        assert_eq!(chain[1].tag.as_deref(), Some("li"));
        assert_eq!(chain[1].classes, vec!["active".to_string()]);
    }

    #[test]
    fn rejects_malformed_selectors() {
        assert!(Selector::parse("div[").is_err());
        assert!(Selector::parse("a,").is_err());
        assert!(Selector::parse("#").is_err());
    }
}
