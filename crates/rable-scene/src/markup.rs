//! Tolerant markup reader.
//!
//! Produces a light [`MarkupNode`] tree that [`crate::Document`] turns into
//! arena nodes. It understands what component templates and pages actually
//! contain: elements, attributes (including directive names such as `:for`,
//! `@click`, `$key`, `&origin`), text, comments, void elements and raw-text
//! elements. It does not implement the HTML5 insertion-mode algorithm.

/// Elements that never have children or an end tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose content is kept verbatim.
pub const RAW_TEXT_ELEMENTS: &[&str] = &["style", "script", "textarea", "data"];

#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        children: Vec<MarkupNode>,
    },
    Text(String),
}

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub fn is_raw_text_element(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&tag)
}

/// Parse markup into a list of top-level nodes.
pub fn parse_markup(source: &str) -> Vec<MarkupNode> {
    let mut reader = Reader {
        source,
        position: 0,
    };
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut roots = Vec::new();

    while let Some(item) = reader.next_item() {
        match item {
            Item::Text(text) => {
                if text.is_empty() {
                    continue;
                }
                push_node(&mut stack, &mut roots, MarkupNode::Text(decode_entities(&text)));
            }
            Item::StartTag {
                tag,
                attributes,
                self_closing,
            } => {
                if is_raw_text_element(&tag) && !self_closing {
                    let content = reader.raw_text_until_end_tag(&tag);
                    let children = if content.is_empty() {
                        Vec::new()
                    } else {
                        vec![MarkupNode::Text(content)]
                    };
                    push_node(
                        &mut stack,
                        &mut roots,
                        MarkupNode::Element {
                            tag,
                            attributes,
                            children,
                        },
                    );
                } else if self_closing || is_void_element(&tag) {
                    push_node(
                        &mut stack,
                        &mut roots,
                        MarkupNode::Element {
                            tag,
                            attributes,
                            children: Vec::new(),
                        },
                    );
                } else {
                    stack.push(OpenElement {
                        tag,
                        attributes,
                        children: Vec::new(),
                    });
                }
            }
            Item::EndTag(tag) => {
                let Some(index) = stack.iter().rposition(|open| open.tag == tag) else {
                    log::trace!("[markup] ignoring stray end tag </{tag}>");
                    continue;
                };
                while stack.len() > index {
                    close_top(&mut stack, &mut roots);
                }
            }
        }
    }

    while !stack.is_empty() {
        close_top(&mut stack, &mut roots);
    }
    roots
}

struct OpenElement {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<MarkupNode>,
}

fn push_node(stack: &mut [OpenElement], roots: &mut Vec<MarkupNode>, node: MarkupNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn close_top(stack: &mut Vec<OpenElement>, roots: &mut Vec<MarkupNode>) {
    if let Some(open) = stack.pop() {
        let node = MarkupNode::Element {
            tag: open.tag,
            attributes: open.attributes,
            children: open.children,
        };
        push_node(stack, roots, node);
    }
}

enum Item {
    Text(String),
    StartTag {
        tag: String,
        attributes: Vec<(String, String)>,
        self_closing: bool,
    },
    EndTag(String),
}

struct Reader<'a> {
    source: &'a str,
    position: usize,
}

impl<'a> Reader<'a> {
    fn rest(&self) -> &'a str {
        &self.source[self.position..]
    }

    fn next_item(&mut self) -> Option<Item> {
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return None;
            }
            if let Some(after) = rest.strip_prefix("<!--") {
                let skipped = after.find("-->").map_or(rest.len(), |end| 4 + end + 3);
                self.position += skipped;
                continue;
            }
            if rest.starts_with("<!") || rest.starts_with("<?") {
                let skipped = rest.find('>').map_or(rest.len(), |end| end + 1);
                self.position += skipped;
                continue;
            }
            if let Some(after) = rest.strip_prefix("</") {
                let end = after.find('>').unwrap_or(after.len());
                let tag = after[..end].trim().to_ascii_lowercase();
                self.position += 2 + (end + 1).min(after.len());
                return Some(Item::EndTag(tag));
            }
            if rest.starts_with('<')
                && rest[1..].chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            {
                return Some(self.start_tag());
            }
            return Some(Item::Text(self.text()));
        }
    }

    fn text(&mut self) -> String {
        let rest = self.rest();
        let mut end = rest.len();
        for (index, _) in rest.match_indices('<').filter(|(index, _)| *index > 0) {
            let tail = &rest[index + 1..];
            if tail.starts_with('/')
                || tail.starts_with('!')
                || tail.starts_with('?')
                || tail.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            {
                end = index;
                break;
            }
        }
        self.position += end;
        rest[..end].to_string()
    }

    fn start_tag(&mut self) -> Item {
        // skip '<'
        self.position += 1;
        let tag = self.take_while(|c| !c.is_whitespace() && c != '/' && c != '>');
        let tag = tag.to_ascii_lowercase();
        let mut attributes = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                break;
            }
            if rest.starts_with("/>") {
                self.position += 2;
                self_closing = true;
                break;
            }
            if rest.starts_with('>') {
                self.position += 1;
                break;
            }
            if rest.starts_with('/') {
                self.position += 1;
                continue;
            }
            let name = self.take_while(|c| !c.is_whitespace() && c != '=' && c != '>' && c != '/');
            let name = if name.is_empty() {
                // Unexpected character, consume it so we always make progress.
                let character = self.rest().chars().next().map_or(1, char::len_utf8);
                self.position += character;
                continue;
            } else {
                name.to_ascii_lowercase()
            };
            self.skip_whitespace();
            let value = if self.rest().starts_with('=') {
                self.position += 1;
                self.skip_whitespace();
                self.attribute_value()
            } else {
                String::new()
            };
            if !attributes.iter().any(|(existing, _): &(String, String)| *existing == name) {
                attributes.push((name, value));
            }
        }

        Item::StartTag {
            tag,
            attributes,
            self_closing,
        }
    }

    fn attribute_value(&mut self) -> String {
        let rest = self.rest();
        let quote = rest.chars().next();
        match quote {
            Some(quote @ ('"' | '\'')) => {
                let body = &rest[1..];
                let end = body.find(quote).unwrap_or(body.len());
                self.position += 1 + (end + 1).min(body.len());
                decode_entities(&body[..end])
            }
            _ => decode_entities(&self.take_while(|c| !c.is_whitespace() && c != '>')),
        }
    }

    fn raw_text_until_end_tag(&mut self, tag: &str) -> String {
        let rest = self.rest();
        let lowered = rest.to_ascii_lowercase();
        let closing = format!("</{tag}");
        match lowered.find(&closing) {
            Some(end) => {
                let content = rest[..end].to_string();
                let after = &rest[end..];
                let close_len = after.find('>').map_or(after.len(), |index| index + 1);
                self.position += end + close_len;
                content
            }
            None => {
                self.position = self.source.len();
                rest.to_string()
            }
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(_, c)| !predicate(*c))
            .map_or(rest.len(), |(index, _)| index);
        self.position += end;
        rest[..end].to_string()
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }
}

/// Decode the handful of character references templates actually use.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        output.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let decoded = candidate.find(';').and_then(|end| {
            let name = &candidate[1..end];
            let character = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => {
                    if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                    } else if let Some(decimal) = name.strip_prefix('#') {
                        decimal.parse::<u32>().ok().and_then(char::from_u32)
                    } else {
                        None
                    }
                }
            };
            character.map(|character| (character, end + 1))
        });
        match decoded {
            Some((character, consumed)) => {
                output.push(character);
                rest = &candidate[consumed..];
            }
            None => {
                output.push('&');
                rest = &candidate[1..];
            }
        }
    }
    output.push_str(rest);
    output
}

pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(node: &MarkupNode) -> (&str, &[(String, String)], &[MarkupNode]) {
        match node {
            MarkupNode::Element {
                tag,
                attributes,
                children,
            } => (tag, attributes, children),
            MarkupNode::Text(text) => panic!("Expected element, got text {text:?}"),
        }
    }

    #[test]
    fn parses_directive_attributes() {
        let nodes = parse_markup(r#"<li :for="item in items" @click="select(item)" $Key=x &bound></li>"#);
        assert_eq!(nodes.len(), 1);
        let (tag, attributes, children) = element(&nodes[0]);
        assert_eq!(tag, "li");
        assert!(children.is_empty());
        assert_eq!(
            attributes,
            &[
                (":for".to_string(), "item in items".to_string()),
                ("@click".to_string(), "select(item)".to_string()),
                ("$key".to_string(), "x".to_string()),
                ("&bound".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn keeps_raw_text_verbatim() {
        let nodes = parse_markup("<data>{\"a\": \"<b>\"}</data><style>.x > .y { color: red }</style>");
        let (_, _, children) = element(&nodes[0]);
        assert_eq!(children, &[MarkupNode::Text("{\"a\": \"<b>\"}".to_string())]);
        let (tag, _, children) = element(&nodes[1]);
        assert_eq!(tag, "style");
        assert_eq!(children, &[MarkupNode::Text(".x > .y { color: red }".to_string())]);
    }

    #[test]
    fn void_and_self_closing_elements_have_no_children() {
        let nodes = parse_markup("<p><input :value=name><br/>tail</p>");
        let (_, _, children) = element(&nodes[0]);
        assert_eq!(children.len(), 3);
        assert!(matches!(&children[2], MarkupNode::Text(text) if text == "tail"));
    }

    #[test]
    fn tolerates_stray_and_missing_end_tags() {
        let nodes = parse_markup("<div><span>a</div></em>b");
        assert_eq!(nodes.len(), 2);
        let (_, _, children) = element(&nodes[0]);
        let (tag, _, _) = element(&children[0]);
        assert_eq!(tag, "span");
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt; &#65;&#x42; &unknown;"), "a & b <c> AB &unknown;");
    }
}
