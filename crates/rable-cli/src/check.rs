//! Static checks of markup: every expression a directive or placeholder
//! would compile at mount time, and every loop statement.

use rable::rable_scene::{Document, NodeId};
use rable::text::placeholders;
use rable::{Directive, LoopStatement, NORENDER};

/// Human-readable problems found in `markup`, reported against `filename`.
pub fn check_markup(markup: &str, filename: &str) -> Vec<String> {
    let document = Document::parse(markup);
    let mut problems = Vec::new();
    walk(&document, document.root(), filename, &mut problems);
    problems
}

fn walk(document: &Document, node: NodeId, filename: &str, problems: &mut Vec<String>) {
    if let Some(text) = document.text(node) {
        for (_, source) in placeholders(&text) {
            compile(source, filename, problems);
        }
        return;
    }
    if NORENDER.iter().any(|name| document.has_attribute(node, name)) {
        return;
    }
    let raw = matches!(document.tag_name(node).as_deref(), Some("style" | "script" | "data"));
    for (name, value) in document.attributes(node) {
        if let Some(directive) = Directive::parse(&name, &value) {
            check_directive(&directive, filename, problems);
        }
    }
    if raw {
        return;
    }
    for child in document.child_nodes(node) {
        walk(document, child, filename, problems);
    }
}

fn check_directive(directive: &Directive, filename: &str, problems: &mut Vec<String>) {
    match directive.action.as_str() {
        "for" => {
            if let Err(error) = LoopStatement::parse(&directive.value) {
                problems.push(format!("{filename}: {}: {error}", directive.attribute));
            }
        }
        "on" | "event" | "if" | "elseif" | "else-if" | "class" | "style" if !directive.value.is_empty() => {
            compile(&directive.value, filename, problems);
        }
        "bind" => match (directive.value.is_empty(), directive.argument(0)) {
            (false, _) => compile(&directive.value, filename, problems),
            (true, Some(attribute)) => compile(attribute, filename, problems),
            (true, None) => problems.push(format!("{filename}: {} names no attribute", directive.attribute)),
        },
        _ => {}
    }
}

fn compile(source: &str, filename: &str, problems: &mut Vec<String>) {
    if let Err(error) = rable::compile(source) {
        problems.push(error.report(filename));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_markup_has_no_problems() {
        let markup = r#"<div id="app">
            <p :if="count > 1">{{ count }} items</p>
            <li :for="downloads as index => version">{{ version.name }}</li>
            <a &href @click="open(url)">go</a>
            <style>.a { color: red; }</style>
        </div>"#;
        assert!(check_markup(markup, "page.html").is_empty());
    }

    #[test]
    fn reports_broken_expressions_and_loops() {
        let markup = r#"<div>
            <p :if="count >">{{ 1 + }}</p>
            <li :for="downloads">x</li>
            <pre :norender>{{ ignored ( }}</pre>
        </div>"#;
        let problems = check_markup(markup, "page.html");
        assert_eq!(problems.len(), 3);
        assert!(problems[2].contains("downloads is not a valid loop statement."));
    }
}
