//! `{{ expression }}` placeholders in text nodes.

use std::ops::Range;
use std::rc::Rc;

use rable_scene::NodeId;

use crate::context::Context;
use crate::directive::is_norender;
use crate::hub::Hub;

/// Byte range and inner source of every `{{ … }}` in `text`. Placeholders are
/// matched lazily and never span a line break.
pub fn placeholders(text: &str) -> Vec<(Range<usize>, &str)> {
    let mut found = Vec::new();
    let mut offset = 0;
    while let Some(start) = text[offset..].find("{{").map(|start| offset + start) {
        let body_start = start + 2;
        let line_end = text[body_start..]
            .find('\n')
            .map_or(text.len(), |end| body_start + end);
        match text[body_start..line_end].find("}}") {
            Some(end) => {
                let body_end = body_start + end;
                found.push((start..body_end + 2, &text[body_start..body_end]));
                offset = body_end + 2;
            }
            None => offset = start + 1,
        }
    }
    found
}

/// Replace every placeholder of `text` with `replace(inner source)`.
pub fn substitute(text: &str, mut replace: impl FnMut(&str) -> String) -> String {
    let mut output = String::with_capacity(text.len());
    let mut copied = 0;
    for (range, source) in placeholders(text) {
        output.push_str(&text[copied..range.start]);
        output.push_str(&replace(source));
        copied = range.end;
    }
    output.push_str(&text[copied..]);
    output
}

/// Wire every templated text node below `element` to `hub`.
pub(crate) fn process(context: &Rc<Context>, element: NodeId, hub: &Rc<Hub>) {
    let document = &context.document;
    if context.marks.skips_text(element) {
        return;
    }
    for node in document.child_nodes(element) {
        if let Some(text) = document.text(node) {
            wire(context, node, text, hub);
        } else if !document.child_nodes(node).is_empty()
            && !context.marks.skips_children(node)
            && !is_norender(document, node)
        {
            process(context, node, hub);
        }
    }
}

fn wire(context: &Rc<Context>, node: NodeId, template: String, hub: &Rc<Hub>) {
    let found = placeholders(&template);
    if found.is_empty() {
        return;
    }
    let compiled: Vec<_> = found
        .iter()
        .map(|(_, source)| context.compile(source, &format!("{{{{{source}}}}}")))
        .collect();
    log::trace!("[text] {} placeholder(s) in {node}", compiled.len());

    let listener_context = Rc::clone(context);
    let listener_hub = Rc::clone(hub);
    hub.subscribe(move |_| {
        let mut programs = compiled.iter();
        let rendered = substitute(&template, |_| {
            let Some(Some(program)) = programs.next() else {
                return String::new();
            };
            match listener_context.evaluate(&listener_hub, program) {
                Ok(value) => value.to_string(),
                Err(error) => {
                    log::error!("[rable] {{{{{}}}}}: {error}", program.source);
                    String::new()
                }
            }
        });
        listener_context.document.set_text(node, &rendered);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_lazy_and_single_line() {
        let text = "{{ a }} and {{ b }}";
        let found: Vec<&str> = placeholders(text).into_iter().map(|(_, source)| source).collect();
        assert_eq!(found, vec![" a ", " b "]);

        let found: Vec<&str> = placeholders("{{ broken\n}} {{ ok }}")
            .into_iter()
            .map(|(_, source)| source)
            .collect();
        assert_eq!(found, vec![" ok "]);
        assert!(placeholders("no braces {here}").is_empty());
    }

    #[test]
    fn substitute_keeps_surrounding_text() {
        let rendered = substitute("Version {{ v }} ({{ n }})", |source| source.trim().to_uppercase());
        assert_eq!(rendered, "Version V (N)");
        assert_eq!(substitute("plain", |_| unreachable!()), "plain");
    }
}
