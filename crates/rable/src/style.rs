//! Component-scoped stylesheets, injected into the document head once per type.

use std::cell::RefCell;

use indexmap::IndexSet;
use rable_scene::{Document, NodeId};

/// Tracks which component types already have their `<style>` in the head.
#[derive(Default)]
pub struct StyleRegistry {
    injected: RefCell<IndexSet<String>>,
}

impl StyleRegistry {
    pub fn is_injected(&self, component_type: &str) -> bool {
        self.injected.borrow().contains(component_type)
    }

    pub fn injected(&self) -> Vec<String> {
        self.injected.borrow().iter().cloned().collect()
    }

    /// Append `css`, scoped to `component_type`, to the head of `document`.
    /// Returns false when the type already has a stylesheet.
    pub fn inject(&self, document: &Document, component_type: &str, css: &str, root: NodeId) -> bool {
        if self.is_injected(component_type) || has_style_for(document, component_type) {
            self.injected.borrow_mut().insert(component_type.to_string());
            return false;
        }
        let scoped = scope_css(css, component_type, |selector| match selector {
            RootSelector::Class(class) => document.has_class(root, class),
            RootSelector::Id(id) => document.attribute(root, "id").as_deref() == Some(id),
        });
        let style = document.create_element("style");
        document.set_attribute(style, "component-type", component_type);
        document.set_inner_text(style, &scoped);
        document.append_child(document.head(), style);
        self.injected.borrow_mut().insert(component_type.to_string());
        log::debug!("[style] injected stylesheet for '{component_type}'");
        true
    }
}

fn has_style_for(document: &Document, component_type: &str) -> bool {
    document.children(document.head()).into_iter().any(|node| {
        document.tag_name(node).as_deref() == Some("style")
            && document.attribute(node, "component-type").as_deref() == Some(component_type)
    })
}

/// Leading simple selector of a rule, tested against the component root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSelector<'css> {
    Class(&'css str),
    Id(&'css str),
}

fn leading_name(selector: &str) -> Option<(RootSelector<'_>, usize)> {
    let is_class = match selector.chars().next()? {
        '.' => true,
        '#' => false,
        _ => return None,
    };
    let rest = &selector[1..];
    if !rest.starts_with(|character: char| character.is_ascii_alphabetic()) {
        return None;
    }
    let length = rest
        .find(|character: char| !(character.is_alphanumeric() || matches!(character, '_' | '-')))
        .unwrap_or(rest.len());
    let name = &rest[..length];
    let selector = if is_class {
        RootSelector::Class(name)
    } else {
        RootSelector::Id(name)
    };
    Some((selector, length + 1))
}

/// Rewrite every rule of `css` so it only applies inside `component_type`.
///
/// A selector starting with a class or id that `matches_root` accepts is
/// qualified in place (`.card:hover` becomes `.card[component-type=T]:hover`);
/// every other selector gets a `[component-type=T] ` ancestor prefix.
pub fn scope_css(css: &str, component_type: &str, matches_root: impl Fn(RootSelector<'_>) -> bool) -> String {
    let css = css.replace('\n', "");
    let qualifier = format!("[component-type={component_type}]");
    let mut output = String::with_capacity(css.len() * 2);
    let mut rest = css.as_str();
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|close| open + close) else {
            break;
        };
        let selectors = rest[..open]
            .split(',')
            .map(|selector| {
                let selector = selector.trim();
                match leading_name(selector) {
                    Some((name, end)) if matches_root(name) => {
                        format!("{}{qualifier}{}", &selector[..end], &selector[end..])
                    }
                    _ => format!("{qualifier} {selector}"),
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        output.push_str(&selectors);
        output.push_str(" {");
        output.push_str(&rest[open + 1..=close]);
        rest = &rest[close + 1..];
    }
    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_selectors_are_qualified_and_others_prefixed() {
        let css = ".link:hover, .icon { color: red; }\n#download {margin: 0}\nspan{ x: y }";
        let scoped = scope_css(css, "download-link", |selector| {
            matches!(selector, RootSelector::Class("link") | RootSelector::Id("download"))
        });
        assert_eq!(
            scoped,
            ".link[component-type=download-link]:hover, [component-type=download-link] .icon { color: red; }\
             #download[component-type=download-link] {margin: 0}\
             [component-type=download-link] span { x: y }"
        );
    }

    #[test]
    fn inject_once_per_type() {
        let document = Document::parse("<body><div class=\"card\"></div></body>");
        let root = document.children(document.body())[0];
        let registry = StyleRegistry::default();
        assert!(registry.inject(&document, "card-view", ".card { a: b }", root));
        assert!(!registry.inject(&document, "card-view", ".card { a: b }", root));
        let styles = document.query_selector_all("style").unwrap();
        assert_eq!(styles.len(), 1);
        assert_eq!(
            document.inner_text(styles[0]),
            ".card[component-type=card-view] { a: b }"
        );
        assert_eq!(registry.injected(), vec!["card-view".to_string()]);
    }
}
