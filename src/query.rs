//! Document query helpers
//!
//! Small tree-search primitives shared by navigation and both extraction
//! strategies. Matching is by tag name plus one attribute, either exactly
//! (`strict`) or by substring, which is how the site's class lists need to
//! be matched (`class="card product-item-title h5"`).
//!
//! Single-match lookups treat ambiguity as absence: two matches is the same
//! as none, never "take the first".

use scraper::{ElementRef, Html};
use std::collections::VecDeque;

fn descendants_named<'a>(
    node: ElementRef<'a>,
    tag: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    // descendants() starts with the node itself
    node.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name() == tag)
}

/// All descendants of `tag` whose `attr_name` equals (strict) or contains
/// (non-strict) `attr_value`
pub fn find_all<'a>(
    node: ElementRef<'a>,
    tag: &'a str,
    attr_name: &str,
    attr_value: &str,
    strict: bool,
) -> Vec<ElementRef<'a>> {
    descendants_named(node, tag)
        .filter(|el| match el.value().attr(attr_name) {
            Some(value) if strict => value == attr_value,
            Some(value) => value.contains(attr_value),
            None => false,
        })
        .collect()
}

/// The only descendant matching the `find_all` filter, or `None` when there
/// are zero or several
pub fn find_one<'a>(
    node: ElementRef<'a>,
    tag: &'a str,
    attr_name: &str,
    attr_value: &str,
    strict: bool,
) -> Option<ElementRef<'a>> {
    single(find_all(node, tag, attr_name, attr_value, strict))
}

pub fn find_all_by_class<'a>(
    node: ElementRef<'a>,
    tag: &'a str,
    class_name: &str,
    strict: bool,
) -> Vec<ElementRef<'a>> {
    find_all(node, tag, "class", class_name, strict)
}

pub fn find_one_by_class<'a>(
    node: ElementRef<'a>,
    tag: &'a str,
    class_name: &str,
    strict: bool,
) -> Option<ElementRef<'a>> {
    find_one(node, tag, "class", class_name, strict)
}

/// First descendant of `tag` carrying `attr_name` at all, whatever its value
pub fn find_first_with_attribute<'a>(
    node: ElementRef<'a>,
    tag: &'a str,
    attr_name: &str,
) -> Option<ElementRef<'a>> {
    descendants_named(node, tag).find(|el| el.value().attr(attr_name).is_some())
}

/// Like `find_first_with_attribute` but ambiguous matches yield `None`
pub fn find_one_with_attribute<'a>(
    node: ElementRef<'a>,
    tag: &'a str,
    attr_name: &str,
) -> Option<ElementRef<'a>> {
    single(
        descendants_named(node, tag)
            .filter(|el| el.value().attr(attr_name).is_some())
            .collect(),
    )
}

fn single<T>(mut matches: Vec<T>) -> Option<T> {
    if matches.len() == 1 {
        matches.pop()
    } else {
        None
    }
}

/// Attribute value, or an empty string when absent
pub fn attr_value<'a>(node: ElementRef<'a>, attr_name: &str) -> &'a str {
    node.value().attr(attr_name).unwrap_or("")
}

/// Concatenated text content
pub fn inner_text(node: ElementRef<'_>) -> String {
    node.text().collect::<String>()
}

/// Replace every `tag` element in the document with its own children.
///
/// Walks breadth first from the document root. The children of a removed
/// element are spliced into its parent at the element's position, in
/// order, and are still visited afterwards, so nested matches are unwrapped
/// too.
pub fn unwrap_elements(document: &mut Html, tag: &str) {
    let mut queue: VecDeque<_> = document.tree.root().children().map(|child| child.id()).collect();

    while let Some(id) = queue.pop_front() {
        let (children, is_match) = match document.tree.get(id) {
            Some(node) => (
                node.children().map(|child| child.id()).collect::<Vec<_>>(),
                node.value().as_element().is_some_and(|el| el.name() == tag),
            ),
            None => continue,
        };

        queue.extend(children.iter().copied());

        if !is_match {
            continue;
        }

        if let Some(mut node) = document.tree.get_mut(id) {
            for child in children {
                node.insert_id_before(child);
            }
            node.detach();
        }
    }
}

/// Strip hyperlinks out of an HTML fragment, keeping everything inside them
pub fn strip_anchors(fragment_html: &str) -> String {
    let mut fragment = Html::parse_fragment(fragment_html);
    unwrap_elements(&mut fragment, "a");
    fragment.root_element().inner_html()
}
