//! Best-effort rewriting of error text the host renders after a rejected
//! submit.
//!
//! Hosts render their own required-field message some time after the submit
//! event, and may re-render it. The controller therefore retries on a short
//! bounded schedule; the adapter only decides which node, if any, is safe to
//! rewrite right now.

use crate::dom::{Document, NodeId};
use crate::locator::UI_MARKER;

/// Finds and rewrites host-rendered error text inside a field wrapper.
pub trait HostErrorAdapter {
    /// The host's error node for the field in `wrapper`, if rendered yet.
    fn find_error_node(&self, doc: &Document, wrapper: NodeId) -> Option<NodeId>;

    /// Replace the node's text with `message`.
    fn rewrite(&self, doc: &mut Document, node: NodeId, message: &str) {
        doc.set_text_content(node, message);
    }
}

/// Longest text still taken for an error message.
const MAX_ERROR_LEN: usize = 200;

const ERROR_WORDS: [&str; 4] = ["required", "obligator", "krävs", "måste"];

/// Heuristic adapter for hosts without a stable error element:
///
/// 1. `[role=alert]` or `[aria-live]` elements;
/// 2. short text in elements whose class mentions `error`;
/// 3. short `p`, `div`, `span` or `small` text mentioning a required-field
///    word.
///
/// Labels, the wrapper itself, elements holding controls and overlay
/// elements are never rewritten.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicErrorAdapter;

impl HeuristicErrorAdapter {
    fn is_unsafe(doc: &Document, wrapper: NodeId, node: NodeId) -> bool {
        node == wrapper
            || doc.tag(node) == "label"
            || doc.closest(node, |d, n| d.has_attr(n, UI_MARKER)).is_some()
            || doc
                .descendant_elements(node)
                .into_iter()
                .any(|n| matches!(doc.tag(n), "input" | "textarea" | "select" | "button"))
    }

    fn short_text(doc: &Document, node: NodeId) -> Option<String> {
        let text = doc.text_content(node);
        let text = text.trim();
        (!text.is_empty() && text.chars().count() <= MAX_ERROR_LEN).then(|| text.to_owned())
    }
}

impl HostErrorAdapter for HeuristicErrorAdapter {
    fn find_error_node(&self, doc: &Document, wrapper: NodeId) -> Option<NodeId> {
        let candidates: Vec<NodeId> = doc
            .descendant_elements(wrapper)
            .into_iter()
            .filter(|n| !Self::is_unsafe(doc, wrapper, *n))
            .collect();

        let aria = candidates.iter().copied().find(|n| {
            doc.attr(*n, "role") == Some("alert")
                || matches!(doc.attr(*n, "aria-live"), Some("polite" | "assertive"))
        });
        if aria.is_some() {
            return aria;
        }

        let by_class = candidates.iter().copied().find(|n| {
            doc.attr(*n, "class")
                .is_some_and(|c| c.to_lowercase().contains("error"))
                && Self::short_text(doc, *n).is_some()
        });
        if by_class.is_some() {
            return by_class;
        }

        candidates.into_iter().find(|n| {
            matches!(doc.tag(*n), "p" | "div" | "span" | "small")
                && Self::short_text(doc, *n).is_some_and(|t| {
                    let t = t.to_lowercase();
                    ERROR_WORDS.iter().any(|w| t.contains(w))
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapper() -> (Document, NodeId) {
        let mut doc = Document::new();
        let form = doc.append_element(doc.body(), "form", &[]);
        let wrapper = doc.append_element(form, "div", &[("class", "form-item")]);
        let label = doc.append_element(wrapper, "label", &[]);
        doc.append_text(label, "Skola (krävs)");
        doc.append_element(wrapper, "input", &[("type", "text")]);
        (doc, wrapper)
    }

    #[test]
    fn nothing_rendered_yet() {
        let (doc, w) = wrapper();
        assert_eq!(HeuristicErrorAdapter.find_error_node(&doc, w), None);
    }

    #[test]
    fn aria_alert_wins() {
        let (mut doc, w) = wrapper();
        let by_class = doc.append_element(w, "div", &[("class", "field-error")]);
        doc.append_text(by_class, "Something");
        let alert = doc.append_element(w, "span", &[("role", "alert")]);
        assert_eq!(HeuristicErrorAdapter.find_error_node(&doc, w), Some(alert));
    }

    #[test]
    fn error_class_needs_short_text() {
        let (mut doc, w) = wrapper();
        doc.append_element(w, "div", &[("class", "form-Error")]);
        let real = doc.append_element(w, "div", &[("class", "form-Error")]);
        doc.append_text(real, "Please fill in");
        assert_eq!(HeuristicErrorAdapter.find_error_node(&doc, w), Some(real));
    }

    #[test]
    fn text_fallback_matches_required_words() {
        let (mut doc, w) = wrapper();
        let note = doc.append_element(w, "small", &[]);
        doc.append_text(note, "Detta fält måste fyllas i");
        assert_eq!(HeuristicErrorAdapter.find_error_node(&doc, w), Some(note));
    }

    #[test]
    fn never_picks_layout_wrappers_or_overlay_hint() {
        let (mut doc, w) = wrapper();
        let hint = doc.append_element(w, "p", &[("aria-live", "polite"), (UI_MARKER, "1")]);
        doc.append_text(hint, "required");
        let layout = doc.append_element(w, "div", &[("class", "error-wrap")]);
        doc.append_text(layout, "required");
        doc.append_element(layout, "input", &[]);
        assert_eq!(HeuristicErrorAdapter.find_error_node(&doc, w), None);
    }

    #[test]
    fn rewrite_replaces_text() {
        let (mut doc, w) = wrapper();
        let alert = doc.append_element(w, "div", &[("role", "alert")]);
        doc.append_text(alert, "This field is required.");
        HeuristicErrorAdapter.rewrite(&mut doc, alert, "Välj en skola.");
        assert_eq!(doc.text_content(alert), "Välj en skola.");
    }
}
