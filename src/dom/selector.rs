//! Configured CSS selectors, parsed and matched by `scraper`.

use std::fmt;

use super::{Document, NodeId};
use crate::error::SelectorError;

/// A parsed selector list.
///
/// # Examples
///
/// ```
/// use autofield::dom::{Document, Selector};
///
/// let mut doc = Document::new();
/// let form = doc.append_element(doc.body(), "form", &[]);
/// let input = doc.append_element(form, "input", &[("name", "school"), ("class", "a b")]);
///
/// let sel = Selector::parse("form input[name=school].b").unwrap();
/// assert_eq!(doc.query_selector(doc.body(), &sel), Some(input));
/// ```
#[derive(Clone)]
pub struct Selector {
    source: String,
    compiled: scraper::Selector,
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.source).finish()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Selector {}

impl Selector {
    /// Parse a selector list.
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        if source.trim().is_empty() {
            return Err(SelectorError::Empty);
        }
        let compiled = scraper::Selector::parse(source).map_err(|err| SelectorError::Invalid {
            selector: source.to_owned(),
            message: err.to_string(),
        })?;
        Ok(Self {
            source: source.to_owned(),
            compiled,
        })
    }

    /// The original selector text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `node` is an element matching any selector of the list.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        doc.element(node)
            .is_some_and(|element| self.compiled.matches(&element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let form = doc.append_element(doc.body(), "form", &[("id", "f")]);
        let field = doc.append_element(form, "div", &[("class", "form-item field")]);
        let input = doc.append_element(
            field,
            "input",
            &[("type", "checkbox"), ("name", "not-listed"), ("class", "cb")],
        );
        (doc, form, field, input)
    }

    fn sel(source: &str) -> Selector {
        Selector::parse(source).unwrap()
    }

    #[test]
    fn matches_type_id_class_and_attribute() {
        let (doc, form, field, input) = fixture();
        assert!(sel("form").matches(&doc, form));
        assert!(sel("#f").matches(&doc, form));
        assert!(sel(".field.form-item").matches(&doc, field));
        assert!(sel("input[type=checkbox]").matches(&doc, input));
        assert!(sel("input[type=\"checkbox\"]").matches(&doc, input));
        assert!(sel("[name^=not]").matches(&doc, input));
        assert!(sel("[name$=listed]").matches(&doc, input));
        assert!(sel("[class*='c']").matches(&doc, input));
        assert!(!sel("input[type=text]").matches(&doc, input));
    }

    #[test]
    fn descendant_and_child_combinators() {
        let (doc, _, _, input) = fixture();
        assert!(sel("form input").matches(&doc, input));
        assert!(sel("#f .field > input").matches(&doc, input));
        assert!(!sel("form > input").matches(&doc, input));
    }

    #[test]
    fn sibling_combinators_and_negation() {
        let (mut doc, _, field, input) = fixture();
        let label = doc.create_element("label");
        doc.insert_before(field, label, Some(input));
        let note = doc.append_element(field, "input", &[("name", "note")]);

        assert!(sel("label + input").matches(&doc, input));
        assert!(!sel("label + input").matches(&doc, note));
        assert!(sel("label ~ input").matches(&doc, note));
        assert!(sel("input:not([type])").matches(&doc, note));
        assert!(!sel("input:not([type])").matches(&doc, input));
    }

    #[test]
    fn comma_groups_match_any() {
        let (doc, form, _, input) = fixture();
        let group = sel("textarea, input[type=checkbox]");
        assert!(group.matches(&doc, input));
        assert!(!group.matches(&doc, form));
    }

    #[test]
    fn quoted_comma_stays_in_the_value() {
        let mut doc = Document::new();
        let input = doc.append_element(doc.body(), "input", &[("name", "a,b")]);
        assert!(sel("input[name=\"a,b\"]").matches(&doc, input));
    }

    #[test]
    fn text_nodes_never_match() {
        let mut doc = Document::new();
        let text = doc.append_text(doc.body(), "School");
        assert!(!sel("*").matches(&doc, text));
        assert!(sel("*").matches(&doc, doc.body()));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(Selector::parse(""), Err(SelectorError::Empty));
        assert_eq!(Selector::parse("   "), Err(SelectorError::Empty));
        assert!(matches!(
            Selector::parse("input!"),
            Err(SelectorError::Invalid { .. })
        ));
        assert!(Selector::parse("a,,b").is_err());
        assert!(Selector::parse("input > ").is_err());
    }
}
