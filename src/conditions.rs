//! Other controls of the same form that switch a field between list-driven,
//! free-text and disabled modes.

use std::collections::BTreeMap;

use tracing::debug;

use crate::dom::{Document, NodeId, Selector};
use crate::locator::{DomQuery, locate_condition};
use crate::options::ConditionControls;

/// What a field accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldMode {
    /// Only items picked from the list.
    #[default]
    List,
    /// Typed text verbatim; matching and the panel are suppressed.
    FreeText,
    /// Nothing; the field submits its sentinel.
    Disabled,
}

/// Current value of one bound control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionValue {
    /// A checkbox.
    Checked(bool),
    /// A radio group: the checked radio's value, if any.
    Choice(Option<String>),
    /// A select, textarea or text input.
    Text(String),
}

impl ConditionValue {
    /// Whether the control is "on": checked, a radio chosen, or non-blank
    /// text.
    pub fn is_set(&self) -> bool {
        match self {
            ConditionValue::Checked(on) => *on,
            ConditionValue::Choice(choice) => choice.is_some(),
            ConditionValue::Text(text) => !text.trim().is_empty(),
        }
    }
}

/// Values of every resolved control, by configured name.
pub type ConditionValues = BTreeMap<String, ConditionValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    name: String,
    control: NodeId,
}

/// Resolved condition controls of one attached field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionBinding {
    form: NodeId,
    controls: Vec<Bound>,
    events: Vec<String>,
}

fn input_type(doc: &Document, node: NodeId) -> String {
    doc.attr(node, "type")
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_radio(doc: &Document, node: NodeId) -> bool {
    doc.tag(node) == "input" && input_type(doc, node) == "radio"
}

impl ConditionBinding {
    /// Resolve `controls` inside `form`. Controls that cannot be found are
    /// left out of the value map.
    pub fn resolve(doc: &Document, form: NodeId, controls: &ConditionControls) -> Self {
        let mut bound = Vec::new();
        for (name, selector) in &controls.selector_map {
            let control = Selector::parse(selector)
                .ok()
                .and_then(|sel| doc.query_selector(form, &sel));
            match control {
                Some(control) => bound.push(Bound {
                    name: name.clone(),
                    control,
                }),
                None => debug!(condition = %name, selector = %selector, "condition control not found"),
            }
        }
        for (name, label) in &controls.by_label {
            match locate_condition(doc, form, label) {
                Ok(found) => bound.push(Bound {
                    name: name.clone(),
                    control: found.carrier,
                }),
                Err(err) => debug!(condition = %name, error = %err, "condition control not found"),
            }
        }
        Self {
            form,
            controls: bound,
            events: controls.events.clone(),
        }
    }

    /// Whether a bound control left the form, or a configured control was
    /// not found when this binding was resolved.
    pub fn is_stale(&self, doc: &Document, controls: &ConditionControls) -> bool {
        let configured = controls.selector_map.len() + controls.by_label.len();
        self.controls.len() < configured
            || self
                .controls
                .iter()
                .any(|b| !doc.is_connected(b.control) || !doc.contains(self.form, b.control))
    }

    /// Whether no control was resolved.
    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// Radios sharing `control`'s group inside the form.
    fn group(&self, doc: &Document, control: NodeId) -> Vec<NodeId> {
        match doc.attr(control, "name") {
            Some(name) => doc
                .descendant_elements(self.form)
                .into_iter()
                .filter(|n| is_radio(doc, *n) && doc.attr(*n, "name") == Some(name))
                .collect(),
            None => vec![control],
        }
    }

    fn read(&self, doc: &Document, control: NodeId) -> ConditionValue {
        match doc.tag(control) {
            "input" if input_type(doc, control) == "checkbox" => {
                ConditionValue::Checked(doc.checked(control))
            }
            "input" if is_radio(doc, control) => ConditionValue::Choice(
                self.group(doc, control)
                    .into_iter()
                    .find(|r| doc.checked(*r))
                    .map(|r| doc.attr(r, "value").unwrap_or("on").to_owned()),
            ),
            _ => ConditionValue::Text(doc.value(control).to_owned()),
        }
    }

    /// Current values by name.
    ///
    /// # Examples
    ///
    /// ```
    /// use autofield::conditions::{ConditionBinding, ConditionValue};
    /// use autofield::dom::Document;
    /// use autofield::options::ConditionControls;
    ///
    /// let mut doc = Document::new();
    /// let form = doc.append_element(doc.body(), "form", &[]);
    /// let cb = doc.append_element(form, "input", &[("type", "checkbox"), ("id", "nf")]);
    ///
    /// let binding = ConditionBinding::resolve(&doc, form, &ConditionControls::default().selector("notFound", "#nf"));
    /// assert_eq!(binding.values(&doc)["notFound"], ConditionValue::Checked(false));
    /// doc.set_checked(cb, true);
    /// assert_eq!(binding.values(&doc)["notFound"], ConditionValue::Checked(true));
    /// ```
    pub fn values(&self, doc: &Document) -> ConditionValues {
        self.controls
            .iter()
            .filter(|b| DomQuery::contains(doc, self.form, b.control))
            .map(|b| (b.name.clone(), self.read(doc, b.control)))
            .collect()
    }

    /// Whether an `event` at `target` should re-evaluate the mode.
    pub fn watches(&self, doc: &Document, target: NodeId, event: &str) -> bool {
        if !self.events.iter().any(|e| e == event) {
            return false;
        }
        self.controls.iter().any(|b| {
            b.control == target
                || (is_radio(doc, b.control)
                    && is_radio(doc, target)
                    && self.group(doc, b.control).contains(&target))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_with_controls() -> (Document, NodeId, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let form = doc.append_element(doc.body(), "form", &[]);

        let item = doc.append_element(form, "div", &[("class", "form-item")]);
        let label = doc.append_element(item, "label", &[]);
        doc.append_text(label, "Ort");
        let city = doc.append_element(item, "select", &[("name", "city")]);

        let kind = doc.append_element(form, "div", &[]);
        let a = doc.append_element(kind, "input", &[("type", "radio"), ("name", "kind"), ("value", "school")]);
        let b = doc.append_element(kind, "input", &[("type", "radio"), ("name", "kind"), ("value", "other")]);
        (doc, form, city, a, b)
    }

    #[test]
    fn radio_group_reports_checked_value() {
        let (mut doc, form, _, _, b) = form_with_controls();
        let binding = ConditionBinding::resolve(
            &doc,
            form,
            &ConditionControls::default().selector("kind", "input[name=kind]"),
        );
        assert_eq!(binding.values(&doc)["kind"], ConditionValue::Choice(None));
        doc.set_checked(b, true);
        assert_eq!(
            binding.values(&doc)["kind"],
            ConditionValue::Choice(Some("other".into()))
        );
    }

    #[test]
    fn label_bound_select_reads_text() {
        let (mut doc, form, city, _, _) = form_with_controls();
        let binding = ConditionBinding::resolve(&doc, form, &ConditionControls::default().label("city", "ort"));
        doc.set_value(city, "Lund");
        assert_eq!(binding.values(&doc)["city"], ConditionValue::Text("Lund".into()));
    }

    #[test]
    fn missing_controls_are_absent() {
        let (doc, form, _, _, _) = form_with_controls();
        let binding = ConditionBinding::resolve(
            &doc,
            form,
            &ConditionControls::default()
                .selector("gone", "#nope")
                .label("also", "Telefon"),
        );
        assert!(binding.is_empty());
        assert!(binding.values(&doc).is_empty());
    }

    #[test]
    fn watches_bound_events_and_radio_siblings() {
        let (doc, form, city, a, b) = form_with_controls();
        let binding = ConditionBinding::resolve(
            &doc,
            form,
            &ConditionControls::default().selector("kind", "input[value=school]"),
        );
        assert!(binding.watches(&doc, a, "change"));
        assert!(binding.watches(&doc, b, "input"));
        assert!(!binding.watches(&doc, b, "blur"));
        assert!(!binding.watches(&doc, city, "change"));
    }

    #[test]
    fn replaced_control_makes_binding_stale() {
        let (mut doc, form, city, _, _) = form_with_controls();
        let controls = ConditionControls::default()
            .label("city", "Ort")
            .selector("kind", "input[name=kind]");
        let binding = ConditionBinding::resolve(&doc, form, &controls);
        assert!(!binding.is_stale(&doc, &controls));

        let item = doc.parent(city).unwrap();
        doc.remove(city);
        assert!(binding.is_stale(&doc, &controls));
        let fresh = doc.append_element(item, "select", &[("name", "city")]);
        let rebound = ConditionBinding::resolve(&doc, form, &controls);
        assert!(!rebound.is_stale(&doc, &controls));
        doc.set_value(fresh, "Malmö");
        assert_eq!(rebound.values(&doc)["city"], ConditionValue::Text("Malmö".into()));
    }

    #[test]
    fn unresolved_control_keeps_binding_stale() {
        let (doc, form, _, _, _) = form_with_controls();
        let controls = ConditionControls::default().selector("gone", "#later");
        assert!(ConditionBinding::resolve(&doc, form, &controls).is_stale(&doc, &controls));
    }

    #[test]
    fn is_set_per_kind() {
        assert!(ConditionValue::Checked(true).is_set());
        assert!(!ConditionValue::Choice(None).is_set());
        assert!(!ConditionValue::Text("  ".into()).is_set());
    }
}
