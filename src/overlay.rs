//! The synthetic input, results panel and inline hint.
//!
//! Layout inside the field wrapper after mounting:
//!
//! ```text
//! <input data-ssac-ui role=combobox>      synthetic input, carrier's class
//! <div class=ssac-anchor>                 zero-height positioning anchor
//!   <div class=ssac-panel role=listbox>   absolutely positioned results
//! <p class=ssac-hint aria-live=polite>    inline validation hint
//! <input ...>                             the carrier, hidden
//! ```
//!
//! Rendering is a pure projection of [`FieldState`]; nothing here decides
//! behavior.

use crate::dom::{Document, NodeId};
use crate::locator::UI_MARKER;
use crate::normalize::strip_required_marker_in_place;
use crate::state::FieldState;

/// Class of result rows.
pub const ROW_CLASS: &str = "ssac-item";
/// Attribute holding a row's result index.
pub const ROW_INDEX_ATTR: &str = "data-ssac-index";

/// Nodes of one result row. Rows are created on demand and reused by every
/// later render; rows past the shown results are detached, not dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Row {
    node: NodeId,
    text: NodeId,
    secondary: NodeId,
}

impl Row {
    fn create(doc: &mut Document) -> Self {
        let node = doc.create_element("div");
        let text = doc.append_text(node, "");
        let secondary = doc.create_element("span");
        doc.set_attr(secondary, "class", "ssac-secondary");
        Self {
            node,
            text,
            secondary,
        }
    }

    fn fill(&self, doc: &mut Document, label: &str, secondary: Option<&str>) {
        doc.set_text_content(self.text, label);
        match secondary {
            Some(text) => {
                doc.set_text_content(self.secondary, text);
                if doc.parent(self.secondary) != Some(self.node) {
                    doc.append_child(self.node, self.secondary);
                }
            }
            None => doc.remove(self.secondary),
        }
    }
}

/// The mounted overlay of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    /// Synthetic input.
    pub input: NodeId,
    /// Zero-height anchor after the input.
    pub anchor: NodeId,
    /// Results panel inside the anchor.
    pub panel: NodeId,
    /// Inline hint after the anchor.
    pub hint: NodeId,
    panel_id: String,
    wrapper: NodeId,
    positioned_wrapper: bool,
    label_edits: Vec<(NodeId, String)>,
    rows: Vec<Row>,
}

impl Overlay {
    /// Build the overlay before `carrier` inside `wrapper`.
    pub fn mount(
        doc: &mut Document,
        wrapper: NodeId,
        carrier: NodeId,
        placeholder: &str,
        panel_id: &str,
    ) -> Self {
        let input = doc.create_element("input");
        doc.set_attr(input, "type", "text");
        doc.set_attr(input, "autocomplete", "off");
        doc.set_attr(input, "placeholder", placeholder);
        if let Some(class) = doc.attr(carrier, "class").map(str::to_owned) {
            doc.set_attr(input, "class", &class);
        }
        doc.set_attr(input, UI_MARKER, "1");
        doc.set_attr(input, "role", "combobox");
        doc.set_attr(input, "aria-autocomplete", "list");
        doc.set_attr(input, "aria-expanded", "false");
        doc.set_attr(input, "aria-controls", panel_id);

        let anchor = doc.create_element("div");
        doc.set_attr(anchor, "class", "ssac-anchor");
        doc.set_attr(anchor, UI_MARKER, "1");
        for (prop, value) in [
            ("position", "relative"),
            ("height", "0"),
            ("margin", "0"),
            ("padding", "0"),
            ("border", "0"),
        ] {
            doc.set_style(anchor, prop, value);
        }

        let panel = doc.append_element(
            anchor,
            "div",
            &[
                ("class", "ssac-panel"),
                ("role", "listbox"),
                ("id", panel_id),
                ("hidden", ""),
            ],
        );
        for (prop, value) in [
            ("position", "absolute"),
            ("top", "6px"),
            ("left", "0"),
            ("width", "100%"),
            ("z-index", "9999"),
        ] {
            doc.set_style(panel, prop, value);
        }

        let hint = doc.create_element("p");
        doc.set_attr(hint, "class", "ssac-hint");
        doc.set_attr(hint, "aria-live", "polite");
        doc.set_attr(hint, UI_MARKER, "1");
        doc.set_style(hint, "display", "none");

        let parent = doc.parent(carrier).unwrap_or(wrapper);
        doc.insert_before(parent, input, Some(carrier));
        doc.insert_after(input, anchor);
        doc.insert_after(anchor, hint);

        let positioned_wrapper = matches!(doc.style(wrapper, "position"), None | Some("static"));
        if positioned_wrapper {
            doc.set_style(wrapper, "position", "relative");
        }

        Self {
            input,
            anchor,
            panel,
            hint,
            panel_id: panel_id.to_owned(),
            wrapper,
            positioned_wrapper,
            label_edits: Vec::new(),
            rows: Vec::new(),
        }
    }

    fn row_id(&self, index: usize) -> String {
        format!("{}-opt-{index}", self.panel_id)
    }

    /// Project `state` onto the input and panel.
    pub fn render(&mut self, doc: &mut Document, state: &FieldState, empty_text: &str) {
        if doc.value(self.input) != state.text() {
            doc.set_value(self.input, state.text());
        }
        if state.is_disabled() {
            doc.set_attr(self.input, "disabled", "");
        } else {
            doc.remove_attr(self.input, "disabled");
        }

        let open = state.is_open();
        doc.set_attr(self.input, "aria-expanded", if open { "true" } else { "false" });
        if open {
            doc.remove_attr(self.panel, "hidden");
        } else {
            doc.set_attr(self.panel, "hidden", "");
        }

        let results = state.results();
        let shown = results.len().max(1);
        while self.rows.len() < shown {
            let row = Row::create(doc);
            self.rows.push(row);
        }
        for (index, row) in self.rows.iter().enumerate() {
            let attached = doc.parent(row.node) == Some(self.panel);
            if index < shown && !attached {
                doc.append_child(self.panel, row.node);
            } else if index >= shown && attached {
                doc.remove(row.node);
            }
        }

        if results.is_empty() {
            doc.remove_attr(self.input, "aria-activedescendant");
            if let Some(row) = self.rows.first() {
                doc.replace_attrs(
                    row.node,
                    &[("class", "ssac-item ssac-muted"), ("aria-disabled", "true")],
                );
                row.fill(doc, empty_text, None);
            }
            return;
        }

        for (index, (item, row)) in results.iter().zip(&self.rows).enumerate() {
            let is_active = state.active() == Some(index);
            doc.replace_attrs(
                row.node,
                &[
                    ("class", if is_active { "ssac-item is-active" } else { ROW_CLASS }),
                    ("role", "option"),
                    ("id", &self.row_id(index)),
                    (ROW_INDEX_ATTR, &index.to_string()),
                    ("aria-selected", if is_active { "true" } else { "false" }),
                ],
            );
            row.fill(doc, &item.label, item.secondary.as_deref());
        }
        match state.active() {
            Some(index) if open => doc.set_attr(self.input, "aria-activedescendant", &self.row_id(index)),
            _ => doc.remove_attr(self.input, "aria-activedescendant"),
        }
    }

    /// Replace the placeholder.
    pub fn set_placeholder(&self, doc: &mut Document, placeholder: &str) {
        doc.set_attr(self.input, "placeholder", placeholder);
    }

    /// Show `message`, or hide the hint when `None`.
    pub fn show_hint(&self, doc: &mut Document, message: Option<&str>) {
        match message.filter(|m| !m.is_empty()) {
            Some(message) => {
                doc.set_text_content(self.hint, message);
                doc.remove_style(self.hint, "display");
            }
            None => {
                doc.set_text_content(self.hint, "");
                doc.set_style(self.hint, "display", "none");
            }
        }
    }

    /// Current hint text, if visible.
    pub fn hint_text(&self, doc: &Document) -> Option<String> {
        (doc.style(self.hint, "display") != Some("none")).then(|| doc.text_content(self.hint))
    }

    /// Toggle `aria-invalid` on the synthetic input.
    pub fn set_invalid(&self, doc: &mut Document, invalid: bool) {
        if invalid {
            doc.set_attr(self.input, "aria-invalid", "true");
        } else {
            doc.remove_attr(self.input, "aria-invalid");
        }
    }

    /// Result index of the row at or above `target` inside the panel.
    pub fn row_index(&self, doc: &Document, target: NodeId) -> Option<usize> {
        if !doc.contains(self.panel, target) {
            return None;
        }
        let row = doc.closest(target, |d, n| d.has_class(n, ROW_CLASS) && d.has_attr(n, ROW_INDEX_ATTR))?;
        doc.attr(row, ROW_INDEX_ATTR)?.parse().ok()
    }

    /// Whether `node` belongs to this overlay.
    pub fn owns(&self, doc: &Document, node: NodeId) -> bool {
        [self.input, self.anchor, self.hint]
            .into_iter()
            .any(|part| doc.contains(part, node))
    }

    /// Strip "(required)" markers from the label's text nodes.
    pub fn strip_label_suffix(&mut self, doc: &mut Document, label: NodeId) {
        let text_nodes: Vec<NodeId> = std::iter::once(label)
            .chain(doc.descendants(label))
            .filter(|n| doc.text(*n).is_some())
            .collect();
        for node in text_nodes {
            let Some(before) = doc.text(node).map(str::to_owned) else {
                continue;
            };
            if let Some(after) = strip_required_marker_in_place(&before) {
                doc.set_text_content(node, &after);
                self.label_edits.push((node, before));
            }
        }
    }

    /// Remove every overlay element and undo wrapper and label edits.
    pub fn unmount(&self, doc: &mut Document) {
        for part in [self.input, self.anchor, self.hint] {
            doc.remove(part);
        }
        if self.positioned_wrapper {
            doc.remove_style(self.wrapper, "position");
        }
        for (node, original) in &self.label_edits {
            doc.set_text_content(*node, original);
        }
    }
}
