//! Deciding and writing the value the host form submits.
//!
//! The carrier is the host's own control. It stays in the form, invisible,
//! and is only ever written through [`write_carrier`] right before submit.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::conditions::FieldMode;
use crate::dom::{Document, NodeId};
use crate::options::{FieldConfig, FieldTexts};
use crate::state::FieldState;

/// Why a submit value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// A required field is empty.
    RequiredEmpty,
    /// Text was typed but no item picked.
    TypedNoSelection,
}

impl Rejection {
    /// Stable reason code.
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::RequiredEmpty => "required_empty",
            Rejection::TypedNoSelection => "typed_no_selection",
        }
    }

    /// The hint text for this rejection.
    pub fn message(self, texts: &FieldTexts) -> &str {
        match self {
            Rejection::RequiredEmpty => &texts.required_error,
            Rejection::TypedNoSelection => &texts.error,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decided carrier value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// The field passes.
    pub ok: bool,
    /// What the carrier receives.
    pub value: String,
    /// Why it fails, when it does.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
}

impl Resolution {
    fn accept(value: impl Into<String>) -> Self {
        Self {
            ok: true,
            value: value.into(),
            reason: None,
        }
    }

    fn reject(reason: Rejection) -> Self {
        Self {
            ok: false,
            value: String::new(),
            reason: Some(reason),
        }
    }
}

/// Decide the carrier value, first matching rule wins:
///
/// | State                                  | Value           | ok    |
/// |----------------------------------------|-----------------|-------|
/// | disabled by a condition                | sentinel        | yes   |
/// | free text, non-blank                   | trimmed text    | yes   |
/// | item selected                          | submit value    | yes   |
/// | empty, optional                        | sentinel        | yes   |
/// | empty, required                        | `""`            | no    |
/// | text without selection                 | `""`            | no    |
///
/// # Examples
///
/// ```
/// use autofield::bridge::{Rejection, resolve_submit_value};
/// use autofield::options::FieldConfig;
/// use autofield::state::FieldState;
///
/// let optional = FieldConfig::by_label("School");
/// let res = resolve_submit_value(&FieldState::new(false), &optional);
/// assert!(res.ok);
/// assert_eq!(res.value, "__SS_EMPTY__");
///
/// let required = FieldConfig::by_label("School").required(true);
/// let res = resolve_submit_value(&FieldState::new(true), &required);
/// assert_eq!(res.reason, Some(Rejection::RequiredEmpty));
/// assert_eq!(res.value, "");
/// ```
pub fn resolve_submit_value(state: &FieldState, config: &FieldConfig) -> Resolution {
    let text = state.text().trim();
    if state.mode() == FieldMode::Disabled {
        return Resolution::accept(config.sentinel_value.as_str());
    }
    if state.mode() == FieldMode::FreeText && !text.is_empty() {
        return Resolution::accept(text);
    }
    if let Some(item) = state.selected() {
        return Resolution::accept(config.submit_value.value_for(item));
    }
    match (text.is_empty(), config.is_required) {
        (true, false) => Resolution::accept(config.sentinel_value.as_str()),
        (true, true) => Resolution::reject(Rejection::RequiredEmpty),
        (false, _) => Resolution::reject(Rejection::TypedNoSelection),
    }
}

/// Write `value` through the underlying value setter and notify the host
/// with `input` then `change`. The only writer of carrier values.
pub fn write_carrier(doc: &mut Document, carrier: NodeId, value: &str) {
    doc.set_value(carrier, value);
    doc.dispatch(carrier, "input");
    doc.dispatch(carrier, "change");
}

/// Inline style that hides the carrier while keeping it submittable.
pub const CARRIER_HIDDEN_STYLE: [(&str, &str); 7] = [
    ("position", "absolute"),
    ("opacity", "0"),
    ("pointer-events", "none"),
    ("height", "0"),
    ("margin", "0"),
    ("padding", "0"),
    ("border", "0"),
];

/// The carrier's own inline style and tab index before hiding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarrierSnapshot {
    style: Vec<(&'static str, Option<String>)>,
    tabindex: Option<String>,
}

/// Hide the carrier, returning what it looked like before.
pub fn hide_carrier(doc: &mut Document, carrier: NodeId) -> CarrierSnapshot {
    let snapshot = CarrierSnapshot {
        style: CARRIER_HIDDEN_STYLE
            .iter()
            .map(|(prop, _)| (*prop, doc.style(carrier, prop).map(str::to_owned)))
            .collect(),
        tabindex: doc.attr(carrier, "tabindex").map(str::to_owned),
    };
    apply_hidden(doc, carrier);
    snapshot
}

fn apply_hidden(doc: &mut Document, carrier: NodeId) {
    for (prop, value) in CARRIER_HIDDEN_STYLE {
        doc.set_style(carrier, prop, value);
    }
    doc.set_attr(carrier, "tabindex", "-1");
}

/// Whether the hidden styling is fully in place.
pub fn is_carrier_hidden(doc: &Document, carrier: NodeId) -> bool {
    CARRIER_HIDDEN_STYLE
        .iter()
        .all(|(prop, value)| doc.style(carrier, prop) == Some(*value))
        && doc.attr(carrier, "tabindex") == Some("-1")
}

/// Reapply the hidden styling if the host stripped any of it. Returns
/// whether anything had to be reapplied.
pub fn reassert_carrier(doc: &mut Document, carrier: NodeId) -> bool {
    if is_carrier_hidden(doc, carrier) {
        return false;
    }
    apply_hidden(doc, carrier);
    true
}

/// Put the carrier back the way [`hide_carrier`] found it.
pub fn restore_carrier(doc: &mut Document, carrier: NodeId, snapshot: &CarrierSnapshot) {
    for (prop, value) in &snapshot.style {
        match value {
            Some(v) => doc.set_style(carrier, prop, v),
            None => doc.remove_style(carrier, prop),
        }
    }
    match &snapshot.tabindex {
        Some(t) => doc.set_attr(carrier, "tabindex", t),
        None => doc.remove_attr(carrier, "tabindex"),
    }
}

/// Flag a failed submit on the wrapper and carrier.
pub fn mark_invalid(doc: &mut Document, wrapper: NodeId, carrier: NodeId, reason: Rejection) {
    doc.set_attr(wrapper, "data-ssac-invalid", reason.as_str());
    doc.set_attr(carrier, "aria-invalid", "true");
}

/// Drop the invalid flags [`mark_invalid`] set.
pub fn clear_invalid(doc: &mut Document, wrapper: NodeId, carrier: NodeId) {
    doc.remove_attr(wrapper, "data-ssac-invalid");
    doc.remove_attr(carrier, "aria-invalid");
}
