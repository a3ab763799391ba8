//! Finding the label, wrapper and carrier of a configured field.
//!
//! Everything here is a pure read over [`DomQuery`]; failures come back as
//! [`LocateError`] values for the controller to log.
//!
//! # Examples
//!
//! ```
//! use autofield::dom::Document;
//! use autofield::locator::{Target, locate};
//!
//! let mut doc = Document::new();
//! let form = doc.append_element(doc.body(), "form", &[]);
//! let field = doc.append_element(form, "div", &[("class", "form-item")]);
//! let label = doc.append_element(field, "label", &[]);
//! doc.append_text(label, "Skola *");
//! let input = doc.append_element(field, "input", &[("type", "text")]);
//!
//! let found = locate(&doc, form, &Target::Label("skola".into())).unwrap();
//! assert_eq!(found.label, Some(label));
//! assert_eq!(found.wrapper, field);
//! assert_eq!(found.carrier, input);
//! ```

use crate::dom::{Document, NodeId, Selector};
use crate::error::{LocateError, SelectorError};
use crate::normalize::normalize_label;
use crate::options::FieldConfig;

/// Ancestor levels walked from a label looking for its wrapper.
pub const MAX_WRAPPER_DEPTH: usize = 12;

/// Marks elements created by the overlay so they are never taken for host
/// controls.
pub const UI_MARKER: &str = "data-ssac-ui";

/// Read access to the page the locator needs.
pub trait DomQuery {
    /// Parent of `node`.
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    /// Lowercase tag name, empty for text.
    fn tag(&self, node: NodeId) -> &str;
    /// Attribute value.
    fn attr(&self, node: NodeId, name: &str) -> Option<&str>;
    /// Concatenated descendant text.
    fn text_content(&self, node: NodeId) -> String;
    /// Element descendants in document order, `scope` excluded.
    fn elements_under(&self, scope: NodeId) -> Vec<NodeId>;
    /// Whether `node` matches `selector`.
    fn matches(&self, node: NodeId, selector: &Selector) -> bool;

    /// Whether `ancestor` is `node` or one of its ancestors.
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// First element under `scope` matching `selector`.
    fn query(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.elements_under(scope)
            .into_iter()
            .find(|n| self.matches(*n, selector))
    }
}

impl DomQuery for Document {
    fn parent(&self, node: NodeId) -> Option<NodeId> {
        Document::parent(self, node)
    }

    fn tag(&self, node: NodeId) -> &str {
        Document::tag(self, node)
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        Document::attr(self, node, name)
    }

    fn text_content(&self, node: NodeId) -> String {
        Document::text_content(self, node)
    }

    fn elements_under(&self, scope: NodeId) -> Vec<NodeId> {
        self.descendant_elements(scope)
    }

    fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        selector.matches(self, node)
    }
}

/// How a field is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// By label text.
    Label(String),
    /// By explicit selectors.
    Selectors {
        /// The carrier control.
        carrier: Selector,
        /// The label, if not `label[for=<carrier id>]`.
        label: Option<Selector>,
        /// The wrapper, if not the nearest known field container.
        wrapper: Option<Selector>,
    },
}

impl Target {
    /// The target of `field`; the label wins when both are configured.
    pub fn of(field: &FieldConfig) -> Result<Option<Self>, SelectorError> {
        if let Some(label) = &field.target_label {
            return Ok(Some(Target::Label(label.clone())));
        }
        let Some(sel) = &field.selectors else {
            return Ok(None);
        };
        let optional = |s: &Option<String>| s.as_deref().map(Selector::parse).transpose();
        Ok(Some(Target::Selectors {
            carrier: Selector::parse(&sel.carrier)?,
            label: optional(&sel.label)?,
            wrapper: optional(&sel.wrapper)?,
        }))
    }
}

/// A located field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    /// The label, when one was found.
    pub label: Option<NodeId>,
    /// Smallest container holding label and carrier.
    pub wrapper: NodeId,
    /// The original control the host submits.
    pub carrier: NodeId,
}

fn input_type<D: DomQuery + ?Sized>(dom: &D, node: NodeId) -> String {
    dom.attr(node, "type").unwrap_or_default().trim().to_ascii_lowercase()
}

fn is_overlay<D: DomQuery + ?Sized>(dom: &D, node: NodeId) -> bool {
    dom.attr(node, UI_MARKER).is_some()
}

/// `input[type=text]`, `input` without a type, or `textarea`.
pub fn is_text_control<D: DomQuery + ?Sized>(dom: &D, node: NodeId) -> bool {
    match dom.tag(node) {
        "textarea" => true,
        "input" => matches!(input_type(dom, node).as_str(), "" | "text"),
        _ => false,
    }
}

/// Any form control: `input`, `select`, `textarea`.
pub fn is_control<D: DomQuery + ?Sized>(dom: &D, node: NodeId) -> bool {
    matches!(dom.tag(node), "input" | "select" | "textarea")
}

/// First `<label>` in `form` whose normalized text equals or contains the
/// normalized `text`, in document order.
pub fn find_label<D: DomQuery + ?Sized>(dom: &D, form: NodeId, text: &str) -> Option<NodeId> {
    let want = normalize_label(text);
    if want.is_empty() {
        return None;
    }
    dom.elements_under(form)
        .into_iter()
        .filter(|n| dom.tag(*n) == "label")
        .find(|n| {
            let have = normalize_label(&dom.text_content(*n));
            have == want || have.contains(want.as_str())
        })
}

/// Walk up from `label` to the first ancestor (the label included) holding a
/// text control, never reaching `form`.
pub fn find_wrapper<D: DomQuery + ?Sized>(dom: &D, form: NodeId, label: NodeId) -> Option<NodeId> {
    let mut cur = Some(label);
    for _ in 0..MAX_WRAPPER_DEPTH {
        let el = cur?;
        if el == form {
            return None;
        }
        let has_control = dom
            .elements_under(el)
            .into_iter()
            .any(|n| is_text_control(dom, n) && !is_overlay(dom, n));
        if has_control {
            return Some(el);
        }
        cur = dom.parent(el);
    }
    None
}

/// The primary carrier: first text-like control in `wrapper`, skipping
/// hidden, submit and button inputs and overlay elements.
pub fn find_carrier<D: DomQuery + ?Sized>(dom: &D, wrapper: NodeId) -> Option<NodeId> {
    dom.elements_under(wrapper).into_iter().find(|n| {
        !is_overlay(dom, *n)
            && !matches!(input_type(dom, *n).as_str(), "hidden" | "submit" | "button")
            && is_text_control(dom, *n)
    })
}

/// A condition control: checkbox, then radio, select, textarea, text input.
pub fn find_condition_control<D: DomQuery + ?Sized>(dom: &D, wrapper: NodeId) -> Option<NodeId> {
    let controls: Vec<NodeId> = dom
        .elements_under(wrapper)
        .into_iter()
        .filter(|n| is_control(dom, *n) && !is_overlay(dom, *n))
        .collect();
    let of_kind = |pred: &dyn Fn(NodeId) -> bool| controls.iter().copied().find(|n| pred(*n));
    of_kind(&|n: NodeId| dom.tag(n) == "input" && input_type(dom, n) == "checkbox")
        .or_else(|| of_kind(&|n: NodeId| dom.tag(n) == "input" && input_type(dom, n) == "radio"))
        .or_else(|| of_kind(&|n: NodeId| dom.tag(n) == "select"))
        .or_else(|| of_kind(&|n: NodeId| dom.tag(n) == "textarea"))
        .or_else(|| of_kind(&|n: NodeId| is_text_control(dom, n)))
}

const WRAPPER_CLASSES: [&str; 3] = ["field", "form-item", "form-field"];

fn has_class<D: DomQuery + ?Sized>(dom: &D, node: NodeId, class: &str) -> bool {
    dom.attr(node, "class")
        .is_some_and(|c| c.split_whitespace().any(|c| c == class))
}

fn locate_by_selectors<D: DomQuery + ?Sized>(
    dom: &D,
    form: NodeId,
    carrier_sel: &Selector,
    label_sel: Option<&Selector>,
    wrapper_sel: Option<&Selector>,
) -> Result<Located, LocateError> {
    let carrier = dom
        .query(form, carrier_sel)
        .ok_or_else(|| LocateError::SelectorNotMatched {
            selector: carrier_sel.to_string(),
        })?;

    let closest = |pred: &dyn Fn(NodeId) -> bool| {
        let mut cur = dom.parent(carrier);
        while let Some(n) = cur {
            if n == form {
                return None;
            }
            if pred(n) {
                return Some(n);
            }
            cur = dom.parent(n);
        }
        None
    };
    let wrapper = match wrapper_sel {
        Some(sel) => closest(&|n: NodeId| dom.matches(n, sel)).ok_or_else(|| {
            LocateError::SelectorNotMatched {
                selector: sel.to_string(),
            }
        })?,
        None => closest(&|n: NodeId| WRAPPER_CLASSES.iter().any(|c| has_class(dom, n, c)))
            .or_else(|| dom.parent(carrier))
            .ok_or(LocateError::CarrierNotFound)?,
    };

    let label = match label_sel {
        Some(sel) => dom.query(form, sel),
        None => dom.attr(carrier, "id").and_then(|id| {
            dom.elements_under(form)
                .into_iter()
                .find(|n| dom.tag(*n) == "label" && dom.attr(*n, "for") == Some(id))
        }),
    };
    Ok(Located {
        label,
        wrapper,
        carrier,
    })
}

fn locate_with<D: DomQuery + ?Sized>(
    dom: &D,
    form: NodeId,
    target: &Target,
    carrier_of: fn(&D, NodeId) -> Option<NodeId>,
) -> Result<Located, LocateError> {
    match target {
        Target::Label(text) => {
            let label = find_label(dom, form, text).ok_or_else(|| LocateError::LabelNotFound {
                label: text.clone(),
            })?;
            let wrapper =
                find_wrapper(dom, form, label).ok_or_else(|| LocateError::WrapperNotFound {
                    label: text.clone(),
                })?;
            let carrier = carrier_of(dom, wrapper).ok_or(LocateError::CarrierNotFound)?;
            Ok(Located {
                label: Some(label),
                wrapper,
                carrier,
            })
        }
        Target::Selectors {
            carrier,
            label,
            wrapper,
        } => locate_by_selectors(dom, form, carrier, label.as_ref(), wrapper.as_ref()),
    }
}

/// Locate the primary field for `target` inside `form`.
pub fn locate<D: DomQuery + ?Sized>(
    dom: &D,
    form: NodeId,
    target: &Target,
) -> Result<Located, LocateError> {
    locate_with(dom, form, target, find_carrier::<D>)
}

/// Locate a condition control by label text, preferring checkboxes.
pub fn locate_condition<D: DomQuery + ?Sized>(
    dom: &D,
    form: NodeId,
    label: &str,
) -> Result<Located, LocateError> {
    let label_node = find_label(dom, form, label).ok_or_else(|| LocateError::LabelNotFound {
        label: label.to_owned(),
    })?;
    // Condition wrappers may hold no text control at all (a lone checkbox).
    let mut cur = Some(label_node);
    for _ in 0..MAX_WRAPPER_DEPTH {
        let Some(el) = cur else { break };
        if el == form {
            break;
        }
        if let Some(control) = find_condition_control(dom, el) {
            return Ok(Located {
                label: Some(label_node),
                wrapper: el,
                carrier: control,
            });
        }
        cur = dom.parent(el);
    }
    Err(LocateError::WrapperNotFound {
        label: label.to_owned(),
    })
}
