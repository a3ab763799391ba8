//! Page events routed into the [`Enhancer`](crate::controller::Enhancer).

use crate::dom::NodeId;

/// Kind of a page event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A control's value changed while typing. The new value is already in
    /// the document.
    Input,
    /// An element gained focus.
    Focus,
    /// An element lost focus.
    Blur,
    /// A key went down; carries the DOM `key` value.
    KeyDown(String),
    /// Primary pointer button pressed.
    PointerDown,
    /// A control's value was committed.
    Change,
    /// A form is being submitted.
    Submit,
}

impl EventKind {
    /// DOM event type name.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Input => "input",
            EventKind::Focus => "focus",
            EventKind::Blur => "blur",
            EventKind::KeyDown(_) => "keydown",
            EventKind::PointerDown => "pointerdown",
            EventKind::Change => "change",
            EventKind::Submit => "submit",
        }
    }
}

/// An event at `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
    /// Element the event was fired at.
    pub target: NodeId,
    /// What happened.
    pub kind: EventKind,
}

impl DomEvent {
    /// An event of `kind` at `target`.
    pub fn new(target: NodeId, kind: EventKind) -> Self {
        Self { target, kind }
    }

    /// `input` at `target`.
    pub fn input(target: NodeId) -> Self {
        Self::new(target, EventKind::Input)
    }

    /// `focus` at `target`.
    pub fn focus(target: NodeId) -> Self {
        Self::new(target, EventKind::Focus)
    }

    /// `blur` at `target`.
    pub fn blur(target: NodeId) -> Self {
        Self::new(target, EventKind::Blur)
    }

    /// `keydown` of `key` at `target`.
    pub fn key(target: NodeId, key: &str) -> Self {
        Self::new(target, EventKind::KeyDown(key.to_owned()))
    }

    /// `pointerdown` at `target`.
    pub fn pointer_down(target: NodeId) -> Self {
        Self::new(target, EventKind::PointerDown)
    }

    /// `change` at `target`.
    pub fn change(target: NodeId) -> Self {
        Self::new(target, EventKind::Change)
    }

    /// `submit` at `target`, the form or an element inside it.
    pub fn submit(target: NodeId) -> Self {
        Self::new(target, EventKind::Submit)
    }
}
