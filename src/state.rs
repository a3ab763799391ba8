//! Per-field selection state machine.
//!
//! The state never touches the page. The controller feeds it events, then
//! renders the overlay from it and, at submit, hands it to the bridge.
//!
//! ```text
//!            input               pick / Enter
//!   Empty ─────────────▶ Typing ─────────────▶ Selected
//!     ▲                    │                      │
//!     └──── clear text ────┘◀──── edit label ─────┘
//!
//!   any ── condition flip ──▶ FreeText | Empty (disabled)
//! ```

use std::rc::Rc;

use crate::bridge::Rejection;
use crate::conditions::FieldMode;
use crate::item::CanonicalItem;
use crate::matcher::Matcher;

/// Phase derived from the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No text, no selection.
    Empty,
    /// Text typed but nothing picked.
    Typing,
    /// An item is picked.
    Selected,
    /// Typed text is accepted verbatim.
    FreeText,
}

/// Whether the field's dataset can be searched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Availability {
    /// The load is still in flight.
    #[default]
    Loading,
    /// The matcher is ready.
    Ready,
    /// The load failed; the field stays disabled.
    Failed,
}

/// Navigation keys the overlay handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    /// Arrow down.
    Down,
    /// Arrow up.
    Up,
    /// Enter.
    Enter,
    /// Escape.
    Escape,
    /// Anything else; ignored.
    Other,
}

impl NavKey {
    /// Map a DOM `key` value.
    pub fn from_key(key: &str) -> Self {
        match key {
            "ArrowDown" | "Down" => NavKey::Down,
            "ArrowUp" | "Up" => NavKey::Up,
            "Enter" => NavKey::Enter,
            "Escape" | "Esc" => NavKey::Escape,
            _ => NavKey::Other,
        }
    }
}

/// What a key press did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyOutcome {
    /// The host's default action must not run.
    pub prevent_default: bool,
    /// An item was committed.
    pub committed: bool,
}

/// Runtime state of one attached field.
#[derive(Debug, Clone, Default)]
pub struct FieldState {
    text: String,
    selected: Option<Rc<CanonicalItem>>,
    mode: FieldMode,
    availability: Availability,
    open: bool,
    results: Vec<Rc<CanonicalItem>>,
    active: Option<usize>,
    required: bool,
}

impl FieldState {
    /// A fresh field waiting for its dataset.
    pub fn new(required: bool) -> Self {
        Self {
            required,
            ..Self::default()
        }
    }

    /// Visible text of the synthetic input.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The picked item.
    pub fn selected(&self) -> Option<&Rc<CanonicalItem>> {
        self.selected.as_ref()
    }

    /// Current mode.
    pub fn mode(&self) -> FieldMode {
        self.mode
    }

    /// Dataset availability.
    pub fn availability(&self) -> Availability {
        self.availability
    }

    /// Whether the panel is open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Last results, best first.
    pub fn results(&self) -> &[Rc<CanonicalItem>] {
        &self.results
    }

    /// Highlighted row.
    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// Whether the field rejects empty submits.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// The derived phase.
    pub fn phase(&self) -> Phase {
        if self.mode == FieldMode::FreeText {
            Phase::FreeText
        } else if self.selected.is_some() {
            Phase::Selected
        } else if self.text.trim().is_empty() {
            Phase::Empty
        } else {
            Phase::Typing
        }
    }

    /// Whether the synthetic input must be disabled.
    ///
    /// Free-text mode never needs the dataset, so only list mode waits for
    /// it.
    pub fn is_disabled(&self) -> bool {
        match self.mode {
            FieldMode::Disabled => true,
            FieldMode::FreeText => false,
            FieldMode::List => self.availability != Availability::Ready,
        }
    }

    /// Record the dataset outcome.
    pub fn set_availability(&mut self, availability: Availability) {
        self.availability = availability;
        if self.is_disabled() {
            self.close();
        }
    }

    /// Apply a condition decision. Returns whether the mode changed.
    pub fn set_mode(&mut self, mode: FieldMode) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;
        match mode {
            FieldMode::Disabled => {
                self.text.clear();
                self.selected = None;
                self.results.clear();
                self.close();
            }
            FieldMode::FreeText => {
                self.results.clear();
                self.close();
            }
            FieldMode::List => {}
        }
        true
    }

    /// Close the panel. The selection is untouched.
    pub fn close(&mut self) {
        self.open = false;
        self.active = None;
    }

    fn refresh(&mut self, matcher: Option<&Matcher>, limit: usize) {
        if self.mode != FieldMode::List || self.is_disabled() {
            self.results.clear();
            self.close();
            return;
        }
        self.results = matcher
            .map(|m| m.search(&self.text, limit))
            .unwrap_or_default();
        self.active = (!self.results.is_empty()).then_some(0);
        self.open = true;
    }

    /// The synthetic input's text changed.
    pub fn input(&mut self, text: &str, matcher: Option<&Matcher>, limit: usize) {
        if self.mode == FieldMode::Disabled {
            return;
        }
        text.clone_into(&mut self.text);
        if self.selected.as_ref().is_some_and(|s| s.label != self.text) {
            self.selected = None;
        }
        self.refresh(matcher, limit);
    }

    /// The synthetic input gained focus.
    pub fn focus(&mut self, matcher: Option<&Matcher>, limit: usize) {
        if self.mode == FieldMode::List {
            self.refresh(matcher, limit);
        }
    }

    /// Commit the result row at `index`.
    pub fn commit(&mut self, index: usize) -> Option<Rc<CanonicalItem>> {
        let item = Rc::clone(self.results.get(index)?);
        self.text.clone_from(&item.label);
        self.selected = Some(Rc::clone(&item));
        self.close();
        Some(item)
    }

    /// A key went down in the synthetic input.
    pub fn key(&mut self, key: NavKey, matcher: Option<&Matcher>, limit: usize) -> KeyOutcome {
        if matches!(key, NavKey::Down | NavKey::Up) && !self.open {
            self.focus(matcher, limit);
        }
        if !self.open {
            return KeyOutcome::default();
        }
        let last = self.results.len().checked_sub(1);
        match key {
            NavKey::Down => {
                if let Some(last) = last {
                    self.active = Some(self.active.map_or(0, |a| (a + 1).min(last)));
                }
                KeyOutcome {
                    prevent_default: true,
                    committed: false,
                }
            }
            NavKey::Up => {
                if last.is_some() {
                    self.active = Some(self.active.map_or(0, |a| a.saturating_sub(1)));
                }
                KeyOutcome {
                    prevent_default: true,
                    committed: false,
                }
            }
            NavKey::Enter => match self.active.and_then(|a| self.commit(a)) {
                Some(_) => KeyOutcome {
                    prevent_default: true,
                    committed: true,
                },
                None => KeyOutcome::default(),
            },
            NavKey::Escape => {
                self.close();
                KeyOutcome {
                    prevent_default: true,
                    committed: false,
                }
            }
            NavKey::Other => KeyOutcome::default(),
        }
    }

    /// The problem the inline hint should show while editing, if any.
    pub fn live_issue(&self) -> Option<Rejection> {
        match self.phase() {
            Phase::Typing => Some(Rejection::TypedNoSelection),
            Phase::Empty if self.required && self.mode == FieldMode::List => {
                Some(Rejection::RequiredEmpty)
            }
            _ => None,
        }
    }
}
