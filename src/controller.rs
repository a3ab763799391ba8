//! The [`Enhancer`]: attaches configured fields to the forms of a document
//! and routes page events to them.
//!
//! Attachment is a reconciliation pass. [`Enhancer::init`] scans every form
//! already present; afterwards each [`dispatch`](Enhancer::dispatch) (or an
//! explicit [`reconcile`](Enhancer::reconcile)) drains the document's
//! child-list mutations, attaches fields in forms that appeared and
//! releases fields whose form or wrapper left the page. A marker attribute
//! on the wrapper makes attachment at-most-once per wrapper and key, so a
//! pass can run any number of times.
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//!
//! use autofield::controller::Enhancer;
//! use autofield::dom::Document;
//! use autofield::event::DomEvent;
//! use autofield::loader::Offline;
//! use autofield::options::{FieldConfig, Options, SubmitValue};
//! use serde_json::json;
//!
//! let mut doc = Document::new();
//! let form = doc.append_element(doc.body(), "form", &[]);
//! let wrapper = doc.append_element(form, "div", &[("class", "form-item")]);
//! let label = doc.append_element(wrapper, "label", &[]);
//! doc.append_text(label, "School");
//! let carrier = doc.append_element(wrapper, "input", &[("type", "text"), ("name", "school")]);
//!
//! let options = Options::new().field(
//!     FieldConfig::by_label("School").submit(SubmitValue::Id).data(vec![
//!         json!({"id": "7", "label": "Oak School"}),
//!         json!({"id": "8", "label": "Pine School"}),
//!     ]),
//! );
//! let mut enhancer = Enhancer::init(options, Rc::new(Offline), &mut doc);
//! let input = enhancer.field("School").unwrap().overlay().input;
//!
//! doc.set_value(input, "oak");
//! enhancer.dispatch(&mut doc, &DomEvent::input(input));
//! enhancer.dispatch(&mut doc, &DomEvent::key(input, "Enter"));
//!
//! let outcome = enhancer.dispatch(&mut doc, &DomEvent::submit(form));
//! assert!(outcome.submit.unwrap().is_ok());
//! assert_eq!(doc.value(carrier), "7");
//! ```

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bridge::{
    CarrierSnapshot, Rejection, Resolution, clear_invalid, hide_carrier, mark_invalid,
    reassert_carrier, resolve_submit_value, restore_carrier, write_carrier,
};
use crate::conditions::{ConditionBinding, FieldMode};
use crate::dom::{Document, Mutation, NodeId};
use crate::error::LoadError;
use crate::event::{DomEvent, EventKind};
use crate::host_errors::HostErrorAdapter;
use crate::item::Dataset;
use crate::loader::{DatasetFuture, DatasetLoader, Transport};
use crate::locator::{Located, Target, UI_MARKER, locate};
use crate::matcher::Matcher;
use crate::options::{FieldConfig, FieldTexts, FuzzyOptions, ObserverOptions, Options, Timing};
use crate::overlay::Overlay;
use crate::ranking::Scorer;
use crate::scheduler::{Scheduler, TaskId};
use crate::state::{Availability, FieldState, NavKey};

/// Attribute set on every form the enhancer has scanned.
pub const FORM_MARKER: &str = "data-ssac-init";

/// Attribute marking a wrapper as enhanced for the field `key`.
///
/// ```
/// use autofield::controller::enhanced_marker;
///
/// assert_eq!(enhanced_marker("school"), "data-ssac-enhanced-school");
/// assert_eq!(enhanced_marker("Skola (krävs)"), "data-ssac-enhanced-skola--krävs-");
/// ```
pub fn enhanced_marker(key: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .flat_map(char::to_lowercase)
        .collect();
    format!("data-ssac-enhanced-{key}")
}

/// The form `node` belongs to: its closest `<form>`, else the first form
/// inside its closest dialog.
pub fn closest_form(doc: &Document, node: NodeId) -> Option<NodeId> {
    if let Some(form) = doc.closest(node, |d, n| d.tag(n) == "form") {
        return Some(form);
    }
    let dialog = doc.closest(node, |d, n| {
        d.attr(n, "role") == Some("dialog") || d.attr(n, "aria-modal") == Some("true")
    })?;
    doc.descendant_elements(dialog)
        .into_iter()
        .find(|n| doc.tag(*n) == "form")
}

fn is_overlay_node(doc: &Document, node: NodeId) -> bool {
    doc.closest(node, |d, n| d.has_attr(n, UI_MARKER)).is_some()
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What the enhancer did with one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// The host's default action must not run.
    pub default_prevented: bool,
    /// Per-field results, for submit events.
    pub submit: Option<SubmitReport>,
}

/// One field's submit decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSubmission {
    /// Stable key of the field.
    pub key: String,
    /// What was written to the carrier.
    pub resolution: Resolution,
}

/// Submit decisions of every enhanced field in the submitted form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmitReport {
    /// In attachment order.
    pub fields: Vec<FieldSubmission>,
}

impl SubmitReport {
    /// Whether every field passed.
    pub fn is_ok(&self) -> bool {
        self.fields.iter().all(|f| f.resolution.ok)
    }

    /// The resolution of the field with `key`.
    pub fn get(&self, key: &str) -> Option<&Resolution> {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| &f.resolution)
    }
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// A validated field configuration.
#[derive(Debug)]
struct FieldSpec {
    key: String,
    config: FieldConfig,
    target: Target,
    fuzzy: FuzzyOptions,
    texts: FieldTexts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct FieldId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    ClosePanel(FieldId),
    FocusInput(FieldId),
    ReassertCarrier(FieldId),
    RewriteErrors { field: FieldId, attempt: u32 },
}

impl Task {
    fn field(&self) -> FieldId {
        match *self {
            Task::ClosePanel(id)
            | Task::FocusInput(id)
            | Task::ReassertCarrier(id)
            | Task::RewriteErrors { field: id, .. } => id,
        }
    }
}

/// One field attached to one form.
pub struct AttachedField {
    spec: Rc<FieldSpec>,
    form: NodeId,
    located: Located,
    overlay: Overlay,
    snapshot: CarrierSnapshot,
    state: FieldState,
    load: Option<DatasetFuture>,
    matcher: Option<Matcher>,
    binding: Option<ConditionBinding>,
    blur_task: Option<TaskId>,
    rejection: Option<Rejection>,
}

impl std::fmt::Debug for AttachedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedField")
            .field("key", &self.spec.key)
            .field("form", &self.form)
            .field("located", &self.located)
            .field("state", &self.state)
            .field("loading", &self.load.is_some())
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

impl AttachedField {
    /// Stable key of the field's configuration.
    pub fn key(&self) -> &str {
        &self.spec.key
    }

    /// The field's configuration.
    pub fn config(&self) -> &FieldConfig {
        &self.spec.config
    }

    /// UI texts with defaults applied.
    pub fn texts(&self) -> &FieldTexts {
        &self.spec.texts
    }

    /// The form the field was attached in.
    pub fn form(&self) -> NodeId {
        self.form
    }

    /// Label, wrapper and carrier.
    pub fn located(&self) -> Located {
        self.located
    }

    /// The mounted overlay.
    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// The selection state.
    pub fn state(&self) -> &FieldState {
        &self.state
    }

    /// The searchable dataset, once loaded.
    pub fn dataset(&self) -> Option<&Rc<Dataset>> {
        self.matcher.as_ref().map(Matcher::dataset)
    }

    /// The rejection of the last failed submit, until the next success.
    pub fn rejection(&self) -> Option<Rejection> {
        self.rejection
    }

    fn limit(&self) -> usize {
        self.spec.config.max_results
    }

    fn render(&mut self, doc: &mut Document) {
        self.overlay.render(doc, &self.state, &self.spec.texts.empty);
    }

    fn show_issue(&self, doc: &mut Document, issue: Option<Rejection>) {
        let message = issue.map(|r| r.message(&self.spec.texts));
        self.overlay.show_hint(doc, message);
        self.overlay.set_invalid(doc, issue.is_some());
    }

    fn clear_feedback(&mut self, doc: &mut Document) {
        self.rejection = None;
        clear_invalid(doc, self.located.wrapper, self.located.carrier);
        self.show_issue(doc, None);
    }

    /// Evaluate the condition hook. Returns whether the mode changed.
    fn apply_conditions(&mut self, doc: &mut Document) -> bool {
        let (Some(binding), Some(decide)) = (&self.binding, &self.spec.config.conditions) else {
            return false;
        };
        let values = binding.values(doc);
        let mode = (decide.get())(&values);
        if !self.state.set_mode(mode) {
            return false;
        }
        debug!(field = %self.spec.key, ?mode, "field mode changed");
        if mode == FieldMode::Disabled {
            self.clear_feedback(doc);
        }
        true
    }

    /// Re-resolve the condition controls when one left the form or one was
    /// never found. Returns whether the binding changed.
    fn refresh_binding(&mut self, doc: &Document) -> bool {
        let (Some(binding), Some(controls)) = (&self.binding, &self.spec.config.condition_controls)
        else {
            return false;
        };
        if !binding.is_stale(doc, controls) {
            return false;
        }
        let fresh = ConditionBinding::resolve(doc, self.form, controls);
        if fresh == *binding {
            return false;
        }
        debug!(field = %self.spec.key, "condition controls re-resolved");
        self.binding = Some(fresh);
        true
    }

    /// Follow a carrier the host replaced inside the same wrapper. Fails when
    /// the overlay went with it or the field now resolves elsewhere.
    fn rebind_carrier(&mut self, doc: &mut Document) -> bool {
        let wrapper = self.located.wrapper;
        let overlay_intact = [self.overlay.input, self.overlay.anchor, self.overlay.hint]
            .into_iter()
            .all(|part| doc.contains(wrapper, part));
        if !overlay_intact {
            return false;
        }
        let Ok(found) = locate(doc, self.form, &self.spec.target) else {
            return false;
        };
        if found.wrapper != wrapper || found.carrier == self.located.carrier {
            return false;
        }
        self.snapshot = hide_carrier(doc, found.carrier);
        self.located = found;
        debug!(field = %self.spec.key, carrier = ?found.carrier, "carrier replaced, field rebound");
        true
    }

    fn finish_load(
        &mut self,
        doc: &mut Document,
        result: Result<Rc<Dataset>, LoadError>,
        scorer: Option<Rc<dyn Scorer>>,
    ) {
        match result {
            Ok(dataset) => {
                debug!(field = %self.spec.key, items = dataset.len(), "dataset ready");
                self.matcher = Some(Matcher::new(
                    dataset,
                    self.spec.config.search_keys(),
                    self.spec.fuzzy,
                    scorer,
                ));
                self.state.set_availability(Availability::Ready);
            }
            Err(err) => {
                warn!(field = %self.spec.key, error = %err, "dataset load failed");
                self.state.set_availability(Availability::Failed);
                self.overlay
                    .set_placeholder(doc, &self.spec.texts.load_error_placeholder);
            }
        }
        self.render(doc);
    }
}

// ---------------------------------------------------------------------------
// Enhancer
// ---------------------------------------------------------------------------

/// Attaches and drives enhanced fields for one document.
pub struct Enhancer {
    specs: Vec<Rc<FieldSpec>>,
    fields: BTreeMap<FieldId, AttachedField>,
    loader: DatasetLoader,
    scheduler: Scheduler<Task>,
    scorer: Option<Rc<dyn Scorer>>,
    error_adapter: Option<Rc<dyn HostErrorAdapter>>,
    observer: ObserverOptions,
    timing: Timing,
    block_invalid_submit: bool,
    next_field: u64,
    next_panel: u64,
    active: bool,
}

impl std::fmt::Debug for Enhancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enhancer")
            .field("specs", &self.specs.len())
            .field("fields", &self.fields.len())
            .field("loader", &self.loader)
            .field("pending_tasks", &self.scheduler.pending())
            .field("active", &self.active)
            .finish()
    }
}

impl Enhancer {
    /// Validate `options`, attach every field in the forms already in `doc`
    /// and start their loads.
    ///
    /// Invalid field configurations are logged and skipped; the others are
    /// still attached.
    pub fn init(options: Options, transport: Rc<dyn Transport>, doc: &mut Document) -> Self {
        let scorer = options.scorer();
        let error_adapter = options.error_adapter();
        let mut specs = Vec::with_capacity(options.fields.len());
        for (index, mut config) in options.fields.into_iter().enumerate() {
            config.normalize();
            if let Err(err) = config.validate(index) {
                warn!(index, error = %err, "skipping invalid field");
                continue;
            }
            let target = match Target::of(&config) {
                Ok(Some(target)) => target,
                Ok(None) => continue,
                Err(err) => {
                    warn!(index, error = %err, "skipping invalid field");
                    continue;
                }
            };
            specs.push(Rc::new(FieldSpec {
                key: config.stable_key(index),
                fuzzy: config.fuzzy.apply(options.fuzzy_defaults),
                texts: config.texts(),
                target,
                config,
            }));
        }

        let mut enhancer = Self {
            specs,
            fields: BTreeMap::new(),
            loader: DatasetLoader::new(transport, options.fetch),
            scheduler: Scheduler::new(),
            scorer,
            error_adapter,
            observer: options.observer,
            timing: options.timing,
            block_invalid_submit: options.block_invalid_submit,
            next_field: 0,
            next_panel: 0,
            active: true,
        };

        // Everything already in the page is covered by the full scan.
        doc.take_mutations();
        let forms: Vec<NodeId> = doc
            .descendant_elements(doc.root())
            .into_iter()
            .filter(|n| doc.tag(*n) == "form")
            .collect();
        let attached: usize = forms.iter().map(|f| enhancer.scan_form(doc, *f)).sum();
        enhancer.poll_loads(doc);

        let keys: Vec<&str> = enhancer.specs.iter().map(|s| s.key.as_str()).collect();
        if options.debug {
            info!(fields = ?keys, forms = forms.len(), attached, "initialized");
        } else {
            debug!(fields = ?keys, forms = forms.len(), attached, "initialized");
        }
        enhancer
    }

    /// Whether [`teardown`](Self::teardown) has not run yet.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The first attached field with `key`.
    pub fn field(&self, key: &str) -> Option<&AttachedField> {
        self.fields.values().find(|f| f.spec.key == key)
    }

    /// Every attached field, in attachment order.
    pub fn fields(&self) -> impl Iterator<Item = &AttachedField> {
        self.fields.values()
    }

    /// The dataset loader and its caches.
    pub fn loader(&self) -> &DatasetLoader {
        &self.loader
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// Number of pending timed tasks.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.pending()
    }

    // -----------------------------------------------------------------------
    // Attachment
    // -----------------------------------------------------------------------

    fn scan_form(&mut self, doc: &mut Document, form: NodeId) -> usize {
        let specs = self.specs.clone();
        let attached = specs
            .iter()
            .filter(|spec| self.attach(doc, form, spec))
            .count();
        doc.set_attr(form, FORM_MARKER, "1");
        attached
    }

    fn attach(&mut self, doc: &mut Document, form: NodeId, spec: &Rc<FieldSpec>) -> bool {
        let located = match locate(doc, form, &spec.target) {
            Ok(located) => located,
            Err(err) => {
                debug!(field = %spec.key, ?form, error = %err, "field not attached");
                return false;
            }
        };
        let marker = enhanced_marker(&spec.key);
        if doc.has_attr(located.wrapper, &marker) {
            return false;
        }
        // The marker goes on before anything async starts.
        doc.set_attr(located.wrapper, &marker, "1");

        self.next_panel += 1;
        let panel_id = format!("ssac-panel-{}", self.next_panel);
        let mut overlay = Overlay::mount(
            doc,
            located.wrapper,
            located.carrier,
            &spec.texts.placeholder,
            &panel_id,
        );
        if !spec.config.is_required && spec.config.remove_required_suffix {
            if let Some(label) = located.label {
                overlay.strip_label_suffix(doc, label);
            }
        }
        let snapshot = hide_carrier(doc, located.carrier);
        let load = self.loader.load(&spec.config, &spec.key);
        let binding = spec
            .config
            .condition_controls
            .as_ref()
            .map(|controls| ConditionBinding::resolve(doc, form, controls));

        let mut field = AttachedField {
            spec: Rc::clone(spec),
            form,
            located,
            overlay,
            snapshot,
            state: FieldState::new(spec.config.is_required),
            load: Some(load),
            matcher: None,
            binding,
            blur_task: None,
            rejection: None,
        };
        field.apply_conditions(doc);
        field.render(doc);

        let id = FieldId(self.next_field);
        self.next_field += 1;
        self.fields.insert(id, field);
        debug!(field = %spec.key, ?form, wrapper = ?located.wrapper, "field attached");
        true
    }

    fn release(&mut self, doc: &mut Document, id: FieldId) {
        let Some(field) = self.fields.remove(&id) else {
            return;
        };
        self.scheduler.cancel_where(|task| task.field() == id);
        let Located {
            wrapper, carrier, ..
        } = field.located;
        field.overlay.unmount(doc);
        restore_carrier(doc, carrier, &field.snapshot);
        clear_invalid(doc, wrapper, carrier);
        doc.remove_attr(wrapper, &enhanced_marker(&field.spec.key));
        debug!(field = %field.spec.key, "field released");
    }

    /// Drain the document's mutation records: attach fields in forms that
    /// appeared, release fields whose form or wrapper left the page, follow
    /// carriers and condition controls the host replaced, and reassert every
    /// carrier's hidden styling. Returns how many fields were attached.
    pub fn reconcile(&mut self, doc: &mut Document) -> usize {
        let mutations = doc.take_mutations();
        if !self.active || !self.observer.child_list {
            return 0;
        }
        let changed = !mutations.is_empty();

        let mut forms = Vec::new();
        let mut removed = false;
        for mutation in mutations {
            match mutation {
                Mutation::Added { node, parent } => {
                    if !self.observer.subtree && parent != doc.body() {
                        continue;
                    }
                    if !doc.is_element(node) || !doc.is_connected(node) || is_overlay_node(doc, node)
                    {
                        continue;
                    }
                    if doc.tag(node) == "form" {
                        forms.push(node);
                    }
                    forms.extend(
                        doc.descendant_elements(node)
                            .into_iter()
                            .filter(|n| doc.tag(*n) == "form"),
                    );
                    if let Some(form) = doc.closest(parent, |d, n| d.tag(n) == "form") {
                        forms.push(form);
                    }
                }
                Mutation::Removed { .. } => removed = true,
            }
        }

        if removed {
            let detached: Vec<FieldId> = self
                .fields
                .iter()
                .filter(|(_, f)| {
                    !doc.is_connected(f.located.wrapper) || !doc.contains(f.form, f.located.wrapper)
                })
                .map(|(id, _)| *id)
                .collect();
            for id in detached {
                self.release(doc, id);
            }

            // The wrapper stayed but the carrier did not.
            let swapped: Vec<FieldId> = self
                .fields
                .iter()
                .filter(|(_, f)| {
                    let Located {
                        wrapper, carrier, ..
                    } = f.located;
                    !doc.is_connected(carrier) || !doc.contains(wrapper, carrier)
                })
                .map(|(id, _)| *id)
                .collect();
            for id in swapped {
                let Some(field) = self.fields.get_mut(&id) else {
                    continue;
                };
                if field.rebind_carrier(doc) {
                    continue;
                }
                // Released with its marker, so the rescan below attaches
                // to whatever the host rendered instead.
                forms.push(field.form);
                self.release(doc, id);
            }
        }

        forms.sort();
        forms.dedup();
        let attached: usize = forms.into_iter().map(|form| self.scan_form(doc, form)).sum();

        if changed {
            for field in self.fields.values_mut() {
                if field.refresh_binding(doc) && field.apply_conditions(doc) {
                    field.render(doc);
                }
            }
        }

        for field in self.fields.values() {
            if reassert_carrier(doc, field.located.carrier) {
                debug!(field = %field.spec.key, "carrier styling reasserted");
            }
        }
        attached
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Apply every dataset load that has finished, without waiting. Returns
    /// how many fields became ready or failed.
    pub fn poll_loads(&mut self, doc: &mut Document) -> usize {
        let mut settled = 0;
        for field in self.fields.values_mut() {
            let Some(result) = field.load.clone().and_then(FutureExt::now_or_never) else {
                continue;
            };
            field.load = None;
            field.finish_load(doc, result, self.scorer.clone());
            settled += 1;
        }
        settled
    }

    /// Wait for every pending dataset load and apply the results.
    pub async fn settle(&mut self, doc: &mut Document) {
        let pending: Vec<DatasetFuture> = self
            .fields
            .values()
            .filter_map(|f| f.load.clone())
            .collect();
        join_all(pending).await;
        self.poll_loads(doc);
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Route one page event.
    ///
    /// Pending mutations are reconciled and finished loads applied first, so
    /// the event always sees the current set of fields.
    pub fn dispatch(&mut self, doc: &mut Document, event: &DomEvent) -> Outcome {
        if !self.active {
            return Outcome::default();
        }
        self.reconcile(doc);
        self.poll_loads(doc);

        match &event.kind {
            EventKind::Submit => self.on_submit(doc, event.target),
            EventKind::PointerDown => {
                self.on_pointer_down(doc, event.target);
                Outcome::default()
            }
            kind => {
                let own = self
                    .fields
                    .iter()
                    .find(|(_, f)| f.overlay.input == event.target)
                    .map(|(id, _)| *id);
                match own {
                    Some(id) => self.on_field_event(doc, id, kind),
                    None => {
                        self.on_condition_event(doc, event.target, kind.name());
                        Outcome::default()
                    }
                }
            }
        }
    }

    fn on_field_event(&mut self, doc: &mut Document, id: FieldId, kind: &EventKind) -> Outcome {
        let Some(field) = self.fields.get_mut(&id) else {
            return Outcome::default();
        };
        let limit = field.limit();
        let mut outcome = Outcome::default();
        match kind {
            EventKind::Input => {
                let text = doc.value(field.overlay.input).to_owned();
                field.state.input(&text, field.matcher.as_ref(), limit);
                field.render(doc);
                let issue = field.state.live_issue();
                field.show_issue(doc, issue);
            }
            EventKind::Focus => {
                if let Some(task) = field.blur_task.take() {
                    self.scheduler.cancel(task);
                }
                field.state.focus(field.matcher.as_ref(), limit);
                field.render(doc);
            }
            EventKind::Blur => {
                if let Some(task) = field.blur_task.take() {
                    self.scheduler.cancel(task);
                }
                field.blur_task = Some(
                    self.scheduler
                        .schedule(self.timing.blur_grace, Task::ClosePanel(id)),
                );
            }
            EventKind::KeyDown(key) => {
                let result = field
                    .state
                    .key(NavKey::from_key(key), field.matcher.as_ref(), limit);
                if result.committed {
                    field.clear_feedback(doc);
                }
                field.render(doc);
                outcome.default_prevented = result.prevent_default;
            }
            EventKind::Change | EventKind::PointerDown | EventKind::Submit => {}
        }
        outcome
    }

    fn on_pointer_down(&mut self, doc: &mut Document, target: NodeId) {
        for field in self.fields.values_mut() {
            if let Some(index) = field.overlay.row_index(doc, target) {
                if let Some(item) = field.state.commit(index) {
                    debug!(field = %field.spec.key, id = %item.id, "item selected");
                    field.clear_feedback(doc);
                }
                field.render(doc);
            } else if field.state.is_open() && !doc.contains(field.located.wrapper, target) {
                field.state.close();
                field.render(doc);
            }
        }
    }

    fn on_condition_event(&mut self, doc: &mut Document, target: NodeId, event: &str) {
        for field in self.fields.values_mut() {
            let watched = field
                .binding
                .as_ref()
                .is_some_and(|b| b.watches(doc, target, event));
            if watched && field.apply_conditions(doc) {
                field.render(doc);
            }
        }
    }

    fn on_submit(&mut self, doc: &mut Document, target: NodeId) -> Outcome {
        let Some(form) = closest_form(doc, target) else {
            return Outcome::default();
        };
        let mut report = SubmitReport::default();
        for (&id, field) in self.fields.iter_mut().filter(|(_, f)| f.form == form) {
            let resolution = resolve_submit_value(&field.state, &field.spec.config);
            let Located {
                wrapper, carrier, ..
            } = field.located;
            write_carrier(doc, carrier, &resolution.value);

            match resolution.reason {
                None => field.clear_feedback(doc),
                Some(reason) => {
                    debug!(field = %field.spec.key, %reason, "submit rejected");
                    field.rejection = Some(reason);
                    mark_invalid(doc, wrapper, carrier, reason);
                    field.show_issue(doc, Some(reason));
                    self.scheduler.schedule(Duration::ZERO, Task::FocusInput(id));
                    self.scheduler
                        .schedule(Duration::ZERO, Task::ReassertCarrier(id));
                    if self.error_adapter.is_some() {
                        self.scheduler.cancel_where(|t| {
                            matches!(t, Task::RewriteErrors { field: f, .. } if *f == id)
                        });
                        self.scheduler.schedule(
                            self.timing.error_first_attempt,
                            Task::RewriteErrors {
                                field: id,
                                attempt: 1,
                            },
                        );
                    }
                }
            }
            report.fields.push(FieldSubmission {
                key: field.spec.key.clone(),
                resolution,
            });
        }

        let blocked = self.block_invalid_submit && !report.is_ok();
        Outcome {
            default_prevented: blocked,
            submit: Some(report),
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Move virtual time forward by `elapsed`, running every task that falls
    /// due in deadline order.
    pub fn advance(&mut self, doc: &mut Document, elapsed: Duration) {
        let until = self.scheduler.now() + elapsed;
        while let Some((_, task)) = self.scheduler.pop_due(until) {
            self.run(doc, task);
        }
        self.scheduler.settle_at(until);
    }

    fn run(&mut self, doc: &mut Document, task: Task) {
        let Some(field) = self.fields.get_mut(&task.field()) else {
            return;
        };
        match task {
            Task::ClosePanel(_) => {
                field.blur_task = None;
                field.state.close();
                field.render(doc);
            }
            Task::FocusInput(_) => doc.focus(field.overlay.input),
            Task::ReassertCarrier(_) => {
                if reassert_carrier(doc, field.located.carrier) {
                    debug!(field = %field.spec.key, "carrier styling reasserted");
                }
            }
            Task::RewriteErrors { field: id, attempt } => {
                let (Some(adapter), Some(reason)) = (&self.error_adapter, field.rejection) else {
                    return;
                };
                let wrapper = field.located.wrapper;
                match adapter.find_error_node(doc, wrapper) {
                    Some(node) => {
                        adapter.rewrite(doc, node, reason.message(&field.spec.texts));
                        debug!(field = %field.spec.key, attempt, "host error rewritten");
                    }
                    None if attempt < self.timing.error_retry_attempts => {
                        self.scheduler.schedule(
                            self.timing.error_retry_delay,
                            Task::RewriteErrors {
                                field: id,
                                attempt: attempt + 1,
                            },
                        );
                    }
                    None => debug!(field = %field.spec.key, "no host error node found"),
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Stop reconciling, cancel every task, drop the caches, remove every
    /// overlay, restore every carrier and clear every marker.
    pub fn teardown(&mut self, doc: &mut Document) {
        let ids: Vec<FieldId> = self.fields.keys().copied().collect();
        let released = ids.len();
        for id in ids {
            self.release(doc, id);
        }
        let scanned: Vec<NodeId> = doc
            .descendant_elements(doc.root())
            .into_iter()
            .filter(|n| doc.has_attr(*n, FORM_MARKER))
            .collect();
        for form in scanned {
            doc.remove_attr(form, FORM_MARKER);
        }
        self.scheduler.clear();
        self.loader.clear();
        self.active = false;
        doc.take_mutations();
        debug!(released, "enhancer torn down");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::loader::Offline;
    use crate::options::FieldConfig;

    const MS: Duration = Duration::from_millis(1);

    fn page(doc: &mut Document) -> (NodeId, NodeId) {
        let form = doc.append_element(doc.body(), "form", &[]);
        let wrapper = doc.append_element(form, "div", &[("class", "form-item")]);
        let label = doc.append_element(wrapper, "label", &[]);
        doc.append_text(label, "School");
        doc.append_element(wrapper, "input", &[("type", "text")]);
        (form, wrapper)
    }

    fn options() -> Options {
        Options::new().field(FieldConfig::by_label("School").data(vec![
            json!({"id": "1", "label": "Oak School"}),
            json!({"id": "2", "label": "Pine School"}),
        ]))
    }

    #[test]
    fn marker_is_attribute_safe() {
        assert_eq!(enhanced_marker("School name"), "data-ssac-enhanced-school-name");
        assert_eq!(enhanced_marker("0"), "data-ssac-enhanced-0");
    }

    #[test]
    fn closest_form_falls_back_to_dialog() {
        let mut doc = Document::new();
        let dialog = doc.append_element(doc.body(), "div", &[("role", "dialog")]);
        let button = doc.append_element(dialog, "button", &[]);
        let form = doc.append_element(dialog, "form", &[]);
        assert_eq!(closest_form(&doc, button), Some(form));
        assert_eq!(closest_form(&doc, doc.body()), None);
    }

    #[test]
    fn blur_close_is_cancelled_by_focus() {
        let mut doc = Document::new();
        page(&mut doc);
        let mut e = Enhancer::init(options(), Rc::new(Offline), &mut doc);
        let input = e.field("School").unwrap().overlay().input;

        e.dispatch(&mut doc, &DomEvent::focus(input));
        assert!(e.field("School").unwrap().state().is_open());
        e.dispatch(&mut doc, &DomEvent::blur(input));
        e.advance(&mut doc, 100 * MS);
        e.dispatch(&mut doc, &DomEvent::focus(input));
        e.advance(&mut doc, 100 * MS);
        assert!(e.field("School").unwrap().state().is_open());
        assert_eq!(e.pending_tasks(), 0);
    }

    #[test]
    fn rejected_submit_queues_focus_and_reassert() {
        let mut doc = Document::new();
        let (form, _) = page(&mut doc);
        let opts = Options::new().field(
            FieldConfig::by_label("School")
                .required(true)
                .data(vec![json!({"id": "1", "label": "Oak School"})]),
        );
        let mut e = Enhancer::init(opts, Rc::new(Offline), &mut doc);
        let out = e.dispatch(&mut doc, &DomEvent::submit(form));
        assert!(!out.default_prevented);
        assert_eq!(e.pending_tasks(), 2);

        let field = e.field("School").unwrap();
        let (input, carrier) = (field.overlay().input, field.located().carrier);
        doc.remove_style(carrier, "opacity");
        e.advance(&mut doc, Duration::ZERO);
        assert_eq!(doc.focused(), Some(input));
        assert_eq!(doc.style(carrier, "opacity"), Some("0"));
    }

    #[test]
    fn release_cancels_field_tasks() {
        let mut doc = Document::new();
        let (form, _) = page(&mut doc);
        let mut e = Enhancer::init(options(), Rc::new(Offline), &mut doc);
        let input = e.field("School").unwrap().overlay().input;
        e.dispatch(&mut doc, &DomEvent::blur(input));
        assert_eq!(e.pending_tasks(), 1);

        doc.remove(form);
        e.reconcile(&mut doc);
        assert!(e.field("School").is_none());
        assert_eq!(e.pending_tasks(), 0);
    }
}
