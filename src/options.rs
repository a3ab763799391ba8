//! Initialization options and per-field configuration.
//!
//! Everything serializable deserializes from the JSON shape integrators
//! already write (camelCase keys, `fuseDefaults` accepted as an alias of
//! `fuzzyDefaults`). Hooks that cannot come from JSON (item mappers and
//! filters, custom submit values, condition functions, the scorer and the
//! host error adapter) are attached with builder methods.
//!
//! # Examples
//!
//! ```
//! use autofield::options::{Options, SubmitValue};
//!
//! let opts = Options::from_json(r#"{
//!     "fuseDefaults": { "threshold": 0.4 },
//!     "fields": [{
//!         "targetLabel": "School",
//!         "dataUrl": "https://example.com/schools.json",
//!         "listPath": "data.schools",
//!         "submitValue": "id"
//!     }]
//! }"#).unwrap();
//!
//! assert_eq!(opts.fuzzy_defaults.threshold, 0.4);
//! assert!(opts.fuzzy_defaults.ignore_location);
//! assert_eq!(opts.fields[0].submit_value, SubmitValue::Id);
//! assert_eq!(opts.fields[0].sentinel_value, "__SS_EMPTY__");
//! assert_eq!(opts.fields[0].max_results, 8);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::conditions::{ConditionValues, FieldMode};
use crate::dom::Selector;
use crate::error::ConfigError;
use crate::host_errors::HostErrorAdapter;
use crate::item::CanonicalItem;
use crate::key::SearchKey;
use crate::ranking::{Scorer, TieredScorer};

/// Sentinel written for optional fields left empty.
pub const DEFAULT_SENTINEL: &str = "__SS_EMPTY__";

/// Result limit when a field does not set `maxResults`.
pub const DEFAULT_MAX_RESULTS: usize = 8;

/// A shared, non-serializable callback or collaborator.
pub struct Hook<F: ?Sized>(Rc<F>);

impl<F: ?Sized> Hook<F> {
    /// Wrap an already shared value.
    pub fn from_rc(inner: Rc<F>) -> Self {
        Self(inner)
    }

    /// Borrow the wrapped value.
    pub fn get(&self) -> &F {
        &self.0
    }
}

impl<F: ?Sized> Clone for Hook<F> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<F: ?Sized> fmt::Debug for Hook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

// Hooks compare by identity.
impl<F: ?Sized> PartialEq for Hook<F> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Maps one raw record to a canonical item; `None` drops the record.
pub type MapItemFn = dyn Fn(&Value) -> Option<CanonicalItem>;
/// Keeps (`true`) or drops a mapped item.
pub type FilterItemFn = dyn Fn(&CanonicalItem) -> bool;
/// Derives the submitted value from the selected item.
pub type SubmitFn = dyn Fn(&CanonicalItem) -> String;
/// Decides the field mode from the bound condition controls.
pub type ConditionsFn = dyn Fn(&ConditionValues) -> FieldMode;

// ---------------------------------------------------------------------------
// Global options
// ---------------------------------------------------------------------------

/// Options for one [`Enhancer`](crate::controller::Enhancer).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Log the init summary at `info` instead of `debug`.
    pub debug: bool,
    /// Which mutations trigger reconciliation.
    pub observer: ObserverOptions,
    /// Fields to enhance.
    pub fields: Vec<FieldConfig>,
    /// Fuzzy matching defaults, overridable per field.
    #[serde(alias = "fuseDefaults")]
    pub fuzzy_defaults: FuzzyOptions,
    /// Remote fetch settings.
    pub fetch: FetchOptions,
    /// Report invalid submits as default-prevented instead of leaving the
    /// rejection to the host's required-field check.
    pub block_invalid_submit: bool,
    /// Fixed delays used to sequence with the host.
    #[serde(skip)]
    pub timing: Timing,
    #[serde(skip, default = "default_scorer")]
    scorer: Option<Hook<dyn Scorer>>,
    #[serde(skip)]
    error_adapter: Option<Hook<dyn HostErrorAdapter>>,
}

fn default_scorer() -> Option<Hook<dyn Scorer>> {
    Some(Hook(Rc::new(TieredScorer)))
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debug: false,
            observer: ObserverOptions::default(),
            fields: Vec::new(),
            fuzzy_defaults: FuzzyOptions::default(),
            fetch: FetchOptions::default(),
            block_invalid_submit: false,
            timing: Timing::default(),
            scorer: default_scorer(),
            error_adapter: None,
        }
    }
}

impl Options {
    /// Default options with no fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Add a field.
    #[must_use]
    pub fn field(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }

    /// Replace the fuzzy scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: impl Scorer + 'static) -> Self {
        self.scorer = Some(Hook(Rc::new(scorer)));
        self
    }

    /// Match with plain folded substring containment only.
    #[must_use]
    pub fn without_scorer(mut self) -> Self {
        self.scorer = None;
        self
    }

    /// Enable best-effort rewriting of host-rendered error text.
    #[must_use]
    pub fn with_error_adapter(mut self, adapter: impl HostErrorAdapter + 'static) -> Self {
        self.error_adapter = Some(Hook(Rc::new(adapter)));
        self
    }

    /// The configured scorer, if any.
    pub fn scorer(&self) -> Option<Rc<dyn Scorer>> {
        self.scorer.as_ref().map(|h| Rc::clone(&h.0))
    }

    /// The configured host error adapter, if any.
    pub fn error_adapter(&self) -> Option<Rc<dyn HostErrorAdapter>> {
        self.error_adapter.as_ref().map(|h| Rc::clone(&h.0))
    }
}

/// Mutation observer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObserverOptions {
    /// Watch the whole subtree, not only direct children of `<body>`.
    pub subtree: bool,
    /// Watch child-list changes at all.
    pub child_list: bool,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            subtree: true,
            child_list: true,
        }
    }
}

/// Fuzzy matching parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FuzzyOptions {
    /// Highest accepted score; `0.0` accepts only perfect matches, `1.0`
    /// anything the scorer matches at all.
    pub threshold: f64,
    /// When `false`, substring hits score worse the later they occur.
    pub ignore_location: bool,
    /// Queries shorter than this (in characters) match nothing.
    pub min_match_char_length: usize,
}

impl Default for FuzzyOptions {
    fn default() -> Self {
        Self {
            threshold: 0.35,
            ignore_location: true,
            min_match_char_length: 1,
        }
    }
}

/// Per-field overrides of [`FuzzyOptions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FuzzyOverrides {
    /// Overrides [`FuzzyOptions::threshold`].
    pub threshold: Option<f64>,
    /// Overrides [`FuzzyOptions::ignore_location`].
    pub ignore_location: Option<bool>,
    /// Overrides [`FuzzyOptions::min_match_char_length`].
    pub min_match_char_length: Option<usize>,
}

impl FuzzyOverrides {
    /// Merge onto `base`.
    pub fn apply(&self, base: FuzzyOptions) -> FuzzyOptions {
        FuzzyOptions {
            threshold: self.threshold.unwrap_or(base.threshold),
            ignore_location: self.ignore_location.unwrap_or(base.ignore_location),
            min_match_char_length: self
                .min_match_char_length
                .unwrap_or(base.min_match_char_length),
        }
    }
}

/// HTTP cache mode passed through to the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// Browser default caching.
    Default,
    /// Bypass the HTTP cache entirely.
    #[default]
    NoStore,
    /// Revalidate with the server.
    NoCache,
    /// Refetch and update the cache.
    Reload,
    /// Use any cached response.
    ForceCache,
}

/// Remote fetch settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchOptions {
    /// Cache mode for JSON GETs.
    pub cache: CacheMode,
    /// Hosts whose URLs are loaded through a script tag and named callback
    /// instead of a JSON GET. Subdomains match too.
    pub script_hosts: Vec<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            cache: CacheMode::NoStore,
            script_hosts: vec![
                "script.google.com".to_owned(),
                "script.googleusercontent.com".to_owned(),
            ],
        }
    }
}

/// Fixed delays used to sequence with the host's own re-render cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Panel close delay after blur, so a pointer selection still lands.
    pub blur_grace: Duration,
    /// Delay before the first host error rewrite attempt.
    pub error_first_attempt: Duration,
    /// Delay between host error rewrite attempts.
    pub error_retry_delay: Duration,
    /// Maximum host error rewrite attempts.
    pub error_retry_attempts: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            blur_grace: Duration::from_millis(150),
            error_first_attempt: Duration::from_millis(32),
            error_retry_delay: Duration::from_millis(25),
            error_retry_attempts: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// Field configuration
// ---------------------------------------------------------------------------

/// Inline dataset. Clones share the same array, and fields sharing it share
/// one cache entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Vec<Value>")]
pub struct InlineData(Rc<Vec<Value>>);

impl InlineData {
    /// Wrap records.
    pub fn new(records: Vec<Value>) -> Self {
        Self(Rc::new(records))
    }

    /// The records.
    pub fn records(&self) -> &[Value] {
        &self.0
    }

    /// Identity of the shared array.
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl From<Vec<Value>> for InlineData {
    fn from(records: Vec<Value>) -> Self {
        Self::new(records)
    }
}

/// Explicit selectors for fields that cannot be found by label text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSelectors {
    /// The carrier control.
    pub carrier: String,
    /// The label; defaults to `label[for=<carrier id>]`.
    #[serde(default)]
    pub label: Option<String>,
    /// The wrapper; defaults to the closest `.field`, `.form-item` or
    /// `.form-field`, else the carrier's parent.
    #[serde(default)]
    pub wrapper: Option<String>,
}

/// What the carrier receives when an item is selected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitValue {
    /// The item label.
    #[default]
    Label,
    /// The item id.
    Id,
    /// A custom derivation.
    #[serde(skip)]
    Custom(Hook<SubmitFn>),
}

impl SubmitValue {
    /// Resolve the value for `item`.
    pub fn value_for(&self, item: &CanonicalItem) -> String {
        match self {
            SubmitValue::Label => item.label.clone(),
            SubmitValue::Id => item.id.clone(),
            SubmitValue::Custom(f) => (f.get())(item),
        }
    }
}

/// Other controls of the same form a field's mode depends on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConditionControls {
    /// Name → selector, resolved inside the form.
    pub selector_map: BTreeMap<String, String>,
    /// Name → label text, resolved with the locator.
    pub by_label: BTreeMap<String, String>,
    /// Event types on the controls that trigger re-evaluation.
    pub events: Vec<String>,
}

impl Default for ConditionControls {
    fn default() -> Self {
        Self {
            selector_map: BTreeMap::new(),
            by_label: BTreeMap::new(),
            events: vec!["change".to_owned(), "input".to_owned()],
        }
    }
}

impl ConditionControls {
    /// Bind `name` to the control matching `selector`.
    #[must_use]
    pub fn selector(mut self, name: &str, selector: &str) -> Self {
        self.selector_map.insert(name.to_owned(), selector.to_owned());
        self
    }

    /// Bind `name` to the control under the label matching `label`.
    #[must_use]
    pub fn label(mut self, name: &str, label: &str) -> Self {
        self.by_label.insert(name.to_owned(), label.to_owned());
        self
    }
}

/// UI texts with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTexts {
    /// Synthetic input placeholder.
    pub placeholder: String,
    /// Row shown when nothing matches.
    pub empty: String,
    /// Hint for typed text without a selection.
    pub error: String,
    /// Hint for an empty required field.
    pub required_error: String,
    /// Placeholder once the dataset failed to load.
    pub load_error_placeholder: String,
}

/// Configuration of one enhanced field. Immutable once attached.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldConfig {
    /// Explicit stable key; defaults to the label text, then the index.
    pub key: Option<String>,
    /// Label text to find the field by.
    pub target_label: Option<String>,
    /// Explicit selectors, used when no label is configured.
    pub selectors: Option<FieldSelectors>,
    /// Inline records.
    pub data: Option<InlineData>,
    /// Remote records.
    pub data_url: Option<String>,
    /// Dotted path to the list inside the payload.
    pub list_path: Option<String>,
    /// Custom record mapping.
    #[serde(skip)]
    pub map_item: Option<Hook<MapItemFn>>,
    /// Custom item filter.
    #[serde(skip)]
    pub filter_item: Option<Hook<FilterItemFn>>,
    /// Fuzzy overrides.
    #[serde(alias = "fuse")]
    pub fuzzy: FuzzyOverrides,
    /// Search keys; `["label"]` when unset.
    pub keys: Option<Vec<SearchKey>>,
    /// Empty is rejected when set.
    pub is_required: bool,
    /// Strip "(required)" markers from the label of optional fields.
    pub remove_required_suffix: bool,
    /// Submit value policy.
    pub submit_value: SubmitValue,
    /// Value written for optional fields left empty. Never empty.
    #[serde(deserialize_with = "sentinel_or_default")]
    pub sentinel_value: String,
    /// Result limit. Never zero.
    #[serde(deserialize_with = "limit_or_default")]
    pub max_results: usize,
    /// Synthetic input placeholder.
    pub placeholder: Option<String>,
    /// Row text when nothing matches.
    pub empty_text: Option<String>,
    /// Hint for typed text without a selection.
    pub error_text: Option<String>,
    /// Hint for an empty required field.
    pub required_error_text: Option<String>,
    /// Placeholder after a failed load.
    pub load_error_placeholder: Option<String>,
    /// Bound condition controls.
    pub condition_controls: Option<ConditionControls>,
    /// Mode decision over the condition controls.
    #[serde(skip)]
    pub conditions: Option<Hook<ConditionsFn>>,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            key: None,
            target_label: None,
            selectors: None,
            data: None,
            data_url: None,
            list_path: None,
            map_item: None,
            filter_item: None,
            fuzzy: FuzzyOverrides::default(),
            keys: None,
            is_required: false,
            remove_required_suffix: true,
            submit_value: SubmitValue::Label,
            sentinel_value: DEFAULT_SENTINEL.to_owned(),
            max_results: DEFAULT_MAX_RESULTS,
            placeholder: None,
            empty_text: None,
            error_text: None,
            required_error_text: None,
            load_error_placeholder: None,
            condition_controls: None,
            conditions: None,
        }
    }
}

impl FieldConfig {
    /// A field found by its label text.
    pub fn by_label(label: &str) -> Self {
        Self {
            target_label: Some(label.to_owned()),
            ..Self::default()
        }
    }

    /// A field found by explicit selectors.
    pub fn by_selectors(selectors: FieldSelectors) -> Self {
        Self {
            selectors: Some(selectors),
            ..Self::default()
        }
    }

    /// Set the stable key.
    #[must_use]
    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_owned());
        self
    }

    /// Use inline records.
    #[must_use]
    pub fn data(mut self, data: impl Into<InlineData>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Use a remote source.
    #[must_use]
    pub fn data_url(mut self, url: &str) -> Self {
        self.data_url = Some(url.to_owned());
        self
    }

    /// Set the list path.
    #[must_use]
    pub fn list_path(mut self, path: &str) -> Self {
        self.list_path = Some(path.to_owned());
        self
    }

    /// Set a custom record mapping.
    #[must_use]
    pub fn map_item(mut self, f: impl Fn(&Value) -> Option<CanonicalItem> + 'static) -> Self {
        self.map_item = Some(Hook(Rc::new(f)));
        self
    }

    /// Set an item filter.
    #[must_use]
    pub fn filter_item(mut self, f: impl Fn(&CanonicalItem) -> bool + 'static) -> Self {
        self.filter_item = Some(Hook(Rc::new(f)));
        self
    }

    /// Set the search keys.
    #[must_use]
    pub fn keys(mut self, keys: Vec<SearchKey>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Set fuzzy overrides.
    #[must_use]
    pub fn fuzzy(mut self, overrides: FuzzyOverrides) -> Self {
        self.fuzzy = overrides;
        self
    }

    /// Mark the field required or optional.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.is_required = required;
        self
    }

    /// Set the submit value policy.
    #[must_use]
    pub fn submit(mut self, policy: SubmitValue) -> Self {
        self.submit_value = policy;
        self
    }

    /// Derive the submit value with `f`.
    #[must_use]
    pub fn submit_with(mut self, f: impl Fn(&CanonicalItem) -> String + 'static) -> Self {
        self.submit_value = SubmitValue::Custom(Hook(Rc::new(f)));
        self
    }

    /// Set the sentinel.
    #[must_use]
    pub fn sentinel(mut self, sentinel: &str) -> Self {
        sentinel.clone_into(&mut self.sentinel_value);
        self
    }

    /// Set the result limit.
    #[must_use]
    pub fn max_results(mut self, limit: usize) -> Self {
        self.max_results = limit;
        self
    }

    /// Set the placeholder.
    #[must_use]
    pub fn placeholder(mut self, text: &str) -> Self {
        self.placeholder = Some(text.to_owned());
        self
    }

    /// Set the no-match row text.
    #[must_use]
    pub fn empty_text(mut self, text: &str) -> Self {
        self.empty_text = Some(text.to_owned());
        self
    }

    /// Bind condition controls and the mode decision.
    #[must_use]
    pub fn conditions(
        mut self,
        controls: ConditionControls,
        f: impl Fn(&ConditionValues) -> FieldMode + 'static,
    ) -> Self {
        self.condition_controls = Some(controls);
        self.conditions = Some(Hook(Rc::new(f)));
        self
    }

    /// The stable key used for attachment markers.
    pub fn stable_key(&self, index: usize) -> String {
        self.key
            .clone()
            .or_else(|| self.target_label.clone())
            .unwrap_or_else(|| index.to_string())
    }

    /// Search keys, defaulting to the label.
    pub fn search_keys(&self) -> Vec<SearchKey> {
        match &self.keys {
            Some(keys) if !keys.is_empty() => keys.clone(),
            _ => vec![SearchKey::label()],
        }
    }

    /// UI texts with defaults applied.
    pub fn texts(&self) -> FieldTexts {
        let or = |value: &Option<String>, default: &str| {
            value.clone().unwrap_or_else(|| default.to_owned())
        };
        FieldTexts {
            placeholder: or(&self.placeholder, "Search and select…"),
            empty: or(&self.empty_text, "No matches"),
            error: or(&self.error_text, "Choose an option from the list."),
            required_error: or(&self.required_error_text, "This field is required."),
            load_error_placeholder: or(&self.load_error_placeholder, "Could not load the list"),
        }
    }

    /// Replace an empty sentinel and a zero result limit with the defaults.
    ///
    /// An empty sentinel could not be told apart from a field that was never
    /// rendered.
    pub fn normalize(&mut self) {
        if self.sentinel_value.is_empty() {
            DEFAULT_SENTINEL.clone_into(&mut self.sentinel_value);
        }
        if self.max_results == 0 {
            self.max_results = DEFAULT_MAX_RESULTS;
        }
    }

    /// Check the field can be attached at all.
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.target_label.is_none() && self.selectors.is_none() {
            return Err(ConfigError::MissingTarget { index });
        }
        let key = self.stable_key(index);
        if self.data.is_some() && self.data_url.is_some() {
            return Err(ConfigError::AmbiguousSource { key });
        }
        let selector_texts = self
            .selectors
            .iter()
            .flat_map(|s| std::iter::once(&s.carrier).chain(&s.label).chain(&s.wrapper))
            .chain(
                self.condition_controls
                    .iter()
                    .flat_map(|c| c.selector_map.values()),
            );
        for text in selector_texts {
            Selector::parse(text).map_err(|source| ConfigError::Selector {
                key: key.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

fn sentinel_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SENTINEL.to_owned()))
}

fn limit_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    Ok(Option::<usize>::deserialize(deserializer)?
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_MAX_RESULTS))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_match_integration_surface() {
        let opts = Options::default();
        assert!(opts.observer.subtree);
        assert!(opts.observer.child_list);
        assert_eq!(opts.fuzzy_defaults.threshold, 0.35);
        assert_eq!(opts.fetch.cache, CacheMode::NoStore);
        assert!(opts.scorer().is_some());
        assert!(opts.error_adapter().is_none());
    }

    #[test]
    fn json_keeps_default_scorer() {
        let opts = Options::from_json("{}").unwrap();
        assert!(opts.scorer().is_some());
        assert!(Options::new().without_scorer().scorer().is_none());
    }

    #[test]
    fn fuzzy_overrides_merge() {
        let base = FuzzyOptions::default();
        let merged = FuzzyOverrides {
            threshold: Some(0.6),
            ..Default::default()
        }
        .apply(base);
        assert_eq!(merged.threshold, 0.6);
        assert_eq!(merged.min_match_char_length, base.min_match_char_length);
    }

    #[test]
    fn field_accepts_fuse_alias_and_inline_data() {
        let field: FieldConfig = serde_json::from_value(json!({
            "targetLabel": "School",
            "data": [{"id": 1, "label": "Oak"}],
            "fuse": {"threshold": 0.2},
            "keys": ["label", {"name": "city", "weight": 0.5}],
            "isRequired": true,
            "cache": "ignored-unknown-key"
        }))
        .unwrap();
        assert_eq!(field.fuzzy.threshold, Some(0.2));
        assert_eq!(field.data.as_ref().map(|d| d.records().len()), Some(1));
        assert_eq!(field.search_keys().len(), 2);
        assert!(field.is_required);
        assert!(field.remove_required_suffix);
    }

    #[test]
    fn blank_sentinel_and_zero_limit_fall_back() {
        let field: FieldConfig = serde_json::from_value(json!({
            "targetLabel": "School",
            "sentinelValue": "",
            "maxResults": 0
        }))
        .unwrap();
        assert_eq!(field.sentinel_value, DEFAULT_SENTINEL);
        assert_eq!(field.max_results, DEFAULT_MAX_RESULTS);

        let nulls: FieldConfig =
            serde_json::from_value(json!({"sentinelValue": null, "maxResults": null})).unwrap();
        assert_eq!(nulls.sentinel_value, DEFAULT_SENTINEL);
        assert_eq!(nulls.max_results, DEFAULT_MAX_RESULTS);

        let kept: FieldConfig =
            serde_json::from_value(json!({"sentinelValue": "NONE", "maxResults": 3})).unwrap();
        assert_eq!(kept.sentinel_value, "NONE");
        assert_eq!(kept.max_results, 3);

        let mut built = FieldConfig::by_label("School").sentinel("").max_results(0);
        built.normalize();
        assert_eq!(built.sentinel_value, DEFAULT_SENTINEL);
        assert_eq!(built.max_results, DEFAULT_MAX_RESULTS);
    }

    #[test]
    fn stable_key_precedence() {
        assert_eq!(FieldConfig::by_label("School").key("k").stable_key(3), "k");
        assert_eq!(FieldConfig::by_label("School").stable_key(3), "School");
        let by_sel = FieldConfig::by_selectors(FieldSelectors {
            carrier: "#x".into(),
            label: None,
            wrapper: None,
        });
        assert_eq!(by_sel.stable_key(3), "3");
    }

    #[test]
    fn validate_rejects_bad_fields() {
        assert!(matches!(
            FieldConfig::default().validate(0),
            Err(ConfigError::MissingTarget { index: 0 })
        ));
        let both = FieldConfig::by_label("A")
            .data(vec![json!({"id": 1, "label": "x"})])
            .data_url("https://example.com");
        assert!(matches!(both.validate(0), Err(ConfigError::AmbiguousSource { .. })));
        let bad_selector = FieldConfig::by_selectors(FieldSelectors {
            carrier: "input!".into(),
            label: None,
            wrapper: None,
        });
        assert!(matches!(bad_selector.validate(0), Err(ConfigError::Selector { .. })));
    }

    #[test]
    fn submit_value_policies() {
        let item = CanonicalItem::new("7", "Oak School", Value::Null);
        assert_eq!(SubmitValue::Label.value_for(&item), "Oak School");
        assert_eq!(SubmitValue::Id.value_for(&item), "7");
        let custom = FieldConfig::default().submit_with(|i| format!("{}:{}", i.id, i.label));
        assert_eq!(custom.submit_value.value_for(&item), "7:Oak School");
    }

    #[test]
    fn texts_fall_back_to_defaults() {
        let texts = FieldConfig::by_label("A").empty_text("Inga träffar").texts();
        assert_eq!(texts.empty, "Inga träffar");
        assert_eq!(texts.placeholder, "Search and select…");
    }

    #[test]
    fn inline_clones_share_identity() {
        let data = InlineData::new(vec![json!(1)]);
        let other = InlineData::new(vec![json!(1)]);
        assert_eq!(data.identity(), data.clone().identity());
        assert_ne!(data.identity(), other.identity());
    }
}
