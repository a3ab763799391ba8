//! Canonical items and the datasets built from raw payloads.

use std::rc::Rc;

use serde_json::Value;

use crate::normalize::fold;

/// One selectable record in canonical `{id, label}` form.
///
/// Built once per dataset load and shared by reference between every field
/// using that dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalItem {
    /// Identifier written to the carrier under the `id` submit policy.
    pub id: String,
    /// Human-readable text shown in the results and matched by default.
    pub label: String,
    /// Optional descriptive text rendered under the label.
    pub secondary: Option<String>,
    /// The record this item was mapped from.
    pub raw: Value,
    /// [`fold`] of the label, used by the substring fallback.
    pub folded: String,
}

impl CanonicalItem {
    /// Build an item; `folded` is derived from the label.
    pub fn new(id: impl Into<String>, label: impl Into<String>, raw: Value) -> Self {
        let label = label.into();
        Self {
            id: id.into(),
            folded: fold(&label),
            label,
            secondary: None,
            raw,
        }
    }

    /// Attach secondary text.
    #[must_use]
    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        let secondary = secondary.into();
        self.secondary = (!secondary.trim().is_empty()).then_some(secondary);
        self
    }
}

/// Stringify a JSON scalar; `None` for null, arrays and objects.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Descend `path` (dot-separated object keys) from `value`.
///
/// Segments are trimmed and empty segments ignored, so `" data . items "`
/// and `"data..items"` both mean `data.items`.
pub fn value_at_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .try_fold(value, |cur, segment| cur.as_object()?.get(segment))
}

/// The item list inside a raw payload.
///
/// Without a path the payload itself must be an array. With a path, each
/// segment descends one object key; a missing segment or a non-array leaf
/// yields an empty list.
///
/// # Examples
///
/// ```
/// use autofield::item::extract_list;
/// use serde_json::json;
///
/// let raw = json!({"data": {"items": [{"id": 1}, {"id": 2}]}});
/// assert_eq!(extract_list(&raw, Some("data.items")).len(), 2);
/// assert!(extract_list(&raw, Some("data.missing")).is_empty());
/// assert!(extract_list(&raw, None).is_empty());
/// assert_eq!(extract_list(&json!([1, 2, 3]), None).len(), 3);
/// ```
pub fn extract_list<'a>(raw: &'a Value, path: Option<&str>) -> &'a [Value] {
    let target = match path {
        None => Some(raw),
        Some(path) => value_at_path(raw, path),
    };
    match target {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

/// Default record mapping: `id` and `label` read directly, scalars
/// stringified.
pub fn default_map(record: &Value) -> Option<CanonicalItem> {
    let obj = record.as_object()?;
    let id = obj.get("id").and_then(scalar_to_string).unwrap_or_default();
    let label = obj.get("label").and_then(scalar_to_string).unwrap_or_default();
    Some(CanonicalItem::new(id, label, record.clone()))
}

/// Canonical items of one data source, in dataset order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    items: Vec<Rc<CanonicalItem>>,
}

impl Dataset {
    /// Map and filter the list at `path` inside `raw`.
    ///
    /// Items with a blank label are always dropped, before `filter` runs.
    pub fn build(
        raw: &Value,
        path: Option<&str>,
        map: &dyn Fn(&Value) -> Option<CanonicalItem>,
        filter: Option<&dyn Fn(&CanonicalItem) -> bool>,
    ) -> Self {
        Self::from_records(extract_list(raw, path), map, filter)
    }

    /// Map and filter an already extracted record list.
    pub fn from_records(
        records: &[Value],
        map: &dyn Fn(&Value) -> Option<CanonicalItem>,
        filter: Option<&dyn Fn(&CanonicalItem) -> bool>,
    ) -> Self {
        let items = records
            .iter()
            .filter_map(map)
            .filter(|item| !item.label.trim().is_empty())
            .filter(|item| filter.is_none_or(|keep| keep(item)))
            .map(Rc::new)
            .collect();
        Self { items }
    }

    /// Wrap already canonical items.
    pub fn from_items(items: impl IntoIterator<Item = CanonicalItem>) -> Self {
        Self {
            items: items.into_iter().map(Rc::new).collect(),
        }
    }

    /// Items in dataset order.
    pub fn items(&self) -> &[Rc<CanonicalItem>] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
