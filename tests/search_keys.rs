//! Integration tests for search keys, record mapping and weighted matching.
//!
//! Records use a realistic school shape with a nested `adress` object and a
//! `tags` array, exercising the public API exported from `autofield`.

use std::rc::Rc;

use autofield::item::default_map;
use autofield::options::FuzzyOptions;
use autofield::{CanonicalItem, Dataset, FieldConfig, KeyPath, Matcher, SearchKey, TieredScorer};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Shared test fixtures
// ---------------------------------------------------------------------------

fn records() -> Vec<Value> {
    vec![
        json!({"id": 1, "label": "Ängby Skola", "adress": {"city": "Bromma"}, "tags": ["f-9"]}),
        json!({"id": 2, "label": "Oak School", "adress": {"city": "Lund"}, "tags": ["gy", "vux"]}),
        json!({"id": 3, "label": "Oakwood Academy", "adress": {"city": "Malmö"}}),
        json!({"id": 4, "label": "Lundby School", "adress": {"city": "Göteborg"}}),
        json!({"id": 5, "label": "Pine School", "adress": {"city": "Lund"}}),
        json!({"id": 6, "label": "   "}),
    ]
}

fn dataset() -> Rc<Dataset> {
    Rc::new(Dataset::from_records(&records(), &default_map, None))
}

fn matcher(keys: Vec<SearchKey>) -> Matcher {
    Matcher::new(dataset(), keys, FuzzyOptions::default(), Some(Rc::new(TieredScorer)))
}

fn ids(items: &[Rc<CanonicalItem>]) -> Vec<&str> {
    items.iter().map(|i| i.id.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Record mapping
// ---------------------------------------------------------------------------

/// Numeric ids are stringified and blank labels dropped.
#[test]
fn default_mapping_stringifies_and_drops_blank_labels() {
    let ds = dataset();
    assert_eq!(ds.len(), 5);
    assert_eq!(ds.items()[0].id, "1");
    assert_eq!(ds.items()[0].folded, "angby skola");
}

/// A filter sees canonical items and runs after the blank-label drop.
#[test]
fn filter_keeps_matching_items() {
    let in_lund = |item: &CanonicalItem| item.raw["adress"]["city"] == "Lund";
    let ds = Dataset::from_records(&records(), &default_map, Some(&in_lund));
    assert_eq!(ids(ds.items()), ["2", "5"]);
}

/// A custom mapping can read other fields and attach secondary text.
#[test]
fn custom_mapping_with_secondary_text() {
    let map = |record: &Value| {
        let name = record.get("label")?.as_str()?;
        let city = record.pointer("/adress/city")?.as_str()?;
        Some(CanonicalItem::new(name, name, record.clone()).with_secondary(city))
    };
    let ds = Dataset::from_records(&records(), &map, None);
    assert_eq!(ds.len(), 5);
    assert_eq!(ds.items()[1].id, "Oak School");
    assert_eq!(ds.items()[1].secondary.as_deref(), Some("Lund"));
}

// ---------------------------------------------------------------------------
// Key extraction
// ---------------------------------------------------------------------------

/// Reserved names map to item fields, anything else to a raw path.
#[test]
fn key_names_parse() {
    assert_eq!(SearchKey::new("id").path, KeyPath::Id);
    assert_eq!(SearchKey::new("folded").path, KeyPath::Folded);
    assert_eq!(
        SearchKey::new("raw.adress.city").path,
        KeyPath::Raw("adress.city".to_owned())
    );
}

/// Arrays under a raw path yield one value per element.
#[test]
fn raw_array_yields_every_value() {
    let ds = dataset();
    let tags = SearchKey::new("tags");
    assert_eq!(tags.extract(&ds.items()[1]), ["gy", "vux"]);
    assert!(tags.extract(&ds.items()[2]).is_empty());
}

/// Keys deserialize from bare names and weighted objects.
#[test]
fn keys_deserialize_from_field_json() {
    let config: FieldConfig = serde_json::from_value(json!({
        "targetLabel": "School",
        "keys": ["label", {"name": "adress.city", "weight": 0.5}],
    }))
    .unwrap();
    let keys = config.search_keys();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], SearchKey::label());
    assert_eq!(keys[1], SearchKey::new("adress.city").weight(0.5));
}

/// No configured keys means the label only.
#[test]
fn label_is_the_default_key() {
    assert_eq!(FieldConfig::by_label("School").search_keys(), [SearchKey::label()]);
}

// ---------------------------------------------------------------------------
// Matching across keys
// ---------------------------------------------------------------------------

/// A secondary key finds items whose label does not match.
#[test]
fn secondary_key_finds_items() {
    let m = matcher(vec![SearchKey::label(), SearchKey::new("adress.city")]);
    assert_eq!(ids(&m.search("malmo", 8)), ["3"]);
}

/// A lighter key's hits rank below a heavier key's hits.
#[test]
fn lighter_key_ranks_below_label_hits() {
    let m = matcher(vec![
        SearchKey::label(),
        SearchKey::new("adress.city").weight(0.5),
    ]);
    assert_eq!(ids(&m.search("lund", 8)), ["4", "2", "5"]);
}

/// With equal weights, an exact city hit beats a label prefix.
#[test]
fn equal_weights_compare_raw_scores() {
    let m = matcher(vec![SearchKey::label(), SearchKey::new("adress.city")]);
    assert_eq!(ids(&m.search("lund", 8)), ["2", "5", "4"]);
}

/// Without a scorer, search is a folded substring filter in dataset order.
#[test]
fn substring_fallback_without_scorer() {
    let m = Matcher::new(dataset(), vec![], FuzzyOptions::default(), None);
    assert_eq!(ids(&m.search("SKOL", 8)), ["1"]);
    assert_eq!(ids(&m.search("school", 8)), ["2", "4", "5"]);
}

/// A blank query returns the first items up to the limit.
#[test]
fn blank_query_lists_dataset_head() {
    let m = matcher(vec![]);
    assert_eq!(ids(&m.search("  ", 2)), ["1", "2"]);
}
