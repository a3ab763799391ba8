//! Ranked, truncated search over one field's canonical items.
//!
//! A [`Matcher`] pairs a shared [`Dataset`] with the field's search keys,
//! fuzzy options and scorer. Key values are extracted once at construction,
//! so each keystroke only scores strings.
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//! use autofield::item::{CanonicalItem, Dataset};
//! use autofield::key::SearchKey;
//! use autofield::matcher::Matcher;
//! use autofield::options::FuzzyOptions;
//! use autofield::ranking::TieredScorer;
//! use serde_json::Value;
//!
//! let dataset = Rc::new(Dataset::from_items([
//!     CanonicalItem::new("1", "Big Oak Academy", Value::Null),
//!     CanonicalItem::new("2", "Oak School", Value::Null),
//!     CanonicalItem::new("3", "Pine School", Value::Null),
//! ]));
//! let matcher = Matcher::new(
//!     dataset,
//!     vec![SearchKey::label()],
//!     FuzzyOptions::default(),
//!     Some(Rc::new(TieredScorer)),
//! );
//!
//! let labels: Vec<_> = matcher.search("oak", 8).iter().map(|i| i.label.clone()).collect();
//! assert_eq!(labels, ["Oak School", "Big Oak Academy"]);
//! ```

use std::cmp::Ordering;
use std::rc::Rc;

use crate::item::{CanonicalItem, Dataset};
use crate::key::SearchKey;
use crate::normalize::fold;
use crate::options::FuzzyOptions;
use crate::ranking::Scorer;

/// One accepted item with the key that matched it best.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Scored {
    /// Position in the dataset.
    index: usize,
    /// Weighted score, lower is better.
    score: f64,
    /// Index of the key that produced `score`.
    key_index: usize,
}

/// Three-level comparator: lower score first, then earlier key, then
/// dataset order.
fn compare_scored(a: &Scored, b: &Scored) -> Ordering {
    // `partial_cmp` only fails on NaN, which a well-behaved scorer never
    // returns; treat it as a tie so ordering stays total.
    a.score
        .partial_cmp(&b.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.key_index.cmp(&b.key_index))
        .then_with(|| a.index.cmp(&b.index))
}

/// Pull a key's score toward 1.0 ("no match") by its relative weight.
fn weighted(score: f64, weight: f64, max_weight: f64) -> f64 {
    let ratio = if max_weight > 0.0 {
        (weight / max_weight).clamp(0.0, 1.0)
    } else {
        1.0
    };
    1.0 - (1.0 - score) * ratio
}

/// Search over one dataset.
pub struct Matcher {
    dataset: Rc<Dataset>,
    keys: Vec<SearchKey>,
    /// `values[item][key]` holds every string that key yields for the item.
    values: Vec<Vec<Vec<String>>>,
    max_weight: f64,
    fuzzy: FuzzyOptions,
    scorer: Option<Rc<dyn Scorer>>,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("items", &self.dataset.len())
            .field("keys", &self.keys)
            .field("fuzzy", &self.fuzzy)
            .field("scorer", &self.scorer.is_some())
            .finish()
    }
}

impl Matcher {
    /// Build a matcher. An empty `keys` list means the label only.
    pub fn new(
        dataset: Rc<Dataset>,
        keys: Vec<SearchKey>,
        fuzzy: FuzzyOptions,
        scorer: Option<Rc<dyn Scorer>>,
    ) -> Self {
        let keys = if keys.is_empty() {
            vec![SearchKey::label()]
        } else {
            keys
        };
        let values = dataset
            .items()
            .iter()
            .map(|item| keys.iter().map(|key| key.extract(item)).collect())
            .collect();
        let max_weight = keys.iter().map(|k| k.weight).fold(0.0, f64::max);
        Self {
            dataset,
            keys,
            values,
            max_weight,
            fuzzy,
            scorer,
        }
    }

    /// The dataset searched.
    pub fn dataset(&self) -> &Rc<Dataset> {
        &self.dataset
    }

    /// Up to `max(limit, 1)` items best first.
    ///
    /// A blank query returns the first items in dataset order. Results are
    /// deterministic for a fixed dataset and query.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Rc<CanonicalItem>> {
        let limit = limit.max(1);
        let items = self.dataset.items();
        let query = query.trim();
        if query.is_empty() {
            return items.iter().take(limit).cloned().collect();
        }

        let Some(scorer) = &self.scorer else {
            let needle = fold(query);
            return items
                .iter()
                .filter(|item| item.folded.contains(needle.as_str()))
                .take(limit)
                .cloned()
                .collect();
        };

        if query.chars().count() < self.fuzzy.min_match_char_length {
            return Vec::new();
        }

        let mut scored: Vec<Scored> = self
            .values
            .iter()
            .enumerate()
            .filter_map(|(index, per_key)| self.best_score(scorer.as_ref(), index, per_key, query))
            .collect();
        scored.sort_by(compare_scored);
        scored
            .into_iter()
            .take(limit)
            .map(|s| Rc::clone(&items[s.index]))
            .collect()
    }

    fn best_score(
        &self,
        scorer: &dyn Scorer,
        index: usize,
        per_key: &[Vec<String>],
        query: &str,
    ) -> Option<Scored> {
        let mut best: Option<Scored> = None;
        for (key_index, (key, values)) in self.keys.iter().zip(per_key).enumerate() {
            for value in values {
                let Some(raw) = scorer.score(value, query, &self.fuzzy) else {
                    continue;
                };
                if raw > self.fuzzy.threshold {
                    continue;
                }
                let candidate = Scored {
                    index,
                    score: weighted(raw, key.weight, self.max_weight),
                    key_index,
                };
                if best.is_none_or(|b| compare_scored(&candidate, &b) == Ordering::Less) {
                    best = Some(candidate);
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ranking::TieredScorer;

    fn schools() -> Rc<Dataset> {
        Rc::new(Dataset::from_items([
            CanonicalItem::new("1", "Ängby Skola", json!({"city": "Bromma"})),
            CanonicalItem::new("2", "Oak School", json!({"city": "Lund"})),
            CanonicalItem::new("3", "Oakwood Academy", json!({"city": "Malmö"})),
            CanonicalItem::new("4", "Lundby School", json!({"city": "Göteborg"})),
            CanonicalItem::new("5", "Pine School", json!({"city": "Lund"})),
        ]))
    }

    fn matcher(keys: Vec<SearchKey>) -> Matcher {
        Matcher::new(schools(), keys, FuzzyOptions::default(), Some(Rc::new(TieredScorer)))
    }

    fn ids(items: &[Rc<CanonicalItem>]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    // --- comparator ---

    #[test]
    fn lower_score_sorts_first() {
        let a = Scored { index: 5, score: 0.1, key_index: 1 };
        let b = Scored { index: 0, score: 0.2, key_index: 0 };
        assert_eq!(compare_scored(&a, &b), Ordering::Less);
    }

    #[test]
    fn equal_scores_fall_back_to_key_then_index() {
        let a = Scored { index: 5, score: 0.1, key_index: 0 };
        let b = Scored { index: 0, score: 0.1, key_index: 1 };
        assert_eq!(compare_scored(&a, &b), Ordering::Less);
        let c = Scored { index: 0, score: 0.1, key_index: 0 };
        assert_eq!(compare_scored(&a, &c), Ordering::Greater);
    }

    #[test]
    fn weighting_pulls_toward_no_match() {
        assert_eq!(weighted(0.0, 1.0, 1.0), 0.0);
        assert_eq!(weighted(0.0, 0.5, 1.0), 0.5);
        assert_eq!(weighted(0.2, 0.0, 0.0), 0.2);
    }

    // --- search ---

    #[test]
    fn blank_query_returns_dataset_prefix() {
        let m = matcher(vec![]);
        assert_eq!(ids(&m.search("   ", 2)), ["1", "2"]);
    }

    #[test]
    fn limit_zero_still_returns_one() {
        assert_eq!(matcher(vec![]).search("", 0).len(), 1);
    }

    #[test]
    fn diacritics_are_ignored() {
        assert_eq!(ids(&matcher(vec![]).search("angby", 8)), ["1"]);
    }

    #[test]
    fn prefix_beats_substring() {
        assert_eq!(ids(&matcher(vec![]).search("oak", 8)), ["2", "3"]);
    }

    #[test]
    fn secondary_key_matches_after_label() {
        let m = matcher(vec![SearchKey::label(), SearchKey::new("city")]);
        // Equal weights: the exact city hits outrank the label prefix.
        assert_eq!(ids(&m.search("lund", 8)), ["2", "5", "4"]);
    }

    #[test]
    fn lighter_key_ranks_below_heavier() {
        let m = matcher(vec![SearchKey::label(), SearchKey::new("city").weight(0.2)]);
        let found = m.search("lund", 8);
        assert_eq!(found[0].id, "4");
    }

    #[test]
    fn threshold_rejects_loose_matches() {
        let mut fuzzy = FuzzyOptions::default();
        fuzzy.threshold = 0.0;
        let m = Matcher::new(schools(), vec![], fuzzy, Some(Rc::new(TieredScorer)));
        assert!(m.search("oak", 8).is_empty());
        assert_eq!(ids(&m.search("Oak School", 8)), ["2"]);
    }

    #[test]
    fn min_match_char_length_gates_short_queries() {
        let mut fuzzy = FuzzyOptions::default();
        fuzzy.min_match_char_length = 3;
        let m = Matcher::new(schools(), vec![], fuzzy, Some(Rc::new(TieredScorer)));
        assert!(m.search("oa", 8).is_empty());
        assert!(!m.search("oak", 8).is_empty());
    }

    #[test]
    fn substring_fallback_keeps_dataset_order() {
        let m = Matcher::new(schools(), vec![], FuzzyOptions::default(), None);
        assert_eq!(ids(&m.search("SCHOOL", 8)), ["2", "4", "5"]);
        assert_eq!(ids(&m.search("school", 2)), ["2", "4"]);
    }

    #[test]
    fn search_is_repeatable() {
        let m = matcher(vec![]);
        assert_eq!(m.search("sch", 3), m.search("sch", 3));
    }
}
