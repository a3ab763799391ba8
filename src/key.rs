//! Search keys: which values of a canonical item are matched, and how much
//! each one weighs.
//!
//! A [`SearchKey`] names one value of a [`CanonicalItem`](crate::item::CanonicalItem):
//! its label, its id, its folded label, or a dotted path into the raw record
//! (for secondary fields such as a city). Keys deserialize either from a bare
//! string (`"label"`) or from `{ "name": "adress.city", "weight": 1 }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::item::{CanonicalItem, scalar_to_string, value_at_path};

/// Where a key reads its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPath {
    /// The item label.
    Label,
    /// The item id.
    Id,
    /// The folded label (`folded`, or `_fold`).
    Folded,
    /// A dotted path into the raw record.
    Raw(String),
}

impl KeyPath {
    /// Parse a key name.
    ///
    /// # Examples
    ///
    /// ```
    /// use autofield::key::KeyPath;
    ///
    /// assert_eq!(KeyPath::parse("label"), KeyPath::Label);
    /// assert_eq!(KeyPath::parse("_fold"), KeyPath::Folded);
    /// assert_eq!(KeyPath::parse("adress.city"), KeyPath::Raw("adress.city".into()));
    /// ```
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "label" => KeyPath::Label,
            "id" => KeyPath::Id,
            "folded" | "_fold" => KeyPath::Folded,
            other => KeyPath::Raw(other.trim_start_matches("raw.").to_owned()),
        }
    }

    fn name(&self) -> String {
        match self {
            KeyPath::Label => "label".to_owned(),
            KeyPath::Id => "id".to_owned(),
            KeyPath::Folded => "folded".to_owned(),
            KeyPath::Raw(path) => path.clone(),
        }
    }
}

/// One weighted search key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "KeyRepr", into = "KeyRepr")]
pub struct SearchKey {
    /// Value source.
    pub path: KeyPath,
    /// Relative weight; the heaviest key of a field counts fully, lighter
    /// keys have their scores pulled toward "no match".
    pub weight: f64,
}

impl SearchKey {
    /// A key with weight 1.
    pub fn new(name: &str) -> Self {
        Self {
            path: KeyPath::parse(name),
            weight: 1.0,
        }
    }

    /// Set the weight.
    #[must_use]
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// The label key every field uses unless configured otherwise.
    pub fn label() -> Self {
        Self::new("label")
    }

    /// Pull this key's value out of `item`, if it has one.
    ///
    /// Raw paths that land on arrays yield one value per scalar element.
    ///
    /// # Examples
    ///
    /// ```
    /// use autofield::item::CanonicalItem;
    /// use autofield::key::SearchKey;
    /// use serde_json::json;
    ///
    /// let item = CanonicalItem::new("7", "Oak School", json!({"adress": {"city": "Lund"}}));
    /// assert_eq!(SearchKey::new("adress.city").extract(&item), vec!["Lund"]);
    /// assert_eq!(SearchKey::label().extract(&item), vec!["Oak School"]);
    /// ```
    pub fn extract(&self, item: &CanonicalItem) -> Vec<String> {
        match &self.path {
            KeyPath::Label => vec![item.label.clone()],
            KeyPath::Id => vec![item.id.clone()],
            KeyPath::Folded => vec![item.folded.clone()],
            KeyPath::Raw(path) => match value_at_path(&item.raw, path) {
                Some(Value::Array(values)) => values.iter().filter_map(scalar_to_string).collect(),
                Some(value) => scalar_to_string(value).into_iter().collect(),
                None => Vec::new(),
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum KeyRepr {
    Name(String),
    Weighted {
        name: String,
        #[serde(default = "default_weight")]
        weight: f64,
    },
}

fn default_weight() -> f64 {
    1.0
}

impl From<KeyRepr> for SearchKey {
    fn from(repr: KeyRepr) -> Self {
        match repr {
            KeyRepr::Name(name) => SearchKey::new(&name),
            KeyRepr::Weighted { name, weight } => SearchKey::new(&name).weight(weight),
        }
    }
}

impl From<SearchKey> for KeyRepr {
    fn from(key: SearchKey) -> Self {
        KeyRepr::Weighted {
            name: key.path.name(),
            weight: key.weight,
        }
    }
}
