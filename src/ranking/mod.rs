//! The fuzzy scorer the matcher delegates to.
//!
//! A candidate is first classified into a ranking tier (exact, prefix, word
//! prefix, substring, acronym, in-order fuzzy), and the tier is then mapped
//! onto a score in `0.0..=1.0` where `0.0` is a perfect match. The matcher
//! only sees the [`Scorer`] trait, so a different scorer can be plugged in
//! through [`Options::with_scorer`](crate::options::Options::with_scorer).

use memchr::memmem;

use crate::normalize::strip_diacritics;
use crate::options::FuzzyOptions;

/// How well a candidate matches a query, best first.
///
/// | Tier                 | Meaning                                      |
/// |----------------------|----------------------------------------------|
/// | `CaseSensitiveEqual` | identical after diacritic folding            |
/// | `Equal`              | identical ignoring case                      |
/// | `StartsWith`         | candidate starts with the query              |
/// | `WordStartsWith`     | a word of the candidate starts with the query|
/// | `Contains`           | query is a substring                         |
/// | `Acronym`            | query is a substring of the word initials    |
/// | `Matches(f64)`       | query characters appear in order             |
/// | `NoMatch`            | none of the above                            |
///
/// `Matches` carries `1.0 + 1.0 / spread` where `spread` is the distance
/// between the first and last matched characters, so it lies in `(1.0, 2.0]`.
#[derive(Debug, Clone, Copy)]
pub enum Ranking {
    /// Identical after diacritic folding, case included.
    CaseSensitiveEqual,
    /// Identical ignoring case.
    Equal,
    /// Candidate starts with the query.
    StartsWith,
    /// A space-delimited word of the candidate starts with the query.
    WordStartsWith,
    /// The query appears somewhere inside the candidate.
    Contains,
    /// The query appears inside the candidate's acronym.
    Acronym,
    /// In-order character match with its closeness sub-score.
    Matches(f64),
    /// No match.
    NoMatch,
}

impl Ranking {
    fn tier(&self) -> u8 {
        match self {
            Ranking::CaseSensitiveEqual => 7,
            Ranking::Equal => 6,
            Ranking::StartsWith => 5,
            Ranking::WordStartsWith => 4,
            Ranking::Contains => 3,
            Ranking::Acronym => 2,
            Ranking::Matches(_) => 1,
            Ranking::NoMatch => 0,
        }
    }
}

// Two `Matches` compare by sub-score, everything else by tier.
impl PartialEq for Ranking {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Ranking::Matches(a), Ranking::Matches(b)) => a == b,
            _ => self.tier() == other.tier(),
        }
    }
}

impl PartialOrd for Ranking {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Ranking::Matches(a), Ranking::Matches(b)) => a.partial_cmp(b),
            _ => self.tier().partial_cmp(&other.tier()),
        }
    }
}

/// The tier a candidate reached plus where the query was found.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classified {
    /// Ranking tier.
    pub rank: Ranking,
    /// Character offset of the substring hit (0 for non-substring tiers).
    pub offset: usize,
    /// Candidate length in characters after folding.
    pub len: usize,
}

/// Greedy forward in-order character match.
///
/// # Examples
///
/// ```
/// use autofield::ranking::{get_closeness_ranking, Ranking};
///
/// assert!(matches!(get_closeness_ranking("playground", "plgnd"), Ranking::Matches(s) if s > 1.0 && s < 2.0));
/// assert_eq!(get_closeness_ranking("abc", "xyz"), Ranking::NoMatch);
/// assert_eq!(get_closeness_ranking("ab", "a"), Ranking::Matches(2.0));
/// ```
pub fn get_closeness_ranking(candidate: &str, query: &str) -> Ranking {
    let mut candidate_chars = candidate.chars().enumerate();
    let mut first: Option<usize> = None;
    let mut last = 0;

    for q in query.chars() {
        match candidate_chars.find(|&(_, c)| c == q) {
            Some((pos, _)) => {
                first.get_or_insert(pos);
                last = pos;
            }
            None => return Ranking::NoMatch,
        }
    }

    let spread = last - first.unwrap_or(0);
    if spread == 0 {
        Ranking::Matches(2.0)
    } else {
        Ranking::Matches(1.0 + 1.0 / spread as f64)
    }
}

/// Word initials, splitting on spaces and hyphens.
///
/// # Examples
///
/// ```
/// use autofield::ranking::get_acronym;
///
/// assert_eq!(get_acronym("north-west airlines"), "nwa");
/// assert_eq!(get_acronym(""), "");
/// ```
pub fn get_acronym(s: &str) -> String {
    let is_delim = |c: char| c == ' ' || c == '-';
    let mut acronym = String::with_capacity(1 + memchr::memchr2_iter(b' ', b'-', s.as_bytes()).count());
    let mut prev = ' ';
    for c in s.chars() {
        if is_delim(prev) && !is_delim(c) {
            acronym.push(c);
        }
        prev = c;
    }
    acronym
}

/// Classify `candidate` against `query`.
///
/// Both sides are diacritic-folded; everything after the exact comparison is
/// case-insensitive.
///
/// # Examples
///
/// ```
/// use autofield::ranking::{classify, Ranking};
///
/// assert_eq!(classify("Oak School", "Oak School").rank, Ranking::CaseSensitiveEqual);
/// assert_eq!(classify("Oak School", "oak sch").rank, Ranking::StartsWith);
/// assert_eq!(classify("Oak School", "school").rank, Ranking::WordStartsWith);
/// assert_eq!(classify("Malmö Östra", "malmo").rank, Ranking::StartsWith);
/// assert_eq!(classify("Riverside", "xyz").rank, Ranking::NoMatch);
/// ```
pub fn classify(candidate: &str, query: &str) -> Classified {
    let candidate = strip_diacritics(candidate);
    let query = strip_diacritics(query);
    let len = candidate.chars().count();
    let at = |rank| Classified { rank, offset: 0, len };

    let query_len = query.chars().count();
    if query_len > len {
        return at(Ranking::NoMatch);
    }
    if candidate == query {
        return at(Ranking::CaseSensitiveEqual);
    }

    let lower = candidate.to_lowercase();
    let q = query.to_lowercase();
    if q.is_empty() {
        return at(if lower.is_empty() { Ranking::Equal } else { Ranking::StartsWith });
    }

    let finder = memmem::Finder::new(q.as_bytes());
    let bytes = lower.as_bytes();
    let mut hits = finder.find_iter(bytes);
    if let Some(first) = hits.next() {
        if first == 0 {
            return at(if lower.len() == q.len() { Ranking::Equal } else { Ranking::StartsWith });
        }
        let offset = lower[..first].chars().count();
        if bytes[first - 1] == b' ' || hits.any(|pos| bytes[pos - 1] == b' ') {
            return Classified {
                rank: Ranking::WordStartsWith,
                offset,
                len,
            };
        }
        return Classified {
            rank: Ranking::Contains,
            offset,
            len,
        };
    }

    // A single character that is not a substring cannot match further down.
    if query_len == 1 {
        return at(Ranking::NoMatch);
    }
    if get_acronym(&lower).contains(&q) {
        return at(Ranking::Acronym);
    }
    at(get_closeness_ranking(&lower, &q))
}

/// Scores one candidate string against a query; `None` means no match,
/// `Some(0.0)` a perfect one.
pub trait Scorer {
    /// Score `candidate` against `query`.
    fn score(&self, candidate: &str, query: &str, options: &FuzzyOptions) -> Option<f64>;
}

/// The default scorer: tier classification mapped onto `0.0..=1.0`.
///
/// Fixed tiers map to fixed scores; substring hits are pushed toward worse
/// scores by their offset unless `ignore_location` is set; in-order fuzzy
/// matches score by how densely the query fills the matched window.
#[derive(Debug, Clone, Copy, Default)]
pub struct TieredScorer;

impl Scorer for TieredScorer {
    fn score(&self, candidate: &str, query: &str, options: &FuzzyOptions) -> Option<f64> {
        let classified = classify(candidate, query);
        let located = |base: f64| {
            if options.ignore_location || classified.len == 0 {
                base
            } else {
                base + 0.5 * classified.offset as f64 / classified.len as f64
            }
        };
        match classified.rank {
            Ranking::CaseSensitiveEqual => Some(0.0),
            Ranking::Equal => Some(0.01),
            Ranking::StartsWith => Some(0.05),
            Ranking::WordStartsWith => Some(located(0.1)),
            Ranking::Contains => Some(located(0.15)),
            Ranking::Acronym => Some(0.25),
            Ranking::Matches(sub) => {
                let spread = if sub >= 2.0 { 0.0 } else { (1.0 / (sub - 1.0)).round() };
                let density = query.chars().count() as f64 / (spread + 1.0);
                Some(0.25 + 0.75 * (1.0 - density.min(1.0)))
            }
            Ranking::NoMatch => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering_descending() {
        assert!(Ranking::CaseSensitiveEqual > Ranking::Equal);
        assert!(Ranking::Equal > Ranking::StartsWith);
        assert!(Ranking::StartsWith > Ranking::WordStartsWith);
        assert!(Ranking::WordStartsWith > Ranking::Contains);
        assert!(Ranking::Contains > Ranking::Acronym);
        assert!(Ranking::Acronym > Ranking::Matches(2.0));
        assert!(Ranking::Matches(1.1) > Ranking::NoMatch);
        assert!(Ranking::Matches(1.9) > Ranking::Matches(1.1));
    }

    #[test]
    fn acronym_edges() {
        assert_eq!(get_acronym("san francisco"), "sf");
        assert_eq!(get_acronym("a  b"), "ab");
        assert_eq!(get_acronym("snake_case word"), "sw");
        assert_eq!(get_acronym("trailing- "), "t");
    }

    #[test]
    fn classify_contains_reports_offset() {
        let c = classify("Riverside Academy", "side");
        assert_eq!(c.rank, Ranking::Contains);
        assert_eq!(c.offset, 5);
        assert_eq!(c.len, 17);
    }

    #[test]
    fn classify_word_start_on_later_hit() {
        // First hit "an" inside "Manor", a later one starts "Annex".
        assert_eq!(classify("Manor annex", "an").rank, Ranking::WordStartsWith);
    }

    #[test]
    fn classify_acronym_and_fuzzy() {
        assert_eq!(classify("North West Academy", "nwa").rank, Ranking::Acronym);
        assert!(matches!(classify("playground", "plgnd").rank, Ranking::Matches(_)));
        assert_eq!(classify("abc", "z").rank, Ranking::NoMatch);
    }

    #[test]
    fn classify_longer_query_never_matches() {
        assert_eq!(classify("Oak", "Oak School").rank, Ranking::NoMatch);
    }

    #[test]
    fn scores_follow_tiers() {
        let opts = FuzzyOptions::default();
        let s = |c: &str, q: &str| TieredScorer.score(c, q, &opts);
        assert_eq!(s("Oak", "Oak"), Some(0.0));
        assert!(s("Oak School", "oak").unwrap() < s("Big Oak School", "oak").unwrap());
        assert!(s("Big Oak School", "oak").unwrap() < s("Cloaks", "oak").unwrap());
        assert_eq!(s("Oak", "pine"), None);
    }

    #[test]
    fn location_penalty_only_when_enabled() {
        let mut opts = FuzzyOptions::default();
        let ignored = TieredScorer.score("abcdefghij oak", "oak", &opts).unwrap();
        opts.ignore_location = false;
        let located = TieredScorer.score("abcdefghij oak", "oak", &opts).unwrap();
        assert!(located > ignored);
    }

    #[test]
    fn dense_fuzzy_beats_sparse_fuzzy() {
        let opts = FuzzyOptions::default();
        let dense = TieredScorer.score("oakxschool", "oaks", &opts).unwrap();
        let sparse = TieredScorer.score("oxxaxxkxxs", "oaks", &opts).unwrap();
        assert!(dense < sparse);
    }
}
