//! Text folding used by label matching and the substring fallback.
//!
//! Everything here is a pure function. The folded form of a string is
//! lowercase, free of combining marks, and has its whitespace collapsed, so
//! `"  Malmö  Östra "` and `"malmo ostra"` compare equal.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Matches the "(required)" markers host themes append to label text.
static REQUIRED_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(\s*(?:krävs|required)\s*\)").expect("required-marker pattern is valid")
});

/// Strip combining marks from `s`.
///
/// Applies NFD decomposition and drops every combining mark, so precomposed
/// characters like `é` become their base letter. Returns [`Cow::Borrowed`]
/// when nothing had to be removed.
///
/// # Examples
///
/// ```
/// use autofield::normalize::strip_diacritics;
///
/// assert_eq!(strip_diacritics("Göteborg"), "Goteborg");
/// assert!(matches!(strip_diacritics("plain"), std::borrow::Cow::Borrowed(_)));
/// ```
pub fn strip_diacritics(s: &str) -> Cow<'_, str> {
    // ASCII never carries combining marks.
    if s.is_ascii() {
        return Cow::Borrowed(s);
    }

    let stripped: String = s.nfd().filter(|c| !is_combining_mark(*c)).collect();
    if stripped == s {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(stripped)
    }
}

/// Collapse every whitespace run into a single space and trim both ends.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Fold `s` for case- and diacritic-insensitive comparison.
///
/// # Examples
///
/// ```
/// use autofield::normalize::fold;
///
/// assert_eq!(fold("  Malmö  Östra "), "malmo ostra");
/// assert_eq!(fold("CAFÉ"), "cafe");
/// ```
pub fn fold(s: &str) -> String {
    collapse_whitespace(&strip_diacritics(s).to_lowercase())
}

/// Fold label text, also dropping the `*` host themes use to flag required
/// fields.
pub fn normalize_label(s: &str) -> String {
    fold(&s.replace('*', ""))
}

/// Remove "(required)" / "(krävs)" markers and collapse whitespace.
///
/// # Examples
///
/// ```
/// use autofield::normalize::strip_required_suffix;
///
/// assert_eq!(strip_required_suffix("School ( Required )"), "School");
/// assert_eq!(strip_required_suffix("Skola (krävs)"), "Skola");
/// ```
pub fn strip_required_suffix(s: &str) -> String {
    collapse_whitespace(&REQUIRED_SUFFIX.replace_all(s, ""))
}

/// Remove required markers without trimming, for editing one text node among
/// several inside a label.
pub(crate) fn strip_required_marker_in_place(s: &str) -> Option<String> {
    if !REQUIRED_SUFFIX.is_match(s) {
        return None;
    }
    let replaced = REQUIRED_SUFFIX.replace_all(s, "");
    let mut out = String::with_capacity(replaced.len());
    let mut last_space = false;
    for c in replaced.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_precomposed_accents() {
        assert_eq!(strip_diacritics("caf\u{00e9}"), "cafe");
        assert_eq!(strip_diacritics("åäö"), "aao");
    }

    #[test]
    fn strips_combining_marks() {
        let result = strip_diacritics("cafe\u{0301}");
        assert_eq!(result, "cafe");
        assert!(matches!(result, Cow::Owned(_)));
    }

    #[test]
    fn borrowed_for_non_ascii_without_marks() {
        let result = strip_diacritics("日本");
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn collapses_inner_whitespace() {
        assert_eq!(collapse_whitespace(" a \t b\n\nc "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn fold_is_idempotent() {
        let once = fold("  Ängelholms  GYMNASIUM ");
        assert_eq!(once, "angelholms gymnasium");
        assert_eq!(fold(&once), once);
    }

    #[test]
    fn normalize_label_drops_asterisks() {
        assert_eq!(normalize_label("School *"), "school");
        assert_eq!(normalize_label("*Skola*"), "skola");
    }

    #[test]
    fn required_suffix_variants() {
        assert_eq!(strip_required_suffix("School (required)"), "School");
        assert_eq!(strip_required_suffix("School (REQUIRED)"), "School");
        assert_eq!(strip_required_suffix("Skola (  Krävs )"), "Skola");
        assert_eq!(strip_required_suffix("Plain label"), "Plain label");
    }

    #[test]
    fn in_place_marker_keeps_edges() {
        assert_eq!(strip_required_marker_in_place("No marker"), None);
        assert_eq!(
            strip_required_marker_in_place("School  (required) ").as_deref(),
            Some("School ")
        );
    }
}
