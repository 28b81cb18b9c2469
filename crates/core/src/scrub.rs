//! Conversion of arbitrary catalog text into safe path segments.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Punctuation that survives scrubbing unchanged.
const KEEP_CHARACTERS: &[char] = &['-', '_', '.', '(', ')', ' ', '\''];

/// Right single quotation mark, folded to a plain apostrophe.
const RIGHT_SINGLE_QUOTE: char = '\u{2019}';

/// Map arbitrary text to a string that is safe to use as one path segment.
///
/// The text is decomposed (NFD) and combining marks are dropped, so accented
/// letters fall back to their base letter. Alphanumerics and a small set of
/// punctuation are kept; every other character (including path separators)
/// becomes a single space. Surrounding whitespace is trimmed.
///
/// Returns an empty string for empty or all-punctuation input; callers pick
/// a default name in that case.
pub fn scrub(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_alphanumeric() || KEEP_CHARACTERS.contains(&c) {
            out.push(c);
        } else if c == RIGHT_SINGLE_QUOTE {
            out.push('\'');
        } else {
            out.push(' ');
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_diacritics() {
        assert_eq!(scrub("Café"), "Cafe");
        assert_eq!(scrub("Škoda Ångström naïve"), "Skoda Angstrom naive");
    }

    #[test]
    fn test_disallowed_punctuation_becomes_spaces() {
        assert_eq!(scrub("Café — 'Intro'"), "Cafe   'Intro'");
        assert_eq!(scrub("a/b\\c:d"), "a b c d");
        assert_eq!(scrub("What? Why!"), "What  Why");
    }

    #[test]
    fn test_deterministic() {
        let first = scrub("Café — 'Intro'");
        for _ in 0..3 {
            assert_eq!(scrub("Café — 'Intro'"), first);
        }
    }

    #[test]
    fn test_keeps_allowed_punctuation() {
        assert_eq!(scrub("Smith J - A (short) intro_v2.1"), "Smith J - A (short) intro_v2.1");
    }

    #[test]
    fn test_right_quote_folds_to_apostrophe() {
        assert_eq!(scrub("O\u{2019}Brien"), "O'Brien");
    }

    #[test]
    fn test_trims_both_ends() {
        assert_eq!(scrub("  «quoted»  "), "quoted");
        assert_eq!(scrub("+Folder"), "Folder");
    }

    #[test]
    fn test_empty_and_all_punctuation() {
        assert_eq!(scrub(""), "");
        assert_eq!(scrub("?!*"), "");
    }

    #[test]
    fn test_non_latin_alphanumerics_survive() {
        assert_eq!(scrub("東京 2020"), "東京 2020");
    }
}
