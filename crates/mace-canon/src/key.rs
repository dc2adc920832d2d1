// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical-key normalization.

use unicode_normalization::UnicodeNormalization;

/// Maximum length of a canonical key, in code units after normalization.
pub const MAX_KEY_LEN: usize = 64;

/// Normalize free-form text into the canonical key alphabet.
///
/// Steps, in order: NFKD-normalize, lowercase, collapse whitespace runs to
/// `_`, drop characters outside `[a-z0-9_./:-]` (this also discards
/// combining marks left over from decomposition), collapse consecutive `_`,
/// eliminate `_` adjacent to `/`, strip leading/trailing `_`, truncate to 64
/// code units.
///
/// The mapping is many-to-one on purpose: `"Favorite Color"` and
/// `"favorite_color"` address the same record, and collisions resolve as
/// last-write-wins.
///
/// # Examples
///
/// ```
/// assert_eq!(mace_canon::canonical_key("Favorite  Color"), "favorite_color");
/// assert_eq!(mace_canon::canonical_key("user / profile"), "user/profile");
/// ```
#[must_use]
pub fn canonical_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.nfkd() {
        for lc in c.to_lowercase() {
            if lc.is_whitespace() {
                pending_sep = true;
                continue;
            }
            if !matches!(lc, 'a'..='z' | '0'..='9' | '_' | '.' | '/' | ':' | '-') {
                continue;
            }
            if pending_sep {
                key.push('_');
                pending_sep = false;
            }
            key.push(lc);
        }
    }

    let key = collapse_underscores(&key);
    let key = strip_slash_adjacent_underscores(&key);
    let key = key.trim_matches('_');
    key.chars().take(MAX_KEY_LEN).collect()
}

fn collapse_underscores(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_underscore = false;
    for c in s.chars() {
        if c == '_' {
            if prev_underscore {
                continue;
            }
            prev_underscore = true;
        } else {
            prev_underscore = false;
        }
        out.push(c);
    }
    out
}

fn strip_slash_adjacent_underscores(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            let next_is_slash = chars.get(i + 1) == Some(&'/');
            let prev_is_slash = i > 0 && chars[i - 1] == '/';
            if next_is_slash || prev_is_slash {
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_joins_words() {
        assert_eq!(canonical_key("Favorite Color"), "favorite_color");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(canonical_key("a   b\t\nc"), "a_b_c");
    }

    #[test]
    fn drops_disallowed_characters() {
        assert_eq!(canonical_key("héllo!@#wörld"), "helloworld");
        assert_eq!(canonical_key("a(b)c"), "abc");
    }

    #[test]
    fn accents_fold_to_ascii() {
        assert_eq!(canonical_key("Émilie"), "emilie");
    }

    #[test]
    fn collapses_consecutive_underscores() {
        assert_eq!(canonical_key("a__b___c"), "a_b_c");
    }

    #[test]
    fn underscores_adjacent_to_slash_are_removed() {
        assert_eq!(canonical_key("user _/ profile"), "user/profile");
        assert_eq!(canonical_key("a_/_b"), "a/b");
    }

    #[test]
    fn strips_leading_and_trailing_underscores() {
        assert_eq!(canonical_key("  spaced  "), "spaced");
        assert_eq!(canonical_key("_x_"), "x");
    }

    #[test]
    fn truncates_to_sixty_four() {
        let long = "a".repeat(200);
        assert_eq!(canonical_key(&long).len(), MAX_KEY_LEN);
    }

    #[test]
    fn keeps_key_punctuation() {
        assert_eq!(
            canonical_key("world/fact/ohms-law/definition"),
            "world/fact/ohms-law/definition"
        );
        assert_eq!(canonical_key("ns:item.v1"), "ns:item.v1");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["Favorite Color", "a _/ b", "Émilie et Zoë", "__x__/y"] {
            let once = canonical_key(raw);
            assert_eq!(canonical_key(&once), once, "input {raw:?}");
        }
    }

    #[test]
    fn empty_and_symbol_only_inputs_collapse_to_empty() {
        assert_eq!(canonical_key(""), "");
        assert_eq!(canonical_key("!!! ???"), "");
    }
}
