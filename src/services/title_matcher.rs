//! Title parsing and normalization used to pair tracks across providers.

use crate::models::ParsedTitle;
use regex::Regex;
use std::sync::LazyLock;

/// Tried in this order; the first one present wins.
const SEPARATORS: [&str; 5] = [" - ", " – ", " — ", " | ", " : "];

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[(\[][^\])]*[)\]]").expect("valid bracket pattern"));

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\s]").expect("valid punctuation pattern"));

fn strip_bracketed(raw: &str) -> String {
    BRACKETED.replace_all(raw, "").into_owned()
}

/// Splits a display title such as `"Shape of You - Ed Sheeran (Official Video)"`.
///
/// Bracketed qualifiers are dropped first. The text before the first matching
/// separator becomes `track` and everything after it becomes `artist`.
pub fn parse_title(raw: &str) -> ParsedTitle {
    let clean = strip_bracketed(raw);

    for sep in SEPARATORS {
        if let Some((before, after)) = clean.split_once(sep) {
            return ParsedTitle {
                track: before.trim().to_string(),
                artist: after.trim().to_string(),
            };
        }
    }

    ParsedTitle {
        artist: String::new(),
        track: clean.trim().to_string(),
    }
}

/// Lowercase ASCII alphanumerics separated by single spaces, with bracketed
/// qualifiers removed.
pub fn normalize(title: &str) -> String {
    let stripped = strip_bracketed(title);
    let alphanumeric = NON_ALPHANUMERIC.replace_all(&stripped, "");
    alphanumeric
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First candidate whose normalized title equals the normalized `track`.
pub fn first_exact_match<'a, T>(
    track: &str,
    candidates: &'a [T],
    title_of: impl Fn(&T) -> &str,
) -> Option<&'a T> {
    let wanted = normalize(track);
    candidates
        .iter()
        .find(|candidate| normalize(title_of(candidate)) == wanted)
}
