//! Workspace slug helpers

use rand::Rng;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Length of the random suffix appended on slug collisions
pub const SLUG_SUFFIX_LEN: usize = 5;

/// Number of suffixed candidates tried before giving up
pub const MAX_SLUG_ATTEMPTS: usize = 10;

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Turn arbitrary text into a URL-safe slug.
///
/// Accents are folded (`Café` → `cafe`), anything outside `[a-z0-9 -]` is
/// dropped, whitespace becomes `-` and dash runs collapse.
pub fn slugify(input: &str) -> String {
    let folded: String = input
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    let mut slug = String::with_capacity(folded.len());
    for c in folded.trim().chars() {
        let mapped = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            Some(c)
        } else if c.is_whitespace() || c == '-' {
            Some('-')
        } else {
            None
        };

        if let Some(c) = mapped {
            if c == '-' && slug.ends_with('-') {
                continue;
            }
            slug.push(c);
        }
    }

    slug.trim_matches('-').to_string()
}

/// `base` followed by `-` and a random lowercase alphanumeric suffix
pub fn with_random_suffix(base: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SLUG_SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect();
    format!("{}-{}", base, suffix)
}
