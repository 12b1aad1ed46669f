//! Glob matching for KEYS.
//!
//! Supported syntax:
//! - `*` matches any run of bytes (including none)
//! - `?` matches exactly one byte
//! - `[abc]`, `[a-z]`, `[^a]` match one byte from (or outside) a class
//! - `\x` matches `x` literally
//!
//! Matching is done on raw bytes, so binary keys are matched too.

/// A compiled-once glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: Vec<u8>,
}

impl GlobPattern {
    pub fn new(pattern: impl AsRef<[u8]>) -> Self {
        Self {
            pattern: pattern.as_ref().to_vec(),
        }
    }

    /// Returns true for `*`, which matches every key.
    pub fn is_match_all(&self) -> bool {
        self.pattern == b"*"
    }

    pub fn matches(&self, text: &[u8]) -> bool {
        matches_at(&self.pattern, text)
    }
}

fn matches_at(pattern: &[u8], text: &[u8]) -> bool {
    let Some((&head, rest)) = pattern.split_first() else {
        return text.is_empty();
    };

    match head {
        b'*' => {
            // collapse runs of stars
            let rest = trim_stars(rest);
            if rest.is_empty() {
                return true;
            }
            (0..=text.len()).any(|i| matches_at(rest, &text[i..]))
        }
        b'?' => !text.is_empty() && matches_at(rest, &text[1..]),
        b'[' => match text.split_first() {
            Some((&byte, text_rest)) => match match_class(rest, byte) {
                Some((true, after)) => matches_at(after, text_rest),
                _ => false,
            },
            None => false,
        },
        b'\\' if !rest.is_empty() => {
            text.first() == Some(&rest[0]) && matches_at(&rest[1..], &text[1..])
        }
        literal => text.first() == Some(&literal) && matches_at(rest, &text[1..]),
    }
}

fn trim_stars(mut pattern: &[u8]) -> &[u8] {
    while let Some((&b'*', rest)) = pattern.split_first() {
        pattern = rest;
    }
    pattern
}

/// Matches `byte` against a character class whose opening `[` has already
/// been consumed. Returns whether it matched and the pattern after `]`,
/// or None for an unterminated class.
fn match_class(class: &[u8], byte: u8) -> Option<(bool, &[u8])> {
    let (negate, mut i) = match class.first() {
        Some(b'^') => (true, 1),
        _ => (false, 0),
    };
    let mut matched = false;

    while i < class.len() && class[i] != b']' {
        if class[i] == b'\\' && i + 1 < class.len() {
            i += 1;
            matched |= class[i] == byte;
        } else if i + 2 < class.len() && class[i + 1] == b'-' && class[i + 2] != b']' {
            let (lo, hi) = if class[i] <= class[i + 2] {
                (class[i], class[i + 2])
            } else {
                (class[i + 2], class[i])
            };
            matched |= (lo..=hi).contains(&byte);
            i += 2;
        } else {
            matched |= class[i] == byte;
        }
        i += 1;
    }

    if i >= class.len() {
        return None;
    }
    Some((matched != negate, &class[i + 1..]))
}
