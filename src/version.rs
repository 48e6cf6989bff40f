//! Go version tags and their ordering.
//!
//! Go tags look like `go1.22.3`, `go1.21rc2` or `go1.9beta1`. govm stores
//! them without the `go` prefix. Pre-releases sort before the release they
//! precede: `1.21rc2 < 1.21.0 < 1.21.1`.

use std::cmp::Ordering;

/// Strip a leading `go` and surrounding whitespace.
pub fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim();
    tag.strip_prefix("go").unwrap_or(tag).to_string()
}

/// Tag in the `go`-prefixed form used by release filenames.
pub fn go_tag(tag: &str) -> String {
    format!("go{}", normalize_tag(tag))
}

/// Whether a tag looks like a Go version at all.
pub fn is_valid_tag(tag: &str) -> bool {
    let tag = normalize_tag(tag);
    !tag.is_empty()
        && tag.chars().next().is_some_and(|c| c.is_ascii_digit())
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.')
}

/// Pre-release stage, ordered before a final release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Beta(u32),
    Rc(u32),
    Release,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Parsed {
    parts: [u32; 3],
    stage: Stage,
}

fn parse(tag: &str) -> Option<Parsed> {
    let tag = normalize_tag(tag);
    let (numeric, stage) = match tag.find(|c: char| c.is_ascii_alphabetic()) {
        Some(pos) => {
            let (num, suffix) = tag.split_at(pos);
            let stage = if let Some(n) = suffix.strip_prefix("rc") {
                Stage::Rc(n.parse().ok()?)
            } else if let Some(n) = suffix.strip_prefix("beta") {
                Stage::Beta(n.parse().ok()?)
            } else {
                return None;
            };
            (num.to_string(), stage)
        }
        None => (tag, Stage::Release),
    };

    let mut parts = [0u32; 3];
    for (i, piece) in numeric.split('.').enumerate() {
        if i >= parts.len() {
            return None;
        }
        parts[i] = piece.parse().ok()?;
    }
    Some(Parsed { parts, stage })
}

/// Whether a tag is a final release (no beta/rc suffix).
pub fn is_stable(tag: &str) -> bool {
    parse(tag).is_some_and(|p| p.stage == Stage::Release)
}

/// Compare two version tags semantically.
///
/// Unparseable tags fall back to lexicographic order and sort before any
/// parseable tag.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(pa), Some(pb)) => pa
            .parts
            .cmp(&pb.parts)
            .then_with(|| pa.stage.cmp(&pb.stage)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}
