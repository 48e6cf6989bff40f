//! Resolving a user-supplied identifier to an installed toolchain.
//!
//! Matchers run in a fixed order and the first one with any hit decides:
//!
//! 1. exact tag (`1.22.3`)
//! 2. exact install path (`/usr/local/go`)
//! 3. path suffix (`sys-1.22`)
//! 4. path substring (`local/go`)
//!
//! A tag installed both by govm and on the system resolves to the first one
//! listed. The path matchers must hit exactly one install; several hits are
//! reported as [`GovmError::AmbiguousVersion`] instead of silently picking one.

use crate::error::{GovmError, Result};
use crate::registry::InstalledVersion;

/// One resolution strategy.
pub trait Matcher: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, query: &str, candidate: &InstalledVersion) -> bool;
    /// Whether several hits from this matcher are acceptable.
    fn allows_multiple(&self) -> bool {
        false
    }
}

pub struct ExactTag;

impl Matcher for ExactTag {
    fn name(&self) -> &'static str {
        "exact tag"
    }

    fn matches(&self, query: &str, candidate: &InstalledVersion) -> bool {
        candidate.version == query || candidate.version == crate::version::normalize_tag(query)
    }

    // A tag may be installed both by govm and on the system; the listed
    // order (managed first) decides.
    fn allows_multiple(&self) -> bool {
        true
    }
}

pub struct ExactPath;

impl Matcher for ExactPath {
    fn name(&self) -> &'static str {
        "exact path"
    }

    fn matches(&self, query: &str, candidate: &InstalledVersion) -> bool {
        candidate.path_str() == query.trim_end_matches(['/', '\\'])
    }
}

pub struct PathSuffix;

impl Matcher for PathSuffix {
    fn name(&self) -> &'static str {
        "path suffix"
    }

    fn matches(&self, query: &str, candidate: &InstalledVersion) -> bool {
        candidate.path_str().ends_with(query)
    }
}

pub struct PathSubstring;

impl Matcher for PathSubstring {
    fn name(&self) -> &'static str {
        "path substring"
    }

    fn matches(&self, query: &str, candidate: &InstalledVersion) -> bool {
        candidate.path_str().contains(query)
    }
}

/// An ordered chain of matchers.
pub struct Resolver {
    matchers: Vec<Box<dyn Matcher>>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            matchers: vec![
                Box::new(ExactTag),
                Box::new(ExactPath),
                Box::new(PathSuffix),
                Box::new(PathSubstring),
            ],
        }
    }
}

impl Resolver {
    pub fn with_matchers(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    /// Resolve `query` against `installed` (in listed order).
    pub fn resolve<'a>(
        &self,
        query: &str,
        installed: &'a [InstalledVersion],
    ) -> Result<&'a InstalledVersion> {
        let query = query.trim();
        if !query.is_empty() {
            for matcher in &self.matchers {
                let hits: Vec<&InstalledVersion> = installed
                    .iter()
                    .filter(|c| matcher.matches(query, c))
                    .collect();

                match hits.as_slice() {
                    [] => continue,
                    [only] => {
                        tracing::debug!("Resolved '{}' by {}", query, matcher.name());
                        return Ok(*only);
                    }
                    [first, ..] if matcher.allows_multiple() => return Ok(*first),
                    _ => {
                        return Err(GovmError::AmbiguousVersion {
                            query: query.to_string(),
                            candidates: pairs(hits.iter().copied()),
                        });
                    }
                }
            }
        }

        Err(GovmError::VersionNotFound {
            query: query.to_string(),
            installed: pairs(installed.iter()),
            suggestion: suggest(query, installed),
        })
    }
}

fn pairs<'a>(versions: impl Iterator<Item = &'a InstalledVersion>) -> Vec<(String, String)> {
    versions
        .map(|v| (v.version.clone(), v.path_str()))
        .collect()
}

/// Closest installed tag by edit distance, if reasonably close.
fn suggest(query: &str, installed: &[InstalledVersion]) -> Option<String> {
    installed
        .iter()
        .map(|v| (strsim::levenshtein(query, &v.version), &v.version))
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, tag)| tag.clone())
}
