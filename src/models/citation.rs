use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::MatchMetadata;

const UNTITLED: &str = "Untitled";
const UNKNOWN_AUTHOR: &str = "Unknown";
const NO_DATE: &str = "n.d.";

/// A formatted source reference: `"{title} by {author} ({year})"`.
///
/// Two excerpts from the same paper format to the same citation and compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Citation(String);

impl Citation {
    /// Formats a citation from match metadata, substituting
    /// `Untitled`, `Unknown` and `n.d.` for missing fields.
    pub fn from_metadata(meta: &MatchMetadata) -> Self {
        Self(format!(
            "{} by {} ({})",
            meta.title.as_deref().unwrap_or(UNTITLED),
            meta.author.as_deref().unwrap_or(UNKNOWN_AUTHOR),
            meta.publication_year.as_deref().unwrap_or(NO_DATE),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deduplicated collection of citations gathered across all batches.
///
/// Insertion order is not significant; iteration is sorted so the rendered
/// `Sources` block is stable between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CitationSet(BTreeSet<Citation>);

impl CitationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a citation, returning `false` if it was already present.
    pub fn insert(&mut self, citation: Citation) -> bool {
        self.0.insert(citation)
    }

    pub fn extend(&mut self, citations: impl IntoIterator<Item = Citation>) {
        self.0.extend(citations);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, citation: &Citation) -> bool {
        self.0.contains(citation)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Citation> {
        self.0.iter()
    }

    /// Renders one citation per line.
    pub fn to_lines(&self) -> String {
        self.0
            .iter()
            .map(Citation::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FromIterator<Citation> for CitationSet {
    fn from_iter<I: IntoIterator<Item = Citation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
