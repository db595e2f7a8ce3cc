//! Paper Document Model
//!
//! A paper as extracted text: full text, per-page text and a derived title.
//! Also the fixed set of sections the parser splits a paper into.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::agent::AgentRole;

/// Title used when the first page yields no usable line
pub const UNTITLED: &str = "Untitled Research Paper";

/// Page separator emitted by common PDF text extractors
const PAGE_BREAK: char = '\u{000C}';

/// Canonical paper division
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Section {
    Introduction,
    Methodology,
    Results,
    Discussion,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Introduction,
        Section::Methodology,
        Section::Results,
        Section::Discussion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Introduction => "Introduction",
            Section::Methodology => "Methodology",
            Section::Results => "Results",
            Section::Discussion => "Discussion",
        }
    }

    /// Role specialised in analysing this section
    pub fn role(&self) -> AgentRole {
        match self {
            Section::Introduction => AgentRole::Introduction,
            Section::Methodology => AgentRole::Methodology,
            Section::Results => AgentRole::Results,
            Section::Discussion => AgentRole::Discussion,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised section name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSection(pub String);

impl FromStr for Section {
    type Err = UnknownSection;

    /// Case-insensitive, ignores surrounding whitespace
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Section::ALL
            .into_iter()
            .find(|section| section.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownSection(s.to_string()))
    }
}

/// Section name → section text, iterated in canonical order
pub type SectionSet = BTreeMap<Section, String>;

/// Extracted research paper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    full_text: String,
    pages: BTreeMap<usize, String>,
    title: String,
}

impl Document {
    /// Build from page texts in reading order
    pub fn from_pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages: BTreeMap<usize, String> = pages
            .into_iter()
            .map(Into::into)
            .enumerate()
            .collect();

        let full_text = pages.values().map(String::as_str).collect();
        let title = pages
            .get(&0)
            .and_then(|first| derive_title(first))
            .unwrap_or_else(|| UNTITLED.to_string());

        Self {
            full_text,
            pages,
            title,
        }
    }

    /// Parse extracted text with form-feed page breaks
    pub fn from_text(text: &str) -> Self {
        let mut pages: Vec<&str> = text.split(PAGE_BREAK).collect();
        // A closing form feed leaves an empty trailing page
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        Self::from_pages(pages)
    }

    /// Load extracted text from disk
    pub async fn from_text_file(path: &Path) -> std::io::Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_text(&text))
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn pages(&self) -> &BTreeMap<usize, String> {
        &self.pages
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// First non-empty line, trimmed
fn derive_title(page: &str) -> Option<String> {
    page.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
