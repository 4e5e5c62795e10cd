use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::LazyLock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub story_id: Option<String>,
    pub author: Option<String>,
    pub topics: Vec<String>,
    pub people: Vec<String>,
    pub tickers: Vec<String>,
}

pub trait MetadataExtractor {
    fn extract(
        &self,
        subject: &str,
        cleaned_body: &str,
        received_at: &DateTime<FixedOffset>,
    ) -> DocumentMetadata;
}

static STORY_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)bloomberg\.com/news/articles/(?:\d{4}-\d{2}-\d{2}/)?([A-Z0-9-]+)").expect("valid story id regex")
});

static AUTHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bBy\s+([A-Z][a-z]+\s+[A-Z][a-z]+(?:\s+and\s+[A-Z][a-z]+\s+[A-Z][a-z]+)?)")
        .expect("valid author regex")
});

const AUTHOR_WINDOW_CHARS: usize = 1000;
const SECTION_BREAKS: &[&str] = &["people", "topics", "tickers", "alert", "source"];

pub fn extract_story_id(text: &str) -> Option<String> {
    STORY_ID
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('-').to_string())
        .filter(|id| !id.is_empty())
}

/// True when `line` is a bare section header such as `Topics` or `Topics:`.
pub fn is_header_line(line: &str, header: &str) -> bool {
    let trimmed = line.trim();
    let word = trimmed.strip_suffix(':').unwrap_or(trimmed).trim_end();
    !word.is_empty() && word.eq_ignore_ascii_case(header)
}

fn section_items(body: &str, header: &str) -> Vec<String> {
    let mut lines = body.lines();
    if !lines.by_ref().any(|line| is_header_line(line, header)) {
        return Vec::new();
    }

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for line in lines {
        if SECTION_BREAKS.iter().any(|brk| is_header_line(line, brk)) {
            break;
        }
        // A blank line after items ends the block; trailing footers follow it.
        if line.trim().is_empty() {
            if out.is_empty() {
                continue;
            }
            break;
        }
        for item in line.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if seen.insert(item.to_string()) {
                out.push(item.to_string());
            }
        }
    }
    out
}

/// Regex and line-scanning extractor for the feed's article layout.
#[derive(Debug, Clone, Default)]
pub struct PatternExtractor;

impl MetadataExtractor for PatternExtractor {
    fn extract(
        &self,
        _subject: &str,
        cleaned_body: &str,
        _received_at: &DateTime<FixedOffset>,
    ) -> DocumentMetadata {
        let head_end = cleaned_body
            .char_indices()
            .nth(AUTHOR_WINDOW_CHARS)
            .map_or(cleaned_body.len(), |(idx, _)| idx);
        let author = AUTHOR
            .captures(&cleaned_body[..head_end])
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        DocumentMetadata {
            story_id: extract_story_id(cleaned_body),
            author,
            topics: section_items(cleaned_body, "Topics"),
            people: section_items(cleaned_body, "People"),
            tickers: section_items(cleaned_body, "Tickers"),
        }
    }
}
