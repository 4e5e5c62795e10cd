//! Placeholder vs complete classification.
//!
//! An ordered list of named rules is evaluated against evidence gathered once
//! from the cleaned body; the first rule that applies decides. The last rule
//! always applies, so every message gets a definite tag.

use crate::processing::cleaner::TextCleaner;
use crate::processing::metadata::is_header_line;
use crate::source::RawMessage;
use crate::stub::config::ClassifierConfig;
use crate::stub::util::char_offset;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static BYLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*By[ \t]+[A-Z][A-Za-z.'-]+(?:[ \t]+(?:and[ \t]+)?[A-Z][A-Za-z.'-]+)+")
        .expect("valid byline regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StubTag {
    Stub,
    Complete,
}

impl fmt::Display for StubTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stub => write!(f, "STUB"),
            Self::Complete => write!(f, "COMPLETE"),
        }
    }
}

/// Facts about a cleaned body. Offsets and lengths are in characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Evidence {
    pub cleaned_chars: usize,
    pub sentinel_at: Option<usize>,
    pub byline_at: Option<usize>,
    pub marker_at: Option<usize>,
    pub metadata_at: Option<usize>,
    pub content_after_marker: Option<usize>,
}

fn line_spans(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    text.split_inclusive('\n').map(move |chunk| {
        let start = offset;
        offset += chunk.len();
        (start, chunk.trim_end_matches(['\n', '\r']))
    })
}

fn starts_with_marker(line: &str, markers: &[String]) -> bool {
    let lower = line.trim_start().to_ascii_lowercase();
    markers
        .iter()
        .map(|m| m.trim().to_ascii_lowercase())
        .any(|m| !m.is_empty() && lower.starts_with(&m))
}

impl Evidence {
    pub fn gather(cleaned: &str, cfg: &ClassifierConfig) -> Self {
        // ASCII lowercasing keeps byte offsets aligned with `cleaned`.
        let lower = cleaned.to_ascii_lowercase();

        let sentinel_at = cleaned
            .find(cfg.article_sentinel.as_str())
            .map(|b| char_offset(cleaned, b));

        let window_end = cleaned
            .char_indices()
            .nth(cfg.byline_window_chars)
            .map_or(cleaned.len(), |(idx, _)| idx);
        let byline_at = BYLINE
            .find(&cleaned[..window_end])
            .map(|m| char_offset(cleaned, m.start()));

        let marker_byte = cfg
            .operator_markers
            .iter()
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
            .filter_map(|m| lower.find(&m))
            .min();

        let scan_from = marker_byte.map_or(0, |b| {
            cleaned[b..]
                .find('\n')
                .map_or(cleaned.len(), |nl| b + nl + 1)
        });
        let metadata_byte = line_spans(cleaned)
            .filter(|(start, _)| *start >= scan_from)
            .find(|(_, line)| cfg.metadata_headers.iter().any(|h| is_header_line(line, h)))
            .map(|(start, _)| start);

        let content_after_marker = marker_byte.map(|_| {
            let end = metadata_byte.unwrap_or(cleaned.len());
            cleaned[scan_from.min(end)..end]
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !starts_with_marker(line, &cfg.operator_markers))
                .map(|line| line.chars().count())
                .sum()
        });

        Self {
            cleaned_chars: cleaned.chars().count(),
            sentinel_at,
            byline_at,
            marker_at: marker_byte.map(|b| char_offset(cleaned, b)),
            metadata_at: metadata_byte.map(|b| char_offset(cleaned, b)),
            content_after_marker,
        }
    }
}

pub type Predicate = fn(&Evidence, &ClassifierConfig) -> bool;

#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub verdict: StubTag,
    pub applies: Predicate,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("verdict", &self.verdict)
            .finish()
    }
}

fn has_sentinel(ev: &Evidence, _: &ClassifierConfig) -> bool {
    ev.sentinel_at.is_some()
}

fn has_byline(ev: &Evidence, _: &ClassifierConfig) -> bool {
    ev.byline_at.is_some()
}

fn thin_alert(ev: &Evidence, cfg: &ClassifierConfig) -> bool {
    match (ev.marker_at, ev.content_after_marker) {
        (Some(at), Some(content)) => {
            at < cfg.early_marker_window_chars && content < cfg.thin_content_chars
        }
        _ => false,
    }
}

fn has_marker(ev: &Evidence, _: &ClassifierConfig) -> bool {
    ev.marker_at.is_some()
}

fn short_body(ev: &Evidence, cfg: &ClassifierConfig) -> bool {
    ev.cleaned_chars < cfg.min_complete_chars
}

fn always(_: &Evidence, _: &ClassifierConfig) -> bool {
    true
}

pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "article-sentinel",
            verdict: StubTag::Complete,
            applies: has_sentinel,
        },
        Rule {
            name: "author-byline",
            verdict: StubTag::Complete,
            applies: has_byline,
        },
        Rule {
            name: "thin-alert",
            verdict: StubTag::Stub,
            applies: thin_alert,
        },
        Rule {
            name: "marker-with-content",
            verdict: StubTag::Complete,
            applies: has_marker,
        },
        Rule {
            name: "short-body",
            verdict: StubTag::Stub,
            applies: short_body,
        },
        Rule {
            name: "fallback",
            verdict: StubTag::Complete,
            applies: always,
        },
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub tag: StubTag,
    pub rule: &'static str,
    #[serde(flatten)]
    pub evidence: Evidence,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    config: ClassifierConfig,
    rules: Vec<Rule>,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            rules: default_rules(),
        }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    /// Insert `rule` at `index`. The catch-all stays last.
    pub fn insert_rule(&mut self, index: usize, rule: Rule) {
        let last = self.rules.len().saturating_sub(1);
        self.rules.insert(index.min(last), rule);
    }

    pub fn with_rule(mut self, index: usize, rule: Rule) -> Self {
        self.insert_rule(index, rule);
        self
    }

    pub fn classify(&self, message: &RawMessage, cleaner: &dyn TextCleaner) -> ClassificationResult {
        let cleaned = cleaner.clean(&message.body);
        let result = self.classify_cleaned(&cleaned);
        debug!(
            external_id = %message.external_id,
            tag = %result.tag,
            rule = result.rule,
            "classified message"
        );
        result
    }

    pub fn classify_cleaned(&self, cleaned: &str) -> ClassificationResult {
        let evidence = Evidence::gather(cleaned, &self.config);
        let (tag, rule) = self
            .rules
            .iter()
            .find(|rule| (rule.applies)(&evidence, &self.config))
            .map_or((StubTag::Complete, "fallback"), |rule| {
                (rule.verdict, rule.name)
            });
        ClassificationResult {
            tag,
            rule,
            evidence,
        }
    }
}
