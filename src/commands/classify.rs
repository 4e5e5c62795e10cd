use anyhow::{Context, Result};
use std::path::Path;

use crate::commands::{CommandReport, Workspace};
use crate::error::ErrorCode;
use crate::processing::cleaner::BasicCleaner;
use crate::source::mailbox::read_message_file;
use crate::source::{Connector, RawMessage};
use crate::stub::classifier::{ClassificationResult, Classifier, StubTag};
use crate::stub::util::truncate_with_ellipsis;

fn describe(message: &RawMessage, result: &ClassificationResult) -> String {
    let ev = &result.evidence;
    let pos = |v: Option<usize>| v.map_or_else(|| "-".to_string(), |n| n.to_string());
    format!(
        "{} tag={} rule={} chars={} sentinel={} byline={} marker={} metadata={} after_marker={} subject={}",
        message.external_id,
        result.tag,
        result.rule,
        ev.cleaned_chars,
        pos(ev.sentinel_at),
        pos(ev.byline_at),
        pos(ev.marker_at),
        pos(ev.metadata_at),
        pos(ev.content_after_marker),
        truncate_with_ellipsis(&message.subject, 60)
    )
}

/// Classification diagnostics; never moves anything.
pub fn run(path: Option<&Path>, folder: Option<&str>) -> Result<CommandReport> {
    let ws = Workspace::load()?;
    let mut report = CommandReport::new("classify");
    let classifier = Classifier::new(ws.config.classifier.clone());
    let cleaner = BasicCleaner::new();
    report.detail(format!("rules={}", classifier.rule_names().join(",")));

    let messages = match path {
        Some(file) => {
            let message = read_message_file(file, &file.display().to_string())
                .with_context(|| format!("failed to read message {}", file.display()))?;
            vec![message]
        }
        None => {
            let folder = folder.unwrap_or(&ws.config.folders.source);
            match ws.connector.list_messages(folder) {
                Ok(messages) => messages,
                Err(err) => {
                    report.coded_issue(ErrorCode::E003SourceUnavailable, err);
                    return Ok(report);
                }
            }
        }
    };

    let mut stubs = 0usize;
    for message in &messages {
        let result = classifier.classify(message, &cleaner);
        if result.tag == StubTag::Stub {
            stubs += 1;
        }
        report.detail(describe(message, &result));
    }
    report.detail(format!(
        "classified={} stubs={} complete={}",
        messages.len(),
        stubs,
        messages.len() - stubs
    ));
    Ok(report)
}
