use crate::stub::pipeline::RunSummary;
use crate::stub::registry::{RegistryStats, StubRegistry};
use crate::stub::util::truncate_with_ellipsis;

const SUBJECT_CHARS: usize = 60;

pub fn stats_lines(stats: &RegistryStats) -> Vec<String> {
    vec![
        format!("stubs.total={}", stats.total),
        format!("stubs.pending={}", stats.pending),
        format!("stubs.completed={}", stats.completed),
        format!("stubs.pending_with_story_id={}", stats.pending_with_story_id),
        format!(
            "stubs.pending_without_story_id={}",
            stats.pending_without_story_id
        ),
    ]
}

/// One line per PENDING stub, oldest first, at most `limit` lines plus a
/// trailing count of the rest.
pub fn pending_lines(registry: &StubRegistry, limit: usize) -> Vec<String> {
    let mut pending = registry.pending().collect::<Vec<_>>();
    pending.sort_by_key(|r| r.received_at);

    let mut out = pending
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, r)| {
            format!(
                "pending[{}] {} | received={} | story_id={}",
                i + 1,
                truncate_with_ellipsis(&r.subject, SUBJECT_CHARS),
                r.received_at.format("%Y-%m-%d %H:%M"),
                r.story_id.as_deref().unwrap_or("none")
            )
        })
        .collect::<Vec<_>>();
    if pending.len() > limit {
        out.push(format!("pending.more={}", pending.len() - limit));
    }
    out
}

pub fn summary_lines(prefix: &str, summary: &RunSummary) -> Vec<String> {
    vec![
        format!("{prefix}.started_at={}", summary.started_at.to_rfc3339()),
        format!("{prefix}.duration_secs={:.2}", summary.duration_secs()),
        format!("{prefix}.messages_seen={}", summary.messages_seen),
        format!("{prefix}.complete_indexed={}", summary.complete_indexed),
        format!("{prefix}.stubs_created={}", summary.stubs_created),
        format!("{prefix}.stubs_completed={}", summary.stubs_completed),
        format!("{prefix}.duplicates={}", summary.duplicates),
        format!("{prefix}.errors={}", summary.errors),
    ]
}
