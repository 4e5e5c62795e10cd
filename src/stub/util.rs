use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Truncate `input` to at most `max_chars` Unicode characters, stripping
/// control characters and appending `…` when truncated.
pub fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    let clean: String = input.chars().filter(|c| !c.is_control()).collect();
    if clean.chars().count() > max_chars {
        let mut s: String = clean.chars().take(max_chars).collect();
        s.push('…');
        s
    } else {
        clean
    }
}

/// Character offset of a byte index that lies on a char boundary.
pub fn char_offset(text: &str, byte_idx: usize) -> usize {
    text.get(..byte_idx).map_or(0, |prefix| prefix.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_counts_chars_not_bytes() {
        assert_eq!(truncate_with_ellipsis("héllo wörld", 5), "héllo…");
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("a\nb", 10), "ab");
    }

    #[test]
    fn char_offset_handles_multibyte_prefix() {
        let text = "€€ Alert:";
        let byte_idx = text.find("Alert").expect("marker");
        assert_eq!(byte_idx, 7);
        assert_eq!(char_offset(text, byte_idx), 3);
    }
}
