use regex::Regex;
use std::sync::LazyLock;

pub trait TextCleaner {
    fn clean(&self, raw_body: &str) -> String;
}

pub const DEFAULT_DISCLAIMERS: &[&str] = &[
    "External Email",
    "EXTERNAL:",
    "This message originated outside",
    "Click here to unsubscribe",
    "Manage your email preferences",
];

/// Byte sequences left behind when UTF-8 punctuation was decoded as cp1252.
const MOJIBAKE: &[(&str, &str)] = &[
    ("â€™", "'"),
    ("â€˜", "'"),
    ("â€œ", "\""),
    ("â€\u{9d}", "\""),
    ("â€”", "—"),
    ("â€“", "–"),
    ("â€¢", "•"),
    ("â€¦", "..."),
    ("Ã©", "é"),
    ("Ã¨", "è"),
    ("Ã ", "à"),
    ("Â", ""),
];

static FOOTER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)(?:to unsubscribe.*?bloomberg\.com|view this email in your browser|bloomberg l\.p\..*?rights reserved|copyright.*?bloomberg|this email was sent to|update your email preferences).*$",
    )
    .expect("valid footer regex")
});

static RUN_OF_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid whitespace regex"));

static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid newline regex"));

/// Removes disclaimer phrases and footer lines, repairs common mojibake and
/// collapses whitespace. Line structure is kept so metadata headers survive.
#[derive(Debug, Clone)]
pub struct BasicCleaner {
    disclaimers: Option<Regex>,
}

impl BasicCleaner {
    pub fn new() -> Self {
        Self::with_disclaimers(DEFAULT_DISCLAIMERS.iter().copied())
    }

    pub fn with_disclaimers<'a>(phrases: impl IntoIterator<Item = &'a str>) -> Self {
        let alternation = phrases
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|");
        let disclaimers = if alternation.is_empty() {
            None
        } else {
            Regex::new(&format!("(?i)(?:{alternation})")).ok()
        };
        Self { disclaimers }
    }
}

impl Default for BasicCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl TextCleaner for BasicCleaner {
    fn clean(&self, raw_body: &str) -> String {
        let mut text = raw_body.replace("\r\n", "\n").replace('\r', "\n");
        if let Some(disclaimers) = &self.disclaimers {
            text = disclaimers.replace_all(&text, "").into_owned();
        }
        for (broken, fixed) in MOJIBAKE {
            if text.contains(broken) {
                text = text.replace(broken, fixed);
            }
        }
        text = FOOTER_LINE.replace_all(&text, "").into_owned();
        text = RUN_OF_SPACES.replace_all(&text, " ").into_owned();
        let text = text
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        EXCESS_BLANK_LINES
            .replace_all(&text, "\n\n")
            .trim()
            .to_string()
    }
}
