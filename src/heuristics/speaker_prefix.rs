use std::sync::LazyLock;

use chrono::NaiveTime;
use regex::Regex;

/// "Mr WILSON (Goldstein) (12:01): " / "The SPEAKER: " / "Senator WONG (10:02): "
///
/// The label must contain a word in capitals, which is how the transcript
/// prints speaker names, so ordinary sentences with a colon are left alone.
static SPEAKER_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*[^:]{0,120}?\b[A-Z][A-Z'\-]+\b[^:]{0,80}?(?:\((?P<h>\d{1,2}):(?P<m>\d{2})\))?\s*:\s*",
    )
    .expect("speaker prefix pattern is valid")
});

/// Opening text of a run with its printed speaker prefix removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedOpening {
    pub text: String,
    /// Time printed in the prefix, e.g. `(12:01)`
    pub time: Option<NaiveTime>,
}

/// Strip the speaker prefix from the opening paragraph of a run
pub fn strip_speaker_prefix(paragraph: &str) -> StrippedOpening {
    match SPEAKER_PREFIX.captures(paragraph) {
        Some(caps) => {
            let time = match (caps.name("h"), caps.name("m")) {
                (Some(h), Some(m)) => {
                    let hour = h.as_str().parse().ok();
                    let minute = m.as_str().parse().ok();
                    hour.zip(minute)
                        .and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0))
                }
                _ => None,
            };
            let end = caps.get(0).map(|m| m.end()).unwrap_or(0);
            StrippedOpening {
                text: paragraph[end..].trim().to_string(),
                time,
            }
        }
        None => StrippedOpening {
            text: paragraph.trim().to_string(),
            time: None,
        },
    }
}

/// Parse a talker `<time.stamp>` value ("12:01:00" or "12:01")
pub fn parse_time_stamp(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}
