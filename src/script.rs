use regex::Regex;
use std::fmt;
use tracing::debug;

/// The two fixed podcast voices. Vincent presents the article, Marina asks
/// the questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speaker {
    Vincent,
    Marina,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Vincent => "Vincent",
            Speaker::Marina => "Marina",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One speaker-attributed dialogue line. `index` is the playback order and
/// never changes after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub speaker: Speaker,
    pub text: String,
    pub index: usize,
}

/// Parse a generated transcript into ordered utterances.
///
/// Only lines prefixed with a known speaker name count as dialogue; stage
/// directions, blank lines and anything else are skipped.
pub fn parse_script(raw: &str) -> Vec<Utterance> {
    let re = Regex::new(r"^(Vincent|Marina):\s*(.*)$").unwrap();
    let mut utterances = Vec::new();
    for line in raw.lines() {
        let Some(caps) = re.captures(line.trim()) else {
            continue;
        };
        let text = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        if text.is_empty() {
            debug!("Skipping empty dialogue line: {}", line);
            continue;
        }
        let speaker = match &caps[1] {
            "Vincent" => Speaker::Vincent,
            _ => Speaker::Marina,
        };
        utterances.push(Utterance {
            speaker,
            text: text.to_string(),
            index: utterances.len(),
        });
    }
    utterances
}
