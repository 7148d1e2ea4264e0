//! Channel text parsing and trigger matching.
//!
//! Channel text arrives as `"<sender>: <body>"`. The body is clamped and then
//! matched against fixed synonym sets. Matching never fails loudly: text that
//! does not parse or does not match simply yields no triggers.
use log::trace;

use crate::validation::clamp_utf8;

/// Longest body, in bytes, considered for matching.
pub const MAX_BODY_BYTES: usize = 199;
/// Longest sender name, in bytes, kept from the text.
pub const MAX_SENDER_BYTES: usize = 99;

const PING_WORDS: &[&str] = &["ping", "test", "пинг", "тест"];
// Addressed keywords are compared against whole words; a phrase must match
// consecutive words.
const STATS_WORDS: &[&str] = &["stats", "stat", "стат", "статы", "статистика", "статистику"];
const THANKS_WORDS: &[&str] = &["thanks", "thank you", "thx", "спасибо", "спс"];
const WEATHER_WORDS: &[&str] = &["weather", "погода", "погоду", "погоды"];
const REPEATERS_WORDS: &[&str] = &[
    "repeaters",
    "репитеры",
    "репитеров",
    "ретрансляторы",
    "ретрансляторов",
];

/// Sender and body of one channel line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedText<'a> {
    pub sender: &'a str,
    pub body: &'a str,
}

/// Split `"<sender>: <body>"`. Returns `None` without a separator, an empty
/// sender or an empty body.
pub fn parse_channel_text(text: &str) -> Option<ParsedText<'_>> {
    let (sender, body) = text.split_once(':')?;
    let sender = clamp_utf8(sender.trim(), MAX_SENDER_BYTES);
    let body = clamp_utf8(body.trim(), MAX_BODY_BYTES).trim_end();
    if sender.is_empty() || body.is_empty() {
        return None;
    }
    Some(ParsedText { sender, body })
}

/// A phrase the bot reacts to. Variants are declared in reply order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Trigger {
    Ping,
    Stats,
    Thanks,
    Weather,
    Repeaters,
}

/// Matches bodies against the synonym sets. `mention` is the bot's plain name;
/// addressed triggers only fire when the body contains it.
#[derive(Debug, Clone)]
pub struct TriggerMatcher {
    mention: String,
    addressed: bool,
}

impl TriggerMatcher {
    /// With `addressed` false only the ping trigger is active.
    pub fn new(mention: &str, addressed: bool) -> Self {
        Self {
            mention: mention.to_lowercase(),
            addressed,
        }
    }

    /// All triggers fired by `body`, in reply order.
    pub fn matches(&self, body: &str) -> Vec<Trigger> {
        let lower = body.to_lowercase();
        let mut fired = Vec::new();

        if PING_WORDS.iter().any(|w| lower == *w) {
            fired.push(Trigger::Ping);
        }

        if self.addressed && !self.mention.is_empty() && lower.contains(&self.mention) {
            // keywords are searched outside the mention itself
            let rest = lower.replacen(&self.mention, " ", 1);
            let words: Vec<&str> = rest
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .collect();
            let has = |set: &[&str]| set.iter().any(|phrase| contains_phrase(&words, phrase));
            if has(STATS_WORDS) {
                fired.push(Trigger::Stats);
            }
            if has(THANKS_WORDS) {
                fired.push(Trigger::Thanks);
            }
            if has(WEATHER_WORDS) {
                fired.push(Trigger::Weather);
            }
            if has(REPEATERS_WORDS) {
                fired.push(Trigger::Repeaters);
            }
        }

        if !fired.is_empty() {
            trace!("Triggers {:?} from body of {} bytes", fired, body.len());
        }
        fired
    }
}

fn contains_phrase(words: &[&str], phrase: &str) -> bool {
    let parts: Vec<&str> = phrase.split(' ').collect();
    words.windows(parts.len()).any(|w| w == parts.as_slice())
}

/// Russian plural of "hop" for `n`.
pub fn hop_word(n: usize) -> &'static str {
    let tens = n % 100;
    if (11..=14).contains(&tens) {
        return "хопов";
    }
    match n % 10 {
        1 => "хоп",
        2..=4 => "хопа",
        _ => "хопов",
    }
}
