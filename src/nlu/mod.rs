// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Keyword matching: intents, emotion and deterministic reply selection
//!
//! Everything here is a pure function of the input text. Keyword tables are
//! bilingual (Russian and English) and checked in a fixed order, so the
//! first table that matches decides the intent.

pub mod entities;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use entities::{Entities, EntityExtractor};

/// What the user wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Help,
    Thanks,
    Greeting,
    Farewell,
    System,
    Time,
    Search,
    Open,
    Close,
    Weather,
    Entertainment,
    Question,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Help => "help",
            Intent::Thanks => "thanks",
            Intent::Greeting => "greeting",
            Intent::Farewell => "farewell",
            Intent::System => "system",
            Intent::Time => "time",
            Intent::Search => "search",
            Intent::Open => "open",
            Intent::Close => "close",
            Intent::Weather => "weather",
            Intent::Entertainment => "entertainment",
            Intent::Question => "question",
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emotional tone of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Positive,
    Negative,
    Neutral,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Positive => "positive",
            Emotion::Negative => "negative",
            Emotion::Neutral => "neutral",
        }
    }
}

// Intent tables, checked top to bottom.
const HELP: &[&str] = &["помощь", "помоги", "что ты умеешь", "команды", "help", "what can you do", "commands"];
const THANKS: &[&str] = &["спасибо", "благодарю", "thanks", "thank you"];
const GREETING: &[&str] = &[
    "привет", "здравствуй", "добрый день", "добрый вечер", "доброе утро", "хай",
    "hello", "hi", "hey", "good morning",
];
const FAREWELL: &[&str] = &["пока", "до свидания", "прощай", "выход", "bye", "goodbye", "exit", "see you"];
const SYSTEM: &[&str] = &[
    "систем", "информация", "состояние", "процесс", "памят", "диск",
    "cpu", "ram", "system", "memory", "disk", "status",
];
const TIME: &[&str] = &["время", "который час", "дата", "дату", "число", "time", "date", "clock"];
const SEARCH: &[&str] = &["найди", "найти", "поиск", "search", "find", "google"];
const OPEN: &[&str] = &["открой", "запусти", "включи", "open", "launch", "start", "run"];
const CLOSE: &[&str] = &[
    "закрой", "останови", "выключи", "заверши",
    "close", "stop", "kill", "quit", "shutdown", "shut down",
];
const WEATHER: &[&str] = &["погод", "температур", "дождь", "дождя", "солнц", "weather", "temperature", "rain", "forecast"];
const ENTERTAINMENT: &[&str] = &[
    "музык", "фильм", "игра", "игру", "развлеч", "шутка", "шутку", "шутки", "анекдот",
    "music", "movie", "game", "joke", "fun",
];
const QUESTION: &[&str] = &[
    "как", "почему", "что", "где", "когда", "кто", "какой", "зачем",
    "what", "why", "how", "where", "when", "who", "which",
];

const INTENT_TABLE: &[(Intent, &[&str])] = &[
    (Intent::Help, HELP),
    (Intent::Thanks, THANKS),
    (Intent::Greeting, GREETING),
    (Intent::Farewell, FAREWELL),
    (Intent::System, SYSTEM),
    (Intent::Time, TIME),
    (Intent::Search, SEARCH),
    (Intent::Open, OPEN),
    (Intent::Close, CLOSE),
    (Intent::Weather, WEATHER),
    (Intent::Entertainment, ENTERTAINMENT),
    (Intent::Question, QUESTION),
];

const POSITIVE_WORDS: &[&str] = &[
    "хорошо", "отлично", "прекрасно", "спасибо", "класс", "супер", "люблю",
    "good", "great", "excellent", "thanks", "love", "awesome",
];
const NEGATIVE_WORDS: &[&str] = &[
    "плохо", "ужасно", "ненавижу", "бесит", "раздражает", "разочарован",
    "bad", "terrible", "hate", "awful", "annoying",
];

/// Minimum keyword length (in characters) for prefix matching
const PREFIX_MIN_CHARS: usize = 5;

/// Lower-cased text split into punctuation-free words
#[derive(Debug, Clone)]
pub struct Normalized {
    pub text: String,
    pub words: Vec<String>,
}

/// Lower-case, collapse whitespace and strip punctuation around words
pub fn normalize(text: &str) -> Normalized {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    Normalized {
        text: words.join(" "),
        words,
    }
}

impl Normalized {
    /// Does this keyword occur in the text?
    ///
    /// Phrases match as a substring. Single words match exactly, or as a
    /// word prefix once they are long enough to be a stem.
    pub fn matches(&self, keyword: &str) -> bool {
        if keyword.contains(' ') {
            return self.text.contains(keyword);
        }
        let prefix_ok = keyword.chars().count() >= PREFIX_MIN_CHARS;
        self.words
            .iter()
            .any(|w| w == keyword || (prefix_ok && w.starts_with(keyword)))
    }

    pub fn matches_any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.matches(k))
    }

    /// Number of distinct keywords present
    pub fn count(&self, keywords: &[&str]) -> usize {
        keywords.iter().filter(|k| self.matches(k)).count()
    }
}

/// Classify a message by the first matching keyword table
pub fn detect_intent(text: &str) -> Intent {
    let normalized = normalize(text);
    for (intent, keywords) in INTENT_TABLE {
        if normalized.matches_any(keywords) {
            return *intent;
        }
    }
    if text.trim_end().ends_with('?') {
        return Intent::Question;
    }
    Intent::Unknown
}

/// Positive vs negative word count
pub fn analyze_emotion(text: &str) -> Emotion {
    let (positive, negative) = sentiment_counts(text);
    if positive > negative {
        Emotion::Positive
    } else if negative > positive {
        Emotion::Negative
    } else {
        Emotion::Neutral
    }
}

/// Number of positive and negative words in a message
pub fn sentiment_counts(text: &str) -> (usize, usize) {
    let normalized = normalize(text);
    (normalized.count(POSITIVE_WORDS), normalized.count(NEGATIVE_WORDS))
}

/// Short stable identifier for a message
pub fn context_id(text: &str) -> String {
    let hash = blake3::hash(text.as_bytes());
    hash.to_hex().as_str()[..8].to_string()
}

/// Choose one of several reply variants, always the same one for the same text
pub fn pick<'a>(text: &str, variants: &[&'a str]) -> &'a str {
    if variants.is_empty() {
        return "";
    }
    let hash = blake3::hash(text.as_bytes());
    let n = hash.as_bytes()[..8]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    variants[(n % variants.len() as u64) as usize]
}

/// Remove every occurrence of the given trigger words from a message
pub fn strip_keywords(text: &str, keywords: &[&str]) -> String {
    let normalized = normalize(text);
    let mut rest = format!(" {} ", normalized.text);
    for keyword in keywords {
        let pattern = format!(" {} ", keyword);
        while rest.contains(&pattern) {
            rest = rest.replacen(&pattern, " ", 1);
        }
    }
    rest.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trigger words for web searches, exposed for the search skill
pub fn search_keywords() -> &'static [&'static str] {
    SEARCH
}
