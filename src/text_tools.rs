// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Text statistics, naive summaries and a word-level ru/en dictionary

use serde::{Deserialize, Serialize};

use crate::nlu::{analyze_emotion, normalize, sentiment_counts, Emotion};
use crate::{RavenError, Result};

const WORDS_PER_MINUTE: f64 = 200.0;
const SUMMARY_SENTENCES: usize = 3;

/// (russian, english)
const DICTIONARY: &[(&str, &str)] = &[
    ("привет", "hello"),
    ("пока", "goodbye"),
    ("спасибо", "thank you"),
    ("пожалуйста", "please"),
    ("да", "yes"),
    ("нет", "no"),
    ("друг", "friend"),
    ("мир", "world"),
    ("день", "day"),
    ("ночь", "night"),
    ("утро", "morning"),
    ("время", "time"),
    ("погода", "weather"),
    ("музыка", "music"),
    ("компьютер", "computer"),
    ("помощь", "help"),
    ("хорошо", "good"),
    ("плохо", "bad"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysis {
    pub word_count: usize,
    pub character_count: usize,
    pub sentence_count: usize,
    pub reading_time_minutes: f64,
    pub sentiment: Emotion,
    pub positive_words: usize,
    pub negative_words: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    pub original_length: usize,
    pub summary_length: usize,
    pub reduction_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub original: String,
    pub translation: String,
    pub target_language: String,
}

fn require_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RavenError::InvalidRequest("No text provided".to_string()));
    }
    Ok(())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn analyze(text: &str) -> Result<TextAnalysis> {
    require_text(text)?;

    let word_count = text.split_whitespace().count();
    let (positive, negative) = sentiment_counts(text);

    Ok(TextAnalysis {
        word_count,
        character_count: text.chars().count(),
        sentence_count: text.chars().filter(|c| matches!(c, '.' | '!' | '?')).count(),
        reading_time_minutes: round1(word_count as f64 / WORDS_PER_MINUTE),
        sentiment: analyze_emotion(text),
        positive_words: positive,
        negative_words: negative,
    })
}

/// Keep the first three sentences. Empty fragments between periods, such
/// as the one after a final `.`, are not sentences.
pub fn summarize(text: &str) -> Result<Summary> {
    require_text(text)?;

    let sentences: Vec<&str> = text
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let summary = if sentences.len() > SUMMARY_SENTENCES {
        format!("{}.", sentences[..SUMMARY_SENTENCES].join(". "))
    } else {
        text.trim().to_string()
    };

    let original_length = text.chars().count();
    let summary_length = summary.chars().count();
    let reduction = (1.0 - summary_length as f64 / original_length as f64) * 100.0;

    Ok(Summary {
        summary,
        original_length,
        summary_length,
        reduction_percent: round1(reduction.max(0.0)),
    })
}

/// Word-by-word translation; words missing from the dictionary are kept
pub fn translate(text: &str, target: &str) -> Result<Translation> {
    require_text(text)?;

    let target = target.trim().to_lowercase();
    let lookup: fn(&str) -> Option<&'static str> = match target.as_str() {
        "en" => |word| DICTIONARY.iter().find(|(ru, _)| *ru == word).map(|(_, en)| *en),
        "ru" => |word| DICTIONARY.iter().find(|(_, en)| *en == word).map(|(ru, _)| *ru),
        other => {
            return Err(RavenError::InvalidRequest(format!(
                "unsupported target language '{}', expected en or ru",
                other
            )))
        }
    };

    let translation = normalize(text)
        .words
        .iter()
        .map(|word| lookup(word).map(str::to_string).unwrap_or_else(|| word.clone()))
        .collect::<Vec<_>>()
        .join(" ");

    Ok(Translation {
        original: text.to_string(),
        translation,
        target_language: target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_counts() {
        let a = analyze("Это отлично. Спасибо! Правда?").unwrap();
        assert_eq!(a.word_count, 4);
        assert_eq!(a.sentence_count, 3);
        assert_eq!(a.sentiment, Emotion::Positive);
        assert_eq!(a.positive_words, 2);
        assert_eq!(a.reading_time_minutes, 0.0);

        let long = "word ".repeat(300);
        assert_eq!(analyze(&long).unwrap().reading_time_minutes, 1.5);
    }

    #[test]
    fn test_summarize_keeps_three_sentences() {
        let s = summarize("One. Two. Three. Four. Five.").unwrap();
        assert_eq!(s.summary, "One. Two. Three.");
        assert_eq!(s.original_length, 28);
        assert!(s.reduction_percent > 0.0);

        let short = summarize("Just one sentence.").unwrap();
        assert_eq!(short.summary, "Just one sentence.");
        assert_eq!(short.reduction_percent, 0.0);
    }

    #[test]
    fn test_summarize_ignores_empty_fragments() {
        let three = summarize("A. B. C.").unwrap();
        assert_eq!(three.summary, "A. B. C.");
        assert_eq!(three.reduction_percent, 0.0);

        let four = summarize("A. B.. C. D").unwrap();
        assert_eq!(four.summary, "A. B. C.");
    }

    #[test]
    fn test_translate_both_directions() {
        let t = translate("Привет, друг!", "en").unwrap();
        assert_eq!(t.translation, "hello friend");
        assert_eq!(translate("hello unknown world", "ru").unwrap().translation, "привет unknown мир");
        assert!(matches!(translate("hi", "de"), Err(RavenError::InvalidRequest(_))));
    }

    #[test]
    fn test_empty_text_rejected() {
        assert!(analyze("  ").is_err());
        assert!(summarize("").is_err());
        assert!(translate("", "en").is_err());
    }
}
