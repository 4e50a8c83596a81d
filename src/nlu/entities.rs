// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Entity extraction: applications, URLs, files, numbers, dates and times

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::normalize;
use crate::config::AppEntry;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)[^\s]+").expect("valid url regex"));
static FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[\w\-]+\.(?:txt|pdf|docx?|xlsx?|pptx?|csv|md|json|png|jpe?g|mp3|mp4|zip)\b")
        .expect("valid file regex")
});
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid number regex"));
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}\.\d{1,2}\.\d{2,4}\b").expect("valid date regex"));
static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\d{1,2}:\d{2}\b|\b\d{1,2}\s+час(?:а|ов)?\b|\b\d{1,2}\s*o'clock\b")
        .expect("valid time regex")
});

/// Things mentioned in a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    /// Canonical app names from the catalog
    pub applications: Vec<String>,
    pub urls: Vec<String>,
    pub files: Vec<String>,
    pub numbers: Vec<i64>,
    pub dates: Vec<String>,
    pub times: Vec<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
            && self.urls.is_empty()
            && self.files.is_empty()
            && self.numbers.is_empty()
            && self.dates.is_empty()
            && self.times.is_empty()
    }
}

/// Extracts entities using the configured application catalog
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    apps: Vec<(String, Vec<String>)>,
}

impl EntityExtractor {
    pub fn new(apps: &[AppEntry]) -> Self {
        Self {
            apps: apps
                .iter()
                .map(|a| {
                    let aliases = a.aliases.iter().map(|s| s.to_lowercase()).collect();
                    (a.name.clone(), aliases)
                })
                .collect(),
        }
    }

    pub fn extract(&self, text: &str) -> Entities {
        let normalized = normalize(text);

        let applications = self
            .apps
            .iter()
            .filter(|(_, aliases)| aliases.iter().any(|alias| normalized.matches(alias)))
            .map(|(name, _)| name.clone())
            .collect();

        Entities {
            applications,
            urls: collect(&URL_RE, text),
            files: collect(&FILE_RE, text),
            numbers: NUMBER_RE
                .find_iter(text)
                .filter_map(|m| m.as_str().parse().ok())
                .collect(),
            dates: collect(&DATE_RE, text),
            times: collect(&TIME_RE, text),
        }
    }
}

fn collect(re: &Regex, text: &str) -> Vec<String> {
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn extractor() -> EntityExtractor {
        EntityExtractor::new(&AppConfig::default().apps)
    }

    #[test]
    fn test_applications_use_canonical_names() {
        let e = extractor().extract("Открой браузер и калькулятор");
        assert_eq!(e.applications, vec!["browser", "calculator"]);

        let e = extractor().extract("launch Chrome please");
        assert_eq!(e.applications, vec!["browser"]);
    }

    #[test]
    fn test_numbers_times_and_dates() {
        let e = extractor().extract("разбуди меня в 7:30 или в 8 часов 12.05.2025");
        assert_eq!(e.times, vec!["7:30", "8 часов"]);
        assert_eq!(e.dates, vec!["12.05.2025"]);
        assert_eq!(e.numbers, vec![7, 30, 8, 12, 5, 2025]);
    }

    #[test]
    fn test_urls_and_files() {
        let e = extractor().extract("open https://example.com/page and report.pdf");
        assert_eq!(e.urls, vec!["https://example.com/page"]);
        assert_eq!(e.files, vec!["report.pdf"]);
    }

    #[test]
    fn test_plain_text_has_no_entities() {
        assert!(extractor().extract("привет как дела").is_empty());
    }
}
