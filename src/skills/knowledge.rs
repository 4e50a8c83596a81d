// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Canned answers: help, questions, weather, jokes and the general fallback

use async_trait::async_trait;

use super::{Request, Skill, SkillContext};
use crate::nlu::{pick, Entities, Intent};
use crate::Result;

pub const HELP_TEXT: &str = "I can:\n\
    - open and close applications (\"open browser\", \"close notepad\")\n\
    - search the web (\"find rust tutorials\")\n\
    - report system status (\"system status\")\n\
    - tell the time and date (\"what time is it\")\n\
    - answer simple questions and tell jokes\n\
    - chat in Russian or English";

/// Question patterns and their answers, first match wins
const KNOWLEDGE: &[(&[&str], &str)] = &[
    (&["кто ты", "как тебя зовут", "who are you", "your name"], "I am Raven, your personal voice assistant."),
    (&["создал", "создатель", "who made you", "who created you", "creator"], "I was built as an open source project by enthusiasts."),
    (&["версия", "version"], concat!("I'm Raven version ", env!("CARGO_PKG_VERSION"), ".")),
    (&["как дела", "how are you"], "All systems are running normally. Thanks for asking!"),
    (&["что ты умеешь", "what can you do"], HELP_TEXT),
];

const JOKES: &[&str] = &[
    "Why do programmers prefer dark mode? Because light attracts bugs.",
    "There are 10 kinds of people: those who understand binary and those who don't.",
    "A SQL query walks into a bar, goes up to two tables and asks: may I join you?",
    "I'd tell you a UDP joke, but you might not get it.",
];

const MEDIA_WORDS: &[&str] = &["музык", "фильм", "игра", "игру", "music", "movie", "game"];

pub struct HelpSkill;

#[async_trait]
impl Skill for HelpSkill {
    fn name(&self) -> &'static str {
        "help"
    }

    fn handles(&self, intent: Intent, _entities: &Entities) -> bool {
        intent == Intent::Help
    }

    async fn handle(&self, _request: &Request<'_>, _ctx: &SkillContext) -> Result<String> {
        Ok(HELP_TEXT.to_string())
    }
}

pub struct KnowledgeSkill;

#[async_trait]
impl Skill for KnowledgeSkill {
    fn name(&self) -> &'static str {
        "knowledge"
    }

    fn handles(&self, intent: Intent, _entities: &Entities) -> bool {
        intent == Intent::Question
    }

    async fn handle(&self, request: &Request<'_>, _ctx: &SkillContext) -> Result<String> {
        let answer = KNOWLEDGE
            .iter()
            .find(|(patterns, _)| request.normalized.matches_any(patterns))
            .map(|(_, answer)| *answer)
            .unwrap_or("Interesting question. I don't know the answer yet, but I'm learning.");
        Ok(answer.to_string())
    }
}

pub struct WeatherSkill;

#[async_trait]
impl Skill for WeatherSkill {
    fn name(&self) -> &'static str {
        "weather"
    }

    fn handles(&self, intent: Intent, _entities: &Entities) -> bool {
        intent == Intent::Weather
    }

    async fn handle(&self, _request: &Request<'_>, _ctx: &SkillContext) -> Result<String> {
        Ok("Sorry, I don't have access to weather data yet. Try asking me to search for the forecast.".to_string())
    }
}

pub struct EntertainmentSkill;

#[async_trait]
impl Skill for EntertainmentSkill {
    fn name(&self) -> &'static str {
        "entertainment"
    }

    fn handles(&self, intent: Intent, _entities: &Entities) -> bool {
        intent == Intent::Entertainment
    }

    async fn handle(&self, request: &Request<'_>, _ctx: &SkillContext) -> Result<String> {
        if request.normalized.matches_any(MEDIA_WORDS) {
            return Ok("I can't play media myself yet, but I can open the browser for you.".to_string());
        }
        Ok(pick(request.text, JOKES).to_string())
    }
}

/// Fallback when no other skill answers
pub struct GeneralSkill;

#[async_trait]
impl Skill for GeneralSkill {
    fn name(&self) -> &'static str {
        "general"
    }

    fn handles(&self, _intent: Intent, _entities: &Entities) -> bool {
        true
    }

    async fn handle(&self, request: &Request<'_>, _ctx: &SkillContext) -> Result<String> {
        Ok(format!(
            "Understood the command: '{}'. I will learn to do this in the future!",
            request.text.trim()
        ))
    }

    fn priority(&self) -> u8 {
        0
    }
}
