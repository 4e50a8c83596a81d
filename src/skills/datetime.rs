// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Current time and date

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};

use super::{Request, Skill, SkillContext};
use crate::nlu::{Entities, Intent, Normalized};
use crate::Result;

const DATE_WORDS: &[&str] = &["дата", "дату", "число", "какое сегодня", "date", "today", "day"];
const TIME_WORDS: &[&str] = &["время", "который час", "time", "clock"];

pub struct DateTimeSkill;

/// Format the answer for a moment, depending on whether time, date or both were asked
pub fn describe<Tz: TimeZone>(normalized: &Normalized, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let wants_date = normalized.matches_any(DATE_WORDS);
    let wants_time = normalized.matches_any(TIME_WORDS);

    match (wants_time, wants_date) {
        (false, true) => format!("Today is {}", now.format("%d.%m.%Y")),
        (true, false) => format!("It's {} now", now.format("%H:%M:%S")),
        _ => format!("It's {} on {}", now.format("%H:%M:%S"), now.format("%d.%m.%Y")),
    }
}

#[async_trait]
impl Skill for DateTimeSkill {
    fn name(&self) -> &'static str {
        "datetime"
    }

    fn handles(&self, intent: Intent, _entities: &Entities) -> bool {
        intent == Intent::Time
    }

    async fn handle(&self, request: &Request<'_>, _ctx: &SkillContext) -> Result<String> {
        Ok(describe(&request.normalized, &Local::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlu::normalize;
    use chrono::Utc;

    #[test]
    fn test_describe_picks_format() {
        let moment = Utc.with_ymd_and_hms(2025, 3, 7, 14, 5, 9).unwrap();

        assert_eq!(describe(&normalize("который час"), &moment), "It's 14:05:09 now");
        assert_eq!(describe(&normalize("какая сегодня дата"), &moment), "Today is 07.03.2025");
        assert_eq!(
            describe(&normalize("time and date"), &moment),
            "It's 14:05:09 on 07.03.2025"
        );
    }
}
