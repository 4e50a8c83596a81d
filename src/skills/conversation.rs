// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Small talk: greetings, farewells and thanks

use async_trait::async_trait;

use super::{Request, Skill, SkillContext};
use crate::nlu::{pick, Entities, Intent};
use crate::Result;

const GREETINGS: &[&str] = &[
    "Hello! Glad to hear you. How can I help?",
    "Hi! Raven at your service.",
    "Greetings! Ready for your commands.",
];

const FAREWELLS: &[&str] = &[
    "Goodbye! I'll be waiting for you to come back.",
    "All the best! Don't hesitate to call me.",
    "Farewell! I hope I was helpful.",
];

const THANKS: &[&str] = &[
    "Always glad to help!",
    "You're welcome! Ask any time.",
    "No problem, that's what I'm here for.",
];

pub struct ConversationSkill;

#[async_trait]
impl Skill for ConversationSkill {
    fn name(&self) -> &'static str {
        "conversation"
    }

    fn handles(&self, intent: Intent, _entities: &Entities) -> bool {
        matches!(intent, Intent::Greeting | Intent::Farewell | Intent::Thanks)
    }

    async fn handle(&self, request: &Request<'_>, _ctx: &SkillContext) -> Result<String> {
        let variants = match request.intent {
            Intent::Farewell => FAREWELLS,
            Intent::Thanks => THANKS,
            _ => GREETINGS,
        };
        Ok(pick(request.text, variants).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::testing::{context, FakeLauncher, FakeProbe};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_replies_come_from_the_right_table() {
        let ctx = context(Arc::new(FakeProbe::default()), Arc::new(FakeLauncher::default()));
        let entities = Entities::default();

        let hello = Request::new("привет", Intent::Greeting, &entities);
        let reply = ConversationSkill.handle(&hello, &ctx).await.unwrap();
        assert!(GREETINGS.contains(&reply.as_str()));

        let bye = Request::new("пока", Intent::Farewell, &entities);
        let reply = ConversationSkill.handle(&bye, &ctx).await.unwrap();
        assert!(FAREWELLS.contains(&reply.as_str()));

        let again = ConversationSkill.handle(&bye, &ctx).await.unwrap();
        assert_eq!(reply, again);
    }
}
