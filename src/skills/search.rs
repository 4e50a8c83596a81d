// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Web search through the default browser

use async_trait::async_trait;
use reqwest::Url;
use tracing::info;

use super::{Request, Skill, SkillContext};
use crate::nlu::{search_keywords, strip_keywords, Entities, Intent};
use crate::{RavenError, Result};

pub struct WebSearchSkill;

/// Build the search URL for a query
pub fn search_url(base: &str, query: &str) -> Result<Url> {
    Url::parse_with_params(base, &[("q", query)])
        .map_err(|e| RavenError::Config(format!("invalid search URL {}: {}", base, e)))
}

#[async_trait]
impl Skill for WebSearchSkill {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn handles(&self, intent: Intent, _entities: &Entities) -> bool {
        intent == Intent::Search
    }

    async fn handle(&self, request: &Request<'_>, ctx: &SkillContext) -> Result<String> {
        let query = strip_keywords(request.text, search_keywords());
        if query.is_empty() {
            return Ok("What should I search for?".to_string());
        }

        let url = search_url(&ctx.search_url, &query)?;
        info!("Searching for: {}", query);
        ctx.launcher.open_url(url.as_str())?;
        Ok(format!("Searching the web for: {}", query))
    }
}
