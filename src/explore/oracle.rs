use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::OracleSettings;
use crate::error::{Result, WayfarerError};

use super::element::InteractiveElement;
use super::plan::NotableElement;

/// Page context sent alongside the candidate list on every oracle call
#[derive(Debug, Serialize)]
pub struct PageContext {
    pub url: String,
    pub title: String,
    pub headings: Vec<String>,
    pub visited_urls: Vec<String>,
    pub recent_interactions: Vec<String>,
    pub navigations_done: u32,
    pub navigation_target: u32,
}

/// What the oracle recommends: an index into the candidate subsample it
/// was shown, plus free-text reasoning.
#[derive(Debug, Clone, Deserialize)]
pub struct OracleDecision {
    pub element_index: usize,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Client for the external decision oracle (an OpenAI-compatible chat
/// endpoint). Unavailability is never fatal; callers degrade to the
/// heuristic on any error.
pub struct OracleClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OracleClient {
    /// Build a client when the oracle is enabled and usable
    pub fn from_settings(settings: &OracleSettings) -> Option<Self> {
        if !settings.enabled {
            return None;
        }

        let api_key = match settings.api_key {
            Some(ref key) if !key.is_empty() => key.clone(),
            _ => {
                tracing::warn!("Oracle enabled but no API key configured; using heuristic only");
                return None;
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .ok()?;

        Some(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
        })
    }

    async fn complete(&self, system: &str, user: String) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| WayfarerError::OracleError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WayfarerError::OracleError(format!(
                "Oracle returned {}",
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| WayfarerError::OracleError(format!("Malformed response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| WayfarerError::OracleError("Empty response".to_string()))
    }

    /// Ask which of the sampled candidates to interact with next
    pub async fn decide(
        &self,
        context: &PageContext,
        candidates: &[InteractiveElement],
    ) -> Result<OracleDecision> {
        let mut listing = String::new();
        for (i, el) in candidates.iter().enumerate() {
            listing.push_str(&format!("{}. [{}] \"{}\"", i, el.kind.as_str(), el.text));
            if let Some(ref href) = el.href {
                listing.push_str(&format!(" -> {}", href));
            }
            if let Some(ref name) = el.accessible_name {
                listing.push_str(&format!(" (aria: {})", name));
            }
            listing.push('\n');
        }

        let user = format!(
            "Page context:\n{}\n\nCandidate elements:\n{}\n\
             Pick the element most likely to reveal new application state. \
             Respond with JSON only: \
             {{\"element_index\": <number>, \"action\": \"click|fill|hover|scroll\", \
             \"value\": <string or null>, \"reasoning\": <string>}}",
            serde_json::to_string_pretty(context)?,
            listing
        );

        let content = self
            .complete(
                "You guide the automated exploration of a web application. \
                 Prefer elements leading to unvisited pages and avoid repeating \
                 recent interactions.",
                user,
            )
            .await?;

        parse_decision(&content)
    }

    /// Ask which elements on a freshly-visited page are worth asserting on
    pub async fn curate_notable(
        &self,
        context: &PageContext,
        elements: &[InteractiveElement],
    ) -> Result<Vec<NotableElement>> {
        let mut listing = String::new();
        for el in elements.iter().take(30) {
            listing.push_str(&format!("- [{}] \"{}\" ({})\n", el.kind.as_str(), el.text, el.selector));
        }

        let user = format!(
            "Page context:\n{}\n\nElements:\n{}\n\
             List up to 5 elements a regression test should assert on. \
             Respond with a JSON array only: \
             [{{\"text\": <string>, \"selector\": <string>, \"reason\": <string>}}]",
            serde_json::to_string_pretty(context)?,
            listing
        );

        let content = self
            .complete(
                "You review pages visited during automated exploration and pick \
                 the elements that best characterize each page.",
                user,
            )
            .await?;

        let notable: Vec<NotableElement> = serde_json::from_str(extract_json(&content))
            .map_err(|e| WayfarerError::OracleError(format!("Malformed curation: {}", e)))?;

        Ok(notable.into_iter().take(5).collect())
    }
}

/// Parse a decision out of the oracle's reply, tolerating code fences
pub fn parse_decision(content: &str) -> Result<OracleDecision> {
    serde_json::from_str(extract_json(content))
        .map_err(|e| WayfarerError::OracleError(format!("Malformed decision: {}", e)))
}

fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_parses_plain_json() {
        let decision =
            parse_decision(r#"{"element_index": 2, "action": "click", "reasoning": "unvisited"}"#)
                .unwrap();

        assert_eq!(decision.element_index, 2);
        assert_eq!(decision.action.as_deref(), Some("click"));
        assert!(decision.value.is_none());
    }

    #[test]
    fn decision_parses_fenced_json() {
        let content = "Here you go:\n```json\n{\"element_index\": 0}\n```";
        let decision = parse_decision(content).unwrap();
        assert_eq!(decision.element_index, 0);
        assert!(decision.reasoning.is_none());
    }

    #[test]
    fn decision_parses_unlabelled_fence() {
        let content = "```\n{\"element_index\": 7, \"value\": \"hello\"}\n```";
        let decision = parse_decision(content).unwrap();
        assert_eq!(decision.element_index, 7);
        assert_eq!(decision.value.as_deref(), Some("hello"));
    }

    #[test]
    fn malformed_decision_is_an_error() {
        assert!(parse_decision("I would click the login button").is_err());
        assert!(parse_decision(r#"{"element": 1}"#).is_err());
    }

    #[test]
    fn client_requires_enabled_and_key() {
        let mut settings = OracleSettings::default();
        assert!(OracleClient::from_settings(&settings).is_none());

        settings.enabled = true;
        assert!(OracleClient::from_settings(&settings).is_none());

        settings.api_key = Some("sk-test".to_string());
        assert!(OracleClient::from_settings(&settings).is_some());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let settings = OracleSettings {
            enabled: true,
            api_key: Some("sk-test".to_string()),
            base_url: "https://api.example.com/v1/".to_string(),
            ..Default::default()
        };

        let client = OracleClient::from_settings(&settings).unwrap();
        assert_eq!(client.base_url, "https://api.example.com/v1");
    }
}
