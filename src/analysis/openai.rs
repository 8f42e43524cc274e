//! Chat-completions vision analyzer.
//!
//! Sends the frame as a `data:image/jpeg;base64,…` URL together with a
//! prompt that embeds the scene geometry and the previous description, then
//! decodes the first choice's content with [`decode_verdict`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::decode::{decode_verdict, DecodedVerdict};
use super::{AnalysisVerdict, Analyzer};
use crate::config::AnalysisConfig;
use crate::{AppError, Result};

const SYSTEM_PROMPT: &str = "You are a vision assistant that extracts item features.";

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Build the user prompt for one analysis request.
#[must_use]
pub fn build_prompt(scene_context: &str, prior_description: &str) -> String {
    format!(
        "{scene_context} Describe the item in the image in the most detailed format.\n\
         Give me the output in the following JSON format: {{'is_the_same': true|false, 'description': string}}. \
         This is the detailed description of the previous image: {prior_description}. \
         Tell me if the item was replaced, return the structured output with the detailed description of the current image. \
         Do not save in description any information about previous item, try to identify the type of the item. \
         If a human hand is visible in the picture, return exactly 'hand' as the description. \
         Use centimeters if possible. Estimate if necessary."
    )
}

/// [`Analyzer`] backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiAnalyzer {
    client: reqwest::Client,
    config: AnalysisConfig,
}

impl OpenAiAnalyzer {
    /// Build an analyzer from the `[analysis]` section.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the API key is missing or the HTTP
    /// client cannot be constructed.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AppError::Config("analysis api key is not loaded".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, image_base64: &str, prior_description: &str) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": build_prompt(&self.config.scene_context, prior_description) },
                        { "type": "image_url", "image_url": { "url": format!("data:image/jpeg;base64,{image_base64}") } }
                    ]
                }
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        })
    }

    async fn request(&self, image_base64: &str, prior_description: &str) -> Result<AnalysisVerdict> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(image_base64, prior_description))
            .send()
            .await
            .map_err(|err| AppError::Analysis(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Analysis(format!("request failed: {status} - {body}")));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|err| AppError::Analysis(format!("malformed completion: {err}")))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Analysis("completion has no content".into()))?;
        debug!(content = content.as_str(), "analysis reply received");

        let decoded = decode_verdict(&content);
        if matches!(decoded, DecodedVerdict::Lenient(_)) {
            info!("analysis reply was not strict JSON; used lenient decoding");
        }
        decoded.into_result()
    }
}

impl Analyzer for OpenAiAnalyzer {
    fn analyze<'a>(
        &'a self,
        image_base64: &'a str,
        prior_description: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<AnalysisVerdict>> + Send + 'a>> {
        Box::pin(self.request(image_base64, prior_description))
    }
}
