//! Chat notification collaborator.
//!
//! When the analysis reports a replaced item, a short message with the new
//! description is posted to a chat channel. Delivery failures are reported
//! to the caller, which logs them and carries on.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::config::NotifyConfig;
use crate::{AppError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Format the change notification for `description`.
#[must_use]
pub fn change_message(description: &str) -> String {
    format!(":warning: Item appears to have been replaced.\n\n**New Description:** {description}")
}

/// Posts change notifications.
pub trait Notifier: Send + Sync {
    /// Announce that the item changed and is now described by `description`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Notification` if the transport or the chat
    /// server reports a failure.
    fn notify<'a>(&'a self, description: &'a str)
        -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

#[derive(Debug, Serialize)]
struct PostRequest<'a> {
    channel_id: &'a str,
    message: String,
}

/// [`Notifier`] posting through the Mattermost `/api/v4/posts` endpoint.
pub struct MattermostNotifier {
    client: reqwest::Client,
    base_url: String,
    channel_id: String,
    token: String,
}

impl MattermostNotifier {
    /// Build a notifier from the `[notify]` section.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the token is missing or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(AppError::Config("notification token is not loaded".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            channel_id: config.channel_id.clone(),
            token: config.token.clone(),
        })
    }

    async fn post(&self, description: &str) -> Result<()> {
        let body = PostRequest {
            channel_id: &self.channel_id,
            message: change_message(description),
        };
        let response = self
            .client
            .post(format!("{}/api/v4/posts", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::Notification(format!("failed to post message: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Notification(format!(
                "chat server rejected post: {status} - {text}"
            )));
        }

        info!(channel_id = self.channel_id.as_str(), "change notification sent");
        Ok(())
    }
}

impl Notifier for MattermostNotifier {
    fn notify<'a>(
        &'a self,
        description: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.post(description))
    }
}

/// [`Notifier`] used when notifications are disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

impl Notifier for DisabledNotifier {
    fn notify<'a>(
        &'a self,
        _description: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async {
            info!("notifications disabled; change not announced");
            Ok(())
        })
    }
}
