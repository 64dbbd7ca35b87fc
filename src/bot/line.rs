//! LINE Messaging API client.

use serde::Serialize;
use tracing::{info, warn};

use super::notifier::{Notifier, NotifyError, OutboundMessage, Target};

const DEFAULT_API_BASE: &str = "https://api.line.me";

pub struct LineClient {
    access_token: String,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<ApiMessage<'a>>,
    notification_disabled: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<ApiMessage<'a>>,
    notification_disabled: bool,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

impl LineClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base(access_token, DEFAULT_API_BASE.to_string())
    }

    /// Point the client at another host (a mock server, a proxy).
    pub fn with_base(access_token: String, api_base: String) -> Self {
        Self {
            access_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api(format!("{status}: {body}")));
        }
        Ok(())
    }
}

impl Notifier for LineClient {
    async fn send(&self, message: OutboundMessage) -> Result<(), NotifyError> {
        let messages: Vec<ApiMessage> = message
            .texts
            .iter()
            .map(|text| ApiMessage { kind: "text", text: text.as_str() })
            .collect();

        let result = match &message.target {
            Target::Reply(token) => {
                let request = ReplyRequest {
                    reply_token: token.as_str(),
                    messages,
                    notification_disabled: message.notification_disabled,
                };
                self.post("/v2/bot/message/reply", &request).await
            }
            Target::Push(to) => {
                info!("📤 Pushing {} message(s) to {}", message.texts.len(), to);
                let request = PushRequest {
                    to: to.as_str(),
                    messages,
                    notification_disabled: message.notification_disabled,
                };
                self.post("/v2/bot/message/push", &request).await
            }
        };

        if let Err(ref e) = result {
            warn!("Failed to send: {e}");
        }
        result
    }
}
