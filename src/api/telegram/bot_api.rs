use crate::api::{Inbound, ParseMode, Transport, UpdateBatch};
use crate::alerting::alerts::OwnerId;
use crate::error::NotifierError;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const UPDATE_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
    #[serde(default)]
    entities: Vec<MessageEntity>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct MessageEntity {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    offset: usize,
}

pub struct TelegramClient {
    client: Client,
    api_url: String,
    bot_token: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(bot_token: String, poll_timeout: Duration) -> Result<Self, NotifierError> {
        // The HTTP timeout must outlast the server-side long poll.
        let client = Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()?;
        info!("📱 Telegram client initialized");
        Ok(Self {
            client,
            api_url: TELEGRAM_API_URL.to_string(),
            bot_token,
            poll_timeout,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.bot_token, method)
    }

    #[cfg(test)]
    fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }
}

impl Transport for TelegramClient {
    async fn send(
        &self,
        owner: OwnerId,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), NotifierError> {
        let mut payload = json!({
            "chat_id": owner,
            "text": text,
            "disable_web_page_preview": true
        });
        if let Some(mode) = parse_mode {
            payload["parse_mode"] = json!(mode.as_str());
        }

        let response = self
            .client
            .post(self.url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifierError::DeliveryError(format!("chat {}: {}", owner, e)))?;

        if response.status().is_success() {
            debug!("📱 Message sent to {}", owner);
            Ok(())
        } else {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(NotifierError::DeliveryError(format!(
                "{} for chat {}: {}",
                status, owner, error_text
            )))
        }
    }

    async fn receive(&self, offset: i64) -> Result<UpdateBatch, NotifierError> {
        let payload = json!({
            "offset": offset,
            "limit": UPDATE_LIMIT,
            "timeout": self.poll_timeout.as_secs()
        });

        let response: ApiResponse<Vec<Update>> = self
            .client
            .post(self.url("getUpdates"))
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        parse_updates(response)
    }
}

fn parse_updates(response: ApiResponse<Vec<Update>>) -> Result<UpdateBatch, NotifierError> {
    if !response.ok {
        return Err(NotifierError::ApiError(
            response
                .description
                .unwrap_or_else(|| "getUpdates failed".to_string()),
        ));
    }

    let mut batch = UpdateBatch::default();
    for update in response.result.unwrap_or_default() {
        batch.last_update_id = batch.last_update_id.max(Some(update.update_id));
        let Some(message) = update.message else {
            debug!("Ignoring update {} without a message", update.update_id);
            continue;
        };
        let Some(text) = message.text else {
            warn!("Ignoring non-text message from {}", message.chat.id);
            continue;
        };
        let is_command = message
            .entities
            .first()
            .is_some_and(|e| e.kind == "bot_command" && e.offset == 0);
        batch.messages.push(Inbound {
            update_id: update.update_id,
            owner: message.chat.id,
            text,
            is_command,
        });
    }
    Ok(batch)
}
