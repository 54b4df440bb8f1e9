//! # Telegram Chat Transport
//!
//! A minimal Telegram Bot API client: long-polled `getUpdates`, plain text
//! replies, and inline-keyboard menus. This is the chat side of the bridge.
//! It knows nothing about authorization or channels; it only converts Bot API
//! traffic to and from the neutral [`ChatUpdate`]/[`Menu`] types the command
//! router works with.
//!
//! Both ordinary messages and callback queries (button presses) arrive as one
//! update stream. Callback queries are acknowledged immediately with
//! `answerCallbackQuery` so the client's spinner stops, independent of what
//! the router decides to do with them.

use anyhow::{anyhow, Result};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;

use crate::config::TelegramConfig;
use crate::logutil::escape_log;

/// One inbound chat event, either free text or a menu button press.
#[derive(Debug, Clone)]
pub struct ChatUpdate {
    /// Principal identifier: the sending user's id.
    pub sender_id: u64,
    /// Chat to reply into.
    pub chat_id: i64,
    pub first_name: String,
    /// Message text; empty for callback updates.
    pub text: String,
    /// Callback payload when this update is a button press.
    pub callback_data: Option<String>,
}

impl ChatUpdate {
    pub fn is_callback(&self) -> bool {
        self.callback_data.is_some()
    }
}

/// One inline-keyboard button: a visible label and the callback payload it
/// sends back when pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuButton {
    pub label: String,
    pub data: String,
}

/// An inline keyboard under construction. Buttons append to the pending row;
/// `add_row` closes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Menu {
    rows: Vec<Vec<MenuButton>>,
    pending: Vec<MenuButton>,
}

impl Menu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_button(&mut self, label: &str, data: &str) {
        self.pending.push(MenuButton {
            label: label.to_string(),
            data: data.to_string(),
        });
    }

    /// Close the pending row. A trailing unfinished row is still rendered.
    pub fn add_row(&mut self) {
        if !self.pending.is_empty() {
            self.rows.push(std::mem::take(&mut self.pending));
        }
    }

    pub fn rows(&self) -> Vec<&[MenuButton]> {
        let mut rows: Vec<&[MenuButton]> = self.rows.iter().map(|r| r.as_slice()).collect();
        if !self.pending.is_empty() {
            rows.push(self.pending.as_slice());
        }
        rows
    }

    fn reply_markup(&self) -> serde_json::Value {
        let keyboard: Vec<Vec<serde_json::Value>> = self
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| json!({ "text": b.label, "callback_data": b.data }))
                    .collect()
            })
            .collect();
        json!({ "inline_keyboard": keyboard })
    }
}

// Bot API response envelopes; only the fields the bridge reads.

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    text: Option<String>,
    from: Option<TgUser>,
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: u64,
    #[serde(default)]
    first_name: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: TgUser,
    data: Option<String>,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct BotInfo {
    #[serde(default)]
    username: String,
}

/// Telegram Bot API client with long-poll update delivery.
pub struct TelegramClient {
    base: String,
    client: reqwest::Client,
    poll_timeout_secs: u64,
    offset: i64,
    queue: VecDeque<ChatUpdate>,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig, token: &str) -> Result<Self> {
        // The HTTP timeout must outlast the long poll itself.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            base: format!("{}/bot{}", config.api_base.trim_end_matches('/'), token),
            client,
            poll_timeout_secs: config.poll_timeout_secs,
            offset: 0,
            queue: VecDeque::new(),
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base, method);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("Telegram {} request failed: {}", method, e))?;
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| anyhow!("Telegram {} response unreadable: {}", method, e))?;
        if !parsed.ok {
            return Err(anyhow!(
                "Telegram {} rejected: {}",
                method,
                parsed.description.unwrap_or_else(|| "no description".to_string())
            ));
        }
        parsed
            .result
            .ok_or_else(|| anyhow!("Telegram {} returned ok without a result", method))
    }

    /// Check connectivity and the token. Returns the bot's username.
    pub async fn verify(&self) -> Result<String> {
        let info: BotInfo = self.call("getMe", json!({})).await?;
        Ok(info.username)
    }

    /// Fetch the next inbound update, long-polling when the local queue is
    /// empty. Returns `None` when the poll window elapsed without traffic.
    pub async fn next_update(&mut self) -> Result<Option<ChatUpdate>> {
        if let Some(update) = self.queue.pop_front() {
            return Ok(Some(update));
        }

        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                json!({
                    "offset": self.offset,
                    "timeout": self.poll_timeout_secs,
                    "allowed_updates": ["message", "callback_query"],
                }),
            )
            .await?;

        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);
            if let Some(converted) = self.convert(update).await {
                self.queue.push_back(converted);
            }
        }
        Ok(self.queue.pop_front())
    }

    async fn convert(&self, update: Update) -> Option<ChatUpdate> {
        if let Some(cb) = update.callback_query {
            // Ack first so the client UI settles even if the press is ignored.
            let ack: Result<bool> = self
                .call("answerCallbackQuery", json!({ "callback_query_id": cb.id }))
                .await;
            if let Err(e) = ack {
                warn!("answerCallbackQuery failed: {}", e);
            }
            let chat_id = cb
                .message
                .map(|m| m.chat.id)
                .unwrap_or(cb.from.id as i64);
            return Some(ChatUpdate {
                sender_id: cb.from.id,
                chat_id,
                first_name: cb.from.first_name,
                text: String::new(),
                callback_data: Some(cb.data.unwrap_or_default()),
            });
        }
        if let Some(msg) = update.message {
            let from = msg.from?;
            let text = msg.text.unwrap_or_default();
            debug!("chat message from {}: {}", from.id, escape_log(&text));
            return Some(ChatUpdate {
                sender_id: from.id,
                chat_id: msg.chat.id,
                first_name: from.first_name,
                text,
                callback_data: None,
            });
        }
        None
    }

    /// Send a plain text reply.
    pub async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(())
    }

    /// Send a text with an inline-keyboard menu attached.
    pub async fn send_menu(&self, chat_id: i64, text: &str, menu: &Menu) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": text,
                    "reply_markup": menu.reply_markup(),
                }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_rows_close_on_add_row() {
        let mut menu = Menu::new();
        menu.add_button("1 on", "ON_0");
        menu.add_button("1 off", "OFF_0");
        menu.add_row();
        menu.add_button("Settings", "settings");

        let rows = menu.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[1][0].data, "settings");
    }

    #[test]
    fn reply_markup_shape() {
        let mut menu = Menu::new();
        menu.add_button("1 on", "ON_0");
        let markup = menu.reply_markup();
        assert_eq!(markup["inline_keyboard"][0][0]["text"], "1 on");
        assert_eq!(markup["inline_keyboard"][0][0]["callback_data"], "ON_0");
    }

    #[test]
    fn empty_trailing_row_not_rendered() {
        let mut menu = Menu::new();
        menu.add_button("x", "y");
        menu.add_row();
        menu.add_row();
        assert_eq!(menu.rows().len(), 1);
    }
}
