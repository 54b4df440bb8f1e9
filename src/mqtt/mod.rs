//! # MQTT Backend Connection
//!
//! The provisioned variant of the bridge: one connection to the backend
//! broker, one subscription per logical channel (`{base}/channel{N}/set`),
//! and a task draining the rumqttc event loop into a channel-command queue
//! the control loop consumes.
//!
//! Connection parameters come straight from the credential exchange and are
//! never persisted. The port string is parsed here, not in the exchange
//! protocol, so a malformed response fails at this seam, loudly.

use anyhow::{anyhow, Result};
use log::{info, warn};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::provisioning::MqttCredentials;

/// A switch command received from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCommand {
    pub channel: u8,
    pub on: bool,
}

/// Topic the backend publishes channel commands on.
pub fn channel_topic(base: &str, channel: u8) -> String {
    format!("{}/channel{}/set", base, channel)
}

/// Reverse of [`channel_topic`]: extract the channel index, or `None` for
/// any topic outside the command namespace. Bounds against the configured
/// channel count are the caller's job.
pub fn parse_channel_topic(base: &str, topic: &str) -> Option<u8> {
    let rest = topic.strip_prefix(base)?.strip_prefix("/channel")?;
    let digits = rest.strip_suffix("/set")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Accepted payload tokens for a switch command.
pub fn parse_switch_payload(payload: &[u8]) -> Option<bool> {
    let text = std::str::from_utf8(payload).ok()?;
    match text.trim().to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Some(true),
        "off" | "0" | "false" => Some(false),
        _ => None,
    }
}

/// Live backend connection: the client handle plus the inbound command queue.
pub struct BackendConnection {
    _client: AsyncClient,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
}

impl BackendConnection {
    /// Connect, subscribe one topic per channel, and start the event loop
    /// task. Errors here follow the provisioning failure policy upstream.
    pub async fn connect(creds: &MqttCredentials, number_of_channels: u8) -> Result<Self> {
        let port: u16 = creds
            .port
            .trim()
            .parse()
            .map_err(|_| anyhow!("backend port '{}' is not a valid port number", creds.port))?;

        let mut options = MqttOptions::new(&creds.client_id, &creds.host, port);
        options.set_keep_alive(Duration::from_secs(30));
        if !creds.user.is_empty() {
            options.set_credentials(&creds.user, &creds.pass);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        for channel in 0..number_of_channels {
            client
                .subscribe(channel_topic(&creds.base_topic, channel), QoS::AtMostOnce)
                .await?;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let base_topic = creds.base_topic.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::Publish(message))) => {
                        let channel = parse_channel_topic(&base_topic, &message.topic);
                        let on = parse_switch_payload(&message.payload);
                        match (channel, on) {
                            (Some(channel), Some(on)) => {
                                if tx.send(ChannelCommand { channel, on }).is_err() {
                                    // Receiver dropped; the bridge is going down.
                                    break;
                                }
                            }
                            _ => {
                                warn!(
                                    "backend: ignoring message on '{}' ({} bytes)",
                                    message.topic,
                                    message.payload.len()
                                );
                            }
                        }
                    }
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("backend connected");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("backend poll error: {err}");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });

        Ok(Self {
            _client: client,
            commands: rx,
        })
    }

    /// Non-blocking drain of the next pending command, if any.
    pub fn try_next(&mut self) -> Option<ChannelCommand> {
        self.commands.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_round_trip() {
        let topic = channel_topic("dk/1a2b3c", 3);
        assert_eq!(topic, "dk/1a2b3c/channel3/set");
        assert_eq!(parse_channel_topic("dk/1a2b3c", &topic), Some(3));
    }

    #[test]
    fn foreign_topics_rejected() {
        assert_eq!(parse_channel_topic("dk/x", "dk/x/channel/set"), None);
        assert_eq!(parse_channel_topic("dk/x", "dk/x/channel2/state"), None);
        assert_eq!(parse_channel_topic("dk/x", "other/channel2/set"), None);
        assert_eq!(parse_channel_topic("dk/x", "dk/x/channel2a/set"), None);
    }

    #[test]
    fn payload_tokens() {
        assert_eq!(parse_switch_payload(b"on"), Some(true));
        assert_eq!(parse_switch_payload(b"ON\n"), Some(true));
        assert_eq!(parse_switch_payload(b"0"), Some(false));
        assert_eq!(parse_switch_payload(b"toggle"), None);
        assert_eq!(parse_switch_payload(&[0xff, 0xfe]), None);
    }
}
