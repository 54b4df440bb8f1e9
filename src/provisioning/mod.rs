//! # Credential Exchange Protocol
//!
//! Runs once per boot, before any chat or MQTT session is established. The
//! bridge trades its locally stored account fields (plus its derived device
//! id) for the six MQTT connection parameters over a single HTTPS GET. The
//! exchange is all-or-nothing: any transport failure, out-of-range status, or
//! short response clears the `hasSetup` marker and sends the process back
//! through a restart, so the handshake always retries from the top.
//!
//! The request encoding is the classic form style the service expects:
//! space becomes `+`, ASCII alphanumerics pass through, everything else is
//! `%XX` with uppercase hex.

use log::debug;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::config::ProvisioningConfig;
use crate::storage::ProvisioningAccount;

/// Errors that can arise during the credential exchange. Every variant is a
/// provisioning failure; callers do not distinguish beyond logging.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Connection, TLS, or protocol-level failure from the HTTP client.
    #[error("http request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("request timeout after {0}s")]
    Timeout(u64),

    /// Status outside the accepted 100-399 range.
    #[error("service returned status {0}")]
    Status(u16),

    /// Fewer than the six expected response fields.
    #[error("truncated response: expected 6 fields, got {0}")]
    Truncated(usize),
}

/// Backend connection parameters, parsed in fixed order from the response
/// body. Held for the current session only; never persisted. Fields are kept
/// as raw strings; the protocol performs no content validation, so a
/// malformed value surfaces later, at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttCredentials {
    pub host: String,
    pub port: String,
    pub user: String,
    pub pass: String,
    pub client_id: String,
    pub base_topic: String,
}

impl MqttCredentials {
    /// Consume the first six newline-terminated fields of `body`, in order.
    pub fn parse(body: &str) -> Result<Self, ProvisioningError> {
        let mut lines = body.lines().map(|l| l.trim_end_matches('\r').to_string());
        let mut take = |seen: usize| lines.next().ok_or(ProvisioningError::Truncated(seen));
        Ok(MqttCredentials {
            host: take(0)?,
            port: take(1)?,
            user: take(2)?,
            pass: take(3)?,
            client_id: take(4)?,
            base_topic: take(5)?,
        })
    }
}

/// Form-encode one query value: space to `+`, alphanumerics verbatim, every
/// other byte `%XX` uppercase.
pub fn form_encode(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC)
        .to_string()
        .replace("%20", "+")
}

/// Client for the credential exchange service.
pub struct ProvisioningClient {
    config: ProvisioningConfig,
    client: reqwest::Client,
}

impl ProvisioningClient {
    pub fn new(config: ProvisioningConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Build the full request URL for the given account and device id.
    pub fn build_request_url(&self, account: &ProvisioningAccount, device_id: &str) -> String {
        format!(
            "{}?user={}&pass={}&code={}&device={}&type={}",
            self.config.endpoint,
            form_encode(&account.username),
            form_encode(&account.password),
            form_encode(&account.klantcode),
            device_id,
            self.config.service_type,
        )
    }

    /// Perform the exchange. Exactly one GET; no retries here, the restart
    /// policy owns retrying.
    pub async fn fetch(
        &self,
        account: &ProvisioningAccount,
        device_id: &str,
    ) -> Result<MqttCredentials, ProvisioningError> {
        let url = self.build_request_url(account, device_id);
        debug!("provisioning request: {}", self.config.endpoint);

        let timeout_secs = self.config.timeout_secs;
        let response = timeout(
            Duration::from_secs(timeout_secs),
            self.client.get(&url).send(),
        )
        .await
        .map_err(|_| ProvisioningError::Timeout(timeout_secs))??;

        let status = response.status().as_u16();
        if !(100..400).contains(&status) {
            return Err(ProvisioningError::Status(status));
        }

        let body = timeout(Duration::from_secs(timeout_secs), response.text())
            .await
            .map_err(|_| ProvisioningError::Timeout(timeout_secs))??;

        MqttCredentials::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_encoding_spaces_and_reserved() {
        assert_eq!(form_encode("a b&c"), "a+b%26c");
        assert_eq!(form_encode("AZaz09"), "AZaz09");
        assert_eq!(form_encode("kees@kaasboer.nl"), "kees%40kaasboer%2Enl");
        assert_eq!(form_encode(""), "");
    }

    #[test]
    fn form_encoding_uses_uppercase_hex() {
        assert_eq!(form_encode("~"), "%7E");
        assert_eq!(form_encode("na\u{EF}ef"), "na%C3%AFef");
    }

    #[test]
    fn response_parses_in_fixed_order() {
        let body = "broker.example.com\r\n8883\nkees\ngeheim\nbridge-1a2b3c\ndk/1a2b3c\n";
        let creds = MqttCredentials::parse(body).unwrap();
        assert_eq!(creds.host, "broker.example.com");
        assert_eq!(creds.port, "8883");
        assert_eq!(creds.user, "kees");
        assert_eq!(creds.pass, "geheim");
        assert_eq!(creds.client_id, "bridge-1a2b3c");
        assert_eq!(creds.base_topic, "dk/1a2b3c");
    }

    #[test]
    fn short_response_is_truncated_error() {
        let err = MqttCredentials::parse("host\n1883\n").unwrap_err();
        match err {
            ProvisioningError::Truncated(got) => assert_eq!(got, 2),
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn request_url_carries_all_parameters() {
        let client = ProvisioningClient::new(crate::config::ProvisioningConfig::default());
        let account = ProvisioningAccount {
            username: "Jan Smit".to_string(),
            password: "p&w".to_string(),
            klantcode: "1234".to_string(),
        };
        let url = client.build_request_url(&account, "1a2b3c");
        assert!(url.starts_with("https://"));
        assert!(url.contains("user=Jan+Smit"));
        assert!(url.contains("pass=p%26w"));
        assert!(url.contains("code=1234"));
        assert!(url.contains("device=1a2b3c"));
        assert!(url.ends_with("type=rf433v1"));
    }
}
