//! # Bridge Server - Core Application Controller
//!
//! Owns every component and runs the single cooperative control loop. One
//! iteration services at most one chat update, then drains any backend
//! channel commands, then asks the maintenance timer whether the process
//! should restart. There is no parallelism in the command path; ordering per
//! principal is arrival order by construction.
//!
//! Restart-class decisions never call `exit` from in here: `run` returns a
//! [`RunExit`] and `main` applies the settle delay and terminates, leaving
//! the actual power cycle to the process supervisor.

use anyhow::{anyhow, Result};
use chrono::{Timelike, Utc};
use log::{debug, info, warn};
use std::time::Duration;

use super::maintenance::MaintenanceTimer;
use super::registry::AuthorizationRegistry;
use super::router::{BridgeAction, CommandRouter, Outbound};
use crate::config::Config;
use crate::logutil::mask_secret;
use crate::mqtt::BackendConnection;
use crate::provisioning::ProvisioningClient;
use crate::rf433::{parse_mac, DeviceAddress, LogTransmitter, RfTransmitter};
use crate::storage::{keys, Storage};
use crate::telegram::TelegramClient;

macro_rules! sec_log {
    ($($arg:tt)*) => { log::warn!(target: "security", $($arg)*); };
}

/// Why the control loop ended. Every variant means "restart the process".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    FactoryReset,
    MaintenanceRestart,
}

/// The bridge: storage, router, transports, radio, and the restart policy.
pub struct BridgeServer {
    config: Config,
    storage: Storage,
    router: CommandRouter,
    radio: Box<dyn RfTransmitter + Send>,
    chat: Option<TelegramClient>,
    backend: Option<BackendConnection>,
    maintenance: MaintenanceTimer,
    address: DeviceAddress,
}

impl BridgeServer {
    /// Load persisted state and derive the device address. No network I/O
    /// happens here; `connect` brings the transports up.
    pub async fn new(config: Config) -> Result<Self> {
        let storage = Storage::new(&config.storage.data_dir).await?;
        let account = storage.load_account().await;

        let stored = storage.read(keys::USERS).await?.unwrap_or_default();
        let (registry, report) = AuthorizationRegistry::from_lines(&stored);
        if report.malformed > 0 {
            warn!(
                "users table: {} malformed line(s) treated as empty slots",
                report.malformed
            );
        }
        info!(
            "loaded {} authorized principal(s), {} channel(s)",
            report.occupied, account.number_of_channels
        );

        let mac = parse_mac(&config.bridge.mac_address)?;
        let address = DeviceAddress::from_mac(mac);
        info!("transmitter address {}", address.device_id());

        let maintenance = MaintenanceTimer::new(
            Duration::from_secs(config.bridge.min_uptime_hours * 60 * 60),
            config.bridge.maintenance_hour,
        );

        Ok(Self {
            router: CommandRouter::new(registry, account),
            radio: Box::new(LogTransmitter::new(address)),
            chat: None,
            backend: None,
            maintenance,
            address,
            config,
            storage,
        })
    }

    /// Swap in a real radio driver (the default is the logging stand-in).
    pub fn set_transmitter(&mut self, radio: Box<dyn RfTransmitter + Send>) {
        self.radio = radio;
    }

    /// Bring up the transports: provisioning + backend first, then chat.
    ///
    /// Any failure here is a boot failure; the caller restarts the process.
    /// A provisioning failure additionally clears the setup marker so the
    /// external setup portal re-runs the handshake from the top.
    pub async fn connect(&mut self) -> Result<()> {
        if self.config.provisioning.enabled {
            let account = self.storage.load_provisioning_account().await;
            let client = ProvisioningClient::new(self.config.provisioning.clone());
            let device_id = self.address.device_id();
            match client.fetch(&account, &device_id).await {
                Ok(creds) => {
                    info!(
                        "provisioned: backend {}:{} as {}",
                        creds.host,
                        creds.port,
                        mask_secret(&creds.user)
                    );
                    let channels = self.router.account().number_of_channels;
                    let backend = BackendConnection::connect(&creds, channels)
                        .await
                        .map_err(|e| anyhow!("backend connection failed: {}", e))?;
                    self.backend = Some(backend);
                }
                Err(e) => {
                    // Full restart-and-redo: the handshake has no partial-state
                    // resume, so the setup marker goes too.
                    self.storage.erase(keys::HAS_SETUP).await?;
                    return Err(anyhow!("provisioning failed: {}", e));
                }
            }
        }

        let token = self.router.account().telegram_token.clone();
        if !token.is_empty() {
            let chat = TelegramClient::new(&self.config.telegram, &token)?;
            let username = chat
                .verify()
                .await
                .map_err(|e| anyhow!("unable to connect to Telegram: {}", e))?;
            info!(
                "connected to Telegram as @{} (token {})",
                username,
                mask_secret(&token)
            );
            self.chat = Some(chat);
        } else if self.backend.is_none() {
            warn!("no Telegram token and no provisioned backend; only the maintenance timer is active");
        }

        Ok(())
    }

    /// The control loop. Returns when a restart-class decision is made.
    pub async fn run(&mut self) -> Result<RunExit> {
        info!("bridge running");
        loop {
            // (1) At most one chat update per iteration.
            if let Some(chat) = self.chat.as_mut() {
                match chat.next_update().await {
                    Ok(Some(update)) => {
                        let response = self
                            .router
                            .handle_update(&update, &mut *self.radio, &self.storage)
                            .await?;
                        for out in &response.outbound {
                            let sent = match out {
                                Outbound::Text { chat_id, text } => {
                                    chat.send_text(*chat_id, text).await
                                }
                                Outbound::Menu {
                                    chat_id,
                                    text,
                                    menu,
                                } => chat.send_menu(*chat_id, text, menu).await,
                            };
                            if let Err(e) = sent {
                                warn!("reply delivery failed: {}", e);
                            }
                        }
                        if let Some(BridgeAction::FactoryReset) = response.action {
                            self.factory_reset().await?;
                            return Ok(RunExit::FactoryReset);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("chat poll failed: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            } else {
                // No long poll to pace the loop; don't spin.
                tokio::time::sleep(Duration::from_millis(250)).await;
            }

            // (2) Drain backend channel commands.
            if let Some(backend) = self.backend.as_mut() {
                let channels = self.router.account().number_of_channels;
                while let Some(cmd) = backend.try_next() {
                    if cmd.channel < channels {
                        self.radio.send_unit(cmd.channel, cmd.on);
                    } else {
                        debug!(
                            "backend channel {} out of range (have {}); ignored",
                            cmd.channel, channels
                        );
                    }
                }
            }

            // (3) Maintenance restart check, independent of traffic.
            if self.maintenance.due(Utc::now().hour()) {
                info!(
                    "maintenance restart: uptime {}s",
                    self.maintenance.uptime().as_secs()
                );
                return Ok(RunExit::MaintenanceRestart);
            }
        }
    }

    /// Wipe authorization and account state. The erased setup marker tells
    /// the external network-setup service to unbind its credentials and
    /// re-run the portal.
    async fn factory_reset(&mut self) -> Result<()> {
        sec_log!("factory reset: wiping authorization table and account config");
        self.router.wipe();
        self.storage.erase_all().await?;
        Ok(())
    }

    /// Print a short status summary (the `status` subcommand).
    pub async fn show_status(&self) -> Result<()> {
        let account = self.router.account();
        println!("KakuBridge status");
        println!("  data dir:        {}", self.storage.base_dir());
        println!("  channels:        {}", account.number_of_channels);
        println!("  device address:  {}", self.address.device_id());
        println!(
            "  telegram token:  {}",
            if account.telegram_token.is_empty() {
                "not set".to_string()
            } else {
                mask_secret(&account.telegram_token)
            }
        );
        println!("  authorized:      {}", self.router.registry().occupied());
        println!(
            "  setup complete:  {}",
            self.storage.exists(keys::HAS_SETUP).await
        );
        Ok(())
    }
}
