//! # KakuBridge - Telegram/MQTT Bridge for 433 MHz Power Switches
//!
//! KakuBridge connects a Telegram chat interface (and, once provisioned, an MQTT
//! backend) to 433 MHz remote-controlled power switches. It is the host-process
//! successor of a small family of ESP8266 firmwares: the same authorization
//! table, command menus, and radio addressing, supervised as a restartable
//! daemon instead of a microcontroller loop.
//!
//! ## Features
//!
//! - **Shared-Secret Gate**: A single human-readable password authorizes chat
//!   principals into a fixed 50-slot table persisted across restarts.
//! - **Inline Menus**: Per-channel on/off buttons plus a settings submenu
//!   (reveal password, sign out, factory reset) rendered as Telegram inline
//!   keyboards.
//! - **Two-Step Factory Reset**: A freshly generated six-digit challenge code
//!   gates the wipe, so no single replayed message can reset the device.
//! - **Device-Unique RF Addressing**: The transmitter address is derived once
//!   from the low three bytes of the hardware MAC, so two bridges never share
//!   a unit address space.
//! - **Credential Exchange**: One HTTPS request at boot trades the stored
//!   account fields for MQTT connection parameters; any failure clears the
//!   setup marker and restarts the provisioning handshake from the top.
//! - **Maintenance Restarts**: After six hours of uptime the bridge restarts
//!   itself during a fixed nightly hour.
//! - **Async Design**: Built with Tokio; one cooperative control loop services
//!   chat, backend, and maintenance in strict sequence.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kakubridge::config::Config;
//! use kakubridge::bridge::BridgeServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let config = Config::load("config.toml").await?;
//!
//!     // Create and start the bridge
//!     let mut server = BridgeServer::new(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`bridge`] - Core bridge functionality: server loop, command router,
//!   authorization registry, reset challenge, maintenance timer
//! - [`telegram`] - Telegram Bot API transport (long polling, inline keyboards)
//! - [`mqtt`] - Backend connection and per-channel subscriptions
//! - [`provisioning`] - Credential exchange protocol
//! - [`rf433`] - RF addressing and the transmitter driver seam
//! - [`storage`] - Key/value persistence layer
//! - [`config`] - Configuration management and validation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  BridgeServer   │ ← Control loop & lifecycle
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  CommandRouter  │ ← Authorization + menu state machine
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  RfTransmitter  │ ← Fire-and-forget unit calls
//! └─────────────────┘
//! ```

pub mod bridge;
pub mod config;
pub mod logutil;
pub mod mqtt;
pub mod provisioning;
pub mod rf433;
pub mod storage;
pub mod telegram;
