//! # Command Router
//!
//! Interprets inbound chat updates against the authorization registry, the
//! per-principal menu state, and the reset challenge. Authorization is
//! checked before any command interpretation, so an unauthenticated
//! principal can never see channel state or trigger an RF transmission; the
//! shared secret is the sole gate.
//!
//! The router performs no I/O of its own except registry persistence: replies
//! come back as [`Outbound`] values and restart-class side effects as a
//! [`BridgeAction`], which the server applies. That keeps every transition in
//! the state table below exercisable from tests with a recording transmitter.
//!
//! State per principal: `MenuRoot`, `SettingsMenu`, `ResetPending`
//! (unauthenticated principals have no entry). Free text from any
//! authenticated state renders the root menu, unless it confirms the pending
//! reset challenge. Callback ids are honored only in the state whose menu
//! rendered them; anything else is a policy violation and is ignored.

use anyhow::Result;
use log::{debug, info, warn};
use std::collections::HashMap;

use super::menu::{self, CB_LOGOFF, CB_PASSWORD, CB_RESET, CB_SETTINGS};
use super::registry::{AuthorizationRegistry, AuthorizeOutcome, Principal};
use super::reset::ResetChallenge;
use crate::logutil::escape_log;
use crate::rf433::RfTransmitter;
use crate::storage::{keys, DeviceAccount, Storage};
use crate::telegram::{ChatUpdate, Menu};

macro_rules! sec_log {
    ($($arg:tt)*) => { log::warn!(target: "security", $($arg)*); };
}

/// Menu position of an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    MenuRoot,
    SettingsMenu,
    ResetPending,
}

/// A reply for the chat transport to deliver.
#[derive(Debug, Clone)]
pub enum Outbound {
    Text {
        chat_id: i64,
        text: String,
    },
    Menu {
        chat_id: i64,
        text: String,
        menu: Menu,
    },
}

/// Restart-class side effect the server must apply after delivering replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeAction {
    FactoryReset,
}

/// Everything one inbound update produced.
#[derive(Debug, Default)]
pub struct RouterResponse {
    pub outbound: Vec<Outbound>,
    pub action: Option<BridgeAction>,
}

impl RouterResponse {
    fn text(&mut self, chat_id: i64, text: impl Into<String>) {
        self.outbound.push(Outbound::Text {
            chat_id,
            text: text.into(),
        });
    }

    fn menu(&mut self, chat_id: i64, text: impl Into<String>, menu: Menu) {
        self.outbound.push(Outbound::Menu {
            chat_id,
            text: text.into(),
            menu,
        });
    }
}

/// The chat/command state machine.
pub struct CommandRouter {
    registry: AuthorizationRegistry,
    account: DeviceAccount,
    sessions: HashMap<Principal, SessionState>,
    challenge: ResetChallenge,
}

impl CommandRouter {
    pub fn new(registry: AuthorizationRegistry, account: DeviceAccount) -> Self {
        Self {
            registry,
            account,
            sessions: HashMap::new(),
            challenge: ResetChallenge::new(),
        }
    }

    pub fn account(&self) -> &DeviceAccount {
        &self.account
    }

    pub fn registry(&self) -> &AuthorizationRegistry {
        &self.registry
    }

    /// Wipe all authorization and session state (factory reset).
    pub fn wipe(&mut self) {
        self.registry.wipe();
        self.sessions.clear();
        self.challenge.consume();
    }

    /// Handle one inbound update. `radio` receives at most one unit call;
    /// `storage` is touched only to rewrite the users table after a
    /// registry mutation.
    pub async fn handle_update(
        &mut self,
        update: &ChatUpdate,
        radio: &mut dyn RfTransmitter,
        storage: &Storage,
    ) -> Result<RouterResponse> {
        let mut response = RouterResponse::default();
        let principal = update.sender_id;

        if !self.registry.is_authorized(principal) {
            self.handle_unauthenticated(update, storage, &mut response)
                .await?;
            return Ok(response);
        }

        match &update.callback_data {
            Some(data) => {
                self.handle_callback(update, data, radio, storage, &mut response)
                    .await?
            }
            None => self.handle_text(update, &mut response),
        }
        Ok(response)
    }

    /// The password gate. Exact match on the shared secret authorizes;
    /// anything else gets the corrective prompt.
    async fn handle_unauthenticated(
        &mut self,
        update: &ChatUpdate,
        storage: &Storage,
        response: &mut RouterResponse,
    ) -> Result<()> {
        let principal = update.sender_id;

        if !update.is_callback() && update.text == self.account.telegram_password {
            match self.registry.authorize(principal) {
                AuthorizeOutcome::Added => {
                    self.persist_registry(storage).await?;
                    self.sessions.insert(principal, SessionState::MenuRoot);
                    info!("principal {} authorized", principal);
                    response.text(
                        update.chat_id,
                        format!(
                            "Dear {}, you are logged on. Type /start to control your devices.",
                            update.first_name
                        ),
                    );
                }
                AuthorizeOutcome::TableFull => {
                    sec_log!(
                        "authorization table full; principal {} not admitted",
                        principal
                    );
                    response.text(
                        update.chat_id,
                        "The user table is full. Another user has to sign out before you can be logged on.",
                    );
                }
                AuthorizeOutcome::AlreadyPresent | AuthorizeOutcome::Invalid => {
                    // AlreadyPresent is unreachable behind the is_authorized
                    // check; Invalid means sender id 0, which gets no session.
                    debug!("authorize({}) was a no-op", principal);
                }
            }
        } else {
            sec_log!("principal {} failed the secret gate", principal);
            debug!(
                "rejected text from {}: {}",
                principal,
                escape_log(&update.text)
            );
            response.text(
                update.chat_id,
                format!(
                    "Dear {}, please give the secret code before you continue.",
                    update.first_name
                ),
            );
        }
        Ok(())
    }

    /// Free text from an authenticated principal: either the reset
    /// confirmation, or a return to the root menu.
    fn handle_text(&mut self, update: &ChatUpdate, response: &mut RouterResponse) {
        let principal = update.sender_id;

        if self.challenge.matches(principal, &update.text) {
            self.challenge.consume();
            sec_log!("factory reset confirmed by principal {}", principal);
            response.text(update.chat_id, "Device will be reset.");
            response.action = Some(BridgeAction::FactoryReset);
            return;
        }

        if self.challenge.is_pending() {
            // The challenge survives navigation; only a new `reset` request
            // or a restart replaces it.
            debug!("text from {} did not confirm the pending reset", principal);
        }
        self.sessions.insert(principal, SessionState::MenuRoot);
        response.menu(
            update.chat_id,
            "What do you want to do?",
            menu::channel_menu(self.account.number_of_channels),
        );
    }

    /// Menu button presses, honored only in the state whose menu offered
    /// them. Everything else is ignored without a reply.
    async fn handle_callback(
        &mut self,
        update: &ChatUpdate,
        data: &str,
        radio: &mut dyn RfTransmitter,
        storage: &Storage,
        response: &mut RouterResponse,
    ) -> Result<()> {
        let principal = update.sender_id;
        let state = *self
            .sessions
            .get(&principal)
            .unwrap_or(&SessionState::MenuRoot);

        match (state, data) {
            (SessionState::MenuRoot, CB_SETTINGS) => {
                self.sessions.insert(principal, SessionState::SettingsMenu);
                response.menu(
                    update.chat_id,
                    "Here are the possible settings:",
                    menu::settings_menu(),
                );
            }
            (SessionState::SettingsMenu, CB_PASSWORD) => {
                response.text(
                    update.chat_id,
                    format!("The password is: {}", self.account.telegram_password),
                );
            }
            (SessionState::SettingsMenu, CB_LOGOFF) => {
                self.registry.deauthorize(principal);
                self.persist_registry(storage).await?;
                self.sessions.remove(&principal);
                sec_log!("principal {} signed out", principal);
                response.text(update.chat_id, "You are logged off.");
            }
            (SessionState::SettingsMenu, CB_RESET) => {
                let code = self.challenge.issue(principal);
                self.sessions.insert(principal, SessionState::ResetPending);
                sec_log!("reset challenge issued to principal {}", principal);
                response.text(
                    update.chat_id,
                    format!(
                        "Are you sure? Type '{}' to reset this device to factory settings.",
                        ResetChallenge::confirmation_phrase(code)
                    ),
                );
            }
            (SessionState::MenuRoot, other) => {
                match menu::parse_channel_callback(other) {
                    Some((channel, on)) if channel < self.account.number_of_channels => {
                        radio.send_unit(channel, on);
                        let reply = if on {
                            "Device is turned on."
                        } else {
                            "Device is turned off."
                        };
                        response.text(update.chat_id, reply);
                    }
                    Some((channel, _)) => {
                        warn!(
                            "channel {} out of range (have {}); no transmission",
                            channel, self.account.number_of_channels
                        );
                    }
                    None => debug!("unrecognized callback '{}' ignored", escape_log(other)),
                }
            }
            (_, other) => {
                debug!(
                    "callback '{}' ignored in state {:?}",
                    escape_log(other),
                    state
                );
            }
        }
        Ok(())
    }

    async fn persist_registry(&self, storage: &Storage) -> Result<()> {
        storage.write(keys::USERS, &self.registry.to_lines()).await
    }
}
