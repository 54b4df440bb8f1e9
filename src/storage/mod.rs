//! # Storage Module - Key/Value Persistence Layer
//!
//! Persistence for KakuBridge is a small set of named keys, one file per key
//! under the data directory. The discipline is deliberately coarse: every
//! write replaces the whole value, every load happens once at startup, and a
//! missing or unreadable key falls back to its default.
//!
//! ## Keys
//!
//! ```text
//! data/
//! ├── numberOfChannels   ← decimal channel count, clamped to [1,16]
//! ├── telegramToken      ← bot credential
//! ├── telegramPassword   ← shared secret gating authorization
//! ├── users              ← newline-delimited decimal principal ids
//! ├── hasSetup           ← presence-only marker owned by the setup portal
//! ├── username           ← provisioning account
//! ├── password           ← provisioning account
//! └── klantcode          ← provisioning account code
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kakubridge::storage::{keys, Storage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Storage::new("./data").await?;
//!     let account = storage.load_account().await;
//!     if storage.exists(keys::HAS_SETUP).await {
//!         println!("setup completed, {} channels", account.number_of_channels);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Writes go through an exclusive `fs2` lock plus a temp-file rename, so a
//! concurrent reader never observes a half-written value. Credentials are
//! stored in the clear; protecting the data directory is the operator's job.

use anyhow::{anyhow, Result};
use log::{debug, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use fs2::FileExt;

/// Key names shared with the setup portal.
pub mod keys {
    pub const NUMBER_OF_CHANNELS: &str = "numberOfChannels";
    pub const TELEGRAM_TOKEN: &str = "telegramToken";
    pub const TELEGRAM_PASSWORD: &str = "telegramPassword";
    pub const USERS: &str = "users";
    pub const HAS_SETUP: &str = "hasSetup";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const KLANTCODE: &str = "klantcode";
}

/// Default shared secret, replaced the first time the portal saves one.
pub const DEFAULT_TELEGRAM_PASSWORD: &str = "Digitaal Kantoor";

/// Runtime account configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAccount {
    /// Number of switchable channels, clamped to [1,16].
    pub number_of_channels: u8,
    pub telegram_token: String,
    pub telegram_password: String,
}

impl Default for DeviceAccount {
    fn default() -> Self {
        Self {
            number_of_channels: 1,
            telegram_token: String::new(),
            telegram_password: DEFAULT_TELEGRAM_PASSWORD.to_string(),
        }
    }
}

/// Identity fields the credential exchange sends to the provisioning service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningAccount {
    pub username: String,
    pub password: String,
    pub klantcode: String,
}

/// Main storage interface
pub struct Storage {
    data_dir: String,
}

impl Storage {
    /// Initialize storage with the given data directory
    pub async fn new(data_dir: &str) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .await
            .map_err(|e| anyhow!("Failed to create data directory {}: {}", data_dir, e))?;
        Ok(Storage {
            data_dir: data_dir.to_string(),
        })
    }

    /// Return the base data directory path used by this storage instance
    pub fn base_dir(&self) -> &str {
        &self.data_dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        // Keys are fixed identifiers; reject anything that could escape the
        // data directory.
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(anyhow!("Invalid storage key '{}'", key));
        }
        Ok(Path::new(&self.data_dir).join(key))
    }

    /// Whether a value exists for `key`.
    pub async fn exists(&self, key: &str) -> bool {
        match self.key_path(key) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Read the value for `key`. Returns `None` when the key is absent.
    pub async fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;
        match fs::read_to_string(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow!("Failed reading key {}: {}", key, e)),
        }
    }

    /// Replace the whole value for `key`.
    pub async fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key)?;
        Self::write_file_locked(&path, value).await
    }

    /// Remove a single key. Absent keys are not an error.
    pub async fn erase(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow!("Failed erasing key {}: {}", key, e)),
        }
    }

    /// Wipe every stored key. The factory-reset path and nothing else calls
    /// this.
    pub async fn erase_all(&self) -> Result<()> {
        let mut entries = fs::read_dir(&self.data_dir)
            .await
            .map_err(|e| anyhow!("Failed listing data directory: {}", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| anyhow!("Failed walking data directory: {}", e))?
        {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                fs::remove_file(entry.path())
                    .await
                    .map_err(|e| anyhow!("Failed erasing {:?}: {}", entry.file_name(), e))?;
            }
        }
        Ok(())
    }

    /// Load the device account, falling back to defaults for absent keys.
    pub async fn load_account(&self) -> DeviceAccount {
        let mut account = DeviceAccount::default();

        match self.read(keys::NUMBER_OF_CHANNELS).await {
            Ok(Some(raw)) => {
                let parsed: i64 = raw.trim().parse().unwrap_or(1);
                account.number_of_channels = parsed.clamp(1, 16) as u8;
                debug!("Number of channels: {}", account.number_of_channels);
            }
            Ok(None) => {}
            Err(e) => warn!("{}; using default channel count", e),
        }

        match self.read(keys::TELEGRAM_TOKEN).await {
            Ok(Some(token)) => account.telegram_token = token.trim().to_string(),
            Ok(None) => {}
            Err(e) => warn!("{}; bridge will run without a Telegram token", e),
        }

        match self.read(keys::TELEGRAM_PASSWORD).await {
            Ok(Some(secret)) if !secret.trim().is_empty() => {
                account.telegram_password = secret.trim().to_string();
            }
            Ok(_) => {}
            Err(e) => warn!("{}; using the default shared secret", e),
        }

        account
    }

    /// Rewrite every account key. Mirrors how the setup portal saves: format
    /// each field and replace the value wholesale.
    pub async fn save_account(&self, account: &DeviceAccount) -> Result<()> {
        self.write(
            keys::NUMBER_OF_CHANNELS,
            &account.number_of_channels.to_string(),
        )
        .await?;
        self.write(keys::TELEGRAM_TOKEN, &account.telegram_token)
            .await?;
        self.write(keys::TELEGRAM_PASSWORD, &account.telegram_password)
            .await?;
        Ok(())
    }

    /// Load the provisioning identity. Absent keys load as empty strings;
    /// the exchange then fails and forces re-setup.
    pub async fn load_provisioning_account(&self) -> ProvisioningAccount {
        let read_or_empty = |v: Result<Option<String>>| match v {
            Ok(Some(s)) => s.trim().to_string(),
            _ => String::new(),
        };
        ProvisioningAccount {
            username: read_or_empty(self.read(keys::USERNAME).await),
            password: read_or_empty(self.read(keys::PASSWORD).await),
            klantcode: read_or_empty(self.read(keys::KLANTCODE).await),
        }
    }

    /// Helper function to write content to a file with exclusive locking
    async fn write_file_locked(path: &Path, content: &str) -> Result<()> {
        use std::fs::{self, File, OpenOptions};
        use std::io::Write;

        // Use synchronous I/O for file locking since fs2 doesn't support async
        // Step 1: Open (or create) the destination file to acquire an exclusive lock
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        lock_file.lock_exclusive()?;

        // Step 2: Create a unique temp file in the same directory
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let base = path.file_name().and_then(|s| s.to_str()).unwrap_or("key");
        let mut counter = 0u32;
        let tmp_path = loop {
            let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut tmp) => {
                    tmp.write_all(content.as_bytes())?;
                    tmp.flush()?;
                    let _ = tmp.sync_all();
                    break candidate;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    counter = counter.saturating_add(1);
                    continue;
                }
                Err(e) => return Err(anyhow!("Failed to create temp file for atomic write: {}", e)),
            }
        };

        // Step 3: Atomically replace the destination with the temp file
        fs::rename(&tmp_path, path)?;

        // Step 4: Fsync the directory to persist the rename (best-effort)
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }

        // Step 5: Unlock by dropping the lock file
        drop(lock_file);

        Ok(())
    }
}
