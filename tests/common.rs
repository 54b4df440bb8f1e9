//! Test utilities & fixtures.
//! Tests get a throwaway data directory per run; nothing touches the real
//! filesystem outside the tempdir.

use kakubridge::rf433::RfTransmitter;
use kakubridge::storage::Storage;
use kakubridge::telegram::ChatUpdate;

/// Transmitter that records every unit call instead of keying a radio.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct RecordingTransmitter {
    pub calls: Vec<(u8, bool)>,
}

impl RfTransmitter for RecordingTransmitter {
    fn send_unit(&mut self, unit: u8, on: bool) {
        self.calls.push((unit, on));
    }
}

/// Storage rooted in a fresh tempdir. Keep the TempDir alive for the test's
/// duration or the directory vanishes under the storage.
#[allow(dead_code)]
pub async fn temp_storage() -> (tempfile::TempDir, Storage) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let storage = Storage::new(tmp.path().to_str().unwrap())
        .await
        .expect("storage init");
    (tmp, storage)
}

/// A plain text message from `sender`.
#[allow(dead_code)]
pub fn text_update(sender: u64, text: &str) -> ChatUpdate {
    ChatUpdate {
        sender_id: sender,
        chat_id: sender as i64,
        first_name: "Kees".to_string(),
        text: text.to_string(),
        callback_data: None,
    }
}

/// A menu button press from `sender`.
#[allow(dead_code)]
pub fn callback_update(sender: u64, data: &str) -> ChatUpdate {
    ChatUpdate {
        sender_id: sender,
        chat_id: sender as i64,
        first_name: "Kees".to_string(),
        text: String::new(),
        callback_data: Some(data.to_string()),
    }
}
