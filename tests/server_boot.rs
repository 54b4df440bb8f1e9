//! Bridge server boot: persisted state loads, bad registry lines are
//! tolerated, and status reporting works without any network.

use kakubridge::bridge::BridgeServer;
use kakubridge::config::Config;
use kakubridge::storage::{keys, Storage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn test_config(data_dir: &str) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = data_dir.to_string();
    config.bridge.mac_address = "5c:cf:7f:0a:0b:0c".to_string();
    config.logging.file = None;
    config.logging.security_file = None;
    config
}

#[tokio::test]
async fn boots_on_empty_data_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path().to_str().unwrap());
    let bridge = BridgeServer::new(config).await.unwrap();
    bridge.show_status().await.unwrap();
}

#[tokio::test]
async fn boots_with_populated_and_partly_corrupt_state() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_str().unwrap();

    let storage = Storage::new(dir).await.unwrap();
    storage.write(keys::NUMBER_OF_CHANNELS, "3").await.unwrap();
    storage
        .write(keys::USERS, "42\ngarbage-line\n77\n")
        .await
        .unwrap();
    storage.write(keys::HAS_SETUP, "").await.unwrap();

    let config = test_config(dir);
    let bridge = BridgeServer::new(config).await.unwrap();
    bridge.show_status().await.unwrap();
}

#[tokio::test]
async fn rejects_invalid_mac() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path().to_str().unwrap());
    config.bridge.mac_address = "whoops".to_string();
    assert!(BridgeServer::new(config).await.is_err());
}

/// Serve a single canned 500 response on a throwaway port.
async fn failing_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(
                    b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                )
                .await;
        }
    });
    format!("http://{addr}/device.php")
}

#[tokio::test]
async fn provisioning_failure_clears_setup_marker() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_str().unwrap();

    let storage = Storage::new(dir).await.unwrap();
    storage.write(keys::HAS_SETUP, "").await.unwrap();
    storage.write(keys::USERNAME, "jan").await.unwrap();

    let mut config = test_config(dir);
    config.provisioning.enabled = true;
    config.provisioning.endpoint = failing_endpoint().await;
    config.provisioning.timeout_secs = 5;

    let mut bridge = BridgeServer::new(config).await.unwrap();
    assert!(bridge.connect().await.is_err());

    // Marker gone, nothing else disturbed: the handshake retries from the
    // top on the next boot.
    assert!(!storage.exists(keys::HAS_SETUP).await);
    assert!(storage.exists(keys::USERNAME).await);
}

#[tokio::test]
async fn unreachable_chat_transport_fails_boot() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_str().unwrap();

    let storage = Storage::new(dir).await.unwrap();
    storage
        .write(keys::TELEGRAM_TOKEN, "000:token")
        .await
        .unwrap();

    // Bind-then-drop leaves a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = test_config(dir);
    config.telegram.api_base = format!("http://{addr}");
    config.telegram.poll_timeout_secs = 1;

    let mut bridge = BridgeServer::new(config).await.unwrap();
    assert!(bridge.connect().await.is_err());
}
