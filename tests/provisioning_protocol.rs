//! Credential exchange protocol: request construction, response parsing, and
//! the status-code acceptance window, against a throwaway local HTTP server.

use kakubridge::config::ProvisioningConfig;
use kakubridge::provisioning::{form_encode, MqttCredentials, ProvisioningClient, ProvisioningError};
use kakubridge::storage::ProvisioningAccount;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn account() -> ProvisioningAccount {
    ProvisioningAccount {
        username: "jan jansen".to_string(),
        password: "w8w00rd!".to_string(),
        klantcode: "1234".to_string(),
    }
}

/// Serve exactly one canned HTTP response, then return the request line.
async fn one_shot_server(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        // Read until the header terminator; a GET has no body.
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if raw.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        let request = String::from_utf8_lossy(&raw).to_string();
        let response = format!(
            "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        request
    });
    (format!("http://{}", addr), handle)
}

fn config_for(endpoint: String) -> ProvisioningConfig {
    ProvisioningConfig {
        enabled: true,
        endpoint: format!("{endpoint}/device.php"),
        service_type: "rf433v1".to_string(),
        timeout_secs: 5,
    }
}

#[test]
fn percent_encoding_round_trip() {
    assert_eq!(form_encode("a b&c"), "a+b%26c");
    assert_eq!(form_encode("abcXYZ019"), "abcXYZ019");
    assert_eq!(form_encode("€"), "%E2%82%AC");
}

#[tokio::test]
async fn successful_exchange_parses_six_fields() {
    let (endpoint, server) = one_shot_server(
        "HTTP/1.1 200 OK",
        "broker.example.com\n1883\nuser1\npass1\nclient-abc\ndk/abc\nextra ignored\n",
    )
    .await;
    let client = ProvisioningClient::new(config_for(endpoint));

    let creds = client.fetch(&account(), "1a2b3c").await.unwrap();
    assert_eq!(
        creds,
        MqttCredentials {
            host: "broker.example.com".to_string(),
            port: "1883".to_string(),
            user: "user1".to_string(),
            pass: "pass1".to_string(),
            client_id: "client-abc".to_string(),
            base_topic: "dk/abc".to_string(),
        }
    );

    let request = server.await.unwrap();
    let request_line = request.lines().next().unwrap();
    assert!(request_line.contains("user=jan+jansen"));
    assert!(request_line.contains("pass=w8w00rd%21"));
    assert!(request_line.contains("code=1234"));
    assert!(request_line.contains("device=1a2b3c"));
    assert!(request_line.contains("type=rf433v1"));
}

#[tokio::test]
async fn server_error_is_a_provisioning_failure() {
    let (endpoint, _server) = one_shot_server("HTTP/1.1 500 Internal Server Error", "oops").await;
    let client = ProvisioningClient::new(config_for(endpoint));

    match client.fetch(&account(), "1a2b3c").await {
        Err(ProvisioningError::Status(500)) => {}
        other => panic!("expected Status(500), got {other:?}"),
    }
}

#[tokio::test]
async fn redirect_class_status_is_accepted() {
    // 100-399 counts as success for the protocol; a 302 without six fields
    // then fails as truncated, not as a status error.
    let (endpoint, _server) = one_shot_server("HTTP/1.1 302 Found", "").await;
    let client = ProvisioningClient::new(config_for(endpoint));

    match client.fetch(&account(), "1a2b3c").await {
        Err(ProvisioningError::Truncated(0)) => {}
        other => panic!("expected Truncated(0), got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_failure() {
    // Bind-then-drop gives a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ProvisioningClient::new(config_for(format!("http://{addr}")));
    match client.fetch(&account(), "1a2b3c").await {
        Err(ProvisioningError::Transport(_)) => {}
        other => panic!("expected Transport error, got {other:?}"),
    }
}
