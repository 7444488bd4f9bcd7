//! NTLM handshake tests against a fake WinRM listener.

mod common;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use common::*;
use wiremock::matchers::{body_string_contains, header_regex, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use winrm_shell::connection::{AuthMethod, WinRmConfigBuilder};
use winrm_shell::shell::WinRmClient;
use winrm_shell::Error;

// "NTLMSSP\0" followed by message type 1 or 3, base64 encoded
const TYPE1_PREFIX: &str = "^Negotiate TlRMTVNTUAAB";
const TYPE3_PREFIX: &str = "^Negotiate TlRMTVNTUAAD";

fn ntlm_client(server: &MockServer) -> WinRmClient {
    let addr = server.address();
    let config = WinRmConfigBuilder::new(addr.ip().to_string())
        .port(addr.port())
        .credentials("CORP\\deploy", "Passw0rd!")
        .workstation("TESTBOX")
        .build()
        .unwrap();
    assert_eq!(config.auth_method, AuthMethod::Ntlm);
    WinRmClient::new(config).unwrap()
}

/// Answer probes with the offered schemes and Type 1 with a challenge
async fn mount_challenge(server: &MockServer, challenge_header: Option<String>) {
    let mut type2 = ResponseTemplate::new(401);
    if let Some(value) = challenge_header {
        type2 = type2.insert_header("WWW-Authenticate", value.as_str());
    }
    Mock::given(method("POST"))
        .and(header_regex("Authorization", TYPE1_PREFIX))
        .respond_with(type2)
        .mount(server)
        .await;
}

async fn mount_probe(server: &MockServer) {
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("WWW-Authenticate", "Negotiate")
                .insert_header("WWW-Authenticate", "Basic realm=\"WSMAN\""),
        )
        .mount(server)
        .await;
}

fn challenge_header() -> String {
    format!(
        "Negotiate {}",
        BASE64_STANDARD.encode(challenge_message([1, 2, 3, 4, 5, 6, 7, 8]))
    )
}

#[tokio::test]
async fn test_ntlm_handshake_creates_shell() {
    let server = MockServer::start().await;
    mount_challenge(&server, Some(challenge_header())).await;
    Mock::given(method("POST"))
        .and(header_regex("Authorization", TYPE3_PREFIX))
        .and(body_string_contains(CREATE_ACTION))
        .respond_with(soap(create_response()))
        .expect(1)
        .mount(&server)
        .await;
    mount_probe(&server).await;

    let client = ntlm_client(&server);
    let shell = client.create_shell().await.unwrap();
    assert_eq!(shell.id(), SHELL_ID);
}

#[tokio::test]
async fn test_ntlm_missing_challenge_token() {
    let server = MockServer::start().await;
    mount_challenge(&server, None).await;
    mount_probe(&server).await;

    let client = ntlm_client(&server);
    let err = client.create_shell().await.unwrap_err();

    assert!(matches!(err, Error::Authentication(_)), "{:?}", err);
}

#[tokio::test]
async fn test_ntlm_rejected_authenticate() {
    let server = MockServer::start().await;
    mount_challenge(&server, Some(challenge_header())).await;
    Mock::given(method("POST"))
        .and(header_regex("Authorization", TYPE3_PREFIX))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    mount_probe(&server).await;

    let client = ntlm_client(&server);
    let err = client.create_shell().await.unwrap_err();

    assert!(matches!(err, Error::Authentication(_)), "{:?}", err);
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_ntlm_v1_challenge_unsupported() {
    let server = MockServer::start().await;

    // Same challenge with the target info flag cleared
    let mut message = challenge_message([9; 8]);
    let flags = u32::from_le_bytes([message[20], message[21], message[22], message[23]]);
    message[20..24].copy_from_slice(&(flags & !0x0080_0000).to_le_bytes());
    mount_challenge(
        &server,
        Some(format!("NTLM {}", BASE64_STANDARD.encode(message))),
    )
    .await;
    mount_probe(&server).await;

    let client = ntlm_client(&server);
    let err = client.create_shell().await.unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)), "{:?}", err);
}
