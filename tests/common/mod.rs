//! Shared helpers for integration tests: a fake WinRM listener built on
//! wiremock and canned SOAP response bodies.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use winrm_shell::connection::{AuthMethod, WinRmConfig, WinRmConfigBuilder};
use winrm_shell::shell::WinRmClient;

pub const SHELL_ID: &str = "11111111-2222-3333-4444-555555555555";
pub const COMMAND_ID: &str = "AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE";

pub const CREATE_ACTION: &str = "transfer/Create";
pub const DELETE_ACTION: &str = "transfer/Delete";
pub const COMMAND_ACTION: &str = "windows/shell/Command";
pub const RECEIVE_ACTION: &str = "windows/shell/Receive";
pub const SEND_ACTION: &str = "windows/shell/Send";

/// Wrap `body` in a SOAP envelope the way a Windows listener does
pub fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xml:lang="en-US" xmlns:s="http://www.w3.org/2003/05/soap-envelope"
  xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing"
  xmlns:x="http://schemas.xmlsoap.org/ws/2004/09/transfer"
  xmlns:w="http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd"
  xmlns:rsp="http://schemas.microsoft.com/wbem/wsman/1/windows/shell"
  xmlns:p="http://schemas.microsoft.com/wbem/wsman/1/wsman.xsd">
  <s:Header><a:Action>response</a:Action></s:Header>
  <s:Body>{}</s:Body>
</s:Envelope>"#,
        body
    )
}

pub fn create_response() -> String {
    envelope(&format!(
        r#"<x:ResourceCreated>
  <a:Address>http://127.0.0.1/wsman</a:Address>
  <a:ReferenceParameters>
    <w:ResourceURI>http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd</w:ResourceURI>
    <w:SelectorSet><w:Selector Name="ShellId">{}</w:Selector></w:SelectorSet>
  </a:ReferenceParameters>
</x:ResourceCreated>"#,
        SHELL_ID
    ))
}

pub fn command_response() -> String {
    envelope(&format!(
        "<rsp:CommandResponse><rsp:CommandId>{}</rsp:CommandId></rsp:CommandResponse>",
        COMMAND_ID
    ))
}

/// A receive response carrying `stdout`/`stderr` text; `done` marks both
/// streams ended and the command state Done with exit code 0
pub fn receive_response(stdout: &str, stderr: &str, done: bool) -> String {
    let mut streams = String::new();
    if !stdout.is_empty() {
        streams.push_str(&format!(
            r#"<rsp:Stream Name="stdout" CommandId="{}">{}</rsp:Stream>"#,
            COMMAND_ID,
            BASE64_STANDARD.encode(stdout)
        ));
    }
    if !stderr.is_empty() {
        streams.push_str(&format!(
            r#"<rsp:Stream Name="stderr" CommandId="{}">{}</rsp:Stream>"#,
            COMMAND_ID,
            BASE64_STANDARD.encode(stderr)
        ));
    }
    let state = if done {
        streams.push_str(&format!(
            r#"<rsp:Stream Name="stdout" CommandId="{id}" End="true"></rsp:Stream><rsp:Stream Name="stderr" CommandId="{id}" End="true"></rsp:Stream>"#,
            id = COMMAND_ID
        ));
        format!(
            r#"<rsp:CommandState CommandId="{}" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done"><rsp:ExitCode>0</rsp:ExitCode></rsp:CommandState>"#,
            COMMAND_ID
        )
    } else {
        format!(
            r#"<rsp:CommandState CommandId="{}" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Running"/>"#,
            COMMAND_ID
        )
    };
    envelope(&format!(
        "<rsp:ReceiveResponse>{}{}</rsp:ReceiveResponse>",
        streams, state
    ))
}

pub fn fault_response(subcode: &str, reason: &str) -> String {
    envelope(&format!(
        r#"<s:Fault>
  <s:Code>
    <s:Value>s:Sender</s:Value>
    <s:Subcode><s:Value>{}</s:Value></s:Subcode>
  </s:Code>
  <s:Reason><s:Text xml:lang="en-US">{}</s:Text></s:Reason>
</s:Fault>"#,
        subcode, reason
    ))
}

pub fn soap(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Content-Type", "application/soap+xml;charset=UTF-8")
        .set_body_string(body)
}

/// Basic-auth client pointed at the mock server
pub fn basic_config(server: &MockServer) -> WinRmConfig {
    let addr = server.address();
    WinRmConfigBuilder::new(addr.ip().to_string())
        .port(addr.port())
        .credentials("Administrator", "Passw0rd!")
        .auth_method(AuthMethod::Basic)
        .workstation("TESTBOX")
        .build()
        .unwrap()
}

pub fn basic_client(server: &MockServer) -> WinRmClient {
    WinRmClient::new(basic_config(server)).unwrap()
}

/// Mount one mock answering every request carrying `action`
pub async fn mount_action(server: &MockServer, action: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/wsman"))
        .and(body_string_contains(action))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Mount create, command and delete handlers for a single-command lifecycle
pub async fn mount_lifecycle(server: &MockServer) {
    mount_action(server, CREATE_ACTION, soap(create_response())).await;
    mount_action(server, COMMAND_ACTION, soap(command_response())).await;
    mount_action(server, DELETE_ACTION, soap(String::new())).await;
}

/// Build an NTLM Type 2 message with target information
pub fn challenge_message(challenge: [u8; 8]) -> Vec<u8> {
    let target_name: Vec<u8> = "CORP".encode_utf16().flat_map(|c| c.to_le_bytes()).collect();
    let target_info: Vec<u8> = {
        let domain: Vec<u8> = "CORP".encode_utf16().flat_map(|c| c.to_le_bytes()).collect();
        let mut info = Vec::new();
        info.extend_from_slice(&2u16.to_le_bytes());
        info.extend_from_slice(&(domain.len() as u16).to_le_bytes());
        info.extend_from_slice(&domain);
        info.extend_from_slice(&[0, 0, 0, 0]);
        info
    };
    let flags: u32 = 0x0000_0001 | 0x0000_0200 | 0x0008_0000 | 0x0080_0000;

    let header_len = 48u32;
    let name_offset = header_len;
    let info_offset = name_offset + target_name.len() as u32;

    let mut msg = Vec::new();
    msg.extend_from_slice(b"NTLMSSP\0");
    msg.extend_from_slice(&2u32.to_le_bytes());
    msg.extend_from_slice(&(target_name.len() as u16).to_le_bytes());
    msg.extend_from_slice(&(target_name.len() as u16).to_le_bytes());
    msg.extend_from_slice(&name_offset.to_le_bytes());
    msg.extend_from_slice(&flags.to_le_bytes());
    msg.extend_from_slice(&challenge);
    msg.extend_from_slice(&[0u8; 8]);
    msg.extend_from_slice(&(target_info.len() as u16).to_le_bytes());
    msg.extend_from_slice(&(target_info.len() as u16).to_le_bytes());
    msg.extend_from_slice(&info_offset.to_le_bytes());
    msg.extend_from_slice(&target_name);
    msg.extend_from_slice(&target_info);
    msg
}
