//! Request envelope construction.
//!
//! Every builder takes the endpoint URL (rendered as `wsa:To`) and returns a
//! complete XML document ready to POST. Caller-supplied text is escaped with
//! [`xml_escape`] before it is interpolated.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use uuid::Uuid;

use super::{
    ACTION_COMMAND, ACTION_CREATE, ACTION_DELETE, ACTION_RECEIVE, ACTION_SEND, ANONYMOUS_ADDRESS,
    LOCALE, MAX_ENVELOPE_SIZE, MS_WSMAN_NS, OPERATION_TIMEOUT, SHELL_NS, SHELL_RESOURCE_URI,
    SOAP_ENV_NS, WSA_NS, WSMAN_NS,
};

/// Escape XML special characters
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Build the `s:Header` block shared by every request.
///
/// A fresh message ID is generated per call. `shell_id` adds the `ShellId`
/// selector; `options` renders a `wsman:OptionSet` when non-empty.
pub fn build_header(
    endpoint: &str,
    action: &str,
    shell_id: Option<&str>,
    options: &[(&str, &str)],
) -> String {
    let message_id = Uuid::new_v4();

    let selector_set = shell_id
        .map(|id| {
            format!(
                r#"
    <wsman:SelectorSet>
      <wsman:Selector Name="ShellId">{}</wsman:Selector>
    </wsman:SelectorSet>"#,
                xml_escape(id)
            )
        })
        .unwrap_or_default();

    let option_set = if options.is_empty() {
        String::new()
    } else {
        let rendered: String = options
            .iter()
            .map(|(name, value)| {
                format!(
                    r#"
      <wsman:Option Name="{}">{}</wsman:Option>"#,
                    xml_escape(name),
                    xml_escape(value)
                )
            })
            .collect();
        format!(
            r#"
    <wsman:OptionSet>{}
    </wsman:OptionSet>"#,
            rendered
        )
    };

    format!(
        r#"<s:Header>
    <wsa:To>{to}</wsa:To>
    <wsman:ResourceURI s:mustUnderstand="true">{SHELL_RESOURCE_URI}</wsman:ResourceURI>
    <wsa:ReplyTo>
      <wsa:Address s:mustUnderstand="true">{ANONYMOUS_ADDRESS}</wsa:Address>
    </wsa:ReplyTo>
    <wsman:MaxEnvelopeSize s:mustUnderstand="true">{MAX_ENVELOPE_SIZE}</wsman:MaxEnvelopeSize>
    <wsa:MessageID>uuid:{message_id}</wsa:MessageID>
    <wsman:Locale s:mustUnderstand="false" xml:lang="{LOCALE}"/>
    <wsman:OperationTimeout>{OPERATION_TIMEOUT}</wsman:OperationTimeout>
    <wsa:Action s:mustUnderstand="true">{action}</wsa:Action>{selector_set}{option_set}
  </s:Header>"#,
        to = xml_escape(endpoint),
    )
}

fn envelope(header: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="{SOAP_ENV_NS}" xmlns:wsa="{WSA_NS}" xmlns:wsman="{WSMAN_NS}" xmlns:p="{MS_WSMAN_NS}" xmlns:rsp="{SHELL_NS}">
  {header}
  {body}
</s:Envelope>"#
    )
}

/// Transfer/Create for a new `cmd` shell
pub fn build_create_shell_request(endpoint: &str) -> String {
    let header = build_header(
        endpoint,
        ACTION_CREATE,
        None,
        &[("WINRS_NOPROFILE", "FALSE"), ("WINRS_CODEPAGE", "437")],
    );
    let body = r#"<s:Body>
    <rsp:Shell>
      <rsp:InputStreams>stdin</rsp:InputStreams>
      <rsp:OutputStreams>stderr stdout</rsp:OutputStreams>
    </rsp:Shell>
  </s:Body>"#;
    envelope(&header, body)
}

/// Shell/Command carrying `command_line` verbatim
pub fn build_command_request(endpoint: &str, shell_id: &str, command_line: &str) -> String {
    let header = build_header(
        endpoint,
        ACTION_COMMAND,
        Some(shell_id),
        &[
            ("WINRS_CONSOLEMODE_STDIN", "TRUE"),
            ("WINRS_SKIP_CMD_SHELL", "FALSE"),
        ],
    );
    let body = format!(
        r#"<s:Body>
    <rsp:CommandLine>
      <rsp:Command>{}</rsp:Command>
    </rsp:CommandLine>
  </s:Body>"#,
        xml_escape(command_line)
    );
    envelope(&header, &body)
}

/// Shell/Receive for both output streams of one command
pub fn build_receive_request(endpoint: &str, shell_id: &str, command_id: &str) -> String {
    let header = build_header(endpoint, ACTION_RECEIVE, Some(shell_id), &[]);
    let body = format!(
        r#"<s:Body>
    <rsp:Receive>
      <rsp:DesiredStream CommandId="{}">stdout stderr</rsp:DesiredStream>
    </rsp:Receive>
  </s:Body>"#,
        xml_escape(command_id)
    );
    envelope(&header, &body)
}

/// Shell/Send with `input` as one base64 stdin fragment
pub fn build_send_input_request(
    endpoint: &str,
    shell_id: &str,
    command_id: &str,
    input: &str,
) -> String {
    let header = build_header(endpoint, ACTION_SEND, Some(shell_id), &[]);
    let body = format!(
        r#"<s:Body>
    <rsp:Send>
      <rsp:Stream Name="stdin" CommandId="{}">{}</rsp:Stream>
    </rsp:Send>
  </s:Body>"#,
        xml_escape(command_id),
        BASE64_STANDARD.encode(input.as_bytes())
    );
    envelope(&header, &body)
}

/// Transfer/Delete for the shell
pub fn build_delete_shell_request(endpoint: &str, shell_id: &str) -> String {
    let header = build_header(endpoint, ACTION_DELETE, Some(shell_id), &[]);
    envelope(&header, "<s:Body/>")
}
