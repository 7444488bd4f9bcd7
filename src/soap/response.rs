//! Response parsing and typed extraction.
//!
//! Response bodies are parsed once into an owned [`XmlElement`] tree. Element
//! and attribute names are stored by local name, so `s:Body`, `env:Body` and
//! `Body` all look the same to extraction code, and children are always a
//! list regardless of how many siblings share a name.
//!
//! Every extractor checks for a SOAP fault first and reports it as
//! [`Error::ProtocolFault`] before looking for its own field.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use std::fmt;

use crate::error::{Error, Result};

// ============================================================================
// Element Tree
// ============================================================================

/// One element of a parsed response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Local name, without namespace prefix
    pub name: String,
    /// Attributes keyed by local name, in document order
    pub attributes: Vec<(String, String)>,
    /// Concatenated direct text content
    pub text: String,
    /// Child elements in document order
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let mut text = String::new();
        let mut children = Vec::new();
        for child in node.children() {
            if child.is_element() {
                children.push(Self::from_node(child));
            } else if child.is_text() {
                if let Some(t) = child.text() {
                    text.push_str(t);
                }
            }
        }

        Self {
            name: node.tag_name().name().to_string(),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            text,
            children,
        }
    }

    /// First child with the given local name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given local name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a chain of local names, taking the first match at each level
    pub fn path(&self, names: &[&str]) -> Option<&XmlElement> {
        names
            .iter()
            .try_fold(self, |element, name| element.child(name))
    }

    /// Attribute value by local name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Text content with surrounding whitespace removed
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

// ============================================================================
// Typed Results
// ============================================================================

/// A SOAP fault returned in place of a normal body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    /// `Code/Subcode/Value`, falling back to `Code/Value`
    pub subcode: String,
    /// `Reason/Text`
    pub reason: Option<String>,
}

impl SoapFault {
    /// True for the WS-Management receive timeout (`w:TimedOut`)
    pub fn is_timed_out(&self) -> bool {
        self.subcode.ends_with("TimedOut")
    }
}

impl From<SoapFault> for Error {
    fn from(fault: SoapFault) -> Self {
        Error::ProtocolFault {
            subcode: fault.subcode,
            reason: fault.reason,
        }
    }
}

/// Output stream a fragment belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamName {
    Stdout,
    Stderr,
    Other(String),
}

impl StreamName {
    fn parse(name: &str) -> Self {
        match name {
            "stdout" => StreamName::Stdout,
            "stderr" => StreamName::Stderr,
            other => StreamName::Other(other.to_string()),
        }
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamName::Stdout => f.write_str("stdout"),
            StreamName::Stderr => f.write_str("stderr"),
            StreamName::Other(name) => f.write_str(name),
        }
    }
}

/// One `rsp:Stream` element of a receive response, base64 already decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFragment {
    pub name: StreamName,
    pub content: Vec<u8>,
    /// The stream produces no further data after this fragment
    pub end: bool,
    pub command_id: Option<String>,
}

impl StreamFragment {
    /// Content decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// The `rsp:CommandState` element of a receive response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandState {
    /// State URI, e.g. `.../CommandState/Done`
    pub state: String,
    pub exit_code: Option<i32>,
}

impl CommandState {
    /// The command has finished running
    pub fn is_done(&self) -> bool {
        self.state.ends_with("Done")
    }
}

// ============================================================================
// SOAP Response
// ============================================================================

/// A parsed response envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapResponse {
    root: XmlElement,
}

impl SoapResponse {
    /// Parse a response body.
    ///
    /// An empty body is accepted as an empty envelope; some listeners answer
    /// Send and Delete with no content.
    pub fn parse(xml: &str) -> Result<Self> {
        if xml.trim().is_empty() {
            return Ok(Self {
                root: XmlElement {
                    name: "Envelope".to_string(),
                    ..Default::default()
                },
            });
        }

        let doc = roxmltree::Document::parse(xml)
            .map_err(|e| Error::MalformedResponse(format!("Invalid XML: {}", e)))?;
        Ok(Self {
            root: XmlElement::from_node(doc.root_element()),
        })
    }

    /// The document element
    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    /// The `Body` element
    pub fn body(&self) -> Option<&XmlElement> {
        self.root.child("Body")
    }

    /// The fault carried by this response, if any
    pub fn fault(&self) -> Option<SoapFault> {
        let fault = self.body()?.child("Fault")?;

        let subcode = fault
            .path(&["Code", "Subcode", "Value"])
            .or_else(|| fault.path(&["Code", "Value"]))
            .map(|v| v.trimmed_text().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "SOAP Fault occurred".to_string());

        let reason = fault
            .path(&["Reason", "Text"])
            .map(|t| t.trimmed_text().to_string())
            .filter(|t| !t.is_empty());

        Some(SoapFault { subcode, reason })
    }

    /// Fail with [`Error::ProtocolFault`] if the response is a fault
    pub fn check_fault(&self) -> Result<()> {
        match self.fault() {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }

    /// Shell ID from a Create response.
    ///
    /// The `ResourceCreated` selector is preferred; listeners that omit it
    /// return the shell description with a `ShellId` child instead.
    pub fn extract_shell_id(&self) -> Result<String> {
        self.check_fault()?;
        let body = self.body().ok_or(Error::Extraction("shell ID"))?;

        let from_selector = body
            .path(&["ResourceCreated", "ReferenceParameters", "SelectorSet"])
            .and_then(|set| {
                set.children_named("Selector")
                    .find(|s| s.attribute("Name") == Some("ShellId"))
                    .or_else(|| set.child("Selector"))
            })
            .map(|s| s.trimmed_text())
            .filter(|id| !id.is_empty());

        if let Some(id) = from_selector {
            return Ok(id.to_string());
        }

        body.path(&["Shell", "ShellId"])
            .map(|s| s.trimmed_text())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(Error::Extraction("shell ID"))
    }

    /// Command ID from a Command response
    pub fn extract_command_id(&self) -> Result<String> {
        self.check_fault()?;
        self.body()
            .and_then(|b| b.path(&["CommandResponse", "CommandId"]))
            .map(|c| c.trimmed_text())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(Error::Extraction("command ID"))
    }

    /// Stream fragments from a Receive response, in document order.
    ///
    /// A response without streams yields an empty list.
    pub fn extract_streams(&self) -> Result<Vec<StreamFragment>> {
        self.check_fault()?;
        let Some(receive) = self.body().and_then(|b| b.child("ReceiveResponse")) else {
            return Ok(Vec::new());
        };

        receive
            .children_named("Stream")
            .map(|stream| {
                let encoded = stream.trimmed_text();
                let content = if encoded.is_empty() {
                    Vec::new()
                } else {
                    BASE64_STANDARD.decode(encoded).map_err(|e| {
                        Error::MalformedResponse(format!("Invalid base64 stream content: {}", e))
                    })?
                };

                Ok(StreamFragment {
                    name: StreamName::parse(stream.attribute("Name").unwrap_or_default()),
                    content,
                    end: stream
                        .attribute("End")
                        .is_some_and(|v| v.eq_ignore_ascii_case("true")),
                    command_id: stream.attribute("CommandId").map(str::to_string),
                })
            })
            .collect()
    }

    /// Command state from a Receive response, if the server included one
    pub fn extract_command_state(&self) -> Result<Option<CommandState>> {
        self.check_fault()?;
        let state = self
            .body()
            .and_then(|b| b.path(&["ReceiveResponse", "CommandState"]));

        Ok(state.map(|s| CommandState {
            state: s.attribute("State").unwrap_or_default().to_string(),
            exit_code: s
                .child("ExitCode")
                .and_then(|c| c.trimmed_text().parse().ok()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn envelope(body: &str) -> String {
        format!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
  xmlns:x="http://schemas.xmlsoap.org/ws/2004/09/transfer"
  xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing"
  xmlns:w="http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd"
  xmlns:rsp="http://schemas.microsoft.com/wbem/wsman/1/windows/shell">
  <s:Header/>
  <s:Body>{}</s:Body>
</s:Envelope>"#,
            body
        )
    }

    fn parse(body: &str) -> SoapResponse {
        SoapResponse::parse(&envelope(body)).unwrap()
    }

    #[test]
    fn test_shell_id_from_resource_created() {
        let response = parse(
            r#"<x:ResourceCreated>
  <a:Address>http://win01:5985/wsman</a:Address>
  <a:ReferenceParameters>
    <w:ResourceURI>http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd</w:ResourceURI>
    <w:SelectorSet><w:Selector Name="ShellId">AAAA-BBBB</w:Selector></w:SelectorSet>
  </a:ReferenceParameters>
</x:ResourceCreated>"#,
        );
        assert_eq!(response.extract_shell_id().unwrap(), "AAAA-BBBB");
    }

    #[test]
    fn test_shell_id_from_shell_element() {
        let response = parse(r#"<rsp:Shell><rsp:ShellId>CCCC-DDDD</rsp:ShellId></rsp:Shell>"#);
        assert_eq!(response.extract_shell_id().unwrap(), "CCCC-DDDD");
    }

    #[test]
    fn test_shell_id_missing() {
        let response = parse("<rsp:Other/>");
        assert!(matches!(
            response.extract_shell_id(),
            Err(Error::Extraction("shell ID"))
        ));
    }

    #[test]
    fn test_fault_short_circuits_extraction() {
        let response = parse(
            r#"<s:Fault>
  <s:Code><s:Value>s:Receiver</s:Value><s:Subcode><s:Value>Sender</s:Value></s:Subcode></s:Code>
  <s:Reason><s:Text xml:lang="en-US">Access is denied.</s:Text></s:Reason>
</s:Fault>"#,
        );

        let fault = response.fault().unwrap();
        assert_eq!(fault.subcode, "Sender");
        assert_eq!(fault.reason.as_deref(), Some("Access is denied."));

        for err in [
            response.extract_shell_id().unwrap_err(),
            response.extract_command_id().unwrap_err(),
            response.extract_streams().unwrap_err(),
        ] {
            assert_eq!(err.fault_subcode(), Some("Sender"));
        }
    }

    #[test]
    fn test_fault_without_subcode() {
        let response = parse(r#"<s:Fault><s:Code><s:Value>s:Receiver</s:Value></s:Code></s:Fault>"#);
        assert_eq!(response.fault().unwrap().subcode, "s:Receiver");

        let bare = parse("<s:Fault/>");
        let fault = bare.fault().unwrap();
        assert_eq!(fault.subcode, "SOAP Fault occurred");
        assert_eq!(fault.reason, None);
    }

    #[test]
    fn test_no_fault() {
        let response = parse("<rsp:CommandResponse><rsp:CommandId>X</rsp:CommandId></rsp:CommandResponse>");
        assert!(response.fault().is_none());
        assert!(response.check_fault().is_ok());
    }

    #[test]
    fn test_timed_out_fault() {
        let response = parse(
            r#"<s:Fault><s:Code><s:Value>s:Receiver</s:Value>
<s:Subcode><s:Value>w:TimedOut</s:Value></s:Subcode></s:Code></s:Fault>"#,
        );
        assert!(response.fault().unwrap().is_timed_out());
    }

    #[test]
    fn test_streams_single_and_multiple() {
        // One stdout fragment; "aGVsbG8=" is "hello"
        let single = parse(
            r#"<rsp:ReceiveResponse><rsp:Stream Name="stdout" CommandId="C1">aGVsbG8=</rsp:Stream></rsp:ReceiveResponse>"#,
        );
        let streams = single.extract_streams().unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].name, StreamName::Stdout);
        assert_eq!(streams[0].text(), "hello");
        assert!(!streams[0].end);
        assert_eq!(streams[0].command_id.as_deref(), Some("C1"));

        let multiple = parse(
            r#"<rsp:ReceiveResponse>
  <rsp:Stream Name="stdout" CommandId="C1">aGVsbG8=</rsp:Stream>
  <rsp:Stream Name="stderr" CommandId="C1">b29wcw==</rsp:Stream>
  <rsp:Stream Name="stdout" CommandId="C1" End="true"></rsp:Stream>
  <rsp:Stream Name="stderr" CommandId="C1" End="true"/>
  <rsp:CommandState CommandId="C1" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done">
    <rsp:ExitCode>3</rsp:ExitCode>
  </rsp:CommandState>
</rsp:ReceiveResponse>"#,
        );
        let streams = multiple.extract_streams().unwrap();
        assert_eq!(streams.len(), 4);
        assert_eq!(streams[1].name, StreamName::Stderr);
        assert_eq!(streams[1].text(), "oops");
        assert!(streams[2].end && streams[2].content.is_empty());
        assert!(streams[3].end);

        let state = multiple.extract_command_state().unwrap().unwrap();
        assert!(state.is_done());
        assert_eq!(state.exit_code, Some(3));
    }

    #[test]
    fn test_streams_absent() {
        let response = parse("<rsp:ReceiveResponse/>");
        assert!(response.extract_streams().unwrap().is_empty());
        assert_eq!(response.extract_command_state().unwrap(), None);
    }

    #[test]
    fn test_invalid_base64_is_malformed() {
        let response = parse(
            r#"<rsp:ReceiveResponse><rsp:Stream Name="stdout">!!!not base64</rsp:Stream></rsp:ReceiveResponse>"#,
        );
        assert!(matches!(
            response.extract_streams(),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_empty_and_invalid_bodies() {
        let empty = SoapResponse::parse("").unwrap();
        assert!(empty.check_fault().is_ok());
        assert!(empty.extract_streams().unwrap().is_empty());

        assert!(matches!(
            SoapResponse::parse("<not-closed>"),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_prefixes_do_not_matter() {
        let xml = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope" xmlns:p="http://schemas.microsoft.com/wbem/wsman/1/windows/shell">
<env:Body><p:CommandResponse><p:CommandId>Z9</p:CommandId></p:CommandResponse></env:Body></env:Envelope>"#;
        let response = SoapResponse::parse(xml).unwrap();
        assert_eq!(response.extract_command_id().unwrap(), "Z9");
    }
}
