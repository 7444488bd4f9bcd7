//! WS-Management SOAP codec.
//!
//! [`envelope`] renders request envelopes for the five shell operations and
//! [`response`] turns response bodies into a normalized element tree with
//! typed extractors. Neither half performs I/O.

pub mod envelope;
pub mod response;

pub use envelope::{
    build_command_request, build_create_shell_request, build_delete_shell_request,
    build_header, build_receive_request, build_send_input_request, xml_escape,
};
pub use response::{CommandState, SoapFault, SoapResponse, StreamFragment, StreamName, XmlElement};

// ============================================================================
// Namespaces
// ============================================================================

pub const SOAP_ENV_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const WSA_NS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
pub const WSMAN_NS: &str = "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd";
pub const MS_WSMAN_NS: &str = "http://schemas.microsoft.com/wbem/wsman/1/wsman.xsd";
pub const SHELL_NS: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell";

// ============================================================================
// Resource and Action URIs
// ============================================================================

/// The `cmd` shell resource
pub const SHELL_RESOURCE_URI: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";

pub const ANONYMOUS_ADDRESS: &str =
    "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";

pub const ACTION_CREATE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create";
pub const ACTION_DELETE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete";
pub const ACTION_COMMAND: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command";
pub const ACTION_RECEIVE: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive";
pub const ACTION_SEND: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Send";

/// Maximum envelope size advertised to the server
pub const MAX_ENVELOPE_SIZE: u32 = 153_600;

/// Server-side operation timeout (ISO 8601 duration)
pub const OPERATION_TIMEOUT: &str = "PT60S";

pub const LOCALE: &str = "en-US";
