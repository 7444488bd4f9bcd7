//! HTTP transport for SOAP requests.
//!
//! [`Transport::send`] dispatches on the configured [`AuthMethod`]:
//!
//! - **Basic**: one POST with an `Authorization: Basic` header, over a shared
//!   client.
//! - **NTLM**: probe, Type 1, Type 2 and Type 3 exchanged over a private
//!   client that keeps a single idle HTTP/1.1 connection, so the whole
//!   handshake stays on one TCP session. The client is dropped when the
//!   exchange ends, releasing the socket whether it succeeded or not.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::auth::basic_auth_header;
use super::ntlm::{ChallengeMessage, NtlmAuthenticator};
use super::{AuthMethod, WinRmConfig};
use crate::error::{Error, Result};
use crate::soap::SoapResponse;

/// Content type of every request
pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml;charset=UTF-8";

/// Time allowed to establish the TCP/TLS connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent announced to the listener
pub const USER_AGENT: &str = concat!("winrm-shell/", env!("CARGO_PKG_VERSION"));

static CHALLENGE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Negotiate|NTLM)\s+([A-Za-z0-9+/=]+)").expect("Invalid challenge regex")
});

/// Sends SOAP envelopes to one WinRM endpoint
#[derive(Debug, Clone)]
pub struct Transport {
    config: Arc<WinRmConfig>,
    client: Client,
}

impl Transport {
    /// Create a transport for the given connection parameters
    pub fn new(config: Arc<WinRmConfig>) -> Result<Self> {
        let client = client_builder(&config)
            .build()
            .map_err(|e| Error::transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Connection parameters used by this transport
    pub fn config(&self) -> &WinRmConfig {
        &self.config
    }

    /// Send one envelope with the configured authentication method
    pub async fn send(&self, xml: &str) -> Result<SoapResponse> {
        match self.config.auth_method {
            AuthMethod::Basic => self.send_basic(xml).await,
            AuthMethod::Ntlm => self.send_ntlm(xml).await,
        }
    }

    /// Send one envelope with Basic authentication
    pub async fn send_basic(&self, xml: &str) -> Result<SoapResponse> {
        let url = self.config.endpoint_url();
        debug!(
            url = %url,
            bytes = xml.len(),
            "Sending HTTP request (Basic)"
        );

        let response = self
            .client
            .post(&url)
            .header(
                AUTHORIZATION,
                basic_auth_header(&self.config.username, &self.config.password),
            )
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(xml.to_string())
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        debug!(status = status.as_u16(), "HTTP response received");

        let body = self.read_body(response).await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        SoapResponse::parse(&body)
    }

    /// Send one envelope after an NTLM handshake on a dedicated connection
    pub async fn send_ntlm(&self, xml: &str) -> Result<SoapResponse> {
        let url = self.config.endpoint_url();
        let username = self.config.parsed_username();
        debug!(
            url = %url,
            user = %username.user,
            domain = %username.domain,
            "Sending HTTP request (NTLM)"
        );

        let client = client_builder(&self.config)
            .pool_max_idle_per_host(1)
            .http1_only()
            .build()
            .map_err(|e| Error::transport(format!("Failed to create HTTP client: {}", e)))?;

        let authenticator = NtlmAuthenticator::new(
            &username,
            self.config.password.clone(),
            self.config.workstation.clone(),
        );

        // Probe: only tells us which schemes the listener offers
        let probe = client
            .post(&url)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body("")
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        trace!(
            status = probe.status().as_u16(),
            schemes = ?header_values(probe.headers()),
            "NTLM probe response"
        );
        self.read_body(probe).await?;

        // Type 1
        let negotiate = BASE64_STANDARD.encode(authenticator.create_negotiate_message());
        let response = client
            .post(&url)
            .header(AUTHORIZATION, format!("Negotiate {}", negotiate))
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body("")
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        debug!(status = status.as_u16(), "NTLM negotiate response");

        if status != StatusCode::UNAUTHORIZED {
            let body = self.read_body(response).await?;
            if status.is_success() {
                return SoapResponse::parse(&body);
            }
            return Err(Error::Authentication(format!(
                "NTLM negotiate failed: {} - expected 401 challenge",
                status.as_u16()
            )));
        }

        // Type 2
        let token = extract_challenge_token(response.headers());
        let offered = header_values(response.headers()).join(", ");
        self.read_body(response).await?;

        let token = token.ok_or_else(|| {
            Error::Authentication(format!(
                "No NTLM challenge token. WWW-Authenticate: {}",
                if offered.is_empty() {
                    "(not present)"
                } else {
                    offered.as_str()
                }
            ))
        })?;
        let challenge_bytes = BASE64_STANDARD
            .decode(token)
            .map_err(|e| Error::Authentication(format!("Invalid challenge encoding: {}", e)))?;
        let challenge = ChallengeMessage::decode(&challenge_bytes)?;
        debug!(target_name = %challenge.target_name, "Received NTLM challenge");

        // Type 3 with the real payload
        let authenticate =
            BASE64_STANDARD.encode(authenticator.create_authenticate_message(&challenge)?);
        let response = client
            .post(&url)
            .header(AUTHORIZATION, format!("Negotiate {}", authenticate))
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(xml.to_string())
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        let body = self.read_body(response).await?;
        debug!(status = status.as_u16(), "NTLM authenticate response");

        if !status.is_success() {
            if let Some(fault) = parse_fault(&body) {
                return Err(fault);
            }
            return Err(Error::Authentication(format!(
                "NTLM authenticate failed: {} - {}",
                status.as_u16(),
                body.trim()
            )));
        }

        SoapResponse::parse(&body)
    }

    async fn read_body(&self, response: Response) -> Result<String> {
        response.text().await.map_err(|e| self.request_error(e))
    }

    fn request_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            return timeout_error(err.is_connect(), self.config.timeout);
        }
        Error::from(err)
    }
}

fn client_builder(config: &WinRmConfig) -> reqwest::ClientBuilder {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(!config.verify_ssl)
        .connect_timeout(CONNECT_TIMEOUT);
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    builder
}

/// Name the timeout that fired. Without a request timeout only the connect
/// timeout can have elapsed.
fn timeout_error(during_connect: bool, request_timeout: Option<Duration>) -> Error {
    match request_timeout {
        Some(timeout) if !during_connect => {
            Error::timeout("HTTP request", timeout.as_millis() as u64)
        }
        _ => Error::timeout("HTTP connect", CONNECT_TIMEOUT.as_millis() as u64),
    }
}

/// Find a Negotiate/NTLM token in any `WWW-Authenticate` header value.
pub fn extract_challenge_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| CHALLENGE_TOKEN.captures(v))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn header_values(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

fn parse_fault(body: &str) -> Option<Error> {
    SoapResponse::parse(body).ok()?.fault().map(Error::from)
}

/// Non-2xx: a SOAP fault in the body wins over the bare status
fn status_error(status: StatusCode, body: &str) -> Error {
    if let Some(fault) = parse_fault(body) {
        return fault;
    }
    Error::status(
        status.as_u16(),
        format!(
            "Failed to process the request: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("(no message)")
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_timeout_error_names_the_elapsed_timeout() {
        let request = timeout_error(false, Some(Duration::from_millis(1500)));
        assert!(request.is_timeout());
        assert!(request.to_string().contains("1500"), "{}", request);

        let connect = timeout_error(true, Some(Duration::from_millis(1500)));
        assert!(connect.to_string().contains("30000"), "{}", connect);

        let unconfigured = timeout_error(false, None);
        assert!(unconfigured.to_string().contains("30000"), "{}", unconfigured);
        assert!(!unconfigured.to_string().contains(" 0ms"), "{}", unconfigured);
    }

    #[test]
    fn test_extract_challenge_token() {
        let mut headers = HeaderMap::new();
        headers.append(WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"WSMAN\""));
        headers.append(WWW_AUTHENTICATE, HeaderValue::from_static("Negotiate TlRMTVNTUAACAAAA"));
        assert_eq!(
            extract_challenge_token(&headers).as_deref(),
            Some("TlRMTVNTUAACAAAA")
        );

        let mut ntlm = HeaderMap::new();
        ntlm.insert(WWW_AUTHENTICATE, HeaderValue::from_static("ntlm abc+/="));
        assert_eq!(extract_challenge_token(&ntlm).as_deref(), Some("abc+/="));
    }

    #[test]
    fn test_extract_challenge_token_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_challenge_token(&headers), None);

        // Bare scheme without a token
        headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Negotiate"));
        assert_eq!(extract_challenge_token(&headers), None);
    }

    #[test]
    fn test_status_error_prefers_fault() {
        let plain = status_error(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(plain.status_code(), Some(500));
        assert!(plain.to_string().contains("500"));

        let body = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body><s:Fault>
<s:Code><s:Value>s:Sender</s:Value><s:Subcode><s:Value>w:InvalidSelectors</s:Value></s:Subcode></s:Code>
</s:Fault></s:Body></s:Envelope>"#;
        let fault = status_error(StatusCode::INTERNAL_SERVER_ERROR, body);
        assert_eq!(fault.fault_subcode(), Some("w:InvalidSelectors"));
    }
}
