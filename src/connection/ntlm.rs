//! NTLM authentication messages (MS-NLMP).
//!
//! Only the NTLMv2 variant of the handshake is implemented: a server whose
//! challenge does not carry target information is asking for NTLMv1 and is
//! rejected with [`Error::Unsupported`] rather than silently downgraded.
//!
//! The cryptographic helpers ([`nt_hash`], [`ntlmv2_key`], [`lmv2_response`],
//! [`ntlmv2_response`]) are pure functions; randomness and the clock only
//! enter through [`NtlmAuthenticator::create_authenticate_message`].

use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
use secrecy::{ExposeSecret, SecretString};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;

use super::auth::ParsedUsername;
use crate::error::{Error, Result};

type HmacMd5 = Hmac<Md5>;

// ============================================================================
// Constants
// ============================================================================

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

/// Negotiate flags used by this client
pub mod flags {
    pub const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
    pub const NEGOTIATE_OEM: u32 = 0x0000_0002;
    pub const REQUEST_TARGET: u32 = 0x0000_0004;
    pub const NEGOTIATE_NTLM: u32 = 0x0000_0200;
    pub const NEGOTIATE_DOMAIN_SUPPLIED: u32 = 0x0000_1000;
    pub const NEGOTIATE_WORKSTATION_SUPPLIED: u32 = 0x0000_2000;
    pub const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
    pub const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;
    pub const NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
}

/// Seconds between 1601-01-01 and 1970-01-01
const FILETIME_EPOCH_DIFF_SECS: u64 = 11_644_473_600;

/// Size of the fixed part of an NTLMv2 Type 3 message
const TYPE3_HEADER_LEN: usize = 64;

/// First byte of the NTLMv2 blob: signature 0x01010000 written big-endian
const BLOB_SIGNATURE: [u8; 4] = [0x01, 0x01, 0x00, 0x00];

// ============================================================================
// Crypto primitives
// ============================================================================

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
}

fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> [u8; 16] {
    let mut mac = HmacMd5::new_from_slice(key).expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// NT hash: MD4 over the UTF-16LE password.
pub fn nt_hash(password: &str) -> [u8; 16] {
    let mut hasher = Md4::new();
    hasher.update(utf16le(password));
    hasher.finalize().into()
}

/// NTLMv2 key: HMAC-MD5 keyed with the NT hash over
/// `uppercase(user) || uppercase(domain)` in UTF-16LE.
pub fn ntlmv2_key(nt_hash: &[u8; 16], user: &str, domain: &str) -> [u8; 16] {
    let identity = format!("{}{}", user.to_uppercase(), domain.to_uppercase());
    hmac_md5(nt_hash, &[&utf16le(&identity)])
}

/// LMv2 response: `HMAC-MD5(key, server_challenge || nonce) || nonce`.
pub fn lmv2_response(key: &[u8; 16], server_challenge: &[u8; 8], nonce: &[u8; 8]) -> [u8; 24] {
    let digest = hmac_md5(key, &[server_challenge, nonce]);
    let mut response = [0u8; 24];
    response[..16].copy_from_slice(&digest);
    response[16..].copy_from_slice(nonce);
    response
}

/// NTLMv2 response: `HMAC-MD5(key, server_challenge || blob) || blob`.
///
/// The blob is the signature, four reserved zero bytes, the FILETIME
/// `timestamp`, the client nonce, four zero bytes, the server's target info
/// and a trailing four zero bytes.
pub fn ntlmv2_response(
    key: &[u8; 16],
    server_challenge: &[u8; 8],
    nonce: &[u8; 8],
    timestamp: u64,
    target_info: &[u8],
) -> Vec<u8> {
    let mut blob = Vec::with_capacity(32 + target_info.len());
    blob.extend_from_slice(&BLOB_SIGNATURE);
    blob.extend_from_slice(&0u32.to_le_bytes());
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(nonce);
    blob.extend_from_slice(&0u32.to_le_bytes());
    blob.extend_from_slice(target_info);
    blob.extend_from_slice(&0u32.to_le_bytes());

    let proof = hmac_md5(key, &[server_challenge, &blob]);

    let mut response = proof.to_vec();
    response.extend_from_slice(&blob);
    response
}

/// Current time as a Windows FILETIME (100ns ticks since 1601-01-01).
pub fn windows_timestamp() -> u64 {
    let since_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let ticks = since_unix.as_nanos() / 100;
    (u128::from(FILETIME_EPOCH_DIFF_SECS) * 10_000_000 + ticks) as u64
}

// ============================================================================
// Type 2 (Challenge) Message
// ============================================================================

/// Character encoding negotiated for string fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtlmEncoding {
    /// OEM / ASCII
    Ascii,
    /// UTF-16LE
    Unicode,
}

impl NtlmEncoding {
    fn encode(&self, s: &str) -> Vec<u8> {
        match self {
            NtlmEncoding::Unicode => utf16le(s),
            NtlmEncoding::Ascii => s
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
        }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        match self {
            NtlmEncoding::Unicode => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
            NtlmEncoding::Ascii => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Which NTLM response variant the server expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtlmVersion {
    V1,
    V2,
}

/// A decoded Type 2 message
#[derive(Debug, Clone)]
pub struct ChallengeMessage {
    /// Negotiated flags, echoed back in the Type 3 message
    pub flags: u32,
    /// The 8-byte server challenge
    pub challenge: [u8; 8],
    /// Server's target (domain) name
    pub target_name: String,
    /// Raw AV-pair target information, present for NTLMv2
    pub target_info: Option<Vec<u8>>,
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes
        .get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Resolve a security buffer descriptor at `at` into its payload slice.
fn read_security_buffer(bytes: &[u8], at: usize) -> Result<&[u8]> {
    let len = read_u16(bytes, at).ok_or_else(truncated)? as usize;
    let offset = read_u32(bytes, at + 4).ok_or_else(truncated)? as usize;
    bytes
        .get(offset..offset + len)
        .ok_or_else(|| Error::Authentication("NTLM security buffer out of range".to_string()))
}

fn truncated() -> Error {
    Error::Authentication("Truncated NTLM challenge message".to_string())
}

impl ChallengeMessage {
    /// Decode the raw bytes of a Type 2 message.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 32 || &bytes[..8] != SIGNATURE {
            return Err(Error::Authentication(
                "Invalid NTLM challenge message".to_string(),
            ));
        }
        let message_type = read_u32(bytes, 8).ok_or_else(truncated)?;
        if message_type != 2 {
            return Err(Error::Authentication(format!(
                "Expected NTLM message type 2, got {}",
                message_type
            )));
        }

        let flags = read_u32(bytes, 20).ok_or_else(truncated)?;
        let mut challenge = [0u8; 8];
        challenge.copy_from_slice(&bytes[24..32]);

        let encoding = if flags & flags::NEGOTIATE_UNICODE != 0 {
            NtlmEncoding::Unicode
        } else {
            NtlmEncoding::Ascii
        };
        let target_name = encoding.decode(read_security_buffer(bytes, 12)?);

        let target_info = if flags & flags::NEGOTIATE_TARGET_INFO != 0 {
            Some(read_security_buffer(bytes, 40)?.to_vec())
        } else {
            None
        };

        Ok(Self {
            flags,
            challenge,
            target_name,
            target_info,
        })
    }

    /// Encoding for string fields of the Type 3 reply
    pub fn encoding(&self) -> NtlmEncoding {
        if self.flags & flags::NEGOTIATE_UNICODE != 0 {
            NtlmEncoding::Unicode
        } else {
            NtlmEncoding::Ascii
        }
    }

    /// NTLMv2 is required whenever the server sends target information
    pub fn version(&self) -> NtlmVersion {
        if self.flags & flags::NEGOTIATE_TARGET_INFO != 0 {
            NtlmVersion::V2
        } else {
            NtlmVersion::V1
        }
    }
}

// ============================================================================
// NTLM Authenticator
// ============================================================================

/// Builds the client side of one NTLM handshake
#[derive(Clone)]
pub struct NtlmAuthenticator {
    user: String,
    domain: String,
    password: SecretString,
    workstation: String,
}

impl std::fmt::Debug for NtlmAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtlmAuthenticator")
            .field("user", &self.user)
            .field("domain", &self.domain)
            .field("workstation", &self.workstation)
            .finish_non_exhaustive()
    }
}

impl NtlmAuthenticator {
    /// Create an authenticator for an already parsed username
    pub fn new(
        username: &ParsedUsername,
        password: SecretString,
        workstation: impl Into<String>,
    ) -> Self {
        Self {
            user: username.user.clone(),
            domain: username.domain.clone(),
            password,
            workstation: workstation.into(),
        }
    }

    /// Generate NTLM Type 1 (Negotiate) message
    pub fn create_negotiate_message(&self) -> Vec<u8> {
        let domain = NtlmEncoding::Ascii.encode(&self.domain.to_uppercase());
        let workstation = NtlmEncoding::Ascii.encode(&self.workstation.to_uppercase());

        let mut negotiate_flags = flags::NEGOTIATE_UNICODE
            | flags::NEGOTIATE_OEM
            | flags::REQUEST_TARGET
            | flags::NEGOTIATE_NTLM
            | flags::NEGOTIATE_ALWAYS_SIGN
            | flags::NEGOTIATE_EXTENDED_SESSIONSECURITY;
        if !domain.is_empty() {
            negotiate_flags |= flags::NEGOTIATE_DOMAIN_SUPPLIED;
        }
        if !workstation.is_empty() {
            negotiate_flags |= flags::NEGOTIATE_WORKSTATION_SUPPLIED;
        }

        let domain_offset: u32 = 32;
        let workstation_offset = domain_offset + domain.len() as u32;

        let mut message = SIGNATURE.to_vec();
        message.extend_from_slice(&1u32.to_le_bytes());
        message.extend_from_slice(&negotiate_flags.to_le_bytes());
        push_security_buffer(&mut message, domain.len(), domain_offset);
        push_security_buffer(&mut message, workstation.len(), workstation_offset);
        message.extend_from_slice(&domain);
        message.extend_from_slice(&workstation);
        message
    }

    /// Generate NTLM Type 3 (Authenticate) message with a fresh nonce and the
    /// current time.
    pub fn create_authenticate_message(&self, challenge: &ChallengeMessage) -> Result<Vec<u8>> {
        let nonce: [u8; 8] = rand::random();
        self.authenticate_with(challenge, &nonce, windows_timestamp())
    }

    /// Generate NTLM Type 3 (Authenticate) message from explicit inputs.
    pub fn authenticate_with(
        &self,
        challenge: &ChallengeMessage,
        nonce: &[u8; 8],
        timestamp: u64,
    ) -> Result<Vec<u8>> {
        let target_info = match (challenge.version(), challenge.target_info.as_deref()) {
            (NtlmVersion::V2, Some(info)) => info,
            _ => {
                return Err(Error::Unsupported(
                    "NTLMv1 not supported - server requires NTLMv2".to_string(),
                ))
            }
        };

        let target = if self.domain.is_empty() {
            challenge.target_name.as_str()
        } else {
            self.domain.as_str()
        };

        let hash = nt_hash(self.password.expose_secret());
        let key = ntlmv2_key(&hash, &self.user, target);
        let lm = lmv2_response(&key, &challenge.challenge, nonce);
        let nt = ntlmv2_response(&key, &challenge.challenge, nonce, timestamp, target_info);

        trace!(
            target_name = %target,
            nt_len = nt.len(),
            "Computed NTLMv2 responses"
        );

        let encoding = challenge.encoding();
        let target_bytes = encoding.encode(target);
        let user_bytes = encoding.encode(&self.user);
        let workstation_bytes = encoding.encode(&self.workstation);

        let mut offset = TYPE3_HEADER_LEN as u32;
        let mut message = Vec::with_capacity(
            TYPE3_HEADER_LEN
                + lm.len()
                + nt.len()
                + target_bytes.len()
                + user_bytes.len()
                + workstation_bytes.len(),
        );
        message.extend_from_slice(SIGNATURE);
        message.extend_from_slice(&3u32.to_le_bytes());

        for payload_len in [
            lm.len(),
            nt.len(),
            target_bytes.len(),
            user_bytes.len(),
            workstation_bytes.len(),
        ] {
            push_security_buffer(&mut message, payload_len, offset);
            offset += payload_len as u32;
        }

        // Empty session key, then the server's flags echoed back
        push_security_buffer(&mut message, 0, 0);
        message.extend_from_slice(&challenge.flags.to_le_bytes());

        message.extend_from_slice(&lm);
        message.extend_from_slice(&nt);
        message.extend_from_slice(&target_bytes);
        message.extend_from_slice(&user_bytes);
        message.extend_from_slice(&workstation_bytes);

        Ok(message)
    }
}

fn push_security_buffer(message: &mut Vec<u8>, len: usize, offset: u32) {
    let len = len as u16;
    message.extend_from_slice(&len.to_le_bytes());
    message.extend_from_slice(&len.to_le_bytes());
    message.extend_from_slice(&offset.to_le_bytes());
}
