//! Username format detection and Basic credentials.
//!
//! Usernames come in three shapes:
//!
//! - `Administrator` - a local account, authenticated with Basic
//! - `DOMAIN\user` - a down-level logon name, authenticated with NTLM
//! - `user@domain.com` - a user principal name, authenticated with NTLM

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use secrecy::{ExposeSecret, SecretString};

use super::AuthMethod;

/// Which of the three username shapes was supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsernameFormat {
    /// Plain account name
    Local,
    /// `DOMAIN\user`
    Domain,
    /// `user@domain`
    Upn,
}

/// A username split into its user and domain parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUsername {
    /// Account name
    pub user: String,
    /// Domain, empty for local accounts
    pub domain: String,
    /// Detected shape
    pub format: UsernameFormat,
}

/// Split a username into user and domain.
///
/// A backslash takes precedence over `@`, so `CORP\user@mail` is the user
/// `user@mail` in domain `CORP`.
pub fn parse_username(username: &str) -> ParsedUsername {
    if let Some((domain, user)) = username.split_once('\\') {
        return ParsedUsername {
            user: user.to_string(),
            domain: domain.to_string(),
            format: UsernameFormat::Domain,
        };
    }

    if let Some((user, domain)) = username.split_once('@') {
        return ParsedUsername {
            user: user.to_string(),
            domain: domain.to_string(),
            format: UsernameFormat::Upn,
        };
    }

    ParsedUsername {
        user: username.to_string(),
        domain: String::new(),
        format: UsernameFormat::Local,
    }
}

/// Pick the authentication method implied by the username format.
pub fn detect_auth_method(username: &str) -> AuthMethod {
    match parse_username(username).format {
        UsernameFormat::Local => AuthMethod::Basic,
        UsernameFormat::Domain | UsernameFormat::Upn => AuthMethod::Ntlm,
    }
}

/// Build the value of an `Authorization: Basic` header.
pub fn basic_auth_header(username: &str, password: &SecretString) -> String {
    let credentials = format!("{}:{}", username, password.expose_secret());
    format!("Basic {}", BASE64_STANDARD.encode(credentials.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local() {
        let parsed = parse_username("Administrator");
        assert_eq!(parsed.user, "Administrator");
        assert_eq!(parsed.domain, "");
        assert_eq!(parsed.format, UsernameFormat::Local);
    }

    #[test]
    fn test_parse_domain() {
        let parsed = parse_username("DOMAIN\\user");
        assert_eq!(parsed.user, "user");
        assert_eq!(parsed.domain, "DOMAIN");
        assert_eq!(parsed.format, UsernameFormat::Domain);
    }

    #[test]
    fn test_parse_upn() {
        let parsed = parse_username("user@domain.local");
        assert_eq!(parsed.user, "user");
        assert_eq!(parsed.domain, "domain.local");
        assert_eq!(parsed.format, UsernameFormat::Upn);
    }

    #[test]
    fn test_detect_auth_method() {
        assert_eq!(detect_auth_method("Administrator"), AuthMethod::Basic);
        assert_eq!(detect_auth_method("CORP\\svc"), AuthMethod::Ntlm);
        assert_eq!(detect_auth_method("svc@corp.example"), AuthMethod::Ntlm);
    }

    #[test]
    fn test_basic_auth_header() {
        let header = basic_auth_header("user", &SecretString::from("pass".to_string()));
        assert_eq!(header, "Basic dXNlcjpwYXNz");
    }
}
