//! Property-based tests for winrm-shell using proptest.

use proptest::prelude::*;
use std::collections::HashSet;
use std::time::Duration;

use winrm_shell::connection::{detect_auth_method, parse_username, AuthMethod, UsernameFormat};
use winrm_shell::interactive::Backoff;
use winrm_shell::soap::{build_command_request, xml_escape, SoapResponse};

// ============================================================================
// Strategies for generating test data
// ============================================================================

/// Usernames drawn from an alphabet that includes both separators
fn username() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9._\\\\@-]{1,40}").unwrap()
}

/// Command lines including XML metacharacters
fn command_line() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 <>&\"'/\\\\|.-]{0,80}").unwrap()
}

proptest! {
    #[test]
    fn basic_auth_iff_no_separator(name in username()) {
        let expected = if name.contains('\\') || name.contains('@') {
            AuthMethod::Ntlm
        } else {
            AuthMethod::Basic
        };
        prop_assert_eq!(detect_auth_method(&name), expected);
    }

    #[test]
    fn parsed_username_keeps_every_character(name in username()) {
        let parsed = parse_username(&name);
        let rebuilt = match parsed.format {
            UsernameFormat::Local => parsed.user.clone(),
            UsernameFormat::Domain => format!("{}\\{}", parsed.domain, parsed.user),
            UsernameFormat::Upn => format!("{}@{}", parsed.user, parsed.domain),
        };
        prop_assert_eq!(rebuilt, name);
    }

    #[test]
    fn command_envelope_is_well_formed(cmd in command_line()) {
        let xml = build_command_request("http://win01:5985/wsman", "SHELL-1", &cmd);
        prop_assert!(roxmltree::Document::parse(&xml).is_ok());
        prop_assert!(xml.contains(&xml_escape(&cmd)));
    }

    #[test]
    fn backoff_stays_within_bounds(pattern in prop::collection::vec(any::<bool>(), 1..40)) {
        let base = Duration::from_millis(500);
        let max = Duration::from_millis(2000);
        let mut backoff = Backoff::new(base).with_max(max);
        for had_output in pattern {
            let delay = backoff.next_delay(had_output);
            prop_assert!(delay >= base);
            prop_assert!(delay <= max);
        }
    }

    #[test]
    fn parse_never_panics(input in "\\PC{0,200}") {
        let _ = SoapResponse::parse(&input);
    }
}

#[test]
fn envelope_message_ids_are_unique() {
    let ids: HashSet<String> = (0..50)
        .map(|_| build_command_request("http://h:5985/wsman", "S", "dir"))
        .map(|xml| {
            let start = xml.find("uuid:").unwrap();
            xml[start..start + 41].to_string()
        })
        .collect();
    assert_eq!(ids.len(), 50);
}
