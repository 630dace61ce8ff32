//! Digest-style challenge/response verification (SHA-256, qop=auth).
//!
//! The response is computed as `H(H(A1):nonce:nc:cnonce:qop:H(A2))` with
//! `A1 = username:realm:password` and `A2 = method:uri`, all hashes
//! lowercase hex. The nonce fed into the computation is always the one the
//! server has on record for the client's address, so a superseded nonce can
//! never verify.

use crate::auth::table::AuthTable;
use crate::auth::PermissionLevel;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Fixed protection-domain name carried in every challenge.
pub const REALM: &str = "viewcontrol";
/// Fixed algorithm tag carried in every challenge.
pub const ALGORITHM: &str = "SHA-256";
pub const NONCE_SIZE: usize = 32;
pub const OPAQUE_SIZE: usize = 32;

/// Lowercase hex SHA-256 of the input.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Random URL-safe base64 token of `size` raw bytes. Used for nonces and
/// the process-wide opaque.
pub fn generate_token(size: usize) -> String {
    let mut bytes = vec![0u8; size];
    if let Err(e) = getrandom::getrandom(&mut bytes) {
        // a failing system RNG leaves nothing sensible to fall back on
        log::error!("getrandom failed while generating auth token: {}", e);
    }
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Parsed `Authorization: Digest ...` header fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestCredentials {
    pub username: String,
    pub response: String,
    pub nonce: String,
    pub realm: String,
    pub uri: String,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
    pub opaque: Option<String>,
    pub qop: Option<String>,
}

impl DigestCredentials {
    fn set_field(&mut self, key: &str, value: &str) {
        match key {
            "username" => self.username = value.to_string(),
            "response" => self.response = value.to_string(),
            "nonce" => self.nonce = value.to_string(),
            "realm" => self.realm = value.to_string(),
            "uri" => self.uri = value.to_string(),
            "nc" => self.nc = Some(value.to_string()),
            "cnonce" => self.cnonce = Some(value.to_string()),
            "opaque" => self.opaque = Some(value.to_string()),
            "qop" => self.qop = Some(value.to_string()),
            _ => {}
        }
    }

    /// Field-presence rules: the five core fields are required; `qop`
    /// requires both `nc` and `cnonce`, and forbids them when absent.
    fn is_valid(&self) -> bool {
        if self.username.is_empty()
            || self.response.is_empty()
            || self.nonce.is_empty()
            || self.realm.is_empty()
            || self.uri.is_empty()
        {
            return false;
        }
        if self.qop.is_some() {
            self.nc.is_some() && self.cnonce.is_some()
        } else {
            self.nc.is_none() && self.cnonce.is_none()
        }
    }
}

/// Parse an `Authorization` header value as Digest credentials. Returns
/// None when the scheme is wrong or the field set violates the presence
/// rules.
pub fn parse_digest_header(value: &str) -> Option<DigestCredentials> {
    let rest = value.strip_prefix("Digest")?;
    let mut creds = DigestCredentials::default();
    for (key, value) in KeyValueScanner::new(rest) {
        creds.set_field(key, value);
    }
    if creds.is_valid() {
        Some(creds)
    } else {
        None
    }
}

/// Scanner over `key=value` / `key="value"` pairs separated by commas.
/// Quoted values may contain commas; quotes are stripped.
struct KeyValueScanner<'a> {
    rest: &'a str,
}

impl<'a> KeyValueScanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { rest: input }
    }
}

impl<'a> Iterator for KeyValueScanner<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest.trim_start_matches([' ', '\t', ',']);
        if rest.is_empty() {
            return None;
        }
        let eq = rest.find('=')?;
        let key = rest[..eq].trim();
        let after = &rest[eq + 1..];
        if let Some(quoted) = after.strip_prefix('"') {
            let close = quoted.find('"')?;
            self.rest = &quoted[close + 1..];
            Some((key, &quoted[..close]))
        } else {
            let end = after.find(',').unwrap_or(after.len());
            self.rest = &after[end..];
            Some((key, after[..end].trim()))
        }
    }
}

/// Compute the expected digest response for the given inputs.
#[allow(clippy::too_many_arguments)]
pub fn compute_response(
    username: &str,
    realm: &str,
    password: &str,
    method: &str,
    uri: &str,
    nonce: &str,
    nc: &str,
    cnonce: &str,
    qop: &str,
) -> String {
    let a1_hash = sha256_hex(&format!("{}:{}:{}", username, realm, password));
    let a2_hash = sha256_hex(&format!("{}:{}", method, uri));
    sha256_hex(&format!(
        "{}:{}:{}:{}:{}:{}",
        a1_hash, nonce, nc, cnonce, qop, a2_hash
    ))
}

/// Verify already-parsed credentials against a stored password. `nonce` and
/// `opaque` are the server-side values on record.
pub fn verify_credentials(
    creds: &DigestCredentials,
    password: &str,
    method: &str,
    nonce: &str,
    opaque: &str,
) -> bool {
    let (Some(qop), Some(submitted_opaque)) = (creds.qop.as_deref(), creds.opaque.as_deref())
    else {
        return false;
    };
    if submitted_opaque != opaque {
        return false;
    }
    // is_valid guarantees nc and cnonce exist alongside qop
    let (Some(nc), Some(cnonce)) = (creds.nc.as_deref(), creds.cnonce.as_deref()) else {
        return false;
    };
    let expected = compute_response(
        &creds.username,
        &creds.realm,
        password,
        method,
        &creds.uri,
        nonce,
        nc,
        cnonce,
        qop,
    );
    creds.response == expected
}

/// Full per-request verification: parse the header, look up the user, check
/// qop/opaque, and compare the computed response. Returns the stored
/// permission level on success, None in every other case.
pub fn authenticate(
    authorization: Option<&str>,
    method: &str,
    table: &AuthTable,
    nonce: &str,
    opaque: &str,
) -> Option<PermissionLevel> {
    let creds = parse_digest_header(authorization?)?;
    let entry = table.get(&creds.username)?;
    if verify_credentials(&creds, &entry.password, method, nonce, opaque) {
        Some(entry.permissions)
    } else {
        None
    }
}

/// Build a `WWW-Authenticate` challenge value. `stale` marks a nonce that
/// was well-formed but has since been superseded.
pub fn challenge(nonce: &str, opaque: &str, stale: bool) -> String {
    let mut value = format!(
        "Digest realm=\"{}\", nonce=\"{}\", algorithm={}, qop=\"auth\", opaque=\"{}\"",
        REALM, nonce, ALGORITHM, opaque
    );
    if stale {
        value.push_str(", stale=TRUE");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::table::AuthEntry;
    use std::collections::HashMap;

    fn header_for(creds: &[(&str, &str)]) -> String {
        let pairs: Vec<String> = creds
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect();
        format!("Digest {}", pairs.join(", "))
    }

    fn sample_table() -> AuthTable {
        let mut table = HashMap::new();
        table.insert(
            "operator".to_string(),
            AuthEntry {
                permissions: PermissionLevel::Control,
                map_groups: vec![],
                password: "hunter2".to_string(),
            },
        );
        table
    }

    fn valid_header(nonce: &str, opaque: &str) -> String {
        let response = compute_response(
            "operator", REALM, "hunter2", "GET", "/ws", nonce, "00000001", "abc", "auth",
        );
        header_for(&[
            ("username", "operator"),
            ("realm", REALM),
            ("uri", "/ws"),
            ("nonce", nonce),
            ("nc", "00000001"),
            ("cnonce", "abc"),
            ("qop", "auth"),
            ("opaque", opaque),
            ("response", &response),
        ])
    }

    #[test]
    fn parses_quoted_and_bare_values() {
        let creds = parse_digest_header(
            "Digest username=\"bob\", realm=\"a, b\", nonce=n1, uri=\"/x\", response=r1",
        )
        .unwrap();
        assert_eq!(creds.username, "bob");
        assert_eq!(creds.realm, "a, b");
        assert_eq!(creds.nonce, "n1");
        assert_eq!(creds.uri, "/x");
        assert_eq!(creds.response, "r1");
        assert!(creds.qop.is_none());
    }

    #[test]
    fn rejects_non_digest_scheme() {
        assert!(parse_digest_header("Basic Zm9vOmJhcg==").is_none());
    }

    #[test]
    fn rejects_missing_required_field() {
        // no response
        assert!(parse_digest_header(
            "Digest username=\"b\", realm=\"r\", nonce=\"n\", uri=\"/\""
        )
        .is_none());
    }

    #[test]
    fn qop_requires_nc_and_cnonce() {
        let base = "Digest username=\"b\", realm=\"r\", nonce=\"n\", uri=\"/\", response=\"x\"";
        assert!(parse_digest_header(base).is_some());
        assert!(parse_digest_header(&format!("{}, qop=auth", base)).is_none());
        assert!(parse_digest_header(&format!("{}, qop=auth, nc=00000001", base)).is_none());
        assert!(
            parse_digest_header(&format!("{}, qop=auth, nc=00000001, cnonce=\"c\"", base))
                .is_some()
        );
        // nc/cnonce without qop is also malformed
        assert!(parse_digest_header(&format!("{}, nc=00000001, cnonce=\"c\"", base)).is_none());
    }

    #[test]
    fn authenticate_accepts_a_correct_response() {
        let table = sample_table();
        let header = valid_header("nonce-1", "opaque-1");
        assert_eq!(
            authenticate(Some(&header), "GET", &table, "nonce-1", "opaque-1"),
            Some(PermissionLevel::Control)
        );
    }

    #[test]
    fn authenticate_rejects_missing_header_and_unknown_user() {
        let table = sample_table();
        assert_eq!(authenticate(None, "GET", &table, "n", "o"), None);
        let header = header_for(&[
            ("username", "ghost"),
            ("realm", REALM),
            ("uri", "/ws"),
            ("nonce", "n"),
            ("nc", "00000001"),
            ("cnonce", "c"),
            ("qop", "auth"),
            ("opaque", "o"),
            ("response", "whatever"),
        ]);
        assert_eq!(authenticate(Some(&header), "GET", &table, "n", "o"), None);
    }

    #[test]
    fn flipping_any_input_field_breaks_verification() {
        let table = sample_table();
        let nonce = "nonce-1";
        let opaque = "opaque-1";
        let header = valid_header(nonce, opaque);
        assert!(authenticate(Some(&header), "GET", &table, nonce, opaque).is_some());

        // server-side nonce rotated out from under the response
        assert_eq!(
            authenticate(Some(&header), "GET", &table, "nonce-2", opaque),
            None
        );
        // different method
        assert_eq!(
            authenticate(Some(&header), "HEAD", &table, nonce, opaque),
            None
        );
        // wrong opaque on record
        assert_eq!(
            authenticate(Some(&header), "GET", &table, nonce, "opaque-2"),
            None
        );
        // wrong password on record
        let mut table2 = sample_table();
        table2.get_mut("operator").unwrap().password = "hunter3".to_string();
        assert_eq!(
            authenticate(Some(&header), "GET", &table2, nonce, opaque),
            None
        );

        // flip each submitted field in turn
        for (field, value) in [
            ("username", "operator2"),
            ("realm", "otherrealm"),
            ("uri", "/other"),
            ("nc", "00000002"),
            ("cnonce", "abd"),
            ("qop", "auth-int"),
            ("response", "0000"),
        ] {
            let response = compute_response(
                "operator", REALM, "hunter2", "GET", "/ws", nonce, "00000001", "abc", "auth",
            );
            let mut fields = vec![
                ("username", "operator"),
                ("realm", REALM),
                ("uri", "/ws"),
                ("nonce", nonce),
                ("nc", "00000001"),
                ("cnonce", "abc"),
                ("qop", "auth"),
                ("opaque", "opaque-1"),
                ("response", response.as_str()),
            ];
            for f in fields.iter_mut() {
                if f.0 == field {
                    f.1 = value;
                }
            }
            let header = header_for(&fields);
            assert_eq!(
                authenticate(Some(&header), "GET", &table, nonce, opaque),
                None,
                "flipped field {} should fail",
                field
            );
        }
    }

    #[test]
    fn challenge_format_matches_the_wire_contract() {
        let value = challenge("n1", "o1", false);
        assert_eq!(
            value,
            "Digest realm=\"viewcontrol\", nonce=\"n1\", algorithm=SHA-256, qop=\"auth\", opaque=\"o1\""
        );
        assert_eq!(
            challenge("n1", "o1", true),
            format!("{}, stale=TRUE", value)
        );
    }

    #[test]
    fn generated_tokens_are_distinct() {
        let a = generate_token(NONCE_SIZE);
        let b = generate_token(NONCE_SIZE);
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }
}
