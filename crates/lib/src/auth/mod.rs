//! Challenge-response authentication: digest verification, per-address
//! nonces, endpoint permissions, and the on-disk credential table.

pub mod digest;
pub mod endpoint;
pub mod nonce;
pub mod table;

use serde::{Deserialize, Serialize};

pub use digest::{
    authenticate, challenge, compute_response, generate_token, parse_digest_header,
    sha256_hex, DigestCredentials, ALGORITHM, NONCE_SIZE, OPAQUE_SIZE, REALM,
};
pub use endpoint::{resolve_endpoint, EndpointAccess};
pub use nonce::NonceStore;
pub use table::{load_auth_table, save_auth_table, AuthEntry, AuthTable};

/// Ordered capability tier attached to a credential and to a protected
/// endpoint. Stored as digits 0/1/2 in the auth file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PermissionLevel {
    Blocked,
    View,
    Control,
}

impl PermissionLevel {
    pub fn from_digit(digit: u32) -> Option<Self> {
        match digit {
            0 => Some(PermissionLevel::Blocked),
            1 => Some(PermissionLevel::View),
            2 => Some(PermissionLevel::Control),
            _ => None,
        }
    }

    pub fn as_digit(&self) -> u32 {
        match self {
            PermissionLevel::Blocked => 0,
            PermissionLevel::View => 1,
            PermissionLevel::Control => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Blocked => "Blocked",
            PermissionLevel::View => "View",
            PermissionLevel::Control => "Control",
        }
    }
}
