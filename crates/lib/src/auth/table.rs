//! On-disk credential table.
//!
//! Line format: `login:permissions:map_groups:password` where permissions
//! is a digit 0-2 and map_groups is a `;`-separated list of group ids
//! (possibly empty). Malformed lines are skipped, not fatal, so one bad
//! entry cannot lock every user out.

use crate::auth::PermissionLevel;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// One credential record: permission tier, group memberships, secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEntry {
    pub permissions: PermissionLevel,
    pub map_groups: Vec<String>,
    pub password: String,
}

/// Login to credential record.
pub type AuthTable = HashMap<String, AuthEntry>;

fn parse_line(line: &str) -> Option<(String, AuthEntry)> {
    let (login, rest) = line.split_once(':')?;
    let (permissions_str, rest) = rest.split_once(':')?;
    let (groups_str, password) = rest.split_once(':')?;
    if password.is_empty() {
        return None;
    }
    let permissions = PermissionLevel::from_digit(permissions_str.parse().ok()?)?;
    let map_groups = if groups_str.is_empty() {
        Vec::new()
    } else {
        groups_str.split(';').map(str::to_string).collect()
    };
    Some((
        login.to_string(),
        AuthEntry {
            permissions,
            map_groups,
            password: password.to_string(),
        },
    ))
}

/// Load the table, skipping malformed lines.
pub fn load_auth_table(path: &Path) -> Result<AuthTable> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading auth table from {}", path.display()))?;
    let mut table = AuthTable::new();
    for line in contents.lines() {
        match parse_line(line) {
            Some((login, entry)) => {
                table.insert(login, entry);
            }
            None => {
                if !line.trim().is_empty() {
                    log::warn!("skipping malformed auth table line");
                }
            }
        }
    }
    Ok(table)
}

/// Write the table back in the same line format.
pub fn save_auth_table(path: &Path, table: &AuthTable) -> Result<()> {
    let mut lines: Vec<String> = table
        .iter()
        .map(|(login, entry)| {
            format!(
                "{}:{}:{}:{}",
                login,
                entry.permissions.as_digit(),
                entry.map_groups.join(";"),
                entry.password
            )
        })
        .collect();
    lines.sort();
    std::fs::write(path, lines.join("\n"))
        .with_context(|| format!("writing auth table to {}", path.display()))?;
    Ok(())
}
