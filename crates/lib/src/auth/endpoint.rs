//! Endpoint permission resolution.
//!
//! A path resolves to the permission of its most specific registered
//! ancestor prefix. Resolution strips trailing `/`-delimited segments one at
//! a time; a path whose immediate parent segment matches no registered
//! prefix resolves to nothing and is rejected rather than inheriting the
//! root's permission.

use crate::auth::PermissionLevel;

/// What a registered endpoint demands of its callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointAccess {
    /// No credentials needed.
    Unrestricted,
    /// Caller must hold at least this level.
    Required(PermissionLevel),
}

/// Ordered prefix table; first match wins.
pub const ENDPOINT_MAP: &[(&str, EndpointAccess)] = &[
    ("/control", EndpointAccess::Required(PermissionLevel::Control)),
    ("/view", EndpointAccess::Required(PermissionLevel::View)),
    ("/", EndpointAccess::Unrestricted),
];

/// Resolve a request path against the endpoint table. None means no
/// registered ancestor applies and the path must be rejected.
pub fn resolve_endpoint(path: &str) -> Option<EndpointAccess> {
    let mut path = path;
    loop {
        let mut strip = false;
        for (prefix, access) in ENDPOINT_MAP {
            if !path.starts_with(prefix) {
                continue;
            }
            if path.len() > prefix.len() {
                if path[prefix.len()..].contains('/') {
                    strip = true;
                    break;
                }
                // prefix matched but an unregistered leaf segment remains
                return None;
            }
            return Some(*access);
        }
        if !strip {
            return None;
        }
        match path.rfind('/') {
            Some(idx) if idx > 0 => path = &path[..idx],
            // stripped down to the root segment
            _ => path = "/",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_prefix_matches() {
        assert_eq!(
            resolve_endpoint("/control"),
            Some(EndpointAccess::Required(PermissionLevel::Control))
        );
        assert_eq!(
            resolve_endpoint("/view"),
            Some(EndpointAccess::Required(PermissionLevel::View))
        );
        assert_eq!(resolve_endpoint("/"), Some(EndpointAccess::Unrestricted));
    }

    #[test]
    fn nested_paths_inherit_the_registered_ancestor() {
        assert_eq!(
            resolve_endpoint("/control/foo"),
            Some(EndpointAccess::Required(PermissionLevel::Control))
        );
        assert_eq!(
            resolve_endpoint("/control/foo/bar"),
            Some(EndpointAccess::Required(PermissionLevel::Control))
        );
        assert_eq!(
            resolve_endpoint("/view/map.png"),
            Some(EndpointAccess::Required(PermissionLevel::View))
        );
    }

    #[test]
    fn trailing_slash_matches_the_prefix_itself() {
        assert_eq!(
            resolve_endpoint("/control/"),
            Some(EndpointAccess::Required(PermissionLevel::Control))
        );
    }

    #[test]
    fn unregistered_leaves_are_rejected_not_inherited() {
        assert_eq!(resolve_endpoint("/other"), None);
        assert_eq!(resolve_endpoint("/other/deeper"), None);
        assert_eq!(resolve_endpoint("/controlpanel"), None);
    }
}
