//! Cookie and node-name derivation helpers.
//!
//! Locating and reading the actual `~/.erlang.cookie` file is treated as
//! an external collaborator: this module only derives the pieces that
//! don't require filesystem access, plus a thin convenience wrapper
//! around `std::fs`. Correctness of *using* whatever cookie a caller
//! supplies lives entirely in [`crate::handshake`].

use std::path::PathBuf;

use crate::node::NodeName;

/// Returns the path `erl` itself expects the cookie file to live at:
/// `$HOME/.erlang.cookie`, falling back to `$XDG_CONFIG_HOME/erlang/.erlang.cookie`
/// when `$HOME` is unset.
pub fn cookie_path() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".erlang.cookie");
    }
    let config_home = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    config_home.join("erlang").join(".erlang.cookie")
}

/// Reads and trims the cookie at `path`. A thin `std::fs` wrapper, not a
/// validated or cached "cookie service".
pub fn read_cookie_file(path: &std::path::Path) -> std::io::Result<String> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents.trim_end_matches('\n').to_owned())
}

/// Appends the local hostname to `short_name` when it has no `@`,
/// matching the way `erl -sname` derives a full node name.
pub fn derive_node_name(short_name: &str) -> Result<NodeName, crate::node::NodeNameError> {
    if short_name.contains('@') {
        return short_name.parse();
    }
    let host = local_hostname();
    NodeName::new(short_name, &host)
}

fn local_hostname() -> String {
    // std has no portable hostname lookup; HOSTNAME is set by most shells
    // and init systems, and is good enough for the short-name case `erl
    // -sname` covers.
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_node_name_appends_host_when_missing() {
        std::env::set_var("HOSTNAME", "myhost");
        let name = derive_node_name("foo").unwrap();
        assert_eq!(name.name(), "foo");
        assert_eq!(name.host(), "myhost");
    }

    #[test]
    fn derive_node_name_passes_through_when_present() {
        let name = derive_node_name("foo@bar.example.com").unwrap();
        assert_eq!(name.name(), "foo");
        assert_eq!(name.host(), "bar.example.com");
    }

    #[test]
    fn cookie_path_uses_home() {
        std::env::set_var("HOME", "/home/tester");
        let path = cookie_path();
        assert_eq!(path, PathBuf::from("/home/tester/.erlang.cookie"));
    }
}
