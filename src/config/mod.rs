//! Configuration module for Burrow
//!
//! This module provides configuration types and parsing for the client.

mod client;

pub use client::{Config, ForwardConfig, SessionConfig};

use crate::error::{BurrowError, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        BurrowError::config(format!("failed to read config file {:?}: {}", path.as_ref(), e))
    })?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| BurrowError::config(format!("failed to parse configuration: {}", e)))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::ForwardMode;

    #[test]
    fn test_parse_minimal_config() {
        let config_str = r#"
[session]
host = "server.example.com:22"
username = "admin"
password = "secret"
"#;

        let config = parse_config(config_str).unwrap();
        assert_eq!(config.session.host, "server.example.com:22");
        assert_eq!(config.session.username, "admin");
        assert_eq!(config.session.password.as_deref(), Some("secret"));
        assert!(config.forwards.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config_str = r#"
[session]
host = "server.example.com:22"
username = "admin"
key_file = "/home/admin/.ssh/id_ed25519"
proxy = "socks5://127.0.0.1:1080"

[[forwards]]
mode = "local"
bind = "127.0.0.1:9000"
target = "10.0.0.5:80"

[[forwards]]
mode = "remote"
bind = "0.0.0.0:8022"
target = "127.0.0.1:22"

[[forwards]]
mode = "dynamic"
bind = "127.0.0.1:1080"
"#;

        let config = parse_config(config_str).unwrap();
        assert_eq!(config.session.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(config.forwards.len(), 3);
        assert_eq!(config.forwards[0].mode, ForwardMode::Local);
        assert_eq!(config.forwards[2].mode, ForwardMode::Dynamic);
        assert!(config.forwards[2].target.is_none());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[session]\nhost = \"server:22\"\nusername = \"admin\"\npassword = \"pw\""
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.session.host, "server:22");
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/burrow.toml").unwrap_err();
        assert!(matches!(err, BurrowError::Config(_)));
    }

    #[test]
    fn test_reject_missing_auth() {
        let config_str = r#"
[session]
host = "server.example.com:22"
username = "admin"
"#;
        assert!(parse_config(config_str).is_err());
    }

    #[test]
    fn test_reject_both_auth_methods() {
        let config_str = r#"
[session]
host = "server.example.com:22"
username = "admin"
password = "secret"
key_file = "/tmp/key"
"#;
        assert!(parse_config(config_str).is_err());
    }

    #[test]
    fn test_reject_local_forward_without_target() {
        let config_str = r#"
[session]
host = "server.example.com:22"
username = "admin"
password = "secret"

[[forwards]]
mode = "local"
bind = "127.0.0.1:9000"
"#;
        let err = parse_config(config_str).unwrap_err();
        assert!(format!("{}", err).contains("needs a target"));
    }
}
