//! Configuration types

use crate::error::{BurrowError, Result};
use crate::forward::ForwardMode;
use serde::Deserialize;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Session settings
    pub session: SessionConfig,
    /// Forwards to start once the session is up
    #[serde(default)]
    pub forwards: Vec<ForwardConfig>,
}

/// Session settings: where to connect and how to authenticate
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Server address as `host:port`
    pub host: String,
    /// Login name
    pub username: String,
    /// Password authentication
    #[serde(default)]
    pub password: Option<String>,
    /// Private key authentication; path to an OpenSSH/PEM key file
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Optional upstream proxy URL (http, https, socks5, socks5h)
    #[serde(default)]
    pub proxy: Option<String>,
}

/// One forward to start at session setup
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    /// Forward mode
    pub mode: ForwardMode,
    /// Bind address (`host:port`)
    pub bind: String,
    /// Target address; required for local and remote forwards
    #[serde(default)]
    pub target: Option<String>,
}

impl Config {
    /// Check cross-field requirements that serde cannot express
    pub fn validate(&self) -> Result<()> {
        match (&self.session.password, &self.session.key_file) {
            (None, None) => {
                return Err(BurrowError::config(
                    "session needs either a password or a key_file",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(BurrowError::config(
                    "session must not set both password and key_file",
                ))
            }
            _ => {}
        }

        for forward in &self.forwards {
            match forward.mode {
                ForwardMode::Local | ForwardMode::Remote => {
                    if forward.target.is_none() {
                        return Err(BurrowError::config(format!(
                            "{} forward on {} needs a target",
                            forward.mode, forward.bind
                        )));
                    }
                }
                ForwardMode::Dynamic => {}
            }
        }

        Ok(())
    }
}
