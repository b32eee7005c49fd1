//! Error types for Burrow
//!
//! This module defines all custom error types used throughout the application.

use std::io;
use thiserror::Error;

/// Main error type for Burrow operations
#[derive(Error, Debug)]
pub enum BurrowError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error (invalid bind address, proxy URL, scheme or port)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error (direct dial, proxy dial or transport handshake)
    #[error("Connection error: {0}")]
    Connect(String),

    /// Session used in the wrong lifecycle state
    #[error("Session state error: {0}")]
    State(String),

    /// Malformed SOCKS5 or HTTP CONNECT exchange
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Unknown forward id
    #[error("Forward not found: {0}")]
    NotFound(String),

    /// SSH transport error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),
}

/// Convenience result alias used across the crate
pub type Result<T> = std::result::Result<T, BurrowError>;

impl BurrowError {
    /// Build a connection error from any displayable cause
    pub fn connect(msg: impl std::fmt::Display) -> Self {
        BurrowError::Connect(msg.to_string())
    }

    /// Build a configuration error from any displayable cause
    pub fn config(msg: impl std::fmt::Display) -> Self {
        BurrowError::Config(msg.to_string())
    }
}
