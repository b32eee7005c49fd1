//! # Burrow - SSH Tunneling Client
//!
//! Burrow is a Rust-based SSH client focused on TCP forwarding. It opens an
//! authenticated SSH session, optionally reached through an upstream HTTP
//! CONNECT or SOCKS5 proxy, and multiplexes it into three kinds of
//! forwarding: local-to-remote, remote-to-local, and a dynamic SOCKS5 proxy.
//!
//! ## Features
//!
//! - **Proxy Chaining**: the SSH connection itself can be tunneled through
//!   an HTTP CONNECT or SOCKS5 proxy, with optional credentials
//! - **Local Forwarding**: a local listener relayed to a fixed remote target
//! - **Remote Forwarding**: a remote listener relayed to a local target
//! - **Dynamic Forwarding**: an embedded SOCKS5 server that opens one SSH
//!   channel per client request
//! - **Graceful Teardown**: stopping a forward closes its listener and every
//!   live connection, then waits for all relay tasks to finish
//!
//! ## Usage
//!
//! ```rust,ignore
//! use burrow::session::Session;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = Session::with_password("server:22", "admin", "secret");
//!     session.set_proxy("socks5://127.0.0.1:1080")?;
//!     session.establish().await?;
//!
//!     let id = session.start_dynamic("127.0.0.1:1080").await?;
//!     println!("SOCKS5 proxy running as {}", id);
//!
//!     tokio::signal::ctrl_c().await?;
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Client app -> forward server (local/remote/dynamic) -> SSH channel -> target
//! ```
//!
//! Each forward owns one accept loop and one relay task per connection, all
//! tracked so that stopping the forward drains them deterministically.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod forward;
pub mod helper;
pub mod proxy;
pub mod session;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{BurrowError, Result};
pub use session::Session;

/// Version of the Burrow library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
